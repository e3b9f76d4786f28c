//! Token-keyed routing of picker results to pending import sessions.
//!
//! A [`ResultRouter`] owns the pending sessions of one request family. A
//! [`DispatchChain`] holds several routers in priority order and forwards
//! anything none of them claims to an optional fallback handler.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::conf::{C_NOTIFY_TITLE_FAILURE, C_NOTIFY_TITLE_SUCCESS, N_NOTIFICATION_ID_IMPORT};
use crate::session::ImportSession;
use crate::spec::{
    EnumImportAction, EnumImportStatus, EnumPickEvent, RequestToken, RouterError,
    SpecImportFamily, SpecImportOutcome, SpecImportRequest,
};

////////////////////////////////////////////////////////////////////////////////
// #region Collaborators

/// Entry point the host calls when a picker result arrives.
pub trait ExternalResultSink {
    /// Returns `true` when the event was consumed.
    fn on_external_result(&mut self, token: RequestToken, event: EnumPickEvent<'_>) -> bool;
}

/// Starts an external pick operation. The terminal event comes back later
/// through [`ExternalResultSink::on_external_result`].
pub trait Picker {
    fn begin_pick(&mut self, spec_request: &SpecImportRequest) -> Result<(), String>;
}

/// Host-side user notification.
pub trait Notifier {
    fn notify(&self, title: &str, message: &str, if_success: bool, n_notification_id: u32);
}

/// Tell the user how an import ended. Cancelled imports stay silent.
///
/// Returns whether a notification was sent.
pub fn notify_outcome(notifier: &dyn Notifier, family: &str, outcome: &SpecImportOutcome) -> bool {
    match outcome.status() {
        EnumImportStatus::Cancelled => false,
        EnumImportStatus::Success => {
            let name_file = outcome
                .path_file_local()
                .and_then(|p| p.file_name())
                .map(|v| v.to_string_lossy().to_string())
                .unwrap_or_default();
            let message = match outcome.rule_action() {
                Some(EnumImportAction::Reuse) => format!("{family}: {name_file} already imported"),
                _ => format!("{family}: imported {name_file}"),
            };
            notifier.notify(C_NOTIFY_TITLE_SUCCESS, &message, true, N_NOTIFICATION_ID_IMPORT);
            true
        }
        EnumImportStatus::Failed => {
            let message = match outcome.error() {
                Some(e) => format!("{family}: {e}"),
                None => format!("{family}: import failed"),
            };
            notifier.notify(C_NOTIFY_TITLE_FAILURE, &message, false, N_NOTIFICATION_ID_IMPORT);
            true
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ResultRouter

/// Registry of pending sessions for one request family.
///
/// Each registration is consumed by exactly one `dispatch`; a second event
/// for the same token finds nothing and is reported as unclaimed.
#[derive(Debug)]
pub struct ResultRouter {
    spec_family: SpecImportFamily,
    n_token_next: u64,
    map_pending: HashMap<RequestToken, ImportSession>,
}

impl ResultRouter {
    pub fn new(spec_family: SpecImportFamily) -> Self {
        let n_token_next = spec_family.token_base;
        Self {
            spec_family,
            n_token_next,
            map_pending: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec_family.name
    }

    pub fn family(&self) -> &SpecImportFamily {
        &self.spec_family
    }

    /// Next token from the family's range that is not pending here.
    pub fn allocate_token(&mut self) -> RequestToken {
        loop {
            let token = RequestToken::new(self.n_token_next);
            self.n_token_next = self.n_token_next.wrapping_add(1);
            if !self.map_pending.contains_key(&token) {
                return token;
            }
        }
    }

    /// Request for `token` carrying this family's defaults.
    pub fn build_request(&self, token: RequestToken) -> SpecImportRequest {
        self.spec_family.derive_request(token)
    }

    /// Record a pending session under its token.
    pub fn register(&mut self, session: ImportSession) -> Result<(), RouterError> {
        let token = session.token();
        if self.map_pending.contains_key(&token) {
            return Err(RouterError::DuplicateToken {
                family: self.spec_family.name.clone(),
                token,
            });
        }
        debug!(family = %self.spec_family.name, token = %token, "session registered");
        self.map_pending.insert(token, session);
        Ok(())
    }

    /// Build a session for `token` from the family defaults and register it.
    pub fn track<F>(&mut self, token: RequestToken, callback: F) -> Result<(), RouterError>
    where
        F: FnOnce(SpecImportOutcome) + 'static,
    {
        let session = ImportSession::new(self.build_request(token), callback)?;
        self.register(session)
    }

    /// Register a session for `token`, then ask `picker` to start.
    ///
    /// A picker refusal removes the registration again; the callback is
    /// dropped without being called.
    pub fn begin_import<F>(
        &mut self,
        token: RequestToken,
        picker: &mut dyn Picker,
        callback: F,
    ) -> Result<(), RouterError>
    where
        F: FnOnce(SpecImportOutcome) + 'static,
    {
        let spec_request = self.build_request(token);
        self.register(ImportSession::new(spec_request.clone(), callback)?)?;
        if let Err(reason) = picker.begin_pick(&spec_request) {
            self.map_pending.remove(&token);
            warn!(
                family = %self.spec_family.name,
                token = %token,
                reason = %reason,
                "picker refused; registration rolled back"
            );
            return Err(RouterError::PickerFailed {
                family: self.spec_family.name.clone(),
                token,
                reason,
            });
        }
        Ok(())
    }

    /// Hand `event` to the session pending under `token`.
    ///
    /// Returns `false`, with no side effects, when nothing is pending.
    pub fn dispatch(&mut self, token: RequestToken, event: EnumPickEvent<'_>) -> bool {
        let Some(session) = self.map_pending.remove(&token) else {
            debug!(family = %self.spec_family.name, token = %token, "token not claimed");
            return false;
        };
        let status = session.complete(event);
        info!(
            family = %self.spec_family.name,
            token = %token,
            status = status.as_str(),
            "result dispatched"
        );
        true
    }

    /// Drop every pending session without notifying it. Teardown only.
    pub fn reset(&mut self) {
        let n_pending = self.map_pending.len();
        self.map_pending.clear();
        if n_pending > 0 {
            warn!(
                family = %self.spec_family.name,
                pending = n_pending,
                "dropped pending sessions on reset"
            );
        }
    }

    pub fn is_pending(&self, token: RequestToken) -> bool {
        self.map_pending.contains_key(&token)
    }

    pub fn pending_count(&self) -> usize {
        self.map_pending.len()
    }
}

impl ExternalResultSink for ResultRouter {
    fn on_external_result(&mut self, token: RequestToken, event: EnumPickEvent<'_>) -> bool {
        self.dispatch(token, event)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DispatchChain

/// Handler for events no router claims.
pub type FallbackHandler = Box<dyn FnMut(RequestToken, EnumPickEvent<'_>)>;

/// Where a dispatched event ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumDispatchRoute {
    /// Claimed by the router of this family.
    Claimed(String),
    /// No router claimed it; the fallback handler ran.
    Fallback,
    /// No router claimed it and no fallback is installed.
    Unhandled,
}

/// Routers tried in a fixed priority order, plus an optional fallback.
#[derive(Default)]
pub struct DispatchChain {
    l_routers: Vec<ResultRouter>,
    fallback: Option<FallbackHandler>,
}

impl std::fmt::Debug for DispatchChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchChain")
            .field("l_routers", &self.l_routers)
            .field("if_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl DispatchChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a router at the lowest priority so far.
    pub fn push_router(&mut self, router: ResultRouter) -> Result<(), RouterError> {
        if self.l_routers.iter().any(|r| r.name() == router.name()) {
            return Err(RouterError::DuplicateFamily {
                family: router.name().to_string(),
            });
        }
        self.l_routers.push(router);
        Ok(())
    }

    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: FnMut(RequestToken, EnumPickEvent<'_>) + 'static,
    {
        self.fallback = Some(Box::new(fallback));
        self
    }

    pub fn set_fallback<F>(&mut self, fallback: F)
    where
        F: FnMut(RequestToken, EnumPickEvent<'_>) + 'static,
    {
        self.fallback = Some(Box::new(fallback));
    }

    /// Family names in priority order.
    pub fn family_names(&self) -> Vec<&str> {
        self.l_routers.iter().map(ResultRouter::name).collect()
    }

    pub fn router(&self, family: &str) -> Result<&ResultRouter, RouterError> {
        self.l_routers
            .iter()
            .find(|r| r.name() == family)
            .ok_or_else(|| RouterError::UnknownFamily {
                family: family.to_string(),
            })
    }

    pub fn router_mut(&mut self, family: &str) -> Result<&mut ResultRouter, RouterError> {
        self.l_routers
            .iter_mut()
            .find(|r| r.name() == family)
            .ok_or_else(|| RouterError::UnknownFamily {
                family: family.to_string(),
            })
    }

    fn ensure_token_free(&self, token: RequestToken) -> Result<(), RouterError> {
        match self.l_routers.iter().find(|r| r.is_pending(token)) {
            Some(router) => Err(RouterError::DuplicateToken {
                family: router.name().to_string(),
                token,
            }),
            None => Ok(()),
        }
    }

    /// Token from `family`'s range that no router in the chain has pending.
    pub fn allocate_token(&mut self, family: &str) -> Result<RequestToken, RouterError> {
        let n_idx = self
            .l_routers
            .iter()
            .position(|r| r.name() == family)
            .ok_or_else(|| RouterError::UnknownFamily {
                family: family.to_string(),
            })?;
        loop {
            let token = self.l_routers[n_idx].allocate_token();
            if self.ensure_token_free(token).is_ok() {
                return Ok(token);
            }
        }
    }

    /// Register `session` with `family`, rejecting tokens pending anywhere
    /// in the chain.
    pub fn register(&mut self, family: &str, session: ImportSession) -> Result<(), RouterError> {
        self.ensure_token_free(session.token())?;
        self.router_mut(family)?.register(session)
    }

    pub fn track<F>(
        &mut self,
        family: &str,
        token: RequestToken,
        callback: F,
    ) -> Result<(), RouterError>
    where
        F: FnOnce(SpecImportOutcome) + 'static,
    {
        self.ensure_token_free(token)?;
        self.router_mut(family)?.track(token, callback)
    }

    pub fn begin_import<F>(
        &mut self,
        family: &str,
        token: RequestToken,
        picker: &mut dyn Picker,
        callback: F,
    ) -> Result<(), RouterError>
    where
        F: FnOnce(SpecImportOutcome) + 'static,
    {
        self.ensure_token_free(token)?;
        self.router_mut(family)?
            .begin_import(token, picker, callback)
    }

    /// Offer `event` to each router in order; the first claim wins.
    pub fn dispatch(&mut self, token: RequestToken, event: EnumPickEvent<'_>) -> EnumDispatchRoute {
        for router in &mut self.l_routers {
            if router.dispatch(token, event) {
                return EnumDispatchRoute::Claimed(router.name().to_string());
            }
        }
        match self.fallback.as_mut() {
            Some(fallback) => {
                debug!(token = %token, "no router claimed result; using fallback");
                fallback(token, event);
                EnumDispatchRoute::Fallback
            }
            None => {
                warn!(token = %token, "no router claimed result and no fallback installed");
                EnumDispatchRoute::Unhandled
            }
        }
    }

    pub fn reset(&mut self) {
        for router in &mut self.l_routers {
            router.reset();
        }
    }

    /// Whether any router in the chain has `token` pending.
    pub fn is_pending(&self, token: RequestToken) -> bool {
        self.l_routers.iter().any(|r| r.is_pending(token))
    }

    pub fn pending_count(&self) -> usize {
        self.l_routers.iter().map(ResultRouter::pending_count).sum()
    }
}

impl ExternalResultSink for DispatchChain {
    fn on_external_result(&mut self, token: RequestToken, event: EnumPickEvent<'_>) -> bool {
        self.dispatch(token, event) != EnumDispatchRoute::Unhandled
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region OutcomeQueue

/// Outcomes held back until `dispatch` has returned.
///
/// Session callbacks run while the chain is mutably borrowed. Handlers that
/// register the next import or allocate a token take their outcomes from
/// [`OutcomeQueue::drain`] once the borrow has ended. Each entry carries the
/// tag given to [`OutcomeQueue::callback`].
pub struct OutcomeQueue<T> {
    l_ready: Rc<RefCell<Vec<(T, SpecImportOutcome)>>>,
}

impl<T> Default for OutcomeQueue<T> {
    fn default() -> Self {
        Self {
            l_ready: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T> Clone for OutcomeQueue<T> {
    fn clone(&self) -> Self {
        Self {
            l_ready: Rc::clone(&self.l_ready),
        }
    }
}

impl<T: 'static> std::fmt::Debug for OutcomeQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeQueue")
            .field("n_ready", &self.len())
            .finish()
    }
}

impl<T: 'static> OutcomeQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session callback that queues its outcome under `tag`.
    pub fn callback(&self, tag: T) -> impl FnOnce(SpecImportOutcome) + 'static {
        let l_ready = Rc::clone(&self.l_ready);
        move |outcome| l_ready.borrow_mut().push((tag, outcome))
    }

    /// Take every queued outcome, oldest first.
    pub fn drain(&self) -> Vec<(T, SpecImportOutcome)> {
        std::mem::take(&mut *self.l_ready.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.l_ready.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.l_ready.borrow().is_empty()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::source::{CapabilityWindow, SourceHandleBytes};
    use crate::spec::{EnumImportErrorKind, ImportError};

    type TypeOutcomeSlot = Rc<RefCell<Vec<SpecImportOutcome>>>;

    fn new_slot() -> TypeOutcomeSlot {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn push_into(slot: &TypeOutcomeSlot) -> impl FnOnce(SpecImportOutcome) + 'static {
        let slot = Rc::clone(slot);
        move |outcome| slot.borrow_mut().push(outcome)
    }

    fn new_router(tmp: &TempDir, name: &str, token_base: u64) -> ResultRouter {
        let mut spec_family = SpecImportFamily::new(name, token_base, tmp.path().join(name));
        spec_family.spec_options.ext_default = ".pdf".to_string();
        ResultRouter::new(spec_family)
    }

    struct PickerRecording {
        l_tokens: Vec<RequestToken>,
        if_refuse: bool,
    }

    impl Picker for PickerRecording {
        fn begin_pick(&mut self, spec_request: &SpecImportRequest) -> Result<(), String> {
            if self.if_refuse {
                return Err("no activity".to_string());
            }
            self.l_tokens.push(spec_request.token);
            Ok(())
        }
    }

    #[derive(Default)]
    struct NotifierRecording {
        l_calls: RefCell<Vec<(String, String, bool, u32)>>,
    }

    impl Notifier for NotifierRecording {
        fn notify(&self, title: &str, message: &str, if_success: bool, n_notification_id: u32) {
            self.l_calls.borrow_mut().push((
                title.to_string(),
                message.to_string(),
                if_success,
                n_notification_id,
            ));
        }
    }

    #[test]
    fn router_unclaimed_dispatch_has_no_effects() {
        let tmp = TempDir::new().expect("tempdir");
        let mut router = new_router(&tmp, "document", 9001);
        let source = SourceHandleBytes::new(b"x".to_vec(), CapabilityWindow::new())
            .with_display_name("x.pdf");

        assert!(!router.dispatch(RequestToken::new(42), EnumPickEvent::Picked(&source)));
        assert!(!tmp.path().join("document").exists());
    }

    #[test]
    fn router_rejects_duplicate_token() {
        let tmp = TempDir::new().expect("tempdir");
        let mut router = new_router(&tmp, "document", 9001);
        let slot = new_slot();
        let token = RequestToken::new(9001);

        router.track(token, push_into(&slot)).expect("first");
        let err = router.track(token, push_into(&slot)).expect_err("second");
        assert!(matches!(err, RouterError::DuplicateToken { .. }));
        assert_eq!(router.pending_count(), 1);
    }

    #[test]
    fn router_dispatch_consumes_registration_once() {
        let tmp = TempDir::new().expect("tempdir");
        let mut router = new_router(&tmp, "document", 9001);
        let slot = new_slot();
        let source = SourceHandleBytes::new(b"%PDF".to_vec(), CapabilityWindow::new())
            .with_display_name("a.pdf");

        let token = router.allocate_token();
        router.track(token, push_into(&slot)).expect("track");
        assert!(router.is_pending(token));

        assert!(router.dispatch(token, EnumPickEvent::Picked(&source)));
        assert!(!router.dispatch(token, EnumPickEvent::Picked(&source)));
        assert_eq!(slot.borrow().len(), 1);
        assert!(slot.borrow()[0].is_success());
        assert!(tmp.path().join("document/a.pdf").is_file());
    }

    #[test]
    fn router_cancel_short_circuits() {
        let tmp = TempDir::new().expect("tempdir");
        let mut router = new_router(&tmp, "document", 9001);
        let slot = new_slot();
        let token = router.allocate_token();
        router.track(token, push_into(&slot)).expect("track");

        assert!(router.dispatch(token, EnumPickEvent::Cancelled));
        assert_eq!(slot.borrow()[0].status(), EnumImportStatus::Cancelled);
        assert!(!tmp.path().join("document").exists());
        assert_eq!(router.pending_count(), 0);
    }

    #[test]
    fn router_allocation_skips_pending_tokens() {
        let tmp = TempDir::new().expect("tempdir");
        let mut router = new_router(&tmp, "document", 10);
        let slot = new_slot();
        router
            .track(RequestToken::new(11), push_into(&slot))
            .expect("track");

        assert_eq!(router.allocate_token().get(), 10);
        assert_eq!(router.allocate_token().get(), 12);
    }

    #[test]
    fn router_reset_drops_without_notifying() {
        let tmp = TempDir::new().expect("tempdir");
        let mut router = new_router(&tmp, "document", 1);
        let slot = new_slot();
        for _ in 0..3 {
            let token = router.allocate_token();
            router.track(token, push_into(&slot)).expect("track");
        }

        router.reset();
        assert_eq!(router.pending_count(), 0);
        assert!(slot.borrow().is_empty());
    }

    #[test]
    fn router_picker_refusal_rolls_back() {
        let tmp = TempDir::new().expect("tempdir");
        let mut router = new_router(&tmp, "document", 1);
        let slot = new_slot();
        let mut picker = PickerRecording {
            l_tokens: Vec::new(),
            if_refuse: true,
        };

        let token = router.allocate_token();
        let err = router
            .begin_import(token, &mut picker, push_into(&slot))
            .expect_err("refused");
        assert!(matches!(err, RouterError::PickerFailed { .. }));
        assert!(!router.is_pending(token));
        assert!(slot.borrow().is_empty());

        picker.if_refuse = false;
        router
            .begin_import(token, &mut picker, push_into(&slot))
            .expect("begin");
        assert_eq!(picker.l_tokens, vec![token]);
        assert!(router.is_pending(token));
    }

    #[test]
    fn chain_tries_routers_in_priority_order_then_falls_back() {
        let tmp = TempDir::new().expect("tempdir");
        let mut chain = DispatchChain::new();
        chain
            .push_router(new_router(&tmp, "document", 9001))
            .expect("push");
        chain
            .push_router(new_router(&tmp, "package", 9002))
            .expect("push");
        let l_fallback: Rc<RefCell<Vec<RequestToken>>> = Rc::new(RefCell::new(Vec::new()));
        let l_fallback_cb = Rc::clone(&l_fallback);
        let mut chain = chain.with_fallback(move |token, _event| {
            l_fallback_cb.borrow_mut().push(token);
        });
        assert_eq!(chain.family_names(), vec!["document", "package"]);

        let slot = new_slot();
        let token_doc = chain.allocate_token("document").expect("alloc");
        let token_pkg = chain.allocate_token("package").expect("alloc");
        assert_ne!(token_doc, token_pkg);
        chain.track("document", token_doc, push_into(&slot)).expect("track");
        chain.track("package", token_pkg, push_into(&slot)).expect("track");

        assert_eq!(
            chain.dispatch(token_pkg, EnumPickEvent::Cancelled),
            EnumDispatchRoute::Claimed("package".to_string())
        );
        assert_eq!(
            chain.dispatch(token_doc, EnumPickEvent::Cancelled),
            EnumDispatchRoute::Claimed("document".to_string())
        );
        assert_eq!(
            chain.dispatch(RequestToken::new(77), EnumPickEvent::Cancelled),
            EnumDispatchRoute::Fallback
        );
        assert_eq!(*l_fallback.borrow(), vec![RequestToken::new(77)]);
        assert_eq!(slot.borrow().len(), 2);
    }

    #[test]
    fn chain_rejects_tokens_pending_in_other_families() {
        let tmp = TempDir::new().expect("tempdir");
        let mut chain = DispatchChain::new();
        chain
            .push_router(new_router(&tmp, "document", 9001))
            .expect("push");
        chain
            .push_router(new_router(&tmp, "package", 9002))
            .expect("push");
        let slot = new_slot();

        let token_doc = chain.allocate_token("document").expect("alloc");
        assert_eq!(token_doc.get(), 9001);
        let token_doc_next = chain.allocate_token("document").expect("alloc");
        assert_eq!(token_doc_next.get(), 9002);
        chain
            .track("document", token_doc_next, push_into(&slot))
            .expect("track");

        let token_pkg = chain.allocate_token("package").expect("alloc");
        assert_eq!(token_pkg.get(), 9003);
        let err = chain
            .track("package", token_doc_next, push_into(&slot))
            .expect_err("taken");
        assert!(matches!(err, RouterError::DuplicateToken { ref family, .. } if family == "document"));
    }

    #[test]
    fn chain_unknown_and_duplicate_family() {
        let tmp = TempDir::new().expect("tempdir");
        let mut chain = DispatchChain::new();
        chain
            .push_router(new_router(&tmp, "document", 1))
            .expect("push");
        assert!(matches!(
            chain.push_router(new_router(&tmp, "document", 5)),
            Err(RouterError::DuplicateFamily { .. })
        ));
        assert!(matches!(
            chain.allocate_token("package"),
            Err(RouterError::UnknownFamily { .. })
        ));
        assert!(!chain.on_external_result(RequestToken::new(3), EnumPickEvent::Cancelled));
    }

    #[test]
    fn notify_outcome_maps_status() {
        let notifier = NotifierRecording::default();
        let outcome_ok = SpecImportOutcome::success(
            RequestToken::new(1),
            "/tmp/pdfs/a.pdf".into(),
            EnumImportAction::Write,
            Default::default(),
        );
        let outcome_err = SpecImportOutcome::failed(
            RequestToken::new(2),
            ImportError::expired("window closed"),
            Default::default(),
        );
        let outcome_cancel = SpecImportOutcome::cancelled(RequestToken::new(3), Default::default());

        assert!(notify_outcome(&notifier, "document", &outcome_ok));
        assert!(notify_outcome(&notifier, "document", &outcome_err));
        assert!(!notify_outcome(&notifier, "document", &outcome_cancel));
        assert_eq!(outcome_err.error_reason(), Some(EnumImportErrorKind::ExpiredHandle));

        let l_calls = notifier.l_calls.borrow();
        assert_eq!(l_calls.len(), 2);
        assert_eq!(l_calls[0].0, "Import Complete");
        assert_eq!(l_calls[0].1, "document: imported a.pdf");
        assert!(l_calls[0].2);
        assert_eq!(l_calls[0].3, 1002);
        assert_eq!(l_calls[1].0, "Import Failed");
        assert!(!l_calls[1].2);
    }

    #[test]
    fn notify_outcome_reports_reuse() {
        let notifier = NotifierRecording::default();
        let outcome_reuse = SpecImportOutcome::success(
            RequestToken::new(4),
            "/tmp/pdfs/a.pdf".into(),
            EnumImportAction::Reuse,
            Default::default(),
        );

        assert!(notify_outcome(&notifier, "document", &outcome_reuse));
        let l_calls = notifier.l_calls.borrow();
        assert_eq!(l_calls.len(), 1);
        assert_eq!(l_calls[0].0, "Import Complete");
        assert_eq!(l_calls[0].1, "document: a.pdf already imported");
        assert!(l_calls[0].2);
    }

    #[test]
    fn chain_begin_import_registers_and_rolls_back() {
        let tmp = TempDir::new().expect("tempdir");
        let mut chain = DispatchChain::new();
        chain
            .push_router(new_router(&tmp, "document", 9001))
            .expect("push");
        chain
            .push_router(new_router(&tmp, "package", 9002))
            .expect("push");
        let slot = new_slot();
        let mut picker = PickerRecording {
            l_tokens: Vec::new(),
            if_refuse: false,
        };

        let token = chain.allocate_token("document").expect("alloc");
        chain
            .begin_import("document", token, &mut picker, push_into(&slot))
            .expect("begin");
        assert_eq!(picker.l_tokens, vec![token]);
        assert!(chain.router("document").expect("router").is_pending(token));

        let err = chain
            .begin_import("package", token, &mut picker, push_into(&slot))
            .expect_err("pending elsewhere");
        assert!(matches!(err, RouterError::DuplicateToken { ref family, .. } if family == "document"));
        assert_eq!(picker.l_tokens.len(), 1);

        picker.if_refuse = true;
        let token_pkg = chain.allocate_token("package").expect("alloc");
        let err = chain
            .begin_import("package", token_pkg, &mut picker, push_into(&slot))
            .expect_err("refused");
        assert!(matches!(err, RouterError::PickerFailed { ref family, .. } if family == "package"));
        assert!(!chain.is_pending(token_pkg));
        assert_eq!(chain.pending_count(), 1);

        let err = chain
            .begin_import("archive", RequestToken::new(5), &mut picker, push_into(&slot))
            .expect_err("unknown");
        assert!(matches!(err, RouterError::UnknownFamily { .. }));
        assert!(slot.borrow().is_empty());
    }

    #[test]
    fn queued_outcomes_let_handlers_reenter_the_chain() {
        let tmp = TempDir::new().expect("tempdir");
        let mut chain = DispatchChain::new();
        chain
            .push_router(new_router(&tmp, "document", 9001))
            .expect("push");
        let queue: OutcomeQueue<&'static str> = OutcomeQueue::new();
        let source = SourceHandleBytes::new(b"%PDF".to_vec(), CapabilityWindow::new())
            .with_display_name("a.pdf");

        let token = chain.allocate_token("document").expect("alloc");
        chain
            .track("document", token, queue.callback("first"))
            .expect("track");
        assert!(queue.is_empty());

        assert_eq!(
            chain.dispatch(token, EnumPickEvent::Picked(&source)),
            EnumDispatchRoute::Claimed("document".to_string())
        );
        assert_eq!(queue.len(), 1);

        let l_ready = queue.drain();
        assert!(queue.is_empty());
        assert_eq!(l_ready.len(), 1);
        let (tag, outcome) = &l_ready[0];
        assert_eq!(*tag, "first");
        assert!(outcome.is_success());

        // The handler starts the next pick on the same chain.
        let token_next = chain.allocate_token("document").expect("alloc");
        chain
            .track("document", token_next, queue.callback("second"))
            .expect("track");
        assert!(chain.is_pending(token_next));
        chain.dispatch(token_next, EnumPickEvent::Cancelled);
        assert_eq!(queue.drain()[0].0, "second");
    }
}
