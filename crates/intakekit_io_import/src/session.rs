//! One import attempt, from picker event to outcome callback.

use std::fmt;
use std::path::PathBuf;

use globset::GlobSet;
use tracing::{debug, error, info, info_span, warn};

use crate::report::ReportImportBuilder;
use crate::resolve::resolve_destination;
use crate::source::SourceHandle;
use crate::spec::{
    EnumImportAction, EnumImportStatus, EnumPickEvent, EnumSessionState, ImportError,
    RequestToken, SessionBuildError, SpecImportOutcome, SpecImportRequest,
};
use crate::stream::copy_stream;
use crate::util::{apply_source_metadata, compile_accept_patterns, is_name_accepted};

/// Receives the terminal outcome of a session, exactly once.
pub type OutcomeCallback = Box<dyn FnOnce(SpecImportOutcome)>;

/// State machine for a single pending import.
///
/// `Created -> MetadataResolved -> Resolving -> Copying -> Completed`, with
/// `Completed` reachable from any state. A session is consumed by
/// [`ImportSession::complete`], which is what makes the callback fire once.
pub struct ImportSession {
    spec_request: SpecImportRequest,
    state: EnumSessionState,
    glob_accept: Option<GlobSet>,
    builder_report: ReportImportBuilder,
    callback: OutcomeCallback,
}

impl fmt::Debug for ImportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportSession")
            .field("spec_request", &self.spec_request)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ImportSession {
    /// Build a session; fails only when an accept pattern does not compile.
    pub fn new<F>(spec_request: SpecImportRequest, callback: F) -> Result<Self, SessionBuildError>
    where
        F: FnOnce(SpecImportOutcome) + 'static,
    {
        let glob_accept =
            compile_accept_patterns(spec_request.spec_options.patterns_accept.as_deref())?;
        Ok(Self {
            spec_request,
            state: EnumSessionState::Created,
            glob_accept,
            builder_report: ReportImportBuilder::default(),
            callback: Box::new(callback),
        })
    }

    pub fn token(&self) -> RequestToken {
        self.spec_request.token
    }

    pub fn request(&self) -> &SpecImportRequest {
        &self.spec_request
    }

    pub fn state(&self) -> EnumSessionState {
        self.state
    }

    fn transition(&mut self, state_next: EnumSessionState) {
        debug!(
            token = %self.spec_request.token,
            from = ?self.state,
            to = ?state_next,
            "session transition"
        );
        self.state = state_next;
    }

    /// Drive the session to `Completed` for `event` and hand the outcome to
    /// the callback. Runs synchronously; the source handle is only used
    /// inside this call.
    pub fn complete(mut self, event: EnumPickEvent<'_>) -> EnumImportStatus {
        let token = self.spec_request.token;
        let _span = info_span!("import", token = %token).entered();

        let outcome = match event {
            EnumPickEvent::Cancelled => {
                debug!("pick cancelled");
                self.transition(EnumSessionState::Completed);
                SpecImportOutcome::cancelled(token, std::mem::take(&mut self.builder_report).build())
            }
            EnumPickEvent::Picked(source) => {
                let res_import = self.run_import(source);
                self.transition(EnumSessionState::Completed);
                let report = std::mem::take(&mut self.builder_report).build();
                match res_import {
                    Ok((path_file_local, rule_action)) => {
                        info!(
                            path = %path_file_local.display(),
                            action = rule_action.as_str(),
                            bytes = report.cnt_bytes_copied,
                            "import completed"
                        );
                        SpecImportOutcome::success(token, path_file_local, rule_action, report)
                    }
                    Err(e) => {
                        error!(reason = e.kind().as_str(), error = %e, "import failed");
                        SpecImportOutcome::failed(token, e, report)
                    }
                }
            }
        };

        let status = outcome.status();
        (self.callback)(outcome);
        status
    }

    fn run_import(
        &mut self,
        source: &dyn SourceHandle,
    ) -> Result<(PathBuf, EnumImportAction), ImportError> {
        let name_display = source.display_name();
        let size_declared = source.byte_size();
        self.builder_report.set_size_declared(size_declared);
        self.transition(EnumSessionState::MetadataResolved);

        if let Some(name) = name_display.as_deref() {
            if !is_name_accepted(name, self.glob_accept.as_ref()) {
                warn!(name, "picked name does not match accepted patterns; importing anyway");
                self.builder_report
                    .add_warning(format!("Name does not match accepted patterns: {name}"));
            }
        }

        self.transition(EnumSessionState::Resolving);
        let spec_options = &self.spec_request.spec_options;
        let spec_dst = resolve_destination(
            name_display.as_deref(),
            &self.spec_request.dir_destination,
            &spec_options.ext_default,
            size_declared,
        )?;
        self.builder_report
            .set_candidates_probed(spec_dst.n_candidates_probed);
        if spec_dst.rule_action == EnumImportAction::Reuse {
            return Ok((spec_dst.path_file_final, EnumImportAction::Reuse));
        }

        self.transition(EnumSessionState::Copying);
        let n_bytes_copied = {
            let mut reader = source.open()?;
            copy_stream(reader.as_mut(), &spec_dst.path_file_final)?
        };
        self.builder_report.add_bytes_copied(n_bytes_copied);

        if let Some(n_bytes_declared) = size_declared {
            if n_bytes_declared != n_bytes_copied {
                warn!(
                    declared = n_bytes_declared,
                    copied = n_bytes_copied,
                    "declared size differs from copied bytes"
                );
                self.builder_report.add_warning(format!(
                    "Declared size {n_bytes_declared} differs from copied size {n_bytes_copied}"
                ));
            }
        }

        let spec_options = &self.spec_request.spec_options;
        let time_modified = if spec_options.if_preserve_mtime {
            source.time_modified()
        } else {
            None
        };
        let origin = if spec_options.if_record_origin {
            source.origin()
        } else {
            None
        };
        apply_source_metadata(
            &spec_dst.path_file_final,
            time_modified,
            origin.as_deref(),
            &mut self.builder_report,
        );

        Ok((spec_dst.path_file_final, EnumImportAction::Write))
    }
}
