//! `intakekit_io_import` v1:
//! Rust-side import pipeline for capability-scoped picker results.
//!
//! Architecture:
//! - `conf`    : shared constants
//! - `spec`    : tokens/enums/options/outcome/errors
//! - `report`  : per-session report model
//! - `source`  : source handle trait and capability window
//! - `resolve` : destination name resolution
//! - `stream`  : chunked copy into place
//! - `session` : import session state machine
//! - `router`  : token registry, dispatch chain, outcome queue, collaborators
//! - `config`  : TOML configuration
//! - `util`    : shared helper functions

pub mod conf;
pub mod config;
pub mod report;
pub mod resolve;
pub mod router;
pub mod session;
pub mod source;
pub mod spec;
pub mod stream;
mod util;

pub use config::{ConfigError, SpecFamilyConfig, SpecImportConfig, load_config};
pub use report::{ReportImport, ReportImportBuilder};
pub use resolve::resolve_destination;
pub use router::{
    DispatchChain, EnumDispatchRoute, ExternalResultSink, FallbackHandler, Notifier, OutcomeQueue,
    Picker, ResultRouter, notify_outcome,
};
pub use session::{ImportSession, OutcomeCallback};
pub use source::{CapabilityWindow, SourceHandle, SourceHandleBytes, SourceHandleFile};
pub use spec::{
    EnumImportAction, EnumImportErrorKind, EnumImportStatus, EnumPickEvent, EnumSessionState,
    ImportError, RequestToken, RouterError, SessionBuildError, SpecImportFamily,
    SpecImportOptions, SpecImportOutcome, SpecImportRequest, SpecResolvedDestination,
};
pub use stream::copy_stream;
