//! Import specification models and error types.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::report::ReportImport;
use crate::source::SourceHandle;

////////////////////////////////////////////////////////////////////////////////
// #region Tokens

/// Opaque identifier correlating a pick result with the request that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(u64);

impl RequestToken {
    /// Wrap a raw token value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw token value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestToken {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// What the resolver decided to do with the destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumImportAction {
    /// Stream source bytes into `path_file_final`.
    Write,
    /// An existing file already matches name and size; copy nothing.
    Reuse,
}

impl EnumImportAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Reuse => "reuse",
        }
    }
}

/// Terminal status of one import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumImportStatus {
    Success,
    Cancelled,
    Failed,
}

impl EnumImportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

/// Flat failure reason carried by a failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumImportErrorKind {
    ExpiredHandle,
    DirectoryUnavailable,
    TooManyCollisions,
    CopyError,
}

impl EnumImportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExpiredHandle => "expired_handle",
            Self::DirectoryUnavailable => "directory_unavailable",
            Self::TooManyCollisions => "too_many_collisions",
            Self::CopyError => "copy_error",
        }
    }
}

/// Import session lifecycle.
///
/// `Completed` is terminal; which outcome it completed with lives in
/// [`SpecImportOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumSessionState {
    Created,
    MetadataResolved,
    Resolving,
    Copying,
    Completed,
}

/// The single terminal event the picker delivers for a token.
#[derive(Clone, Copy)]
pub enum EnumPickEvent<'a> {
    /// The user picked something; the handle is only valid during this call.
    Picked(&'a dyn SourceHandle),
    /// The user closed the picker without choosing.
    Cancelled,
}

impl fmt::Debug for EnumPickEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Picked(source) => f
                .debug_struct("Picked")
                .field("display_name", &source.display_name())
                .field("byte_size", &source.byte_size())
                .finish(),
            Self::Cancelled => f.write_str("Cancelled"),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsInit

/// Per-request import options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecImportOptions {
    /// Extension appended to names lacking it (e.g. `.pdf`). Empty disables it.
    pub ext_default: String,
    /// Glob patterns the picked name is expected to match. A mismatch only warns.
    pub patterns_accept: Option<Vec<String>>,
    /// Copy the source's last-modified time onto the imported file.
    pub if_preserve_mtime: bool,
    /// Record the source origin as an extended attribute (linux only).
    pub if_record_origin: bool,
}

impl Default for SpecImportOptions {
    fn default() -> Self {
        Self {
            ext_default: String::new(),
            patterns_accept: None,
            if_preserve_mtime: true,
            if_record_origin: false,
        }
    }
}

/// One pending pick operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecImportRequest {
    pub token: RequestToken,
    /// Directory imported files land in; created on demand.
    pub dir_destination: PathBuf,
    pub spec_options: SpecImportOptions,
}

impl SpecImportRequest {
    pub fn new(
        token: impl Into<RequestToken>,
        dir_destination: impl Into<PathBuf>,
        ext_default: &str,
    ) -> Self {
        Self {
            token: token.into(),
            dir_destination: dir_destination.into(),
            spec_options: SpecImportOptions {
                ext_default: ext_default.to_string(),
                ..SpecImportOptions::default()
            },
        }
    }
}

/// Defaults shared by every request of one request family (e.g. documents,
/// packages). One [`crate::router::ResultRouter`] serves one family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecImportFamily {
    pub name: String,
    /// First token handed out by the family's router.
    pub token_base: u64,
    pub dir_destination: PathBuf,
    pub spec_options: SpecImportOptions,
}

impl SpecImportFamily {
    pub fn new(name: &str, token_base: u64, dir_destination: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            token_base,
            dir_destination: dir_destination.into(),
            spec_options: SpecImportOptions::default(),
        }
    }

    /// Request for `token` using this family's defaults.
    pub fn derive_request(&self, token: RequestToken) -> SpecImportRequest {
        SpecImportRequest {
            token,
            dir_destination: self.dir_destination.clone(),
            spec_options: self.spec_options.clone(),
        }
    }
}

/// Output of the name resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecResolvedDestination {
    /// Absolute or caller-relative path inside the destination directory.
    pub path_file_final: PathBuf,
    pub rule_action: EnumImportAction,
    /// Number of candidate names looked at, the desired one included.
    pub n_candidates_probed: u32,
}

/// Terminal value delivered to the caller exactly once per session.
#[derive(Debug)]
pub struct SpecImportOutcome {
    token: RequestToken,
    status: EnumImportStatus,
    path_file_local: Option<PathBuf>,
    rule_action: Option<EnumImportAction>,
    error: Option<ImportError>,
    report: ReportImport,
}

impl SpecImportOutcome {
    pub(crate) fn success(
        token: RequestToken,
        path_file_local: PathBuf,
        rule_action: EnumImportAction,
        report: ReportImport,
    ) -> Self {
        Self {
            token,
            status: EnumImportStatus::Success,
            path_file_local: Some(path_file_local),
            rule_action: Some(rule_action),
            error: None,
            report,
        }
    }

    pub(crate) fn cancelled(token: RequestToken, report: ReportImport) -> Self {
        Self {
            token,
            status: EnumImportStatus::Cancelled,
            path_file_local: None,
            rule_action: None,
            error: None,
            report,
        }
    }

    pub(crate) fn failed(token: RequestToken, error: ImportError, report: ReportImport) -> Self {
        Self {
            token,
            status: EnumImportStatus::Failed,
            path_file_local: None,
            rule_action: None,
            error: Some(error),
            report,
        }
    }

    pub fn token(&self) -> RequestToken {
        self.token
    }

    pub fn status(&self) -> EnumImportStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == EnumImportStatus::Success
    }

    /// Imported (or reused) file; present iff the status is `Success`.
    pub fn path_file_local(&self) -> Option<&Path> {
        self.path_file_local.as_deref()
    }

    /// Whether the file was written or reused; present iff `Success`.
    pub fn rule_action(&self) -> Option<EnumImportAction> {
        self.rule_action
    }

    /// Failure detail; present iff the status is `Failed`.
    pub fn error(&self) -> Option<&ImportError> {
        self.error.as_ref()
    }

    pub fn error_reason(&self) -> Option<EnumImportErrorKind> {
        self.error.as_ref().map(ImportError::kind)
    }

    pub fn report(&self) -> &ReportImport {
        &self.report
    }

    /// Split into the local path and report, consuming the outcome.
    pub fn into_parts(self) -> (Option<PathBuf>, Option<ImportError>, ReportImport) {
        (self.path_file_local, self.error, self.report)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Session-terminal failures.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The source capability could not be opened. Never retried.
    #[error("source handle expired: {reason}")]
    ExpiredHandle { reason: String },
    /// The destination directory is missing and could not be created.
    #[error("destination directory unavailable: {}", path.display())]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Every candidate name up to the ceiling is taken.
    #[error(
        "too many name collisions for `{name}` in {} ({n_candidates} candidates)",
        dir.display()
    )]
    TooManyCollisions {
        dir: PathBuf,
        name: String,
        n_candidates: u32,
    },
    /// Streaming failed; the destination has already been cleaned up.
    #[error("copy to {} failed", path.display())]
    CopyError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ImportError {
    pub fn kind(&self) -> EnumImportErrorKind {
        match self {
            Self::ExpiredHandle { .. } => EnumImportErrorKind::ExpiredHandle,
            Self::DirectoryUnavailable { .. } => EnumImportErrorKind::DirectoryUnavailable,
            Self::TooManyCollisions { .. } => EnumImportErrorKind::TooManyCollisions,
            Self::CopyError { .. } => EnumImportErrorKind::CopyError,
        }
    }

    pub(crate) fn expired(reason: impl Into<String>) -> Self {
        Self::ExpiredHandle {
            reason: reason.into(),
        }
    }
}

/// Failures building a session from its request.
#[derive(Debug, Error)]
pub enum SessionBuildError {
    #[error("invalid accept pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Registration and dispatch contract violations.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Two registrations for the same pending token. This is an integration
    /// defect, not a runtime condition.
    #[error("token {token} is already pending in family `{family}`")]
    DuplicateToken { family: String, token: RequestToken },
    #[error("no router registered for family `{family}`")]
    UnknownFamily { family: String },
    #[error("family `{family}` is already part of the dispatch chain")]
    DuplicateFamily { family: String },
    #[error("picker refused request {token} in family `{family}`: {reason}")]
    PickerFailed {
        family: String,
        token: RequestToken,
        reason: String,
    },
    #[error(transparent)]
    Session(#[from] SessionBuildError),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
