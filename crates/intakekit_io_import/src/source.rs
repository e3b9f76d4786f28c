//! Capability-scoped source handles.
//!
//! A handle is only readable while its [`CapabilityWindow`] is open. Once the
//! host closes the window, [`SourceHandle::open`] fails with
//! [`ImportError::ExpiredHandle`] instead of relying on call-order discipline.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use crate::spec::ImportError;

/// Read-only view of an externally granted file reference.
///
/// Metadata accessors are best-effort: `None` means "unknown", never an error.
pub trait SourceHandle {
    /// Original file name as reported by the picker.
    fn display_name(&self) -> Option<String>;

    /// Declared size in bytes.
    fn byte_size(&self) -> Option<u64>;

    /// Last modification time, when the provider exposes one.
    fn time_modified(&self) -> Option<SystemTime> {
        None
    }

    /// Origin URI, recorded on the imported file when requested.
    fn origin(&self) -> Option<String> {
        None
    }

    /// Open a byte stream. Fails with `ExpiredHandle` once access is revoked.
    fn open(&self) -> Result<Box<dyn Read + '_>, ImportError>;
}

/// Shared open/closed flag for one capability grant.
#[derive(Debug, Clone, Default)]
pub struct CapabilityWindow {
    flag_closed: Arc<AtomicBool>,
}

impl CapabilityWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke access for every handle sharing this window.
    pub fn close(&self) {
        self.flag_closed.store(true, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        !self.flag_closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), ImportError> {
        if self.is_open() {
            return Ok(());
        }
        Err(ImportError::expired("capability window closed"))
    }
}

/// Handle over a local file, e.g. a path a desktop picker returned.
#[derive(Debug, Clone)]
pub struct SourceHandleFile {
    path_file: PathBuf,
    name_display: Option<String>,
    window: CapabilityWindow,
}

impl SourceHandleFile {
    pub fn new(path_file: impl Into<PathBuf>, window: CapabilityWindow) -> Self {
        Self {
            path_file: path_file.into(),
            name_display: None,
            window,
        }
    }

    /// Report `name` instead of the on-disk file name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.name_display = Some(name.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path_file
    }
}

impl SourceHandle for SourceHandleFile {
    fn display_name(&self) -> Option<String> {
        self.name_display.clone().or_else(|| {
            self.path_file
                .file_name()
                .map(|v| v.to_string_lossy().to_string())
        })
    }

    fn byte_size(&self) -> Option<u64> {
        fs::metadata(&self.path_file)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }

    fn time_modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path_file).ok()?.modified().ok()
    }

    fn origin(&self) -> Option<String> {
        let path_abs = fs::canonicalize(&self.path_file).ok()?;
        Some(format!("file://{}", path_abs.display()))
    }

    fn open(&self) -> Result<Box<dyn Read + '_>, ImportError> {
        self.window.ensure_open()?;
        let file = File::open(&self.path_file).map_err(|e| {
            ImportError::expired(format!(
                "cannot open {} ({e})",
                self.path_file.display()
            ))
        })?;
        Ok(Box::new(file))
    }
}

/// In-memory handle, used by hosts that already hold the picked bytes.
#[derive(Debug, Clone)]
pub struct SourceHandleBytes {
    bytes: Vec<u8>,
    name_display: Option<String>,
    size_declared: Option<u64>,
    window: CapabilityWindow,
}

impl SourceHandleBytes {
    pub fn new(bytes: impl Into<Vec<u8>>, window: CapabilityWindow) -> Self {
        let bytes = bytes.into();
        let size_declared = Some(bytes.len() as u64);
        Self {
            bytes,
            name_display: None,
            size_declared,
            window,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.name_display = Some(name.into());
        self
    }

    /// Override the declared size (`None` = provider did not report one).
    pub fn with_size_declared(mut self, size_declared: Option<u64>) -> Self {
        self.size_declared = size_declared;
        self
    }
}

impl SourceHandle for SourceHandleBytes {
    fn display_name(&self) -> Option<String> {
        self.name_display.clone()
    }

    fn byte_size(&self) -> Option<u64> {
        self.size_declared
    }

    fn open(&self) -> Result<Box<dyn Read + '_>, ImportError> {
        self.window.ensure_open()?;
        Ok(Box::new(io::Cursor::new(self.bytes.as_slice())))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::TempDir;

    use super::{CapabilityWindow, SourceHandle, SourceHandleBytes, SourceHandleFile};
    use crate::spec::EnumImportErrorKind;

    #[test]
    fn bytes_handle_reads_until_window_closes() {
        let window = CapabilityWindow::new();
        let source = SourceHandleBytes::new(b"hello".to_vec(), window.clone())
            .with_display_name("hello.txt");
        assert_eq!(source.byte_size(), Some(5));
        assert_eq!(source.display_name().as_deref(), Some("hello.txt"));

        let mut buf = Vec::new();
        source
            .open()
            .expect("open")
            .read_to_end(&mut buf)
            .expect("read");
        assert_eq!(buf, b"hello");

        window.close();
        assert!(!window.is_open());
        let err = source.open().err().expect("must fail");
        assert_eq!(err.kind(), EnumImportErrorKind::ExpiredHandle);
    }

    #[test]
    fn file_handle_reports_metadata_from_disk() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("paper.pdf");
        std::fs::write(&path, b"0123456789").expect("write");

        let source = SourceHandleFile::new(&path, CapabilityWindow::new());
        assert_eq!(source.display_name().as_deref(), Some("paper.pdf"));
        assert_eq!(source.byte_size(), Some(10));
        assert!(source.time_modified().is_some());
        assert!(source.origin().expect("origin").starts_with("file://"));

        let renamed = source.clone().with_display_name("Renamed.pdf");
        assert_eq!(renamed.display_name().as_deref(), Some("Renamed.pdf"));
    }

    #[test]
    fn file_handle_missing_file_is_expired() {
        let tmp = TempDir::new().expect("tempdir");
        let source = SourceHandleFile::new(tmp.path().join("gone.pdf"), CapabilityWindow::new());
        assert_eq!(source.byte_size(), None);
        let err = source.open().err().expect("must fail");
        assert_eq!(err.kind(), EnumImportErrorKind::ExpiredHandle);
    }

    #[test]
    fn file_handle_closed_window_is_expired() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("paper.pdf");
        std::fs::write(&path, b"still on disk").expect("write");

        let window = CapabilityWindow::new();
        let source = SourceHandleFile::new(&path, window.clone());
        assert!(source.open().is_ok());

        window.close();
        let err = source.open().err().expect("must fail");
        assert_eq!(err.kind(), EnumImportErrorKind::ExpiredHandle);
        assert!(path.is_file());
    }
}
