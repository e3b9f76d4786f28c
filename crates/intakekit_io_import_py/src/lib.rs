use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use intakekit_io_import::{
    ConfigError, DispatchChain, EnumDispatchRoute, EnumPickEvent, ImportError, ImportSession,
    OutcomeQueue, RequestToken, RouterError, SessionBuildError, SourceHandle, SpecFamilyConfig,
    SpecImportConfig, SpecImportOutcome, load_config,
};
use intakekit_log::{EnumLogFormat, LogInitError, SpecLogConfig, init_logging};
use pyo3::exceptions::{PyOSError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict};
use tracing::{error, warn};

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "intakekit.io.import.v1";
const C_BRIDGE_TRANSPORT: &str = "rust_native";

////////////////////////////////////////////////////////////////////////////////
// #region Outcome

#[pyclass(name = "ImportOutcome", frozen)]
#[derive(Debug, Clone)]
struct PyImportOutcome {
    #[pyo3(get)]
    token: u64,
    #[pyo3(get)]
    status: String,
    #[pyo3(get)]
    path_local: Option<String>,
    #[pyo3(get)]
    action: Option<String>,
    #[pyo3(get)]
    error_reason: Option<String>,
    #[pyo3(get)]
    error_message: Option<String>,
    #[pyo3(get)]
    bytes_copied: u64,
    #[pyo3(get)]
    candidates_probed: u64,
    #[pyo3(get)]
    size_declared: Option<u64>,
    #[pyo3(get)]
    warnings: Vec<String>,
}

fn format_error_chain(exception: &ImportError) -> String {
    let mut message = exception.to_string();
    let mut source = StdError::source(exception);
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    message
}

impl From<SpecImportOutcome> for PyImportOutcome {
    fn from(outcome: SpecImportOutcome) -> Self {
        let token = outcome.token().get();
        let status = outcome.status().as_str().to_string();
        let action = outcome.rule_action().map(|v| v.as_str().to_string());
        let (path_local, exception, report_import) = outcome.into_parts();
        Self {
            token,
            status,
            path_local: path_local.map(|p| p.to_string_lossy().to_string()),
            action,
            error_reason: exception.as_ref().map(|e| e.kind().as_str().to_string()),
            error_message: exception.as_ref().map(format_error_chain),
            bytes_copied: report_import.cnt_bytes_copied,
            candidates_probed: report_import.cnt_candidates_probed,
            size_declared: report_import.size_declared,
            warnings: report_import.warnings,
        }
    }
}

#[pymethods]
impl PyImportOutcome {
    #[getter]
    fn is_success(&self) -> bool {
        self.status == "success"
    }

    #[getter]
    fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_bytes_copied".to_string(), self.bytes_copied);
        dict_counts.insert("cnt_candidates_probed".to_string(), self.candidates_probed);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    #[pyo3(signature = (prefix = "[IMPORT]"))]
    fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} token={} status={} path={} bytes={} warnings={}",
            self.token,
            self.status,
            self.path_local.as_deref().unwrap_or("-"),
            self.bytes_copied,
            self.warning_count()
        )
    }

    fn __str__(&self) -> String {
        self.format("[IMPORT]")
    }

    fn __repr__(&self) -> String {
        format!(
            "ImportOutcome(token={}, status='{}', path_local={:?}, error_reason={:?})",
            self.token, self.status, self.path_local, self.error_reason
        )
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Source

/// Read `name` from a Python source object, calling it if it is a method.
fn read_source_attr<'py>(obj: &Bound<'py, PyAny>, name: &str) -> Option<Bound<'py, PyAny>> {
    let value = obj.getattr(name).ok()?;
    let value = if value.is_callable() {
        value.call0().ok()?
    } else {
        value
    };
    if value.is_none() { None } else { Some(value) }
}

/// Host-provided source object: `display_name`, `byte_size` (negative means
/// unknown), optional `time_modified` (epoch seconds) and `origin`, and
/// `open()` returning a stream with `read(n)`.
struct PySourceHandle<'py> {
    obj: Bound<'py, PyAny>,
}

impl SourceHandle for PySourceHandle<'_> {
    fn display_name(&self) -> Option<String> {
        read_source_attr(&self.obj, "display_name")?.extract().ok()
    }

    fn byte_size(&self) -> Option<u64> {
        let n_bytes: i64 = read_source_attr(&self.obj, "byte_size")?.extract().ok()?;
        u64::try_from(n_bytes).ok()
    }

    fn time_modified(&self) -> Option<SystemTime> {
        let n_secs: f64 = read_source_attr(&self.obj, "time_modified")?.extract().ok()?;
        UNIX_EPOCH.checked_add(Duration::try_from_secs_f64(n_secs).ok()?)
    }

    fn origin(&self) -> Option<String> {
        read_source_attr(&self.obj, "origin")?.extract().ok()
    }

    fn open(&self) -> Result<Box<dyn Read + '_>, ImportError> {
        let stream = self
            .obj
            .call_method0("open")
            .map_err(|e| ImportError::ExpiredHandle {
                reason: e.to_string(),
            })?;
        Ok(Box::new(PyReader { stream }))
    }
}

/// `Read` over a Python stream; closes the stream on drop when it can.
struct PyReader<'py> {
    stream: Bound<'py, PyAny>,
}

impl Read for PyReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self
            .stream
            .call_method1("read", (buf.len(),))
            .map_err(|e| io::Error::other(e.to_string()))?;
        if chunk.is_none() {
            return Ok(0);
        }
        let chunk = chunk
            .downcast::<PyBytes>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let bytes = chunk.as_bytes();
        if bytes.len() > buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("read({}) returned {} bytes", buf.len(), bytes.len()),
            ));
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }
}

impl Drop for PyReader<'_> {
    fn drop(&mut self) {
        if !self.stream.hasattr("close").unwrap_or(false) {
            return;
        }
        if let Err(e) = self.stream.call_method0("close") {
            warn!(error = %e, "failed to close source stream");
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

fn map_router_error(exception: RouterError) -> PyErr {
    match exception {
        RouterError::PickerFailed { .. } => PyRuntimeError::new_err(exception.to_string()),
        RouterError::DuplicateToken { .. }
        | RouterError::UnknownFamily { .. }
        | RouterError::DuplicateFamily { .. }
        | RouterError::Session(_) => PyValueError::new_err(exception.to_string()),
    }
}

fn map_session_error(exception: SessionBuildError) -> PyErr {
    map_router_error(RouterError::from(exception))
}

fn map_config_error(exception: ConfigError) -> PyErr {
    match exception {
        ConfigError::Read { ref path, ref source } => PyOSError::new_err(format!(
            "Failed to read config {}: {source}",
            path.display()
        )),
        ConfigError::Parse(ref source) => {
            PyValueError::new_err(format!("Failed to parse config: {source}"))
        }
        ConfigError::Invalid { .. } => PyValueError::new_err(exception.to_string()),
        ConfigError::Router(source) => map_router_error(source),
    }
}

fn map_log_error(exception: LogInitError) -> PyErr {
    match exception {
        LogInitError::Install(_) => PyRuntimeError::new_err(exception.to_string()),
        LogInitError::UnknownFormat(_) | LogInitError::InvalidLevel { .. } => {
            PyValueError::new_err(exception.to_string())
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DispatchChain

fn extract_dict_item<'py, T>(dict: &Bound<'py, PyDict>, key: &str) -> PyResult<Option<T>>
where
    T: FromPyObject<'py>,
{
    match dict.get_item(key)? {
        Some(value) if !value.is_none() => value.extract().map(Some),
        _ => Ok(None),
    }
}

fn extract_family(dict: &Bound<'_, PyDict>) -> PyResult<SpecFamilyConfig> {
    let name: String = extract_dict_item(dict, "name")?
        .ok_or_else(|| PyValueError::new_err("Family requires `name`"))?;
    let token_base: u64 = extract_dict_item(dict, "token_base")?
        .ok_or_else(|| PyValueError::new_err(format!("Family `{name}` requires `token_base`")))?;
    Ok(SpecFamilyConfig {
        name,
        token_base,
        dir_destination: extract_dict_item(dict, "dir_destination")?,
        ext_default: extract_dict_item(dict, "ext_default")?.unwrap_or_default(),
        patterns_accept: extract_dict_item(dict, "patterns_accept")?,
        if_preserve_mtime: extract_dict_item(dict, "if_preserve_mtime")?.unwrap_or(true),
        if_record_origin: extract_dict_item(dict, "if_record_origin")?.unwrap_or(false),
    })
}

/// Call each queued Python callable with its outcome.
///
/// Every callable runs even when an earlier one raised; the first exception
/// is returned to the host.
fn deliver_outcomes(py: Python<'_>, l_ready: Vec<(PyObject, SpecImportOutcome)>) -> PyResult<()> {
    let mut err_first = None;
    for (callback, outcome) in l_ready {
        let token = outcome.token();
        let res_call = Py::new(py, PyImportOutcome::from(outcome))
            .and_then(|obj| callback.call1(py, (obj,)));
        if let Err(e) = res_call {
            error!(token = %token, error = %e, "outcome callback raised");
            err_first.get_or_insert(e);
        }
    }
    match err_first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Pending imports for every configured family, bound to the creating thread.
///
/// Outcome callables are queued during dispatch and called after the chain
/// is released, so they may call back into it.
#[pyclass(name = "DispatchChain", unsendable)]
struct PyDispatchChain {
    chain: DispatchChain,
    queue_outcomes: OutcomeQueue<PyObject>,
}

impl PyDispatchChain {
    fn from_chain(chain: DispatchChain) -> Self {
        Self {
            chain,
            queue_outcomes: OutcomeQueue::new(),
        }
    }
}

#[pymethods]
impl PyDispatchChain {
    #[staticmethod]
    fn from_config(path_config: PathBuf) -> PyResult<Self> {
        let spec_config = load_config(&path_config).map_err(map_config_error)?;
        let chain = spec_config.build_chain().map_err(map_config_error)?;
        Ok(Self::from_chain(chain))
    }

    #[staticmethod]
    fn from_families(families: Vec<Bound<'_, PyDict>>) -> PyResult<Self> {
        let spec_config = SpecImportConfig {
            log: SpecLogConfig::default(),
            families: families
                .iter()
                .map(extract_family)
                .collect::<PyResult<Vec<_>>>()?,
        };
        spec_config.validate().map_err(map_config_error)?;
        let chain = spec_config.build_chain().map_err(map_config_error)?;
        Ok(Self::from_chain(chain))
    }

    #[getter]
    fn family_names(&self) -> Vec<String> {
        self.chain
            .family_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn allocate_token(&mut self, family: &str) -> PyResult<u64> {
        let token = self
            .chain
            .allocate_token(family)
            .map_err(map_router_error)?;
        Ok(token.get())
    }

    #[pyo3(signature = (family, token, callback, dir_destination = None))]
    fn register(
        &mut self,
        family: &str,
        token: u64,
        callback: PyObject,
        dir_destination: Option<PathBuf>,
    ) -> PyResult<()> {
        let mut spec_request = self
            .chain
            .router(family)
            .map_err(map_router_error)?
            .build_request(RequestToken::new(token));
        if let Some(dir_destination) = dir_destination {
            spec_request.dir_destination = dir_destination;
        }
        let session = ImportSession::new(spec_request, self.queue_outcomes.callback(callback))
            .map_err(map_session_error)?;
        self.chain
            .register(family, session)
            .map_err(map_router_error)
    }

    /// Deliver a picker result; `source=None` means the pick was cancelled.
    ///
    /// Returns the claiming family, or `None` when the host should fall back.
    /// The outcome callback runs after the chain is released; an exception it
    /// raises propagates from here.
    #[pyo3(signature = (token, source = None))]
    fn on_external_result(
        slf: &Bound<'_, Self>,
        token: u64,
        source: Option<Bound<'_, PyAny>>,
    ) -> PyResult<Option<String>> {
        let token = RequestToken::new(token);
        let (route, l_ready) = {
            let mut this = slf.borrow_mut();
            let route = match source {
                Some(obj) => {
                    let source = PySourceHandle { obj };
                    this.chain.dispatch(token, EnumPickEvent::Picked(&source))
                }
                None => this.chain.dispatch(token, EnumPickEvent::Cancelled),
            };
            (route, this.queue_outcomes.drain())
        };
        deliver_outcomes(slf.py(), l_ready)?;
        Ok(match route {
            EnumDispatchRoute::Claimed(family) => Some(family),
            EnumDispatchRoute::Fallback | EnumDispatchRoute::Unhandled => None,
        })
    }

    fn is_pending(&self, token: u64) -> bool {
        self.chain.is_pending(RequestToken::new(token))
    }

    fn pending_count(&self) -> usize {
        self.chain.pending_count()
    }

    fn reset(&mut self) {
        self.chain.reset();
    }

    fn __repr__(&self) -> String {
        format!(
            "DispatchChain(families={:?}, pending={})",
            self.chain.family_names(),
            self.chain.pending_count()
        )
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[pyfunction(name = "init_logging")]
#[pyo3(signature = (level = "info", format = "pretty"))]
fn init_logging_py(level: &str, format: &str) -> PyResult<()> {
    let spec_log = SpecLogConfig {
        level: level.to_string(),
        format: format.parse::<EnumLogFormat>().map_err(map_log_error)?,
    };
    init_logging(&spec_log).map_err(map_log_error)
}

#[pymodule]
fn _intakekit_io_import_rs(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyImportOutcome>()?;
    module.add_class::<PyDispatchChain>()?;
    module.add_function(wrap_pyfunction!(init_logging_py, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
