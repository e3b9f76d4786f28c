//! Import report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

/// Counters and diagnostics for one import session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReportImport {
    /// Bytes streamed into the destination (0 on reuse, cancel or failure).
    pub cnt_bytes_copied: u64,
    /// Candidate destination names probed by the resolver.
    pub cnt_candidates_probed: u64,
    /// Size the source declared, when it declared one.
    pub size_declared: Option<u64>,
    /// Non-fatal warnings (name mismatch, size mismatch, metadata).
    pub warnings: Vec<String>,
}

impl ReportImport {
    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_bytes_copied".to_string(), self.cnt_bytes_copied);
        dict_counts.insert(
            "cnt_candidates_probed".to_string(),
            self.cnt_candidates_probed,
        );
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let c_size_declared = self
            .size_declared
            .map_or_else(|| "unknown".to_string(), |n| n.to_string());
        format!(
            "{prefix} bytes={} declared={c_size_declared} candidates={} warnings={}",
            self.cnt_bytes_copied,
            self.cnt_candidates_probed,
            self.warning_count()
        )
    }
}

impl fmt::Display for ReportImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[IMPORT]"))
    }
}

/// Mutable accumulator filled in while a session runs.
#[derive(Debug, Default, Clone)]
pub struct ReportImportBuilder {
    /// See [`ReportImport::cnt_bytes_copied`].
    pub cnt_bytes_copied: u64,
    /// See [`ReportImport::cnt_candidates_probed`].
    pub cnt_candidates_probed: u64,
    /// See [`ReportImport::size_declared`].
    pub size_declared: Option<u64>,
    /// See [`ReportImport::warnings`].
    pub warnings: Vec<String>,
}

impl ReportImportBuilder {
    pub fn add_bytes_copied(&mut self, n_bytes: u64) {
        self.cnt_bytes_copied += n_bytes;
    }

    pub fn set_candidates_probed(&mut self, n_candidates: u32) {
        self.cnt_candidates_probed = u64::from(n_candidates);
    }

    pub fn set_size_declared(&mut self, size_declared: Option<u64>) {
        self.size_declared = size_declared;
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportImport {
        ReportImport {
            cnt_bytes_copied: self.cnt_bytes_copied,
            cnt_candidates_probed: self.cnt_candidates_probed,
            size_declared: self.size_declared,
            warnings: self.warnings,
        }
    }
}
