use std::path::Path;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::conf::{C_COLLISION_SEPARATOR, C_SYNTHETIC_NAME_PREFIX};
use crate::report::ReportImportBuilder;
use crate::spec::SessionBuildError;

////////////////////////////////////////////////////////////////////////////////
// #region NameHandling

static RE_UNSAFE_NAME_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[/\\:*?"<>|\x00-\x1F\x7F]"#).expect("unsafe name chars regex")
});

/// Turn an untrusted display name into a single safe path component.
///
/// Returns `None` when nothing usable is left (empty, only dots, only spaces).
pub(crate) fn sanitize_file_name(name_raw: &str) -> Option<String> {
    let c_replaced = RE_UNSAFE_NAME_CHARS.replace_all(name_raw, "_");
    let c_trimmed = c_replaced.trim().trim_start_matches('.').trim_end();
    if c_trimmed.is_empty() {
        return None;
    }
    Some(c_trimmed.to_string())
}

/// Normalize a default extension to `.ext` form; empty stays empty.
pub(crate) fn normalize_extension(ext_raw: &str) -> String {
    let c_ext = ext_raw.trim();
    if c_ext.is_empty() || c_ext == "." {
        return String::new();
    }
    if c_ext.starts_with('.') {
        c_ext.to_string()
    } else {
        format!(".{c_ext}")
    }
}

/// Split `name` into `(stem, ext)` when it ends with `ext` (case-insensitive).
fn _split_known_extension<'a>(name: &'a str, ext: &str) -> Option<(&'a str, &'a str)> {
    if ext.is_empty() || name.len() <= ext.len() {
        return None;
    }
    let n_idx_ext = name.len() - ext.len();
    let c_tail = name.get(n_idx_ext..)?;
    if c_tail.to_lowercase() != ext.to_lowercase() {
        return None;
    }
    Some(name.split_at(n_idx_ext))
}

/// Append `ext` unless the name already ends with it (case-insensitive).
pub(crate) fn ensure_extension(name: &str, ext: &str) -> String {
    if ext.is_empty() || _split_known_extension(name, ext).is_some() {
        return name.to_string();
    }
    format!("{name}{ext}")
}

/// Split a file name for collision renaming.
///
/// The default extension wins when present so that multi-dot extensions
/// (`.tar.gz`) stay intact; otherwise the last dot after the first
/// character splits the name.
pub(crate) fn split_stem_extension<'a>(name: &'a str, ext_default: &str) -> (&'a str, &'a str) {
    if let Some(tuple_parts) = _split_known_extension(name, ext_default) {
        return tuple_parts;
    }
    match name.rfind('.') {
        Some(n_idx_dot) if n_idx_dot > 0 => name.split_at(n_idx_dot),
        _ => (name, ""),
    }
}

fn _truncate_on_char_boundary(text: &str, n_bytes_max: usize) -> &str {
    let mut n_idx = n_bytes_max.min(text.len());
    while !text.is_char_boundary(n_idx) {
        n_idx -= 1;
    }
    &text[..n_idx]
}

/// Shorten `name` to at most `n_bytes_max` bytes.
///
/// The stem is cut on a char boundary and the extension is kept. When the
/// extension alone does not fit, the whole name is cut instead.
pub(crate) fn truncate_file_name(name: &str, ext_default: &str, n_bytes_max: usize) -> String {
    if name.len() <= n_bytes_max {
        return name.to_string();
    }
    let (stem, ext) = split_stem_extension(name, ext_default);
    if ext.len() < n_bytes_max {
        let c_stem = _truncate_on_char_boundary(stem, n_bytes_max - ext.len()).trim_end();
        if !c_stem.is_empty() {
            return format!("{c_stem}{ext}");
        }
    }
    _truncate_on_char_boundary(name, n_bytes_max).to_string()
}

pub(crate) fn derive_candidate_name(stem: &str, ext: &str, n_counter: u32) -> String {
    format!("{stem}{C_COLLISION_SEPARATOR}{n_counter}{ext}")
}

/// Name used when the source offers no usable display name.
pub(crate) fn derive_synthetic_name(ext: &str) -> String {
    let n_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{C_SYNTHETIC_NAME_PREFIX}{n_millis}{ext}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region AcceptPatterns

pub(crate) fn compile_accept_patterns(
    patterns: Option<&[String]>,
) -> Result<Option<GlobSet>, SessionBuildError> {
    let Some(patterns) = patterns else {
        return Ok(None);
    };
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder_globs = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .map_err(|e| SessionBuildError::InvalidPattern {
                pattern: pattern.clone(),
                source: e,
            })?;
        builder_globs.add(glob);
    }
    let glob_set = builder_globs
        .build()
        .map_err(|e| SessionBuildError::InvalidPattern {
            pattern: patterns.join(","),
            source: e,
        })?;
    Ok(Some(glob_set))
}

pub(crate) fn is_name_accepted(name: &str, glob_set: Option<&GlobSet>) -> bool {
    match glob_set {
        None => true,
        Some(v) => v.is_match(name),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Metadata

/// Best-effort metadata carried over from the source. Failures are recorded
/// as report warnings and never fail the import.
pub(crate) fn apply_source_metadata(
    path_file: &Path,
    time_modified: Option<SystemTime>,
    origin: Option<&str>,
    builder_report: &mut ReportImportBuilder,
) {
    if let Some(time_modified) = time_modified {
        let file_time_modify = filetime::FileTime::from_system_time(time_modified);
        if let Err(e) = filetime::set_file_mtime(path_file, file_time_modify) {
            builder_report.add_warning(format!(
                "Failed to set modification time on {} ({e})",
                path_file.display()
            ));
        }
    }

    if let Some(origin) = origin {
        record_origin(path_file, origin, builder_report);
    }
}

#[cfg(target_os = "linux")]
fn record_origin(path_file: &Path, origin: &str, builder_report: &mut ReportImportBuilder) {
    use crate::conf::C_XATTR_ORIGIN_URL;

    if let Err(e) = xattr::set(path_file, C_XATTR_ORIGIN_URL, origin.as_bytes()) {
        builder_report.add_warning(format!(
            "Failed to record origin on {} ({e})",
            path_file.display()
        ));
    }
}

#[cfg(not(target_os = "linux"))]
fn record_origin(_path_file: &Path, _origin: &str, _builder_report: &mut ReportImportBuilder) {}

// #endregion
////////////////////////////////////////////////////////////////////////////////
