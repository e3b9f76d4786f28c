//! Destination name resolution: write, reuse or rename.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::conf::{C_COLLISION_SEPARATOR, N_NAME_BYTES_MAX, N_NAME_CANDIDATES_MAX};
use crate::spec::{EnumImportAction, ImportError, SpecResolvedDestination};
use crate::util::{
    derive_candidate_name, derive_synthetic_name, ensure_extension, normalize_extension,
    sanitize_file_name, split_stem_extension, truncate_file_name,
};

enum EnumCandidateProbe {
    Vacant,
    RegularFile { n_bytes: u64 },
    /// Directory, symlink or special file.
    Occupied,
    /// The path could not be inspected; never treated as a collision.
    Failed(io::Error),
}

fn probe_candidate(path_candidate: &Path) -> EnumCandidateProbe {
    match fs::symlink_metadata(path_candidate) {
        Ok(meta) if meta.file_type().is_file() => EnumCandidateProbe::RegularFile {
            n_bytes: meta.len(),
        },
        Ok(_) => EnumCandidateProbe::Occupied,
        Err(e) if e.kind() == io::ErrorKind::NotFound => EnumCandidateProbe::Vacant,
        Err(e) => EnumCandidateProbe::Failed(e),
    }
}

fn probe_failure(
    dir_destination: &Path,
    path_candidate: &Path,
    source: io::Error,
) -> ImportError {
    if source.kind() == io::ErrorKind::PermissionDenied {
        return ImportError::DirectoryUnavailable {
            path: dir_destination.to_path_buf(),
            source,
        };
    }
    ImportError::CopyError {
        path: path_candidate.to_path_buf(),
        source,
    }
}

/// Longest name kept before collision renaming, leaving room for the widest
/// `_<counter>` suffix.
fn n_bytes_name_max() -> usize {
    let n_bytes_suffix =
        C_COLLISION_SEPARATOR.len() + (N_NAME_CANDIDATES_MAX - 1).to_string().len();
    N_NAME_BYTES_MAX - n_bytes_suffix
}

/// Decide where an import lands inside `dir_destination`.
///
/// 1. Missing or unusable names become `imported_<millis><ext>`.
/// 2. `ext_default` is appended unless the name already ends with it
///    (case-insensitive).
///    Over-long names are shortened, extension kept, so every candidate fits
///    in [`N_NAME_BYTES_MAX`] bytes.
/// 3. The directory is created when missing; failure is `DirectoryUnavailable`.
/// 4. A vacant desired path is written.
/// 5. An existing regular file whose size equals `size_known` is reused. An
///    unknown size never reuses.
/// 6. Otherwise `stem_1.ext`, `stem_2.ext`, ... are probed; after
///    [`N_NAME_CANDIDATES_MAX`] candidates the call fails with
///    `TooManyCollisions`.
///
/// Ordinary collisions never error. A candidate that cannot be inspected
/// fails the call with `DirectoryUnavailable` (permission denied) or
/// `CopyError`.
pub fn resolve_destination(
    name_desired: Option<&str>,
    dir_destination: &Path,
    ext_default: &str,
    size_known: Option<u64>,
) -> Result<SpecResolvedDestination, ImportError> {
    let c_ext = normalize_extension(ext_default);
    let name_base = name_desired
        .and_then(sanitize_file_name)
        .unwrap_or_else(|| derive_synthetic_name(&c_ext));
    let name_file = truncate_file_name(
        &ensure_extension(&name_base, &c_ext),
        &c_ext,
        n_bytes_name_max(),
    );

    fs::create_dir_all(dir_destination).map_err(|e| ImportError::DirectoryUnavailable {
        path: dir_destination.to_path_buf(),
        source: e,
    })?;

    let path_candidate = dir_destination.join(&name_file);
    match probe_candidate(&path_candidate) {
        EnumCandidateProbe::Vacant => {
            return Ok(SpecResolvedDestination {
                path_file_final: path_candidate,
                rule_action: EnumImportAction::Write,
                n_candidates_probed: 1,
            });
        }
        EnumCandidateProbe::RegularFile { n_bytes } if size_known == Some(n_bytes) => {
            debug!(
                path = %path_candidate.display(),
                bytes = n_bytes,
                "identity match; reusing existing file"
            );
            return Ok(SpecResolvedDestination {
                path_file_final: path_candidate,
                rule_action: EnumImportAction::Reuse,
                n_candidates_probed: 1,
            });
        }
        EnumCandidateProbe::Failed(e) => {
            return Err(probe_failure(dir_destination, &path_candidate, e));
        }
        EnumCandidateProbe::RegularFile { .. } | EnumCandidateProbe::Occupied => {}
    }

    let (stem, ext) = split_stem_extension(&name_file, &c_ext);
    for n_counter in 1..N_NAME_CANDIDATES_MAX {
        let path_candidate = dir_destination.join(derive_candidate_name(stem, ext, n_counter));
        match probe_candidate(&path_candidate) {
            EnumCandidateProbe::Vacant => {
                debug!(
                    name = %name_file,
                    path = %path_candidate.display(),
                    "name taken; using unique candidate"
                );
                return Ok(SpecResolvedDestination {
                    path_file_final: path_candidate,
                    rule_action: EnumImportAction::Write,
                    n_candidates_probed: n_counter + 1,
                });
            }
            EnumCandidateProbe::Failed(e) => {
                return Err(probe_failure(dir_destination, &path_candidate, e));
            }
            EnumCandidateProbe::RegularFile { .. } | EnumCandidateProbe::Occupied => {}
        }
    }

    Err(ImportError::TooManyCollisions {
        dir: dir_destination.to_path_buf(),
        name: name_file,
        n_candidates: N_NAME_CANDIDATES_MAX,
    })
}
