//! Import constants shared by the resolver, copier and session.

/// Chunk size used when streaming source bytes to disk.
pub const N_BYTES_COPY_CHUNK: usize = 64 * 1024;

/// Maximum number of candidate names probed for one import, the desired
/// name included (`a.ext`, `a_1.ext`, ..., `a_999.ext`).
pub const N_NAME_CANDIDATES_MAX: u32 = 1000;

/// Longest file name, in bytes, accepted by common filesystems.
pub const N_NAME_BYTES_MAX: usize = 255;

/// Prefix for names synthesized when the source has no usable display name.
pub const C_SYNTHETIC_NAME_PREFIX: &str = "imported_";

/// Separator placed between a stem and its collision counter.
pub const C_COLLISION_SEPARATOR: &str = "_";

/// Prefix for in-flight temporary files (hidden on unix). The destination
/// name is not embedded, so a temp name stays short for any final name.
pub const C_TEMP_FILE_PREFIX: &str = ".intake-";

/// Suffix for in-flight temporary files.
pub const C_TEMP_FILE_SUFFIX: &str = ".part";

/// Extended attribute used to record where an imported file came from.
pub const C_XATTR_ORIGIN_URL: &str = "user.xdg.origin.url";

/// Directory under the platform data dir used when a family has no
/// explicit destination.
pub const C_DATA_DIR_APP_NAME: &str = "intakekit";

/// Notification id used for import outcome notifications.
pub const N_NOTIFICATION_ID_IMPORT: u32 = 1002;

pub const C_NOTIFY_TITLE_SUCCESS: &str = "Import Complete";
pub const C_NOTIFY_TITLE_FAILURE: &str = "Import Failed";
