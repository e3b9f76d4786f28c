//! Chunked byte copy into a temporary sibling, renamed into place on success.

use std::io::{self, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::conf::{C_TEMP_FILE_PREFIX, C_TEMP_FILE_SUFFIX, N_BYTES_COPY_CHUNK};
use crate::spec::ImportError;

fn copy_error(path_file_dst: &Path, source: io::Error) -> ImportError {
    ImportError::CopyError {
        path: path_file_dst.to_path_buf(),
        source,
    }
}

pub(crate) fn transfer_chunks<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0_u8; N_BYTES_COPY_CHUNK];
    let mut n_bytes_total = 0_u64;
    loop {
        let n_read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n_read])?;
        n_bytes_total += n_read as u64;
    }
    writer.flush()?;
    Ok(n_bytes_total)
}

/// Stream `reader` into `path_file_dst` and return the number of bytes copied.
///
/// Bytes go to a hidden `.intake-<random>.part` file in the same directory,
/// which is synced and then renamed onto `path_file_dst`. The rename never
/// replaces an existing entry. Any read, write or rename failure drops the
/// temporary file, so the final path never holds a truncated file. The
/// caller owns `reader` and releases it on return.
pub fn copy_stream<R>(reader: &mut R, path_file_dst: &Path) -> Result<u64, ImportError>
where
    R: Read + ?Sized,
{
    let path_dir_parent = path_file_dst
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if path_file_dst.file_name().is_none() {
        return Err(copy_error(
            path_file_dst,
            io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"),
        ));
    }

    let mut file_temp = tempfile::Builder::new()
        .prefix(C_TEMP_FILE_PREFIX)
        .suffix(C_TEMP_FILE_SUFFIX)
        .tempfile_in(path_dir_parent)
        .map_err(|e| copy_error(path_file_dst, e))?;

    let n_bytes_copied =
        transfer_chunks(reader, file_temp.as_file_mut()).map_err(|e| copy_error(path_file_dst, e))?;
    file_temp
        .as_file()
        .sync_all()
        .map_err(|e| copy_error(path_file_dst, e))?;
    file_temp
        .persist_noclobber(path_file_dst)
        .map_err(|e| copy_error(path_file_dst, e.error))?;

    debug!(
        path = %path_file_dst.display(),
        bytes = n_bytes_copied,
        "stream copied"
    );
    Ok(n_bytes_copied)
}
