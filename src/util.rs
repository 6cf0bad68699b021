//! Utility functions used in all other tractmap modules.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Result, TractmapError};

use byteordered::byteorder::ReadBytesExt;

/// Check whether the file extension ends with ".gz".
pub fn is_gz_file<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    path.as_ref()
        .file_name()
        .map(|a| a.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false)
}


/// Read a fixed length zero-terminated byte string of the given length from the input. Embedded '\0' chars are allowed, but not added to the returned String.
pub fn read_fixed_length_string<S>(input: &mut S, len: usize) -> Result<String>
where
    S: Read,
{
    let mut info_line = String::with_capacity(len);
    for _ in 0..len {
        let cur_char = input.read_u8()? as char;
        if cur_char != '\0' {
            info_line.push(cur_char);
        }
    }
    Ok(info_line)
}


/// Encode a string into a zero-padded byte field of the given length, truncating if needed.
pub fn fixed_length_bytes(value: &str, len: usize) -> Vec<u8> {
    let mut field: Vec<u8> = value.bytes().take(len).collect();
    field.resize(len, 0);
    field
}


/// The file name without directory and without its last extension, e.g. `cluster_00001` for `/a/cluster_00001.vtp`.
pub fn file_stem_string<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}


/// The stem of a streamline file, ignoring a trailing `.gz`: `cluster_00001` for `cluster_00001.trk.gz`.
pub fn streamline_stem<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    if is_gz_file(path) {
        file_stem_string(path.with_extension(""))
    } else {
        file_stem_string(path)
    }
}


/// Name `path` in the errors raised while reading it.
pub fn in_file<T, P: AsRef<Path>>(path: P, result: Result<T>) -> Result<T> {
    let path = path.as_ref();
    result.map_err(|e| match e {
        TractmapError::Io(err) => TractmapError::ReadFile(path.to_path_buf(), err),
        TractmapError::InvalidTrkFormat(reason) => {
            TractmapError::InvalidTrkFormat(format!("{}: {}", path.display(), reason))
        }
        other => other,
    })
}


/// Fail with [`TractmapError::MissingInput`] unless the path exists.
pub fn require_exists<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.exists() {
        Ok(path.to_path_buf())
    } else {
        Err(TractmapError::MissingInput(path.to_path_buf()))
    }
}
