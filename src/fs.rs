//! Filesystem helpers used by the script host and the asset-facing script API.
//!
//! Every `std::io::Error` is translated into the engine's error taxonomy here, at
//! the point it crosses into the core.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Directory,
    File,
    Other,
}

pub(crate) fn translate_io_error(err: &io::Error, path: &Path) -> EngineError {
    let path = path.display().to_string();
    match err.kind() {
        io::ErrorKind::PermissionDenied => EngineError::FsNoAccess { path },
        io::ErrorKind::NotFound => EngineError::FsNoEntry { path },
        io::ErrorKind::NotADirectory => EngineError::FsNotADir { path },
        io::ErrorKind::IsADirectory => EngineError::FsNotAFile { path },
        io::ErrorKind::OutOfMemory => EngineError::NoMemory,
        io::ErrorKind::UnexpectedEof | io::ErrorKind::Interrupted => EngineError::Io,
        _ => EngineError::FsGeneric { path },
    }
}

/// Reads the whole file into memory. The buffer length is the file size.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let meta = fs::metadata(path).map_err(|err| translate_io_error(&err, path))?;
    if meta.is_dir() {
        return Err(EngineError::FsNotAFile { path: path.display().to_string() });
    }
    fs::read(path).map_err(|err| translate_io_error(&err, path))
}

pub fn path_exists(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).is_ok()
}

pub fn file_type(path: impl AsRef<Path>) -> Result<FileType> {
    let path = path.as_ref();
    let meta = fs::metadata(path).map_err(|err| translate_io_error(&err, path))?;
    let kind = meta.file_type();
    Ok(if kind.is_dir() {
        FileType::Directory
    } else if kind.is_file() {
        FileType::File
    } else {
        FileType::Other
    })
}

/// Lists the entry names of a directory. Order is whatever the OS yields.
pub fn list_dir(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let entries = fs::read_dir(path).map_err(|err| translate_io_error(&err, path))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| translate_io_error(&err, path))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Joins path segments with `/`. A single segment is returned unchanged.
pub fn path_join<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::new();
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            out.push('/');
        }
        out.push_str(part.as_ref());
    }
    out
}
