use std::fmt;

/// Stable result code for every failure the engine core can report.
///
/// `Ok` exists so callers bridging to status-code style APIs (exit codes,
/// script-visible results) have a value for success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    NoMemory,
    Io,
    InitFailure,
    BackendFailure,
    FsNoAccess,
    FsNoEntry,
    FsNotADir,
    FsNotAFile,
    FsGeneric,
    RenderQueueFull,
    RenderBadNode,
    RenderBadFrame,
    ScriptInitFailure,
    ScriptCompileFailure,
    ScriptExecFailure,
    ScriptBadEntryPoint,
}

impl ErrorCode {
    pub fn label(self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::NoMemory => "no_memory",
            ErrorCode::Io => "io",
            ErrorCode::InitFailure => "init_failure",
            ErrorCode::BackendFailure => "backend_failure",
            ErrorCode::FsNoAccess => "fs_no_access",
            ErrorCode::FsNoEntry => "fs_no_entry",
            ErrorCode::FsNotADir => "fs_not_a_dir",
            ErrorCode::FsNotAFile => "fs_not_a_file",
            ErrorCode::FsGeneric => "fs_generic",
            ErrorCode::RenderQueueFull => "render_queue_full",
            ErrorCode::RenderBadNode => "render_bad_node",
            ErrorCode::RenderBadFrame => "render_bad_frame",
            ErrorCode::ScriptInitFailure => "script_init_failure",
            ErrorCode::ScriptCompileFailure => "script_compile_failure",
            ErrorCode::ScriptExecFailure => "script_exec_failure",
            ErrorCode::ScriptBadEntryPoint => "script_bad_entry_point",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Every error crossing the engine core boundary.
///
/// Interpreter details attached to script failures are only populated in
/// debug builds; release builds report the bare code.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("out of memory")]
    NoMemory,
    #[error("i/o error")]
    Io,
    #[error("initialization failed: {0}")]
    InitFailure(String),
    #[error("render backend failure: {0}")]
    BackendFailure(String),
    #[error("permission denied: {path}")]
    FsNoAccess { path: String },
    #[error("no such file or directory: {path}")]
    FsNoEntry { path: String },
    #[error("not a directory: {path}")]
    FsNotADir { path: String },
    #[error("not a file: {path}")]
    FsNotAFile { path: String },
    #[error("filesystem error on {path}")]
    FsGeneric { path: String },
    #[error("render pool is full ({capacity} slots)")]
    RenderQueueFull { capacity: usize },
    #[error("invalid render node handle")]
    RenderBadNode,
    #[error("sprite frame {frame} is out of range for a sheet with {frames} frames")]
    RenderBadFrame { frame: usize, frames: usize },
    #[error("script host is not initialized")]
    ScriptInitFailure,
    #[error("failed to compile script {path}{}", detail_suffix(.detail))]
    ScriptCompileFailure { path: String, detail: Option<String> },
    #[error("script execution failed in {path}{}", detail_suffix(.detail))]
    ScriptExecFailure { path: String, detail: Option<String> },
    #[error("entry point '{name}' in {path} is not callable")]
    ScriptBadEntryPoint { path: String, name: &'static str },
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {detail}"),
        None => String::new(),
    }
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::NoMemory => ErrorCode::NoMemory,
            EngineError::Io => ErrorCode::Io,
            EngineError::InitFailure(_) => ErrorCode::InitFailure,
            EngineError::BackendFailure(_) => ErrorCode::BackendFailure,
            EngineError::FsNoAccess { .. } => ErrorCode::FsNoAccess,
            EngineError::FsNoEntry { .. } => ErrorCode::FsNoEntry,
            EngineError::FsNotADir { .. } => ErrorCode::FsNotADir,
            EngineError::FsNotAFile { .. } => ErrorCode::FsNotAFile,
            EngineError::FsGeneric { .. } => ErrorCode::FsGeneric,
            EngineError::RenderQueueFull { .. } => ErrorCode::RenderQueueFull,
            EngineError::RenderBadNode => ErrorCode::RenderBadNode,
            EngineError::RenderBadFrame { .. } => ErrorCode::RenderBadFrame,
            EngineError::ScriptInitFailure => ErrorCode::ScriptInitFailure,
            EngineError::ScriptCompileFailure { .. } => ErrorCode::ScriptCompileFailure,
            EngineError::ScriptExecFailure { .. } => ErrorCode::ScriptExecFailure,
            EngineError::ScriptBadEntryPoint { .. } => ErrorCode::ScriptBadEntryPoint,
        }
    }

    /// Interpreter-provided failure detail, if this build keeps it.
    pub fn script_detail(&self) -> Option<&str> {
        match self {
            EngineError::ScriptCompileFailure { detail, .. } | EngineError::ScriptExecFailure { detail, .. } => {
                detail.as_deref()
            }
            _ => None,
        }
    }
}

/// Keeps interpreter detail only in diagnostic builds.
pub(crate) fn diagnostic(detail: impl fmt::Display) -> Option<String> {
    if cfg!(debug_assertions) {
        Some(detail.to_string())
    } else {
        None
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
