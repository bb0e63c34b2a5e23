pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod fs;
pub mod input;
pub mod logging;
pub mod renderer;
pub mod scripts;
pub mod sprite;
pub mod time;

pub use engine::{Engine, EngineState};
pub use error::{EngineError, ErrorCode, Result};
