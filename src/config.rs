use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_POOL_CAPACITY: usize = 2048;

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "WindowConfig::default_vsync")]
    pub vsync: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "RenderConfig::default_pool_capacity")]
    pub pool_capacity: usize,
    #[serde(default = "RenderConfig::default_clear_color")]
    pub clear_color: [u8; 4],
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "ScriptConfig::default_main")]
    pub main: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `env_logger` filter directives, e.g. `"info,ember::script=debug"`.
    /// `RUST_LOG` applies when unset.
    #[serde(default)]
    pub filter: Option<String>,
    /// Level used when neither `filter` nor `RUST_LOG` is set.
    #[serde(default = "LogConfig::default_level")]
    pub level: String,
    #[serde(default = "LogConfig::default_color")]
    pub color: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub script: ScriptConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub script: Option<String>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "Ember".to_string(), width: 800, height: 600, vsync: Self::default_vsync() }
    }
}

impl WindowConfig {
    const fn default_vsync() -> bool {
        true
    }
}

impl RenderConfig {
    const fn default_pool_capacity() -> usize {
        DEFAULT_POOL_CAPACITY
    }

    const fn default_clear_color() -> [u8; 4] {
        [0, 0, 0, 255]
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { pool_capacity: Self::default_pool_capacity(), clear_color: Self::default_clear_color() }
    }
}

impl ScriptConfig {
    fn default_main() -> String {
        "demos/defense/main.rhai".to_string()
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self { main: Self::default_main() }
    }
}

impl LogConfig {
    fn default_level() -> String {
        "info".to_string()
    }

    const fn default_color() -> bool {
        true
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { filter: None, level: Self::default_level(), color: Self::default_color() }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!(target: "ember::engine", "Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &EngineConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(script) = &overrides.script {
            self.script.main = script.clone();
        }
    }
}

impl EngineConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.vsync.is_none() && self.script.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.vsync.is_some() {
            fields.push("vsync");
        }
        if self.script.is_some() {
            fields.push("script");
        }
        fields
    }
}
