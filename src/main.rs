use anyhow::{Context, Result};
use ember_engine::cli::CliOverrides;
use ember_engine::config::{EngineConfig, LogConfig};
use ember_engine::input::{EventSource, HeadlessEvents};
use ember_engine::logging::init_logging;
use ember_engine::renderer::{CanvasBackend, RenderBackend};
use ember_engine::Engine;

const DEFAULT_CONFIG_PATH: &str = "config/ember.json";

fn main() {
    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(cli) {
        if cfg!(debug_assertions) {
            eprintln!("Application error: {err:?}");
        } else {
            eprintln!("Application error: {err:#}");
        }
        std::process::exit(1);
    }
}

fn run(cli: CliOverrides) -> Result<()> {
    let config_path = cli.config_path().unwrap_or(DEFAULT_CONFIG_PATH).to_string();
    let loaded = EngineConfig::load(&config_path);
    match &loaded {
        Ok(cfg) => init_logging(&cfg.logging),
        Err(_) => init_logging(&LogConfig::default()),
    }

    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(err) if cli.config_path().is_some() => return Err(err),
        Err(err) => {
            log::warn!(target: "ember::engine", "Config load error: {err:#}. Falling back to defaults.");
            EngineConfig::default()
        }
    };
    let headless = cli.headless();
    let frames = cli.frames();
    let overrides = cli.into_config_overrides();
    if !overrides.is_empty() {
        log::info!(target: "ember::engine", "CLI overrides applied: {}", overrides.applied_fields().join(", "));
    }
    config.apply_overrides(&overrides);

    if headless {
        let backend = CanvasBackend::new(config.render.clear_color);
        return run_engine(backend, HeadlessEvents::new(frames), &config);
    }
    run_windowed(&config)
}

#[cfg(feature = "window")]
fn run_windowed(config: &EngineConfig) -> Result<()> {
    let (mut backend, events) = ember_engine::renderer::window::open(&config.window).context("Failed to open window")?;
    backend.set_clear_color(config.render.clear_color);
    run_engine(backend, events, config)
}

#[cfg(not(feature = "window"))]
fn run_windowed(config: &EngineConfig) -> Result<()> {
    run_engine(CanvasBackend::new(config.render.clear_color), HeadlessEvents::new(None), config)
}

fn run_engine<B: RenderBackend, E: EventSource>(backend: B, events: E, config: &EngineConfig) -> Result<()> {
    let mut engine = Engine::new(backend, events, config.render.pool_capacity);
    engine.init(config.window.width, config.window.height).context("Failed to initialize engine")?;

    let script_path = &config.script.main;
    let mut unit = engine.load_script(script_path).with_context(|| format!("Failed to load script {script_path}"))?;
    engine.invoke_init(&mut unit).context("Script init failed")?;
    engine.run_script(&mut unit).context("Frame loop failed")?;
    engine.invoke_fini(&mut unit).context("Script fini failed")?;
    engine.free_script(Some(unit));
    engine.fini();
    Ok(())
}
