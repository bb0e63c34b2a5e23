//! Frame scheduler and the owning context for one running engine.
//!
//! `Engine` acquires the render backend and then the script interpreter in
//! `init`, drives pump → update → clear → draw → present in `run`, and releases
//! everything in reverse order in `fini`. It is `!Send`; the pool and input
//! state are shared with script closures through `Rc`.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::error::{EngineError, Result};
use crate::input::{EventSource, InputEvent, InputState};
use crate::renderer::{RenderBackend, RenderPool};
use crate::scripts::{ScriptBindings, ScriptHost, ScriptUnit};
use crate::time::FrameClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Running,
    /// Terminal. Reached when the loop ends or the engine is torn down.
    Stopped,
}

pub struct Engine<B: RenderBackend, E: EventSource> {
    state: EngineState,
    initialized: bool,
    backend: B,
    events: E,
    scripts: ScriptHost,
    pool: Rc<RefCell<RenderPool>>,
    input: Rc<RefCell<InputState>>,
    clock: FrameClock,
    pending: Vec<InputEvent>,
}

impl<B: RenderBackend, E: EventSource> Engine<B, E> {
    pub fn new(backend: B, events: E, pool_capacity: usize) -> Self {
        Self {
            state: EngineState::NotStarted,
            initialized: false,
            backend,
            events,
            scripts: ScriptHost::new(),
            pool: Rc::new(RefCell::new(RenderPool::new(pool_capacity))),
            input: Rc::new(RefCell::new(InputState::new())),
            clock: FrameClock::new(),
            pending: Vec::new(),
        }
    }

    /// Opens the backend, then starts the interpreter. A second call while
    /// running is a no-op; a stopped engine cannot be restarted.
    pub fn init(&mut self, width: u32, height: u32) -> Result<()> {
        match self.state {
            EngineState::Running => return Ok(()),
            EngineState::Stopped => return Err(EngineError::InitFailure("engine has already been shut down".into())),
            EngineState::NotStarted => {}
        }

        self.backend.open(width, height)?;
        let bindings = self.bindings();
        if let Err(err) = self.scripts.init(&bindings) {
            self.backend.close();
            return Err(err);
        }

        self.initialized = true;
        self.state = EngineState::Running;
        log::info!(target: "ember::engine", "engine initialized at {width}x{height}");
        Ok(())
    }

    /// Runs the frame loop until quit is requested or `callback` returns false.
    pub fn run(&mut self, callback: Option<&mut dyn FnMut(f32) -> bool>) -> Result<()> {
        match callback {
            Some(callback) => self.frame_loop(|_, dt| Ok(callback(dt))),
            None => self.frame_loop(|_, _| Ok(true)),
        }
    }

    /// Runs the frame loop with `unit`'s `update` entry point as the per-frame
    /// callback. A script failure stops the loop and is returned.
    pub fn run_script(&mut self, unit: &mut ScriptUnit) -> Result<()> {
        self.frame_loop(|scripts, dt| scripts.invoke_update(unit, dt).map(|_| true))
    }

    fn frame_loop<F>(&mut self, mut update: F) -> Result<()>
    where
        F: FnMut(&ScriptHost, f32) -> Result<bool>,
    {
        match self.state {
            EngineState::NotStarted => return Err(EngineError::InitFailure("engine is not initialized".into())),
            EngineState::Stopped => return Ok(()),
            EngineState::Running => {}
        }

        self.clock.reset();
        let first_frame = self.clock.frame_index();
        while self.state == EngineState::Running {
            match self.tick(&mut update) {
                Ok(true) => {}
                Ok(false) => self.state = EngineState::Stopped,
                Err(err) => {
                    self.state = EngineState::Stopped;
                    log::error!(target: "ember::engine", "frame loop aborted: {err}");
                    return Err(err);
                }
            }
        }
        log::info!(
            target: "ember::engine",
            "frame loop stopped after {} frames",
            self.clock.frame_index() - first_frame
        );
        Ok(())
    }

    /// One frame. Returns false when the loop should end after this tick.
    fn tick<F>(&mut self, update: &mut F) -> Result<bool>
    where
        F: FnMut(&ScriptHost, f32) -> Result<bool>,
    {
        if self.pump_input()? {
            log::debug!(target: "ember::engine", "quit requested");
            return Ok(false);
        }

        let dt = self.clock.tick();
        let keep_running = update(&self.scripts, dt)?;

        let pool = self.pool.borrow();
        pool.clear(&mut self.backend)?;
        pool.present(&mut self.backend)?;
        Ok(keep_running)
    }

    /// Drains pending events into the key cache. Returns true on quit.
    fn pump_input(&mut self) -> Result<bool> {
        self.pending.clear();
        self.events.pump(&mut self.pending)?;
        let mut input = self.input.borrow_mut();
        let mut quit = false;
        for event in &self.pending {
            match event {
                InputEvent::Quit => quit = true,
                key => input.apply(key),
            }
        }
        Ok(quit)
    }

    /// Tears down the interpreter, then the render target and backend. Runs at
    /// most once; later calls and calls before `init` do nothing.
    pub fn fini(&mut self) {
        if !self.initialized {
            return;
        }
        self.initialized = false;
        self.state = EngineState::Stopped;
        self.scripts.fini();
        match self.pool.try_borrow_mut() {
            Ok(mut pool) => pool.reset(),
            Err(_) => log::warn!(target: "ember::engine", "render pool busy during shutdown"),
        }
        self.backend.close();
        log::info!(target: "ember::engine", "engine shut down");
    }

    pub fn load_script(&self, path: impl AsRef<Path>) -> Result<ScriptUnit> {
        self.scripts.load(path)
    }

    pub fn invoke_init(&self, unit: &mut ScriptUnit) -> Result<()> {
        self.scripts.invoke_init(unit)
    }

    pub fn invoke_fini(&self, unit: &mut ScriptUnit) -> Result<()> {
        self.scripts.invoke_fini(unit)
    }

    pub fn free_script(&self, unit: Option<ScriptUnit>) {
        self.scripts.free(unit);
    }

    pub fn bindings(&self) -> ScriptBindings {
        ScriptBindings { pool: self.pool.clone(), input: self.input.clone() }
    }

    pub fn scripts(&self) -> &ScriptHost {
        &self.scripts
    }

    pub fn pool(&self) -> &Rc<RefCell<RenderPool>> {
        &self.pool
    }

    pub fn input(&self) -> &Rc<RefCell<InputState>> {
        &self.input
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn frame_index(&self) -> u64 {
        self.clock.frame_index()
    }
}

impl<B: RenderBackend, E: EventSource> Drop for Engine<B, E> {
    fn drop(&mut self) {
        self.fini();
    }
}
