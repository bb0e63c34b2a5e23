//! Embedded script host.
//!
//! One interpreter lives inside [`ScriptHost`]; it is built on the first `init`
//! and dropped by `fini`. Each loaded file becomes a [`ScriptUnit`] owning its
//! compiled AST, its private top-level scope, and the lifecycle entry points
//! resolved once at load time.

mod api;

use std::path::Path;

use rhai::{CallFnOptions, Dynamic, Engine, FnPtr, FuncArgs, Map, Scope, AST, FLOAT};

use crate::error::{diagnostic, EngineError, Result};
use crate::fs;

pub use api::{ScriptBindings, ScriptSheet, ScriptSprite, ScriptTexture};

/// Reserved top-level names a script may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Init,
    Fini,
    Update,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 3] = [Lifecycle::Init, Lifecycle::Fini, Lifecycle::Update];

    pub fn name(self) -> &'static str {
        match self {
            Lifecycle::Init => "init",
            Lifecycle::Fini => "fini",
            Lifecycle::Update => "update",
        }
    }

    fn arity(self) -> usize {
        match self {
            Lifecycle::Init | Lifecycle::Fini => 0,
            Lifecycle::Update => 1,
        }
    }
}

/// A resolved, callable entry point.
#[derive(Debug, Clone)]
enum EntryPoint {
    /// `fn update(dt) { .. }` defined in the unit's AST.
    Function(&'static str),
    /// A top-level variable holding a function pointer or closure.
    Pointer(FnPtr),
}

#[derive(Debug, Default)]
struct EntryPoints {
    init: Option<EntryPoint>,
    fini: Option<EntryPoint>,
    update: Option<EntryPoint>,
}

impl EntryPoints {
    fn get(&self, which: Lifecycle) -> Option<&EntryPoint> {
        match which {
            Lifecycle::Init => self.init.as_ref(),
            Lifecycle::Fini => self.fini.as_ref(),
            Lifecycle::Update => self.update.as_ref(),
        }
    }

    fn set(&mut self, which: Lifecycle, entry: Option<EntryPoint>) {
        match which {
            Lifecycle::Init => self.init = entry,
            Lifecycle::Fini => self.fini = entry,
            Lifecycle::Update => self.update = entry,
        }
    }
}

/// A loaded script file.
///
/// Lifecycle functions run with `this` bound to a per-unit object map, which is
/// where scripts keep state between calls.
pub struct ScriptUnit {
    path: String,
    ast: AST,
    scope: Scope<'static>,
    state: Dynamic,
    entries: EntryPoints,
}

impl ScriptUnit {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn has_entry(&self, which: Lifecycle) -> bool {
        self.entries.get(which).is_some()
    }

    /// Value of a top-level variable in the unit's namespace.
    pub fn global(&self, name: &str) -> Option<&Dynamic> {
        self.scope.get(name)
    }

    /// The object bound to `this` during lifecycle calls.
    pub fn state(&self) -> &Dynamic {
        &self.state
    }
}

impl Drop for ScriptUnit {
    fn drop(&mut self) {
        log::debug!(target: "ember::script", "released {}", self.path);
    }
}

#[derive(Default)]
pub struct ScriptHost {
    engine: Option<Engine>,
}

impl ScriptHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_some()
    }

    /// Starts the interpreter. Calling it again while running is a no-op.
    pub fn init(&mut self, bindings: &ScriptBindings) -> Result<()> {
        if self.engine.is_some() {
            return Ok(());
        }
        let mut engine = Engine::new();
        engine.set_fast_operators(true);
        api::register_api(&mut engine, bindings);
        self.engine = Some(engine);
        log::debug!(target: "ember::script", "interpreter started");
        Ok(())
    }

    /// Stops the interpreter. Units loaded earlier can no longer be invoked.
    pub fn fini(&mut self) {
        if self.engine.take().is_some() {
            log::debug!(target: "ember::script", "interpreter stopped");
        }
    }

    fn engine(&self) -> Result<&Engine> {
        self.engine.as_ref().ok_or(EngineError::ScriptInitFailure)
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<ScriptUnit> {
        let engine = self.engine()?;
        let path_buf = path.as_ref();
        let path = path_buf.display().to_string();
        let bytes = fs::read_file(path_buf)?;
        let source = String::from_utf8(bytes).map_err(|err| EngineError::ScriptCompileFailure {
            path: path.clone(),
            detail: diagnostic(format!("source is not UTF-8: {err}")),
        })?;

        let mut ast = engine.compile(source).map_err(|err| {
            log::debug!(target: "ember::script", "compile error in {path}: {err}");
            EngineError::ScriptCompileFailure { path: path.clone(), detail: diagnostic(&err) }
        })?;
        ast.set_source(path.as_str());

        let mut scope = Scope::new();
        engine.run_ast_with_scope(&mut scope, &ast).map_err(|err| {
            log::debug!(target: "ember::script", "top-level execution failed in {path}: {err}");
            EngineError::ScriptExecFailure { path: path.clone(), detail: diagnostic(&err) }
        })?;

        let mut entries = EntryPoints::default();
        for which in Lifecycle::ALL {
            entries.set(which, resolve_entry(&ast, &scope, which, &path)?);
        }

        log::info!(
            target: "ember::script",
            "loaded {path} (init: {}, update: {}, fini: {})",
            entries.init.is_some(),
            entries.update.is_some(),
            entries.fini.is_some()
        );
        Ok(ScriptUnit { path, ast, scope, state: Dynamic::from(Map::new()), entries })
    }

    pub fn invoke_init(&self, unit: &mut ScriptUnit) -> Result<()> {
        self.invoke(unit, Lifecycle::Init, ())
    }

    pub fn invoke_fini(&self, unit: &mut ScriptUnit) -> Result<()> {
        self.invoke(unit, Lifecycle::Fini, ())
    }

    pub fn invoke_update(&self, unit: &mut ScriptUnit, dt: f32) -> Result<()> {
        self.invoke(unit, Lifecycle::Update, (dt as FLOAT,))
    }

    /// Releases a unit and everything it holds. `None` is accepted.
    pub fn free(&self, unit: Option<ScriptUnit>) {
        drop(unit);
    }

    fn invoke(&self, unit: &mut ScriptUnit, which: Lifecycle, args: impl FuncArgs) -> Result<()> {
        let Some(entry) = unit.entries.get(which).cloned() else {
            return Ok(());
        };
        let engine = self.engine()?;
        let result = match &entry {
            EntryPoint::Function(name) => {
                let options = CallFnOptions::new().eval_ast(false).rewind_scope(true).bind_this_ptr(&mut unit.state);
                engine.call_fn_with_options::<Dynamic>(options, &mut unit.scope, &unit.ast, name, args)
            }
            EntryPoint::Pointer(fn_ptr) => fn_ptr.call::<Dynamic>(engine, &unit.ast, args),
        };
        result.map(|_| ()).map_err(|err| {
            log::debug!(target: "ember::script", "{}() failed in {}: {err}", which.name(), unit.path);
            EngineError::ScriptExecFailure { path: unit.path.clone(), detail: diagnostic(&err) }
        })
    }
}

/// Looks up one reserved name. Absent is `Ok(None)`; present but not callable
/// with the lifecycle arity is `BadEntryPoint`. A top-level variable shadows a
/// function of the same name.
fn resolve_entry(ast: &AST, scope: &Scope, which: Lifecycle, path: &str) -> Result<Option<EntryPoint>> {
    let name = which.name();
    let bad = || EngineError::ScriptBadEntryPoint { path: path.to_string(), name };

    if let Some(value) = scope.get(name) {
        let fn_ptr = value.flatten_clone().try_cast::<FnPtr>().ok_or_else(bad)?;
        // Captured variables are curried in front of the declared parameters.
        let arity = fn_ptr.curry().len() + which.arity();
        if !defines(ast, fn_ptr.fn_name(), arity) {
            return Err(bad());
        }
        return Ok(Some(EntryPoint::Pointer(fn_ptr)));
    }

    if defines(ast, name, which.arity()) {
        Ok(Some(EntryPoint::Function(name)))
    } else if ast.iter_functions().any(|f| f.name == name) {
        Err(bad())
    } else {
        Ok(None)
    }
}

/// True when the AST holds a script function `name` taking `arity` parameters.
fn defines(ast: &AST, name: &str, arity: usize) -> bool {
    ast.iter_functions().any(|f| f.name == name && f.params.len() == arity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::input::InputState;
    use crate::renderer::RenderPool;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;
    use tempfile::NamedTempFile;

    fn host() -> ScriptHost {
        let bindings = ScriptBindings {
            pool: Rc::new(RefCell::new(RenderPool::new(8))),
            input: Rc::new(RefCell::new(InputState::new())),
        };
        let mut host = ScriptHost::new();
        host.init(&bindings).expect("init host");
        host
    }

    fn write_script(contents: &str) -> NamedTempFile {
        let mut temp = NamedTempFile::new().expect("temp script");
        write!(temp, "{contents}").expect("write script");
        temp
    }

    #[test]
    fn resolves_functions_and_pointers() {
        let host = host();
        let script = write_script(
            r#"
                fn init() { }
                let update = |dt| dt;
            "#,
        );
        let unit = host.load(script.path()).expect("load");
        assert!(unit.has_entry(Lifecycle::Init));
        assert!(unit.has_entry(Lifecycle::Update));
        assert!(!unit.has_entry(Lifecycle::Fini));
    }

    #[test]
    fn wrong_arity_function_is_a_bad_entry_point() {
        let host = host();
        let script = write_script("fn update() { }");
        let err = host.load(script.path()).err().expect("bad arity");
        assert_eq!(err.code(), ErrorCode::ScriptBadEntryPoint);
    }

    #[test]
    fn pointer_entries_are_checked_against_their_target() {
        let host = host();
        let script = write_script(
            r#"
                fn tick(dt) { }
                let step = 1;
                let update = |dt| step + dt;
                let init = Fn("tick");
            "#,
        );
        let err = host.load(script.path()).err().expect("init pointer takes one argument");
        assert_eq!(err.code(), ErrorCode::ScriptBadEntryPoint);

        let script = write_script(
            r#"
                fn tick(dt) { }
                let step = 1;
                let update = |dt| step + dt;
                let fini = Fn("nowhere");
            "#,
        );
        let err = host.load(script.path()).err().expect("pointer to an undefined function");
        assert_eq!(err.code(), ErrorCode::ScriptBadEntryPoint);

        let script = write_script(
            r#"
                fn tick(dt) { }
                let step = 1;
                let update = |dt| step + dt;
                let fini = || step;
            "#,
        );
        let unit = host.load(script.path()).expect("capturing closures keep their declared arity");
        assert!(unit.has_entry(Lifecycle::Update));
        assert!(unit.has_entry(Lifecycle::Fini));
    }

    #[test]
    fn this_state_persists_between_calls() {
        let host = host();
        let script = write_script(
            r#"
                fn init() { this.ticks = 0; }
                fn update(dt) { this.ticks += 1; }
            "#,
        );
        let mut unit = host.load(script.path()).expect("load");
        host.invoke_init(&mut unit).expect("init");
        host.invoke_update(&mut unit, 0.5).expect("update");
        host.invoke_update(&mut unit, 0.5).expect("update");
        let state = unit.state().clone().cast::<Map>();
        assert_eq!(state.get("ticks").and_then(|v| v.as_int().ok()), Some(2));
    }

    #[test]
    fn init_is_idempotent_and_fini_blocks_further_calls() {
        let mut host = host();
        let bindings = ScriptBindings {
            pool: Rc::new(RefCell::new(RenderPool::new(1))),
            input: Rc::new(RefCell::new(InputState::new())),
        };
        host.init(&bindings).expect("second init is a no-op");
        let script = write_script("fn init() { }");
        let mut unit = host.load(script.path()).expect("load");
        host.fini();
        host.fini();
        assert!(!host.is_running());
        assert_eq!(host.invoke_init(&mut unit).unwrap_err(), EngineError::ScriptInitFailure);
        assert_eq!(host.load(script.path()).err().map(|e| e.code()), Some(ErrorCode::ScriptInitFailure));
    }

    #[test]
    fn runtime_errors_carry_detail_in_debug_builds() {
        let host = host();
        let script = write_script(r#"fn init() { throw "nope"; }"#);
        let mut unit = host.load(script.path()).expect("load");
        let err = host.invoke_init(&mut unit).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ScriptExecFailure);
        assert_eq!(err.script_detail().is_some(), cfg!(debug_assertions));
    }
}
