mod common;

use common::{count, write_script, Op, RecordingBackend, ScriptedEvents};
use ember_engine::error::ErrorCode;
use ember_engine::input::HeadlessEvents;
use ember_engine::scripts::Lifecycle;
use ember_engine::Engine;
use rhai::Map;

fn engine() -> Engine<RecordingBackend, HeadlessEvents> {
    let (backend, _log) = RecordingBackend::new();
    let mut engine = Engine::new(backend, HeadlessEvents::new(Some(3)), 16);
    engine.init(32, 32).expect("init");
    engine
}

fn state_float(unit: &ember_engine::scripts::ScriptUnit, key: &str) -> Option<f64> {
    let state = unit.state().clone().try_cast::<Map>()?;
    state.get(key).and_then(|value| value.as_float().ok())
}

#[test]
fn update_only_script_forwards_dt_unchanged() {
    let engine = engine();
    let script = write_script("fn update(dt) { this.last_dt = dt; }");
    let mut unit = engine.load_script(script.path()).expect("load");

    assert!(!unit.has_entry(Lifecycle::Init));
    assert!(!unit.has_entry(Lifecycle::Fini));
    engine.invoke_init(&mut unit).expect("absent init is a no-op");
    engine.invoke_fini(&mut unit).expect("absent fini is a no-op");

    engine.scripts().invoke_update(&mut unit, 0.25).expect("update");
    assert_eq!(state_float(&unit, "last_dt"), Some(0.25));
}

#[test]
fn invalid_syntax_is_a_compile_failure() {
    let engine = engine();
    let script = write_script("fn update(dt) { let = ; }");
    let err = engine.load_script(script.path()).err().expect("compile failure");
    assert_eq!(err.code(), ErrorCode::ScriptCompileFailure);
    assert_eq!(err.script_detail().is_some(), cfg!(debug_assertions));
    engine.free_script(None);
}

#[test]
fn non_callable_init_is_a_bad_entry_point() {
    let engine = engine();
    let script = write_script("let init = 42;");
    let err = engine.load_script(script.path()).err().expect("bad entry point");
    assert_eq!(err.code(), ErrorCode::ScriptBadEntryPoint);
}

#[test]
fn variable_shadows_function_of_the_same_name() {
    let engine = engine();
    let script = write_script(
        r#"
            fn fini() { }
            let fini = "not a function";
        "#,
    );
    let err = engine.load_script(script.path()).err().expect("shadowed entry point");
    assert_eq!(err.code(), ErrorCode::ScriptBadEntryPoint);
}

#[test]
fn missing_file_reports_no_entry() {
    let engine = engine();
    let dir = tempfile::tempdir().expect("temp dir");
    let err = engine.load_script(dir.path().join("missing.rhai")).err().expect("missing");
    assert_eq!(err.code(), ErrorCode::FsNoEntry);
}

#[test]
fn failing_top_level_statement_is_an_exec_failure() {
    let engine = engine();
    let script = write_script(r#"fn init() { } throw "refusing to load";"#);
    let err = engine.load_script(script.path()).err().expect("exec failure");
    assert_eq!(err.code(), ErrorCode::ScriptExecFailure);
}

#[test]
fn closure_entry_points_are_invoked() {
    let engine = engine();
    let script = write_script(
        r#"
            let calls = [];
            let init = || calls.push("init");
            let update = |dt| calls.push(dt);
        "#,
    );
    let mut unit = engine.load_script(script.path()).expect("load");
    engine.invoke_init(&mut unit).expect("init");
    engine.scripts().invoke_update(&mut unit, 0.5).expect("update");
    let calls = unit.global("calls").expect("calls").flatten_clone().into_array().expect("array");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].as_float().ok(), Some(0.5));
}

#[test]
fn closure_with_wrong_arity_is_rejected_at_load() {
    let engine = engine();
    let script = write_script("let update = || 1;");
    let err = engine.load_script(script.path()).err().expect("zero-argument update");
    assert_eq!(err.code(), ErrorCode::ScriptBadEntryPoint);

    let script = write_script("let init = |a, b| a + b;");
    let err = engine.load_script(script.path()).err().expect("two-argument init");
    assert_eq!(err.code(), ErrorCode::ScriptBadEntryPoint);
}

#[test]
fn run_script_drives_update_each_frame() {
    let (backend, log) = RecordingBackend::new();
    let mut engine = Engine::new(backend, ScriptedEvents::frames(4), 4);
    engine.init(32, 32).expect("init");
    let script = write_script(
        r#"
            fn init() { this.frames = 0; }
            fn update(dt) { this.frames += 1; }
            fn fini() { this.done = true; }
        "#,
    );
    let mut unit = engine.load_script(script.path()).expect("load");
    engine.invoke_init(&mut unit).expect("init");
    engine.run_script(&mut unit).expect("run");
    engine.invoke_fini(&mut unit).expect("fini");

    let state = unit.state().clone().try_cast::<Map>().expect("state map");
    assert_eq!(state.get("frames").and_then(|v| v.as_int().ok()), Some(4));
    assert_eq!(state.get("done").and_then(|v| v.as_bool().ok()), Some(true));
    assert_eq!(count(&log, Op::Present), 4);
    engine.free_script(Some(unit));
}

#[test]
fn update_failure_stops_the_loop() {
    let (backend, log) = RecordingBackend::new();
    let mut engine = Engine::new(backend, HeadlessEvents::new(None), 4);
    engine.init(32, 32).expect("init");
    let script = write_script(
        r#"
            fn update(dt) {
                this.n = (this.n ?? 0) + 1;
                if this.n == 2 { throw "second frame"; }
            }
        "#,
    );
    let mut unit = engine.load_script(script.path()).expect("load");
    let err = engine.run_script(&mut unit).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ScriptExecFailure);
    assert_eq!(count(&log, Op::Present), 1);
}

#[test]
fn scripts_cannot_run_after_engine_shutdown() {
    let mut engine = engine();
    let script = write_script("fn init() { }");
    let mut unit = engine.load_script(script.path()).expect("load");
    engine.fini();
    assert_eq!(engine.invoke_init(&mut unit).unwrap_err().code(), ErrorCode::ScriptInitFailure);
}
