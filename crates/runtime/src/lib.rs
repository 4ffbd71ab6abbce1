//! RIA Runtime: the bytecode loader, virtual machine, built-in dispatch
//! table, and HTTP/cookie/filesystem/HTML collaborators that together
//! execute a module the compiler produced.
//!
//! # Modules
//!
//! - `loader`: parses a compiled module (spec §4.3)
//! - `vm`: the operand stack and fetch-decode-dispatch loop (spec §4.4)
//! - `builtins`: dispatch from a fixed built-in id to its implementation
//! - `collaborators`: the HTTP transport, cookie jar, filesystem wrapper,
//!   and HTML normaliser spec §6 describes as external contracts
//! - `engine`: the per-instance container tying the above together
//! - `registry`: the process-wide handle-addressed engine table (spec §5)
//! - `config`: `EngineConfig` and its `ria.toml`/`RIA_*` environment layering

pub mod builtins;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod loader;
pub mod registry;
pub mod vm;

pub use config::EngineConfig;
pub use engine::Engine;
pub use loader::Module;
pub use registry::Handle;
pub use ria_core::{ErrorCode, RString, RiaError, Status, Value};

/// Loads a compiled module from its on-disk bytes (spec §4.3).
pub fn load(bytes: Vec<u8>) -> Result<Module, RiaError> {
    loader::load(bytes)
}

/// Creates a new engine and returns the handle subsequent calls address
/// it by (spec §5).
pub fn create_engine(config: EngineConfig) -> Handle {
    registry::create(config)
}

/// Destroys an engine, freeing its registry slot. Rejected with
/// `unexpected_call` if the engine is `pending` (spec §5).
pub fn destroy_engine(handle: Handle) -> Result<bool, RiaError> {
    registry::destroy(handle)
}

/// Host-facing `parse(rule_name, &pos)` (spec §6): drives one registered
/// parser rule forward by one step against the engine behind `handle`.
pub fn parse(handle: Handle, rule_name: &str, pos: &mut usize) -> Result<RString, RiaError> {
    registry::with_engine(handle, |engine| engine.parse(rule_name, pos))?
}

/// The last script-level error raised against the engine behind
/// `handle`, if any (spec §6).
pub fn error_msg(handle: Handle) -> Result<Option<String>, RiaError> {
    registry::with_engine(handle, |engine| engine.error_msg())
}

/// Executes `entry` with `params` against the engine behind `handle`
/// (spec §4.4 "Execution contract"): loads `module`, resets the call
/// frame, and runs until a terminal status or a `pending` suspension.
pub fn execute(
    handle: Handle,
    module: &Module,
    entry: &str,
    params: Vec<RString>,
) -> Result<(Status, Value), RiaError> {
    registry::with_engine(handle, |engine| {
        let sym = match module.find_entry(entry) {
            Some(s) => s,
            None => {
                engine.fail_at(0, format!("no such entry point '{entry}'"));
                return (Status::Failed, Value::Unknown);
            }
        };
        let entry_offset = sym.entry_offset;
        engine.set_entry_offset(entry_offset);
        engine.reset_for_call(params);
        engine.load_module(module.clone());
        vm::exec::run(engine);
        (engine.status(), engine.result().clone())
    })
}

/// Resumes a `pending` engine after the host's asynchronous I/O
/// completed (spec §4.4 "continue").
pub fn continue_(handle: Handle) -> Result<(Status, Value), RiaError> {
    registry::with_engine(handle, |engine| {
        vm::exec::run(engine);
        (engine.status(), engine.result().clone())
    })
}

/// End-to-end scenarios (spec §8 E1-E6): compile a script with the
/// compiler crate, load it, and drive it through the public entry
/// points exactly as a host embedding the engine would.
#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::collaborators::http_transport::stub::ScriptedHttpTransport;

    fn run(source: &str, entry: &str, params: Vec<&str>) -> (Status, Value) {
        run_with_config(source, entry, params, EngineConfig::default())
    }

    fn run_with_config(source: &str, entry: &str, params: Vec<&str>, config: EngineConfig) -> (Status, Value) {
        let bytes = ria_compiler::compile(source).expect("script compiles");
        let module = load(bytes).expect("module loads");
        let handle = create_engine(config);
        let params = params.into_iter().map(RString::from_str).collect();
        let mut outcome = execute(handle, &module, entry, params).expect("execute");
        while outcome.0 == Status::Pending {
            outcome = continue_(handle).expect("continue");
        }
        destroy_engine(handle).expect("destroy");
        outcome
    }

    fn as_str(v: &Value) -> String {
        match v {
            Value::Str(s) => s.as_str().into_owned(),
            other => panic!("expected a string result, got {other:?}"),
        }
    }

    #[test]
    fn e1_arithmetic_folds_left_to_right() {
        let (status, result) = run("calc(0){ return(int_to_string(2+3*4)); }", "calc", vec![]);
        assert_eq!(status, Status::Ok);
        assert_eq!(as_str(&result), "20");
    }

    #[test]
    fn e2_assignment_and_if() {
        let src = "test(0){ $a=10; if ($a > 5) { return(\"big\"); } return(\"small\"); }";
        let (status, result) = run(src, "test", vec![]);
        assert_eq!(status, Status::Ok);
        assert_eq!(as_str(&result), "big");
    }

    #[test]
    fn e3_string_extraction_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sample.html"), "prefix<b>hello</b>suffix").unwrap();
        let mut config = EngineConfig::default();
        config.temp_dir = dir.path().to_path_buf();
        let src = r#"run(0){ $p=0; return(extract_string_from_file("sample.html",$p,"<b>","</b>")); }"#;
        let (status, result) = run_with_config(src, "run", vec![], config);
        assert_eq!(status, Status::Ok);
        assert_eq!(as_str(&result), "hello");
    }

    #[test]
    fn e4_parameter_passing() {
        let (status, result) = run("echo(1){ return(@0); }", "echo", vec!["hi"]);
        assert_eq!(status, Status::Ok);
        assert_eq!(as_str(&result), "hi");
    }

    #[test]
    fn e5_while_loop_concatenates() {
        let src = "count(0){ $i=0; $s=\"\"; while ($i<3) { $s=$s+int_to_string($i); $i=$i+1; } return($s); }";
        let (status, result) = run(src, "count", vec![]);
        assert_eq!(status, Status::Ok);
        assert_eq!(as_str(&result), "012");
    }

    #[test]
    fn e6_suspension_then_resume_on_http_round_trip() {
        let bytes = ria_compiler::compile("fetch(1){ get_html(@0); return(last_response(\"status\")); }")
            .expect("script compiles");
        let module = load(bytes).expect("module loads");

        let transport = Box::new(ScriptedHttpTransport::pending_once(200, "<html></html>"));
        let mut engine = Engine::with_transport(EngineConfig::default(), transport);
        let sym = module.find_entry("fetch").expect("entry exists");
        engine.set_entry_offset(sym.entry_offset);
        engine.reset_for_call(vec![RString::from_str("http://example.invalid/")]);
        engine.load_module(module.clone());

        vm::exec::run(&mut engine);
        assert_eq!(engine.status(), Status::Pending);

        vm::exec::run(&mut engine);
        assert_eq!(engine.status(), Status::Ok);
        assert_eq!(as_str(engine.result()), "200");
    }

    #[test]
    fn parse_and_error_msg_are_reachable_through_the_public_handle_api() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sample.html"), "a#b#c#").unwrap();
        let mut config = EngineConfig::default();
        config.temp_dir = dir.path().to_path_buf();

        let src = r##"run(0){
            create_parser_for_file("sample.html");
            add_parsing_rule("hashes","#","","+D");
            return(1);
        }"##;
        let (status, _) = run_with_config(src, "run", vec![], config.clone());
        assert_eq!(status, Status::OkParserReady);

        let handle = create_engine(config);
        let bytes = ria_compiler::compile(src).expect("script compiles");
        let module = load(bytes).expect("module loads");
        let outcome = execute(handle, &module, "run", vec![]).expect("execute");
        assert_eq!(outcome.0, Status::OkParserReady);

        let mut pos = 0usize;
        let first = parse(handle, "hashes", &mut pos).expect("parse");
        assert_eq!(first.as_str(), "+");
        let second = parse(handle, "hashes", &mut pos).expect("parse");
        assert_eq!(second.as_str(), "+");

        let err = parse(handle, "no-such-rule", &mut pos).unwrap_err();
        assert_eq!(err.code, ErrorCode::BadParam);

        assert!(error_msg(handle).expect("error_msg lookup").is_none());
        destroy_engine(handle).expect("destroy");
    }
}
