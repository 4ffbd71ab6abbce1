//! Built-in dispatch (spec §4.4 "Built-in dispatch"): maps a fixed
//! built-in id to its implementation and unpacks the VM's resolved call
//! arguments into the shapes each implementation expects.
//!
//! The wire format spec §4.4 describes (`[0x01][type][len][pointer]` /
//! `[0x00][pointer-to-slot]` / `[0x02][type][4 bytes]`) exists in the
//! original to hand raw pointers to C functions; per spec §9's design
//! notes it is unnecessary once arguments are already an owned `Value`
//! plus an optional by-reference slot location (`vm::suspend::CallArg`).

pub mod http;
pub mod parser_bridge;
pub mod strings;

use ria_core::{ErrorCode, RString, RiaError, Value};

use crate::engine::Engine;
use crate::vm::suspend::{ArgLoc, BuiltinOutcome, CallArg};

fn as_str(v: &Value) -> String {
    str_value(v).as_str().into_owned()
}

fn str_value(v: &Value) -> RString {
    match v {
        Value::Str(s) => s.clone(),
        Value::Int(n) => RString::from_str(&n.to_string()),
        Value::Bool(b) => RString::from_str(if *b { "true" } else { "false" }),
        Value::Unknown => RString::new(),
    }
}

fn as_int(v: &Value) -> u32 {
    v.as_int().unwrap_or(0)
}

fn bad_param(detail: impl Into<String>) -> RiaError {
    RiaError::new(ErrorCode::BadParam, "builtins/mod.rs", line!(), detail)
}

fn write_back(engine: &mut Engine, arg: &CallArg, value: Value) {
    match arg.loc {
        ArgLoc::Var(idx) => engine.write_local(idx, value),
        ArgLoc::Global(idx) => engine.write_global(idx, value),
        ArgLoc::None => {}
    }
}

/// Dispatches one resolved call to its implementation. `args` is already
/// in declaration order (spec §4.4: "the VM pushes parameters to the
/// stack left-to-right from the script").
pub fn dispatch(engine: &mut Engine, id: u16, args: &[CallArg]) -> Result<BuiltinOutcome, RiaError> {
    match id {
        1 | 2 => {
            let pos = as_int(&args[1].value) as usize;
            let begin = as_str(&args[2].value);
            let end = as_str(&args[3].value);
            let extraction = if id == 1 {
                let haystack = as_str(&args[0].value);
                strings::extract(haystack.as_bytes(), pos, &begin, &end)
            } else {
                use crate::collaborators::filesystem::FileHandle;
                let path = engine.temp_path(&as_str(&args[0].value));
                let bytes = FileHandle::open_read(&path).and_then(|mut f| f.read_to_end()).map_err(bad_param)?;
                strings::extract(&bytes, pos, &begin, &end)
            };
            write_back(engine, &args[1], Value::Int(extraction.new_pos as u32));
            Ok(BuiltinOutcome::Ready(Value::Str(RString::from_str(&extraction.captured))))
        }
        3 => Ok(BuiltinOutcome::Ready(Value::Str(strings::substring(
            &str_value(&args[0].value),
            as_int(&args[1].value),
            as_int(&args[2].value),
        )))),
        4 => Ok(BuiltinOutcome::Ready(Value::Int(as_str(&args[0].value).len() as u32))),
        5 => Ok(BuiltinOutcome::Ready(Value::Str(strings::dehtml(&str_value(&args[0].value))))),
        6 => Ok(BuiltinOutcome::Ready(Value::Str(strings::int_to_string(as_int(&args[0].value))))),
        7 => Ok(BuiltinOutcome::Ready(Value::Int(strings::string_to_int(&str_value(&args[0].value))))),
        8 => {
            let path = engine.temp_path(&as_str(&args[0].value));
            let s = strings::load_from_file(&path).map_err(bad_param)?;
            Ok(BuiltinOutcome::Ready(Value::Str(s)))
        }
        9 => {
            let path = engine.temp_path(&as_str(&args[0].value));
            let ok = strings::save_to_file(&path, &str_value(&args[1].value)).is_ok();
            Ok(BuiltinOutcome::Ready(Value::Bool(ok)))
        }
        10 => http::get_html(engine, &as_str(&args[0].value)),
        11 => {
            let url = as_str(&args[0].value);
            let dump_filename = as_str(&args[1].value);
            http::get_html_with_dump(engine, &url, &dump_filename)
        }
        12 => {
            let url = as_str(&args[0].value);
            let path = engine.temp_path(&as_str(&args[1].value));
            http::get_html_to_file(engine, &url, &path)
        }
        13 => {
            let url = as_str(&args[0].value);
            let path = engine.temp_path(&as_str(&args[1].value));
            let dump_filename = as_str(&args[2].value);
            http::get_html_to_file_with_dump(engine, &url, &path, &dump_filename)
        }
        14 => {
            let url = as_str(&args[0].value);
            let path = engine.temp_path(&as_str(&args[1].value));
            http::get_binary_to_file(engine, &url, &path)
        }
        15 => {
            let url = as_str(&args[0].value);
            let body = as_str(&args[1].value);
            http::post(engine, &url, body.as_bytes())
        }
        16 => {
            let url = as_str(&args[0].value);
            let body = as_str(&args[1].value);
            let dump_filename = as_str(&args[2].value);
            http::post_with_dump(engine, &url, body.as_bytes(), &dump_filename)
        }
        17 => {
            let url = as_str(&args[0].value);
            let body = as_str(&args[1].value);
            let path = engine.temp_path(&as_str(&args[2].value));
            http::post_to_file_plain(engine, &url, body.as_bytes(), &path)
        }
        18 => {
            let url = as_str(&args[0].value);
            let body = as_str(&args[1].value);
            let path = engine.temp_path(&as_str(&args[2].value));
            let dump_filename = as_str(&args[3].value);
            http::post_to_file_with_dump(engine, &url, body.as_bytes(), &path, &dump_filename)
        }
        19 => Ok(BuiltinOutcome::Ready(http::last_response(engine, &as_str(&args[0].value)))),
        20 => Ok(BuiltinOutcome::Ready(http::get_header(engine, &as_str(&args[0].value)))),
        21 => Ok(BuiltinOutcome::Ready(http::set_header(engine, &as_str(&args[0].value), &as_str(&args[1].value)))),
        22 => Ok(BuiltinOutcome::Ready(http::load_cookie(engine, &as_str(&args[0].value)))),
        23 => Ok(BuiltinOutcome::Ready(http::save_cookie(engine, &as_str(&args[0].value)))),
        24 => {
            let path = engine.temp_path(&as_str(&args[0].value));
            Ok(BuiltinOutcome::Ready(parser_bridge::create_parser_for_file(engine, &path)))
        }
        25 => Ok(BuiltinOutcome::Ready(parser_bridge::add_parsing_rule(
            engine,
            &as_str(&args[0].value),
            &as_str(&args[1].value),
            &as_str(&args[2].value),
            &as_str(&args[3].value),
        ))),
        _ => Err(RiaError::new(ErrorCode::Internal, "builtins/mod.rs", line!(), format!("unknown built-in id {id}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn arg(v: Value) -> CallArg {
        CallArg { value: v, loc: ArgLoc::None }
    }

    #[test]
    fn int_to_string_dispatches_by_id() {
        let mut engine = Engine::new(EngineConfig::default());
        let out = dispatch(&mut engine, 6, &[arg(Value::Int(42))]).unwrap();
        match out {
            BuiltinOutcome::Ready(Value::Str(s)) => assert_eq!(s.as_str(), "42"),
            _ => panic!("expected a ready string"),
        }
    }

    #[test]
    fn unknown_id_is_an_internal_error() {
        let mut engine = Engine::new(EngineConfig::default());
        assert!(dispatch(&mut engine, 999, &[]).is_err());
    }
}
