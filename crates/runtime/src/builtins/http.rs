//! HTTP built-ins (spec §4.4 "HTTP"): `get_html*`, `post*`,
//! `last_response`, `get_header`/`set_header`, `load_cookie`/`save_cookie`.
//!
//! Each round-trips through the engine's HTTP transport collaborator,
//! which may report `Pending` (spec §4.4 "Suspension and resumption") —
//! these functions propagate that straight through rather than blocking,
//! so the VM can hand `status=pending` back to the host.

use ria_core::{ErrorCode, RString, RiaError, Value};

use crate::collaborators::http_transport::HttpPoll;
use crate::engine::Engine;
use crate::vm::suspend::BuiltinOutcome;

fn transport_error(e: String) -> RiaError {
    RiaError::new(ErrorCode::Internal, "http.rs", line!(), e)
}

fn get_text(engine: &mut Engine, url: &str, dump_path: Option<&std::path::Path>) -> Result<BuiltinOutcome, RiaError> {
    match engine.http_round_trip(url, None, None, dump_path, true) {
        HttpPoll::Pending => Ok(BuiltinOutcome::Pending),
        HttpPoll::Ready(Err(e)) => Err(transport_error(e)),
        HttpPoll::Ready(Ok(resp)) => {
            let body = resp.body.clone();
            engine.set_last_response(resp);
            Ok(BuiltinOutcome::Ready(Value::Str(RString::from_bytes(body))))
        }
    }
}

pub fn get_html(engine: &mut Engine, url: &str) -> Result<BuiltinOutcome, RiaError> {
    get_text(engine, url, None)
}

pub fn get_html_with_dump(engine: &mut Engine, url: &str, dump_filename: &str) -> Result<BuiltinOutcome, RiaError> {
    let dump_path = engine.temp_path(dump_filename);
    get_text(engine, url, Some(&dump_path))
}

fn get_to_file(
    engine: &mut Engine,
    url: &str,
    path: &std::path::Path,
    dump_path: Option<&std::path::Path>,
    raw: bool,
) -> Result<BuiltinOutcome, RiaError> {
    match engine.http_round_trip(url, None, Some(path), dump_path, !raw) {
        HttpPoll::Pending => Ok(BuiltinOutcome::Pending),
        HttpPoll::Ready(Err(_)) => Ok(BuiltinOutcome::Ready(Value::Bool(false))),
        HttpPoll::Ready(Ok(resp)) => {
            engine.set_last_response(resp);
            Ok(BuiltinOutcome::Ready(Value::Bool(true)))
        }
    }
}

pub fn get_html_to_file(engine: &mut Engine, url: &str, path: &std::path::Path) -> Result<BuiltinOutcome, RiaError> {
    get_to_file(engine, url, path, None, false)
}

pub fn get_html_to_file_with_dump(engine: &mut Engine, url: &str, path: &std::path::Path, dump_filename: &str) -> Result<BuiltinOutcome, RiaError> {
    let dump_path = engine.temp_path(dump_filename);
    get_to_file(engine, url, path, Some(&dump_path), false)
}

pub fn get_binary_to_file(engine: &mut Engine, url: &str, path: &std::path::Path) -> Result<BuiltinOutcome, RiaError> {
    get_to_file(engine, url, path, None, true)
}

fn post_text(engine: &mut Engine, url: &str, body: &[u8], dump_path: Option<&std::path::Path>) -> Result<BuiltinOutcome, RiaError> {
    match engine.http_round_trip(url, Some(body), None, dump_path, true) {
        HttpPoll::Pending => Ok(BuiltinOutcome::Pending),
        HttpPoll::Ready(Err(e)) => Err(transport_error(e)),
        HttpPoll::Ready(Ok(resp)) => {
            let out = resp.body.clone();
            engine.set_last_response(resp);
            Ok(BuiltinOutcome::Ready(Value::Str(RString::from_bytes(out))))
        }
    }
}

pub fn post(engine: &mut Engine, url: &str, body: &[u8]) -> Result<BuiltinOutcome, RiaError> {
    post_text(engine, url, body, None)
}

pub fn post_with_dump(engine: &mut Engine, url: &str, body: &[u8], dump_filename: &str) -> Result<BuiltinOutcome, RiaError> {
    let dump_path = engine.temp_path(dump_filename);
    post_text(engine, url, body, Some(&dump_path))
}

fn post_to_file(
    engine: &mut Engine,
    url: &str,
    body: &[u8],
    path: &std::path::Path,
    dump_path: Option<&std::path::Path>,
) -> Result<BuiltinOutcome, RiaError> {
    match engine.http_round_trip(url, Some(body), Some(path), dump_path, false) {
        HttpPoll::Pending => Ok(BuiltinOutcome::Pending),
        HttpPoll::Ready(Err(_)) => Ok(BuiltinOutcome::Ready(Value::Bool(false))),
        HttpPoll::Ready(Ok(resp)) => {
            engine.set_last_response(resp);
            Ok(BuiltinOutcome::Ready(Value::Bool(true)))
        }
    }
}

pub fn post_to_file_plain(engine: &mut Engine, url: &str, body: &[u8], path: &std::path::Path) -> Result<BuiltinOutcome, RiaError> {
    post_to_file(engine, url, body, path, None)
}

pub fn post_to_file_with_dump(engine: &mut Engine, url: &str, body: &[u8], path: &std::path::Path, dump_filename: &str) -> Result<BuiltinOutcome, RiaError> {
    let dump_path = engine.temp_path(dump_filename);
    post_to_file(engine, url, body, path, Some(&dump_path))
}

/// `last_response(field)` — `field` selects `"status"` or defaults to the
/// last captured body.
pub fn last_response(engine: &Engine, field: &str) -> Value {
    match engine.last_response() {
        None => Value::Str(RString::new()),
        Some(resp) if field.eq_ignore_ascii_case("status") => Value::Str(RString::from_str(&resp.status.to_string())),
        Some(resp) => Value::Str(RString::from_bytes(resp.body.clone())),
    }
}

pub fn get_header(engine: &Engine, name: &str) -> Value {
    Value::Str(RString::from_str(&engine.http_get_header(name).unwrap_or_default()))
}

pub fn set_header(engine: &mut Engine, name: &str, value: &str) -> Value {
    engine.http_set_header(name, value);
    Value::Bool(true)
}

fn now_unix() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

pub fn load_cookie(engine: &mut Engine, filename: &str) -> Value {
    let path = engine.temp_path(filename);
    let jar = engine.cookies_mut();
    let loaded = jar.load(&path).is_ok();
    if loaded {
        jar.prune_expired(now_unix());
    }
    Value::Bool(loaded)
}

pub fn save_cookie(engine: &mut Engine, filename: &str) -> Value {
    let path = engine.temp_path(filename);
    Value::Bool(engine.cookies_mut().save(&path).is_ok())
}
