//! Process-wide engine registry (spec §5 "Engine lifecycle").
//!
//! A host addresses engines by an opaque handle rather than a pointer, so
//! the registry is the one place that owns every live `Engine`. Grounded
//! on the teacher runtime's strand registry (`OnceLock<Mutex<...>>` guarding
//! a `HashMap`). `with_engine` checks an engine out of the map for the
//! duration of the call rather than holding the registry lock throughout,
//! so one engine's (possibly slow, HTTP-bound) call never blocks another
//! engine's; a handle whose engine is checked out simply isn't found,
//! which is what turns the reentrant call spec §5 forbids ("a host must
//! not call back into an engine that is mid-built-in") into an ordinary
//! `bad_object` rather than a self-deadlock.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use ria_core::{ErrorCode, RiaError, Status};

use crate::config::EngineConfig;
use crate::engine::Engine;

pub type Handle = u32;

struct Registry {
    engines: HashMap<Handle, Engine>,
    next: Handle,
}

impl Registry {
    fn new() -> Self {
        Registry { engines: HashMap::new(), next: 1 }
    }
}

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Registry::new()))
}

/// Creates a new engine and returns the handle the host will use for
/// every subsequent call.
pub fn create(config: EngineConfig) -> Handle {
    let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
    let handle = reg.next;
    reg.next += 1;
    reg.engines.insert(handle, Engine::new(config));
    handle
}

/// Destroys an engine. Handles are never recycled (spec §5), so a
/// use-after-destroy from a careless host surfaces as `bad_object`
/// rather than silently operating on an unrelated engine. Destroying an
/// engine that is `pending` is disallowed (spec §5: rejected with
/// `unexpected_call`) — the host must `continue` it to a terminal status
/// first.
pub fn destroy(handle: Handle) -> Result<bool, RiaError> {
    let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
    match reg.engines.get(&handle) {
        Some(engine) if engine.status() == Status::Pending => Err(RiaError::new(
            ErrorCode::UnexpectedCall,
            "registry.rs",
            line!(),
            format!("handle {handle} is pending; continue it to a terminal status before destroying"),
        )),
        Some(_) => Ok(reg.engines.remove(&handle).is_some()),
        None => Ok(false),
    }
}

/// Checks the engine behind `handle` out of the registry, runs `f`
/// against it, then checks it back in. A handle that is already checked
/// out (mid-built-in, on another call) or unknown is rejected the same
/// way: `bad_object`.
pub fn with_engine<F, R>(handle: Handle, f: F) -> Result<R, RiaError>
where
    F: FnOnce(&mut Engine) -> R,
{
    let mut engine = {
        let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
        reg.engines
            .remove(&handle)
            .ok_or_else(|| RiaError::new(ErrorCode::BadObject, "registry.rs", line!(), format!("no engine for handle {handle}")))?
    };

    engine.set_locked(true);
    let result = f(&mut engine);
    engine.set_locked(false);

    let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
    reg.engines.insert(handle, engine);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_destroy_round_trip() {
        let h = create(EngineConfig::default());
        assert!(destroy(h).unwrap());
        assert!(!destroy(h).unwrap());
    }

    #[test]
    fn destroying_a_pending_engine_is_rejected() {
        let h = create(EngineConfig::default());
        with_engine(h, |engine| engine.set_status(Status::Pending)).unwrap();
        let err = destroy(h).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedCall);
        assert!(with_engine(h, |_| ()).is_ok());
    }

    #[test]
    fn unknown_handle_is_a_bad_object_error() {
        let err = with_engine(999_999, |_| ()).unwrap_err();
        assert_eq!(err.code, ErrorCode::BadObject);
    }

    #[test]
    fn checked_out_engine_rejects_a_second_caller() {
        let h = create(EngineConfig::default());
        let inner_err = with_engine(h, |_engine| with_engine(h, |_| ()).unwrap_err().code);
        assert_eq!(inner_err.unwrap(), ErrorCode::BadObject);
        destroy(h);
    }
}
