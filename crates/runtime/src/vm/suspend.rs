//! Cooperative suspension types (spec §4.4 "Suspension and resumption").
//!
//! A built-in that needs blocking host I/O returns `Pending` instead of a
//! value; the VM parks a `PendingCall` and reports `status=pending` to the
//! host without unwinding the stack or advancing the cursor. `continue()`
//! re-enters the same built-in with the same arguments.

use ria_core::Value;

/// Where a call argument's underlying storage lives. `None` for by-value
/// and immediate arguments; `Var`/`Global` for by-reference (OUT)
/// parameters a built-in may write back through.
#[derive(Debug, Clone, Copy)]
pub enum ArgLoc {
    None,
    Var(u8),
    Global(u8),
}

#[derive(Debug, Clone)]
pub struct CallArg {
    pub value: Value,
    pub loc: ArgLoc,
}

/// What a built-in call produced this poll.
pub enum BuiltinOutcome {
    Ready(Value),
    Pending,
}

/// Parked state across a `pending` return (spec §4.4: "destination
/// buffer, return type, packed args pointer, args size, stack-unwind
/// count, built-in function pointer" — collapsed here to the built-in id
/// plus its already-resolved arguments, since the id alone recovers
/// return type and unwind count from the fixed built-in table).
pub struct PendingCall {
    pub id: u16,
    pub args: Vec<CallArg>,
    /// `true` for `callp`/`call2p` (expression context, push the result);
    /// `false` for `calli`/`call2i` (statement context, discard it).
    pub wants_value: bool,
}
