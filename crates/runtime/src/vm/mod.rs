//! The virtual machine: fetch-decode-dispatch loop and the cooperative
//! suspension state machine built-ins hook into (spec §4.4, §9 "Cooperative
//! suspension... rearchitect as an explicit state machine").

pub mod exec;
pub mod suspend;

use ria_core::Value;

/// One entry on the operand stack.
///
/// The original VM stores raw pointers into module memory, the string
/// pool, and temp buffers, mixed with immediate encodings (spec §9
/// design notes). Indexing into owned storage instead keeps every
/// reference valid for as long as the engine is, and collapses the
/// by-value/by-reference/immediate wire format into plain Rust matching.
#[derive(Debug, Clone)]
pub enum StackEntry {
    Var(u8),
    Global(u8),
    StrConst(u16),
    Param(u8),
    TempOwned(Value),
    Immediate(u32),
}
