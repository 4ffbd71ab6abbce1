//! RIA Core: the value model and bytecode wire contract shared by the
//! compiler and the virtual machine.
//!
//! # Modules
//!
//! - `value`: the tagged `Value` (spec §3)
//! - `rstring`: NUL-terminated string buffer backing `Value::Str`
//! - `opcode`: the bytecode instruction set (spec §4.2)
//! - `module`: the on-disk module layout (spec §3, §6)
//! - `error`: error categories and thread-local last-error slot (spec §7)
//! - `status`: VM/engine execution status (spec §6)
//! - `builtins`: the fixed built-in table (spec §4.4), shared by the
//!   compiler's signature checks and the runtime's call dispatch

pub mod builtins;
pub mod error;
pub mod module;
pub mod opcode;
pub mod rstring;
pub mod status;
pub mod value;

pub use builtins::{BuiltinSig, BUILTINS};
pub use error::{ErrorCode, RiaError};
pub use module::SymbolEntry;
pub use opcode::{Immediate, Opcode};
pub use rstring::RString;
pub use status::Status;
pub use value::{Value, ValueType};
