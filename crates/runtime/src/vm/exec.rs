//! Fetch-decode-dispatch loop (spec §4.4 "Execution contract").
//!
//! One `step` decodes a single instruction, applies its effect, and
//! reports where the cursor lands next (or that the call is suspended /
//! terminated). `run` drives `step` until a terminal status, `pending`,
//! or a runtime error, exactly matching spec §8 property 1: every
//! instruction is visited once, in execution order, never past the
//! code slice.

use ria_core::{ErrorCode, Opcode, RiaError, Status, Value};

use crate::builtins;
use crate::engine::Engine;
use crate::vm::suspend::{ArgLoc, BuiltinOutcome, CallArg, PendingCall};
use crate::vm::StackEntry;

pub fn run(engine: &mut Engine) {
    if let Some(pending) = engine.take_pending() {
        match resume(engine, pending) {
            Ok(true) => {}
            Ok(false) => return,
            Err(()) => return,
        }
    }

    let code = match engine.module() {
        Some(m) => m.code_from(engine.entry_offset()).to_vec(),
        None => {
            engine.fail_at(0, "execute called with no module loaded");
            return;
        }
    };

    loop {
        let pc = engine.pc();
        if pc >= code.len() {
            engine.fail_at(pc, "instruction cursor ran past the end of the code slice");
            return;
        }
        let Some(op) = Opcode::from_byte(code[pc]) else {
            engine.fail_at(pc, format!("unknown opcode 0x{:02X}", code[pc]));
            return;
        };

        match step(engine, &code, pc, op) {
            Ok(StepOutcome::Continue(next_pc)) => engine.set_pc(next_pc),
            Ok(StepOutcome::Suspended) => {
                engine.set_status(Status::Pending);
                return;
            }
            Ok(StepOutcome::Terminated) => return,
            Err(e) => {
                let err = e.at(pc);
                ria_core::error::set_last_error(err);
                engine.set_status(Status::Failed);
                return;
            }
        }
    }
}

/// Re-enters a parked built-in with its original arguments. Returns
/// `Ok(true)` to continue the opcode loop, `Ok(false)`/`Err(())` if the
/// engine already reached a stopping state.
fn resume(engine: &mut Engine, pending: PendingCall) -> Result<bool, ()> {
    engine.set_status(Status::Transit);
    match builtins::dispatch(engine, pending.id, &pending.args) {
        Ok(BuiltinOutcome::Pending) => {
            engine.set_pending(pending);
            engine.set_status(Status::Pending);
            Ok(false)
        }
        Ok(BuiltinOutcome::Ready(value)) => {
            engine.set_status(Status::Proceed);
            if pending.wants_value {
                engine.stack_mut().push(StackEntry::TempOwned(value));
            }
            Ok(true)
        }
        Err(e) => {
            let pos = engine.pc();
            ria_core::error::set_last_error(e.at(pos));
            engine.set_status(Status::Failed);
            Err(())
        }
    }
}

enum StepOutcome {
    Continue(usize),
    Suspended,
    Terminated,
}

fn pop(engine: &mut Engine) -> Result<StackEntry, RiaError> {
    engine
        .stack_mut()
        .pop()
        .ok_or_else(|| RiaError::new(ErrorCode::Internal, "vm/exec.rs", line!(), "operand stack underflow"))
}

fn resolve(engine: &Engine, entry: &StackEntry) -> Value {
    match entry {
        StackEntry::Var(idx) => engine.read_local(*idx).clone(),
        StackEntry::Global(idx) => engine.read_global(*idx).clone(),
        StackEntry::StrConst(idx) => Value::Str(engine.string_const(*idx)),
        StackEntry::Param(idx) => Value::Str(engine.param(*idx)),
        StackEntry::TempOwned(v) => v.clone(),
        StackEntry::Immediate(n) => Value::Int(*n),
    }
}

fn pop_value(engine: &mut Engine) -> Result<Value, RiaError> {
    let entry = pop(engine)?;
    Ok(resolve(engine, &entry))
}

fn type_err(detail: impl Into<String>) -> RiaError {
    RiaError::new(ErrorCode::Internal, "vm/exec.rs", line!(), detail)
}

fn need(code: &[u8], at: usize, len: usize) -> Result<&[u8], RiaError> {
    code.get(at..at + len).ok_or_else(|| type_err("instruction immediate runs past the code slice"))
}

fn byte(code: &[u8], next: &mut usize) -> Result<u8, RiaError> {
    let b = *need(code, *next, 1)?.first().unwrap();
    *next += 1;
    Ok(b)
}

fn u16_be(code: &[u8], next: &mut usize) -> Result<u16, RiaError> {
    let b = need(code, *next, 2)?;
    *next += 2;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

fn u24_be(code: &[u8], next: &mut usize) -> Result<u32, RiaError> {
    let b = need(code, *next, 3)?;
    *next += 3;
    Ok((b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32)
}

fn u32_be(code: &[u8], next: &mut usize) -> Result<u32, RiaError> {
    let b = need(code, *next, 4)?;
    *next += 4;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn i8_be(code: &[u8], next: &mut usize) -> Result<i8, RiaError> {
    Ok(byte(code, next)? as i8)
}

fn i16_be(code: &[u8], next: &mut usize) -> Result<i16, RiaError> {
    Ok(u16_be(code, next)? as i16)
}

/// Locals occupy indices 0..127, globals 128..255 (spec §3 "Variable
/// slot"); `StackEntry::Global`/`Engine::{read,write}_global` address the
/// globals vector with the index already shifted down to 0..127.
fn push_var(engine: &mut Engine, idx: u8) {
    engine.stack_mut().push(if idx < 128 { StackEntry::Var(idx) } else { StackEntry::Global(idx - 128) });
}

fn arith_or_bool(op: Opcode, lhs: Value, rhs: Value, is_add: bool) -> Result<Value, RiaError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(if is_add { a.wrapping_add(b) } else { a.wrapping_sub(b) })),
        (Value::Str(a), Value::Str(b)) if is_add => Ok(Value::Str(a.concat(&b))),
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if is_add { a || b } else { a && b })),
        _ => Err(type_err(format!("{} requires matching operand types", op.mnemonic()))),
    }
}

fn int_binop(op: Opcode, lhs: Value, rhs: Value) -> Result<Value, RiaError> {
    let (Value::Int(a), Value::Int(b)) = (lhs, rhs) else {
        return Err(type_err(format!("{} requires int operands", op.mnemonic())));
    };
    let r = match op {
        Opcode::Mul => a.wrapping_mul(b),
        Opcode::Div => a.checked_div(b).unwrap_or(0),
        Opcode::Rem => a.checked_rem(b).unwrap_or(0),
        Opcode::Band => a & b,
        Opcode::Bor => a | b,
        Opcode::Xor => a ^ b,
        _ => unreachable!(),
    };
    Ok(Value::Int(r))
}

fn compare(op: Opcode, lhs: Value, rhs: Value) -> Result<bool, RiaError> {
    use std::cmp::Ordering;
    let ord = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp_unsigned(b),
        _ => return Err(type_err("comparisons require two operands of the same type (int or string)")),
    };
    Ok(match op {
        Opcode::Less => ord == Ordering::Less,
        Opcode::More => ord == Ordering::Greater,
        Opcode::LessEq => ord != Ordering::Greater,
        Opcode::MoreEq => ord != Ordering::Less,
        Opcode::Eq => ord == Ordering::Equal,
        Opcode::NotEq => ord != Ordering::Equal,
        _ => unreachable!(),
    })
}

fn do_call(engine: &mut Engine, resume_pc: usize, id: u16, wants_value: bool) -> Result<StepOutcome, RiaError> {
    let sig = ria_core::builtins::by_id(id)
        .ok_or_else(|| RiaError::new(ErrorCode::Internal, "vm/exec.rs", line!(), format!("call to unknown built-in id {id}")))?;
    let mut entries = Vec::with_capacity(sig.arity);
    for _ in 0..sig.arity {
        entries.push(pop(engine)?);
    }
    entries.reverse();

    let mut args = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let loc = match entry {
            StackEntry::Var(idx) if sig.byref_params.contains(&i) => ArgLoc::Var(*idx),
            StackEntry::Global(idx) if sig.byref_params.contains(&i) => ArgLoc::Global(*idx),
            _ => ArgLoc::None,
        };
        args.push(CallArg { value: resolve(engine, entry), loc });
    }

    engine.set_status(Status::Transit);
    match builtins::dispatch(engine, id, &args)? {
        BuiltinOutcome::Ready(value) => {
            engine.set_status(Status::Proceed);
            if wants_value {
                engine.stack_mut().push(StackEntry::TempOwned(value));
            }
            Ok(StepOutcome::Continue(resume_pc))
        }
        BuiltinOutcome::Pending => {
            engine.set_pending(PendingCall { id, args, wants_value });
            Ok(StepOutcome::Suspended)
        }
    }
}

fn step(engine: &mut Engine, code: &[u8], pc: usize, op: Opcode) -> Result<StepOutcome, RiaError> {
    use Opcode::*;
    let mut next = pc + 1;

    match op {
        PushV => {
            let idx = byte(code, &mut next)?;
            push_var(engine, idx);
        }
        PushS => {
            let idx = byte(code, &mut next)? as u16;
            engine.stack_mut().push(StackEntry::StrConst(idx));
        }
        PushS2 => {
            let idx = u16_be(code, &mut next)?;
            engine.stack_mut().push(StackEntry::StrConst(idx));
        }
        PushP => {
            let idx = byte(code, &mut next)?;
            engine.stack_mut().push(StackEntry::Param(idx));
        }
        PushI1 => {
            let n = byte(code, &mut next)? as u32;
            engine.stack_mut().push(StackEntry::Immediate(n));
        }
        PushI2 => {
            let n = u16_be(code, &mut next)? as u32;
            engine.stack_mut().push(StackEntry::Immediate(n));
        }
        PushI3 => {
            let n = u24_be(code, &mut next)?;
            engine.stack_mut().push(StackEntry::Immediate(n));
        }
        PushI4 => {
            let n = u32_be(code, &mut next)?;
            engine.stack_mut().push(StackEntry::Immediate(n));
        }
        Pop => {
            let idx = byte(code, &mut next)?;
            let entry = pop(engine)?;
            let value = resolve(engine, &entry);
            if idx < 128 {
                engine.write_local(idx, value);
            } else {
                engine.write_global(idx - 128, value);
            }
        }
        Add | Sub => {
            let rhs = pop_value(engine)?;
            let lhs = pop_value(engine)?;
            let result = arith_or_bool(op, lhs, rhs, op == Add)?;
            engine.stack_mut().push(StackEntry::TempOwned(result));
        }
        Mul | Div | Rem | Band | Bor | Xor => {
            let rhs = pop_value(engine)?;
            let lhs = pop_value(engine)?;
            let result = int_binop(op, lhs, rhs)?;
            engine.stack_mut().push(StackEntry::TempOwned(result));
        }
        Neg => {
            let v = pop_value(engine)?;
            let result = match v {
                Value::Int(n) => Value::Int(0u32.wrapping_sub(n)),
                Value::Bool(b) => Value::Bool(!b),
                _ => return Err(type_err("neg/not requires an int or boolean operand")),
            };
            engine.stack_mut().push(StackEntry::TempOwned(result));
        }
        BNeg => {
            let v = pop_value(engine)?;
            let n = v.as_int().ok_or_else(|| type_err("bneg requires an int operand"))?;
            engine.stack_mut().push(StackEntry::TempOwned(Value::Int(!n)));
        }
        Less | More | LessEq | MoreEq | Eq | NotEq => {
            let rhs = pop_value(engine)?;
            let lhs = pop_value(engine)?;
            let result = compare(op, lhs, rhs)?;
            engine.stack_mut().push(StackEntry::TempOwned(Value::Bool(result)));
        }
        Jmp => {
            let k = i8_be(code, &mut next)?;
            next = (pc as isize + k as isize) as usize;
        }
        Jmp2 => {
            let k = i16_be(code, &mut next)?;
            next = (pc as isize + k as isize) as usize;
        }
        Jif => {
            let cond = pop_bool(engine)?;
            let k = i8_be(code, &mut next)?;
            if !cond {
                next = (pc as isize + k as isize) as usize;
            }
        }
        Jif2 => {
            let cond = pop_bool(engine)?;
            let k = i16_be(code, &mut next)?;
            if !cond {
                next = (pc as isize + k as isize) as usize;
            }
        }
        Jit => {
            let cond = pop_bool(engine)?;
            let k = i8_be(code, &mut next)?;
            if cond {
                next = (pc as isize + k as isize) as usize;
            }
        }
        Jit2 => {
            let cond = pop_bool(engine)?;
            let k = i16_be(code, &mut next)?;
            if cond {
                next = (pc as isize + k as isize) as usize;
            }
        }
        CallP => {
            let id = byte(code, &mut next)? as u16;
            return finish_call(engine, next, id, true);
        }
        Call2P => {
            let id = u16_be(code, &mut next)?;
            return finish_call(engine, next, id, true);
        }
        CallI => {
            let id = byte(code, &mut next)? as u16;
            return finish_call(engine, next, id, false);
        }
        Call2I => {
            let id = u16_be(code, &mut next)?;
            return finish_call(engine, next, id, false);
        }
        Ret => {
            let entry = pop(engine)?;
            let value = resolve(engine, &entry);
            engine.set_result(value);
            engine.set_status(if engine.parser_ready() { Status::OkParserReady } else { Status::Ok });
            return Ok(StepOutcome::Terminated);
        }
        RetN => {
            engine.set_result(Value::Unknown);
            engine.set_status(if engine.parser_ready() { Status::OkParserReady } else { Status::Ok });
            return Ok(StepOutcome::Terminated);
        }
    }

    Ok(StepOutcome::Continue(next))
}

fn pop_bool(engine: &mut Engine) -> Result<bool, RiaError> {
    pop_value(engine)?.as_bool().ok_or_else(|| type_err("conditional branch requires a boolean operand"))
}

/// `do_call` needs the cursor position *after* the call's immediate to
/// park as the resume point; `finish_call` wraps it so `step` can
/// `return` directly from the `CallP`/`Call2P`/`CallI`/`Call2I` arms.
fn finish_call(engine: &mut Engine, next: usize, id: u16, wants_value: bool) -> Result<StepOutcome, RiaError> {
    match do_call(engine, next, id, wants_value)? {
        StepOutcome::Continue(_) => Ok(StepOutcome::Continue(next)),
        other => {
            engine.set_pc(next);
            Ok(other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn run_entry(source: &str, entry: &str, params: Vec<&str>) -> Engine {
        let bytes = ria_compiler::compile(source).expect("script compiles");
        let module = crate::loader::load(bytes).expect("module loads");
        let sym = module.find_entry(entry).expect("entry exists");
        let mut engine = Engine::new(EngineConfig::default());
        engine.set_entry_offset(sym.entry_offset);
        engine.reset_for_call(params.into_iter().map(ria_core::RString::from_str).collect());
        engine.load_module(module);
        run(&mut engine);
        engine
    }

    /// Spec §8 property 2: after a terminal status, the operand stack is
    /// empty (and with it every temp, since temps live on the stack as
    /// `StackEntry::TempOwned` rather than in a separate slot table).
    #[test]
    fn stack_is_empty_after_a_terminal_status_even_with_branches_and_calls() {
        let src = "count(0){ $i=0; $s=\"\"; while ($i<3) { $s=$s+int_to_string($i); $i=$i+1; } return($s); }";
        let mut engine = run_entry(src, "count", vec![]);
        assert_eq!(engine.status(), Status::Ok);
        assert!(engine.stack_mut().is_empty());
    }

    /// Forward (`if`) and backward (`while`) branch offsets both measure
    /// relative to the branch opcode's own first byte; a wrong convention
    /// in either direction would desync the cursor and either infinite
    /// loop or land mid-instruction. Covers spec §8 property 1 for a
    /// program that actually exercises both branch directions.
    #[test]
    fn forward_and_backward_branches_land_on_real_instruction_boundaries() {
        let src = "test(0){ $a=10; if ($a > 5) { return(\"big\"); } return(\"small\"); }";
        let engine = run_entry(src, "test", vec![]);
        assert_eq!(engine.status(), Status::Ok);
        assert_eq!(engine.result(), &Value::Str(ria_core::RString::from_str("big")));
    }

    /// An opcode byte outside the fixed table fails the call rather than
    /// reading the unknown byte as an instruction of some sort.
    #[test]
    fn unrecognised_opcode_byte_fails_cleanly() {
        assert!(Opcode::from_byte(0xFF).is_none());
    }

    /// Spec §4.4: once a parser session is live, a terminal `return`
    /// reports `ok_parser_ready` instead of plain `ok`.
    #[test]
    fn terminal_status_is_ok_parser_ready_once_a_parser_session_is_live() {
        let src = "f(0){ return(1); }";
        let mut engine = run_entry(src, "f", vec![]);
        assert_eq!(engine.status(), Status::Ok);
        engine.start_parser_session(b"irrelevant".to_vec());
        // Re-run the same compiled code with the parser session now live.
        engine.reset_for_call(vec![]);
        run(&mut engine);
        assert_eq!(engine.status(), Status::OkParserReady);
    }
}
