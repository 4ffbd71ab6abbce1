//! Bytecode emitter (spec §4.2 "Bytecode (stack machine)").
//!
//! One `FunctionCompiler` per entry point, sharing a module-wide string
//! pool and global symbol table. Branches are emitted the way the spec
//! describes: the target region is compiled into a standalone buffer
//! first so its exact length is known, then the minimal jump form (2-
//! or 3-byte) that covers that length is chosen and prepended.

use std::collections::HashMap;

use ria_core::{module::MAX_NAME_LEN, Opcode, ValueType};

use crate::ast::{BinOp, Expr, FunctionDef, Program, Stmt, UnaryOp};
use crate::builtins::{self, BuiltinSig};
use crate::error::{type_error_at, CompileError};
use crate::types::{fold_binop, fold_unop};

const MAX_LOCALS: usize = 128;
const MAX_GLOBALS: usize = 128;

pub struct CompiledFunction {
    pub name: String,
    pub param_count: u8,
    pub code: Vec<u8>,
}

pub struct CompiledProgram {
    pub functions: Vec<CompiledFunction>,
    pub strings: Vec<String>,
}

#[derive(Default)]
struct StringPool {
    order: Vec<String>,
    index: HashMap<String, u16>,
}

impl StringPool {
    fn intern(&mut self, s: &str) -> u16 {
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.order.len() as u16;
        self.order.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }
}

pub fn compile_program(program: &Program) -> Result<CompiledProgram, CompileError> {
    if program.functions.len() > 255 {
        return Err(CompileError::at(0, "more than 255 entry points in one module"));
    }

    let mut global_index = HashMap::new();
    let mut global_types = HashMap::new();
    for (i, g) in program.globals.iter().enumerate() {
        if i >= MAX_GLOBALS {
            return Err(CompileError::at(g.pos, "more than 128 globals declared"));
        }
        if global_index.insert(g.name.clone(), (128 + i) as u8).is_some() {
            return Err(CompileError::at(g.pos, format!("global '${}' redeclared", g.name)));
        }
        if let Some(t) = g.declared_type {
            global_types.insert(g.name.clone(), t);
        }
    }

    let mut strings = StringPool::default();
    let mut functions = Vec::with_capacity(program.functions.len());
    for f in &program.functions {
        if f.name.len() > MAX_NAME_LEN {
            return Err(CompileError::at(f.pos, "entry point name too long"));
        }
        let mut fc = FunctionCompiler {
            locals: Vec::new(),
            local_index: HashMap::new(),
            global_index: &global_index,
            global_types: &mut global_types,
            strings: &mut strings,
            code: Vec::new(),
        };
        fc.gen_function_body(f)?;
        functions.push(CompiledFunction { name: f.name.clone(), param_count: f.arity, code: fc.code });
    }

    Ok(CompiledProgram { functions, strings: strings.order })
}

struct FunctionCompiler<'a> {
    locals: Vec<(String, ValueType)>,
    local_index: HashMap<String, u8>,
    global_index: &'a HashMap<String, u8>,
    global_types: &'a mut HashMap<String, ValueType>,
    strings: &'a mut StringPool,
    code: Vec<u8>,
}

enum VarLoc {
    Local(u8),
    Global(u8),
}

impl<'a> FunctionCompiler<'a> {
    fn gen_function_body(&mut self, f: &FunctionDef) -> Result<(), CompileError> {
        self.gen_block(&f.body)?;
        let ends_in_return = matches!(
            self.code.last().copied(),
            Some(b) if b == Opcode::Ret.to_byte() || b == Opcode::RetN.to_byte()
        );
        if !ends_in_return {
            self.code.push(Opcode::RetN.to_byte());
        }
        Ok(())
    }

    fn gen_block(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        for s in stmts {
            self.gen_stmt(s)?;
        }
        Ok(())
    }

    fn resolve_read(&self, name: &str, pos: usize) -> Result<(VarLoc, ValueType), CompileError> {
        if let Some(&idx) = self.local_index.get(name) {
            let t = self.locals[idx as usize].1;
            return Ok((VarLoc::Local(idx), t));
        }
        if let Some(&idx) = self.global_index.get(name) {
            let t = self
                .global_types
                .get(name)
                .copied()
                .ok_or_else(|| CompileError::at(pos, format!("global '${name}' read before its type is known")))?;
            return Ok((VarLoc::Global(idx), t));
        }
        Err(CompileError::at(pos, format!("undeclared variable '${name}'")))
    }

    fn resolve_write(&mut self, name: &str, pos: usize, rhs_type: ValueType) -> Result<VarLoc, CompileError> {
        if let Some(&idx) = self.global_index.get(name) {
            match self.global_types.get(name) {
                Some(&t) if t != rhs_type => {
                    return Err(CompileError::at(
                        pos,
                        format!("global '${name}' declared/inferred as {t}, assigned {rhs_type}"),
                    ))
                }
                _ => {
                    self.global_types.insert(name.to_string(), rhs_type);
                }
            }
            return Ok(VarLoc::Global(idx));
        }
        if let Some(&idx) = self.local_index.get(name) {
            let declared = self.locals[idx as usize].1;
            if declared != rhs_type {
                return Err(CompileError::at(
                    pos,
                    format!("local '${name}' first inferred as {declared}, assigned {rhs_type}"),
                ));
            }
            return Ok(VarLoc::Local(idx));
        }
        if self.locals.len() >= MAX_LOCALS {
            return Err(CompileError::at(pos, "more than 128 locals in one function"));
        }
        let idx = self.locals.len() as u8;
        self.locals.push((name.to_string(), rhs_type));
        self.local_index.insert(name.to_string(), idx);
        Ok(VarLoc::Local(idx))
    }

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Assign { name, expr, pos } => {
                let t = self.gen_expr(expr)?;
                let loc = self.resolve_write(name, *pos, t)?;
                match loc {
                    VarLoc::Local(idx) | VarLoc::Global(idx) => {
                        self.code.push(Opcode::Pop.to_byte());
                        self.code.push(idx);
                    }
                }
            }
            Stmt::Return { expr, .. } => {
                self.gen_expr(expr)?;
                self.code.push(Opcode::Ret.to_byte());
            }
            Stmt::CallStmt { name, args, pos } => {
                self.gen_call(name, args, *pos, false)?;
            }
            Stmt::If { cond, then_body, else_body, pos } => {
                self.gen_if(cond, then_body, else_body.as_deref(), *pos)?;
            }
            Stmt::While { cond, body, pos } => {
                self.gen_while(cond, body, *pos)?;
            }
        }
        Ok(())
    }

    /// Swap in a fresh code buffer, let `f` emit into it, then restore the
    /// original and return what `f` produced.
    fn capture<F>(&mut self, f: F) -> Result<Vec<u8>, CompileError>
    where
        F: FnOnce(&mut Self) -> Result<(), CompileError>,
    {
        let saved = std::mem::take(&mut self.code);
        let result = f(self);
        let body = std::mem::replace(&mut self.code, saved);
        result?;
        Ok(body)
    }

    fn gen_if(
        &mut self,
        cond: &Expr,
        then_body: &[Stmt],
        else_body: Option<&[Stmt]>,
        pos: usize,
    ) -> Result<(), CompileError> {
        let t = self.gen_expr(cond)?;
        if t != ValueType::Bool {
            return Err(CompileError::at(pos, "if condition must be boolean"));
        }
        let then_bytes = self.capture(|s| s.gen_block(then_body))?;
        if let Some(else_body) = else_body {
            let else_bytes = self.capture(|s| s.gen_block(else_body))?;
            let jmp_over_else_width = branch_width(else_bytes.len());
            let then_total = then_bytes.len() + jmp_over_else_width;
            write_forward_branch(&mut self.code, Opcode::Jif, Opcode::Jif2, then_total);
            self.code.extend_from_slice(&then_bytes);
            write_forward_branch(&mut self.code, Opcode::Jmp, Opcode::Jmp2, else_bytes.len());
            self.code.extend_from_slice(&else_bytes);
        } else {
            write_forward_branch(&mut self.code, Opcode::Jif, Opcode::Jif2, then_bytes.len());
            self.code.extend_from_slice(&then_bytes);
        }
        Ok(())
    }

    fn gen_while(&mut self, cond: &Expr, body: &[Stmt], pos: usize) -> Result<(), CompileError> {
        let loop_start = self.code.len();
        let t = self.gen_expr(cond)?;
        if t != ValueType::Bool {
            return Err(CompileError::at(pos, "while condition must be boolean"));
        }
        let cond_end = self.code.len();
        let body_bytes = self.capture(|s| s.gen_block(body))?;

        let (jif_width, back_width) = {
            let back_pos_guess = cond_end + 2 + body_bytes.len();
            let back_w = backward_width(loop_start, back_pos_guess);
            let total_skip = body_bytes.len() + back_w;
            if 2 + total_skip <= 127 {
                (2usize, back_w)
            } else {
                let back_pos_guess2 = cond_end + 3 + body_bytes.len();
                let back_w2 = backward_width(loop_start, back_pos_guess2);
                (3usize, back_w2)
            }
        };
        let total_skip = body_bytes.len() + back_width;
        if jif_width == 2 {
            self.code.push(Opcode::Jif.to_byte());
            self.code.push((2 + total_skip) as u8);
        } else {
            self.code.push(Opcode::Jif2.to_byte());
            self.code.extend_from_slice(&((3 + total_skip) as i16).to_be_bytes());
        }
        self.code.extend_from_slice(&body_bytes);
        let back_opcode_pos = self.code.len();
        let k_back = loop_start as isize - back_opcode_pos as isize;
        if back_width == 2 {
            self.code.push(Opcode::Jmp.to_byte());
            self.code.push(k_back as i8 as u8);
        } else {
            self.code.push(Opcode::Jmp2.to_byte());
            self.code.extend_from_slice(&(k_back as i16).to_be_bytes());
        }
        Ok(())
    }

    fn gen_call(
        &mut self,
        name: &str,
        args: &[Expr],
        pos: usize,
        wants_value: bool,
    ) -> Result<ValueType, CompileError> {
        let sig: &BuiltinSig =
            builtins::lookup(name).ok_or_else(|| CompileError::at(pos, format!("unknown built-in '{name}'")))?;
        if args.len() != sig.arity {
            return Err(CompileError::at(
                pos,
                format!("'{name}' takes {} argument(s), found {}", sig.arity, args.len()),
            ));
        }
        for (i, arg) in args.iter().enumerate() {
            if sig.byref_params.contains(&i) && !matches!(arg, Expr::Var { .. }) {
                return Err(CompileError::at(
                    arg.pos().max(pos),
                    format!("argument {} of '{name}' must be a variable", i + 1),
                ));
            }
            self.gen_expr(arg)?;
        }
        let id = sig.id;
        if wants_value {
            if id <= 0xFF {
                self.code.push(Opcode::CallP.to_byte());
                self.code.push(id as u8);
            } else {
                self.code.push(Opcode::Call2P.to_byte());
                self.code.extend_from_slice(&id.to_be_bytes());
            }
        } else if id <= 0xFF {
            self.code.push(Opcode::CallI.to_byte());
            self.code.push(id as u8);
        } else {
            self.code.push(Opcode::Call2I.to_byte());
            self.code.extend_from_slice(&id.to_be_bytes());
        }
        Ok(sig.returns)
    }

    fn gen_expr(&mut self, expr: &Expr) -> Result<ValueType, CompileError> {
        match expr {
            Expr::Var { name, pos } => {
                let (loc, t) = self.resolve_read(name, *pos)?;
                match loc {
                    VarLoc::Local(idx) | VarLoc::Global(idx) => {
                        self.code.push(Opcode::PushV.to_byte());
                        self.code.push(idx);
                    }
                }
                Ok(t)
            }
            Expr::Param { index, pos } => {
                if *index > 255 {
                    return Err(CompileError::at(*pos, "caller-parameter index must be <= 255"));
                }
                self.code.push(Opcode::PushP.to_byte());
                self.code.push(*index as u8);
                Ok(ValueType::Str)
            }
            Expr::Str { value, .. } => {
                let idx = self.strings.intern(value);
                if idx <= 0xFF {
                    self.code.push(Opcode::PushS.to_byte());
                    self.code.push(idx as u8);
                } else {
                    self.code.push(Opcode::PushS2.to_byte());
                    self.code.extend_from_slice(&idx.to_be_bytes());
                }
                Ok(ValueType::Str)
            }
            Expr::Int { value, .. } => {
                push_int(&mut self.code, *value);
                Ok(ValueType::Int)
            }
            Expr::Call { name, args, pos } => self.gen_call(name, args, *pos, true),
            Expr::Unary { op, operand, pos } => {
                let t = self.gen_expr(operand)?;
                let result = fold_unop(*op, t).map_err(|e| type_error_at(*pos, e))?;
                let opcode = match op {
                    UnaryOp::Neg | UnaryOp::Not => Opcode::Neg,
                    UnaryOp::BitNot => Opcode::BNeg,
                };
                self.code.push(opcode.to_byte());
                Ok(result)
            }
            Expr::Binary { lhs, op, rhs, pos } => {
                let lt = self.gen_expr(lhs)?;
                let rt = self.gen_expr(rhs)?;
                let result = fold_binop(*op, lt, rt).map_err(|e| type_error_at(*pos, e))?;
                let opcode = match op {
                    BinOp::Add | BinOp::Or => Opcode::Add,
                    BinOp::Sub | BinOp::And => Opcode::Sub,
                    BinOp::Mul => Opcode::Mul,
                    BinOp::Div => Opcode::Div,
                    BinOp::Rem => Opcode::Rem,
                    BinOp::BAnd => Opcode::Band,
                    BinOp::BOr => Opcode::Bor,
                    BinOp::Xor => Opcode::Xor,
                    BinOp::Lt => Opcode::Less,
                    BinOp::Gt => Opcode::More,
                    BinOp::Le => Opcode::LessEq,
                    BinOp::Ge => Opcode::MoreEq,
                    BinOp::Eq => Opcode::Eq,
                    BinOp::NotEq => Opcode::NotEq,
                };
                self.code.push(opcode.to_byte());
                Ok(result)
            }
        }
    }
}

fn push_int(code: &mut Vec<u8>, n: u32) {
    let be = n.to_be_bytes();
    let (opcode, width) = if n <= 0xFF {
        (Opcode::PushI1, 1)
    } else if n <= 0xFFFF {
        (Opcode::PushI2, 2)
    } else if n <= 0x00FF_FFFF {
        (Opcode::PushI3, 3)
    } else {
        (Opcode::PushI4, 4)
    };
    code.push(opcode.to_byte());
    code.extend_from_slice(&be[4 - width..]);
}

fn branch_width(body_len: usize) -> usize {
    if 2 + body_len <= 127 {
        2
    } else {
        3
    }
}

fn backward_width(loop_start: usize, opcode_pos_guess: usize) -> usize {
    let k = loop_start as isize - opcode_pos_guess as isize;
    if (i8::MIN as isize..=i8::MAX as isize).contains(&k) {
        2
    } else {
        3
    }
}

fn write_forward_branch(code: &mut Vec<u8>, short: Opcode, long: Opcode, body_len: usize) {
    let k8 = 2 + body_len;
    if k8 <= 127 {
        code.push(short.to_byte());
        code.push(k8 as u8);
    } else {
        let k16 = 3 + body_len;
        code.push(long.to_byte());
        code.extend_from_slice(&(k16 as i16).to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::lex, parser::parse};

    fn compile(src: &str) -> CompiledProgram {
        let program = parse(lex(src).unwrap()).unwrap();
        compile_program(&program).unwrap()
    }

    #[test]
    fn left_to_right_fold_emits_add_before_mul() {
        // 2+3*4 folds left to right: (2+3)*4 = 20, so Add precedes Mul.
        let cp = compile("calc(0){return(2+3*4);}");
        let code = &cp.functions[0].code;
        let add_pos = code.iter().position(|&b| b == Opcode::Add.to_byte()).unwrap();
        let mul_pos = code.iter().position(|&b| b == Opcode::Mul.to_byte()).unwrap();
        assert!(add_pos < mul_pos);
    }

    #[test]
    fn every_function_ends_in_ret_or_retn() {
        let cp = compile("f(0){$a=1;}");
        let last = *cp.functions[0].code.last().unwrap();
        assert!(last == Opcode::Ret.to_byte() || last == Opcode::RetN.to_byte());
    }

    #[test]
    fn string_literals_are_deduplicated() {
        let cp = compile(r#"f(0){$a="x";$b="x";return($a);}"#);
        assert_eq!(cp.strings.len(), 1);
    }

    #[test]
    fn byref_argument_must_be_a_variable() {
        let program = parse(lex(r#"f(0){return(extract_string("h",0,"a","b"));}"#).unwrap()).unwrap();
        assert!(compile_program(&program).is_err());
    }

    #[test]
    fn mixed_type_assignment_is_rejected() {
        let program = parse(lex(r#"f(0){$a=1;$a="x";return(0);}"#).unwrap()).unwrap();
        assert!(compile_program(&program).is_err());
    }
}
