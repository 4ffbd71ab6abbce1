//! RIA compiler: canonicalise → lex → parse → emit module bytes (spec
//! §4.1, §4.2, §3 "Module layout").
//!
//! The public entry point is [`compile`]: it takes raw script text and
//! returns either the module's on-disk byte layout or a [`CompileError`]
//! whose position has already been translated back through
//! canonicalisation to point at the original source the user wrote.

pub mod ast;
pub mod builtins;
pub mod canon;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod types;

use ria_core::module::{write_u24_be, MAX_U24};

pub use codegen::CompiledProgram;
pub use error::CompileError;

pub fn compile(source: &str) -> Result<Vec<u8>, CompileError> {
    let canon = canon::canonicalise(source);
    let tokens = lexer::lex(canon.as_str())
        .map_err(|e| CompileError::at(canon.original_pos(e.pos), e.message))?;
    let program =
        parser::parse(tokens).map_err(|e| CompileError::at(canon.original_pos(e.pos), e.message))?;
    let compiled = codegen::compile_program(&program)
        .map_err(|e| CompileError::at(canon.original_pos(e.pos), e.message))?;
    write_module(&compiled)
}

/// Assemble the compiled functions and string pool into the on-disk
/// module layout described in spec §3.
fn write_module(compiled: &CompiledProgram) -> Result<Vec<u8>, CompileError> {
    if compiled.functions.len() > 255 {
        return Err(CompileError::at(0, "more than 255 entry points in one module"));
    }

    let symtable_len: usize =
        compiled.functions.iter().map(|f| 1 + f.name.len() + 1 + 3).sum();
    let code_base = 1 + 3 + symtable_len;
    let total_code_len: usize = compiled.functions.iter().map(|f| f.code.len()).sum();
    let strpool_offset = code_base + total_code_len;
    if strpool_offset as u32 > MAX_U24 {
        return Err(CompileError::at(0, "module exceeds the 24-bit offset range"));
    }

    let mut out = Vec::with_capacity(strpool_offset + 64);
    out.push(compiled.functions.len() as u8);
    write_u24_be(&mut out, strpool_offset as u32);

    let mut running = code_base;
    let mut entry_offsets = Vec::with_capacity(compiled.functions.len());
    for f in &compiled.functions {
        entry_offsets.push(running as u32);
        running += f.code.len();
    }
    for (f, entry_offset) in compiled.functions.iter().zip(&entry_offsets) {
        out.push(f.name.len() as u8);
        out.extend_from_slice(f.name.as_bytes());
        out.push(f.param_count);
        write_u24_be(&mut out, *entry_offset);
    }
    for f in &compiled.functions {
        out.extend_from_slice(&f.code);
    }
    for s in &compiled.strings {
        let bytes = s.as_bytes();
        if bytes.len() + 1 > 255 {
            return Err(CompileError::at(0, format!("string constant '{s}' exceeds 254 bytes")));
        }
        out.push((bytes.len() + 1) as u8);
        out.extend_from_slice(bytes);
        out.push(0);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_arithmetic_fold_deterministically() {
        let src = "calc(0){ return(2+3*4); }";
        let a = compile(src).unwrap();
        let b = compile(src).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn header_fields_match_layout() {
        let module = compile("f(1){return(0);}").unwrap();
        assert_eq!(module[0], 1); // fn_count
        let strpool_offset = (module[1] as u32) << 16 | (module[2] as u32) << 8 | module[3] as u32;
        assert!((strpool_offset as usize) <= module.len());
    }

    #[test]
    fn compile_error_position_maps_back_to_original_source() {
        let src = "  f(0){ return($missing); }";
        let err = compile(src).unwrap_err();
        assert_eq!(&src[err.pos..err.pos + 8], "$missing");
    }
}
