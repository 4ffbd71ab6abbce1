//! Bytecode module loader (spec §4.3 "Bytecode loader").
//!
//! Validates `strpool_offset` lies inside the module, walks the symbol
//! table, and eagerly decodes the string pool (small scripts; no benefit
//! to lazy decoding and it keeps `Module` an ordinary owned value).

use ria_core::module::{read_u24_be, SymbolEntry};
use ria_core::{ErrorCode, RiaError};

#[derive(Clone)]
pub struct Module {
    bytes: Vec<u8>,
    symbols: Vec<SymbolEntry>,
    strpool_offset: usize,
    strings: Vec<String>,
}

impl Module {
    /// Entry-point lookup is linear; names are compared case-sensitively
    /// (spec §4.3).
    pub fn find_entry(&self, name: &str) -> Option<&SymbolEntry> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Code slice for the given entry point, bounded by the string pool
    /// (spec §4.3: `[entry_offset .. strpool_offset)`).
    pub fn code_from(&self, entry_offset: u32) -> &[u8] {
        &self.bytes[entry_offset as usize..self.strpool_offset]
    }

    pub fn string(&self, idx: u16) -> Option<&str> {
        self.strings.get(idx as usize).map(String::as_str)
    }
}

pub fn load(bytes: Vec<u8>) -> Result<Module, RiaError> {
    if bytes.len() < 4 {
        return Err(corrupt("module shorter than the fixed header"));
    }
    let fn_count = bytes[0] as usize;
    let strpool_offset = ((bytes[1] as usize) << 16) | ((bytes[2] as usize) << 8) | bytes[3] as usize;
    if strpool_offset > bytes.len() {
        return Err(corrupt("strpool_offset points past the end of the module"));
    }

    let mut cursor = 4usize;
    let mut symbols = Vec::with_capacity(fn_count);
    for _ in 0..fn_count {
        let name_len = *bytes.get(cursor).ok_or_else(|| corrupt("symbol table truncated"))? as usize;
        cursor += 1;
        let name_bytes = bytes
            .get(cursor..cursor + name_len)
            .ok_or_else(|| corrupt("symbol name overruns module"))?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();
        cursor += name_len;
        let param_count = *bytes.get(cursor).ok_or_else(|| corrupt("symbol table truncated"))?;
        cursor += 1;
        let entry_offset =
            read_u24_be(&bytes[cursor..]).ok_or_else(|| corrupt("symbol table truncated"))?;
        cursor += 3;
        if entry_offset as usize > strpool_offset {
            return Err(corrupt("entry_offset points past the string pool"));
        }
        symbols.push(SymbolEntry { name, param_count, entry_offset });
    }
    if cursor > strpool_offset {
        return Err(corrupt("symbol table overruns the code segment"));
    }

    let strings = decode_string_pool(&bytes, strpool_offset)?;

    Ok(Module { bytes, symbols, strpool_offset, strings })
}

fn decode_string_pool(bytes: &[u8], mut cursor: usize) -> Result<Vec<String>, RiaError> {
    let mut strings = Vec::new();
    while cursor < bytes.len() {
        let len = bytes[cursor] as usize;
        cursor += 1;
        let entry = bytes
            .get(cursor..cursor + len)
            .ok_or_else(|| corrupt("string pool entry overruns module"))?;
        cursor += len;
        let (content, terminator) = entry.split_at(len.saturating_sub(1));
        if terminator != [0] {
            return Err(corrupt("string pool entry missing NUL terminator"));
        }
        strings.push(String::from_utf8_lossy(content).into_owned());
    }
    Ok(strings)
}

fn corrupt(detail: &str) -> RiaError {
    RiaError::new(ErrorCode::DataCorrupted, "loader.rs", line!(), detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_module() -> Vec<u8> {
        // fn_count=1, strpool_offset filled below.
        let mut code = vec![0x61]; // RetN
        let symtable_len = 1 + 1 + 1 + 3; // name_len + "f" + param_count + entry_offset
        let code_base = 4 + symtable_len;
        let strpool_offset = code_base + code.len();
        let mut out = vec![1u8, 0, 0, 0];
        out[1] = (strpool_offset >> 16) as u8;
        out[2] = (strpool_offset >> 8) as u8;
        out[3] = strpool_offset as u8;
        out.push(1); // name_len
        out.push(b'f');
        out.push(0); // param_count
        out.extend_from_slice(&[0, (code_base >> 8) as u8, code_base as u8]);
        out.append(&mut code);
        out
    }

    #[test]
    fn finds_entry_by_name() {
        let m = load(tiny_module()).unwrap();
        let sym = m.find_entry("f").unwrap();
        assert_eq!(sym.param_count, 0);
        assert_eq!(m.code_from(sym.entry_offset), &[0x61]);
    }

    #[test]
    fn rejects_out_of_range_strpool_offset() {
        let mut bytes = tiny_module();
        bytes[1] = 0xFF;
        bytes[2] = 0xFF;
        bytes[3] = 0xFF;
        assert!(load(bytes).is_err());
    }
}
