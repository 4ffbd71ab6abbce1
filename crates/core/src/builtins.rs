//! The fixed built-in table (spec §4.4 "Built-ins (fixed table; assigned
//! opcode IDs)").
//!
//! IDs are part of the bytecode wire contract: the table only ever grows,
//! never renumbers. Shared by the compiler (arity/byref checking at
//! compile time) and the runtime (dispatch at call time) so the two can
//! never drift on which ID means what.

use crate::value::ValueType;

#[derive(Debug, Clone, Copy)]
pub struct BuiltinSig {
    pub name: &'static str,
    pub id: u16,
    pub arity: usize,
    pub returns: ValueType,
    /// Zero-based argument positions that must be a `$var` operand.
    pub byref_params: &'static [usize],
}

macro_rules! builtins {
    ( $( $id:literal => $name:literal, arity $arity:literal, returns $ret:ident $(, byref $byref:expr)? ; )* ) => {
        pub const BUILTINS: &[BuiltinSig] = &[
            $(
                BuiltinSig {
                    name: $name,
                    id: $id,
                    arity: $arity,
                    returns: ValueType::$ret,
                    byref_params: builtins!(@byref $( $byref )?),
                },
            )*
        ];
    };
    (@byref) => { &[] };
    (@byref $byref:expr) => { $byref };
}

builtins! {
    1  => "extract_string",               arity 4, returns Str, byref &[1];
    2  => "extract_string_from_file",     arity 4, returns Str, byref &[1];
    3  => "substring",                    arity 3, returns Str;
    4  => "length",                       arity 1, returns Int;
    5  => "dehtml",                       arity 1, returns Str;
    6  => "int_to_string",                arity 1, returns Str;
    7  => "string_to_int",                arity 1, returns Int;
    8  => "load_from_file",               arity 1, returns Str;
    9  => "save_to_file",                 arity 2, returns Bool;
    10 => "get_html",                     arity 1, returns Str;
    11 => "get_html_with_dump",           arity 2, returns Str;
    12 => "get_html_to_file",             arity 2, returns Bool;
    13 => "get_html_to_file_with_dump",   arity 3, returns Bool;
    14 => "get_binary_to_file",           arity 2, returns Bool;
    15 => "post",                         arity 2, returns Str;
    16 => "post_with_dump",               arity 3, returns Str;
    17 => "post_to_file",                 arity 3, returns Bool;
    18 => "post_to_file_with_dump",       arity 4, returns Bool;
    19 => "last_response",                arity 1, returns Str;
    20 => "get_header",                   arity 1, returns Str;
    21 => "set_header",                   arity 2, returns Bool;
    22 => "load_cookie",                  arity 1, returns Bool;
    23 => "save_cookie",                  arity 1, returns Bool;
    24 => "create_parser_for_file",       arity 1, returns Bool;
    25 => "add_parsing_rule",             arity 4, returns Bool;
}

pub fn lookup(name: &str) -> Option<&'static BuiltinSig> {
    BUILTINS.iter().find(|b| b.name == name)
}

pub fn by_id(id: u16) -> Option<&'static BuiltinSig> {
    BUILTINS.iter().find(|b| b.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        for (i, b) in BUILTINS.iter().enumerate() {
            assert_eq!(b.id as usize, i + 1);
        }
    }

    #[test]
    fn extract_string_takes_pos_by_reference() {
        let sig = lookup("extract_string_from_file").unwrap();
        assert_eq!(sig.byref_params, &[1]);
        assert_eq!(sig.arity, 4);
    }

    #[test]
    fn unknown_name_is_none() {
        assert!(lookup("not_a_builtin").is_none());
    }

    #[test]
    fn by_id_matches_lookup() {
        let sig = lookup("post").unwrap();
        assert_eq!(by_id(15).unwrap().name, sig.name);
    }
}
