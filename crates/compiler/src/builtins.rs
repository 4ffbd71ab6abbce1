//! The fixed built-in table the compiler checks call sites against (spec
//! §4.4). The table itself lives in `ria_core::builtins` so the compiler's
//! arity/byref checks and the runtime's call dispatch can never drift on
//! which ID means what.

pub use ria_core::builtins::{by_id, lookup, BuiltinSig, BUILTINS};

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
}
