//! Parser bridge built-ins (spec §4.4 "Parser bridge": `create_parser_for_file`,
//! `add_parsing_rule`) and the `parse(rule_name, &pos)` host-facing
//! operation registered rules are driven through (spec §6, §3
//! "Parser-rule table").
//!
//! Rules with a hint starting with `+` are iteration rules carrying a
//! per-invocation cursor (spec §8 property 8: a `+D` rule on an input
//! with `k` occurrences returns the literal `"+"` exactly `k` times, then
//! `""`). Hints starting with `?` are one-shot detection rules: present
//! or not, no cursor to advance.

use ria_core::{RString, Value};

use crate::builtins::strings::{find_pattern, ExcludePairs};
use crate::engine::{Engine, ParserRule};

/// Balanced regions a rule lookup skips over while scanning for
/// `begin_pattern`/`end_pattern`, grounded on `_json_excludes` in
/// `ria_exec.c` (`ria_parser_action`): quoted strings, `[...]`, `{...}`.
const JSON_EXCLUDES: ExcludePairs = &[(b'"', b'"'), (b'[', b']'), (b'{', b'}')];

pub fn create_parser_for_file(engine: &mut Engine, path: &std::path::Path) -> Value {
    use crate::collaborators::filesystem::FileHandle;
    match FileHandle::open_read(path).and_then(|mut f| f.read_to_end()) {
        Ok(bytes) => {
            engine.start_parser_session(bytes);
            Value::Bool(true)
        }
        Err(_) => Value::Bool(false),
    }
}

pub fn add_parsing_rule(engine: &mut Engine, name: &str, begin: &str, end: &str, hint: &str) -> Value {
    Value::Bool(engine.add_parser_rule(ParserRule {
        name: name.to_string(),
        begin_pattern: begin.to_string(),
        end_pattern: end.to_string(),
        hint: hint.to_string(),
        pos: 0,
        iteration_started: false,
    }))
}

/// Drives one registered rule forward by one step, per the host-facing
/// `parse` operation (spec §6). `pos` is read for the scan start and
/// written back with the cursor's new position.
pub fn run_rule(source: &[u8], rule: &mut ParserRule, pos: &mut usize) -> RString {
    rule.pos = rule.pos.max(*pos);

    if let Some(hint) = rule.hint.strip_prefix('?') {
        let _ = hint;
        let found = find_pattern(source, rule.pos, &rule.begin_pattern, JSON_EXCLUDES).is_some();
        return RString::from_str(if found { "+" } else { "" });
    }

    if let Some(hint) = rule.hint.strip_prefix('+') {
        let Some((begin_start, begin_end)) = find_pattern(source, rule.pos, &rule.begin_pattern, JSON_EXCLUDES) else {
            return RString::from_str("");
        };
        let (captured_end, result) = if rule.end_pattern.is_empty() {
            (begin_end, "+".to_string())
        } else {
            match find_pattern(source, begin_end, &rule.end_pattern, JSON_EXCLUDES) {
                Some((end_start, end_end)) => {
                    let text = if hint == "D" {
                        "+".to_string()
                    } else {
                        String::from_utf8_lossy(&source[begin_end..end_start]).into_owned()
                    };
                    (end_end, text)
                }
                None => return RString::from_str(""),
            }
        };
        rule.pos = captured_end;
        rule.iteration_started = true;
        *pos = rule.pos;
        return RString::from_str(&result);
    }

    // No recognised hint prefix: treat as a single non-iterating extraction.
    match find_pattern(source, rule.pos, &rule.begin_pattern, JSON_EXCLUDES) {
        Some(_) if rule.end_pattern.is_empty() => RString::from_str(""),
        Some((_, begin_end)) => match find_pattern(source, begin_end, &rule.end_pattern, JSON_EXCLUDES) {
            Some((end_start, end_end)) => {
                *pos = end_end;
                RString::from_bytes(source[begin_end..end_start].to_vec())
            }
            None => RString::from_str(""),
        },
        None => RString::from_str(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_rule_with_d_hint_signals_then_runs_dry() {
        let source = b"a#b#c#";
        let mut rule = ParserRule {
            name: "hashes".to_string(),
            begin_pattern: "#".to_string(),
            end_pattern: String::new(),
            hint: "+D".to_string(),
            pos: 0,
            iteration_started: false,
        };
        let mut pos = 0usize;
        let mut hits = 0;
        for _ in 0..10 {
            let r = run_rule(source, &mut rule, &mut pos);
            if r.as_str() == "+" {
                hits += 1;
            } else {
                break;
            }
        }
        assert_eq!(hits, 3);
    }
}
