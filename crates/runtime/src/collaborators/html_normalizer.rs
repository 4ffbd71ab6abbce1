//! HTML normaliser collaborator (spec §6): a streaming state machine that
//! collapses whitespace, elides tag markup (but not `<script>…</script>`
//! body boundaries), and decodes a small table of `&entity;` references.
//!
//! Grounded on the entity table and tag-skipping behaviour implied by
//! `examples/original_source/jni/ria/ria_pars.c`/`ria_http.c`'s dehtml
//! pass, expressed here as an explicit `State` enum rather than the
//! original's single index variable doing double duty.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    InTag,
    InScript,
    InScriptTag,
}

const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&nbsp;", " "),
];

/// Collapses runs of whitespace to a single space and strips tags, the
/// way `dehtml` and `receive(..., normalise=true)` both need.
pub fn normalise(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut state = State::Text;
    let mut last_was_space = true;
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match state {
            State::Text => {
                if c == '<' {
                    state = if input[i..].to_lowercase().starts_with("<script") { State::InScriptTag } else { State::InTag };
                } else if c == '&' {
                    if let Some((decoded, len)) = decode_entity(&input[i..]) {
                        out.push_str(decoded);
                        last_was_space = decoded == " ";
                        for _ in 1..len {
                            chars.next();
                        }
                    } else {
                        out.push(c);
                        last_was_space = false;
                    }
                } else if c.is_whitespace() {
                    if !last_was_space {
                        out.push(' ');
                        last_was_space = true;
                    }
                } else {
                    out.push(c);
                    last_was_space = false;
                }
            }
            State::InTag => {
                if c == '>' {
                    state = State::Text;
                }
            }
            State::InScriptTag => {
                if c == '>' {
                    state = State::InScript;
                }
            }
            State::InScript => {
                if c == '<' && input[i..].to_lowercase().starts_with("</script") {
                    state = State::InTag;
                } else if c.is_whitespace() {
                    if !last_was_space {
                        out.push(' ');
                        last_was_space = true;
                    }
                } else {
                    out.push(c);
                    last_was_space = false;
                }
            }
        }
    }
    out.trim().to_string()
}

fn decode_entity(s: &str) -> Option<(&'static str, usize)> {
    ENTITIES.iter().find(|(e, _)| s.starts_with(e)).map(|(e, decoded)| (*decoded, e.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        assert_eq!(normalise("<b>hello   world</b>"), "hello world");
    }

    #[test]
    fn decodes_known_entities() {
        assert_eq!(normalise("Tom &amp; Jerry"), "Tom & Jerry");
    }

    #[test]
    fn preserves_script_body_as_opaque_but_still_strips_its_tags() {
        let got = normalise("<script>var x = 1 < 2;</script>after");
        assert_eq!(got, "var x = 1 < 2;after");
    }
}
