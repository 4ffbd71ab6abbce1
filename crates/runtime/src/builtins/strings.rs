//! String and file built-ins (spec §4.4 "String/parsing": `extract_string`,
//! `extract_string_from_file`, `substring`, `length`, `dehtml`,
//! `int_to_string`, `string_to_int`, `load_from_file`, `save_to_file`).
//!
//! The extractor is grounded on `_extract_string`/`_search_regexp` in
//! `examples/original_source/app/src/main/jni/ria/ria_pars.c`: `*` is a
//! wildcard meaning "any run of characters", a pattern is split into
//! literal segments at its `*`s, and the segments are located in order.
//! The C source selects one of three extraction modes via a field the
//! script-level call site has no way to set explicitly (only
//! `begin_pattern`/`end_pattern` are script-visible); we resolve that by
//! mode following from the shape of the call: an empty `end_pattern`
//! means begin-only (advance the cursor, capture nothing), a non-empty
//! one means begin-end (capture between the two markers).

use ria_core::RString;

/// An open/close byte pair (e.g. `(b'"', b'"')`, `(b'[', b']')`) a
/// pattern search skips over rather than matching inside, per
/// `_search_regexp`'s `pexcludes`/`cexcludes` in `ria_pars.c`.
pub(crate) type ExcludePairs = &'static [(u8, u8)];

/// No exclude-pair tracking — `extract_string`/`extract_string_from_file`
/// have no such requirement (spec §4.4: only "the parser's hint-aware
/// variant" tracks exclude pairs).
pub(crate) const NO_EXCLUDES: ExcludePairs = &[];

/// Case-insensitive search for `needle` in `haystack`, starting at byte
/// offset `from`. Returns the byte offset of the match. While a byte
/// matching an `excludes` open marker is unclosed, candidate positions
/// inside that balanced region are skipped, mirroring `_search_regexp`'s
/// running close-char stack (`params->tmp`) in `ria_pars.c`.
fn find_ci(haystack: &[u8], from: usize, needle: &str, excludes: ExcludePairs) -> Option<usize> {
    if needle.is_empty() {
        return Some(from);
    }
    if from > haystack.len() {
        return None;
    }
    let needle = needle.as_bytes();
    let mut pending_close: Vec<u8> = Vec::new();
    let mut i = from;
    while i < haystack.len() {
        let c = haystack[i];
        if let Some(&top) = pending_close.last() {
            if c == top {
                pending_close.pop();
            }
            i += 1;
            continue;
        }
        if let Some(&(_, close)) = excludes.iter().find(|&&(open, _)| open == c) {
            pending_close.push(close);
            i += 1;
            continue;
        }
        if i + needle.len() <= haystack.len() && haystack[i..i + needle.len()].eq_ignore_ascii_case(needle) {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Locates `pattern` (a `*`-delimited sequence of literals, each `*`
/// meaning "any characters") starting the search at `from`. Returns
/// `(match_start, match_end)` — the span consumed by the whole pattern,
/// including the wildcard gaps.
pub(crate) fn find_pattern(haystack: &[u8], from: usize, pattern: &str, excludes: ExcludePairs) -> Option<(usize, usize)> {
    let segments: Vec<&str> = pattern.split('*').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Some((from, from));
    }
    let mut cursor = from;
    let mut match_start = None;
    for seg in &segments {
        let idx = find_ci(haystack, cursor, seg, excludes)?;
        match_start.get_or_insert(idx);
        cursor = idx + seg.len();
    }
    Some((match_start.unwrap(), cursor))
}

/// Result of an extraction: the captured (possibly empty) text and the
/// byte offset the cursor should advance to.
pub struct Extraction {
    pub captured: String,
    pub new_pos: usize,
}

/// Shared by `extract_string` and `extract_string_from_file` (the latter
/// just supplies file bytes as the haystack).
pub fn extract(haystack: &[u8], pos: usize, begin_pattern: &str, end_pattern: &str) -> Extraction {
    let Some((begin_start, begin_end)) = find_pattern(haystack, pos, begin_pattern, NO_EXCLUDES) else {
        return Extraction { captured: String::new(), new_pos: haystack.len() };
    };
    if end_pattern.is_empty() {
        return Extraction { captured: String::new(), new_pos: begin_start };
    }
    let Some((end_start, end_end)) = find_pattern(haystack, begin_end, end_pattern, NO_EXCLUDES) else {
        return Extraction { captured: String::new(), new_pos: haystack.len() };
    };
    let captured = String::from_utf8_lossy(&haystack[begin_end..end_start]).into_owned();
    Extraction { captured, new_pos: end_end }
}

/// `string_to_int`'s documented out-of-range marker (spec §8 property 5).
pub const STRING_TO_INT_SENTINEL: u32 = 0xFFFF_FFFF;

pub fn string_to_int(s: &RString) -> u32 {
    s.as_str().trim().parse::<u32>().unwrap_or(STRING_TO_INT_SENTINEL)
}

pub fn int_to_string(n: u32) -> RString {
    RString::from_str(&n.to_string())
}

/// Byte-offset substring; `start`/`len` are clamped to the string's
/// bounds rather than treated as errors (matching the permissive style
/// of the rest of the extractor family).
pub fn substring(s: &RString, start: u32, len: u32) -> RString {
    let bytes = s.as_bytes();
    let start = (start as usize).min(bytes.len());
    let end = start.saturating_add(len as usize).min(bytes.len());
    RString::from_bytes(bytes[start..end].to_vec())
}

pub fn dehtml(s: &RString) -> RString {
    RString::from_str(&crate::collaborators::html_normalizer::normalise(&s.as_str()))
}

pub fn load_from_file(path: &std::path::Path) -> Result<RString, String> {
    use crate::collaborators::filesystem::FileHandle;
    FileHandle::open_read(path)?.read_to_end().map(RString::from_bytes)
}

pub fn save_to_file(path: &std::path::Path, content: &RString) -> Result<(), String> {
    use crate::collaborators::filesystem::FileHandle;
    FileHandle::open_write(path, false)?.write_all(content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_end_captures_between_markers() {
        let e = extract(b"prefix<b>hello</b>suffix", 0, "<b>", "</b>");
        assert_eq!(e.captured, "hello");
        assert_eq!(e.new_pos, "prefix<b>hello</b>".len());
    }

    #[test]
    fn begin_only_advances_to_match_start_and_captures_nothing() {
        let e = extract(b"xxx<b>yyy", 0, "<b>", "");
        assert_eq!(e.captured, "");
        assert_eq!(e.new_pos, 3);
    }

    #[test]
    fn wildcard_segments_skip_arbitrary_content() {
        let e = extract(b"<a href=\"x\">hi</a>", 0, "<a*>", "</a>");
        assert_eq!(e.captured, "hi");
    }

    #[test]
    fn not_found_advances_to_end_and_captures_nothing() {
        let e = extract(b"no markers here", 0, "<b>", "</b>");
        assert_eq!(e.captured, "");
        assert_eq!(e.new_pos, "no markers here".len());
    }

    #[test]
    fn string_to_int_sentinel_on_non_digits() {
        assert_eq!(string_to_int(&RString::from_str("abc")), STRING_TO_INT_SENTINEL);
    }

    #[test]
    fn int_to_string_zero_is_literal_zero() {
        assert_eq!(int_to_string(0).as_str(), "0");
    }

    #[test]
    fn substring_clamps_out_of_range_length() {
        let s = RString::from_str("hello");
        assert_eq!(substring(&s, 2, 100).as_str(), "llo");
    }

    #[test]
    fn find_pattern_with_excludes_skips_balanced_brackets() {
        let excludes: ExcludePairs = &[(b'[', b']')];
        let haystack = b"a[,]b,c";
        let found = find_pattern(haystack, 0, ",", excludes).unwrap();
        assert_eq!(found, (5, 6));
    }

    #[test]
    fn find_pattern_without_excludes_matches_inside_brackets() {
        let haystack = b"a[,]b,c";
        let found = find_pattern(haystack, 0, ",", NO_EXCLUDES).unwrap();
        assert_eq!(found, (2, 3));
    }
}
