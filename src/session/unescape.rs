//! Decoder for the escaped HTML fragment in verification responses
//!
//! The registry embeds the result markup as the body of a JavaScript
//! single-quoted string literal. This module decodes those escapes by table
//! lookup; the text is never evaluated.

/// Single-character escapes and what they stand for
const SIMPLE_ESCAPES: &[(char, &str)] = &[
    ('n', "\n"),
    ('r', "\r"),
    ('t', "\t"),
    ('b', "\u{0008}"),
    ('f', "\u{000C}"),
    ('v', "\u{000B}"),
    ('0', "\0"),
    ('\'', "'"),
    ('"', "\""),
    ('\\', "\\"),
    // Line continuations
    ('\n', ""),
    ('\u{2028}', ""),
    ('\u{2029}', ""),
];

/// Decodes JavaScript string escapes in `input`
///
/// Handles the single-character escapes in the lookup table, `\xHH`, `\uHHHH`
/// (including surrogate pairs), `\u{H...}` and `\r\n` line continuations.
/// Any other escaped character stands for itself, and malformed hex escapes
/// are kept as written.
///
/// # Example
///
/// ```
/// use presale_crawler::session::unescape_fragment;
///
/// let decoded = unescape_fragment(r#"<a href=\"/floorinfo/ABC\">\u697c\u76d8</a>"#);
/// assert_eq!(decoded, r#"<a href="/floorinfo/ABC">楼盘</a>"#);
/// ```
pub fn unescape_fragment(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '\\' || i + 1 >= chars.len() {
            out.push(c);
            i += 1;
            continue;
        }

        let escaped = chars[i + 1];

        if let Some((_, replacement)) = SIMPLE_ESCAPES.iter().find(|(key, _)| *key == escaped) {
            out.push_str(replacement);
            i += 2;
            continue;
        }

        match escaped {
            '\r' => {
                // \r\n continuation consumes both characters
                i += 2;
                if chars.get(i) == Some(&'\n') {
                    i += 1;
                }
            }
            'x' => match parse_hex(&chars, i + 2, 2) {
                Some(code) => {
                    out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                    i += 4;
                }
                None => {
                    out.push_str("\\x");
                    i += 2;
                }
            },
            'u' => match decode_unicode_escape(&chars, i) {
                Some((decoded, consumed)) => {
                    out.push(decoded);
                    i += consumed;
                }
                None => {
                    out.push_str("\\u");
                    i += 2;
                }
            },
            other => {
                out.push(other);
                i += 2;
            }
        }
    }

    out
}

/// Decodes a `\u` escape starting at `start` (the backslash)
///
/// Returns the decoded char and the number of input chars consumed.
fn decode_unicode_escape(chars: &[char], start: usize) -> Option<(char, usize)> {
    let body = start + 2;

    if chars.get(body) == Some(&'{') {
        let close = chars[body..].iter().position(|c| *c == '}')? + body;
        let digits = close - body - 1;
        if digits == 0 || digits > 6 {
            return None;
        }
        let code = parse_hex(chars, body + 1, digits)?;
        return char::from_u32(code).map(|c| (c, close - start + 1));
    }

    let high = parse_hex(chars, body, 4)?;

    if (0xD800..0xDC00).contains(&high) {
        // Combine with a trailing low surrogate when one follows
        if chars.get(body + 4) == Some(&'\\') && chars.get(body + 5) == Some(&'u') {
            if let Some(low) = parse_hex(chars, body + 6, 4) {
                if (0xDC00..0xE000).contains(&low) {
                    let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(code).map(|c| (c, 12));
                }
            }
        }
        return Some((char::REPLACEMENT_CHARACTER, 6));
    }

    Some((
        char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER),
        6,
    ))
}

/// Parses exactly `len` hex digits starting at `start`
fn parse_hex(chars: &[char], start: usize, len: usize) -> Option<u32> {
    let digits = chars.get(start..start + len)?;
    digits
        .iter()
        .try_fold(0u32, |acc, c| c.to_digit(16).map(|d| acc * 16 + d))
}
