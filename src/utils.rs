// Utility functions and helpers
//
// Identifier rules, glob translation and string quoting shared by the
// parsers, the path type and the pattern matcher.

/// True if `c` may start an identifier.
pub fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// True if `c` may continue an identifier.
pub fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_identifier_start(c) => chars.all(is_identifier_char),
        _ => false,
    }
}

/// One or more identifiers joined by `:` (property names such as `primvars:st`).
pub fn is_namespaced_identifier(s: &str) -> bool {
    !s.is_empty() && s.split(':').all(is_identifier)
}

/// Translate a shell-style glob into an anchored regular expression.
///
/// `*` matches any run of characters, `?` any single character, and a closed
/// `[...]` class is passed through (`[!...]` negates). Everything else is
/// matched literally; an unclosed `[` is literal as well.
pub fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let negated = matches!(chars.get(i + 1), Some('!' | '^'));
                let body_start = if negated { i + 2 } else { i + 1 };
                let close = chars[body_start.min(chars.len())..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|offset| body_start + offset);

                match close {
                    Some(end) if end > body_start => {
                        out.push('[');
                        if negated {
                            out.push('^');
                        }
                        for &c in &chars[body_start..end] {
                            if c == '-' || is_identifier_char(c) {
                                out.push(c);
                            } else {
                                out.push('\\');
                                out.push(c);
                            }
                        }
                        out.push(']');
                        i = end;
                    }
                    _ => out.push_str(r"\["),
                }
            }
            c => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Double-quote `s`, escaping backslashes, quotes and control characters.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
