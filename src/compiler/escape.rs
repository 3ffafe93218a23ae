//! Quoting for text inserted into the proxy configuration.
//!
//! Arguments made only of a conservative character set are emitted bare.
//! Anything else is strong-quoted (single quotes), which the proxy's parser
//! takes literally: no environment expansion, no backslash escapes. An
//! embedded single quote closes the quote, emits `\'`, and reopens it.
//! Control characters become spaces so a value can never start a new line.

fn is_bare(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '*')
}

/// Section, ACL and server names: anything outside `[A-Za-z0-9_.-]` becomes `_`.
pub fn ident(raw: &str) -> String {
    if raw.is_empty() {
        return "_".to_string();
    }
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Strong-quote `raw` unconditionally.
pub fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for c in raw.chars() {
        match c {
            '\'' => out.push_str("'\\''"),
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// A single argument: bare when safe, quoted otherwise.
pub fn arg(raw: &str) -> String {
    if !raw.is_empty() && raw.chars().all(is_bare) {
        raw.to_string()
    } else {
        quote(raw)
    }
}

/// An argument evaluated as a log-format string, where `%` introduces a fetch.
pub fn format_arg(raw: &str) -> String {
    arg(&raw.replace('%', "%%"))
}

/// Text for a `#` comment line.
pub fn comment(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}
