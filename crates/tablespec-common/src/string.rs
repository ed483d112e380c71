use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VALID_IDENTIFIER_REGEX: Regex = {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap()
    };
}

/// Quotes an identifier with backticks unless it is a plain identifier.
pub fn quote_name_if_needed(name: &str) -> String {
    if VALID_IDENTIFIER_REGEX.is_match(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Renders a single-quoted SQL string literal, escaping backslashes and quotes.
pub fn quote_string_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}
