//! `$KEY` template substitution for descriptor values.
//!
//! Descriptor values may reference keys defined on earlier lines using shell
//! style templates:
//!
//! | Form      | Meaning                              |
//! |-----------|--------------------------------------|
//! | `$KEY`    | value of `KEY`                       |
//! | `${KEY}`  | value of `KEY` (allows `${KEY}suffix`) |
//! | `$$`      | literal `$`                          |
//!
//! Identifiers are `[A-Za-z_][A-Za-z0-9_]*`. A reference to an unknown key
//! or a `$` followed by anything else is an error.
//!
//! # Example
//!
//! ```ignore
//! use webports_lib::token::substitute;
//! use std::collections::HashMap;
//!
//! let vars: HashMap<String, String> = [("VERSION".into(), "1.2.8".into())].into();
//! let url = substitute("http://zlib.net/zlib-${VERSION}.tar.gz", &vars)?;
//! assert_eq!(url, "http://zlib.net/zlib-1.2.8.tar.gz");
//! ```

use log::trace;
use std::collections::HashMap;
use thiserror::Error;

/// Errors during template substitution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Referenced key is not defined.
    #[error("undefined key '{name}'")]
    Missing { name: String },

    /// `$` not followed by an identifier, `{identifier}` or `$`.
    #[error("invalid placeholder at offset {offset}")]
    Invalid { offset: usize },
}

impl TokenError {
    /// The offending reference text, for error messages.
    pub fn reference(&self) -> String {
        match self {
            TokenError::Missing { name } => format!("${}", name),
            TokenError::Invalid { offset } => format!("$ at offset {}", offset),
        }
    }
}

/// Trait for token value lookup.
///
/// Implement this for custom lookup sources (HashMap, descriptor record, etc).
pub trait TokenLookup {
    /// Look up token value by name. Returns None if not found.
    fn lookup(&self, name: &str) -> Option<String>;
}

impl TokenLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<F> TokenLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Check if string contains any `$` templates (including `$$`).
#[inline]
pub fn has_tokens(value: &str) -> bool {
    value.contains('$')
}

/// Escape a literal value so that [`substitute`] returns it unchanged.
pub fn escape(value: &str) -> String {
    value.replace('$', "$$")
}

/// Names referenced by `$KEY` / `${KEY}` templates, in order of appearance.
///
/// Malformed placeholders are skipped.
pub fn extract(value: &str) -> Vec<String> {
    let mut names = Vec::new();
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        match parse_placeholder(value, i) {
            Some((Placeholder::Name(name), next)) => {
                names.push(name.to_string());
                i = next;
            }
            Some((Placeholder::Dollar, next)) => i = next,
            None => i += 1,
        }
    }
    names
}

/// Substitute all templates in `value` from `lookup`.
pub fn substitute<L>(value: &str, lookup: &L) -> Result<String, TokenError>
where
    L: TokenLookup + ?Sized,
{
    if !has_tokens(value) {
        return Ok(value.to_string());
    }

    let mut result = String::with_capacity(value.len());
    let mut rest_start = 0;
    let mut i = 0;
    let bytes = value.as_bytes();

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        result.push_str(&value[rest_start..i]);
        let (placeholder, next) =
            parse_placeholder(value, i).ok_or(TokenError::Invalid { offset: i })?;
        match placeholder {
            Placeholder::Dollar => result.push('$'),
            Placeholder::Name(name) => {
                let replacement = lookup.lookup(name).ok_or_else(|| TokenError::Missing {
                    name: name.to_string(),
                })?;
                trace!("token: ${} -> {}", name, replacement);
                result.push_str(&replacement);
            }
        }
        i = next;
        rest_start = next;
    }
    result.push_str(&value[rest_start..]);
    Ok(result)
}

enum Placeholder<'a> {
    Dollar,
    Name(&'a str),
}

/// Parse the placeholder starting at `start` (which must be a `$`).
/// Returns the placeholder and the offset just past it.
fn parse_placeholder(value: &str, start: usize) -> Option<(Placeholder<'_>, usize)> {
    let bytes = value.as_bytes();
    let next = *bytes.get(start + 1)?;
    if next == b'$' {
        return Some((Placeholder::Dollar, start + 2));
    }
    if next == b'{' {
        let name_start = start + 2;
        let close = value[name_start..].find('}')? + name_start;
        let name = &value[name_start..close];
        return is_valid_identifier(name).then_some((Placeholder::Name(name), close + 1));
    }
    let name_start = start + 1;
    let len = identifier_len(&value[name_start..]);
    if len == 0 {
        return None;
    }
    Some((
        Placeholder::Name(&value[name_start..name_start + len]),
        name_start + len,
    ))
}

/// Length of the identifier prefix of `s`.
fn identifier_len(s: &str) -> usize {
    let mut len = 0;
    for (idx, c) in s.char_indices() {
        let ok = if idx == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };
        if !ok {
            break;
        }
        len = idx + c.len_utf8();
    }
    len
}

/// Check if string is a valid template identifier.
#[inline]
pub fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty() && identifier_len(s) == s.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<String, String> {
        [
            ("NAME".to_string(), "zlib".to_string()),
            ("VERSION".to_string(), "1.2.8".to_string()),
        ]
        .into()
    }

    #[test]
    fn braces_and_bare() {
        let v = vars();
        assert_eq!(
            substitute("${NAME}-${VERSION}.tar.gz", &v).unwrap(),
            "zlib-1.2.8.tar.gz"
        );
        assert_eq!(substitute("$NAME/x", &v).unwrap(), "zlib/x");
    }

    #[test]
    fn dollar_escape() {
        let v = vars();
        assert_eq!(substitute("a$$b", &v).unwrap(), "a$b");
        assert_eq!(substitute(&escape("cost $5"), &v).unwrap(), "cost $5");
    }

    #[test]
    fn missing_key() {
        let v = vars();
        let err = substitute("${NOPE}", &v).unwrap_err();
        assert_eq!(
            err,
            TokenError::Missing {
                name: "NOPE".to_string()
            }
        );
    }

    #[test]
    fn invalid_placeholder() {
        let v = vars();
        assert!(matches!(
            substitute("trailing $", &v),
            Err(TokenError::Invalid { .. })
        ));
        assert!(matches!(
            substitute("${1X}", &v),
            Err(TokenError::Invalid { .. })
        ));
    }

    #[test]
    fn closure_lookup() {
        let lookup = |name: &str| (name == "A").then(|| "1".to_string());
        assert_eq!(substitute("$A$A", &lookup).unwrap(), "11");
    }

    #[test]
    fn extract_names() {
        assert_eq!(extract("${A}/$B/$$C"), vec!["A", "B"]);
    }
}
