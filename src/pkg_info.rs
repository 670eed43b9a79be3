//! Descriptor (`pkg_info`) parsing and serialization.
//!
//! Every port, binary package, installed package and index entry is described
//! by the same line-oriented `KEY=value` format:
//!
//! ```text
//! # comment lines and blank lines are ignored
//! NAME=zlib
//! VERSION=1.2.8
//! URL=http://zlib.net/zlib-${VERSION}.tar.gz
//! SHA1=a4d316c404ff54ca545ea71a27af7dbc29817088
//! DEPENDS=(glibc-compat)
//! DISABLED_TOOLCHAIN=(emscripten/pnacl)
//! ```
//!
//! - `KEY=(a b c)` is a list, split on whitespace.
//! - Other values are shell-tokenised and the first token kept, so quoting
//!   works and trailing words are dropped.
//! - `$KEY` / `${KEY}` expand to the value of an earlier key
//!   (see [`token`](crate::token)).
//!
//! Which keys are accepted and required depends on the context: ports use
//! [`VALID_KEYS`], installed packages and binary archives add the build
//! provenance keys, index entries add the download keys.

use crate::error::{FormatError, PortsError, Result};
use crate::token::{self, TokenError, TokenLookup};
use log::trace;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Keys accepted in a port descriptor.
pub const VALID_KEYS: &[&str] = &[
    "NAME",
    "VERSION",
    "URL",
    "ARCHIVE_ROOT",
    "LICENSE",
    "DEPENDS",
    "MIN_SDK_VERSION",
    "LIBC",
    "DISABLED_LIBC",
    "ARCH",
    "CONFLICTS",
    "DISABLED_ARCH",
    "URL_FILENAME",
    "BUILD_OS",
    "SHA1",
    "DISABLED",
    "DISABLED_TOOLCHAIN",
    "TOOLCHAIN_INSTALL",
    "PATCH_NAME",
];

/// Keys every descriptor must carry.
pub const REQUIRED_KEYS: &[&str] = &["NAME", "VERSION"];

/// Keys whose value is always a list.
pub const LIST_KEYS: &[&str] = &[
    "DEPENDS",
    "CONFLICTS",
    "DISABLED_ARCH",
    "DISABLED_LIBC",
    "DISABLED_TOOLCHAIN",
    "ARCH",
];

/// Descriptor value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Single string
    Scalar(String),
    /// `(a b c)` list
    List(Vec<String>),
}

impl Value {
    /// Scalar content, or None for lists.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::List(_) => None,
        }
    }

    /// List content, or None for scalars.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items),
            Value::Scalar(_) => None,
        }
    }

    /// Value as it is seen by `$KEY` references.
    fn flatten(&self) -> String {
        match self {
            Value::Scalar(s) => s.clone(),
            Value::List(items) => items.join(" "),
        }
    }
}

/// Ordered descriptor record.
///
/// Preserves insertion order so serialization is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PkgInfo {
    entries: Vec<(String, Value)>,
}

impl PkgInfo {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse descriptor text.
    ///
    /// `source` names the origin (file path or archive member) in error
    /// messages.
    pub fn parse(
        text: &str,
        source: &str,
        valid_keys: &[&str],
        required_keys: &[&str],
    ) -> std::result::Result<Self, FormatError> {
        let mut info = PkgInfo::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, raw_value)) = line.split_once('=') else {
                return Err(FormatError::InvalidLine {
                    file: source.to_string(),
                    line: line_no,
                });
            };
            let key = key.trim();
            if !valid_keys.contains(&key) {
                return Err(FormatError::InvalidKey {
                    key: key.to_string(),
                    file: source.to_string(),
                    line: line_no,
                });
            }
            if info.contains_key(key) {
                return Err(FormatError::DuplicateKey {
                    key: key.to_string(),
                    file: source.to_string(),
                    line: line_no,
                });
            }

            let value = parse_value(key, raw_value.trim(), source, line_no)?;
            let value = info.expand(value, source, line_no)?;
            trace!("{}:{}: {}={:?}", source, line_no, key, value);
            info.entries.push((key.to_string(), value));
        }

        for key in required_keys {
            if !info.contains_key(key) {
                return Err(FormatError::MissingKey {
                    key: key.to_string(),
                    file: source.to_string(),
                });
            }
        }

        Ok(info)
    }

    /// Read and parse a descriptor file.
    pub fn parse_file(path: &Path, valid_keys: &[&str], required_keys: &[&str]) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PortsError::msg(format!("unable to read {}: {}", path.display(), e))
        })?;
        Ok(Self::parse(
            &text,
            &path.display().to_string(),
            valid_keys,
            required_keys,
        )?)
    }

    /// Write the serialized record to `path`.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_string())?;
        Ok(())
    }

    fn expand(&self, value: Value, source: &str, line: usize) -> std::result::Result<Value, FormatError> {
        let map_err = |e: TokenError| FormatError::BadSubstitution {
            reference: e.reference(),
            file: source.to_string(),
            line,
        };
        Ok(match value {
            Value::Scalar(s) => Value::Scalar(token::substitute(&s, self).map_err(map_err)?),
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| token::substitute(item, self))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(map_err)?,
            ),
        })
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Scalar value for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// List value for `key`, empty when absent.
    pub fn get_list(&self, key: &str) -> &[String] {
        self.get(key).and_then(Value::as_list).unwrap_or(&[])
    }

    /// True if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Set `key`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Set a scalar value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key, Value::Scalar(value.into()));
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the record has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TokenLookup for PkgInfo {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).map(Value::flatten)
    }
}

impl fmt::Display for PkgInfo {
    /// Serializes to descriptor text that [`PkgInfo::parse`] reads back
    /// unchanged. List items are whitespace-split on parse, so they must not
    /// contain whitespace themselves.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            match value {
                Value::Scalar(s) => {
                    writeln!(f, "{}={}", key, shell_words::quote(&token::escape(s)))?
                }
                Value::List(items) => {
                    let items: Vec<String> = items.iter().map(|i| token::escape(i)).collect();
                    writeln!(f, "{}=({})", key, items.join(" "))?
                }
            }
        }
        Ok(())
    }
}

/// Split a raw (trimmed) value into a scalar or list.
fn parse_value(key: &str, raw: &str, source: &str, line: usize) -> std::result::Result<Value, FormatError> {
    let is_list_key = LIST_KEYS.contains(&key);

    if let Some(inner) = raw.strip_prefix('(') {
        let Some(inner) = inner.strip_suffix(')') else {
            return Err(FormatError::UnterminatedList {
                file: source.to_string(),
                line,
            });
        };
        if !is_list_key {
            return Err(FormatError::Invalid(format!(
                "{}:{}: '{}' does not take a list value",
                source, line, key
            )));
        }
        return Ok(Value::List(
            inner.split_whitespace().map(str::to_string).collect(),
        ));
    }

    let tokens = shell_words::split(raw).map_err(|e| FormatError::BadValue {
        file: source.to_string(),
        line,
        reason: e.to_string(),
    })?;
    let first = tokens.into_iter().next().unwrap_or_default();

    if is_list_key {
        // Single unparenthesised entry.
        Ok(Value::List(if first.is_empty() { Vec::new() } else { vec![first] }))
    } else {
        Ok(Value::Scalar(first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# zlib port
NAME=zlib
VERSION=1.2.8

URL=http://zlib.net/zlib-${VERSION}.tar.gz
LICENSE='ZLIB'  # trailing comment
DEPENDS=(glibc-compat nacl-spawn)
DISABLED_TOOLCHAIN=(emscripten/pnacl)
";

    fn parse(text: &str) -> std::result::Result<PkgInfo, FormatError> {
        PkgInfo::parse(text, "ports/zlib/pkg_info", VALID_KEYS, REQUIRED_KEYS)
    }

    #[test]
    fn parse_sample() {
        let info = parse(SAMPLE).unwrap();
        assert_eq!(info.get_str("NAME"), Some("zlib"));
        assert_eq!(
            info.get_str("URL"),
            Some("http://zlib.net/zlib-1.2.8.tar.gz")
        );
        assert_eq!(info.get_str("LICENSE"), Some("ZLIB"));
        assert_eq!(info.get_list("DEPENDS"), ["glibc-compat", "nacl-spawn"]);
        assert_eq!(info.get_list("CONFLICTS"), [] as [String; 0]);
        assert_eq!(info.len(), 6);
    }

    #[test]
    fn invalid_key_reports_line() {
        let err = parse("NAME=foo\nVERSION=1\nBOGUS=1\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid key 'BOGUS' in info file ports/zlib/pkg_info:3"
        );
    }

    #[test]
    fn missing_separator() {
        let err = parse("NAME=foo\n\nVERSION\n").unwrap_err();
        assert_eq!(
            err,
            FormatError::InvalidLine {
                file: "ports/zlib/pkg_info".to_string(),
                line: 3
            }
        );
    }

    #[test]
    fn missing_required() {
        let err = parse("NAME=foo\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Required key 'VERSION' missing from info file: 'ports/zlib/pkg_info'"
        );
    }

    #[test]
    fn duplicate_key() {
        let err = parse("NAME=foo\nVERSION=1\nNAME=bar\n").unwrap_err();
        assert!(matches!(err, FormatError::DuplicateKey { line: 3, .. }));
    }

    #[test]
    fn unterminated_list() {
        let err = parse("NAME=foo\nVERSION=1\nDEPENDS=(a b\n").unwrap_err();
        assert!(matches!(err, FormatError::UnterminatedList { line: 3, .. }));
    }

    #[test]
    fn undefined_substitution() {
        let err = parse("NAME=foo-${VERSION}\nVERSION=1\n").unwrap_err();
        assert!(matches!(err, FormatError::BadSubstitution { line: 1, .. }));
    }

    #[test]
    fn scalar_list_key_promoted() {
        let info = parse("NAME=foo\nVERSION=1\nDEPENDS=zlib\n").unwrap();
        assert_eq!(info.get_list("DEPENDS"), ["zlib"]);
    }

    #[test]
    fn roundtrip() {
        let mut info = parse(SAMPLE).unwrap();
        info.set("ARCHIVE_ROOT", "has space/and $dollar");
        let text = info.to_string();
        let back = parse(&text).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut info = parse("NAME=foo\nVERSION=1\n").unwrap();
        info.set("NAME", "bar");
        let keys: Vec<&str> = info.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["NAME", "VERSION"]);
        assert_eq!(info.get_str("NAME"), Some("bar"));
    }
}
