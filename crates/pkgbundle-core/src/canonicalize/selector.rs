//! Field-index selectors for the excludes annotation.
//!
//! Only pure index paths are accepted:
//!
//! ```text
//! .spec.packages[0].source
//! .metadata.annotations["example.com/owner"]
//! ."odd key".[2]
//! ```
//!
//! Anything else (function calls, pipes, slices, iterators, negative
//! indexes, recursive descent) is rejected, so an exclude can only ever name
//! fields to drop and never transform the document.

use std::fmt;

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A parsed field-index selector.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// Path made of object keys only.
    pub fn keys(keys: &[&str]) -> Self {
        Self(
            keys.iter()
                .map(|k| PathSegment::Key((*k).to_string()))
                .collect(),
        )
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Parse a selector, returning `None` for anything that is not a pure
    /// field-index path. The bare identity `.` is rejected.
    pub fn parse(selector: &str) -> Option<Self> {
        let bytes = selector.as_bytes();
        if bytes.first() != Some(&b'.') {
            return None;
        }

        let mut segments = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            match bytes[pos] {
                b'.' => {
                    pos += 1;
                    match bytes.get(pos)? {
                        b'"' => {
                            let (key, next) = parse_quoted(selector, pos)?;
                            segments.push(PathSegment::Key(key));
                            pos = next;
                        }
                        b'[' => {
                            let (segment, next) = parse_bracket(selector, pos)?;
                            segments.push(segment);
                            pos = next;
                        }
                        b if is_ident_start(*b) => {
                            let start = pos;
                            while pos < bytes.len() && is_ident_continue(bytes[pos]) {
                                pos += 1;
                            }
                            segments.push(PathSegment::Key(selector[start..pos].to_string()));
                        }
                        _ => return None,
                    }
                }
                b'[' if !segments.is_empty() => {
                    let (segment, next) = parse_bracket(selector, pos)?;
                    segments.push(segment);
                    pos = next;
                }
                _ => return None,
            }
        }

        if segments.is_empty() {
            None
        } else {
            Some(Self(segments))
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            match segment {
                PathSegment::Key(k)
                    if k.bytes().next().is_some_and(is_ident_start)
                        && k.bytes().all(is_ident_continue) =>
                {
                    write!(f, ".{}", k)?
                }
                PathSegment::Key(k) => write!(f, "[{}]", serde_json::Value::from(k.as_str()))?,
                PathSegment::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Parse a JSON string literal starting at `start` (the opening quote).
fn parse_quoted(s: &str, start: usize) -> Option<(String, usize)> {
    let bytes = s.as_bytes();
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'"' => {
                let key: String = serde_json::from_str(&s[start..=pos]).ok()?;
                return Some((key, pos + 1));
            }
            _ => pos += 1,
        }
    }
    None
}

/// Parse `["key"]` or `[N]` starting at `start` (the opening bracket).
fn parse_bracket(s: &str, start: usize) -> Option<(PathSegment, usize)> {
    let bytes = s.as_bytes();
    let pos = start + 1;
    match bytes.get(pos)? {
        b'"' => {
            let (key, next) = parse_quoted(s, pos)?;
            (bytes.get(next)? == &b']').then_some((PathSegment::Key(key), next + 1))
        }
        b if b.is_ascii_digit() => {
            let end = pos + bytes[pos..].iter().take_while(|b| b.is_ascii_digit()).count();
            let index = s[pos..end].parse().ok()?;
            (bytes.get(end)? == &b']').then_some((PathSegment::Index(index), end + 1))
        }
        _ => None,
    }
}
