//! Path glob matching for artifact constraints and protected paths.
//!
//! Patterns are translated to anchored regular expressions once, at load
//! time. Supported syntax: `*`, `?`, `**` (whole segments), `[...]`/`[!...]`
//! classes, `{a,b}` alternation and `\` escapes. Dot-files are matched by
//! wildcards, and a pattern without any `/` is matched against the path's
//! basename.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A compiled glob pattern
#[derive(Clone)]
pub struct GlobPattern {
    source: String,
    regex: Option<Regex>,
    match_base: bool,
}

impl GlobPattern {
    /// Compile a pattern. A pattern that cannot be compiled matches only
    /// the identical literal path.
    pub fn new(pattern: &str) -> Self {
        let translated = format!("^{}$", translate(pattern));
        Self {
            source: pattern.to_string(),
            regex: Regex::new(&translated).ok(),
            match_base: !pattern.contains('/'),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Test a single path against the pattern
    pub fn is_match(&self, path: &str) -> bool {
        let candidate = if self.match_base {
            path.rsplit('/').next().unwrap_or(path)
        } else {
            path
        };

        match &self.regex {
            Some(regex) => regex.is_match(candidate),
            None => candidate == self.source,
        }
    }
}

/// True when any path matches any pattern
pub fn any_match(patterns: &[GlobPattern], paths: &[String]) -> bool {
    paths
        .iter()
        .any(|path| patterns.iter().any(|pattern| pattern.is_match(path)))
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                let start = i;
                while i < chars.len() && chars[i] == '*' {
                    i += 1;
                }
                let run = i - start;
                let at_segment_start = start == 0 || chars[start - 1] == '/';
                let at_segment_end = i == chars.len() || chars[i] == '/';

                if run >= 2 && at_segment_start && at_segment_end {
                    if i < chars.len() {
                        // `**/` matches zero or more leading directories
                        out.push_str("(?:.*/)?");
                        i += 1;
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
                continue;
            }
            '?' => out.push_str("[^/]"),
            '[' => match chars[i + 1..].iter().position(|c| *c == ']') {
                Some(offset) if offset > 0 => {
                    let body: String = chars[i + 1..i + 1 + offset].iter().collect();
                    out.push('[');
                    let body = match body.strip_prefix('!') {
                        Some(rest) => {
                            out.push('^');
                            rest.to_string()
                        }
                        None => body,
                    };
                    out.push_str(&body.replace('\\', "\\\\").replace('[', "\\["));
                    out.push(']');
                    i += offset + 2;
                    continue;
                }
                _ => out.push_str("\\["),
            },
            '{' => match closing_brace(&chars, i) {
                Some(end) => {
                    let body: String = chars[i + 1..end].iter().collect();
                    let alternatives: Vec<String> =
                        split_top_level(&body).iter().map(|alt| translate(alt)).collect();
                    out.push_str("(?:");
                    out.push_str(&alternatives.join("|"));
                    out.push(')');
                    i = end + 1;
                    continue;
                }
                None => out.push_str("\\{"),
            },
            '\\' if i + 1 < chars.len() => {
                out.push_str(&regex::escape(&chars[i + 1].to_string()));
                i += 2;
                continue;
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out
}

fn closing_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in chars[open..].iter().enumerate() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in body.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobPattern").field(&self.source).finish()
    }
}

impl PartialEq for GlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl From<&str> for GlobPattern {
    fn from(pattern: &str) -> Self {
        GlobPattern::new(pattern)
    }
}

impl Serialize for GlobPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for GlobPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Ok(GlobPattern::new(&pattern))
    }
}
