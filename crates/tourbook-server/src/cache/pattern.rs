//! Redis-style glob patterns for key enumeration.
//!
//! Supported syntax: `*`, `?`, `[abc]`, `[^abc]`, `[a-z]` and `\` escapes.
//! Patterns are compiled to an anchored [`regex::Regex`].

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use regex::Regex;

use super::store::CacheError;

/// A compiled glob pattern.
#[derive(Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidPattern` for an unterminated or empty
    /// character class.
    pub fn new(pattern: &str) -> Result<Self, CacheError> {
        let invalid = |message: &str| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            message: message.to_string(),
        };

        let mut re = String::with_capacity(pattern.len() * 2 + 8);
        re.push_str("(?s)^");

        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                '\\' => push_literal(&mut re, chars.next().unwrap_or('\\')),
                '[' => {
                    let class = parse_class(&mut chars)
                        .ok_or_else(|| invalid("unterminated character class"))?;
                    if class.items.is_empty() {
                        return Err(invalid("empty character class"));
                    }
                    class.render(&mut re);
                }
                other => push_literal(&mut re, other),
            }
        }
        re.push('$');

        let regex = Regex::new(&re).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Returns `true` if `key` matches the whole pattern.
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobPattern").field(&self.source).finish()
    }
}

enum ClassItem {
    Char(char),
    Range(char, char),
}

struct CharClass {
    negated: bool,
    items: Vec<ClassItem>,
}

impl CharClass {
    fn render(&self, re: &mut String) {
        re.push('[');
        if self.negated {
            re.push('^');
        }
        for item in &self.items {
            match *item {
                ClassItem::Char(c) => re.push_str(&regex::escape(&c.to_string())),
                ClassItem::Range(lo, hi) => {
                    re.push_str(&regex::escape(&lo.to_string()));
                    re.push('-');
                    re.push_str(&regex::escape(&hi.to_string()));
                }
            }
        }
        re.push(']');
    }
}

/// Parses the body of a `[...]` class; the opening bracket is already consumed.
/// Returns `None` if the class is never closed.
fn parse_class(chars: &mut Peekable<Chars<'_>>) -> Option<CharClass> {
    let negated = chars.next_if_eq(&'^').is_some();
    let mut items = Vec::new();

    loop {
        let c = match chars.next()? {
            ']' => return Some(CharClass { negated, items }),
            '\\' => chars.next()?,
            c => c,
        };

        // `a-z`; a trailing `-` before `]` is literal.
        let is_range = chars.peek() == Some(&'-') && {
            let mut ahead = chars.clone();
            ahead.next();
            matches!(ahead.peek(), Some(next) if *next != ']')
        };
        if !is_range {
            items.push(ClassItem::Char(c));
            continue;
        }

        chars.next();
        let end = match chars.next()? {
            '\\' => chars.next()?,
            e => e,
        };
        let (lo, hi) = if c <= end { (c, end) } else { (end, c) };
        items.push(ClassItem::Range(lo, hi));
    }
}

fn push_literal(re: &mut String, c: char) {
    re.push_str(&regex::escape(&c.to_string()));
}
