//! Bounded repair of lightly corrupted JSON.
//!
//! Hand edits and interrupted writers tend to leave a small set of mistakes
//! behind. The scanner here fixes exactly these and nothing else:
//!
//! - trailing commas before `}` or `]`
//! - repeated commas (`[1,,2]`)
//! - bare object keys (`{name: "x"}`)
//! - single-quoted strings (`{'a': 'b'}`)
//! - missing closing braces/brackets at end of input
//!
//! Anything outside that set (an unterminated string, a closer that matches
//! no opener, oversized or absurdly deep input) is reported as unrepairable so
//! the caller can go straight to a backup.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

/// Inputs larger than this are not scanned.
pub const MAX_REPAIR_BYTES: usize = 8 * 1024 * 1024;

/// Nesting deeper than this is not scanned.
pub const MAX_REPAIR_DEPTH: usize = 256;

/// One class of fix the scanner applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fix {
    TrailingComma,
    RepeatedComma,
    UnquotedKey,
    SingleQuotedString,
    UnclosedBracket,
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Fix::TrailingComma => "trailing-comma",
            Fix::RepeatedComma => "repeated-comma",
            Fix::UnquotedKey => "unquoted-key",
            Fix::SingleQuotedString => "single-quoted-string",
            Fix::UnclosedBracket => "unclosed-bracket",
        };
        f.write_str(s)
    }
}

/// A successful repair.
#[derive(Debug, Clone)]
pub struct Repaired {
    pub text: String,
    pub value: Value,
    pub fixes: BTreeSet<Fix>,
}

/// Attempts to turn `input` into valid JSON.
///
/// Returns `None` when the input needs a fix outside the supported set, or
/// still does not parse after repair.
pub fn repair(input: &str) -> Option<Repaired> {
    if input.len() > MAX_REPAIR_BYTES {
        return None;
    }

    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 8);
    let mut fixes = BTreeSet::new();
    // Expected closers, innermost last.
    let mut open: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                i = copy_string(&chars, i, &mut out)?;
                continue;
            }
            '\'' => {
                i = convert_single_quoted(&chars, i, &mut out)?;
                fixes.insert(Fix::SingleQuotedString);
                continue;
            }
            '{' | '[' => {
                if open.len() >= MAX_REPAIR_DEPTH {
                    return None;
                }
                open.push(if c == '{' { '}' } else { ']' });
                out.push(c);
            }
            '}' | ']' => {
                if open.pop() != Some(c) {
                    return None;
                }
                if drop_trailing_comma(&mut out) {
                    fixes.insert(Fix::TrailingComma);
                }
                out.push(c);
            }
            ',' => {
                if last_significant(&out) == Some(',') {
                    fixes.insert(Fix::RepeatedComma);
                } else {
                    out.push(c);
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                while i < chars.len() && is_number_char(chars[i]) {
                    out.push(chars[i]);
                    i += 1;
                }
                continue;
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if open.last() == Some(&'}') && next_significant(&chars, i) == Some(':') {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                    fixes.insert(Fix::UnquotedKey);
                } else {
                    out.push_str(&word);
                }
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    if !open.is_empty() {
        drop_trailing_comma(&mut out);
        while let Some(closer) = open.pop() {
            out.push(closer);
        }
        fixes.insert(Fix::UnclosedBracket);
    }

    if fixes.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(&out).ok()?;
    Some(Repaired {
        text: out,
        value,
        fixes,
    })
}

/// Copies a double-quoted string verbatim; returns the index past its end.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> Option<usize> {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        match c {
            '\\' => {
                out.push(*chars.get(i + 1)?);
                i += 2;
            }
            '"' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Rewrites a single-quoted string as a double-quoted one.
fn convert_single_quoted(chars: &[char], start: usize, out: &mut String) -> Option<usize> {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let next = *chars.get(i + 1)?;
                if next == '\'' {
                    out.push('\'');
                } else {
                    out.push('\\');
                    out.push(next);
                }
                i += 2;
            }
            '"' => {
                out.push_str("\\\"");
                i += 1;
            }
            '\'' => {
                out.push('"');
                return Some(i + 1);
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    None
}

/// Removes a comma that is the last non-whitespace character of `out`.
fn drop_trailing_comma(out: &mut String) -> bool {
    let trimmed = out.trim_end();
    if trimmed.ends_with(',') {
        let at = trimmed.len() - 1;
        out.remove(at);
        true
    } else {
        false
    }
}

fn last_significant(out: &str) -> Option<char> {
    out.trim_end().chars().last()
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|c| !c.is_whitespace())
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '-')
}
