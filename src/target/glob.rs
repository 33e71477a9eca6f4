//! Shell-style glob matching for target id patterns.
//!
//! Supports:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//! - `[abc]` matches any character in the set
//! - `[a-z]` matches any character in the range
//! - `[!abc]` or `[^abc]` matches any character NOT in the set

use crate::error::{FleetError, Result};

/// Maximum number of recursive calls for glob matching. Protects against
/// adversarial patterns like `*a*a*a*...*a` that cause exponential
/// backtracking. Counted as total work, not stack depth.
const MAX_MATCH_CALLS: usize = 100_000;

/// Validate glob pattern syntax without matching anything.
///
/// Rejects empty patterns and unbalanced or empty character classes with
/// `InvalidTargetSpec`. A valid pattern that matches nothing is not an
/// error; only syntax is checked here.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(FleetError::InvalidTargetSpec(
            "empty glob pattern".to_string(),
        ));
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '[' {
            let mut j = i + 1;
            if j < chars.len() && (chars[j] == '!' || chars[j] == '^') {
                j += 1;
            }
            // A ']' immediately after the opener is a literal member
            if j < chars.len() && chars[j] == ']' {
                j += 1;
            }
            while j < chars.len() && chars[j] != ']' {
                j += 1;
            }
            if j >= chars.len() {
                return Err(FleetError::InvalidTargetSpec(format!(
                    "unbalanced character class in pattern {:?}",
                    pattern
                )));
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }
    Ok(())
}

/// Match a string against a glob pattern.
///
/// Returns true if the pattern matches the entire input string.
pub fn glob_match(pattern: &str, input: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let inp: Vec<char> = input.chars().collect();
    let mut calls = 0usize;
    match_from(&pat, 0, &inp, 0, &mut calls)
}

fn match_from(pat: &[char], mut p: usize, inp: &[char], mut i: usize, calls: &mut usize) -> bool {
    *calls += 1;
    if *calls > MAX_MATCH_CALLS {
        return false;
    }

    while p < pat.len() {
        match pat[p] {
            '*' => {
                // Collapse consecutive stars
                while p < pat.len() && pat[p] == '*' {
                    p += 1;
                }
                if p == pat.len() {
                    return true;
                }
                // Try every possible split point
                for start in i..=inp.len() {
                    if match_from(pat, p, inp, start, calls) {
                        return true;
                    }
                }
                return false;
            }
            '?' => {
                if i >= inp.len() {
                    return false;
                }
                p += 1;
                i += 1;
            }
            '[' => {
                if i >= inp.len() {
                    return false;
                }
                match match_class(pat, p, inp[i]) {
                    Some((matched, next_p)) => {
                        if !matched {
                            return false;
                        }
                        p = next_p;
                        i += 1;
                    }
                    // Unterminated class: treat '[' as a literal
                    None => {
                        if inp[i] != '[' {
                            return false;
                        }
                        p += 1;
                        i += 1;
                    }
                }
            }
            c => {
                if i >= inp.len() || inp[i] != c {
                    return false;
                }
                p += 1;
                i += 1;
            }
        }
    }
    i == inp.len()
}

/// Match a character class starting at `pat[p]` (which must be '[').
/// Returns (matched, index after the closing ']'), or None if unterminated.
fn match_class(pat: &[char], p: usize, c: char) -> Option<(bool, usize)> {
    let mut j = p + 1;
    let negated = j < pat.len() && (pat[j] == '!' || pat[j] == '^');
    if negated {
        j += 1;
    }

    let mut matched = false;
    let mut first = true;
    while j < pat.len() {
        if pat[j] == ']' && !first {
            return Some((matched != negated, j + 1));
        }
        first = false;
        // Range like a-z (the '-' must not be the closing member)
        if j + 2 < pat.len() && pat[j + 1] == '-' && pat[j + 2] != ']' {
            if pat[j] <= c && c <= pat[j + 2] {
                matched = true;
            }
            j += 3;
        } else {
            if pat[j] == c {
                matched = true;
            }
            j += 1;
        }
    }
    None
}
