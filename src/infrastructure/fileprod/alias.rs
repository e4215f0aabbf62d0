//! Path aliasing: literal and regex rewrites applied before lookup.

use std::collections::HashSet;

use regex::{Captures, Regex};

use super::ProduceError;

/// A single rewrite rule. Patterns match the whole path.
#[derive(Debug)]
struct AliasRule {
    regex: Regex,
    template: String,
}

/// Ordered set of alias rules, composed until a fixed point.
#[derive(Debug, Default)]
pub struct AliasMap {
    rules: Vec<AliasRule>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one exact path to another.
    pub fn add_literal(&mut self, from: &str, to: &str) {
        let regex = Regex::new(&format!("^(?:{})$", regex::escape(from))).unwrap();
        self.rules.push(AliasRule {
            regex,
            // The target is taken verbatim, so its backslashes must not be
            // interpreted as backreferences.
            template: to.replace('\\', "\\\\"),
        });
    }

    /// Map every path matching `pattern` through `template`.
    ///
    /// `template` may use `\0`..`\9` for capture groups of the match and
    /// `\\` for a literal backslash.
    pub fn add_regex(&mut self, pattern: &str, template: &str) -> Result<(), regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        self.rules.push(AliasRule {
            regex,
            template: template.to_string(),
        });
        Ok(())
    }

    /// Expand aliases until no rule matches.
    ///
    /// Rules are retried from the first one after every rewrite. A path that
    /// comes back to an already-seen value is a cycle.
    pub fn resolve(&self, path: &str) -> Result<String, ProduceError> {
        let mut current = path.to_string();
        let mut seen = HashSet::new();
        seen.insert(current.clone());

        'rewrite: loop {
            for rule in &self.rules {
                if let Some(caps) = rule.regex.captures(&current) {
                    let next = expand_template(&caps, &rule.template);
                    if next == current {
                        break 'rewrite;
                    }
                    if !seen.insert(next.clone()) {
                        return Err(ProduceError::AliasCycle(path.to_string()));
                    }
                    current = next;
                    continue 'rewrite;
                }
            }
            break;
        }
        Ok(current)
    }
}

/// Expand `\0`..`\9` backreferences from a regex match; `\\` escapes a
/// backslash. A reference to an unmatched group expands to nothing.
pub(crate) fn expand_template(caps: &Captures<'_>, template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some(d @ '0'..='9') => {
                let group = d as usize - '0' as usize;
                if let Some(m) = caps.get(group) {
                    out.push_str(m.as_str());
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
