//! User-configured icon overrides.
//!
//! Each rule pairs a shell-style glob with an icon file. Rules are checked
//! in order against the full path and the first match wins.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::settings::IconOverride;
use crate::error::{CoreError, CoreResult};

#[derive(Debug)]
struct Rule {
    pattern: Regex,
    icon: PathBuf,
}

#[derive(Debug, Default)]
pub struct IconOverrides {
    rules: Vec<Rule>,
}

impl IconOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule. Fails if `glob` does not compile.
    pub fn with_rule(mut self, glob: &str, icon: impl Into<PathBuf>) -> CoreResult<Self> {
        let pattern = Regex::new(&glob_to_regex(glob))
            .map_err(|e| CoreError::ConfigParse(format!("bad icon pattern {glob:?}: {e}")))?;
        self.rules.push(Rule {
            pattern,
            icon: icon.into(),
        });
        Ok(self)
    }

    pub fn from_config(overrides: &[IconOverride]) -> CoreResult<Self> {
        overrides
            .iter()
            .try_fold(Self::new(), |acc, o| acc.with_rule(&o.pattern, &o.icon))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// The icon file for `path`, if any rule matches.
    pub fn icon_for(&self, path: &Path) -> Option<&Path> {
        let text = path.to_string_lossy();
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(&text))
            .map(|rule| rule.icon.as_path())
    }
}

/// Translates a glob into an anchored regex. `*` and `?` never match `/`.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '\\' || c == '[' {
                        class.push('\\');
                    }
                    class.push(c);
                }
                if closed {
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                } else {
                    out.push_str(r"\[");
                    out.push_str(&regex::escape(class.trim_start_matches('^')));
                }
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}
