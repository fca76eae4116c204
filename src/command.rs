//! A shell-command value with an optional human-readable comment,
//! rendered into Makefile recipe lines.

use regex::Regex;
use std::sync::OnceLock;

/// Escape characters in `[\s()\\]` with a backslash. Applied to every
/// path substituted into a command.
pub fn shell_escape(s: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"[\s()\\]").unwrap());
    re.replace_all(s, r"\$0").into_owned()
}

/// One or more literal shell-command lines, with an optional leading
/// comment, rendered as a Makefile recipe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    parts: Vec<String>,
    comment: Option<String>,
}

impl Command {
    pub fn new(part: impl Into<String>) -> Self {
        Self {
            parts: vec![part.into()],
            comment: None,
        }
    }

    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
            comment: None,
        }
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) -> &mut Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Render into the lines that should appear under a Makefile
    /// target, honoring the `noisy` flag: when not noisy, each part is
    /// prefixed with `@`; a comment (if present) becomes a leading
    /// `@echo '<comment>'` line.
    pub fn get_actions(&self, noisy: bool) -> Vec<String> {
        let mut actions = Vec::with_capacity(self.parts.len() + 1);
        if let Some(comment) = &self.comment {
            let echo = format!("echo '{comment}'");
            actions.push(if noisy { echo } else { format!("@{echo}") });
        }
        for part in &self.parts {
            actions.push(if noisy {
                part.clone()
            } else {
                format!("@{part}")
            });
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_whitespace_parens_and_backslash() {
        assert_eq!(shell_escape("a b"), r"a\ b");
        assert_eq!(shell_escape("a(b)"), r"a\(b\)");
        assert_eq!(shell_escape(r"a\b"), r"a\\b");
        assert_eq!(shell_escape("plain"), "plain");
    }

    #[test]
    fn noisy_vs_silent_rendering() {
        let mut cmd = Command::new("gcc -c a.c");
        cmd.set_comment("Compiling a.c");
        assert_eq!(
            cmd.get_actions(false),
            vec!["@echo 'Compiling a.c'".to_string(), "@gcc -c a.c".to_string()]
        );
        assert_eq!(
            cmd.get_actions(true),
            vec!["echo 'Compiling a.c'".to_string(), "gcc -c a.c".to_string()]
        );
    }
}
