use regex::Regex;

use crate::error::{PipewatchError, Result};

/// Shell-style pattern where `*` matches any run of characters and `?`
/// exactly one; everything else matches literally.
#[derive(Debug, Clone)]
pub struct Wildcard {
    pattern: String,
    regex: Regex,
}

impl Wildcard {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        for c in pattern.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');

        let regex = Regex::new(&source)
            .map_err(|e| PipewatchError::Config(format!("Invalid pattern `{pattern}`: {e}")))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn has_wildcards(&self) -> bool {
        self.pattern.contains(['*', '?'])
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let pattern = Wildcard::new("job1").unwrap();
        assert!(pattern.is_match("job1"));
        assert!(!pattern.is_match("job10"));
        assert!(!pattern.has_wildcards());
    }

    #[test]
    fn test_star_matches_any_suffix() {
        let pattern = Wildcard::new("not*").unwrap();
        assert!(pattern.is_match("not"));
        assert!(pattern.is_match("notify-slack"));
        assert!(!pattern.is_match("knot"));
    }

    #[test]
    fn test_question_mark_matches_one_char() {
        let pattern = Wildcard::new("datadog-agent_7.?.deb").unwrap();
        assert!(pattern.is_match("datadog-agent_7.5.deb"));
        assert!(!pattern.is_match("datadog-agent_7.52.deb"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let pattern = Wildcard::new("tests_(deb)+x86_64").unwrap();
        assert!(pattern.is_match("tests_(deb)+x86_64"));
        assert!(!pattern.is_match("tests_debx86_64"));
    }
}
