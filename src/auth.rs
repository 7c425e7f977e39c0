use std::fmt;

/// API credential: a GitLab bearer token or a Datadog API key.
///
/// `Debug` and `Display` never print the secret itself so tokens can be
/// logged alongside the rest of the configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_trims_whitespace() {
        let token = Token::from("  glpat-abc\n");
        assert_eq!(token.as_str(), "glpat-abc");
    }

    #[test]
    fn test_token_is_redacted() {
        let token = Token::from("glpat-secret");
        assert_eq!(format!("{token:?}"), "Token(***)");
        assert!(!token.to_string().contains("secret"));
    }
}
