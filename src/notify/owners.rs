use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;

use crate::wildcard::Wildcard;

#[derive(Debug, Clone)]
struct OwnerRule {
    pattern: Wildcard,
    owners: Vec<String>,
}

/// Job ownership rules, in the CODEOWNERS format.
///
/// Each non-empty, non-comment line is `pattern @owner [@owner...]`. Patterns
/// match job names and may use `*` and `?`. When several rules match a job,
/// the last one in the file wins.
#[derive(Debug, Clone, Default)]
pub struct JobOwners {
    rules: Vec<OwnerRule>,
}

impl JobOwners {
    pub fn parse(content: &str) -> Result<Self> {
        let mut rules = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let Some(pattern) = fields.next() else {
                continue;
            };
            let owners: Vec<String> = fields
                .take_while(|field| !field.starts_with('#'))
                .map(ToString::to_string)
                .collect();

            let pattern = Wildcard::new(pattern)
                .with_context(|| format!("Invalid job owners rule on line {}", idx + 1))?;

            rules.push(OwnerRule { pattern, owners });
        }

        Ok(Self { rules })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read job owners file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse job owners file: {}", path.display()))
    }

    /// Owners of `job`, from the last matching rule. A matching rule without
    /// owners explicitly leaves the job unowned.
    pub fn owners_of(&self, job: &str) -> &[String] {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.pattern.is_match(job))
            .inspect(|rule| debug!("{job} owned through rule `{}`", rule.pattern.as_str()))
            .map(|rule| rule.owners.as_slice())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
