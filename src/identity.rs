use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of example contexts kept on a pattern
pub const MAX_EXAMPLES: usize = 5;

/// Highest meaningful priority weight
pub const MAX_PRIORITY: u8 = 10;

/// How a pattern is compared against a repository context
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PatternKind {
    /// Text contained anywhere in the remote URL
    UrlSubstring,
    /// Remote host equals the text or is a subdomain of it
    UrlDomain,
    /// Text contained anywhere in the local path
    PathSubstring,
    /// Local path is the text or lies beneath it
    PathPrefix,
}

impl PatternKind {
    /// Guess the kind of a user-entered pattern.
    ///
    /// Paths start with `/` or `~`, bare hostnames become domain patterns and
    /// everything else is matched as a URL substring.
    pub fn infer(text: &str) -> Self {
        let text = text.trim();
        if text.starts_with('/') || text.starts_with('~') {
            PatternKind::PathPrefix
        } else if is_bare_domain(text) {
            PatternKind::UrlDomain
        } else {
            PatternKind::UrlSubstring
        }
    }

    pub fn is_url(self) -> bool {
        matches!(self, PatternKind::UrlSubstring | PatternKind::UrlDomain)
    }

    pub fn label(self) -> &'static str {
        match self {
            PatternKind::UrlSubstring => "url-substring",
            PatternKind::UrlDomain => "url-domain",
            PatternKind::PathSubstring => "path-substring",
            PatternKind::PathPrefix => "path-prefix",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "url-substring" | "url" => Some(PatternKind::UrlSubstring),
            "url-domain" | "domain" => Some(PatternKind::UrlDomain),
            "path-substring" | "path" => Some(PatternKind::PathSubstring),
            "path-prefix" | "prefix" => Some(PatternKind::PathPrefix),
            _ => None,
        }
    }
}

fn is_bare_domain(text: &str) -> bool {
    !text.is_empty()
        && text.contains('.')
        && !text.starts_with('.')
        && !text.ends_with('.')
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Where a pattern came from
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PatternSource {
    #[default]
    Manual,
    Learned,
}

/// A text fragment that recognizes repositories belonging to one identity
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: PatternKind,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub source: PatternSource,
}

impl Pattern {
    pub fn new(text: &str, kind: PatternKind, source: PatternSource) -> Self {
        Pattern {
            text: normalize_text(text, kind),
            kind,
            usage_count: 0,
            last_used: None,
            examples: Vec::new(),
            source,
        }
    }

    /// A user-provided pattern, inferring the kind when none is given
    pub fn manual(text: &str, kind: Option<PatternKind>) -> Self {
        let kind = kind.unwrap_or_else(|| PatternKind::infer(text));
        Pattern::new(text, kind, PatternSource::Manual)
    }

    pub fn learned(text: &str, kind: PatternKind, example: &str) -> Self {
        let mut pattern = Pattern::new(text, kind, PatternSource::Learned);
        pattern.note_example(example);
        pattern
    }

    /// Remember a context this pattern matched, oldest examples fall off first
    pub fn note_example(&mut self, example: &str) {
        let example = example.trim();
        if example.is_empty() || self.examples.iter().any(|e| e == example) {
            return;
        }
        self.examples.push(example.to_string());
        if self.examples.len() > MAX_EXAMPLES {
            let overflow = self.examples.len() - MAX_EXAMPLES;
            self.examples.drain(..overflow);
        }
    }

    pub fn same_matcher(&self, other: &Pattern) -> bool {
        self.kind == other.kind && self.text == other.text
    }
}

/// Canonical form of pattern text: trimmed, URL kinds lower-cased, no
/// trailing separator or `.git`
pub fn normalize_text(text: &str, kind: PatternKind) -> String {
    let mut text = text.trim().to_string();
    while text.len() > 1 && (text.ends_with('/') || text.ends_with('\\')) {
        text.pop();
    }
    if kind.is_url() {
        text = text.to_lowercase();
        if let Some(stripped) = text.strip_suffix(".git") {
            text = stripped.to_string();
        }
    }
    text
}

/// A git author identity the user can commit as
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub git_name: String,
    pub email: String,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn new(id: &str, name: &str, git_name: &str, email: &str) -> Self {
        Identity {
            id: id.trim().to_string(),
            name: name.trim().to_string(),
            git_name: git_name.trim().to_string(),
            email: email.trim().to_string(),
            patterns: Vec::new(),
            priority: 0,
            is_default: false,
            usage_count: 0,
            last_used: None,
        }
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Validate the identity before it is stored
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            anyhow::bail!("Account id cannot be empty");
        }

        if self.id.contains('/') || self.id.contains('\\') || self.id.contains(char::is_whitespace) {
            anyhow::bail!("Account id cannot contain path separators or whitespace");
        }

        if self.git_name.is_empty() {
            anyhow::bail!("Git user name cannot be empty");
        }

        if !is_valid_email(&self.email) {
            anyhow::bail!("Invalid email format: {}", self.email);
        }

        if self.priority > MAX_PRIORITY {
            anyhow::bail!("Priority must be between 0 and {}", MAX_PRIORITY);
        }

        Ok(())
    }

    pub fn find_pattern(&self, candidate: &Pattern) -> Option<usize> {
        self.patterns.iter().position(|p| p.same_matcher(candidate))
    }

    /// Short line used in prompts and listings
    pub fn label(&self) -> String {
        format!("{} ({} <{}>)", self.id, self.git_name, self.email)
    }

    pub fn has_email(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }

    /// Fold usage counters from `updated` into `self`.
    ///
    /// Counters take the larger of both sides so a stale writer never rolls
    /// them back. Only patterns listed in `learned` are appended; other
    /// patterns missing from `self` were removed concurrently and stay gone.
    pub fn merge_usage(&mut self, updated: &Identity, learned: Option<&Pattern>) {
        self.usage_count = self.usage_count.max(updated.usage_count);
        self.last_used = self.last_used.max(updated.last_used);

        for pattern in &updated.patterns {
            match self.find_pattern(pattern) {
                Some(idx) => {
                    let current = &mut self.patterns[idx];
                    current.usage_count = current.usage_count.max(pattern.usage_count);
                    current.last_used = current.last_used.max(pattern.last_used);
                    for example in &pattern.examples {
                        current.note_example(example);
                    }
                }
                None if learned.is_some_and(|l| l.same_matcher(pattern)) => {
                    self.patterns.push(pattern.clone());
                }
                None => {}
            }
        }
    }
}

/// Basic email check: one `@`, non-empty local part, dotted domain
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_kind_from_text() {
        assert_eq!(PatternKind::infer("/home/me/work"), PatternKind::PathPrefix);
        assert_eq!(PatternKind::infer("~/oss"), PatternKind::PathPrefix);
        assert_eq!(PatternKind::infer("acme-corp.com"), PatternKind::UrlDomain);
        assert_eq!(PatternKind::infer("github.com/acme-corp"), PatternKind::UrlSubstring);
        assert_eq!(PatternKind::infer("acme-corp"), PatternKind::UrlSubstring);
    }

    #[test]
    fn normalizes_url_pattern_text() {
        let p = Pattern::manual("  GitHub.com/Acme-Corp/Repo.git/ ", None);
        assert_eq!(p.kind, PatternKind::UrlSubstring);
        assert_eq!(p.text, "github.com/acme-corp/repo");

        let p = Pattern::manual("GitHub.com/Acme-Corp/Repo", None);
        assert_eq!(p.text, "github.com/acme-corp/repo");
    }

    #[test]
    fn path_patterns_keep_case() {
        let p = Pattern::manual("/Users/Me/Work/", None);
        assert_eq!(p.text, "/Users/Me/Work");
        assert_eq!(Pattern::manual("/", None).text, "/");
    }

    #[test]
    fn examples_are_capped_and_unique() {
        let mut p = Pattern::manual("acme", None);
        for i in 0..8 {
            p.note_example(&format!("ctx-{i}"));
            p.note_example(&format!("ctx-{i}"));
        }
        assert_eq!(p.examples.len(), MAX_EXAMPLES);
        assert_eq!(p.examples.first().map(String::as_str), Some("ctx-3"));
        assert_eq!(p.examples.last().map(String::as_str), Some("ctx-7"));
    }

    #[test]
    fn validate_rejects_bad_input() {
        assert!(Identity::new("work", "Work", "Me", "me@work.com").validate().is_ok());
        assert!(Identity::new("", "Work", "Me", "me@work.com").validate().is_err());
        assert!(Identity::new("a/b", "Work", "Me", "me@work.com").validate().is_err());
        assert!(Identity::new("work", "Work", "Me", "not-an-email").validate().is_err());
        assert!(Identity::new("work", "Work", "", "me@work.com").validate().is_err());

        let mut loud = Identity::new("work", "Work", "Me", "me@work.com");
        loud.priority = 11;
        assert!(loud.validate().is_err());
    }

    #[test]
    fn merge_usage_never_rolls_back_counters() {
        let mut stored = Identity::new("work", "Work", "Me", "me@work.com")
            .with_pattern(Pattern::manual("github.com/acme", None));
        stored.usage_count = 10;
        stored.patterns[0].usage_count = 4;

        let mut stale = stored.clone();
        stale.usage_count = 7;
        stale.patterns[0].usage_count = 5;
        let learned = Pattern::learned("/home/me/work", PatternKind::PathPrefix, "/home/me/work/api");
        stale.patterns.push(learned.clone());
        stale.patterns.push(Pattern::manual("removed-elsewhere", None));

        stored.merge_usage(&stale, Some(&learned));

        assert_eq!(stored.usage_count, 10);
        assert_eq!(stored.patterns[0].usage_count, 5);
        assert_eq!(stored.patterns.len(), 2);
        assert!(stored.find_pattern(&learned).is_some());
    }

    #[test]
    fn serializes_with_store_field_names() {
        let identity = Identity::new("work", "Work", "Me", "me@work.com")
            .with_pattern(Pattern::manual("acme-corp.com", None));
        let json = serde_json::to_value(&identity).expect("serialize");
        assert_eq!(json["gitName"], "Me");
        assert_eq!(json["isDefault"], false);
        assert_eq!(json["patterns"][0]["type"], "url-domain");
        assert_eq!(json["patterns"][0]["usageCount"], 0);
    }
}
