use serde::Serialize;
use std::fmt;

use crate::identity::PatternKind;

/// Why an identity received its confidence.
///
/// Kept as data so callers and tests can inspect it; `Display` renders the
/// sentence shown to users.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "match", rename_all = "kebab-case")]
pub enum Reason {
    Pattern {
        kind: PatternKind,
        text: String,
        owner: String,
    },
    NoMatch {
        owner: String,
    },
}

impl Reason {
    pub fn is_match(&self) -> bool {
        matches!(self, Reason::Pattern { .. })
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Pattern { kind, text, .. } => match kind {
                PatternKind::UrlSubstring if text.contains('/') => {
                    write!(f, "URL contains organization pattern '{}'", text)
                }
                PatternKind::UrlSubstring => write!(f, "URL contains pattern '{}'", text),
                PatternKind::UrlDomain => write!(f, "URL host matches domain '{}'", text),
                PatternKind::PathSubstring => write!(f, "path contains '{}'", text),
                PatternKind::PathPrefix => write!(f, "path is under '{}'", text),
            },
            Reason::NoMatch { .. } => write!(f, "no pattern matched this repository"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_match_kind() {
        let render = |kind, text: &str| {
            Reason::Pattern {
                kind,
                text: text.to_string(),
                owner: "work".to_string(),
            }
            .to_string()
        };

        assert_eq!(
            render(PatternKind::UrlSubstring, "github.com/acme-corp"),
            "URL contains organization pattern 'github.com/acme-corp'"
        );
        assert_eq!(render(PatternKind::UrlSubstring, "acme"), "URL contains pattern 'acme'");
        assert_eq!(
            render(PatternKind::UrlDomain, "acme-corp.com"),
            "URL host matches domain 'acme-corp.com'"
        );
        assert_eq!(render(PatternKind::PathPrefix, "/home/me/work"), "path is under '/home/me/work'");
        assert_eq!(render(PatternKind::PathSubstring, "oss"), "path contains 'oss'");
    }

    #[test]
    fn serializes_as_tagged_variant() {
        let reason = Reason::Pattern {
            kind: PatternKind::UrlDomain,
            text: "acme-corp.com".to_string(),
            owner: "work".to_string(),
        };
        let json = serde_json::to_value(&reason).expect("serialize");
        assert_eq!(json["match"], "pattern");
        assert_eq!(json["kind"], "url-domain");
        assert_eq!(json["owner"], "work");

        let none = serde_json::to_value(Reason::NoMatch { owner: "a".into() }).expect("serialize");
        assert_eq!(none["match"], "no-match");
    }
}
