use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::history::UsageEvent;
use crate::identity::{Identity, Pattern, PatternKind, MAX_PRIORITY};
use crate::reason::Reason;
use crate::remote::Remote;

const URL_SUBSTRING_BASE: f64 = 0.60;
const URL_SUBSTRING_SPAN: f64 = 0.30;
const URL_DOMAIN_SCORE: f64 = 0.45;
const PATH_PRIMARY_BASE: f64 = 0.60;
const PATH_PRIMARY_SPAN: f64 = 0.30;
const PATH_SECONDARY_BASE: f64 = 0.20;
const PATH_SECONDARY_SPAN: f64 = 0.14;

const IDENTITY_USAGE_BOOST: f64 = 0.03;
const PATTERN_USAGE_BOOST: f64 = 0.02;
const PRIORITY_BOOST: f64 = 0.01;
const CONTEXT_RECENCY_BOOST: f64 = 0.03;
const LAST_USED_BOOST: f64 = 0.01;
const MAX_BOOST: f64 = 0.10;

/// Unmatched identities keep a sliver of their boost so callers can still
/// order the raw choices
const NO_MATCH_DAMPING: f64 = 0.1;

/// Usage counts above this no longer raise the boost
const USAGE_SATURATION: u64 = 100;

pub const DEFAULT_RECENCY_DAYS: u32 = 30;

/// Repository signals for one suggestion request
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RepoContext {
    pub remote_url: Option<String>,
    pub path: String,
    pub current_email: Option<String>,
}

impl RepoContext {
    pub fn new(remote_url: Option<String>, path: &str) -> Self {
        RepoContext {
            remote_url,
            path: path.to_string(),
            current_email: None,
        }
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.current_email = email;
        self
    }

    /// Remote URL when present, otherwise the path
    pub fn label(&self) -> String {
        match self.remote_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => url.to_string(),
            None => self.path.clone(),
        }
    }
}

/// Knobs that keep the engine pure: the clock and the learning policy are
/// passed in rather than read
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub now: DateTime<Utc>,
    pub recency_horizon: Duration,
    pub auto_learn: bool,
}

impl EngineOptions {
    pub fn at(now: DateTime<Utc>) -> Self {
        EngineOptions {
            now,
            recency_horizon: Duration::days(i64::from(DEFAULT_RECENCY_DAYS)),
            auto_learn: true,
        }
    }

    pub fn with_recency_days(mut self, days: u32) -> Self {
        self.recency_horizon = Duration::days(i64::from(days));
        self
    }

    pub fn with_auto_learn(mut self, auto_learn: bool) -> Self {
        self.auto_learn = auto_learn;
        self
    }

    /// 1.0 for a use right now, falling linearly to 0.0 at the horizon
    pub fn decay(&self, at: Option<DateTime<Utc>>) -> f64 {
        let Some(at) = at else {
            return 0.0;
        };
        let horizon = self.recency_horizon.num_seconds();
        if horizon <= 0 {
            return 0.0;
        }
        let age = (self.now - at).num_seconds().max(0);
        if age >= horizon {
            0.0
        } else {
            1.0 - age as f64 / horizon as f64
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions::at(Utc::now())
    }
}

/// A pattern of the suggested identity that matched the context
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPattern {
    pub index: usize,
    pub kind: PatternKind,
    pub text: String,
    pub score: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub identity_id: String,
    pub confidence: f64,
    pub reason: Reason,
    pub matched: Vec<MatchedPattern>,
}

impl Suggestion {
    pub fn is_match(&self) -> bool {
        self.reason.is_match()
    }
}

/// Context pre-processed once per request
pub(crate) struct Signals {
    raw_url: Option<String>,
    normalized_url: Option<String>,
    remote: Option<Remote>,
    path: Option<String>,
}

impl Signals {
    pub(crate) fn from_context(context: &RepoContext) -> Self {
        let raw_url = context
            .remote_url
            .as_deref()
            .map(|u| u.trim().to_lowercase())
            .filter(|u| !u.is_empty());
        let remote = raw_url.as_deref().and_then(Remote::parse);
        let normalized_url = remote.as_ref().map(Remote::normalized);

        Signals {
            raw_url,
            normalized_url,
            remote,
            path: normalize_path(&context.path),
        }
    }

    fn path_score(&self, specificity: f64) -> f64 {
        if self.raw_url.is_some() {
            PATH_SECONDARY_BASE + PATH_SECONDARY_SPAN * specificity
        } else {
            PATH_PRIMARY_BASE + PATH_PRIMARY_SPAN * specificity
        }
    }
}

fn normalize_path(path: &str) -> Option<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut normalized = trimmed.replace('\\', "/");
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    Some(normalized)
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64).min(1.0)
    }
}

/// Score of a single pattern against the context, `None` when it does not match
pub(crate) fn score_pattern(pattern: &Pattern, signals: &Signals) -> Option<f64> {
    let text = pattern.text.trim();
    if text.is_empty() {
        return None;
    }

    match pattern.kind {
        PatternKind::UrlSubstring => {
            let needle = text.to_lowercase();
            let raw = signals.raw_url.as_deref()?;
            let found = [signals.normalized_url.as_deref(), Some(raw)]
                .into_iter()
                .flatten()
                .any(|h| h.contains(needle.as_str()));
            // one denominator for every pattern, so longer always means more specific
            found.then(|| URL_SUBSTRING_BASE + URL_SUBSTRING_SPAN * ratio(needle.len(), raw.len()))
        }
        PatternKind::UrlDomain => {
            let remote = signals.remote.as_ref()?;
            remote
                .host_matches_domain(&text.to_lowercase())
                .then_some(URL_DOMAIN_SCORE)
        }
        PatternKind::PathSubstring => {
            let path = signals.path.as_deref()?;
            let needle = text.replace('\\', "/");
            path.contains(needle.as_str())
                .then(|| signals.path_score(ratio(needle.len(), path.len())))
        }
        PatternKind::PathPrefix => {
            let path = signals.path.as_deref()?;
            let prefix = text.replace('\\', "/");
            let prefix = prefix.trim_end_matches('/');
            let under = if prefix.is_empty() {
                path.starts_with('/')
            } else {
                path == prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            };
            under.then(|| signals.path_score(ratio(prefix.len().max(1), path.len())))
        }
    }
}

/// Saturating logarithmic weight in [0, 1]
fn usage_weight(count: u64) -> f64 {
    let capped = count.min(USAGE_SATURATION) as f64;
    (capped + 1.0).ln() / (USAGE_SATURATION as f64 + 1.0).ln()
}

fn boost(
    identity: &Identity,
    best: Option<&Pattern>,
    context: &RepoContext,
    history: &[UsageEvent],
    options: &EngineOptions,
) -> f64 {
    let priority = f64::from(identity.priority.min(MAX_PRIORITY)) / f64::from(MAX_PRIORITY);
    let context_recency = history
        .iter()
        .filter(|event| event.identity_id == identity.id && event.is_similar_to(context))
        .map(|event| options.decay(Some(event.at)))
        .fold(0.0, f64::max);

    let mut total = IDENTITY_USAGE_BOOST * usage_weight(identity.usage_count)
        + PRIORITY_BOOST * priority
        + CONTEXT_RECENCY_BOOST * context_recency
        + LAST_USED_BOOST * options.decay(identity.last_used);
    if let Some(pattern) = best {
        total += PATTERN_USAGE_BOOST * usage_weight(pattern.usage_count);
    }

    total.min(MAX_BOOST)
}

fn score_identity(
    identity: &Identity,
    context: &RepoContext,
    signals: &Signals,
    history: &[UsageEvent],
    options: &EngineOptions,
) -> Suggestion {
    let mut matched: Vec<MatchedPattern> = identity
        .patterns
        .iter()
        .enumerate()
        .filter_map(|(index, pattern)| {
            score_pattern(pattern, signals).map(|score| MatchedPattern {
                index,
                kind: pattern.kind,
                text: pattern.text.clone(),
                score,
            })
        })
        .collect();
    matched.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));

    let (confidence, reason) = match matched.first() {
        Some(best) => {
            let pattern = &identity.patterns[best.index];
            let confidence = best.score + boost(identity, Some(pattern), context, history, options);
            let reason = Reason::Pattern {
                kind: best.kind,
                text: best.text.clone(),
                owner: identity.id.clone(),
            };
            (confidence, reason)
        }
        None => {
            let confidence = boost(identity, None, context, history, options) * NO_MATCH_DAMPING;
            let reason = Reason::NoMatch {
                owner: identity.id.clone(),
            };
            (confidence, reason)
        }
    };

    let confidence = confidence.clamp(0.0, 1.0);
    tracing::debug!(
        identity = %identity.id,
        confidence,
        matches = matched.len(),
        "scored identity"
    );

    Suggestion {
        identity_id: identity.id.clone(),
        confidence,
        reason,
        matched,
    }
}

/// Rank `identities` for `context`, best first.
///
/// Each pattern kind scores inside its own band; usage, priority and
/// recency add a bounded boost on top of the best match. The boost cap is
/// smaller than the gap between bands, so a busy identity with a weak match
/// never overtakes one with a strong match.
///
/// | signal                     | score                     |
/// |----------------------------|---------------------------|
/// | URL substring              | 0.60 + 0.30 * specificity |
/// | URL domain                 | 0.45                      |
/// | path, no remote URL        | 0.60 + 0.30 * specificity |
/// | path, remote URL present   | 0.20 + 0.14 * specificity |
/// | usage + priority + recency | at most 0.10              |
///
/// Every identity is returned once (first occurrence wins for duplicate
/// ids). Ties fall back to the default flag, then the usage counter, then
/// the id.
pub fn suggest(
    context: &RepoContext,
    identities: &[Identity],
    history: &[UsageEvent],
    options: &EngineOptions,
) -> Vec<Suggestion> {
    let signals = Signals::from_context(context);
    let mut seen = HashSet::new();

    let mut ranked: Vec<(Suggestion, &Identity)> = identities
        .iter()
        .filter(|identity| seen.insert(identity.id.as_str()))
        .map(|identity| {
            (
                score_identity(identity, context, &signals, history, options),
                identity,
            )
        })
        .collect();

    ranked.sort_by(|(a, a_identity), (b, b_identity)| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b_identity.is_default.cmp(&a_identity.is_default))
            .then_with(|| b_identity.usage_count.cmp(&a_identity.usage_count))
            .then_with(|| a_identity.id.cmp(&b_identity.id))
    });

    ranked.into_iter().map(|(suggestion, _)| suggestion).collect()
}

/// The first suggestion, if it is backed by a pattern match
pub fn top_match(suggestions: &[Suggestion]) -> Option<&Suggestion> {
    suggestions.first().filter(|s| s.is_match())
}
