use serde::Serialize;
use std::path::{Component, Path};

use crate::identity::{Identity, Pattern, PatternKind};
use crate::remote::{looks_like_remote, Remote};
use crate::suggest::{score_pattern, suggest, EngineOptions, RepoContext, Signals};

/// Shortest owner/directory text worth learning
pub const MIN_LEARNED_LEN: usize = 3;

/// Path prefixes need at least this many components (`/home/me/work`)
pub const MIN_PREFIX_COMPONENTS: usize = 3;

/// What a usage key refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKey {
    Url(String),
    Path(String),
}

impl ContextKey {
    pub fn classify(key: &str) -> Self {
        let key = key.trim();
        if looks_like_remote(key) {
            ContextKey::Url(key.to_string())
        } else {
            ContextKey::Path(key.to_string())
        }
    }

    fn as_context(&self) -> RepoContext {
        match self {
            ContextKey::Url(url) => RepoContext::new(Some(url.clone()), ""),
            ContextKey::Path(path) => RepoContext::new(None, path),
        }
    }

    fn text(&self) -> &str {
        match self {
            ContextKey::Url(text) | ContextKey::Path(text) => text,
        }
    }
}

/// Result of `record_usage`; the caller persists `identity`
#[derive(Debug, Clone, PartialEq)]
pub struct UsageUpdate {
    pub identity: Identity,
    pub bumped: Option<usize>,
    pub learned: Option<Pattern>,
}

/// Count one switch to `identity` for `context_key`.
///
/// Returns an updated copy; the input is left untouched. Callers should
/// only call this on an actual switch, repeated calls count repeatedly.
pub fn record_usage(identity: &Identity, context_key: &str, options: &EngineOptions) -> UsageUpdate {
    let key = ContextKey::classify(context_key);
    let signals = Signals::from_context(&key.as_context());

    let mut updated = identity.clone();
    updated.usage_count = updated.usage_count.saturating_add(1);
    updated.last_used = Some(options.now);

    let best = updated
        .patterns
        .iter()
        .enumerate()
        .filter_map(|(idx, pattern)| score_pattern(pattern, &signals).map(|score| (idx, score)))
        .max_by(|(ia, a), (ib, b)| a.total_cmp(b).then(ib.cmp(ia)))
        .map(|(idx, _)| idx);

    if let Some(idx) = best {
        let pattern = &mut updated.patterns[idx];
        pattern.usage_count = pattern.usage_count.saturating_add(1);
        pattern.last_used = Some(options.now);
        pattern.note_example(key.text());
        return UsageUpdate {
            identity: updated,
            bumped: Some(idx),
            learned: None,
        };
    }

    let learned = if options.auto_learn {
        derive_pattern(&key).map(|mut pattern| {
            pattern.usage_count = 1;
            pattern.last_used = Some(options.now);
            pattern
        })
    } else {
        None
    };

    if let Some(pattern) = &learned {
        tracing::debug!(identity = %identity.id, pattern = %pattern.text, "learned pattern from usage");
        updated.patterns.push(pattern.clone());
    }

    UsageUpdate {
        identity: updated,
        bumped: None,
        learned,
    }
}

/// Pattern that `record_usage` would learn for `key`, if any
pub fn derive_pattern(key: &ContextKey) -> Option<Pattern> {
    match key {
        ContextKey::Url(url) => owner_pattern(url),
        ContextKey::Path(path) => parent_prefix_pattern(path),
    }
}

/// `host/owner`, or `host/repo` for single-segment remotes
fn owner_pattern(url: &str) -> Option<Pattern> {
    let remote = Remote::parse(url)?;
    let owner = remote.owner()?;
    if owner.len() < MIN_LEARNED_LEN {
        return None;
    }
    Some(Pattern::learned(
        &remote.owner_prefix(),
        PatternKind::UrlSubstring,
        url,
    ))
}

/// `host/owner/repo`, only for remotes that have both parts
fn repo_pattern(url: &str) -> Option<Pattern> {
    let remote = Remote::parse(url)?;
    remote.repo()?;
    Some(Pattern::learned(&remote.normalized(), PatternKind::UrlSubstring, url))
}

fn parent_prefix_pattern(path: &str) -> Option<Pattern> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parent = Path::new(trimmed).parent()?;
    let components = parent
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    let text = parent.to_string_lossy();
    if components < MIN_PREFIX_COMPONENTS || text.len() < MIN_LEARNED_LEN {
        return None;
    }
    Some(Pattern::learned(&text, PatternKind::PathPrefix, trimmed))
}

/// A repository whose identity is already known
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectAssignment {
    pub context: RepoContext,
    pub identity_id: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LearnedPattern {
    pub identity_id: String,
    pub pattern: Pattern,
}

/// A candidate that was refused because it would mis-rank other projects
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LearnConflict {
    pub identity_id: String,
    pub pattern: Pattern,
    pub project: String,
    pub demoted: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedProject {
    pub project: String,
    pub identity_id: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LearnReport {
    pub learned: Vec<LearnedPattern>,
    pub conflicts: Vec<LearnConflict>,
    pub skipped: Vec<SkippedProject>,
}

impl LearnReport {
    /// Apply learned patterns to a store snapshot
    pub fn apply(&self, identities: &mut [Identity]) {
        for learned in &self.learned {
            if let Some(identity) = identities.iter_mut().find(|i| i.id == learned.identity_id) {
                if identity.find_pattern(&learned.pattern).is_none() {
                    identity.patterns.push(learned.pattern.clone());
                }
            }
        }
    }
}

fn candidates(context: &RepoContext) -> Vec<Pattern> {
    let mut out = Vec::new();
    if let Some(url) = context.remote_url.as_deref().filter(|u| !u.trim().is_empty()) {
        out.extend(owner_pattern(url));
        out.extend(repo_pattern(url));
    }
    out.extend(parent_prefix_pattern(&context.path));
    out
}

/// Rank of `identity_id` for `context`, only when a pattern backs it.
/// Unmatched identities are ordered by tie-breakers alone and have no
/// ranking to protect.
fn matched_rank(
    context: &RepoContext,
    identities: &[Identity],
    identity_id: &str,
    options: &EngineOptions,
) -> Option<usize> {
    suggest(context, identities, &[], options)
        .iter()
        .position(|s| s.identity_id == identity_id && s.is_match())
}

fn ranks_first_by_match(
    context: &RepoContext,
    identities: &[Identity],
    identity_id: &str,
    options: &EngineOptions,
) -> bool {
    suggest(context, identities, &[], options)
        .first()
        .is_some_and(|top| top.identity_id == identity_id && top.is_match())
}

/// Derive patterns so each project's assigned identity ranks first.
///
/// Projects are processed in order and accepted patterns are visible to
/// later projects. A candidate is accepted only when the assigned identity
/// then ranks first for its own project and no other project whose assigned
/// identity is already backed by a match drops in rank.
pub fn learn_from_history(
    projects: &[ProjectAssignment],
    identities: &[Identity],
    options: &EngineOptions,
) -> LearnReport {
    let mut working: Vec<Identity> = identities.to_vec();
    let mut report = LearnReport::default();

    for (i, project) in projects.iter().enumerate() {
        let Some(owner_idx) = working.iter().position(|id| id.id == project.identity_id) else {
            report.skipped.push(SkippedProject {
                project: project.context.label(),
                identity_id: project.identity_id.clone(),
            });
            continue;
        };

        if ranks_first_by_match(&project.context, &working, &project.identity_id, options) {
            continue;
        }

        let baseline: Vec<Option<usize>> = projects
            .iter()
            .map(|other| matched_rank(&other.context, &working, &other.identity_id, options))
            .collect();

        for candidate in candidates(&project.context) {
            if working[owner_idx].find_pattern(&candidate).is_some() {
                continue;
            }

            let mut trial = working.clone();
            trial[owner_idx].patterns.push(candidate.clone());

            if !ranks_first_by_match(&project.context, &trial, &project.identity_id, options) {
                continue;
            }

            let demoted: Vec<String> = projects
                .iter()
                .enumerate()
                .filter(|(j, other)| {
                    let Some(before) = baseline[*j].filter(|_| *j != i) else {
                        return false;
                    };
                    matched_rank(&other.context, &trial, &other.identity_id, options)
                        .map_or(true, |after| after > before)
                })
                .map(|(_, other)| other.context.label())
                .collect();

            if demoted.is_empty() {
                tracing::debug!(
                    identity = %project.identity_id,
                    pattern = %candidate.text,
                    "accepted learned pattern"
                );
                working = trial;
                report.learned.push(LearnedPattern {
                    identity_id: project.identity_id.clone(),
                    pattern: candidate,
                });
                break;
            }

            tracing::debug!(
                identity = %project.identity_id,
                pattern = %candidate.text,
                demoted = demoted.len(),
                "refused learned pattern"
            );
            report.conflicts.push(LearnConflict {
                identity_id: project.identity_id.clone(),
                pattern: candidate,
                project: project.context.label(),
                demoted,
            });
        }
    }

    report
}
