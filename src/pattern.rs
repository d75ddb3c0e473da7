use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::cli::PatternAction;
use crate::config::{expand_tilde, Config, PatternStore};
use crate::git;
use crate::identity::{Identity, Pattern, PatternKind, PatternSource};
use crate::learn::{derive_pattern, learn_from_history, ContextKey, LearnReport, ProjectAssignment};
use crate::project::resolve_context;
use crate::suggest::RepoContext;

fn print_patterns(account: &Identity) {
    println!("  \x1b[1m{}\x1b[0m <{}>", account.id, account.email);
    if account.patterns.is_empty() {
        println!("     \x1b[2m(no patterns)\x1b[0m\n");
        return;
    }
    for pattern in &account.patterns {
        let source = match pattern.source {
            PatternSource::Manual => "",
            PatternSource::Learned => " \x1b[2m(learned)\x1b[0m",
        };
        println!(
            "     • {:<40} {:<15} used {}{}",
            pattern.text,
            pattern.kind.label(),
            pattern.usage_count,
            source
        );
        if let Some(example) = pattern.examples.last() {
            println!("       e.g. {}", example);
        }
    }
    println!();
}

/// Build a pattern from user input, expanding `~` for path kinds
pub fn parse_pattern(text: &str, kind: Option<&str>) -> Result<Pattern> {
    let kind = match kind {
        Some(raw) => Some(PatternKind::parse(raw).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown pattern kind '{}'. Use url-substring, url-domain, path-substring or path-prefix",
                raw
            )
        })?),
        None => None,
    };
    let kind = kind.unwrap_or_else(|| PatternKind::infer(text));
    let text = if kind.is_url() { text.to_string() } else { expand_tilde(text) };

    let pattern = Pattern::manual(&text, Some(kind));
    if pattern.text.is_empty() {
        anyhow::bail!("Pattern text cannot be empty");
    }
    Ok(pattern)
}

/// Absolute directory to scan; learned path patterns must match the
/// absolute paths git reports later
pub fn scan_root(scan: Option<&str>) -> Result<PathBuf> {
    let root = match scan {
        Some(dir) => PathBuf::from(expand_tilde(dir)),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    root.canonicalize()
        .with_context(|| format!("Failed to resolve {}", root.display()))
}

/// Gather (context, assigned account) pairs from repositories under `root`.
/// Only a repository's local `user.email` counts as an assignment.
fn collect_assignments(root: &Path, depth: usize, config: &Config) -> (Vec<ProjectAssignment>, Vec<String>) {
    let mut projects = Vec::new();
    let mut unassigned = Vec::new();

    for repo in git::find_repositories(root, depth) {
        let path = repo.to_string_lossy().to_string();
        let Some(email) = git::local_config_get(&repo, "user.email") else {
            unassigned.push(path);
            continue;
        };
        let Some(account) = config.find_by_email(&email) else {
            unassigned.push(format!("{} ({})", path, email));
            continue;
        };
        projects.push(ProjectAssignment {
            context: RepoContext::new(git::remote_url(Some(&repo)), &path),
            identity_id: account.id.clone(),
        });
    }

    (projects, unassigned)
}

fn print_report(report: &LearnReport) {
    if report.learned.is_empty() {
        println!("   No new patterns needed.");
    }
    for learned in &report.learned {
        println!(
            "   \x1b[1;32m+\x1b[0m {:<12} {} ({})",
            learned.identity_id,
            learned.pattern.text,
            learned.pattern.kind.label()
        );
    }

    if !report.conflicts.is_empty() {
        println!("\n\x1b[1;33m⚠ Conflicts for manual review:\x1b[0m");
        for conflict in &report.conflicts {
            println!(
                "   {} → {} would demote: {}",
                conflict.pattern.text,
                conflict.identity_id,
                conflict.demoted.join(", ")
            );
        }
    }

    for skipped in &report.skipped {
        println!("   \x1b[2mskipped {} (unknown account {})\x1b[0m", skipped.project, skipped.identity_id);
    }
}

/// Handle the 'gitswitch pattern' commands
pub fn handle_pattern_command(action: PatternAction) -> Result<()> {
    let store = PatternStore::open()?;
    let mut config = store.load()?;

    match action {
        PatternAction::List { id } => {
            println!("\x1b[1;36m🧩 Patterns\x1b[0m\n");
            match id {
                Some(id) => {
                    let account = config
                        .find(&id)
                        .ok_or_else(|| anyhow::anyhow!("Account '{}' not found", id))?;
                    print_patterns(account);
                }
                None if config.accounts.is_empty() => {
                    println!("   \x1b[1;33m⚠ No accounts configured.\x1b[0m\n");
                }
                None => config.accounts.iter().for_each(print_patterns),
            }
        }
        PatternAction::Add { id, text, kind } => {
            let pattern = parse_pattern(&text, kind.as_deref())?;
            let account = config
                .find_mut(&id)
                .ok_or_else(|| anyhow::anyhow!("Account '{}' not found", id))?;

            if account.find_pattern(&pattern).is_some() {
                println!("\x1b[1;33m⚠ '{}' already has pattern '{}'.\x1b[0m", id, pattern.text);
                return Ok(());
            }

            let label = format!("{} ({})", pattern.text, pattern.kind.label());
            account.patterns.push(pattern);
            store.save(&config)?;
            println!("\x1b[1;32m✓ Added pattern {} to '{}'.\x1b[0m", label, id);
        }
        PatternAction::Remove { id, text } => {
            let account = config
                .find_mut(&id)
                .ok_or_else(|| anyhow::anyhow!("Account '{}' not found", id))?;

            let before = account.patterns.len();
            let needle = text.trim();
            account.patterns.retain(|p| {
                p.text != needle && p.text != Pattern::new(needle, p.kind, p.source).text
            });

            if account.patterns.len() == before {
                anyhow::bail!("Account '{}' has no pattern '{}'", id, needle);
            }
            store.save(&config)?;
            println!("\x1b[1;32m✓ Removed pattern '{}' from '{}'.\x1b[0m", needle, id);
        }
        PatternAction::Suggest { context } => {
            let context = resolve_context(&context)?;
            println!("\x1b[1;36m💡 Pattern suggestions\x1b[0m\n");

            let mut keys = Vec::new();
            if let Some(url) = context.remote_url.as_deref().filter(|u| !u.trim().is_empty()) {
                keys.push(ContextKey::Url(url.to_string()));
            }
            if !context.path.trim().is_empty() {
                keys.push(ContextKey::Path(context.path.clone()));
            }

            let candidates: Vec<Pattern> = keys.iter().filter_map(derive_pattern).collect();
            if candidates.is_empty() {
                println!("   Nothing specific enough to learn from this context.");
            }
            for candidate in &candidates {
                let owners: Vec<&str> = config
                    .accounts
                    .iter()
                    .filter(|a| a.find_pattern(candidate).is_some())
                    .map(|a| a.id.as_str())
                    .collect();
                let note = if owners.is_empty() {
                    "new".to_string()
                } else {
                    format!("already on {}", owners.join(", "))
                };
                println!("   • {:<40} {:<15} {}", candidate.text, candidate.kind.label(), note);
            }
            println!("\n   Add one with 'gitswitch pattern add <account> <text>'.");
            println!();
        }
        PatternAction::Learn { scan, depth, dry_run } => {
            let root = scan_root(scan.as_deref())?;
            if config.accounts.is_empty() {
                println!("\x1b[1;33m⚠ No accounts configured. Run 'gitswitch account add' first.\x1b[0m");
                return Ok(());
            }

            println!("\x1b[1;36m📚 Learning from repositories under {}\x1b[0m\n", root.display());
            let (projects, unassigned) = collect_assignments(&root, depth, &config);
            println!(
                "   Found {} repositor{} with a known account, {} without.\n",
                projects.len(),
                if projects.len() == 1 { "y" } else { "ies" },
                unassigned.len()
            );

            let report = learn_from_history(&projects, &config.accounts, &config.settings.engine_options());
            print_report(&report);

            if dry_run {
                println!("\n   Dry run: nothing saved.");
            } else if !report.learned.is_empty() {
                report.apply(&mut config.accounts);
                store.save(&config)?;
                tracing::info!(learned = report.learned.len(), conflicts = report.conflicts.len(), "pattern learn finished");
                println!("\n\x1b[1;32m✓ Saved {} pattern(s).\x1b[0m", report.learned.len());
            }
            println!();
        }
    }
    Ok(())
}
