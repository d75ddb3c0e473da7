use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::HookAction;
use crate::config::{Enforcement, PatternStore};
use crate::git;
use crate::history::UsageEvent;
use crate::identity::Identity;
use crate::reason::Reason;
use crate::suggest::{suggest, top_match, EngineOptions, RepoContext};

/// Marks hooks written by gitswitch so foreign hooks are left alone
pub const HOOK_MARKER: &str = "# managed by gitswitch";

const HOOK_NAME: &str = "pre-commit";

/// Result of comparing the configured email against the top suggestion
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// No identity matched the repository, nothing to enforce
    NoOpinion,
    Match {
        identity_id: String,
    },
    Mismatch {
        expected_id: String,
        expected_email: String,
        actual: Option<String>,
        reason: Reason,
    },
}

/// What the hook should do with a verdict
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    Allow,
    Warn(String),
    Block(String),
}

pub fn evaluate(
    context: &RepoContext,
    identities: &[Identity],
    history: &[UsageEvent],
    options: &EngineOptions,
) -> Verdict {
    let suggestions = suggest(context, identities, history, options);
    let Some(top) = top_match(&suggestions) else {
        return Verdict::NoOpinion;
    };
    let Some(expected) = identities.iter().find(|i| i.id == top.identity_id) else {
        return Verdict::NoOpinion;
    };

    match context.current_email.as_deref() {
        Some(actual) if expected.has_email(actual) => Verdict::Match {
            identity_id: expected.id.clone(),
        },
        actual => Verdict::Mismatch {
            expected_id: expected.id.clone(),
            expected_email: expected.email.clone(),
            actual: actual.map(str::to_string),
            reason: top.reason.clone(),
        },
    }
}

pub fn outcome(verdict: &Verdict, enforcement: Enforcement) -> HookOutcome {
    let Verdict::Mismatch {
        expected_id,
        expected_email,
        actual,
        reason,
    } = verdict
    else {
        return HookOutcome::Allow;
    };

    let message = format!(
        "committing as {} but this repository belongs to '{}' <{}> ({}). Run 'gitswitch project switch {}' to fix.",
        actual.as_deref().unwrap_or("<no user.email>"),
        expected_id,
        expected_email,
        reason,
        expected_id
    );

    match enforcement {
        Enforcement::Off => HookOutcome::Allow,
        Enforcement::Warning => HookOutcome::Warn(message),
        Enforcement::Strict => HookOutcome::Block(message),
    }
}

pub fn hook_script() -> String {
    format!(
        "#!/bin/sh\n{}\n# Checks that the configured git identity matches this repository.\nexec gitswitch hook check\n",
        HOOK_MARKER
    )
}

fn is_managed(path: &Path) -> bool {
    fs::read_to_string(path)
        .map(|contents| contents.contains(HOOK_MARKER))
        .unwrap_or(false)
}

/// Write the pre-commit hook into `hooks_dir`; returns the hook path
pub fn install_into(hooks_dir: &Path) -> Result<PathBuf> {
    let path = hooks_dir.join(HOOK_NAME);

    if path.exists() && !is_managed(&path) {
        anyhow::bail!(
            "A {} hook already exists at {} and was not written by gitswitch. Add 'gitswitch hook check' to it manually.",
            HOOK_NAME,
            path.display()
        );
    }

    fs::create_dir_all(hooks_dir)?;
    fs::write(&path, hook_script()).with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms)?;
    }

    Ok(path)
}

/// Remove the hook if gitswitch wrote it; returns whether anything was removed
pub fn uninstall_from(hooks_dir: &Path) -> Result<bool> {
    let path = hooks_dir.join(HOOK_NAME);
    if !path.exists() {
        return Ok(false);
    }
    if !is_managed(&path) {
        anyhow::bail!("{} was not written by gitswitch; leaving it in place", path.display());
    }
    fs::remove_file(&path)?;
    Ok(true)
}

pub fn is_installed(hooks_dir: &Path) -> bool {
    is_managed(&hooks_dir.join(HOOK_NAME))
}

/// Handle the 'gitswitch hook' commands
pub fn handle_hook_command(action: HookAction) -> Result<()> {
    match action {
        HookAction::Install => {
            if !git::is_inside_git_repo() {
                println!("\x1b[1;31m✗ Not inside a git repository.\x1b[0m");
                return Ok(());
            }
            let path = install_into(&git::hooks_dir(None)?)?;
            println!("\x1b[1;32m✓ Installed commit hook at {}\x1b[0m", path.display());
        }
        HookAction::Uninstall => {
            if !git::is_inside_git_repo() {
                println!("\x1b[1;31m✗ Not inside a git repository.\x1b[0m");
                return Ok(());
            }
            if uninstall_from(&git::hooks_dir(None)?)? {
                println!("\x1b[1;32m✓ Commit hook removed.\x1b[0m");
            } else {
                println!("\x1b[1;33m⚠ No gitswitch hook installed.\x1b[0m");
            }
        }
        HookAction::Check => return handle_check(),
    }
    Ok(())
}

/// Outcome of the commit check for `context`. A store that cannot be read
/// is reported as a warning and never blocks the commit.
pub fn check_with_store(store: &PatternStore, context: &RepoContext) -> HookOutcome {
    let config = match store.load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("identity check skipped: {:#}", e);
            return HookOutcome::Warn(format!("identity check skipped: {:#}", e));
        }
    };
    let history = store
        .recent_history(config.settings.history_limit)
        .unwrap_or_else(|e| {
            tracing::warn!("ignoring usage history: {:#}", e);
            Vec::new()
        });

    let verdict = evaluate(
        context,
        &config.accounts,
        &history,
        &config.settings.engine_options(),
    );
    tracing::debug!(?verdict, "commit identity check");

    outcome(&verdict, config.settings.enforcement)
}

/// Runs at commit time: compare and enforce
fn handle_check() -> Result<()> {
    let store = PatternStore::open()?;
    let context = git::current_context(None)?;

    match check_with_store(&store, &context) {
        HookOutcome::Allow => Ok(()),
        HookOutcome::Warn(message) => {
            eprintln!("\x1b[1;33m⚠ gitswitch: {}\x1b[0m", message);
            Ok(())
        }
        HookOutcome::Block(message) => {
            eprintln!("\x1b[1;31m✗ gitswitch: {}\x1b[0m", message);
            eprintln!("   Commit blocked (enforcement: strict). Use 'git commit --no-verify' to bypass.");
            std::process::exit(1);
        }
    }
}
