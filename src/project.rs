use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::Path;

use crate::account::select_identity;
use crate::cli::{ContextAction, ContextArgs, ProjectAction};
use crate::config::{expand_tilde, Config, PatternStore};
use crate::git;
use crate::history::UsageEvent;
use crate::hook::{self, Verdict};
use crate::identity::{Identity, Pattern};
use crate::learn::record_usage;
use crate::suggest::{suggest, top_match, EngineOptions, RepoContext, Suggestion};

/// Build the suggestion context from the current repository plus overrides
pub fn resolve_context(args: &ContextArgs) -> Result<RepoContext> {
    let mut context = if git::is_inside_git_repo() {
        git::current_context(None)?
    } else {
        RepoContext::default()
    };

    if let Some(url) = &args.url {
        context.remote_url = Some(url.clone());
    }
    if let Some(path) = &args.path {
        context.path = expand_tilde(path);
    }

    Ok(context)
}

/// Count a switch: update counters, maybe learn a pattern, append history
pub fn record_switch(
    store: &PatternStore,
    identity: &Identity,
    context: &RepoContext,
    options: &EngineOptions,
    history_limit: usize,
) -> Result<Option<Pattern>> {
    let key = context
        .remote_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| context.path.clone());

    let update = record_usage(identity, &key, options);
    store.commit_usage(&update)?;
    store.append_history(&UsageEvent::new(&identity.id, context, options.now), history_limit)?;

    if let Some(pattern) = &update.learned {
        tracing::info!(account = %identity.id, pattern = %pattern.text, "learned pattern");
    }
    Ok(update.learned)
}

fn confidence_color(confidence: f64, matched: bool) -> &'static str {
    if !matched {
        "\x1b[2m"
    } else if confidence >= 0.6 {
        "\x1b[1;32m"
    } else if confidence >= 0.4 {
        "\x1b[1;33m"
    } else {
        "\x1b[1;31m"
    }
}

/// Print ranked suggestions with percentages and reasons
pub fn print_suggestions(suggestions: &[Suggestion], config: &Config) {
    for (i, suggestion) in suggestions.iter().enumerate() {
        let color = confidence_color(suggestion.confidence, suggestion.is_match());
        let who = config
            .find(&suggestion.identity_id)
            .map(|a| format!("{} <{}>", a.git_name, a.email))
            .unwrap_or_default();
        println!(
            "  {}{:>3.0}%\x1b[0m  \x1b[1m{}\x1b[0m {}",
            color,
            suggestion.confidence * 100.0,
            suggestion.identity_id,
            who
        );
        println!("        {}", suggestion.reason);
        if i == 0 && suggestion.matched.len() > 1 {
            let others: Vec<&str> = suggestion.matched[1..].iter().map(|m| m.text.as_str()).collect();
            println!("        also matched: {}", others.join(", "));
        }
    }
}

fn print_context(context: &RepoContext) {
    if !context.path.is_empty() {
        println!("   📁 Path: {}", context.path);
    }
    match context.remote_url.as_deref() {
        Some(url) => println!("   🌐 Remote: {}", url),
        None => println!("   🌐 Remote: \x1b[2m(none)\x1b[0m"),
    }
}

/// Handle the 'gitswitch project' commands
pub fn handle_project_command(action: ProjectAction) -> Result<()> {
    let store = PatternStore::open()?;
    let config = store.load()?;
    let history = store.recent_history(config.settings.history_limit)?;
    let options = config.settings.engine_options();

    match action {
        ProjectAction::Suggest { context, json } => {
            let overridden = context.is_overridden();
            let context = resolve_context(&context)?;
            let suggestions = suggest(&context, &config.accounts, &history, &options);

            if json {
                let out = serde_json::json!({ "context": context, "suggestions": suggestions });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            if !overridden && !git::is_inside_git_repo() {
                println!("\x1b[1;33m⚠ Not inside a git repository; use --url/--path to describe one.\x1b[0m\n");
            }

            println!("\x1b[1;36m🔎 Suggested accounts\x1b[0m\n");
            print_context(&context);
            println!();

            if suggestions.is_empty() {
                println!("   \x1b[1;33m⚠ No accounts configured. Run 'gitswitch account add' first.\x1b[0m");
            } else {
                print_suggestions(&suggestions, &config);
                if top_match(&suggestions).is_none() {
                    println!("\n   \x1b[1;33m⚠ No pattern matched this repository.\x1b[0m");
                }
            }
            println!();
        }
        ProjectAction::Switch { id, context, global } => {
            if !global && !git::is_inside_git_repo() {
                println!("\x1b[1;31m✗ Not inside a git repository. Use --global to set the global identity.\x1b[0m");
                return Ok(());
            }
            if config.accounts.is_empty() {
                println!("\x1b[1;33m⚠ No accounts configured. Run 'gitswitch account add' first.\x1b[0m");
                return Ok(());
            }

            let context = resolve_context(&context)?;
            let account = match id {
                Some(id) => config
                    .find(&id)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("Account '{}' not found", id))?,
                None => {
                    let suggestions = suggest(&context, &config.accounts, &history, &options);
                    match top_match(&suggestions).and_then(|top| config.find(&top.identity_id)) {
                        Some(account) => {
                            println!(
                                "\x1b[1;36m🔎 Best match:\x1b[0m {} ({:.0}%, {})",
                                account.id,
                                suggestions[0].confidence * 100.0,
                                suggestions[0].reason
                            );
                            account.clone()
                        }
                        None => {
                            println!("\x1b[1;33m⚠ No pattern matched this repository.\x1b[0m");
                            select_identity(&config, "🔀 Select Git Account")?
                                .cloned()
                                .ok_or_else(|| anyhow::anyhow!("No account selected"))?
                        }
                    }
                }
            };

            git::apply_identity(&account, None, global)?;
            let learned = record_switch(&store, &account, &context, &options, config.settings.history_limit)?;

            println!(
                "\n\x1b[1;32m✓ Switched to account: {} ({} <{}>)\x1b[0m",
                account.id, account.git_name, account.email
            );
            if let Some(pattern) = learned {
                println!(
                    "   📚 Learned pattern '{}' ({}) for {}",
                    pattern.text,
                    pattern.kind.label(),
                    account.id
                );
            }
        }
    }
    Ok(())
}

/// Handle the 'gitswitch context' commands
pub fn handle_context_command(action: ContextAction) -> Result<()> {
    match action {
        ContextAction::Detect => {
            if !git::is_inside_git_repo() {
                println!("\x1b[1;33m⚠ Not inside a git repository.\x1b[0m");
                return Ok(());
            }

            let store = PatternStore::open()?;
            let config = store.load()?;
            let history = store.recent_history(config.settings.history_limit)?;
            let options = config.settings.engine_options();
            let context = git::current_context(None)?;

            println!("\x1b[1;36m🧭 Repository Context\x1b[0m\n");
            print_context(&context);

            match context.current_email.as_deref() {
                Some(email) => match config.find_by_email(email) {
                    Some(account) => println!("   👤 Configured: {} <{}> (account {})", account.git_name, email, account.id),
                    None => println!("   👤 Configured: {} \x1b[2m(no matching account)\x1b[0m", email),
                },
                None => println!("   👤 Configured: \x1b[1;33mno user.email set\x1b[0m"),
            }
            println!();

            let suggestions = suggest(&context, &config.accounts, &history, &options);
            print_suggestions(&suggestions, &config);
            println!();

            match hook::evaluate(&context, &config.accounts, &history, &options) {
                Verdict::NoOpinion => {
                    println!("   \x1b[1;33m⚠ No pattern matched; add one with 'gitswitch pattern add'.\x1b[0m")
                }
                Verdict::Match { identity_id } => {
                    println!("   \x1b[1;32m✓ Configured identity matches '{}'.\x1b[0m", identity_id)
                }
                Verdict::Mismatch { expected_id, .. } => println!(
                    "   \x1b[1;31m✗ Configured identity differs from '{}'. Run 'gitswitch project switch {}'.\x1b[0m",
                    expected_id, expected_id
                ),
            }
            println!();
        }
    }
    Ok(())
}

/// Handle the 'gitswitch status' command
pub fn handle_status_command() -> Result<()> {
    if !git::is_inside_git_repo() {
        println!("\x1b[1;33m⚠ Not inside a git repository.\x1b[0m");
        return Ok(());
    }

    let store = PatternStore::open()?;
    let config = store.load()?;
    let context = git::current_context(None)?;

    println!("\x1b[1;36m📊 Repository Status\x1b[0m\n");
    print_context(&context);

    let name = git::config_get(None, "user.name");
    match (&context.current_email, config.find_by_email(context.current_email.as_deref().unwrap_or_default())) {
        (Some(_), Some(account)) => {
            println!("   👤 Account: \x1b[1;32m{}\x1b[0m", account.id);
            println!("   📧 Email: {}", account.email);
            println!("   🏷️  Name: {}", name.as_deref().unwrap_or(&account.git_name));
        }
        (Some(email), None) => {
            println!("   \x1b[1;33m⚠ No known account uses {}.\x1b[0m", email);
        }
        (None, _) => {
            println!("   \x1b[1;33m⚠ No user.email configured.\x1b[0m");
        }
    }

    let hook_state = match git::hooks_dir(None) {
        Ok(dir) if hook::is_installed(&dir) => "installed",
        Ok(_) => "not installed",
        Err(_) => "unknown",
    };
    println!("   🪝 Hook: {} (enforcement: {:?})", hook_state, config.settings.enforcement);
    println!("\n   Run '\x1b[1mgitswitch context detect\x1b[0m' for ranked suggestions.");
    println!();
    Ok(())
}

/// Handle 'gitswitch clone': suggest from the URL, clone, then configure
pub fn handle_clone_command(url: String, dir: Option<String>) -> Result<()> {
    let store = PatternStore::open()?;
    let config = store.load()?;
    let history = store.recent_history(config.settings.history_limit)?;
    let options = config.settings.engine_options();

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let target_name = dir.clone().unwrap_or_else(|| {
        url.trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git")
            .to_string()
    });
    let planned = RepoContext::new(Some(url.clone()), &cwd.join(&target_name).to_string_lossy());

    let suggestions = suggest(&planned, &config.accounts, &history, &options);
    let account = match top_match(&suggestions).and_then(|top| config.find(&top.identity_id)) {
        Some(account) => {
            let use_it = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!(
                    "Use '{}' <{}> for this repository? ({:.0}%, {})",
                    account.id,
                    account.email,
                    suggestions[0].confidence * 100.0,
                    suggestions[0].reason
                ))
                .default(true)
                .interact()?;
            if use_it {
                Some(account.clone())
            } else {
                select_identity(&config, "🔀 Select Git Account")?.cloned()
            }
        }
        None if config.accounts.is_empty() => None,
        None => {
            println!("\x1b[1;33m⚠ No pattern matched {}.\x1b[0m", url);
            select_identity(&config, "🔀 Select Git Account")?.cloned()
        }
    };

    println!("\x1b[1;36m⬇️  Cloning repository...\x1b[0m");
    let status = git::clone_repo(&url, dir.as_deref())?;
    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }

    let Some(account) = account else {
        println!("\x1b[1;33m⚠ No account applied to the new repository.\x1b[0m");
        return Ok(());
    };

    match git::detect_cloned_dir(&url, dir.as_deref()) {
        Some(cloned) => {
            println!("\x1b[1;36m⚙️  Configuring new repository...\x1b[0m");
            configure_clone(&store, &account, &url, &cloned, &options, config.settings.history_limit)?;
            println!(
                "\x1b[1;32m✓ Repository '{}' configured with account '{}'\x1b[0m",
                cloned.display(),
                account.id
            );
        }
        None => println!("\x1b[1;33m⚠ Could not find the cloned directory; run 'gitswitch project switch' inside it.\x1b[0m"),
    }

    Ok(())
}

fn configure_clone(
    store: &PatternStore,
    account: &Identity,
    url: &str,
    cloned: &Path,
    options: &EngineOptions,
    history_limit: usize,
) -> Result<()> {
    git::apply_identity(account, Some(cloned), false)?;
    let path = cloned.canonicalize().unwrap_or_else(|_| cloned.to_path_buf());
    let context = RepoContext::new(Some(url.to_string()), &path.to_string_lossy());
    record_switch(store, account, &context, options, history_limit)?;
    Ok(())
}
