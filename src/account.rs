use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};

use crate::cli::AccountAction;
use crate::config::{Config, PatternStore};
use crate::identity::{is_valid_email, Identity, MAX_PRIORITY};

/// Interactive account selection
pub fn select_identity<'a>(config: &'a Config, prompt: &str) -> Result<Option<&'a Identity>> {
    if config.accounts.is_empty() {
        println!("\x1b[1;33m⚠ No accounts configured. Run 'gitswitch account add' to create one.\x1b[0m");
        return Ok(None);
    }

    let selections: Vec<String> = config.accounts.iter().map(Identity::label).collect();
    let default_idx = config.accounts.iter().position(|a| a.is_default).unwrap_or(0);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default_idx)
        .items(&selections)
        .interact()?;

    Ok(config.accounts.get(selection))
}

fn prompt_text(prompt: &str, initial: Option<String>) -> Result<String> {
    let theme = ColorfulTheme::default();
    let mut input = Input::<String>::with_theme(&theme).with_prompt(prompt);
    if let Some(initial) = initial {
        input = input.default(initial);
    }
    Ok(input.interact_text()?)
}

fn prompt_email(initial: Option<String>) -> Result<String> {
    let theme = ColorfulTheme::default();
    let mut input = Input::<String>::with_theme(&theme)
        .with_prompt("Git User Email")
        .validate_with(|input: &String| {
            if is_valid_email(input) {
                Ok(())
            } else {
                Err("Please enter a valid email address")
            }
        });
    if let Some(initial) = initial {
        input = input.default(initial);
    }
    Ok(input.interact_text()?)
}

fn resolve_id(config: &Config, id: Option<String>, prompt: &str) -> Result<Option<String>> {
    match id {
        Some(id) => {
            if config.find(&id).is_none() {
                anyhow::bail!("Account '{}' not found", id);
            }
            Ok(Some(id))
        }
        None => Ok(select_identity(config, prompt)?.map(|a| a.id.clone())),
    }
}

/// Handle account-related commands
pub fn handle_account_command(action: AccountAction) -> Result<()> {
    let store = PatternStore::open()?;
    let mut config = store.load()?;

    match action {
        AccountAction::List => {
            if config.accounts.is_empty() {
                println!("\x1b[1;33m📋 No accounts configured.\x1b[0m");
                println!("   Run '\x1b[1mgitswitch account add\x1b[0m' to create your first account.");
            } else {
                println!("\x1b[1;36m📋 Configured accounts:\x1b[0m\n");
                for (i, account) in config.accounts.iter().enumerate() {
                    let marker = if account.is_default { " \x1b[1;33m(default)\x1b[0m" } else { "" };
                    println!(
                        "  \x1b[1;32m{}\x1b[0m. \x1b[1m{}\x1b[0m{} {}",
                        i + 1,
                        account.id,
                        marker,
                        account.name
                    );
                    println!("     👤 {} <{}>", account.git_name, account.email);
                    let last_used = account
                        .last_used
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "     📈 used {} time(s), last {} · {} pattern(s) · priority {}\n",
                        account.usage_count,
                        last_used,
                        account.patterns.len(),
                        account.priority
                    );
                }
            }
        }
        AccountAction::Add {
            id,
            name,
            git_name,
            email,
            priority,
            default,
        } => {
            let interactive = id.is_none() || git_name.is_none() || email.is_none();
            if interactive {
                println!("\x1b[1;36m➕ Add New Account\x1b[0m\n");
            }

            let id = match id {
                Some(id) => id,
                None => prompt_text("Account Id (e.g. work, personal)", None)?,
            };

            // Check for duplicate ids
            if config.find(id.trim()).is_some() {
                anyhow::bail!("An account with id '{}' already exists", id.trim());
            }

            let git_name = match git_name {
                Some(git_name) => git_name,
                None => prompt_text("Git User Name", None)?,
            };
            let email = match email {
                Some(email) => email,
                None => prompt_email(None)?,
            };
            let name = name.unwrap_or_else(|| id.clone());

            let mut account = Identity::new(&id, &name, &git_name, &email);
            account.priority = priority;

            // Validate before saving
            account.validate()?;

            if config.find_by_email(&account.email).is_some() {
                println!(
                    "\x1b[1;33m⚠ Another account already uses {}; suggestions will not tell them apart by email.\x1b[0m",
                    account.email
                );
            }

            let account_id = account.id.clone();
            let make_default = default || config.accounts.is_empty();
            config.accounts.push(account);
            if make_default {
                config.set_default(Some(&account_id));
            }
            store.save(&config)?;
            tracing::info!(account = %account_id, "account added");
            println!("\n\x1b[1;32m✓ Account '{}' added successfully!\x1b[0m", account_id);
        }
        AccountAction::Delete { id, yes } => {
            let Some(account_id) = resolve_id(&config, id, "🗑️  Select account to DELETE")? else {
                return Ok(());
            };

            let confirmed = yes
                || Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(format!(
                        "Delete '{}' and its learned patterns? This cannot be undone.",
                        account_id
                    ))
                    .default(false)
                    .interact()?;

            if confirmed {
                config.accounts.retain(|a| a.id != account_id);
                store.save(&config)?;
                tracing::info!(account = %account_id, "account deleted");
                println!("\x1b[1;32m✓ Account deleted.\x1b[0m");
            } else {
                println!("Deletion cancelled.");
            }
        }
        AccountAction::Edit { id } => {
            let Some(account_id) = resolve_id(&config, id, "✏️  Select account to EDIT")? else {
                return Ok(());
            };
            let Some(account) = config.find_mut(&account_id) else {
                anyhow::bail!("Account '{}' not found", account_id);
            };

            println!("\x1b[1;36m✏️  Editing account: {}\x1b[0m\n", account.id);

            account.name = prompt_text("Display Name", Some(account.name.clone()))?;
            account.git_name = prompt_text("Git User Name", Some(account.git_name.clone()))?;
            account.email = prompt_email(Some(account.email.clone()))?;
            let priority = prompt_text(
                &format!("Priority (0-{})", MAX_PRIORITY),
                Some(account.priority.to_string()),
            )?;
            account.priority = priority
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Priority must be a number between 0 and {}", MAX_PRIORITY))?;

            // Validate before saving
            account.validate()?;

            store.save(&config)?;
            println!("\n\x1b[1;32m✓ Account updated.\x1b[0m");
        }
        AccountAction::Default { id } => {
            let Some(account_id) = resolve_id(&config, id, "🌍 Select default account")? else {
                return Ok(());
            };
            config.set_default(Some(&account_id));
            store.save(&config)?;
            println!("\x1b[1;32m✓ Default account set to: {}\x1b[0m", account_id);
        }
    }
    Ok(())
}
