use anyhow::Result;

use crate::config::{get_gitswitch_home_dir, PatternStore, STORE_VERSION};
use crate::git;
use crate::hook;

/// Current version of gitswitch (from Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Oldest git that supports `rev-parse --git-path` with `core.hooksPath`
pub const MIN_GIT_VERSION: semver::Version = semver::Version::new(2, 9, 0);

/// Show version information
pub fn show_version() {
    println!("\x1b[1;36m🔀 gitswitch\x1b[0m - Git Identity Manager");
    println!("   Version: \x1b[1;32m{}\x1b[0m", VERSION);
    println!("   Store format: {}", STORE_VERSION);
    println!();
}

/// Run diagnostics
pub fn handle_doctor() -> Result<()> {
    println!("\x1b[1;36m🩺 gitswitch Doctor - System Diagnostics\x1b[0m\n");

    let mut all_ok = true;

    // Check git installation
    print!("   Checking git... ");
    match git::git_version_string() {
        Some(raw) => match git::parse_git_version(&raw) {
            Some(version) if version >= MIN_GIT_VERSION => {
                println!("\x1b[1;32m✓\x1b[0m {}", raw);
            }
            Some(version) => {
                println!(
                    "\x1b[1;33m⚠\x1b[0m {} (hooks need git {} or newer)",
                    version, MIN_GIT_VERSION
                );
                all_ok = false;
            }
            None => println!("\x1b[1;33m⚠\x1b[0m could not parse '{}'", raw),
        },
        None => {
            println!("\x1b[1;31m✗ Git not found!\x1b[0m");
            all_ok = false;
        }
    }

    // Check state directory
    print!("   Checking state directory... ");
    match get_gitswitch_home_dir() {
        Ok(path) => {
            if path.exists() {
                println!("\x1b[1;32m✓\x1b[0m {}", path.display());
            } else {
                println!("\x1b[1;33m⚠\x1b[0m Not created yet (will be created on first use)");
            }
        }
        Err(_) => {
            println!("\x1b[1;31m✗ Could not determine state path\x1b[0m");
            all_ok = false;
        }
    }

    let store = PatternStore::open()?;

    // Check config file
    print!("   Checking config file... ");
    let path = store.config_path();
    if path.exists() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = std::fs::metadata(&path) {
                let mode = meta.permissions().mode() & 0o777;
                if mode <= 0o600 {
                    println!("\x1b[1;32m✓\x1b[0m {} (permissions: {:o})", path.display(), mode);
                } else {
                    println!(
                        "\x1b[1;33m⚠\x1b[0m {} (permissions {:o} - consider chmod 600)",
                        path.display(),
                        mode
                    );
                }
            }
        }
        #[cfg(not(unix))]
        println!("\x1b[1;32m✓\x1b[0m {}", path.display());
    } else {
        println!("\x1b[1;33m⚠\x1b[0m Not created yet");
    }

    // Check accounts
    print!("   Checking accounts... ");
    match store.load() {
        Ok(config) => {
            if config.accounts.is_empty() {
                println!("\x1b[1;33m⚠\x1b[0m No accounts configured");
            } else {
                let patterns: usize = config.accounts.iter().map(|a| a.patterns.len()).sum();
                println!(
                    "\x1b[1;32m✓\x1b[0m {} account(s), {} pattern(s)",
                    config.accounts.len(),
                    patterns
                );

                for account in &config.accounts {
                    if account.patterns.is_empty() {
                        println!(
                            "      \x1b[1;33m⚠ Account '{}' has no patterns; it will only be suggested by hand\x1b[0m",
                            account.id
                        );
                    }
                    if let Err(e) = account.validate() {
                        println!("      \x1b[1;31m✗ Account '{}': {}\x1b[0m", account.id, e);
                        all_ok = false;
                    }
                }

                if config.accounts.iter().filter(|a| a.is_default).count() > 1 {
                    println!("      \x1b[1;33m⚠ More than one default account\x1b[0m");
                    all_ok = false;
                }
            }
        }
        Err(e) => {
            println!("\x1b[1;31m✗ Error loading config: {}\x1b[0m", e);
            all_ok = false;
        }
    }

    // Check current repo
    print!("   Checking current directory... ");
    if git::is_inside_git_repo() {
        let hook_state = match git::hooks_dir(None) {
            Ok(dir) if hook::is_installed(&dir) => "commit hook installed",
            _ => "no commit hook",
        };
        println!("\x1b[1;32m✓\x1b[0m Inside a git repository ({})", hook_state);
    } else {
        println!("\x1b[1;33m⚠\x1b[0m Not inside a git repository");
    }

    println!();
    if all_ok {
        println!("\x1b[1;32m✓ All checks passed!\x1b[0m");
    } else {
        println!("\x1b[1;33m⚠ Some issues were found. Please review the output above.\x1b[0m");
    }

    Ok(())
}
