use clap::{Parser, Subcommand};

use crate::config::Enforcement;

/// CLI structure and command definitions for gitswitch
#[derive(Parser, Debug)]
#[command(name = "gitswitch")]
#[command(version)]
#[command(about = "🔀 Pick the right Git identity for every repository")]
#[command(long_about = r#"
gitswitch - Git Identity Manager

Keep several Git identities (work, personal, open source) and let gitswitch
suggest the right one for each repository from its remote URL and path.
Patterns are learned as you switch, and a commit hook can warn or block when
the configured email does not match.

EXAMPLES:
    gitswitch account add              Add a new account
    gitswitch project suggest          Rank accounts for the current repo
    gitswitch project switch           Apply the best account to the current repo
    gitswitch pattern learn --scan ~   Learn patterns from existing repos
    gitswitch hook install             Check identity on every commit
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage accounts (list, add, edit, delete, default)
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Suggest or switch the account for a repository
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Inspect the current repository context
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },
    /// Manage and learn account patterns
    Pattern {
        #[command(subcommand)]
        action: PatternAction,
    },
    /// Clone a repository and configure the suggested account
    Clone {
        /// Repository URL
        url: String,
        /// Target directory
        dir: Option<String>,
    },
    /// Install, remove or run the commit hook
    Hook {
        #[command(subcommand)]
        action: HookAction,
    },
    /// Show or change settings
    Config {
        /// What the commit hook does on mismatch
        #[arg(long, value_enum)]
        enforcement: Option<Enforcement>,
        /// Days after which recent usage stops boosting suggestions
        #[arg(long)]
        recency_days: Option<u32>,
        /// Learn new patterns when switching
        #[arg(long)]
        auto_learn: Option<bool>,
    },
    /// Show current account status
    Status,
    /// Show version information
    Version,
    /// Run diagnostics to check gitswitch setup
    Doctor,
}

#[derive(Subcommand, Debug)]
pub enum AccountAction {
    /// List all configured accounts
    List,
    /// Add a new account (prompts for missing fields)
    Add {
        /// Unique account id (e.g. work, personal)
        #[arg(long)]
        id: Option<String>,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Git user.name
        #[arg(long)]
        git_name: Option<String>,
        /// Git user.email
        #[arg(long)]
        email: Option<String>,
        /// Priority weight 0-10
        #[arg(long, default_value_t = 0)]
        priority: u8,
        /// Make this the default account
        #[arg(long)]
        default: bool,
    },
    /// Edit an existing account
    Edit {
        /// Id of the account to edit
        id: Option<String>,
    },
    /// Delete an account
    Delete {
        /// Id of the account to delete
        id: Option<String>,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Set the default account
    Default {
        /// Id of the account to make default
        id: Option<String>,
    },
}

/// Context overrides shared by commands that suggest
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ContextArgs {
    /// Remote URL to use instead of the repository's origin
    #[arg(long)]
    pub url: Option<String>,
    /// Path to use instead of the repository root
    #[arg(long)]
    pub path: Option<String>,
}

impl ContextArgs {
    pub fn is_overridden(&self) -> bool {
        self.url.is_some() || self.path.is_some()
    }
}

#[derive(Subcommand, Debug)]
pub enum ProjectAction {
    /// Rank accounts for the repository
    Suggest {
        #[command(flatten)]
        context: ContextArgs,
        /// Print suggestions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply an account to the repository and record the choice
    Switch {
        /// Account id (defaults to the top suggestion)
        id: Option<String>,
        #[command(flatten)]
        context: ContextArgs,
        /// Write to the global git config instead of the repository
        #[arg(short, long)]
        global: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ContextAction {
    /// Show configured vs suggested account for the repository
    Detect,
}

#[derive(Subcommand, Debug)]
pub enum PatternAction {
    /// List patterns, for one account or all
    List {
        /// Account id
        id: Option<String>,
    },
    /// Add a pattern to an account
    Add {
        /// Account id
        id: String,
        /// Pattern text (URL fragment, domain or path)
        text: String,
        /// url-substring, url-domain, path-substring or path-prefix
        #[arg(long)]
        kind: Option<String>,
    },
    /// Remove a pattern from an account
    Remove {
        /// Account id
        id: String,
        /// Pattern text
        text: String,
    },
    /// Show which pattern would be learned for the repository
    Suggest {
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Learn patterns from repositories that already have an identity configured
    Learn {
        /// Directory to scan for repositories (defaults to current directory)
        #[arg(long)]
        scan: Option<String>,
        /// Maximum directory depth to scan
        #[arg(long, default_value_t = 4)]
        depth: usize,
        /// Report without saving
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum HookAction {
    /// Install the pre-commit hook in the current repository
    Install,
    /// Remove the pre-commit hook from the current repository
    Uninstall,
    /// Check the configured identity (run by the hook)
    Check,
}
