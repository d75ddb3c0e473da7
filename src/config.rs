use anyhow::{Context, Result};
use clap::ValueEnum;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::history::{self, UsageEvent};
use crate::identity::Identity;
use crate::learn::UsageUpdate;
use crate::suggest::{EngineOptions, DEFAULT_RECENCY_DAYS};

/// Store format written by this build
pub const STORE_VERSION: &str = "1.0.0";

/// Overrides the state directory (`~/.gitswitch`)
pub const HOME_ENV: &str = "GITSWITCH_HOME";

const CONFIG_FILE: &str = "config.json";
const HISTORY_FILE: &str = "usage.jsonl";

/// What the commit hook does when the configured email disagrees with the
/// top suggestion
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    Strict,
    #[default]
    Warning,
    Off,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub enforcement: Enforcement,
    #[serde(default = "default_recency_days")]
    pub recency_days: u32,
    #[serde(default = "default_auto_learn")]
    pub auto_learn: bool,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_recency_days() -> u32 {
    DEFAULT_RECENCY_DAYS
}

fn default_auto_learn() -> bool {
    true
}

fn default_history_limit() -> usize {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enforcement: Enforcement::default(),
            recency_days: default_recency_days(),
            auto_learn: default_auto_learn(),
            history_limit: default_history_limit(),
        }
    }
}

impl Settings {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions::default()
            .with_recency_days(self.recency_days)
            .with_auto_learn(self.auto_learn)
    }
}

/// Everything persisted in `config.json`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub accounts: Vec<Identity>,
    #[serde(default)]
    pub settings: Settings,
}

fn default_version() -> String {
    STORE_VERSION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: default_version(),
            accounts: vec![],
            settings: Settings::default(),
        }
    }
}

impl Config {
    pub fn find(&self, id: &str) -> Option<&Identity> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Identity> {
        self.accounts.iter_mut().find(|a| a.id == id)
    }

    pub fn find_by_email(&self, email: &str) -> Option<&Identity> {
        self.accounts.iter().find(|a| a.has_email(email))
    }

    /// Make `id` the only default account; `None` clears the flag everywhere
    pub fn set_default(&mut self, id: Option<&str>) {
        for account in &mut self.accounts {
            account.is_default = Some(account.id.as_str()) == id;
        }
    }

    pub fn default_account(&self) -> Option<&Identity> {
        self.accounts.iter().find(|a| a.is_default)
    }
}

/// Get the gitswitch directory, honoring `GITSWITCH_HOME`
pub fn get_gitswitch_home_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".gitswitch"))
        .context("Could not determine home directory")
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed == "~" || trimmed.starts_with("~/") {
        if let Some(dirs) = BaseDirs::new() {
            return format!("{}{}", dirs.home_dir().display(), &trimmed[1..]);
        }
    }
    trimmed.to_string()
}

/// JSON-file backed identity and pattern store
#[derive(Debug, Clone)]
pub struct PatternStore {
    dir: PathBuf,
}

impl PatternStore {
    /// Store in the default location
    pub fn open() -> Result<Self> {
        Ok(PatternStore::at(get_gitswitch_home_dir()?))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        PatternStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Load the full snapshot; a missing file is an empty store
    pub fn load(&self) -> Result<Config> {
        let path = self.config_path();

        if !path.exists() {
            return Ok(Config::default());
        }

        let file = File::open(&path).context("Failed to open config file")?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .context("Failed to parse config file. It may be corrupted.")?;

        check_version(&config.version)?;
        Ok(config)
    }

    /// Replace the store file atomically with owner-only permissions
    pub fn save(&self, config: &Config) -> Result<()> {
        let path = self.config_path();
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let mut config = config.clone();
        config.version = STORE_VERSION.to_string();

        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp).context("Failed to write config file")?;
            serde_json::to_writer_pretty(file, &config)?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&tmp)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&tmp, perms)?;
        }

        fs::rename(&tmp, &path).context("Failed to replace config file")?;
        Ok(())
    }

    /// Persist a `record_usage` result against a fresh read of the store.
    ///
    /// Another process may have written in between; counters are merged so
    /// neither side's increments go backwards.
    pub fn commit_usage(&self, update: &UsageUpdate) -> Result<()> {
        let mut config = self.load()?;
        let Some(stored) = config.find_mut(&update.identity.id) else {
            anyhow::bail!("Account '{}' was removed", update.identity.id);
        };
        stored.merge_usage(&update.identity, update.learned.as_ref());
        self.save(&config)
    }

    /// Append to the usage log, trimming it to `keep` events when it grows
    /// past twice that
    pub fn append_history(&self, event: &UsageEvent, keep: usize) -> Result<()> {
        let path = self.history_path();
        history::append_event(&path, event)?;
        history::compact(&path, keep)?;
        Ok(())
    }

    pub fn recent_history(&self, limit: usize) -> Result<Vec<UsageEvent>> {
        history::load_recent(&self.history_path(), limit)
    }
}

/// Refuse stores written by a newer major version
fn check_version(version: &str) -> Result<()> {
    let found = semver::Version::parse(version)
        .with_context(|| format!("Invalid store version '{}'", version))?;
    let supported = semver::Version::parse(STORE_VERSION)?;
    if found.major > supported.major {
        anyhow::bail!(
            "Config was written by a newer gitswitch (store version {}, supported {}). Please upgrade.",
            found,
            supported
        );
    }
    Ok(())
}

/// Handle the 'gitswitch config' command
pub fn handle_config_command(
    enforcement: Option<Enforcement>,
    recency_days: Option<u32>,
    auto_learn: Option<bool>,
) -> Result<()> {
    let store = PatternStore::open()?;
    let mut config = store.load()?;

    let changed = enforcement.is_some() || recency_days.is_some() || auto_learn.is_some();
    if let Some(level) = enforcement {
        config.settings.enforcement = level;
    }
    if let Some(days) = recency_days {
        config.settings.recency_days = days;
    }
    if let Some(flag) = auto_learn {
        config.settings.auto_learn = flag;
    }

    if changed {
        store.save(&config)?;
        tracing::info!("settings updated");
        println!("\x1b[1;32m✓ Settings updated.\x1b[0m\n");
    }

    let settings = &config.settings;
    println!("\x1b[1;36m⚙️  Settings\x1b[0m ({})\n", store.config_path().display());
    println!("   Enforcement:    {:?}", settings.enforcement);
    println!("   Recency window: {} day(s)", settings.recency_days);
    println!("   Auto-learn:     {}", settings.auto_learn);
    println!("   History limit:  {} event(s)", settings.history_limit);
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Pattern;
    use crate::learn::record_usage;

    fn sample() -> Config {
        let mut config = Config::default();
        config.accounts.push(
            Identity::new("work", "Work", "Me", "me@work.com")
                .with_pattern(Pattern::manual("github.com/acme-corp", None)),
        );
        config.accounts.push(Identity::new("personal", "Personal", "Me", "me@personal.com"));
        config
    }

    #[test]
    fn missing_store_loads_empty() {
        let td = tempfile::tempdir().expect("tmpdir");
        let store = PatternStore::at(td.path().join("absent"));
        let config = store.load().expect("load");
        assert!(config.accounts.is_empty());
        assert_eq!(config.settings, Settings::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let td = tempfile::tempdir().expect("tmpdir");
        let store = PatternStore::at(td.path());
        let mut config = sample();
        config.settings.enforcement = Enforcement::Strict;

        store.save(&config).expect("save");
        assert!(!store.config_path().with_extension("json.tmp").exists());

        let loaded = store.load().expect("load");
        assert_eq!(loaded, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.config_path()).expect("meta").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let td = tempfile::tempdir().expect("tmpdir");
        let store = PatternStore::at(td.path());
        fs::write(
            store.config_path(),
            r#"{ "accounts": [], "settings": { "enforcement": "off" } }"#,
        )
        .expect("write");

        let config = store.load().expect("load");
        assert_eq!(config.version, STORE_VERSION);
        assert_eq!(config.settings.enforcement, Enforcement::Off);
        assert_eq!(config.settings.recency_days, DEFAULT_RECENCY_DAYS);
        assert!(config.settings.auto_learn);
    }

    #[test]
    fn refuses_newer_major_version() {
        let td = tempfile::tempdir().expect("tmpdir");
        let store = PatternStore::at(td.path());
        fs::write(store.config_path(), r#"{ "version": "2.0.0", "accounts": [] }"#).expect("write");
        let err = store.load().expect_err("should refuse");
        assert!(err.to_string().contains("newer gitswitch"));

        fs::write(store.config_path(), r#"{ "version": "1.4.2", "accounts": [] }"#).expect("write");
        assert!(store.load().is_ok());
    }

    #[test]
    fn commit_usage_merges_with_concurrent_writes() {
        let td = tempfile::tempdir().expect("tmpdir");
        let store = PatternStore::at(td.path());
        store.save(&sample()).expect("save");

        let snapshot = store.load().expect("load");
        let work = snapshot.find("work").expect("work");
        let update = record_usage(work, "https://gitlab.com/team-x/app", &EngineOptions::default());

        let mut concurrent = store.load().expect("load");
        concurrent.find_mut("work").expect("work").usage_count = 7;
        store.save(&concurrent).expect("save");

        store.commit_usage(&update).expect("commit");

        let after = store.load().expect("load");
        let work = after.find("work").expect("work");
        assert_eq!(work.usage_count, 7);
        assert_eq!(work.patterns.len(), 2);
        assert_eq!(work.patterns[1].text, "gitlab.com/team-x");
    }

    #[test]
    fn history_stays_bounded_by_the_limit() {
        let td = tempfile::tempdir().expect("tmpdir");
        let store = PatternStore::at(td.path());
        let context = crate::suggest::RepoContext::new(None, "/srv/app");

        for i in 0..25 {
            let event = UsageEvent::new(&format!("id-{i}"), &context, chrono::Utc::now());
            store.append_history(&event, 5).expect("append");
            let lines = fs::read_to_string(store.history_path()).expect("read").lines().count();
            assert!(lines <= 10, "log grew to {lines} lines");
        }

        let recent = store.recent_history(5).expect("history");
        assert_eq!(recent.last().map(|e| e.identity_id.as_str()), Some("id-24"));
    }

    #[test]
    fn set_default_is_exclusive() {
        let mut config = sample();
        config.set_default(Some("personal"));
        assert_eq!(config.default_account().map(|a| a.id.as_str()), Some("personal"));
        config.set_default(Some("work"));
        assert_eq!(config.accounts.iter().filter(|a| a.is_default).count(), 1);
        config.set_default(None);
        assert!(config.default_account().is_none());
    }
}
