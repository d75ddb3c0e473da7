use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use walkdir::WalkDir;

use crate::identity::Identity;
use crate::suggest::RepoContext;

/// `git` command, optionally run inside `dir`
fn git(dir: Option<&Path>) -> Command {
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd
}

/// Run git and return trimmed stdout, `None` on failure or empty output
fn git_output(dir: Option<&Path>, args: &[&str]) -> Option<String> {
    git(dir)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Check if currently inside a git repository
pub fn is_inside_git_repo() -> bool {
    is_git_repo(None)
}

pub fn is_git_repo(dir: Option<&Path>) -> bool {
    git_output(dir, &["rev-parse", "--is-inside-work-tree"]).as_deref() == Some("true")
}

/// Get the root path of the current git repository
pub fn get_git_root() -> Option<PathBuf> {
    git_output(None, &["rev-parse", "--show-toplevel"]).map(PathBuf::from)
}

/// URL of `origin`, or of the first configured remote
pub fn remote_url(dir: Option<&Path>) -> Option<String> {
    if let Some(url) = git_output(dir, &["remote", "get-url", "origin"]) {
        return Some(url);
    }
    let remotes = git_output(dir, &["remote"])?;
    let first = remotes.lines().next()?.trim().to_string();
    git_output(dir, &["remote", "get-url", &first])
}

/// Effective value of a git config key
pub fn config_get(dir: Option<&Path>, key: &str) -> Option<String> {
    git_output(dir, &["config", "--get", key])
}

/// Value set in the repository's own config, ignoring global and system files
pub fn local_config_get(dir: &Path, key: &str) -> Option<String> {
    git_output(Some(dir), &["config", "--local", "--get", key])
}

pub fn git_version_string() -> Option<String> {
    git_output(None, &["--version"])
}

/// Parse `git version 2.39.3 (Apple Git-146)` into a semver version
pub fn parse_git_version(raw: &str) -> Option<semver::Version> {
    let numbers = raw
        .split_whitespace()
        .find(|word| word.starts_with(|c: char| c.is_ascii_digit()))?;
    let mut parts = numbers
        .split('.')
        .map(|p| p.chars().take_while(char::is_ascii_digit).collect::<String>())
        .map(|p| p.parse::<u64>().ok());
    let major = parts.next().flatten()?;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some(semver::Version::new(major, minor, patch))
}

/// Context of the repository at `dir` (current directory when `None`)
pub fn current_context(dir: Option<&Path>) -> Result<RepoContext> {
    let path = match dir {
        Some(dir) => git_output(Some(dir), &["rev-parse", "--show-toplevel"])
            .map(PathBuf::from)
            .unwrap_or_else(|| dir.to_path_buf()),
        None => match get_git_root() {
            Some(root) => root,
            None => std::env::current_dir().context("Failed to read current directory")?,
        },
    };

    Ok(RepoContext::new(remote_url(dir), &path.to_string_lossy())
        .with_email(config_get(dir, "user.email")))
}

/// Write the identity into git config: the repository at `dir` (or the
/// current one), or the global config when `global` is set
pub fn apply_identity(identity: &Identity, dir: Option<&Path>, global: bool) -> Result<()> {
    let scope = if global { "--global" } else { "--local" };

    for (key, value) in [("user.name", &identity.git_name), ("user.email", &identity.email)] {
        let output = git(dir)
            .args(["config", scope, key, value])
            .output()
            .with_context(|| format!("Failed to set {}", key))?;
        if !output.status.success() {
            anyhow::bail!(
                "git config {} failed: {}",
                key,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
    }

    tracing::info!(identity = %identity.id, global, "applied identity to git config");
    Ok(())
}

/// Hooks directory of the repository, honoring `core.hooksPath`
pub fn hooks_dir(dir: Option<&Path>) -> Result<PathBuf> {
    let raw = git_output(dir, &["rev-parse", "--git-path", "hooks"])
        .context("Failed to locate the git hooks directory")?;
    let hooks = PathBuf::from(raw);
    if hooks.is_absolute() {
        return Ok(hooks);
    }
    let base = match dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    Ok(base.join(hooks))
}

/// Run `git clone`, inheriting stdio
pub fn clone_repo(url: &str, dir: Option<&str>) -> Result<ExitStatus> {
    let mut cmd = git(None);
    cmd.arg("clone").arg(url);
    if let Some(dir) = dir {
        cmd.arg(dir);
    }
    cmd.status().context("Failed to run git clone")
}

/// Directory created by `git clone <url> [dir]`
pub fn detect_cloned_dir(url: &str, dir: Option<&str>) -> Option<PathBuf> {
    if let Some(dir) = dir {
        let path = PathBuf::from(dir);
        return path.is_dir().then_some(path);
    }

    // e.g. https://github.com/user/repo.git -> repo
    let name = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()?
        .trim_end_matches(".git");
    if name.is_empty() {
        return None;
    }
    let path = PathBuf::from(name);
    path.is_dir().then_some(path)
}

/// Working trees under `root`, at most `max_depth` levels deep
pub fn find_repositories(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut repos = Vec::new();
    let mut walker = WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if entry.depth() > 0 && (name.starts_with('.') || name == "node_modules" || name == "target") {
            walker.skip_current_dir();
            continue;
        }
        if entry.path().join(".git").exists() {
            repos.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }

    repos
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_git_versions() {
        assert_eq!(
            parse_git_version("git version 2.39.3 (Apple Git-146)"),
            Some(semver::Version::new(2, 39, 3))
        );
        assert_eq!(
            parse_git_version("git version 2.45.1.windows.1"),
            Some(semver::Version::new(2, 45, 1))
        );
        assert_eq!(parse_git_version("git version 3"), Some(semver::Version::new(3, 0, 0)));
        assert_eq!(parse_git_version("command not found"), None);
    }

    #[test]
    fn finds_nested_repositories_but_not_inside_them() {
        let td = tempfile::tempdir().expect("tmpdir");
        let root = td.path();
        for repo in ["work/api", "work/web", "oss/tool", "work/api/vendor/inner"] {
            fs::create_dir_all(root.join(repo).join(".git")).expect("mkdir");
        }
        fs::create_dir_all(root.join("node_modules/pkg/.git")).expect("mkdir");
        fs::create_dir_all(root.join("plain/dir")).expect("mkdir");

        let mut found: Vec<PathBuf> = find_repositories(root, 4)
            .into_iter()
            .map(|p| p.strip_prefix(root).expect("prefix").to_path_buf())
            .collect();
        found.sort();

        assert_eq!(
            found,
            vec![PathBuf::from("oss/tool"), PathBuf::from("work/api"), PathBuf::from("work/web")]
        );
    }

    #[test]
    fn detects_clone_directory_from_url() {
        let td = tempfile::tempdir().expect("tmpdir");
        let explicit = td.path().join("checkout");
        fs::create_dir_all(&explicit).expect("mkdir");

        let explicit_str = explicit.to_string_lossy().to_string();
        assert_eq!(
            detect_cloned_dir("https://github.com/acme/app.git", Some(&explicit_str)),
            Some(explicit.clone())
        );
        assert_eq!(detect_cloned_dir("https://github.com/acme/does-not-exist-here.git", None), None);
    }
}
