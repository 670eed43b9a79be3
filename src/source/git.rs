//! Git plumbing for git upstreams and the two-branch source layout.
//!
//! Git upstream URLs have the form `<repo>.git@<commit>`. Each repo is
//! mirrored once under the cache (`cache/<host_path_with_underscores>`) and
//! build trees are cloned from the mirror.
//!
//! Every source tree, whether extracted or cloned, gets an `upstream` branch
//! holding pristine sources and a `master` branch carrying the port patch.

use crate::build_command::{append_log, command_succeeds};
use crate::error::{BuildError, PortsError, Result};
use log::{debug, info, trace};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const FALLBACK_NAME: &str = "webports";
const FALLBACK_EMAIL: &str = "nobody@example.com";

/// True for `<repo>.git@<commit>` URLs.
pub fn is_git_url(url: &str) -> bool {
    url.split('@').next().is_some_and(|u| u.ends_with(".git"))
}

/// Split `<repo>@<commit>`.
pub fn split_git_url(url: &str) -> Result<(&str, &str)> {
    url.rsplit_once('@')
        .filter(|(repo, commit)| !repo.is_empty() && !commit.is_empty())
        .ok_or_else(|| PortsError::msg(format!("git URL has no commit: {}", url)))
}

/// Mirror directory name: the repo URL without scheme, `/` replaced.
pub fn mirror_name(repo: &str) -> String {
    let without_scheme = repo.split_once("://").map_or(repo, |(_, rest)| rest);
    without_scheme.replace('/', "_")
}

/// Run git in `dir`, capturing output. With a build log the command and its
/// output are appended there; otherwise output is only logged on failure.
pub fn run_git(dir: &Path, args: &[&str], log: Option<&Path>) -> Result<()> {
    trace!("git {} (in {})", args.join(" "), dir.display());
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|_| BuildError::NotFound("git".to_string()))?;
    if log.is_some() {
        let mut text = format!("git {}\n", args.join(" "));
        text.push_str(&String::from_utf8_lossy(&output.stdout));
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        append_log(log, &text)?;
    }
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            info!("{}", stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            info!("{}", stderr.trim_end());
        }
        return Err(PortsError::msg(format!("git command failed: git {}", args.join(" "))));
    }
    Ok(())
}

/// `-c` options supplying a commit identity when none is configured.
fn identity_args(dir: &Path) -> Vec<String> {
    if command_succeeds("git", &["config", "user.email"], dir) {
        return Vec::new();
    }
    vec![
        "-c".to_string(),
        format!("user.name={}", FALLBACK_NAME),
        "-c".to_string(),
        format!("user.email={}", FALLBACK_EMAIL),
    ]
}

/// Commit staged changes with `message`.
pub fn commit(dir: &Path, message: &str, log: Option<&Path>) -> Result<()> {
    let mut args = identity_args(dir);
    args.extend(["commit", "-q", "-m", message].map(String::from));
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    run_git(dir, &args, log)
}

/// Bring the cache mirror of `url` up to date; returns (mirror dir, commit).
pub fn clone_to_mirror(cache_root: &Path, url: &str, log: Option<&Path>) -> Result<(PathBuf, String)> {
    let (repo, commit) = split_git_url(url)?;
    let name = mirror_name(repo);
    let mirror = cache_root.join(&name);
    if mirror.exists() {
        let rev = format!("{}^{{commit}}", commit);
        if !command_succeeds("git", &["rev-parse", &rev], &mirror) {
            info!("Updating git mirror: {}", mirror.display());
            run_git(&mirror, &["remote", "update", "--prune"], log)?;
        }
    } else {
        info!("Mirroring upstream git repo: {}", url);
        fs::create_dir_all(cache_root)?;
        run_git(cache_root, &["clone", "--mirror", repo, &name], log)?;
    }
    debug!("git mirror up-to-date: {}", mirror.display());
    Ok((mirror, commit.to_string()))
}

/// Clone `url` into `dest` through the cache mirror and check out its
/// commit. The origin remote points back at the real upstream.
pub fn clone(cache_root: &Path, url: &str, dest: &Path, log: Option<&Path>) -> Result<()> {
    let (repo, _) = split_git_url(url)?;
    let (mirror, commit) = clone_to_mirror(cache_root, url, log)?;
    let parent = dest.parent().unwrap_or(cache_root);
    fs::create_dir_all(parent)?;
    let mirror_str = mirror.to_string_lossy();
    let dest_str = dest.to_string_lossy();
    run_git(parent, &["clone", &mirror_str, &dest_str], log)?;
    run_git(dest, &["reset", "--hard", &commit], log)?;
    run_git(dest, &["remote", "set-url", "origin", repo], log)
}

/// Set up the `upstream` and `master` branches in a source tree.
///
/// Already initialised trees (with `refs/heads/upstream`) are left alone.
/// A new repository that fails to initialise is removed again.
pub fn init_repo(dir: &Path, log: Option<&Path>) -> Result<()> {
    let git_dir = dir.join(".git");
    if git_dir.join("refs").join("heads").join("upstream").exists() {
        return Ok(());
    }

    if git_dir.exists() {
        info!("Init existing git repo: {}", dir.display());
        run_git(dir, &["checkout", "-q", "-b", "placeholder"], log)?;
        let _ = run_git(dir, &["branch", "-D", "upstream"], log);
        let _ = run_git(dir, &["branch", "-D", "master"], log);
        run_git(dir, &["checkout", "-q", "-b", "upstream"], log)?;
        run_git(dir, &["checkout", "-q", "-b", "master"], log)?;
        return run_git(dir, &["branch", "-D", "placeholder"], log);
    }

    info!("Init new git repo: {}", dir.display());
    run_git(dir, &["init", "-q"], log)?;
    let result = run_git(dir, &["checkout", "-q", "-b", "master"], log)
        .and_then(|_| run_git(dir, &["add", "-f", "."], log))
        .and_then(|_| commit(dir, "Upstream version", log))
        .and_then(|_| run_git(dir, &["branch", "upstream"], log));
    if result.is_err() {
        let _ = fs::remove_dir_all(&git_dir);
    }
    result
}
