use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result};

#[derive(Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    SkippedNotRepo { reason: String },
    SkippedNoChanges,
    Committed,
    Pushed,
}

/// Commit `files` (and only those) in the repository containing `repo_dir`,
/// then push when `push` is set.
///
/// Files outside the repository or missing on disk are ignored.
pub fn try_publish(
    repo_dir: &Path,
    files: &[PathBuf],
    message: &str,
    push: bool,
) -> Result<PublishOutcome> {
    let Some(repo_root) = git_repo_root(repo_dir)? else {
        return Ok(PublishOutcome::SkippedNotRepo {
            reason: format!("{} is not inside a git repository", repo_dir.display()),
        });
    };

    let paths: Vec<String> = files
        .iter()
        .filter(|f| f.exists())
        .filter_map(|f| relative_to(&repo_root, f))
        .collect();
    if paths.is_empty() {
        return Ok(PublishOutcome::SkippedNoChanges);
    }

    let mut status_args = vec!["status", "--porcelain", "--"];
    status_args.extend(paths.iter().map(String::as_str));
    let status = run_checked(&repo_root, &status_args, "git status")?;
    if String::from_utf8_lossy(&status.stdout).trim().is_empty() {
        return Ok(PublishOutcome::SkippedNoChanges);
    }

    let mut add_args = vec!["add", "--"];
    add_args.extend(paths.iter().map(String::as_str));
    run_checked(&repo_root, &add_args, "git add")?;

    let message = message.trim();
    let message = if message.is_empty() {
        "assiny: update ledger".to_string()
    } else {
        format!("assiny: {message}")
    };
    let mut commit_args = vec!["commit", "-m", message.as_str(), "--"];
    commit_args.extend(paths.iter().map(String::as_str));
    run_checked(&repo_root, &commit_args, "git commit")?;

    if !push {
        return Ok(PublishOutcome::Committed);
    }
    run_checked(&repo_root, &["push"], "git push")?;
    Ok(PublishOutcome::Pushed)
}

fn relative_to(root: &Path, file: &Path) -> Option<String> {
    let file = file.canonicalize().ok()?;
    let rel = file.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().into_owned())
}

fn git_repo_root(dir: &Path) -> Result<Option<PathBuf>> {
    let output = git_output(dir, &["rev-parse", "--show-toplevel"])?;
    if !output.status.success() {
        return Ok(None);
    }

    let root = String::from_utf8(output.stdout).context("Git repo root is not valid UTF-8")?;
    let root = root.trim();
    if root.is_empty() {
        return Ok(None);
    }
    let root = PathBuf::from(root);
    Ok(Some(root.canonicalize().unwrap_or(root)))
}

fn run_checked(dir: &Path, args: &[&str], what: &str) -> Result<Output> {
    let output = git_output(dir, args)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{what} failed: {}", stderr.trim());
    }
    Ok(output)
}

fn git_output(dir: &Path, args: &[&str]) -> Result<Output> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                anyhow::anyhow!("git not found in PATH")
            } else {
                e.into()
            }
        })?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn init_repo(dir: &Path) -> Result<()> {
        let steps: [&[&str]; 3] = [
            &["init"],
            &["config", "user.email", "test@example.com"],
            &["config", "user.name", "Tracker Test"],
        ];
        for args in steps {
            run_checked(dir, args, "git setup")?;
        }
        Ok(())
    }

    #[test]
    fn skips_outside_repo() -> Result<()> {
        if !git_available() {
            return Ok(());
        }
        let dir = TempDir::new()?;
        let outcome = try_publish(dir.path(), &[dir.path().join("ledger.csv")], "x", false)?;
        assert!(matches!(outcome, PublishOutcome::SkippedNotRepo { .. }));
        Ok(())
    }

    #[test]
    fn commits_only_listed_files() -> Result<()> {
        if !git_available() {
            return Ok(());
        }
        let dir = TempDir::new()?;
        init_repo(dir.path())?;
        let ledger = dir.path().join("ledger.csv");
        fs::write(&ledger, "timestamp,total_value\n")?;
        fs::write(dir.path().join("google_login.json"), "{}")?;

        let outcome = try_publish(dir.path(), &[ledger.clone()], "ledger 2025-01-01", false)?;
        assert_eq!(outcome, PublishOutcome::Committed);

        let log = git_output(dir.path(), &["log", "-1", "--pretty=%s"])?;
        assert_eq!(
            String::from_utf8_lossy(&log.stdout).trim(),
            "assiny: ledger 2025-01-01"
        );
        let status = git_output(dir.path(), &["status", "--porcelain"])?;
        let status = String::from_utf8_lossy(&status.stdout);
        assert!(status.contains("google_login.json"));
        assert!(!status.contains("ledger.csv"));

        let again = try_publish(dir.path(), &[ledger], "ledger 2025-01-01", false)?;
        assert_eq!(again, PublishOutcome::SkippedNoChanges);
        Ok(())
    }

    #[test]
    fn push_without_remote_is_an_error() -> Result<()> {
        if !git_available() {
            return Ok(());
        }
        let dir = TempDir::new()?;
        init_repo(dir.path())?;
        let ledger = dir.path().join("ledger.csv");
        fs::write(&ledger, "timestamp,total_value\n")?;

        let err = try_publish(dir.path(), &[ledger], "x", true).unwrap_err();
        assert!(err.to_string().contains("git push failed"));
        Ok(())
    }
}
