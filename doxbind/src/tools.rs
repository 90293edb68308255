//! Wrappers around the external programs the pipeline drives: doxygen to
//! produce the XML tree, clang-format on generated sources and git for the
//! branch used in source URLs.

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Placeholder replaced by the input directories in the Doxyfile template.
pub const INPUT_DIRECTORIES: &str = "{{input_directories}}";

const DEFAULT_BRANCH: &str = "master";

/// Fill the Doxyfile template with one input directory per line.
pub fn render_doxyfile(template: &str, input_dirs: &[PathBuf]) -> String {
    let separator = format!(" \\\n{}", " ".repeat(25));
    let dirs: Vec<String> = input_dirs.iter().map(|d| d.display().to_string()).collect();
    template.replace(INPUT_DIRECTORIES, &dirs.join(&separator))
}

/// Run doxygen over `input_dirs` in a fresh temporary directory. The
/// directory is returned so the XML it holds lives as long as the caller
/// needs it; doxygen's output goes to `out.log` inside it.
pub fn run_doxygen(executable: &str, doxyfile_template: &Path, input_dirs: &[PathBuf]) -> Result<TempDir> {
    let template = std::fs::read_to_string(doxyfile_template)
        .with_context(|| format!("reading Doxyfile template {}", doxyfile_template.display()))?;
    let dir = tempfile::tempdir().context("creating doxygen work directory")?;
    std::fs::write(dir.path().join("Doxyfile"), render_doxyfile(&template, input_dirs))
        .context("writing Doxyfile")?;

    let log_path = dir.path().join("out.log");
    let log = File::create(&log_path).context("creating doxygen log")?;
    let log_err = log.try_clone().context("sharing doxygen log")?;
    info!(executable, inputs = input_dirs.len(), dir = %dir.path().display(), "running doxygen");
    let status = Command::new(executable)
        .arg("Doxyfile")
        .current_dir(dir.path())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .status()
        .with_context(|| format!("spawning {executable}"))?;
    if !status.success() {
        bail!("{executable} failed with {status}, see {}", log_path.display());
    }
    Ok(dir)
}

/// Format `files` in place. A missing formatter only disables formatting;
/// returns how many files were formatted.
pub fn clang_format(executable: &str, files: &[PathBuf], style_root: &Path) -> usize {
    let mut formatted = 0;
    for file in files {
        let status = Command::new(executable)
            .args(["-i", "-style=file"])
            .arg(file)
            .current_dir(style_root)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => formatted += 1,
            Ok(status) => warn!(file = %file.display(), %status, "clang-format failed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(executable, "formatter not found, skipping formatting");
                return formatted;
            }
            Err(e) => warn!(file = %file.display(), err = %e, "clang-format failed"),
        }
    }
    debug!(formatted, "formatted generated files");
    formatted
}

/// Current branch of the repository at `repo`, `master` when it cannot be
/// determined.
pub fn git_branch(repo: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(repo)
        .stderr(Stdio::null())
        .output();
    match output {
        Ok(output) if output.status.success() => {
            let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if branch.is_empty() || branch == "HEAD" {
                DEFAULT_BRANCH.to_string()
            } else {
                branch
            }
        }
        Ok(_) => {
            debug!(repo = %repo.display(), "not a git repository, using default branch");
            DEFAULT_BRANCH.to_string()
        }
        Err(e) => {
            debug!(err = %e, "git unavailable, using default branch");
            DEFAULT_BRANCH.to_string()
        }
    }
}
