//! Shell Integration
//!
//! Runs the external fuzzy matcher (fzf) and opens console URLs in the
//! browser.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

/// fzf exit code when the user aborts (Esc / Ctrl-C)
const FZF_ABORTED: i32 = 130;
/// fzf exit code when nothing matched the typed query
const FZF_NO_MATCH: i32 = 1;

/// Result of a shell operation
#[derive(Debug)]
pub enum ShellResult {
    /// Command completed successfully
    Success,
    /// Command failed with exit code
    Failed(i32),
    /// Error launching command
    Error(String),
}

/// Result of an fzf session
#[derive(Debug, PartialEq, Eq)]
pub enum FzfOutcome {
    /// The selected line, without its trailing newline
    Selected(String),
    /// User aborted or nothing matched
    Cancelled,
    /// fzf is not installed
    Unavailable,
    /// fzf failed
    Error(String),
}

/// Options for one fzf run
#[derive(Debug, Clone)]
pub struct FzfOptions {
    pub header: String,
    pub prompt: String,
}

impl FzfOptions {
    pub fn new(header: &str, prompt: &str) -> Self {
        Self {
            header: header.to_string(),
            prompt: prompt.to_string(),
        }
    }

    /// fzf arguments. Only the first three tab-delimited fields are shown
    /// and searched; the last one identifies the resource.
    pub fn args(&self) -> Vec<String> {
        vec![
            "--height=80%".to_string(),
            "--layout=reverse".to_string(),
            "--border".to_string(),
            "--info=inline".to_string(),
            "--delimiter=\t".to_string(),
            "--with-nth=1,2,3".to_string(),
            "--nth=1,2,3".to_string(),
            "--tabstop=4".to_string(),
            format!("--header={}", self.header),
            format!("--prompt={}", self.prompt),
        ]
    }
}

/// Let the user pick one of `lines` with fzf
pub fn run_fzf(lines: &[String], opts: &FzfOptions) -> FzfOutcome {
    run_picker("fzf", &opts.args(), lines)
}

/// Feed lines to a picker on stdin and read the selection from stdout
fn run_picker(cmd: &str, args: &[String], lines: &[String]) -> FzfOutcome {
    tracing::debug!("Executing: {} {}", cmd, args.join(" "));

    let mut child = match Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => return FzfOutcome::Unavailable,
        Err(e) => return FzfOutcome::Error(format!("Failed to execute {}: {}", cmd, e)),
    };

    if let Some(mut stdin) = child.stdin.take() {
        let input = lines.join("\n");
        // A picker that exits early closes the pipe; its exit code tells the rest
        if let Err(e) = stdin.write_all(input.as_bytes()) {
            tracing::debug!("{} closed stdin early: {}", cmd, e);
        }
    }

    let output = match child.wait_with_output() {
        Ok(output) => output,
        Err(e) => return FzfOutcome::Error(format!("Failed to wait for {}: {}", cmd, e)),
    };

    match output.status.code() {
        Some(0) => {
            let selected = String::from_utf8_lossy(&output.stdout)
                .trim_end_matches(['\r', '\n'])
                .to_string();
            if selected.is_empty() {
                FzfOutcome::Cancelled
            } else {
                FzfOutcome::Selected(selected)
            }
        }
        Some(FZF_ABORTED) | Some(FZF_NO_MATCH) | None => FzfOutcome::Cancelled,
        Some(code) => FzfOutcome::Error(format!("{} exited with code {}", cmd, code)),
    }
}

/// Open URL in browser (for console links)
pub fn open_browser(url: &str) -> ShellResult {
    let (cmd, args): (&str, Vec<&str>) = if cfg!(target_os = "macos") {
        ("open", vec![url])
    } else if cfg!(target_os = "windows") {
        ("cmd", vec!["/C", "start", "", url])
    } else {
        ("xdg-open", vec![url])
    };

    tracing::info!("Opening {}", url);
    execute_command(cmd, &args.iter().map(|s| s.to_string()).collect::<Vec<_>>())
}

/// Execute a command, inheriting stdio
fn execute_command(cmd: &str, args: &[String]) -> ShellResult {
    match Command::new(cmd)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
    {
        Ok(mut child) => match child.wait() {
            Ok(status) => {
                if status.success() {
                    ShellResult::Success
                } else {
                    ShellResult::Failed(status.code().unwrap_or(-1))
                }
            },
            Err(e) => ShellResult::Error(format!("Failed to wait for process: {}", e)),
        },
        Err(e) => ShellResult::Error(format!("Failed to execute {}: {}", cmd, e)),
    }
}
