//! Shell command execution for switch process control.
//!
//! Lagopus is stopped and its ARP table programmed through `lagosh`, which
//! reads commands on stdin; the commands are piped in through `/bin/sh -c`.
//! Arguments interpolated into those command lines go through
//! [`shellquote`].
//!
//! # Example
//!
//! ```ignore
//! use tipsy_controller::shell::{self, shellquote, ECHO_CMD};
//!
//! let cmd = format!("{} {} | {}", ECHO_CMD, shellquote("stop"), shellquote("lagosh"));
//! shell::exec_checked(&cmd).await?;
//! ```

use crate::error::{ControllerError, ControllerResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// `echo`, used to feed a single line to `lagosh`.
pub const ECHO_CMD: &str = "/bin/echo";

/// Shell used for command lines with pipes.
const SH_CMD: &str = "/bin/sh";

/// Characters with special meaning inside shell double quotes.
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Wraps `s` in double quotes, escaping `$`, backtick, `"`, `\` and newline.
///
/// Bridge names, paths and `lagosh` lines all pass through here before
/// being spliced into a command line.
///
/// # Example
///
/// ```
/// use tipsy_controller::shell::shellquote;
///
/// assert_eq!(shellquote("br-phy"), "\"br-phy\"");
/// assert_eq!(shellquote("a$b"), "\"a\\$b\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Exit status and trimmed output of one command line.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// `-1` when the command was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Both streams, stdout first, for error messages.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Runs `cmd` through `/bin/sh -c` and collects its output.
///
/// # Arguments
///
/// * `cmd` - a complete command line; quote untrusted parts with
///   [`shellquote`]
///
/// # Returns
///
/// The result even when the command exits non-zero. `Err` only when the
/// shell itself could not be started.
pub async fn exec(cmd: &str) -> ControllerResult<ExecResult> {
    debug!(command = %cmd, "running shell command");

    let output = Command::new(SH_CMD)
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ControllerError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let result = ExecResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if result.success() {
        trace!(command = %cmd, "shell command done");
    } else {
        warn!(
            command = %cmd,
            exit_code = result.exit_code,
            stderr = %result.stderr,
            "shell command failed"
        );
    }
    Ok(result)
}

/// Like [`exec`], but a non-zero exit status is an error.
///
/// # Returns
///
/// * `Ok(stdout)` - the command exited with status 0
/// * `Err(ControllerError::ShellCommandFailed)` - any other status, with
///   both output streams in the error
pub async fn exec_checked(cmd: &str) -> ControllerResult<String> {
    let result = exec(cmd).await?;
    if !result.success() {
        return Err(ControllerError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        });
    }
    Ok(result.stdout)
}
