//! Process execution for merged commands.
//! No shell is used; arguments are passed as a list and the child environment is exactly
//! the command's `envs` (nothing is inherited from the gateway).

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::command::EffectiveCommand;

const READ_CHUNK: usize = 8 * 1024;

/// Outcome of one command run: combined stdout/stderr and an error message when the
/// process could not be started or did not exit successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub output: Vec<u8>,
    pub error: Option<String>,
}

impl Execution {
    fn failed(output: Vec<u8>, error: String) -> Self {
        Self {
            output,
            error: Some(error),
        }
    }

    /// Output as text; invalid UTF-8 is replaced.
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}

/// Split `KEY=VAL`; an entry without `=` sets `KEY` to the empty string.
pub fn split_env(entry: &str) -> (&str, &str) {
    entry.split_once('=').unwrap_or((entry, ""))
}

/// Resolve a bare program name against the gateway's own PATH, since the child's
/// environment is cleared. Names containing a separator are used as given.
fn resolve_program(program: &str) -> Result<PathBuf, which::Error> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        Ok(PathBuf::from(program))
    } else {
        which::which(program)
    }
}

/// Run the command to completion. Never fails at the call site: spawn and exit
/// failures are reported in [`Execution::error`].
pub async fn run(cmd: &EffectiveCommand) -> Execution {
    let program = match resolve_program(&cmd.command) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("lookup {} failed: {}", cmd.command, e);
            return Execution::failed(Vec::new(), format!("exec {}: {}", cmd.command, e));
        }
    };
    let mut command = Command::new(program);
    command
        .args(&cmd.args)
        .env_clear()
        .envs(cmd.envs.iter().map(|e| split_env(e)))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if cmd.stdin.is_empty() {
            Stdio::null()
        } else {
            Stdio::piped()
        });
    if !cmd.dir.is_empty() {
        command.current_dir(&cmd.dir);
    }

    let mut child = match command.spawn() {
        Ok(c) => c,
        Err(e) => {
            log::debug!("spawn {} failed: {}", cmd.command, e);
            return Execution::failed(Vec::new(), format!("exec {}: {}", cmd.command, e));
        }
    };

    // Stdin is written from its own task while both output pipes are drained.
    let writer = child.stdin.take().map(|mut stdin| {
        let input = cmd.stdin.clone().into_bytes();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&input).await {
                log::debug!("writing stdin: {}", e);
            }
        })
    });

    let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
        (Some(o), Some(e)) => (o, e),
        _ => return Execution::failed(Vec::new(), "exec: output pipes missing".to_string()),
    };
    let mut output = Vec::new();
    let captured = read_combined(stdout, stderr, &mut output).await;
    if let Some(w) = writer {
        let _ = w.await;
    }
    let status = child.wait().await;

    match (captured, status) {
        (Ok(()), Ok(status)) => match exit_error(status) {
            Some(err) => Execution::failed(output, err),
            None => Execution {
                output,
                error: None,
            },
        },
        (Err(e), _) => Execution::failed(output, format!("reading output: {}", e)),
        (Ok(()), Err(e)) => Execution::failed(output, format!("wait: {}", e)),
    }
}

fn exit_error(status: ExitStatus) -> Option<String> {
    if status.success() {
        None
    } else {
        Some(status.to_string())
    }
}

/// Drain both streams into `output` in the order chunks arrive. On a read error,
/// whatever was read before it stays in `output`.
async fn read_combined<O, E>(
    mut stdout: O,
    mut stderr: E,
    output: &mut Vec<u8>,
) -> std::io::Result<()>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_buf = vec![0u8; READ_CHUNK];
    let mut err_buf = vec![0u8; READ_CHUNK];
    let mut out_open = true;
    let mut err_open = true;
    while out_open || err_open {
        tokio::select! {
            n = stdout.read(&mut out_buf), if out_open => {
                match n? {
                    0 => out_open = false,
                    n => output.extend_from_slice(&out_buf[..n]),
                }
            }
            n = stderr.read(&mut err_buf), if err_open => {
                match n? {
                    0 => err_open = false,
                    n => output.extend_from_slice(&err_buf[..n]),
                }
            }
        }
    }
    Ok(())
}
