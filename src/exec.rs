//! Spawns external commands, streaming stdout/stderr through a line
//! splitter and reporting an exit code. Mirrors `internal/exec/exec.go`.

use std::collections::HashMap;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;

use crate::envvars::EnvVars;
use crate::linesplit::LineSplitter;

/// A command invocation: argv, environment, and working directory.
#[derive(Debug, Clone)]
pub struct Command {
    pub args: Vec<String>,
    pub env: EnvVars,
    pub work_dir: String,
}

/// Outcome of a finished process: its exit code (`-1` if it could not even
/// be determined, e.g. killed by a signal) alongside any spawn/run error.
#[derive(Debug)]
pub struct Outcome {
    pub exit_code: i32,
}

/// Runs `command`, forwarding each completed stdout/stderr line to the
/// respective callback. Returns the process exit code on success, or an
/// error if the process could not be spawned, exited non-zero, or the
/// caller's deadline elapsed first.
pub async fn run<FOut, FErr>(
    command: &Command,
    mut log_stdout: FOut,
    mut log_stderr: FErr,
) -> anyhow::Result<Outcome>
where
    FOut: FnMut(&str) + Send,
    FErr: FnMut(&str) + Send,
{
    let Some((program, rest)) = command.args.split_first() else {
        anyhow::bail!("command has no arguments");
    };

    let mut child = TokioCommand::new(program)
        .args(rest)
        .current_dir(&command.work_dir)
        .envs(env_map(&command.env))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    let mut stdout_splitter = LineSplitter::new(|line: &str| log_stdout(line));
    let mut stderr_splitter = LineSplitter::new(|line: &str| log_stderr(line));

    let mut stdout = stdout;
    let mut stderr = stderr;
    let mut stdout_buf = [0u8; 4096];
    let mut stderr_buf = [0u8; 4096];

    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stdout_done || !stderr_done {
        tokio::select! {
            n = stdout.read(&mut stdout_buf), if !stdout_done => {
                let n = n?;
                if n == 0 {
                    stdout_done = true;
                } else {
                    stdout_splitter.push(&stdout_buf[..n]);
                }
            }
            n = stderr.read(&mut stderr_buf), if !stderr_done => {
                let n = n?;
                if n == 0 {
                    stderr_done = true;
                } else {
                    stderr_splitter.push(&stderr_buf[..n]);
                }
            }
        }
    }
    stdout_splitter.close();
    stderr_splitter.close();

    let status = child.wait().await?;
    match status.code() {
        Some(0) => Ok(Outcome { exit_code: 0 }),
        Some(code) => Err(crate::error::KonvahtiError::CommandFailed { code }.into()),
        None => Err(crate::error::KonvahtiError::CommandFailed { code: -1 }.into()),
    }
}

fn env_map(env: &EnvVars) -> HashMap<String, String> {
    env.to_map()
}
