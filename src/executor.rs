//! Runs the external program once per submission.

use std::io;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

/// Debug runs reject inputs longer than this many characters.
pub const MAX_DEBUG_INPUT_CHARS: usize = 10_000;

pub const EMPTY_INPUT_MESSAGE: &str = "No input text provided";

/// When captured stderr turns a run into an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrPolicy {
    /// Any stderr output is an error, whatever the exit status.
    #[default]
    AnyOutput,
    /// Only a non-zero exit status is an error; stderr becomes its message.
    NonZeroExit,
}

/// How to invoke the external program.
#[derive(Debug, Clone)]
pub struct ProgramConfig {
    pub program: String,
    /// Leading arguments; the debug flag is appended after them.
    pub args: Vec<String>,
    pub timeout: Duration,
    pub stderr_policy: StderrPolicy,
}

impl ProgramConfig {
    /// `java -jar <jar>`.
    pub fn java_jar(jar: impl Into<String>) -> Self {
        Self {
            program: "java".to_string(),
            args: vec!["-jar".to_string(), jar.into()],
            ..Self::default()
        }
    }
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            program: "java".to_string(),
            args: vec!["-jar".to_string(), "TP2.jar".to_string()],
            timeout: Duration::from_secs(30),
            stderr_policy: StderrPolicy::default(),
        }
    }
}

/// Raw output of one finished run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Outcome of one submission, consumed by the page renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Success { output: String, elapsed_ms: u64 },
    ProcessError { message: String },
    ValidationError { message: String },
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write program input: {0}")]
    Stdin(#[source] io::Error),

    #[error("failed to collect program output: {0}")]
    Wait(#[source] io::Error),

    #[error("program did not finish within {} seconds", .0.as_secs_f64())]
    Timeout(Duration),
}

/// Literal flag passed to the program.
pub fn debug_flag(debug: bool) -> &'static str {
    if debug {
        "true"
    } else {
        "false"
    }
}

/// Input checks done before anything is spawned.
pub fn validate_input(input: &str, debug: bool) -> Result<(), String> {
    if input.is_empty() {
        return Err(EMPTY_INPUT_MESSAGE.to_string());
    }
    if debug && input.chars().count() > MAX_DEBUG_INPUT_CHARS {
        return Err(format!(
            "Input is too long for debug mode (maximum {MAX_DEBUG_INPUT_CHARS} characters)"
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Executor {
    config: ProgramConfig,
}

impl Executor {
    pub fn new(config: ProgramConfig) -> Self {
        Self { config }
    }

    /// Full argv for a run, program first.
    pub fn command_line(&self, debug: bool) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.config.args.len() + 2);
        argv.push(self.config.program.clone());
        argv.extend(self.config.args.iter().cloned());
        argv.push(debug_flag(debug).to_string());
        argv
    }

    /// Validate, run once, and classify the result. Never panics on
    /// process failures; they come back as `ProcessError`.
    pub async fn execute(&self, input: &str, is_debug: bool) -> ExecutionResult {
        if let Err(message) = validate_input(input, is_debug) {
            return ExecutionResult::ValidationError { message };
        }

        let started = Instant::now();
        match self.run(input, is_debug).await {
            Ok(output) => classify(output, started.elapsed(), self.config.stderr_policy),
            Err(e) => {
                warn!(error = %e, "Program run failed");
                ExecutionResult::ProcessError {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Spawn the program, feed `input` on stdin and collect both output
    /// streams. Stdin is written from its own task so a program that floods
    /// stdout before reading cannot deadlock us.
    pub async fn run(&self, input: &str, is_debug: bool) -> Result<ProcessOutput, RunError> {
        let argv = self.command_line(is_debug);
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg(debug_flag(is_debug))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        info!(command = ?argv, debug = is_debug, input_len = input.len(), "Spawning program");
        let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
            program: self.config.program.clone(),
            source,
        })?;
        let pid = child.id();

        let stdin = child.stdin.take();
        let bytes = input.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&bytes).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), io::Error>(())
        });

        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(result) => result.map_err(RunError::Wait)?,
            Err(_) => {
                warn!(pid = ?pid, timeout = ?self.config.timeout, "Program timed out, killing");
                writer.abort();
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                return Err(RunError::Timeout(self.config.timeout));
            }
        };

        match writer.await {
            Ok(Ok(())) => {}
            // The program exited without reading all of its input.
            Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(RunError::Stdin(e)),
            Err(e) => return Err(RunError::Stdin(io::Error::other(e))),
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        info!(
            exit_code = ?output.status.code(),
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "Program finished"
        );

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: output.status.code(),
        })
    }
}

fn classify(output: ProcessOutput, elapsed: Duration, policy: StderrPolicy) -> ExecutionResult {
    let failed = match policy {
        StderrPolicy::AnyOutput => !output.stderr.is_empty(),
        StderrPolicy::NonZeroExit => output.exit_code != Some(0),
    };

    if !failed {
        return ExecutionResult::Success {
            output: output.stdout,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        };
    }

    let message = if output.stderr.is_empty() {
        match output.exit_code {
            Some(code) => format!("Program exited with status {code}"),
            None => "Program was terminated by a signal".to_string(),
        }
    } else {
        output.stderr
    };
    ExecutionResult::ProcessError { message }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        warn!(pid, error = %e, "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
