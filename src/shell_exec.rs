//! External command execution.
//!
//! Every git and provider call goes through [`Cmd`], which logs the command,
//! bounds concurrency with a process-wide semaphore, emits a timing trace line
//! and, when given a [`Cancellation`], kills the child as soon as the token
//! trips.

use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use crate::sync::{Cancellation, Semaphore};

/// Semaphore to limit concurrent command execution.
static CMD_SEMAPHORE: OnceLock<Semaphore> = OnceLock::new();

/// Monotonic epoch for trace timestamps.
static TRACE_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Default concurrent external commands. Keeps webhook bursts from spawning
/// one curl per changed ref all at once.
const DEFAULT_CONCURRENT_COMMANDS: usize = 32;

/// How often a running child is polled for exit and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn trace_epoch() -> &'static Instant {
    TRACE_EPOCH.get_or_init(Instant::now)
}

fn max_concurrent_commands() -> usize {
    std::env::var("HEADSYNC_MAX_CONCURRENT_COMMANDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_CONCURRENT_COMMANDS)
}

fn get_semaphore() -> &'static Semaphore {
    CMD_SEMAPHORE.get_or_init(|| Semaphore::new(max_concurrent_commands()))
}

/// Extract numeric thread ID from ThreadId's debug format ("ThreadId(N)").
fn thread_id_number() -> u64 {
    let debug_str = format!("{:?}", thread::current().id());
    debug_str
        .strip_prefix("ThreadId(")
        .and_then(|s| s.strip_suffix(")"))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Builder for executing commands with logging, tracing and cancellation.
///
/// ```ignore
/// let output = Cmd::new("git")
///     .args(["rev-parse", "--verify", "--quiet", "abc123^{commit}"])
///     .current_dir(&repo_path)
///     .run_cancellable(&cancel)?;
/// ```
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    context: Option<String>,
    stdin_data: Option<Vec<u8>>,
    envs: Vec<(String, String)>,
    env_removes: Vec<String>,
    /// Arguments that must not appear in logs (tokens, auth headers).
    redact: Vec<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            context: None,
            stdin_data: None,
            envs: Vec::new(),
            env_removes: Vec::new(),
            redact: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an argument that is replaced by `***` in logs.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        let arg = arg.into();
        self.redact.push(arg.clone());
        self.args.push(arg);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set the logging context (repository or ref the command is about).
    pub fn context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin_data = Some(data.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.envs.push((key.into(), val.into()));
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_removes.push(key.into());
        self
    }

    /// The program this command runs.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments collected so far.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Data fed to the child's stdin, if any.
    pub fn get_stdin(&self) -> Option<&[u8]> {
        self.stdin_data.as_deref()
    }

    fn display_string(&self) -> String {
        let args: Vec<&str> = self
            .args
            .iter()
            .map(|a| {
                if self.redact.contains(a) {
                    "***"
                } else {
                    a.as_str()
                }
            })
            .collect();
        if args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, args.join(" "))
        }
    }

    /// Execute the command and return its output.
    pub fn run(self) -> std::io::Result<Output> {
        self.execute(None)
    }

    /// Execute the command, killing it if `cancel` trips before it exits.
    ///
    /// Returns an error of kind [`ErrorKind::Interrupted`] when cancelled,
    /// including when the token was already set before the process started.
    pub fn run_cancellable(self, cancel: &Cancellation) -> std::io::Result<Output> {
        self.execute(Some(cancel))
    }

    fn execute(self, cancel: Option<&Cancellation>) -> std::io::Result<Output> {
        let cmd_str = self.display_string();
        match &self.context {
            Some(ctx) => log::debug!("$ {} [{}]", cmd_str, ctx),
            None => log::debug!("$ {}", cmd_str),
        }

        if cancel.is_some_and(Cancellation::is_cancelled) {
            return Err(interrupted());
        }

        let _guard = get_semaphore().acquire();

        let t0 = Instant::now();
        let ts = t0.duration_since(*trace_epoch()).as_micros() as u64;
        let tid = thread_id_number();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, val) in &self.envs {
            cmd.env(key, val);
        }
        for key in &self.env_removes {
            cmd.env_remove(key);
        }

        let result = spawn_and_wait(&mut cmd, self.stdin_data, cancel);

        let dur_us = t0.elapsed().as_micros() as u64;
        let ctx = self.context.as_deref().unwrap_or("-");
        match &result {
            Ok(output) => log::debug!(
                "[hs-trace] ts={} tid={} context={} cmd=\"{}\" dur_us={} ok={}",
                ts,
                tid,
                ctx,
                cmd_str,
                dur_us,
                output.status.success()
            ),
            Err(e) => log::debug!(
                "[hs-trace] ts={} tid={} context={} cmd=\"{}\" dur_us={} err=\"{}\"",
                ts,
                tid,
                ctx,
                cmd_str,
                dur_us,
                e
            ),
        }

        result
    }
}

fn interrupted() -> std::io::Error {
    std::io::Error::new(ErrorKind::Interrupted, "operation cancelled")
}

/// Spawn with piped output, feed stdin, and wait while polling `cancel`.
///
/// Output is drained on background threads so a chatty child can't deadlock
/// on a full pipe while we poll.
fn spawn_and_wait(
    cmd: &mut Command,
    stdin_data: Option<Vec<u8>>,
    cancel: Option<&Cancellation>,
) -> std::io::Result<Output> {
    let stdin_mode = if stdin_data.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    let mut child = cmd
        .stdin(stdin_mode)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(data) = stdin_data
        && let Some(mut stdin) = child.stdin.take()
        && let Err(e) = stdin.write_all(&data)
        && e.kind() != ErrorKind::BrokenPipe
    {
        let _ = child.kill();
        let _ = child.wait();
        return Err(e);
    }

    let mut stdout_handle = child.stdout.take();
    let mut stderr_handle = child.stderr.take();
    let stdout_thread = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(ref mut handle) = stdout_handle {
            let _ = handle.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_thread = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(ref mut handle) = stderr_handle {
            let _ = handle.read_to_end(&mut buf);
        }
        buf
    });

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancel.is_some_and(Cancellation::is_cancelled) {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_thread.join();
            let _ = stderr_thread.join();
            return Err(interrupted());
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}
