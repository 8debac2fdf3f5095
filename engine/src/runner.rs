//! Running the analysis tool as a child process.
//!
//! [`ProcessRunner::run`] returns immediately with a future for the finished
//! process and a paired abort handle. Firing the handle resolves the future
//! with [`ProcessError::Aborted`] and kills the child's whole process group.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use futures_util::FutureExt;
use futures_util::future::{AbortHandle, Abortable, BoxFuture};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::invocation::Invocation;

/// Why a process did not exit cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The program is missing or not executable.
    NotFound,
    ExitCode(i32),
    Aborted,
    Io(String),
}

/// Captured result of one process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub error: Option<ProcessError>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    #[must_use]
    pub fn failed(error: ProcessError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// A started run: its eventual output plus the handle that cancels it.
pub struct RunningProcess {
    pub output: BoxFuture<'static, ProcessOutput>,
    pub abort: AbortHandle,
}

impl RunningProcess {
    /// Pair `output` with a fresh abort handle.
    ///
    /// Aborting drops `output` (and with it anything it owns) and resolves
    /// the wrapper with [`ProcessError::Aborted`].
    pub fn abortable<F>(output: F) -> Self
    where
        F: Future<Output = ProcessOutput> + Send + 'static,
    {
        let (abort, registration) = AbortHandle::new_pair();
        let output = Abortable::new(output, registration)
            .map(|result| {
                result.unwrap_or_else(|_| ProcessOutput::failed(ProcessError::Aborted))
            })
            .boxed();
        Self { output, abort }
    }
}

impl fmt::Debug for RunningProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningProcess")
            .field("aborted", &self.abort.is_aborted())
            .finish_non_exhaustive()
    }
}

/// Starts one tool run with `stdin` piped in as the document text.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, invocation: &Invocation, stdin: String) -> RunningProcess;
}

/// Runs the tool with `tokio::process`.
///
/// Direct invocations split the configured command into program and leading
/// arguments. Shell invocations hand `<command> <quoted args>` to `sh -c`
/// (`cmd /C` on Windows), which is how wrapper commands like `bundle exec`
/// get their environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn run(&self, invocation: &Invocation, stdin: String) -> RunningProcess {
        RunningProcess::abortable(run_to_completion(invocation.clone(), stdin))
    }
}

async fn run_to_completion(invocation: Invocation, input: String) -> ProcessOutput {
    let mut command = match build_command(&invocation) {
        Ok(command) => command,
        Err(err) => return ProcessOutput::failed(err),
    };
    command
        .current_dir(&invocation.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::debug!(command = %invocation.command, "Spawn failed: {err}");
            return ProcessOutput::failed(spawn_error(&err));
        }
    };
    tracing::debug!(
        command = %invocation.command,
        pid = child.id(),
        cwd = %invocation.cwd.display(),
        "Started tool"
    );

    let mut guard = ChildGuard::new(child);
    let (stdin, stdout, stderr) = guard.take_pipes();
    let ((), stdout, stderr) = tokio::join!(feed(stdin, input), read_all(stdout), read_all(stderr));

    let error = match guard.wait().await {
        Ok(status) => exit_error(status),
        Err(err) => Some(ProcessError::Io(err.to_string())),
    };
    ProcessOutput {
        error,
        stdout,
        stderr,
    }
}

fn build_command(invocation: &Invocation) -> Result<Command, ProcessError> {
    if invocation.use_shell {
        let line = if invocation.args.is_empty() {
            invocation.command.clone()
        } else {
            format!(
                "{} {}",
                invocation.command,
                shell_words::join(&invocation.args)
            )
        };
        return Ok(shell_command(&line));
    }

    let words = shell_words::split(&invocation.command)
        .map_err(|err| ProcessError::Io(format!("cannot parse command line: {err}")))?;
    let Some((program, leading)) = words.split_first() else {
        return Err(ProcessError::NotFound);
    };
    let mut command = Command::new(resolve_program(program, &invocation.cwd));
    command.args(leading).args(&invocation.args);
    Ok(command)
}

/// Relative programs with a directory part (`bin/packwerk`) are looked up
/// from the working directory; bare names go through `PATH`.
fn resolve_program(program: &str, cwd: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        cwd.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

fn spawn_error(err: &io::Error) -> ProcessError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ProcessError::NotFound,
        _ => ProcessError::Io(err.to_string()),
    }
}

fn exit_error(status: ExitStatus) -> Option<ProcessError> {
    if status.success() {
        return None;
    }
    Some(match status.code() {
        Some(code) => ProcessError::ExitCode(code),
        None => ProcessError::Io(format!("process terminated ({status})")),
    })
}

async fn feed(stdin: Option<ChildStdin>, input: String) {
    let Some(mut pipe) = stdin else {
        return;
    };
    // Tools that exit without reading stdin close the pipe early.
    if let Err(err) = pipe.write_all(input.as_bytes()).await {
        tracing::debug!("Writing document to tool stdin failed: {err}");
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(err) = pipe.read_to_end(&mut buf).await {
        tracing::debug!("Reading tool output failed: {err}");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Kills the child (and its process group on Unix) unless it has been reaped.
///
/// Dropping the run future mid-flight, which is what an abort does, drops
/// the guard and takes the whole tree down with it.
struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    fn take_pipes(&mut self) -> (Option<ChildStdin>, Option<ChildStdout>, Option<ChildStderr>) {
        match self.child.as_mut() {
            Some(child) => (child.stdin.take(), child.stdout.take(), child.stderr.take()),
            None => (None, None, None),
        }
    }

    /// Wait for exit, then disarm.
    async fn wait(&mut self) -> io::Result<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            return Err(io::Error::other("child already reaped"));
        };
        let status = child.wait().await?;
        self.child = None;
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                unsafe {
                    if libc::killpg(pid as i32, libc::SIGKILL) == -1 {
                        let _ = child.start_kill();
                    }
                }
            }
            let _ = child.try_wait();
        }
        #[cfg(windows)]
        {
            let _ = child.start_kill();
            let _ = child.try_wait();
        }
    }
}
