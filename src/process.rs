use std::future::Future;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Bytes;
use futures_util::Stream;
use thiserror::Error;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Sleep;
use tracing::{debug, error, instrument, warn};

use crate::build_request::BuildMode;

/// The build tool, resolved against the working directory.
pub const BUILDBOT_PATH: &str = "./c3dlbuildbot";

const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("build process has no stdout pipe")]
    MissingStdout,
}

/// Launches the external build executable, one process per call.
pub struct BuildTrigger {
    program: PathBuf,
    slots: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
}

impl Default for BuildTrigger {
    fn default() -> Self {
        Self::new(BUILDBOT_PATH)
    }
}

impl BuildTrigger {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            slots: None,
            timeout: None,
        }
    }

    /// Queue builds beyond `limit` until a running one finishes.
    pub fn with_max_concurrent_builds(mut self, limit: NonZeroUsize) -> Self {
        self.slots = Some(Arc::new(Semaphore::new(limit.get())));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Starts a build and hands back its stdout as a stream.
    ///
    /// Failing to start the process is logged and produces an empty stream,
    /// so callers always have something to send.
    pub async fn run(&self, mode: BuildMode) -> BuildOutput {
        let permit = match &self.slots {
            // The semaphore is never closed.
            Some(slots) => slots.clone().acquire_owned().await.ok(),
            None => None,
        };

        match self.spawn(mode) {
            Ok((child, stdout)) => BuildOutput {
                mode,
                stdout: Some(stdout),
                child: Some(child),
                deadline: self.timeout.map(|t| Box::pin(tokio::time::sleep(t))),
                buf: vec![0; CHUNK_SIZE].into_boxed_slice(),
                streamed: 0,
                permit,
            },
            Err(e) => {
                error!(%mode, "Build did not start: {}", e);
                BuildOutput::empty(mode)
            }
        }
    }

    #[instrument(skip(self), fields(program = %self.program.display()))]
    fn spawn(&self, mode: BuildMode) -> Result<(Child, ChildStdout), BuildError> {
        let mut command = Command::new(&self.program);
        command
            .arg(mode.as_arg())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // Own process group, so a kill also reaches anything the tool forks.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|source| BuildError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(BuildError::MissingStdout)?;
        debug!(pid = ?child.id(), "Build process started");

        Ok((child, stdout))
    }
}

/// Stdout of a running build, chunk by chunk as the process writes it.
///
/// Owns the child process. Whichever way the stream ends (EOF, read error,
/// deadline, or being dropped mid-way) the process is reaped, and killed
/// first if it may still be running.
pub struct BuildOutput {
    mode: BuildMode,
    stdout: Option<ChildStdout>,
    child: Option<Child>,
    deadline: Option<Pin<Box<Sleep>>>,
    buf: Box<[u8]>,
    streamed: u64,
    permit: Option<OwnedSemaphorePermit>,
}

impl BuildOutput {
    fn empty(mode: BuildMode) -> Self {
        Self {
            mode,
            stdout: None,
            child: None,
            deadline: None,
            buf: Box::default(),
            streamed: 0,
            permit: None,
        }
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Bytes handed out so far.
    pub fn streamed(&self) -> u64 {
        self.streamed
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    fn finish(&mut self, kill: bool) {
        self.stdout = None;
        self.deadline = None;
        self.permit = None;

        if let Some(child) = self.child.take() {
            reap(child, self.mode, self.streamed, kill);
        }
    }
}

fn kill(child: &mut Child, mode: BuildMode) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => return,
                Err(e) => debug!(%mode, "Could not kill build process group: {}", e),
            }
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(%mode, "Could not kill build process: {}", e);
    }
}

fn reap(mut child: Child, mode: BuildMode, streamed: u64, kill_first: bool) {
    if kill_first {
        kill(&mut child, mode);
    }

    // Without a runtime, kill_on_drop is all we can do.
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };

    handle.spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => {
                debug!(%mode, bytes = streamed, "Build finished");
            }
            Ok(status) => {
                warn!(%mode, %status, bytes = streamed, "Build exited unsuccessfully");
            }
            Err(e) => {
                error!(%mode, "Failed to wait for build process: {}", e);
            }
        }
    });
}

impl Stream for BuildOutput {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(deadline) = this.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                warn!(mode = %this.mode, bytes = this.streamed, "Build timed out, killing process");
                this.finish(true);
                return Poll::Ready(None);
            }
        }

        let Some(stdout) = this.stdout.as_mut() else {
            return Poll::Ready(None);
        };

        let mut buf = ReadBuf::new(&mut this.buf);
        match Pin::new(stdout).poll_read(cx, &mut buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => {
                let filled = buf.filled();
                if filled.is_empty() {
                    this.finish(false);
                    return Poll::Ready(None);
                }
                this.streamed += filled.len() as u64;
                Poll::Ready(Some(Ok(Bytes::copy_from_slice(filled))))
            }
            Poll::Ready(Err(e)) => {
                // End the body cleanly with whatever was already sent.
                error!(mode = %this.mode, bytes = this.streamed, "Failed to read build output: {}", e);
                this.finish(true);
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for BuildOutput {
    fn drop(&mut self) {
        if self.child.is_some() {
            debug!(
                mode = %self.mode,
                bytes = self.streamed,
                "Build output dropped before completion, killing process"
            );
            self.finish(true);
        }
    }
}
