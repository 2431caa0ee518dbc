//! The task that owns one pipeline from resolution to teardown.
//!
//! 1. Query the target's resolution (cancellable).
//! 2. Create the channel resource and launch the process chain.
//! 3. Forward every stdout chunk of the terminal process, in order.
//! 4. On an exit event or a stop request: signal the live processes,
//!    remove the channel, emit `Stopped`.
//!
//! Events go through a bounded queue. A send waits for room, so a slow
//! viewer stalls the output read and the process blocks on its pipe;
//! every send is raced against cancellation so a stop never waits on
//! the queue.
//!
//! Teardown never waits for a process to exit. Signalled processes are
//! handed to a detached reaper.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::channel::ChannelResource;
use super::command::{self, ProcessSpec};
use super::phase::{ExitAction, PipelinePhase, ProcessRole, on_process_exit};
use super::{PipelineConfig, PipelineEvent, PipelineId, PipelineOutcome, SessionEvent};
use crate::device::{Resolution, ResolutionResolver};
use crate::error::ScrwebError;
use crate::target::{StreamOptions, TargetId};

pub(super) struct Supervisor {
    pub(super) id: PipelineId,
    pub(super) target: TargetId,
    pub(super) options: StreamOptions,
    pub(super) config: Arc<PipelineConfig>,
    pub(super) resolver: ResolutionResolver,
    /// `Some` for the two-process topology.
    pub(super) channel_path: Option<PathBuf>,
    pub(super) events: mpsc::Sender<SessionEvent>,
    pub(super) phase: watch::Sender<PipelinePhase>,
    pub(super) cancel: CancellationToken,
}

/// The launched process chain.
struct Chain {
    /// The process whose stdout is the pipeline's output.
    terminal: Child,
    terminal_role: ProcessRole,
    output: ChildStdout,
    capture: Option<Child>,
    channel: Option<ChannelResource>,
}

enum Ending {
    Requested,
    Exited {
        role: ProcessRole,
        code: Option<i32>,
        failed: bool,
    },
}

impl Supervisor {
    pub(super) async fn run(self) -> PipelineOutcome {
        let resolution = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!(pipeline = %self.id, "stopped before spawn");
                self.transition(PipelinePhase::begin_stop);
                return self.end(None, false).await;
            }
            r = self.resolver.resolve(&self.target) => r,
        };

        match resolution {
            Some(r) => {
                info!(pipeline = %self.id, target = %self.target, "display resolution {r}");
                self.emit(PipelineEvent::Resolved(r)).await;
            }
            None => debug!(
                pipeline = %self.id,
                target = %self.target,
                "resolution unavailable; input falls back to {}",
                Resolution::FALLBACK
            ),
        }

        self.transition(PipelinePhase::begin_spawn);
        let chain = match self.launch() {
            Ok(chain) => chain,
            Err(e) => {
                warn!(pipeline = %self.id, "spawn failed: {e}");
                self.transition(PipelinePhase::begin_stop);
                self.transition(|p| p.finish(true));
                self.emit(PipelineEvent::SpawnFailed {
                    message: e.to_string(),
                })
                .await;
                return PipelineOutcome {
                    phase: PipelinePhase::Failed,
                    exit_code: None,
                };
            }
        };

        self.supervise(chain).await
    }

    // ── Launch ───────────────────────────────────────────────────

    fn launch(&self) -> Result<Chain, ScrwebError> {
        let Some(path) = self.channel_path.clone() else {
            let spec = command::virtual_source_spec(&self.config);
            let (terminal, output) = self.spawn_terminal(&spec, ProcessRole::Source)?;
            return Ok(Chain {
                terminal,
                terminal_role: ProcessRole::Source,
                output,
                capture: None,
                channel: None,
            });
        };

        let channel = ChannelResource::create(path)?;

        let spec = command::capture_spec(&self.config, &self.target, &self.options, channel.path());
        let mut capture = self.spawn_process(&spec, ProcessRole::Capture)?;
        // The capture client logs to stdout too; keep it out of the media path.
        if let Some(stdout) = capture.stdout.take() {
            self.log_diagnostics(stdout, ProcessRole::Capture);
        }

        let spec = command::transcode_spec(&self.config, channel.path());
        let (terminal, output) = match self.spawn_terminal(&spec, ProcessRole::Transcode) {
            Ok(pair) => pair,
            Err(e) => {
                self.terminate(&mut capture, ProcessRole::Capture);
                self.reap(capture, ProcessRole::Capture);
                return Err(e);
            }
        };

        Ok(Chain {
            terminal,
            terminal_role: ProcessRole::Transcode,
            output,
            capture: Some(capture),
            channel: Some(channel),
        })
    }

    fn spawn_process(&self, spec: &ProcessSpec, role: ProcessRole) -> Result<Child, ScrwebError> {
        debug!(
            pipeline = %self.id,
            process = %role,
            program = %spec.program_name(),
            args = ?spec.args,
            "spawning"
        );
        let mut child = spec.command().spawn().map_err(|source| ScrwebError::Spawn {
            program: spec.program_name(),
            source,
        })?;
        if let Some(stderr) = child.stderr.take() {
            self.log_diagnostics(stderr, role);
        }
        Ok(child)
    }

    fn spawn_terminal(
        &self,
        spec: &ProcessSpec,
        role: ProcessRole,
    ) -> Result<(Child, ChildStdout), ScrwebError> {
        let mut child = self.spawn_process(spec, role)?;
        match child.stdout.take() {
            Some(output) => Ok((child, output)),
            None => {
                self.terminate(&mut child, role);
                self.reap(child, role);
                Err(ScrwebError::MissingPipe(role.as_str()))
            }
        }
    }

    /// Copy a process's diagnostic stream into the log, line by line.
    fn log_diagnostics<R>(&self, reader: R, role: ProcessRole)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let id = self.id;
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        let text = text.trim();
                        if !text.is_empty() {
                            debug!(pipeline = %id, process = %role, "{text}");
                        }
                    }
                    Err(e) => {
                        trace!(pipeline = %id, process = %role, "diagnostic stream closed: {e}");
                        break;
                    }
                }
            }
        });
    }

    // ── Supervision ──────────────────────────────────────────────

    async fn supervise(&self, mut chain: Chain) -> PipelineOutcome {
        let chunk_size = self.config.read_chunk_size.max(1);
        let mut buf = BytesMut::with_capacity(chunk_size);
        let mut output_open = true;
        let mut terminal_live = true;
        let mut capture_live = chain.capture.is_some();

        // Output already produced is read before exit events are handled.
        let ending = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Ending::Requested,
                read = read_chunk(&mut chain.output, &mut buf, chunk_size), if output_open => {
                    match read {
                        Some(chunk) => {
                            self.forward(chunk).await;
                        }
                        None => output_open = false,
                    }
                }
                status = wait_for(chain.capture.as_mut()), if capture_live => {
                    capture_live = false;
                    let code = self.exit_code(ProcessRole::Capture, status);
                    let action = on_process_exit(ProcessRole::Capture, code);
                    if let ExitAction::TearDown { failed } = action {
                        break Ending::Exited { role: ProcessRole::Capture, code, failed };
                    }
                }
                status = chain.terminal.wait(), if terminal_live => {
                    terminal_live = false;
                    let role = chain.terminal_role;
                    let code = self.exit_code(role, status);
                    if let ExitAction::TearDown { failed } = on_process_exit(role, code) {
                        break Ending::Exited { role, code, failed };
                    }
                }
            }
        };

        let (exit_code, failed, drain) = match ending {
            Ending::Requested => {
                info!(pipeline = %self.id, "stop requested");
                (None, false, false)
            }
            Ending::Exited { role, code, failed } => {
                info!(
                    pipeline = %self.id,
                    process = %role,
                    ?code,
                    failed,
                    "process exit ends pipeline"
                );
                (code, failed, true)
            }
        };

        if capture_live {
            if let Some(capture) = chain.capture.as_mut() {
                self.terminate(capture, ProcessRole::Capture);
            }
        }
        if terminal_live {
            self.terminate(&mut chain.terminal, chain.terminal_role);
        }
        drop(chain.channel.take());

        // Still Spawning or Streaming, so a first chunk found here marks
        // the stream as started.
        if drain && output_open {
            self.drain(&mut chain.output, &mut buf, chunk_size).await;
        }
        self.transition(PipelinePhase::begin_stop);

        if let Some(capture) = chain.capture.take() {
            if capture_live {
                self.reap(capture, ProcessRole::Capture);
            }
        }
        if terminal_live {
            self.reap(chain.terminal, chain.terminal_role);
        }

        self.end(exit_code, failed).await
    }

    /// Forward whatever the terminal process still has buffered, bounded
    /// by the drain timeout.
    async fn drain(&self, output: &mut ChildStdout, buf: &mut BytesMut, chunk_size: usize) {
        let drained = tokio::time::timeout(self.config.drain_timeout, async {
            while let Some(chunk) = read_chunk(&mut *output, &mut *buf, chunk_size).await {
                if !self.forward(chunk).await {
                    break;
                }
            }
        })
        .await;
        if drained.is_err() {
            debug!(pipeline = %self.id, "output drain timed out");
        }
    }

    /// Returns `false` once nothing more can be delivered.
    async fn forward(&self, chunk: Bytes) -> bool {
        if matches!(*self.phase.borrow(), PipelinePhase::Spawning) {
            self.transition(PipelinePhase::mark_streaming);
            info!(pipeline = %self.id, "streaming");
            if !self.emit(PipelineEvent::Streaming).await {
                return false;
            }
        }
        trace!(pipeline = %self.id, len = chunk.len(), "chunk");
        self.emit(PipelineEvent::Chunk(chunk)).await
    }

    // ── Helpers ──────────────────────────────────────────────────

    async fn end(&self, exit_code: Option<i32>, failed: bool) -> PipelineOutcome {
        self.transition(|p| p.finish(failed));
        let stopped = PipelineEvent::Stopped { exit_code, failed };
        if self.cancel.is_cancelled() {
            // The stopper reports the outcome itself; this copy is best effort.
            self.offer(stopped);
        } else {
            self.emit(stopped).await;
        }
        PipelineOutcome {
            phase: if failed {
                PipelinePhase::Failed
            } else {
                PipelinePhase::Stopped
            },
            exit_code,
        }
    }

    fn exit_code(&self, role: ProcessRole, status: io::Result<ExitStatus>) -> Option<i32> {
        match status {
            Ok(status) => {
                info!(pipeline = %self.id, process = %role, "exited with {status}");
                status.code()
            }
            Err(e) => {
                warn!(pipeline = %self.id, process = %role, "wait failed: {e}");
                None
            }
        }
    }

    /// Send the termination signal and move on.
    fn terminate(&self, child: &mut Child, role: ProcessRole) {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            let Some(pid) = child.id() else {
                return;
            };
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => debug!(pipeline = %self.id, process = %role, pid, "sent SIGTERM"),
                Err(Errno::ESRCH) => {}
                Err(e) => warn!(pipeline = %self.id, process = %role, "failed to signal: {e}"),
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = child.start_kill() {
                warn!(pipeline = %self.id, process = %role, "failed to kill: {e}");
            }
        }
    }

    /// Collect a signalled process's exit status off the pipeline's path.
    fn reap(&self, mut child: Child, role: ProcessRole) {
        let id = self.id;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(pipeline = %id, process = %role, "reaped: {status}"),
                Err(e) => debug!(pipeline = %id, process = %role, "reap failed: {e}"),
            }
        });
    }

    fn transition(&self, f: impl FnOnce(&mut PipelinePhase) -> Result<(), ScrwebError>) {
        let id = self.id;
        self.phase.send_modify(|phase| {
            if let Err(e) = f(phase) {
                warn!(pipeline = %id, "{e}");
            }
        });
    }

    /// Queue an event, waiting for room unless the pipeline is cancelled.
    ///
    /// Returns `false` if cancelled first or the session is gone.
    async fn emit(&self, event: PipelineEvent) -> bool {
        let event = SessionEvent {
            pipeline: self.id,
            event,
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }

    /// Queue an event only if there is room right now.
    fn offer(&self, event: PipelineEvent) {
        let event = SessionEvent {
            pipeline: self.id,
            event,
        };
        if let Err(e) = self.events.try_send(event) {
            trace!(pipeline = %self.id, "event not queued: {e}");
        }
    }
}

async fn wait_for(child: Option<&mut Child>) -> io::Result<ExitStatus> {
    match child {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}

async fn read_chunk(
    output: &mut ChildStdout,
    buf: &mut BytesMut,
    chunk_size: usize,
) -> Option<Bytes> {
    buf.reserve(chunk_size);
    match output.read_buf(buf).await {
        Ok(0) => None,
        Ok(_) => Some(buf.split().freeze()),
        Err(e) => {
            debug!("output read failed: {e}");
            None
        }
    }
}
