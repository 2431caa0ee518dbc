//! Session registry: one [`Session`] per client connection, each owning
//! at most one live [`Pipeline`].
//!
//! A session is mutated only by its own connection task, so lifecycle
//! operations on it are naturally sequential. The only state shared
//! across sessions is a pair of atomic counters.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::device::{
    DeviceCommandExecutor, DeviceConfig, DeviceShell, Resolution, ResolutionResolver,
};
use crate::pipeline::{
    Pipeline, PipelineConfig, PipelineEvent, PipelineId, PipelineOutcome, SessionEvent,
};
use crate::protocol::ServerMessage;
use crate::target::{StreamOptions, TargetId};

// ── ConnectionId ─────────────────────────────────────────────────

/// Identity of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ── SessionRegistry ──────────────────────────────────────────────

struct Shared {
    pipeline_config: Arc<PipelineConfig>,
    resolver: ResolutionResolver,
    executor: DeviceCommandExecutor,
    next_connection: AtomicU64,
    next_pipeline: AtomicU64,
    active: AtomicUsize,
}

/// Opens sessions and hands out the collaborators they share.
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<Shared>,
}

impl SessionRegistry {
    pub fn new(
        pipeline_config: PipelineConfig,
        device_config: &DeviceConfig,
        shell: Arc<dyn DeviceShell>,
    ) -> Self {
        let resolver = ResolutionResolver::new(Arc::clone(&shell), device_config);
        let executor = DeviceCommandExecutor::new(shell);
        Self {
            shared: Arc::new(Shared {
                pipeline_config: Arc::new(pipeline_config),
                resolver,
                executor,
                next_connection: AtomicU64::new(1),
                next_pipeline: AtomicU64::new(1),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Open a session for a new connection.
    ///
    /// The receiver yields every event of the session's pipelines; feed
    /// each one to [`Session::accept`]. It holds at most
    /// `event_queue_depth` events, and a pipeline stops reading output
    /// while it is full.
    pub fn open(&self) -> (Session, mpsc::Receiver<SessionEvent>) {
        let id = ConnectionId(self.shared.next_connection.fetch_add(1, Ordering::Relaxed));
        let active = self.shared.active.fetch_add(1, Ordering::SeqCst) + 1;
        let depth = self.shared.pipeline_config.event_queue_depth.max(1);
        let (events, rx) = mpsc::channel(depth);
        info!(session = %id, active, "session opened");

        let session = Session {
            id,
            registry: self.clone(),
            target: None,
            resolution: None,
            pipeline: None,
            forwarding: None,
            events,
        };
        (session, rx)
    }

    /// Number of sessions not yet dropped.
    pub fn active_sessions(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn executor(&self) -> &DeviceCommandExecutor {
        &self.shared.executor
    }

    pub fn resolver(&self) -> &ResolutionResolver {
        &self.shared.resolver
    }

    fn next_pipeline_id(&self) -> PipelineId {
        PipelineId::new(self.shared.next_pipeline.fetch_add(1, Ordering::Relaxed))
    }
}

// ── Session ──────────────────────────────────────────────────────

/// Per-connection stream state.
pub struct Session {
    id: ConnectionId,
    registry: SessionRegistry,
    target: Option<TargetId>,
    resolution: Option<Resolution>,
    pipeline: Option<Pipeline>,
    /// Pipeline whose events reach the client.
    forwarding: Option<PipelineId>,
    events: mpsc::Sender<SessionEvent>,
}

impl Session {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn target(&self) -> Option<&TargetId> {
        self.target.as_ref()
    }

    /// Last resolution reported for the current target.
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }

    /// Replace any running pipeline with a new one for `target`.
    ///
    /// The previous pipeline is fully torn down (processes signalled,
    /// channel resource removed) before the new one is created, and its
    /// remaining events are no longer forwarded.
    pub async fn start_stream(&mut self, target: TargetId, options: StreamOptions) -> PipelineId {
        if let Some(previous) = self.pipeline.take() {
            info!(session = %self.id, pipeline = %previous.id(), "replacing pipeline");
            previous.stop().await;
        }

        if self.target.as_ref() != Some(&target) {
            self.resolution = None;
        }

        let registry = &self.registry.shared;
        if !registry.resolver.is_virtual(&target) {
            registry.executor.wake(&target);
        }

        let id = self.registry.next_pipeline_id();
        let pipeline = Pipeline::spawn(
            id,
            target.clone(),
            options,
            Arc::clone(&registry.pipeline_config),
            registry.resolver.clone(),
            self.events.clone(),
        );

        self.target = Some(target);
        self.forwarding = Some(id);
        self.pipeline = Some(pipeline);
        id
    }

    /// Stop the running pipeline, if any. Idempotent.
    ///
    /// Events still queued for it, including its own `Stopped`, are no
    /// longer forwarded; the caller reports the returned outcome.
    pub async fn stop_stream(&mut self) -> Option<PipelineOutcome> {
        let pipeline = self.pipeline.take()?;
        self.forwarding = None;
        info!(session = %self.id, pipeline = %pipeline.id(), "stopping pipeline");
        Some(pipeline.stop().await)
    }

    /// Tear down for a closed connection. Nothing is forwarded afterwards.
    pub async fn on_disconnect(mut self) -> Option<PipelineOutcome> {
        self.forwarding = None;
        let outcome = match self.pipeline.take() {
            Some(pipeline) => Some(pipeline.stop().await),
            None => None,
        };
        info!(session = %self.id, "session closed");
        outcome
    }

    /// Apply a pipeline event and translate it into an outbound message.
    ///
    /// Events from replaced pipelines are dropped.
    pub fn accept(&mut self, event: SessionEvent) -> Option<ServerMessage> {
        if self.forwarding != Some(event.pipeline) {
            trace!(session = %self.id, pipeline = %event.pipeline, "dropping stale event");
            return None;
        }

        match event.event {
            PipelineEvent::Resolved(resolution) => {
                self.resolution = Some(resolution);
                None
            }
            PipelineEvent::Streaming => {
                debug!(session = %self.id, pipeline = %event.pipeline, "first chunk");
                None
            }
            PipelineEvent::Chunk(bytes) => Some(ServerMessage::VideoData(bytes)),
            PipelineEvent::Stopped { exit_code, .. } => {
                self.release(event.pipeline);
                Some(ServerMessage::StreamStopped { exit_code })
            }
            PipelineEvent::SpawnFailed { message } => {
                self.release(event.pipeline);
                Some(ServerMessage::StreamError { message })
            }
        }
    }

    fn release(&mut self, id: PipelineId) {
        self.forwarding = None;
        if self.pipeline.as_ref().is_some_and(|p| p.id() == id) {
            self.pipeline = None;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.registry.shared.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("resolution", &self.resolution)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
