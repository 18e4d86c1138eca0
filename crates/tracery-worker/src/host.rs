//! Worker host: runs each trace request on its own thread and streams
//! responses back over a single channel.
//!
//! Every request owns a [`Slot`] holding its [`RequestPhase`]. Anything
//! sent for a request (progress, result, error, cancelled) is sent while
//! that slot's phase lock is held and only if the phase is not yet
//! terminal. A cancel takes the same lock, sends `cancelled` and marks
//! the phase terminal, so nothing for that id can follow it.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, info, trace, warn};

use tracery_export::{SvgMetadata, TraceResult, render};
use tracery_pipeline::{Bitmap, ProgressSink, Stage, TraceError, TraceOptions};

use crate::protocol::{Request, Response};

/// Lifecycle of one request, in order. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestPhase {
    Received,
    Tracing,
    Simplifying,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl RequestPhase {
    /// Phase a request is in while the pipeline reports `stage`.
    #[must_use]
    pub const fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Decode | Stage::Preprocess | Stage::Trace => Self::Tracing,
            Stage::Simplify => Self::Simplifying,
            Stage::Finalize => Self::Finalizing,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Runs a trace to completion on the calling thread.
///
/// The host calls this from a dedicated worker thread. Implementations
/// should poll `progress.is_cancelled()` at convenient points and return
/// [`TraceError::Cancelled`] when it turns true.
pub trait TraceEngine: Send + Sync {
    /// # Errors
    ///
    /// Any [`TraceError`]; the host turns it into an `error` response.
    fn run(
        &self,
        bitmap: &Bitmap,
        options: &TraceOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<TraceResult, TraceError>;
}

/// The tracery pipeline followed by SVG export.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineEngine;

impl TraceEngine for PipelineEngine {
    fn run(
        &self,
        bitmap: &Bitmap,
        options: &TraceOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<TraceResult, TraceError> {
        let document = tracery_pipeline::trace_with_progress(bitmap, options, progress)?;
        let options_json = serde_json::to_string(options)
            .map_err(|e| TraceError::InternalFailure(format!("serializing options: {e}")))?;
        let metadata = SvgMetadata {
            options_json: Some(&options_json),
            ..SvgMetadata::default()
        };
        Ok(render(&document, &metadata))
    }
}

/// Per-request state shared between the host and the worker thread.
#[derive(Debug)]
struct Slot {
    phase: Mutex<RequestPhase>,
    cancelled: AtomicBool,
}

impl Slot {
    fn new() -> Self {
        Self {
            phase: Mutex::new(RequestPhase::Received),
            cancelled: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RequestPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase(&self) -> RequestPhase {
        *self.lock()
    }

    /// Send a progress update unless the request already ended.
    fn progress(&self, tx: &Sender<Response>, response: Response, stage: Stage) {
        let mut phase = self.lock();
        if phase.is_terminal() {
            trace!(id = response.id(), "suppressed late progress");
            return;
        }
        // Multiband traces revisit earlier stages once per band.
        let next = RequestPhase::for_stage(stage);
        if next > *phase {
            debug!(id = response.id(), from = ?*phase, to = ?next, "phase transition");
            *phase = next;
        }
        send(tx, response);
    }

    /// Move to a terminal phase and send `response`, unless the request
    /// already ended. Returns whether anything was sent.
    fn finish(&self, tx: &Sender<Response>, terminal: RequestPhase, response: Response) -> bool {
        let mut phase = self.lock();
        if phase.is_terminal() {
            debug!(id = response.id(), phase = ?*phase, "suppressed late terminal response");
            return false;
        }
        *phase = terminal;
        send(tx, response);
        true
    }

    /// Cancel the request: raise the flag and send exactly one
    /// `cancelled`. Returns false if the request had already ended.
    fn cancel(&self, tx: &Sender<Response>, id: &str) -> bool {
        let mut phase = self.lock();
        if phase.is_terminal() {
            return false;
        }
        self.cancelled.store(true, Ordering::Relaxed);
        *phase = RequestPhase::Cancelled;
        send(tx, Response::Cancelled { id: id.to_owned() });
        true
    }
}

fn send(tx: &Sender<Response>, response: Response) {
    if tx.send(response).is_err() {
        debug!("response receiver dropped");
    }
}

/// Adapts a request's slot and the response channel to the pipeline's
/// progress seam.
struct ChannelSink<'a> {
    id: &'a str,
    slot: &'a Slot,
    tx: &'a Sender<Response>,
}

impl ProgressSink for ChannelSink<'_> {
    fn report(&mut self, stage: Stage, fraction: f64, message: Option<&str>) {
        let response = Response::Progress {
            id: self.id.to_owned(),
            stage,
            progress: fraction.clamp(0.0, 1.0),
            message: message.map(str::to_owned),
        };
        self.slot.progress(self.tx, response, stage);
    }

    fn is_cancelled(&self) -> bool {
        self.slot.cancelled.load(Ordering::Relaxed)
    }
}

type Registry = Arc<Mutex<HashMap<String, Arc<Slot>>>>;

fn lock_registry(registry: &Registry) -> MutexGuard<'_, HashMap<String, Arc<Slot>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Accepts [`Request`]s and emits [`Response`]s on the channel returned
/// at construction.
///
/// Requests with distinct ids run concurrently, one thread each.
pub struct WorkerHost {
    engine: Arc<dyn TraceEngine>,
    tx: Sender<Response>,
    registry: Registry,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerHost {
    /// Host running the real pipeline.
    #[must_use]
    pub fn new() -> (Self, Receiver<Response>) {
        Self::with_engine(Arc::new(PipelineEngine))
    }

    /// Host running `engine`.
    #[must_use]
    pub fn with_engine(engine: Arc<dyn TraceEngine>) -> (Self, Receiver<Response>) {
        let (tx, rx) = mpsc::channel();
        let host = Self {
            engine,
            tx,
            registry: Arc::new(Mutex::new(HashMap::new())),
            workers: Mutex::new(Vec::new()),
        };
        (host, rx)
    }

    /// Number of requests that have not reached a terminal response.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        lock_registry(&self.registry)
            .values()
            .filter(|slot| !slot.phase().is_terminal())
            .count()
    }

    /// Dispatch one request.
    pub fn handle(&self, request: Request) {
        match request {
            Request::Trace {
                id,
                bitmap,
                options,
            } => self.start(id, bitmap.decode(), options),
            Request::Cancel { id } => self.cancel(&id),
        }
    }

    /// Parse and dispatch one JSON line.
    ///
    /// Lines that fail to parse are answered with an `error` response
    /// when an id can be recovered, and only logged otherwise.
    pub fn handle_line(&self, line: &str) {
        match Request::from_json(line) {
            Ok(request) => self.handle(request),
            Err(e) => {
                let reason = TraceError::MalformedRequest(e.source.to_string());
                if let Some(id) = e.id {
                    self.reject(id, &reason);
                } else {
                    warn!(error = %e, "dropping request without an id");
                }
            }
        }
    }

    fn start(&self, id: String, bitmap: Result<Bitmap, TraceError>, options: TraceOptions) {
        info!(%id, mode = ?options.mode, "trace request received");

        let bitmap = match bitmap.and_then(|b| options.validate().map(|()| b)) {
            Ok(bitmap) => bitmap,
            Err(e) => {
                self.reject(id, &e);
                return;
            }
        };

        let slot = Arc::new(Slot::new());
        {
            let mut registry = lock_registry(&self.registry);
            if registry
                .get(&id)
                .is_some_and(|existing| !existing.phase().is_terminal())
            {
                warn!(%id, "dropping duplicate request for an in-flight id");
                return;
            }
            registry.insert(id.clone(), Arc::clone(&slot));
        }

        let worker = Worker {
            id: id.clone(),
            slot: Arc::clone(&slot),
            engine: Arc::clone(&self.engine),
            tx: self.tx.clone(),
            registry: Arc::clone(&self.registry),
        };
        let spawned = thread::Builder::new()
            .name(format!("trace-{id}"))
            .spawn(move || worker.run(&bitmap, &options));

        match spawned {
            Ok(handle) => {
                let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
                workers.retain(|h| !h.is_finished());
                workers.push(handle);
            }
            Err(e) => {
                error!(%id, error = %e, "failed to spawn worker thread");
                let failure = TraceError::InternalFailure(format!("spawning worker: {e}"));
                slot.finish(&self.tx, RequestPhase::Failed, Response::error(id.clone(), &failure));
                lock_registry(&self.registry).remove(&id);
            }
        }
    }

    /// Answer a request that will not run with an `error`, unless its id
    /// belongs to a running trace. That trace owns the id's one terminal
    /// response, so the rejected request is only logged.
    fn reject(&self, id: String, e: &TraceError) {
        let busy = lock_registry(&self.registry)
            .get(&id)
            .is_some_and(|slot| !slot.phase().is_terminal());
        if busy {
            warn!(%id, error = %e, "dropping rejected request for an in-flight id");
        } else {
            warn!(%id, error = %e, "rejecting request");
            send(&self.tx, Response::error(id, e));
        }
    }

    fn cancel(&self, id: &str) {
        let slot = lock_registry(&self.registry).get(id).cloned();
        let Some(slot) = slot else {
            debug!(%id, "cancel for unknown request ignored");
            return;
        };
        if slot.cancel(&self.tx, id) {
            info!(%id, "trace cancelled");
        } else {
            debug!(%id, "cancel for finished request ignored");
        }
    }

    /// Wait for every worker thread to finish, then drop the host.
    ///
    /// Once this returns and all other senders are gone, the response
    /// receiver drains and closes.
    pub fn join(self) {
        let workers = self
            .workers
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        for handle in workers {
            if handle.join().is_err() {
                error!("worker thread panicked outside the engine");
            }
        }
    }
}

/// Everything a worker thread owns.
struct Worker {
    id: String,
    slot: Arc<Slot>,
    engine: Arc<dyn TraceEngine>,
    tx: Sender<Response>,
    registry: Registry,
}

impl Worker {
    fn run(self, bitmap: &Bitmap, options: &TraceOptions) {
        let started = Instant::now();
        let mut sink = ChannelSink {
            id: &self.id,
            slot: &self.slot,
            tx: &self.tx,
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.engine.run(bitmap, options, &mut sink)
        }))
        .unwrap_or_else(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "engine panicked".to_owned());
            Err(TraceError::InternalFailure(reason))
        });

        let elapsed = started.elapsed();
        let id = self.id.clone();
        let sent = match outcome {
            Ok(result) => {
                let (paths, nodes) = (result.path_count, result.node_count);
                let sent = self
                    .slot
                    .finish(&self.tx, RequestPhase::Completed, Response::Result { id, result });
                if sent {
                    info!(id = %self.id, ?elapsed, paths, nodes, "trace completed");
                }
                sent
            }
            // The cancel path already sent `cancelled`.
            Err(TraceError::Cancelled) => false,
            Err(e) => {
                let sent = self
                    .slot
                    .finish(&self.tx, RequestPhase::Failed, Response::error(id, &e));
                if sent {
                    warn!(id = %self.id, ?elapsed, error = %e, "trace failed");
                }
                sent
            }
        };
        if !sent {
            debug!(id = %self.id, ?elapsed, "worker finished after cancellation");
        }

        let mut registry = lock_registry(&self.registry);
        if registry
            .get(&self.id)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot))
        {
            registry.remove(&self.id);
        }
    }
}
