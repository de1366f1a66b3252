//! The top-level pipeline state machine
//!
//! Sequences initialization, streaming, pause/resume, error containment and
//! teardown, and emits every externally observable event. All asynchronous
//! continuations (batch timers, the breaker cooldown, recovery) carry the
//! generation counter they were spawned under and become no-ops once
//! `stop()` bumps it, so a timer can never act on a torn-down pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use signstream_types::{
    now_ms, ErrorRing, PipelineMetrics, PipelineStage, PipelineState, PipelineStatusSnapshot,
    StageError, TranscriptSegment, Translation,
};

use crate::batcher::{BatchScheduler, PushOutcome};
use crate::breaker::{BreakerVerdict, CircuitBreaker};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::events::{EventBus, PipelineEvent};
use crate::latency::LatencyController;
use crate::source::{SourceFactory, TranscriptSource};
use crate::translator::SignTranslator;

/// Check one lifecycle transition against the legal table.
///
/// Anything not listed is rejected by [`Inner::set_state`] with a warning,
/// never silently coerced.
fn transition_allowed(from: PipelineState, to: PipelineState) -> bool {
    use PipelineState::*;
    matches!(
        (from, to),
        (Idle, Initializing)
            | (Initializing, Ready)
            | (Initializing, Error)
            | (Ready, Streaming)
            | (Ready, Error)
            | (Streaming, Paused)
            | (Streaming, Error)
            | (Paused, Streaming)
            | (Paused, Error)
            | (Error, Recovering)
            | (Recovering, Streaming)
            | (Recovering, Error)
            | (Initializing, Stopping)
            | (Ready, Stopping)
            | (Streaming, Stopping)
            | (Paused, Stopping)
            | (Error, Stopping)
            | (Recovering, Stopping)
            | (Stopping, Idle)
    )
}

#[derive(Default)]
struct Counters {
    transcriptions_received: u64,
    words_transcribed: u64,
    signs_generated: u64,
    errors: u64,
    recoveries: u64,
    circuit_breaker_trips: u64,
}

#[derive(Default)]
struct TaskSet {
    segment: Option<JoinHandle<()>>,
    flush: Option<JoinHandle<()>>,
    metrics: Option<JoinHandle<()>>,
    cooldown: Option<JoinHandle<()>>,
}

impl TaskSet {
    fn abort_all(&mut self) {
        for handle in [
            self.segment.take(),
            self.flush.take(),
            self.metrics.take(),
            self.cooldown.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

struct Inner {
    config: PipelineConfig,
    events: EventBus,
    translator: Arc<dyn SignTranslator>,
    source_factory: SourceFactory,

    state: RwLock<PipelineState>,
    counters: Mutex<Counters>,
    errors: Mutex<ErrorRing>,
    batcher: Mutex<BatchScheduler>,
    latency: Mutex<LatencyController>,
    breaker: Mutex<CircuitBreaker>,
    source: Mutex<Option<Box<dyn TranscriptSource>>>,
    tasks: Mutex<TaskSet>,

    /// Current (possibly adapted) batch delay in ms.
    batch_delay_ms: AtomicU64,

    /// Bumped by `stop()`; stale continuations compare and bail.
    generation: AtomicU64,
}

/// Streaming orchestration pipeline: transcript in, sign directives out.
///
/// Construct one per interpretation session and inject the transcript
/// source factory and translator; there is no global instance.
pub struct SignPipeline {
    inner: Arc<Inner>,
}

impl SignPipeline {
    pub fn new(
        config: PipelineConfig,
        source_factory: SourceFactory,
        translator: Arc<dyn SignTranslator>,
    ) -> Self {
        let inner = Inner {
            batcher: Mutex::new(BatchScheduler::new(config.max_batch_size)),
            latency: Mutex::new(LatencyController::new(
                config.target_latency_ms,
                config.max_latency_ms,
                config.min_batch_delay_ms,
            )),
            breaker: Mutex::new(CircuitBreaker::new(
                config.circuit_breaker_threshold,
                config.circuit_breaker_timeout(),
            )),
            batch_delay_ms: AtomicU64::new(config.batch_delay_ms),
            config,
            events: EventBus::new(),
            translator,
            source_factory,
            state: RwLock::new(PipelineState::Idle),
            counters: Mutex::new(Counters::default()),
            errors: Mutex::new(ErrorRing::new()),
            source: Mutex::new(None),
            tasks: Mutex::new(TaskSet::default()),
            generation: AtomicU64::new(0),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Subscribe to the pipeline event channel.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        Inner::state(&self.inner)
    }

    pub fn metrics(&self) -> PipelineMetrics {
        Inner::metrics_snapshot(&self.inner)
    }

    pub fn status(&self) -> PipelineStatusSnapshot {
        Inner::status_snapshot(&self.inner)
    }

    pub fn recent_errors(&self) -> Vec<StageError> {
        self.inner.errors.lock().unwrap().snapshot()
    }

    /// The batch delay currently in effect, after any adaptive shrinking.
    pub fn current_batch_delay_ms(&self) -> u64 {
        self.inner.batch_delay_ms.load(Ordering::Relaxed)
    }

    /// Acquire the transcript source and wire up processing.
    ///
    /// Failure transitions to `error` with a non-recoverable audio-stage
    /// error and is returned to the caller.
    pub async fn initialize(&self) -> Result<()> {
        if !Inner::set_state(&self.inner, PipelineState::Initializing) {
            return Err(PipelineError::InvalidState(self.state()));
        }

        match Inner::acquire_source(&self.inner) {
            Ok(rx) => {
                let generation = self.inner.generation.load(Ordering::SeqCst);
                Inner::spawn_segment_task(&self.inner, generation, rx);
                if self.inner.config.enable_metrics {
                    Inner::spawn_metrics_task(&self.inner, generation);
                }
                Inner::set_state(&self.inner, PipelineState::Ready);
                info!("pipeline initialized");
                Ok(())
            }
            Err(e) => {
                let message = format!("source acquisition failed: {}", e);
                Inner::record_stage_error(&self.inner, PipelineStage::Audio, &message, false);
                Err(PipelineError::stage(PipelineStage::Audio, message, false))
            }
        }
    }

    /// Begin streaming. Initializes first when still idle; otherwise
    /// requires `ready` or `paused`.
    pub async fn start(&self) -> Result<()> {
        if self.state() == PipelineState::Idle {
            self.initialize().await?;
        }

        match self.state() {
            PipelineState::Ready => {
                Inner::set_state(&self.inner, PipelineState::Streaming);
                info!("streaming started");
                Ok(())
            }
            PipelineState::Paused => self.resume(),
            other => {
                warn!(state = %other, "start ignored");
                Err(PipelineError::InvalidState(other))
            }
        }
    }

    /// Suspend the transcript source without releasing resources.
    pub fn pause(&self) -> Result<()> {
        if self.state() != PipelineState::Streaming {
            warn!(state = %self.state(), "pause ignored");
            return Err(PipelineError::InvalidState(self.state()));
        }
        if let Some(source) = self.inner.source.lock().unwrap().as_mut() {
            source.pause()?;
        }
        Inner::set_state(&self.inner, PipelineState::Paused);
        Ok(())
    }

    /// Resume a paused pipeline.
    pub fn resume(&self) -> Result<()> {
        if self.state() != PipelineState::Paused {
            warn!(state = %self.state(), "resume ignored");
            return Err(PipelineError::InvalidState(self.state()));
        }
        if let Some(source) = self.inner.source.lock().unwrap().as_mut() {
            source.resume()?;
        }
        Inner::set_state(&self.inner, PipelineState::Streaming);
        Ok(())
    }

    /// Tear down: cancel every pending timer and task, release the source,
    /// reset batching state, return to `idle`. Idempotent.
    pub async fn stop(&self) {
        if self.state() == PipelineState::Idle {
            debug!("stop on idle pipeline is a no-op");
            return;
        }

        Inner::set_state(&self.inner, PipelineState::Stopping);

        // Invalidate every in-flight continuation before aborting tasks so
        // nothing observed mid-cancel can still apply its result.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.tasks.lock().unwrap().abort_all();

        if let Some(mut source) = self.inner.source.lock().unwrap().take() {
            if let Err(e) = source.stop() {
                warn!("source stop failed during teardown: {}", e);
            }
        }

        self.inner.batcher.lock().unwrap().clear();
        self.inner
            .batch_delay_ms
            .store(self.inner.config.batch_delay_ms, Ordering::Relaxed);
        self.inner.breaker.lock().unwrap().close();

        Inner::set_state(&self.inner, PipelineState::Idle);
        info!("pipeline stopped");
    }

    /// Report a stage error from a host-owned stage (e.g. rendering).
    ///
    /// The `recoverable` flag is assigned here by the call site, exactly as
    /// internal stages do; it is never inferred.
    pub fn report_error(&self, stage: PipelineStage, message: &str, recoverable: bool) {
        Inner::record_stage_error(&self.inner, stage, message, recoverable);
    }
}

impl Inner {
    fn state(inner: &Arc<Inner>) -> PipelineState {
        *inner.state.read().unwrap()
    }

    /// Apply a transition if the table allows it; warn and refuse otherwise.
    fn set_state(inner: &Arc<Inner>, to: PipelineState) -> bool {
        let mut state = inner.state.write().unwrap();
        let from = *state;
        if from == to {
            return true;
        }
        if !transition_allowed(from, to) {
            warn!(%from, %to, "ignoring illegal pipeline transition");
            return false;
        }
        *state = to;
        drop(state);
        debug!(%from, %to, "pipeline state change");
        inner.events.emit(PipelineEvent::StateChange { from, to });
        true
    }

    fn metrics_snapshot(inner: &Arc<Inner>) -> PipelineMetrics {
        let counters = inner.counters.lock().unwrap();
        PipelineMetrics {
            transcriptions_received: counters.transcriptions_received,
            words_transcribed: counters.words_transcribed,
            signs_generated: counters.signs_generated,
            errors: counters.errors,
            recoveries: counters.recoveries,
            circuit_breaker_trips: counters.circuit_breaker_trips,
            latency: inner.latency.lock().unwrap().stats(),
        }
    }

    fn status_snapshot(inner: &Arc<Inner>) -> PipelineStatusSnapshot {
        PipelineStatusSnapshot {
            state: Inner::state(inner),
            metrics: Inner::metrics_snapshot(inner),
            recent_errors: inner.errors.lock().unwrap().snapshot(),
        }
    }

    /// Acquire a source from the factory and claim its segment channel.
    fn acquire_source(inner: &Arc<Inner>) -> Result<mpsc::UnboundedReceiver<TranscriptSegment>> {
        let mut source = (inner.source_factory)()?;
        let rx = source
            .take_segments()
            .ok_or_else(|| PipelineError::Source("segment channel unavailable".to_string()))?;
        *inner.source.lock().unwrap() = Some(source);
        Ok(rx)
    }

    fn spawn_segment_task(
        inner: &Arc<Inner>,
        generation: u64,
        mut rx: mpsc::UnboundedReceiver<TranscriptSegment>,
    ) {
        let worker = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            while let Some(segment) = rx.recv().await {
                if worker.generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                Inner::handle_segment(&worker, generation, segment);
            }
            debug!("segment task finished");
        });

        let mut tasks = inner.tasks.lock().unwrap();
        if let Some(old) = tasks.segment.replace(handle) {
            old.abort();
        }
    }

    fn spawn_metrics_task(inner: &Arc<Inner>, generation: u64) {
        let worker = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(worker.config.metrics_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if worker.generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                if Inner::state(&worker) == PipelineState::Streaming {
                    worker.events.emit(PipelineEvent::Metrics {
                        metrics: Inner::metrics_snapshot(&worker),
                    });
                    worker.events.emit(PipelineEvent::Status {
                        snapshot: Inner::status_snapshot(&worker),
                    });
                }
            }
        });

        let mut tasks = inner.tasks.lock().unwrap();
        if let Some(old) = tasks.metrics.replace(handle) {
            old.abort();
        }
    }

    /// One transcript segment arrived from the source.
    fn handle_segment(inner: &Arc<Inner>, generation: u64, segment: TranscriptSegment) {
        if Inner::state(inner) != PipelineState::Streaming {
            debug!(id = %segment.id, "dropping segment outside streaming state");
            return;
        }

        {
            let mut counters = inner.counters.lock().unwrap();
            counters.transcriptions_received += 1;
            if segment.is_final {
                counters.words_transcribed += segment.word_count() as u64;
            }
        }

        let is_final = segment.is_final;
        let text = segment.text.clone();
        inner.events.emit(PipelineEvent::Transcription { segment });

        if !is_final {
            return;
        }

        let outcome = inner
            .batcher
            .lock()
            .unwrap()
            .push_final(&text, Instant::now());

        match outcome {
            PushOutcome::SizeTriggered => {
                // Size preempts the quiet-period timer.
                if let Some(timer) = inner.tasks.lock().unwrap().flush.take() {
                    timer.abort();
                }
                Inner::flush(inner, generation);
            }
            PushOutcome::Buffered => {
                if !inner.batcher.lock().unwrap().is_empty() {
                    Inner::arm_flush_timer(inner, generation);
                }
            }
        }
    }

    /// (Re)start the quiet-period timer from the last addition.
    fn arm_flush_timer(inner: &Arc<Inner>, generation: u64) {
        let delay = std::time::Duration::from_millis(inner.batch_delay_ms.load(Ordering::Relaxed));
        let worker = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if worker.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            Inner::flush(&worker, generation);
        });

        let mut tasks = inner.tasks.lock().unwrap();
        if let Some(old) = tasks.flush.replace(handle) {
            old.abort();
        }
    }

    /// Drain the pending buffer and translate it as one batch.
    fn flush(inner: &Arc<Inner>, generation: u64) {
        let Some(batch) = inner.batcher.lock().unwrap().take_batch() else {
            return;
        };
        debug!(text = %batch.text, "flushing batch");

        match inner.translator.translate(&batch.text) {
            Ok(signs) => {
                if inner.generation.load(Ordering::SeqCst) != generation {
                    debug!("discarding translation for a stopped pipeline");
                    return;
                }

                let latency_ms = batch.triggered_at.elapsed().as_secs_f64() * 1000.0;
                let current_delay = inner.batch_delay_ms.load(Ordering::Relaxed);
                let verdict = inner
                    .latency
                    .lock()
                    .unwrap()
                    .record(latency_ms, current_delay);

                if verdict.warn {
                    inner.events.emit(PipelineEvent::LatencyWarning {
                        latency_ms,
                        target_ms: inner.config.target_latency_ms,
                    });
                }
                if let Some(next) = verdict.adapted_delay_ms {
                    inner.batch_delay_ms.store(next, Ordering::Relaxed);
                    info!(
                        from_ms = current_delay,
                        to_ms = next,
                        "latency over ceiling, shrinking batch delay"
                    );
                }

                inner.counters.lock().unwrap().signs_generated += signs.len() as u64;

                let translation = Translation {
                    id: uuid::Uuid::new_v4().to_string(),
                    source_text: batch.text.clone(),
                    signs: signs.clone(),
                    timestamp: now_ms(),
                };
                inner.events.emit(PipelineEvent::Translation { translation });
                inner.events.emit(PipelineEvent::Signs {
                    signs,
                    text: batch.text,
                });
            }
            Err(e) => {
                Inner::record_stage_error(
                    inner,
                    PipelineStage::Translation,
                    &e.to_string(),
                    true,
                );
            }
        }
    }

    /// Record a stage error: ring, counters, event, breaker, recovery.
    fn record_stage_error(
        inner: &Arc<Inner>,
        stage: PipelineStage,
        message: &str,
        recoverable: bool,
    ) {
        let record = StageError::new(stage, message);
        inner.errors.lock().unwrap().push(record.clone());
        inner.counters.lock().unwrap().errors += 1;
        error!(stage = %stage, recoverable, "{}", message);
        inner.events.emit(PipelineEvent::Error {
            error: record,
            recoverable,
        });

        let verdict = inner
            .breaker
            .lock()
            .unwrap()
            .record_failure(Instant::now());

        match verdict {
            BreakerVerdict::Tripped => {
                inner.counters.lock().unwrap().circuit_breaker_trips += 1;
                warn!(
                    threshold = inner.config.circuit_breaker_threshold,
                    "circuit breaker tripped, suspending pipeline"
                );
                Inner::force_error_state(inner);
                Inner::spawn_cooldown(inner);
            }
            BreakerVerdict::Counted(_) => {
                if recoverable {
                    if Inner::state(inner) == PipelineState::Streaming {
                        Inner::force_error_state(inner);
                        let worker = Arc::clone(inner);
                        let generation = inner.generation.load(Ordering::SeqCst);
                        tokio::spawn(async move {
                            Inner::attempt_recovery(&worker, generation, stage).await;
                        });
                    }
                } else {
                    Inner::force_error_state(inner);
                }
            }
            BreakerVerdict::Open => {
                // Cooldown in progress; the error is recorded, nothing more.
            }
        }
    }

    fn force_error_state(inner: &Arc<Inner>) {
        if Inner::state(inner) != PipelineState::Error {
            Inner::set_state(inner, PipelineState::Error);
        }
    }

    /// Arm the post-trip cooldown; on expiry the breaker closes and a
    /// recovery attempt runs only if the pipeline is still in `error`.
    fn spawn_cooldown(inner: &Arc<Inner>) {
        let generation = inner.generation.load(Ordering::SeqCst);
        let worker = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(worker.config.circuit_breaker_timeout()).await;
            if worker.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            worker.breaker.lock().unwrap().close();
            info!("circuit breaker cooldown elapsed, closing");
            if Inner::state(&worker) == PipelineState::Error {
                Inner::attempt_recovery(&worker, generation, PipelineStage::Speech).await;
            }
        });

        let mut tasks = inner.tasks.lock().unwrap();
        if let Some(old) = tasks.cooldown.replace(handle) {
            old.abort();
        }
    }

    /// Staged recovery: re-acquire the transcript source for speech/audio
    /// failures, then return to streaming. Up to `max_retries` attempts,
    /// `retry_delay` apart; each failure re-enters the error path and counts
    /// toward the breaker, and a trip mid-loop hands the remaining work to
    /// the cooldown timer.
    async fn attempt_recovery(inner: &Arc<Inner>, generation: u64, stage: PipelineStage) {
        let budget = inner.config.max_retries.max(1);
        for attempt in 1..=budget {
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if !Inner::set_state(inner, PipelineState::Recovering) {
                return;
            }
            info!(stage = %stage, attempt, budget, "attempting recovery");

            let result = match stage {
                PipelineStage::Speech | PipelineStage::Audio => {
                    Inner::reacquire_source(inner, generation)
                }
                // Translation/rendering stages hold no pipeline-owned resource.
                _ => Ok(()),
            };

            match result {
                Ok(()) => {
                    if inner.generation.load(Ordering::SeqCst) != generation {
                        return;
                    }
                    if let Some(source) = inner.source.lock().unwrap().as_mut() {
                        if let Err(e) = source.resume() {
                            warn!("source resume after recovery failed: {}", e);
                        }
                    }
                    inner.counters.lock().unwrap().recoveries += 1;
                    Inner::set_state(inner, PipelineState::Streaming);
                    info!("recovery succeeded, streaming resumed");
                    return;
                }
                Err(e) => {
                    warn!(stage = %stage, attempt, "recovery failed: {}", e);
                    Inner::set_state(inner, PipelineState::Error);
                    Inner::record_stage_error(
                        inner,
                        stage,
                        &format!("recovery failed: {}", e),
                        true,
                    );
                    if attempt == budget {
                        warn!(stage = %stage, budget, "recovery retries exhausted");
                        return;
                    }
                    if inner.breaker.lock().unwrap().is_open() {
                        return;
                    }
                    tokio::time::sleep(inner.config.retry_delay()).await;
                }
            }
        }
    }

    fn reacquire_source(inner: &Arc<Inner>, generation: u64) -> Result<()> {
        if let Some(mut old) = inner.source.lock().unwrap().take() {
            let _ = old.stop();
        }
        let rx = Inner::acquire_source(inner)?;
        Inner::spawn_segment_task(inner, generation, rx);
        Ok(())
    }
}
