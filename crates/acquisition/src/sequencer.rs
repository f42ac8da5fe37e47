//! Live acquisition sequencer.
//!
//! A dedicated `live-acquisition` thread repeatedly drains both streams,
//! synchronizes the frames, copies them into the pool and hands them to the
//! consumer. The caller keeps the join handle; stopping is cooperative through
//! a shared flag checked at the top of every drain cycle.
//!
//! State machine: `Idle -> Starting -> Running -> Stopping -> Idle`.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contracts::{
    AcquisitionSdk, Channel, DeliveredImage, DeliveryError, DiagnosticEvent, DiagnosticSink,
    FrameConsumer, FrameMetadata, FrameRange, FrameView,
};
use tracing::instrument;

use crate::buffer::{lock_pool, FramePool, ImageBuffer};
use crate::error::{AcquisitionError, Result};
use crate::reader::{Pause, StreamReader};
use crate::sync::{FrameSynchronizer, SyncBatch, SyncedFrameSet};

const WORKER_THREAD_NAME: &str = "live-acquisition";

/// Sequencer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SequencerState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(SequencerState::Idle as u8))
    }

    fn load(&self) -> SequencerState {
        match self.0.load(Ordering::Acquire) {
            1 => SequencerState::Starting,
            2 => SequencerState::Running,
            3 => SequencerState::Stopping,
            _ => SequencerState::Idle,
        }
    }

    fn store(&self, state: SequencerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Parameters of one live session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceRequest {
    /// Frame sets to deliver; 0 runs until stopped
    pub frame_count: u64,
    /// Host's requested interval, informational only
    pub interval_hint: Duration,
    /// End the session on the first consumer overflow
    pub stop_on_overflow: bool,
}

impl SequenceRequest {
    /// Run until stopped
    pub fn continuous() -> Self {
        Self {
            frame_count: 0,
            interval_hint: Duration::ZERO,
            stop_on_overflow: false,
        }
    }

    pub fn bounded(frame_count: u64) -> Self {
        Self {
            frame_count,
            ..Self::continuous()
        }
    }

    pub fn with_stop_on_overflow(mut self, stop_on_overflow: bool) -> Self {
        self.stop_on_overflow = stop_on_overflow;
        self
    }

    fn target(&self) -> Option<u64> {
        (self.frame_count > 0).then_some(self.frame_count)
    }
}

/// Which channel images reach the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Every active channel, channel 0 first
    AllChannels,
    /// One channel only
    Selected(Channel),
}

/// What a session drains and how it delivers
#[derive(Debug, Clone)]
pub struct DrainPlan {
    /// Active channels, channel 0 first
    pub channels: Vec<Channel>,
    pub delivery: Delivery,
    /// Camera name per channel, attached to metadata
    pub cameras: [String; 2],
}

impl DrainPlan {
    fn validate(&self) -> Result<()> {
        let count = self.channels.len();
        if count == 0 || count > Channel::ALL.len() {
            return Err(AcquisitionError::InvalidChannel { index: count, count });
        }
        if let Delivery::Selected(channel) = self.delivery {
            if !self.channels.contains(&channel) {
                return Err(AcquisitionError::InvalidChannel {
                    index: channel.index(),
                    count,
                });
            }
        }
        Ok(())
    }
}

/// Counters of one finished session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Frame sets processed, abandoned overflow sets included
    pub frames_delivered: u64,
    /// Drain cycles that got frames from every channel
    pub cycles: u64,
    pub overflow_events: u64,
    pub missed_frames: u64,
    pub rejected_deliveries: u64,
    pub timeouts: u64,
    pub interval_hint: Duration,
}

struct Session {
    stop: Arc<AtomicBool>,
    worker: JoinHandle<Result<SessionReport>>,
}

/// Owns the background drain thread of one device
pub struct LiveSequencer<S: AcquisitionSdk + 'static, P: Pause + Clone + 'static> {
    sdk: Arc<S>,
    pool: Arc<Mutex<FramePool>>,
    consumer: Arc<dyn FrameConsumer>,
    diagnostics: Arc<dyn DiagnosticSink>,
    reader: StreamReader<P>,
    state: Arc<StateCell>,
    session: Option<Session>,
}

impl<S: AcquisitionSdk + 'static, P: Pause + Clone + 'static> LiveSequencer<S, P> {
    pub fn new(
        sdk: Arc<S>,
        pool: Arc<Mutex<FramePool>>,
        consumer: Arc<dyn FrameConsumer>,
        diagnostics: Arc<dyn DiagnosticSink>,
        reader: StreamReader<P>,
    ) -> Self {
        Self {
            sdk,
            pool,
            consumer,
            diagnostics,
            reader,
            state: Arc::new(StateCell::new()),
            session: None,
        }
    }

    /// Whether the drain thread is alive
    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.worker.is_finished())
    }

    pub fn state(&self) -> SequencerState {
        if self.is_active() {
            self.state.load()
        } else {
            SequencerState::Idle
        }
    }

    /// Configure the frame limit, start the engine and spawn the drain thread.
    ///
    /// # Errors
    /// - `AlreadyRunning` while a drain thread is alive
    /// - `ConfigureFailed` / `Sdk` when the engine refuses; state returns to `Idle`
    #[instrument(
        name = "live_sequencer_start",
        skip(self, plan),
        fields(frame_count = request.frame_count, stop_on_overflow = request.stop_on_overflow)
    )]
    pub fn start(&mut self, request: SequenceRequest, plan: DrainPlan) -> Result<()> {
        if self.is_active() {
            return Err(AcquisitionError::AlreadyRunning);
        }
        if let Some(finished) = self.session.take() {
            self.reap(finished);
        }
        plan.validate()?;

        self.state.store(SequencerState::Starting);
        if let Err(e) = self.begin(&request) {
            self.state.store(SequencerState::Idle);
            return Err(e);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let worker = DrainWorker {
            sdk: Arc::clone(&self.sdk),
            pool: Arc::clone(&self.pool),
            consumer: Arc::clone(&self.consumer),
            diagnostics: Arc::clone(&self.diagnostics),
            reader: self.reader.clone(),
            state: Arc::clone(&self.state),
            stop: Arc::clone(&stop),
            request,
            plan,
        };

        self.state.store(SequencerState::Running);
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run());

        match spawned {
            Ok(worker) => {
                self.session = Some(Session { stop, worker });
                tracing::info!("live acquisition started");
                Ok(())
            }
            Err(e) => {
                if let Err(stop_err) = self.sdk.stop() {
                    tracing::warn!(error = %stop_err, "engine stop after failed spawn");
                }
                self.state.store(SequencerState::Idle);
                Err(e.into())
            }
        }
    }

    fn begin(&self, request: &SequenceRequest) -> Result<()> {
        let settings = self
            .sdk
            .get_configuration()?
            .with_max_frame_count(request.frame_count);
        self.sdk
            .configure(&settings)
            .map_err(AcquisitionError::configure_failed)?;
        self.sdk.start()?;
        Ok(())
    }

    /// Ask the drain thread to exit after its current cycle without joining
    pub fn request_stop(&self) {
        if let Some(session) = &self.session {
            session.stop.store(true, Ordering::SeqCst);
        }
    }

    /// Signal the drain thread, join it and return its report.
    ///
    /// A session that already ended on its own is joined without another
    /// engine stop.
    ///
    /// # Errors
    /// - `NotRunning` when there is no session
    /// - the fatal error that ended the session, if any
    #[instrument(name = "live_sequencer_stop", skip(self))]
    pub fn stop(&mut self) -> Result<SessionReport> {
        let session = self.session.take().ok_or(AcquisitionError::NotRunning)?;
        session.stop.store(true, Ordering::SeqCst);
        let joined = session.worker.join();
        self.state.store(SequencerState::Idle);

        match joined {
            Ok(result) => {
                if let Ok(report) = &result {
                    tracing::info!(
                        frames_delivered = report.frames_delivered,
                        overflow_events = report.overflow_events,
                        missed_frames = report.missed_frames,
                        "live acquisition stopped"
                    );
                }
                result
            }
            Err(_) => {
                if let Err(e) = self.sdk.stop() {
                    tracing::warn!(error = %e, "engine stop after worker panic");
                }
                Err(AcquisitionError::WorkerPanicked)
            }
        }
    }

    fn reap(&self, session: Session) {
        match session.worker.join() {
            Ok(Ok(report)) => tracing::debug!(
                frames_delivered = report.frames_delivered,
                "previous session joined"
            ),
            Ok(Err(e)) => tracing::warn!(error = %e, "previous session ended with error"),
            Err(_) => tracing::error!("previous session worker panicked"),
        }
    }
}

impl<S: AcquisitionSdk + 'static, P: Pause + Clone + 'static> Drop for LiveSequencer<S, P> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop.store(true, Ordering::SeqCst);
            if session.worker.join().is_err() {
                tracing::error!("live acquisition worker panicked during shutdown");
            }
        }
    }
}

/// State moved onto the drain thread
struct DrainWorker<S, P> {
    sdk: Arc<S>,
    pool: Arc<Mutex<FramePool>>,
    consumer: Arc<dyn FrameConsumer>,
    diagnostics: Arc<dyn DiagnosticSink>,
    reader: StreamReader<P>,
    state: Arc<StateCell>,
    stop: Arc<AtomicBool>,
    request: SequenceRequest,
    plan: DrainPlan,
}

impl<S: AcquisitionSdk, P: Pause> DrainWorker<S, P> {
    fn run(self) -> Result<SessionReport> {
        let mut report = SessionReport {
            interval_hint: self.request.interval_hint,
            ..SessionReport::default()
        };

        let outcome = self.drain(&mut report);

        self.state.store(SequencerState::Stopping);
        let stopped = self.sdk.stop();
        self.state.store(SequencerState::Idle);

        observability::record_session_finished(
            report.frames_delivered,
            report.overflow_events,
            outcome.is_ok(),
        );
        if let Err(e) = &outcome {
            tracing::error!(error = %e, "live acquisition ended with error");
        }

        outcome?;
        stopped?;
        Ok(report)
    }

    fn drain(&self, report: &mut SessionReport) -> Result<()> {
        while !self.stop.load(Ordering::SeqCst) {
            if self.target_reached(report) {
                tracing::debug!(frames_delivered = report.frames_delivered, "frame target reached");
                break;
            }

            match self.cycle(report) {
                Ok(()) => report.cycles += 1,
                Err(AcquisitionError::Timeout { channel, retries }) => {
                    report.timeouts += 1;
                    observability::record_poll_timeout(channel.name());
                    self.diagnostics
                        .record(DiagnosticEvent::PollTimeout { channel, retries });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn target_reached(&self, report: &SessionReport) -> bool {
        self.request
            .target()
            .is_some_and(|target| report.frames_delivered >= target)
    }

    /// Poll, synchronize, deliver, release
    #[instrument(level = "trace", name = "live_drain_cycle", skip_all)]
    fn cycle(&self, report: &mut SessionReport) -> Result<()> {
        let mut regions = Vec::with_capacity(self.plan.channels.len());
        for &channel in &self.plan.channels {
            let polled = self.reader.poll(&*self.sdk, channel)?;
            regions.push((channel, polled.region));
        }

        let (releases, delivered) = {
            let ranges = regions
                .iter()
                .map(|(channel, region)| {
                    FrameRange::parse(region.as_ref())
                        .map(|range| (*channel, range))
                        .map_err(|e| AcquisitionError::frame_layout(*channel, e))
                })
                .collect::<Result<Vec<_>>>()?;

            let batch = FrameSynchronizer::new(&*self.diagnostics).align(&ranges)?;
            report.missed_frames += batch.missed.len() as u64;

            let (consumed, delivered) = self.deliver_batch(&batch, report);
            (batch.consumed_bytes(consumed), delivered)
        };
        drop(regions);

        // released even when delivery failed
        for (channel, bytes) in releases {
            if bytes > 0 {
                self.sdk.unmap_read(channel, bytes)?;
            }
        }
        delivered
    }

    /// Deliver sets in order; returns how many sets were consumed
    fn deliver_batch(&self, batch: &SyncBatch<'_>, report: &mut SessionReport) -> (usize, Result<()>) {
        let mut pool = lock_pool(&self.pool);
        let mut consumed = 0;

        for set in &batch.sets {
            if self.target_reached(report) {
                break;
            }
            consumed += 1;
            if let Err(e) = self.deliver_set(&mut pool, set, report) {
                return (consumed, Err(e));
            }
            report.frames_delivered += 1;
        }

        (consumed, Ok(()))
    }

    fn deliver_set(
        &self,
        pool: &mut FramePool,
        set: &SyncedFrameSet<'_>,
        report: &mut SessionReport,
    ) -> Result<()> {
        for (channel, view) in &set.frames {
            pool.write(*channel, view.payload)?;
        }

        match self.plan.delivery {
            Delivery::AllChannels => {
                for (channel, view) in &set.frames {
                    let buffer = pool.read(*channel)?;
                    match self.insert(buffer, *channel, view) {
                        Ok(()) => {}
                        Err(DeliveryError::BufferOverflow) => {
                            self.handle_overflow(*channel, view.frame_id, report)?;
                            // rest of this set is dropped
                            break;
                        }
                        Err(DeliveryError::Rejected { message }) => {
                            self.handle_rejected(*channel, view.frame_id, message, report)
                        }
                    }
                }
            }
            Delivery::Selected(channel) => {
                let view = set.frame(channel).ok_or(AcquisitionError::InvalidChannel {
                    index: channel.index(),
                    count: set.frames.len(),
                })?;
                let buffer = pool.read(channel)?;
                match self.insert(buffer, channel, view) {
                    Ok(()) => {}
                    Err(DeliveryError::BufferOverflow) => {
                        self.handle_overflow(channel, view.frame_id, report)?;
                        if let Err(e) = self.insert(buffer, channel, view) {
                            tracing::warn!(
                                channel = %channel,
                                frame_id = view.frame_id,
                                error = %e,
                                "redelivery after backlog clear failed"
                            );
                        }
                    }
                    Err(DeliveryError::Rejected { message }) => {
                        self.handle_rejected(channel, view.frame_id, message, report)
                    }
                }
            }
        }
        Ok(())
    }

    fn insert(
        &self,
        buffer: &ImageBuffer,
        channel: Channel,
        view: &FrameView<'_>,
    ) -> std::result::Result<(), DeliveryError> {
        let metadata = FrameMetadata {
            channel,
            camera: self.plan.cameras[channel.index()].clone(),
            frame_id: view.frame_id,
            timestamp_hardware: view.timestamp_hardware,
        };

        self.consumer.insert_image(DeliveredImage {
            pixels: buffer.pixels(),
            width: buffer.width(),
            height: buffer.height(),
            bytes_per_pixel: buffer.bytes_per_pixel(),
            components: 1,
            metadata: &metadata,
        })?;

        observability::record_frame_delivered(channel.name());
        Ok(())
    }

    fn handle_overflow(&self, channel: Channel, frame_id: u64, report: &mut SessionReport) -> Result<()> {
        report.overflow_events += 1;
        observability::record_overflow(channel.name());
        self.diagnostics
            .record(DiagnosticEvent::BufferOverflow { channel, frame_id });

        if self.request.stop_on_overflow {
            return Err(AcquisitionError::BufferOverflow { channel, frame_id });
        }

        self.consumer.clear_backlog();
        tracing::debug!(
            consumer = self.consumer.name(),
            channel = %channel,
            frame_id,
            "consumer backlog cleared"
        );
        Ok(())
    }

    fn handle_rejected(
        &self,
        channel: Channel,
        frame_id: u64,
        message: String,
        report: &mut SessionReport,
    ) {
        report.rejected_deliveries += 1;
        self.diagnostics.record(DiagnosticEvent::DeliveryRejected {
            channel,
            frame_id,
            message,
        });
    }
}
