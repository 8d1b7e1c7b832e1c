//! Studio manager.
//!
//! Owns the capture sequencer, the frame source and the upload state of the
//! current session generation. Everything runs on one task: commands,
//! sequencer ticks and finished uploads are multiplexed in [`StudioManager::run`],
//! so no state is shared or locked.

use std::path::PathBuf;
use std::sync::Arc;

use photobooth_core::{
    BoothError, CaptureSequencer, CapturedShot, FilterCatalog, FrameSource, Generation, Phase, SequencerEvent,
    Session, Step, StripExporter,
};
use photobooth_protocol::{DataUri, UploadOutcome};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::upload_manager::UploadPipeline;

/// Upload state of one session generation
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum UploadStatus {
    NotStarted,
    InFlight,
    Finished(UploadOutcome),
}

/// Work handed to the upload task
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub generation: Generation,
    pub shots: Vec<CapturedShot>,
}

/// Upload result tagged with the generation that requested it
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub generation: Generation,
    pub outcome: UploadOutcome,
}

/// At most one upload per generation; results for older generations are dropped.
#[derive(Debug, Clone)]
pub struct UploadTracker {
    generation: Generation,
    status: UploadStatus,
}

impl Default for UploadTracker {
    fn default() -> Self {
        Self {
            generation: Generation::default(),
            status: UploadStatus::NotStarted,
        }
    }
}

impl UploadTracker {
    pub fn status(&self) -> &UploadStatus {
        &self.status
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Forget everything about the previous generation.
    pub fn reset(&mut self, generation: Generation) {
        if self.status == UploadStatus::InFlight {
            info!("Upload for {} superseded by {}", self.generation, generation);
        }
        self.generation = generation;
        self.status = UploadStatus::NotStarted;
    }

    /// Claim the upload for `session`. Returns `None` unless the session is
    /// complete, has shots, and no upload was ever started for its generation.
    pub fn begin(&mut self, session: &Session) -> Option<UploadJob> {
        if !session.is_complete() || session.shots.is_empty() {
            return None;
        }
        if session.generation != self.generation {
            self.reset(session.generation);
        }
        if self.status != UploadStatus::NotStarted {
            debug!("Upload for {} already {:?}", self.generation, self.status);
            return None;
        }

        self.status = UploadStatus::InFlight;
        Some(UploadJob {
            generation: session.generation,
            shots: session.shots.clone(),
        })
    }

    /// Record a finished upload. Returns `false` when the result is stale.
    pub fn finish(&mut self, result: GenerationOutcome) -> bool {
        if result.generation != self.generation || self.status != UploadStatus::InFlight {
            warn!(
                "Discarding upload result for {} (current {})",
                result.generation, self.generation
            );
            return false;
        }
        self.status = UploadStatus::Finished(result.outcome);
        true
    }
}

/// Events published to whoever renders the studio
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", content = "data")]
pub enum StudioEvent {
    Sequencer(SequencerEvent),
    UploadStarted {
        generation: Generation,
        images: usize,
    },
    UploadFinished {
        generation: Generation,
        outcome: UploadOutcome,
    },
    StaleUploadDiscarded {
        generation: Generation,
    },
}

/// Point-in-time view of the studio
#[derive(Debug, Clone, serde::Serialize)]
pub struct StudioSnapshot {
    pub generation: Generation,
    pub phase: Phase,
    pub countdown: Option<&'static str>,
    pub filter: &'static str,
    pub shots: usize,
    pub upload: UploadStatus,
    pub device: photobooth_core::DeviceStatus,
}

/// Where a downloaded strip ended up
#[derive(Debug, Clone)]
pub struct DownloadedStrip {
    pub path: PathBuf,
    pub data_uri: String,
    pub caption: String,
}

/// Strip export detached from the studio state
struct DownloadJob {
    shots: Vec<CapturedShot>,
    exporter: StripExporter,
    output_dir: PathBuf,
    date: chrono::NaiveDate,
}

impl DownloadJob {
    async fn save(self) -> Result<DownloadedStrip, String> {
        tokio::task::spawn_blocking(move || self.write())
            .await
            .map_err(|e| format!("Strip export task failed: {e}"))?
    }

    fn write(self) -> Result<DownloadedStrip, String> {
        let strip = self.exporter.export(&self.shots, self.date).map_err(|e| e.to_string())?;

        std::fs::create_dir_all(&self.output_dir).map_err(|e| format!("Failed to create output dir: {e}"))?;
        let path = self.output_dir.join(strip.filename);
        std::fs::write(&path, &strip.data).map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
        info!("Strip saved to {}", path.display());

        Ok(DownloadedStrip {
            path,
            data_uri: DataUri::new(strip.mime, strip.data).encode(),
            caption: strip.caption,
        })
    }
}

/// Commands sent to the studio task via mpsc channel
pub enum StudioCommand {
    ListFilters(oneshot::Sender<Vec<&'static str>>),
    SelectFilter(String, oneshot::Sender<Result<&'static str, String>>),
    Start(oneshot::Sender<Result<Generation, String>>),
    Retake(oneshot::Sender<Generation>),
    Download(oneshot::Sender<Result<DownloadedStrip, String>>),
    RetryCamera(oneshot::Sender<Result<(), String>>),
    Back(oneshot::Sender<Result<(), String>>),
    Status(oneshot::Sender<StudioSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Invoked when the user leaves the studio
pub type BackHandler = Box<dyn FnMut() + Send>;

pub struct StudioManager {
    sequencer: CaptureSequencer,
    source: Box<dyn FrameSource>,
    tracker: UploadTracker,
    pipeline: Arc<UploadPipeline>,
    exporter: StripExporter,
    output_dir: PathBuf,
    next_tick: Option<Instant>,
    on_back: BackHandler,
    events: mpsc::UnboundedSender<StudioEvent>,
    outcome_tx: mpsc::UnboundedSender<GenerationOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<GenerationOutcome>,
}

impl StudioManager {
    pub fn new(
        source: Box<dyn FrameSource>,
        pipeline: UploadPipeline,
        exporter: StripExporter,
        output_dir: PathBuf,
        events: mpsc::UnboundedSender<StudioEvent>,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            sequencer: CaptureSequencer::default(),
            source,
            tracker: UploadTracker::default(),
            pipeline: Arc::new(pipeline),
            exporter,
            output_dir,
            next_tick: None,
            on_back: Box::new(|| {}),
            events,
            outcome_tx,
            outcome_rx,
        }
    }

    pub fn with_sequencer(mut self, sequencer: CaptureSequencer) -> Self {
        self.sequencer = sequencer;
        self
    }

    /// Replace the default no-op back navigation.
    pub fn with_back_handler(mut self, on_back: BackHandler) -> Self {
        self.on_back = on_back;
        self
    }

    /// Move the manager onto its own task and return a handle to it.
    pub fn spawn(self) -> StudioHandle {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(self.run(rx));
        StudioHandle { tx }
    }

    /// Serve commands until shutdown, interleaving sequencer ticks and
    /// upload completions on the same task.
    pub async fn run(mut self, mut commands: mpsc::Receiver<StudioCommand>) {
        info!("Studio ready");
        loop {
            let deadline = self.next_tick;
            let tick = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            enum Wake {
                Tick,
                Upload(GenerationOutcome),
                Command(Option<StudioCommand>),
            }

            let wake = tokio::select! {
                _ = tick => Wake::Tick,
                Some(result) = self.outcome_rx.recv() => Wake::Upload(result),
                cmd = commands.recv() => Wake::Command(cmd),
            };

            match wake {
                Wake::Tick => self.tick(),
                Wake::Upload(result) => self.on_upload_finished(result),
                Wake::Command(None) => break,
                Wake::Command(Some(StudioCommand::Shutdown(reply))) => {
                    let _ = reply.send(());
                    break;
                }
                Wake::Command(Some(cmd)) => self.handle(cmd),
            }
        }
        info!("Studio stopped");
    }

    fn handle(&mut self, cmd: StudioCommand) {
        match cmd {
            StudioCommand::ListFilters(reply) => {
                let _ = reply.send(FilterCatalog::new().names().collect());
            }
            StudioCommand::SelectFilter(name, reply) => {
                let result = self
                    .sequencer
                    .select_filter(&name)
                    .map(|f| f.name)
                    .map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
            StudioCommand::Start(reply) => {
                let _ = reply.send(self.start().map_err(|e| e.to_string()));
            }
            StudioCommand::Retake(reply) => {
                let _ = reply.send(self.retake());
            }
            StudioCommand::Download(reply) => match self.prepare_download() {
                Ok(job) => {
                    tokio::spawn(async move {
                        let _ = reply.send(job.save().await);
                    });
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            StudioCommand::RetryCamera(reply) => {
                let result = self.source.restart().map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
            StudioCommand::Back(reply) => {
                let _ = reply.send(self.back());
            }
            StudioCommand::Status(reply) => {
                let _ = reply.send(self.snapshot());
            }
            StudioCommand::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    pub fn start(&mut self) -> Result<Generation, BoothError> {
        let step = self.sequencer.start(&*self.source)?;
        self.tracker.reset(self.sequencer.generation());
        self.apply(step);
        Ok(self.sequencer.generation())
    }

    /// Discard the current session (finished or not) and any upload in flight.
    pub fn retake(&mut self) -> Generation {
        let step = self.sequencer.reset();
        self.tracker.reset(self.sequencer.generation());
        self.apply(step);
        self.sequencer.generation()
    }

    pub fn back(&mut self) -> Result<(), String> {
        if self.sequencer.is_capturing() {
            return Err("Cannot leave the studio while capturing".into());
        }
        self.retake();
        (self.on_back)();
        Ok(())
    }

    pub fn snapshot(&self) -> StudioSnapshot {
        let session = self.sequencer.session();
        StudioSnapshot {
            generation: session.generation,
            phase: session.phase,
            countdown: session.countdown,
            filter: self.sequencer.filter().name,
            shots: session.shots.len(),
            upload: self.tracker.status().clone(),
            device: self.source.status(),
        }
    }

    fn tick(&mut self) {
        let step = self.sequencer.advance(self.source.as_mut());
        self.apply(step);
    }

    fn apply(&mut self, step: Step) {
        self.next_tick = step.hold.map(|d| Instant::now() + d);
        let completed = step
            .events
            .iter()
            .any(|e| matches!(e, SequencerEvent::Completed { .. }));

        for event in step.events {
            self.emit(StudioEvent::Sequencer(event));
        }
        if completed {
            self.trigger_upload();
        }
    }

    /// Kick off the upload for the current session if it has not had one.
    pub fn trigger_upload(&mut self) -> bool {
        let Some(job) = self.tracker.begin(self.sequencer.session()) else {
            return false;
        };

        self.emit(StudioEvent::UploadStarted {
            generation: job.generation,
            images: job.shots.len(),
        });

        let pipeline = self.pipeline.clone();
        let outcome_tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let outcome = pipeline.upload(&job.shots).await;
            let _ = outcome_tx.send(GenerationOutcome {
                generation: job.generation,
                outcome,
            });
        });
        true
    }

    fn on_upload_finished(&mut self, result: GenerationOutcome) {
        let generation = result.generation;
        let outcome = result.outcome.clone();
        if self.tracker.finish(result) {
            self.emit(StudioEvent::UploadFinished { generation, outcome });
        } else {
            self.emit(StudioEvent::StaleUploadDiscarded { generation });
        }
    }

    /// Snapshot what the strip needs so encoding and disk I/O run off this task.
    fn prepare_download(&self) -> Result<DownloadJob, String> {
        let session = self.sequencer.session();
        if !session.is_complete() {
            return Err("Nothing to download until the session is complete".into());
        }
        Ok(DownloadJob {
            shots: session.shots.clone(),
            exporter: self.exporter.clone(),
            output_dir: self.output_dir.clone(),
            date: chrono::Local::now().date_naive(),
        })
    }

    fn emit(&self, event: StudioEvent) {
        if self.events.send(event).is_err() {
            error!("Failed to emit studio event: receiver dropped");
        }
    }
}

/// Cloneable handle for talking to a spawned [`StudioManager`].
#[derive(Clone)]
pub struct StudioHandle {
    tx: mpsc::Sender<StudioCommand>,
}

impl StudioHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> StudioCommand) -> Result<T, String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| "Studio is not running".to_string())?;
        reply_rx.await.map_err(|_| "Failed to receive response".to_string())
    }

    pub async fn list_filters(&self) -> Result<Vec<&'static str>, String> {
        self.request(StudioCommand::ListFilters).await
    }

    pub async fn select_filter(&self, name: &str) -> Result<&'static str, String> {
        let name = name.to_string();
        self.request(|reply| StudioCommand::SelectFilter(name, reply)).await?
    }

    pub async fn start(&self) -> Result<Generation, String> {
        self.request(StudioCommand::Start).await?
    }

    pub async fn retake(&self) -> Result<Generation, String> {
        self.request(StudioCommand::Retake).await
    }

    pub async fn download(&self) -> Result<DownloadedStrip, String> {
        self.request(StudioCommand::Download).await?
    }

    pub async fn retry_camera(&self) -> Result<(), String> {
        self.request(StudioCommand::RetryCamera).await?
    }

    pub async fn back(&self) -> Result<(), String> {
        self.request(StudioCommand::Back).await?
    }

    pub async fn status(&self) -> Result<StudioSnapshot, String> {
        self.request(StudioCommand::Status).await
    }

    pub async fn shutdown(&self) -> Result<(), String> {
        self.request(StudioCommand::Shutdown).await
    }
}
