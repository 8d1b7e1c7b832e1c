//! Timed multi-shot capture sequence.
//!
//! The sequencer is a plain state machine: every transition returns the
//! interval to hold the new phase for, and the owner schedules the next
//! [`CaptureSequencer::advance`] call. [`CaptureSequencer::run`] is the
//! tokio-driven loop used when nothing else shares the timeline.
//!
//! Per shot the phases are `Countdown(3) -> Countdown(2) -> Countdown(1) ->
//! Smile -> Capturing -> Cooldown`, repeated until every slot is filled.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::compositor::{CapturedShot, FrameCompositor};
use crate::error::{BoothError, BoothResult};
use crate::filters::{FilterCatalog, FilterSpec};
use crate::frame::{DeviceStatus, FrameSource};

/// Token shown on the last countdown step, right before the capture.
pub const SMILE_TOKEN: &str = "Smile 😄";

/// Every token a single shot's countdown displays, in order.
pub const COUNTDOWN_TOKENS: [&str; 4] = ["3", "2", "1", SMILE_TOKEN];

/// Distinguishes one session instance from the next. Bumped on every
/// `start` and `reset`, so async results can be matched to the session
/// that asked for them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct Generation(pub u64);

impl Generation {
    fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownStep {
    Three,
    Two,
    One,
}

impl CountdownStep {
    pub fn token(self) -> &'static str {
        match self {
            Self::Three => "3",
            Self::Two => "2",
            Self::One => "1",
        }
    }
}

/// Sequencer phase. `slot` is the zero-based index of the shot being taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Countdown { slot: usize, step: CountdownStep },
    Smile { slot: usize },
    Capturing { slot: usize },
    /// Pause before the countdown for `next_slot`
    Cooldown { next_slot: usize },
    Complete,
}

impl Phase {
    pub fn is_running(self) -> bool {
        !matches!(self, Phase::Idle | Phase::Complete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTiming {
    /// How long each countdown token stays on screen
    pub countdown_step: Duration,
    /// Pause between a capture and the next countdown
    pub inter_shot_pause: Duration,
    pub shots_per_session: usize,
    /// Capture attempts per slot before the slot is given up
    pub max_attempts_per_shot: u32,
}

impl Default for SequenceTiming {
    fn default() -> Self {
        Self {
            countdown_step: Duration::from_millis(1000),
            inter_shot_pause: Duration::from_millis(400),
            shots_per_session: 3,
            max_attempts_per_shot: 3,
        }
    }
}

/// One capture run.
#[derive(Debug, Clone)]
pub struct Session {
    pub generation: Generation,
    pub shots: Vec<CapturedShot>,
    pub phase: Phase,
    /// Token currently on screen, if any
    pub countdown: Option<&'static str>,
}

impl Session {
    fn new(generation: Generation) -> Self {
        Self {
            generation,
            shots: Vec::new(),
            phase: Phase::Idle,
            countdown: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }
}

/// Notifications published while a sequence runs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "type", content = "data")]
pub enum SequencerEvent {
    Countdown {
        generation: Generation,
        slot: usize,
        token: &'static str,
    },
    ShotCaptured {
        generation: Generation,
        slot: usize,
        filter: String,
    },
    FrameMissed {
        generation: Generation,
        slot: usize,
        attempt: u32,
    },
    SlotSkipped {
        generation: Generation,
        slot: usize,
    },
    Completed {
        generation: Generation,
        shots: usize,
    },
    Reset {
        generation: Generation,
    },
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub phase: Phase,
    /// How long to hold `phase` before advancing again; `None` once the
    /// sequencer is at rest.
    pub hold: Option<Duration>,
    pub events: Vec<SequencerEvent>,
}

pub struct CaptureSequencer {
    session: Session,
    timing: SequenceTiming,
    filter: &'static FilterSpec,
    compositor: FrameCompositor,
    attempt: u32,
}

impl Default for CaptureSequencer {
    fn default() -> Self {
        Self::new(SequenceTiming::default())
    }
}

impl CaptureSequencer {
    pub fn new(timing: SequenceTiming) -> Self {
        Self {
            session: Session::new(Generation::default()),
            timing,
            filter: FilterCatalog::new().default_filter(),
            compositor: FrameCompositor::new(),
            attempt: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn generation(&self) -> Generation {
        self.session.generation
    }

    pub fn filter(&self) -> &'static FilterSpec {
        self.filter
    }

    pub fn is_capturing(&self) -> bool {
        self.session.phase.is_running()
    }

    /// Choose the look for upcoming shots. Not allowed mid-sequence.
    pub fn select_filter(&mut self, name: &str) -> BoothResult<&'static FilterSpec> {
        if self.is_capturing() {
            return Err(BoothError::InvalidTransition(
                "cannot change filter while capturing".into(),
            ));
        }
        self.filter = FilterCatalog::new().resolve(name)?;
        debug!("Selected filter '{}'", self.filter.name);
        Ok(self.filter)
    }

    /// Begin a new run from `Idle` or `Complete`, discarding prior shots.
    pub fn start(&mut self, source: &dyn FrameSource) -> BoothResult<Step> {
        if self.is_capturing() {
            return Err(BoothError::InvalidTransition(format!(
                "start requested while {:?}",
                self.session.phase
            )));
        }
        if let DeviceStatus::Failed(e) = source.status() {
            warn!("Refusing to start session: {e}");
            return Err(BoothError::Device(e));
        }

        self.session = Session::new(self.session.generation.next());
        self.attempt = 0;
        info!(
            "Session {} started with filter '{}'",
            self.session.generation, self.filter.name
        );

        let mut events = Vec::new();
        self.enter_countdown(0, CountdownStep::Three, &mut events);
        Ok(self.step(events))
    }

    /// Abandon the current run and return to `Idle`.
    pub fn reset(&mut self) -> Step {
        let was = self.session.phase;
        self.session = Session::new(self.session.generation.next());
        self.attempt = 0;
        info!("Session reset from {:?}, now {}", was, self.session.generation);

        let events = vec![SequencerEvent::Reset {
            generation: self.session.generation,
        }];
        Step {
            phase: Phase::Idle,
            hold: None,
            events,
        }
    }

    /// Leave the current phase once its hold interval has elapsed.
    pub fn advance(&mut self, source: &mut dyn FrameSource) -> Step {
        let mut events = Vec::new();

        match self.session.phase {
            Phase::Idle | Phase::Complete => {}
            Phase::Countdown { slot, step } => match step {
                CountdownStep::Three => self.enter_countdown(slot, CountdownStep::Two, &mut events),
                CountdownStep::Two => self.enter_countdown(slot, CountdownStep::One, &mut events),
                CountdownStep::One => {
                    self.session.phase = Phase::Smile { slot };
                    self.session.countdown = Some(SMILE_TOKEN);
                    events.push(SequencerEvent::Countdown {
                        generation: self.session.generation,
                        slot,
                        token: SMILE_TOKEN,
                    });
                }
            },
            Phase::Smile { slot } | Phase::Capturing { slot } => {
                self.session.phase = Phase::Capturing { slot };
                let next_slot = self.capture(slot, source, &mut events);
                self.session.countdown = None;

                if next_slot >= self.timing.shots_per_session {
                    self.session.phase = Phase::Complete;
                    info!(
                        "Session {} complete with {} shots",
                        self.session.generation,
                        self.session.shots.len()
                    );
                    events.push(SequencerEvent::Completed {
                        generation: self.session.generation,
                        shots: self.session.shots.len(),
                    });
                } else {
                    self.session.phase = Phase::Cooldown { next_slot };
                }
            }
            Phase::Cooldown { next_slot } => self.enter_countdown(next_slot, CountdownStep::Three, &mut events),
        }

        self.step(events)
    }

    /// Drive a whole run on the tokio clock, forwarding events as they occur.
    pub async fn run(
        &mut self,
        source: &mut dyn FrameSource,
        events: &mpsc::UnboundedSender<SequencerEvent>,
    ) -> BoothResult<&Session> {
        let mut step = self.start(&*source)?;
        loop {
            for event in step.events.drain(..) {
                let _ = events.send(event);
            }
            let Some(hold) = step.hold else { break };
            tokio::time::sleep(hold).await;
            step = self.advance(source);
        }
        Ok(&self.session)
    }

    /// Attempt the capture for `slot`; returns the slot to continue with.
    fn capture(&mut self, slot: usize, source: &mut dyn FrameSource, events: &mut Vec<SequencerEvent>) -> usize {
        let generation = self.session.generation;

        match self.compositor.capture(source, self.filter) {
            Ok(shot) => {
                debug!("Captured slot {} ({} bytes)", slot, shot.image_data.len());
                events.push(SequencerEvent::ShotCaptured {
                    generation,
                    slot,
                    filter: shot.filter_name.clone(),
                });
                self.session.shots.push(shot);
                self.attempt = 0;
                slot + 1
            }
            Err(e) => {
                self.attempt += 1;
                warn!(
                    "Capture for slot {} failed (attempt {}/{}): {e}",
                    slot, self.attempt, self.timing.max_attempts_per_shot
                );
                events.push(SequencerEvent::FrameMissed {
                    generation,
                    slot,
                    attempt: self.attempt,
                });

                if self.attempt >= self.timing.max_attempts_per_shot {
                    warn!("Giving up on slot {}", slot);
                    events.push(SequencerEvent::SlotSkipped { generation, slot });
                    self.attempt = 0;
                    slot + 1
                } else {
                    slot
                }
            }
        }
    }

    fn enter_countdown(&mut self, slot: usize, step: CountdownStep, events: &mut Vec<SequencerEvent>) {
        self.session.phase = Phase::Countdown { slot, step };
        self.session.countdown = Some(step.token());
        events.push(SequencerEvent::Countdown {
            generation: self.session.generation,
            slot,
            token: step.token(),
        });
    }

    fn step(&self, events: Vec<SequencerEvent>) -> Step {
        let hold = match self.session.phase {
            Phase::Idle | Phase::Complete => None,
            Phase::Countdown { .. } | Phase::Smile { .. } => Some(self.timing.countdown_step),
            Phase::Capturing { .. } => Some(Duration::ZERO),
            Phase::Cooldown { .. } => Some(self.timing.inter_shot_pause),
        };
        Step {
            phase: self.session.phase,
            hold,
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use crate::frame::{Frame, StaticFrameSource};
    use tokio::time::Instant;

    /// Misses the first `misses` frame requests, then behaves like a ready source.
    struct FlakySource {
        misses: usize,
        frame: Frame,
    }

    impl FrameSource for FlakySource {
        fn status(&self) -> DeviceStatus {
            DeviceStatus::Ready
        }

        fn current_frame(&mut self) -> Option<Frame> {
            if self.misses > 0 {
                self.misses -= 1;
                return None;
            }
            Some(self.frame.clone())
        }
    }

    fn ready_source() -> StaticFrameSource {
        StaticFrameSource::new(Frame::solid(16, 12, [180, 120, 60]))
    }

    fn tokens(events: &[SequencerEvent]) -> Vec<&'static str> {
        events
            .iter()
            .filter_map(|e| match e {
                SequencerEvent::Countdown { token, .. } => Some(*token),
                _ => None,
            })
            .collect()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SequencerEvent>) -> Vec<SequencerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_sequence() {
        let mut sequencer = CaptureSequencer::default();
        let mut source = ready_source();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let started = Instant::now();
        let session = sequencer.run(&mut source, &tx).await.unwrap();

        assert_eq!(session.phase, Phase::Complete);
        assert_eq!(session.shots.len(), 3);
        assert!(session.shots.iter().all(|s| s.filter_name == "90s"));
        assert_eq!(session.countdown, None);
        // 3 x 4 countdown steps plus 2 inter-shot pauses
        assert_eq!(started.elapsed(), Duration::from_millis(12_800));

        let events = drain(&mut rx);
        let expected: Vec<_> = COUNTDOWN_TOKENS.iter().copied().cycle().take(12).collect();
        assert_eq!(tokens(&events), expected);
        assert_eq!(
            events.last(),
            Some(&SequencerEvent::Completed {
                generation: Generation(1),
                shots: 3
            })
        );
    }

    #[test]
    fn test_manual_stepping_phases() {
        let mut sequencer = CaptureSequencer::default();
        let mut source = ready_source();

        let step = sequencer.start(&source).unwrap();
        assert_eq!(step.phase, Phase::Countdown { slot: 0, step: CountdownStep::Three });
        assert_eq!(step.hold, Some(Duration::from_secs(1)));

        let phases: Vec<Phase> = (0..5).map(|_| sequencer.advance(&mut source).phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::Countdown { slot: 0, step: CountdownStep::Two },
                Phase::Countdown { slot: 0, step: CountdownStep::One },
                Phase::Smile { slot: 0 },
                Phase::Cooldown { next_slot: 1 },
                Phase::Countdown { slot: 1, step: CountdownStep::Three },
            ]
        );
        assert_eq!(sequencer.session().shots.len(), 1);
        assert_eq!(sequencer.session().countdown, Some("3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_frame_retries_same_slot() {
        let mut sequencer = CaptureSequencer::default();
        let mut source = FlakySource {
            misses: 1,
            frame: Frame::solid(8, 8, [1, 2, 3]),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        let session = sequencer.run(&mut source, &tx).await.unwrap();
        assert_eq!(session.shots.len(), 3);

        let events = drain(&mut rx);
        assert!(events.contains(&SequencerEvent::FrameMissed {
            generation: Generation(1),
            slot: 0,
            attempt: 1
        }));
        let captured_slots: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SequencerEvent::ShotCaptured { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(captured_slots, vec![0, 1, 2]);
        // the retried slot shows its full countdown again
        assert_eq!(tokens(&events).len(), 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_ready_source_terminates_empty() {
        let mut sequencer = CaptureSequencer::default();
        let mut source = StaticFrameSource::not_ready();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let session = sequencer.run(&mut source, &tx).await.unwrap();
        assert_eq!(session.phase, Phase::Complete);
        assert!(session.shots.is_empty());

        let events = drain(&mut rx);
        let skipped = events
            .iter()
            .filter(|e| matches!(e, SequencerEvent::SlotSkipped { .. }))
            .count();
        assert_eq!(skipped, 3);
    }

    #[test]
    fn test_start_rejected_mid_sequence() {
        let mut sequencer = CaptureSequencer::default();
        let source = ready_source();
        sequencer.start(&source).unwrap();

        assert!(matches!(sequencer.start(&source), Err(BoothError::InvalidTransition(_))));
        assert!(matches!(
            sequencer.select_filter("Noir"),
            Err(BoothError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_start_refused_when_device_failed() {
        let mut sequencer = CaptureSequencer::default();
        let source = StaticFrameSource::failed(DeviceError::PermissionDenied);

        let err = sequencer.start(&source).unwrap_err();
        assert!(matches!(err, BoothError::Device(DeviceError::PermissionDenied)));
        assert_eq!(sequencer.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_from_complete_clears_shots() {
        let mut sequencer = CaptureSequencer::default();
        let mut source = ready_source();
        let (tx, _rx) = mpsc::unbounded_channel();

        sequencer.run(&mut source, &tx).await.unwrap();
        let first = sequencer.generation();
        sequencer.select_filter("glitch").unwrap();

        let step = sequencer.start(&source).unwrap();
        assert_eq!(step.phase, Phase::Countdown { slot: 0, step: CountdownStep::Three });
        assert!(sequencer.session().shots.is_empty());
        assert!(sequencer.generation() > first);

        let session = sequencer.run_to_rest(&mut source).await;
        assert!(session.shots.iter().all(|s| s.filter_name == "Glitch"));
    }

    #[test]
    fn test_reset_mid_sequence() {
        let mut sequencer = CaptureSequencer::default();
        let mut source = ready_source();
        sequencer.start(&source).unwrap();
        for _ in 0..4 {
            sequencer.advance(&mut source);
        }
        assert_eq!(sequencer.session().shots.len(), 1);
        let before = sequencer.generation();

        let step = sequencer.reset();
        assert_eq!(step.phase, Phase::Idle);
        assert_eq!(step.hold, None);
        assert!(sequencer.session().shots.is_empty());
        assert_eq!(sequencer.session().countdown, None);
        assert_eq!(sequencer.generation(), Generation(before.0 + 1));

        // advancing an idle sequencer is a no-op
        assert_eq!(sequencer.advance(&mut source).hold, None);
    }

    impl CaptureSequencer {
        async fn run_to_rest(&mut self, source: &mut dyn FrameSource) -> &Session {
            let mut hold = self.step(Vec::new()).hold;
            while let Some(d) = hold {
                tokio::time::sleep(d).await;
                hold = self.advance(source).hold;
            }
            &self.session
        }
    }
}
