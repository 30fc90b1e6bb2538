use aim_schema::{MapNote, MeanOffsets, MeasurementRecord, Pattern, ReplayFrame};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{info, warn};

use crate::config::{ExtractConfig, TrialParams};
use crate::deviation::{extract_offsets, TrialOffsets};
use crate::error::{Rejection, TrialError};
use crate::store::MeasurementStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingCapture,
    Extracting,
    Recording,
    Aborted,
}

/// What the capture side sends back to a waiting session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    Capture(Vec<ReplayFrame>),
    Abort,
}

pub struct SignalQueue {
    sender: Sender<SessionSignal>,
    receiver: Receiver<SessionSignal>,
}

impl SignalQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Can be called from any thread, e.g. a replay file watcher.
    pub fn push(&self, signal: SessionSignal) {
        let _ = self.sender.send(signal);
    }

    pub fn sender(&self) -> Sender<SessionSignal> {
        self.sender.clone()
    }

    pub fn receiver(&self) -> &Receiver<SessionSignal> {
        &self.receiver
    }
}

impl Default for SignalQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Recorded {
        record: MeasurementRecord,
        offsets: TrialOffsets,
    },
    Rejected(Rejection),
    Aborted,
}

/// Drives one trial at a time: generate, wait for the capture, extract, record.
pub struct TrialSession {
    state: SessionState,
    params: TrialParams,
    base_config: ExtractConfig,
    trial: Option<ActiveTrial>,
}

struct ActiveTrial {
    pattern: Pattern,
    map: Vec<MapNote>,
    config: ExtractConfig,
}

impl TrialSession {
    /// `base_config` supplies windows and tolerances; geometry comes from
    /// each trial's parameters.
    pub fn new(base_config: ExtractConfig) -> Self {
        Self {
            state: SessionState::Idle,
            params: TrialParams::default(),
            base_config,
            trial: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Parameters of the current trial, or of the next one once idle.
    pub fn params(&self) -> &TrialParams {
        &self.params
    }

    pub fn pattern(&self) -> Option<&Pattern> {
        self.trial.as_ref().map(|t| &t.pattern)
    }

    pub fn config(&self) -> Option<&ExtractConfig> {
        self.trial.as_ref().map(|t| &t.config)
    }

    pub fn start(&mut self, params: TrialParams) -> Result<&Pattern, TrialError> {
        if !matches!(self.state, SessionState::Idle | SessionState::Aborted) {
            return Err(TrialError::InvalidTransition {
                state: self.state,
                action: "start a trial",
            });
        }

        let pattern = params.pattern()?;
        if pattern.clipped {
            warn!(spacing = params.spacing, angle = params.angle, "pattern does not fit the playfield and was clamped");
        }
        let config = params.extract_config(&self.base_config);
        let map = pattern.to_map_notes();
        info!(bpm = params.bpm, spacing = params.spacing, angle = params.angle, notes = map.len(), "trial started");

        self.params = params;
        self.state = SessionState::AwaitingCapture;
        let trial = self.trial.insert(ActiveTrial { pattern, map, config });
        Ok(&trial.pattern)
    }

    pub fn abort(&mut self) -> Result<(), TrialError> {
        if self.state != SessionState::AwaitingCapture {
            return Err(TrialError::InvalidTransition {
                state: self.state,
                action: "abort",
            });
        }
        info!("trial aborted");
        self.trial = None;
        self.state = SessionState::Aborted;
        Ok(())
    }

    /// Extracts the capture and, if accepted, appends one record to `store`.
    /// The session is idle again afterwards either way.
    pub fn submit_capture(
        &mut self,
        replay: &[ReplayFrame],
        store: &mut MeasurementStore,
    ) -> Result<TrialOutcome, TrialError> {
        let trial = match (self.state, self.trial.take()) {
            (SessionState::AwaitingCapture, Some(trial)) => trial,
            (state, trial) => {
                self.trial = trial;
                return Err(TrialError::InvalidTransition {
                    state,
                    action: "submit a capture",
                });
            }
        };

        self.state = SessionState::Extracting;
        let offsets = match extract_offsets(&trial.map, replay, &trial.config) {
            Ok(offsets) => offsets,
            Err(rejection) => {
                info!(%rejection, "trial rejected");
                self.state = SessionState::Idle;
                return Ok(TrialOutcome::Rejected(rejection));
            }
        };

        self.state = SessionState::Recording;
        let record = MeasurementRecord {
            key: self.params.key(),
            stddev_x: offsets.stats.stddev_x,
            stddev_y: offsets.stats.stddev_y,
            stddev_t: Some(offsets.stats.stddev_t),
            means: Some(MeanOffsets {
                x: offsets.stats.mean_x,
                y: offsets.stats.mean_y,
                t: offsets.stats.mean_t,
            }),
        };
        let appended = store.append_record(record);
        self.state = SessionState::Idle;
        appended?;

        self.params = self.params.next();
        Ok(TrialOutcome::Recorded { record, offsets })
    }

    /// Blocks until the capture side sends a capture or an abort.
    pub fn run(
        &mut self,
        signals: &Receiver<SessionSignal>,
        store: &mut MeasurementStore,
    ) -> Result<TrialOutcome, TrialError> {
        if self.state != SessionState::AwaitingCapture {
            return Err(TrialError::InvalidTransition {
                state: self.state,
                action: "wait for a capture",
            });
        }

        match signals.recv().map_err(|_| TrialError::Disconnected)? {
            SessionSignal::Capture(frames) => self.submit_capture(&frames, store),
            SessionSignal::Abort => {
                self.abort()?;
                Ok(TrialOutcome::Aborted)
            }
        }
    }
}
