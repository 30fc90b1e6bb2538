use aim_schema::{MapNote, ReplayFrame};
use glam::DVec2;

use crate::config::ExtractConfig;

/// Where and when the press that hit a note landed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitPoint {
    pub x: f64,
    pub y: f64,
    pub time_ms: f64,
}

/// One row of the score table: a map note and the press matched to it, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEntry {
    pub note_index: usize,
    pub map_x: f64,
    pub map_y: f64,
    pub map_t: f64,
    /// `None` when the note was missed.
    pub hit: Option<HitPoint>,
}

impl ScoreEntry {
    fn miss(note_index: usize, note: &MapNote) -> Self {
        Self {
            note_index,
            map_x: note.x,
            map_y: note.y,
            map_t: note.time_ms,
            hit: None,
        }
    }

    pub fn is_miss(&self) -> bool {
        self.hit.is_none()
    }

    pub fn map_pos(&self) -> DVec2 {
        DVec2::new(self.map_x, self.map_y)
    }
}

/// Judges presses against notes strictly in map order.
pub struct ScoreMachine {
    /// Index of the next unjudged note.
    pub next_note_index: usize,

    pub hit_radius: f64,
    // Window half-widths in ms
    pub early_ms: f64,
    pub late_ms: f64,
}

impl ScoreMachine {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            next_note_index: 0,
            hit_radius: config.hit_radius,
            // A note that is not yet visible cannot be hit.
            early_ms: config.hit_windows.early_ms.min(config.approach_window_ms),
            late_ms: config.hit_windows.late_ms,
        }
    }

    /// Judges one press. Call `check_misses` for the press time first.
    pub fn process_press(&mut self, frame: &ReplayFrame, map: &[MapNote]) -> Option<ScoreEntry> {
        let idx = self.next_note_index;
        let note = map.get(idx)?;

        // Written as accept conditions so NaN never passes.
        let delta = frame.time_ms - note.time_ms;
        if !(delta >= -self.early_ms && delta <= self.late_ms) {
            return None;
        }

        let dist = DVec2::new(frame.x - note.x, frame.y - note.y).length();
        if !(dist <= self.hit_radius) {
            return None;
        }

        self.next_note_index = idx + 1;
        Some(ScoreEntry {
            note_index: idx,
            map_x: note.x,
            map_y: note.y,
            map_t: note.time_ms,
            hit: Some(HitPoint {
                x: frame.x,
                y: frame.y,
                time_ms: frame.time_ms,
            }),
        })
    }

    /// Marks every note whose late window closed before `current_time` as missed.
    /// A NaN time expires nothing.
    pub fn check_misses(&mut self, current_time: f64, map: &[MapNote]) -> Vec<ScoreEntry> {
        let mut results = Vec::new();
        while let Some(note) = map.get(self.next_note_index) {
            if !(current_time > note.time_ms + self.late_ms) {
                break;
            }
            results.push(ScoreEntry::miss(self.next_note_index, note));
            self.next_note_index += 1;
        }
        results
    }

    /// Misses for every note left once the capture has ended.
    pub fn finish(&mut self, map: &[MapNote]) -> Vec<ScoreEntry> {
        let start = self.next_note_index.min(map.len());
        self.next_note_index = map.len();
        map[start..]
            .iter()
            .enumerate()
            .map(|(offset, note)| ScoreEntry::miss(start + offset, note))
            .collect()
    }
}

/// Scores a whole capture. Returns one entry per map note, in map order.
pub fn score_trial(map: &[MapNote], replay: &[ReplayFrame], config: &ExtractConfig) -> Vec<ScoreEntry> {
    let mut machine = ScoreMachine::new(config);
    let mut entries = Vec::with_capacity(map.len());

    for frame in replay.iter().filter(|f| f.is_press()) {
        entries.extend(machine.check_misses(frame.time_ms, map));
        if let Some(entry) = machine.process_press(frame, map) {
            entries.push(entry);
        }
    }
    entries.extend(machine.finish(map));
    entries
}
