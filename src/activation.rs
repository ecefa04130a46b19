//! Activation matrix — the per-frame, per-pitch sustain countdown that
//! drives every visual.
//!
//! Row `t` covers video frame `t` of the performance. A cell holds the
//! number of frames the note at that pitch still sounds, counting the
//! current one: a note active on frames 3..=5 writes 3, 2, 1. Zero means
//! silent. The keyboard reads it as a pressed flag; the note lane reads it
//! as the bar length.

use crate::config::OverlapPolicy;
use crate::model::{NoteEvent, Performance};

pub const PITCH_COUNT: usize = 128;

pub type MatrixRow = [u32; PITCH_COUNT];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationMatrix {
    rows: Vec<MatrixRow>,
}

impl ActivationMatrix {
    /// Build the matrix for the melodic notes of a performance.
    ///
    /// Sized `ceil(end_time × fps) + 1` rows, where `end_time` is the latest
    /// release in the whole performance (drums included, so the video never
    /// ends before the audio).
    pub fn build(performance: &Performance, frame_rate: u32, policy: OverlapPolicy) -> Self {
        Self::from_notes(
            performance.melodic_notes(),
            performance.end_time(),
            frame_rate,
            policy,
        )
    }

    pub fn from_notes<'a, I>(notes: I, end_time: f64, frame_rate: u32, policy: OverlapPolicy) -> Self
    where
        I: IntoIterator<Item = &'a NoteEvent>,
    {
        let fps = frame_rate as f64;
        let row_count = (end_time.max(0.0) * fps).ceil() as usize + 1;
        let mut rows = vec![[0u32; PITCH_COUNT]; row_count];

        for note in notes {
            let pitch = (note.pitch & 0x7F) as usize;
            let first = (note.start.max(0.0) * fps).ceil() as usize;
            let end_frame = (note.end.max(0.0) * fps).floor() as usize;
            // Notes ending past `end_time` cannot happen for a performance's own
            // notes; clamp so a caller-supplied end time never panics.
            let last = end_frame.min(row_count - 1);

            for i in first..=last {
                let remaining = (end_frame + 1 - i) as u32;
                let cell = &mut rows[i][pitch];
                *cell = match policy {
                    OverlapPolicy::LastWriteWins => remaining,
                    OverlapPolicy::LongestWins => (*cell).max(remaining),
                };
            }
        }

        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Row at a signed frame offset; `None` outside `[0, row_count)`.
    pub fn row(&self, frame: i64) -> Option<&MatrixRow> {
        usize::try_from(frame).ok().and_then(|i| self.rows.get(i))
    }

    pub fn get(&self, frame: i64, pitch: u8) -> u32 {
        self.row(frame).map_or(0, |r| r[(pitch & 0x7F) as usize])
    }

    pub fn rows(&self) -> &[MatrixRow] {
        &self.rows
    }

    /// True when no cell is active.
    pub fn is_silent(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(|&c| c == 0))
    }
}
