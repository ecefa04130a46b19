//! Video timeline — maps output frames to matrix offsets and splits the
//! clip into the silent lead-in and the main segment that carries audio.
//!
//! The clip runs `frames_on_screen` frames longer than the matrix at both
//! ends: at the start so the first notes scroll in from the top before they
//! sound, at the end so the last notes scroll out.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timeline {
    pub frame_rate: u32,
    pub matrix_rows: usize,
    pub frames_on_screen: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Notes scroll in; no audio yet.
    LeadIn,
    /// Audio starts at the first frame of this segment.
    Main,
}

/// A contiguous run of output frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentSpan {
    pub kind: SegmentKind,
    pub first_frame: usize,
    pub frame_count: usize,
}

impl SegmentSpan {
    pub fn frames(&self) -> std::ops::Range<usize> {
        self.first_frame..self.first_frame + self.frame_count
    }

    pub fn has_audio(&self) -> bool {
        self.kind == SegmentKind::Main
    }
}

impl Timeline {
    pub fn new(frame_rate: u32, matrix_rows: usize, frames_on_screen: usize) -> Self {
        Self {
            frame_rate,
            matrix_rows,
            frames_on_screen,
        }
    }

    pub fn total_frames(&self) -> usize {
        self.matrix_rows + 2 * self.frames_on_screen
    }

    pub fn lead_in_frames(&self) -> usize {
        self.frames_on_screen
    }

    pub fn duration_secs(&self) -> f64 {
        self.total_frames() as f64 / self.frame_rate as f64
    }

    pub fn lead_in_secs(&self) -> f64 {
        self.lead_in_frames() as f64 / self.frame_rate as f64
    }

    /// Matrix offset drawn at output frame `index`.
    pub fn frame_offset(&self, index: usize) -> i64 {
        index as i64 - self.frames_on_screen as i64
    }

    /// Matrix offset drawn at playback time `t` (seconds from clip start).
    pub fn offset_at(&self, t: f64) -> i64 {
        (t * self.frame_rate as f64).floor() as i64 - self.frames_on_screen as i64
    }

    pub fn segments(&self) -> [SegmentSpan; 2] {
        let lead_in = self.lead_in_frames();
        [
            SegmentSpan {
                kind: SegmentKind::LeadIn,
                first_frame: 0,
                frame_count: lead_in,
            },
            SegmentSpan {
                kind: SegmentKind::Main,
                first_frame: lead_in,
                frame_count: self.total_frames() - lead_in,
            },
        ]
    }
}
