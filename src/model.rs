//! Data model for performance data: the timed notes a score turns into.
//!
//! These structures are produced by the performance reader and are
//! read-only for the rest of a render.

use serde::{Deserialize, Serialize};

/// MIDI channel index reserved for percussion (channel 10 in 1-based terms).
pub const PERCUSSION_CHANNEL: u8 = 9;

/// One sounding note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI pitch, 0–127 (60 = middle C)
    pub pitch: u8,
    /// Onset in seconds from the start of the performance
    pub start: f64,
    /// Release in seconds from the start of the performance
    pub end: f64,
}

impl NoteEvent {
    pub fn new(pitch: u8, start: f64, end: f64) -> Self {
        Self { pitch, start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Notes from one (SMF track, MIDI channel) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Track name meta event, if any
    pub name: Option<String>,
    /// MIDI channel (0-based)
    pub channel: u8,
    /// Last program change seen on the channel
    pub program: Option<u8>,
    /// Drum tracks are not drawn
    pub is_percussion: bool,
    /// Notes ordered by onset
    pub notes: Vec<NoteEvent>,
}

impl Track {
    pub fn new(channel: u8) -> Self {
        Self {
            name: None,
            channel,
            program: None,
            is_percussion: channel == PERCUSSION_CHANNEL,
            notes: Vec::new(),
        }
    }
}

/// A complete performance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub tracks: Vec<Track>,
}

impl Performance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest note release across all tracks, percussion included.
    pub fn end_time(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(|n| n.end)
            .fold(0.0, f64::max)
    }

    /// Notes of every non-percussion track, in track order.
    pub fn melodic_notes(&self) -> impl Iterator<Item = &NoteEvent> + '_ {
        self.tracks
            .iter()
            .filter(|t| !t.is_percussion)
            .flat_map(|t| t.notes.iter())
    }

    pub fn note_count(&self) -> usize {
        self.melodic_notes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.melodic_notes().next().is_none()
    }
}
