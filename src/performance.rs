//! Performance reader — turns a Standard MIDI File into timed notes.
//!
//! Handles format 0/1/2 files with metrical or SMPTE timing. Tempo meta
//! events from every track build one shared tempo map (format 1 files keep
//! them in track 0). Each (track, channel) pair becomes one `Track`; channel
//! 10 is flagged as percussion.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::error::RenderError;
use crate::model::{NoteEvent, Performance, Track};

/// Tempo in effect until the first tempo event (120 BPM).
const DEFAULT_US_PER_QUARTER: f64 = 500_000.0;

// ═══════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════

/// Read a performance from a MIDI file on disk.
pub fn read_performance<P: AsRef<Path>>(path: P) -> Result<Performance, RenderError> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .map_err(|e| RenderError::input(path, format!("failed to read performance: {e}")))?;
    parse_performance(&data).map_err(|reason| RenderError::input(path, reason))
}

/// Parse a performance from raw SMF bytes.
pub fn parse_performance(data: &[u8]) -> Result<Performance, String> {
    let smf = Smf::parse(data).map_err(|e| format!("invalid MIDI data: {e}"))?;
    let tempo = TempoMap::from_smf(&smf);

    let mut performance = Performance::new();
    for (track_idx, events) in smf.tracks.iter().enumerate() {
        performance
            .tracks
            .extend(collect_track_notes(track_idx, events, &tempo));
    }

    log::debug!(
        "parsed performance: {} tracks, {} melodic notes, ends at {:.3}s",
        performance.tracks.len(),
        performance.note_count(),
        performance.end_time()
    );
    Ok(performance)
}

// ═══════════════════════════════════════════════════════════════════════
// Tempo map
// ═══════════════════════════════════════════════════════════════════════

/// One constant-tempo stretch starting at `tick`.
#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    tick: u64,
    /// Wall-clock time at `tick`
    seconds: f64,
    us_per_quarter: f64,
}

/// Converts absolute ticks to seconds.
#[derive(Debug, Clone)]
pub struct TempoMap {
    kind: TempoKind,
}

#[derive(Debug, Clone)]
enum TempoKind {
    Metrical {
        ticks_per_quarter: f64,
        segments: Vec<TempoSegment>,
    },
    /// SMPTE timing ignores tempo events.
    Timecode { ticks_per_second: f64 },
}

impl TempoMap {
    fn from_smf(smf: &Smf) -> Self {
        let ticks_per_quarter = match smf.header.timing {
            Timing::Metrical(tpq) => tpq.as_int().max(1) as f64,
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = (fps.as_f32() as f64 * subframes as f64).max(1.0);
                return Self {
                    kind: TempoKind::Timecode { ticks_per_second },
                };
            }
        };

        let mut changes: Vec<(u64, f64)> = Vec::new();
        for events in &smf.tracks {
            let mut tick: u64 = 0;
            for event in events {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(uspq)) = event.kind {
                    changes.push((tick, uspq.as_int() as f64));
                }
            }
        }
        changes.sort_by_key(|&(tick, _)| tick);

        Self::metrical(ticks_per_quarter, &changes)
    }

    /// Build a metrical map from `(tick, microseconds per quarter)` changes
    /// sorted by tick.
    pub fn metrical(ticks_per_quarter: f64, changes: &[(u64, f64)]) -> Self {
        let mut segments = vec![TempoSegment {
            tick: 0,
            seconds: 0.0,
            us_per_quarter: DEFAULT_US_PER_QUARTER,
        }];

        for &(tick, uspq) in changes {
            let last = segments[segments.len() - 1];
            let seconds = last.seconds
                + ticks_to_seconds(tick.saturating_sub(last.tick), last.us_per_quarter, ticks_per_quarter);
            if tick == last.tick {
                // A later event on the same tick replaces the earlier one.
                segments.pop();
            }
            segments.push(TempoSegment {
                tick,
                seconds,
                us_per_quarter: uspq,
            });
        }

        Self {
            kind: TempoKind::Metrical {
                ticks_per_quarter,
                segments,
            },
        }
    }

    /// Wall-clock seconds at an absolute tick.
    pub fn seconds_at(&self, tick: u64) -> f64 {
        match &self.kind {
            TempoKind::Timecode { ticks_per_second } => tick as f64 / ticks_per_second,
            TempoKind::Metrical {
                ticks_per_quarter,
                segments,
            } => {
                let idx = segments.partition_point(|s| s.tick <= tick).saturating_sub(1);
                let seg = &segments[idx];
                seg.seconds + ticks_to_seconds(tick - seg.tick, seg.us_per_quarter, *ticks_per_quarter)
            }
        }
    }
}

fn ticks_to_seconds(ticks: u64, us_per_quarter: f64, ticks_per_quarter: f64) -> f64 {
    ticks as f64 * us_per_quarter / 1_000_000.0 / ticks_per_quarter
}

// ═══════════════════════════════════════════════════════════════════════
// Note pairing
// ═══════════════════════════════════════════════════════════════════════

/// Pair note-on / note-off events of one SMF track into per-channel tracks.
///
/// A note-off closes the oldest open note of the same key on the same
/// channel. Notes still open at the end of the track are dropped.
fn collect_track_notes(
    track_idx: usize,
    events: &[midly::TrackEvent],
    tempo: &TempoMap,
) -> Vec<Track> {
    let mut name: Option<String> = None;
    let mut programs: HashMap<u8, u8> = HashMap::new();
    let mut open: HashMap<(u8, u8), VecDeque<u64>> = HashMap::new();
    let mut channels: BTreeMap<u8, Track> = BTreeMap::new();

    let mut tick: u64 = 0;
    for event in events {
        tick += event.delta.as_int() as u64;
        match event.kind {
            TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                name = Some(String::from_utf8_lossy(bytes).trim().to_string());
            }
            TrackEventKind::Midi { channel, message } => {
                let ch = channel.as_int();
                match message {
                    MidiMessage::ProgramChange { program } => {
                        programs.insert(ch, program.as_int());
                    }
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        open.entry((ch, key.as_int())).or_default().push_back(tick);
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        let pitch = key.as_int();
                        let Some(start_tick) = open.get_mut(&(ch, pitch)).and_then(|q| q.pop_front())
                        else {
                            continue;
                        };
                        channels
                            .entry(ch)
                            .or_insert_with(|| Track::new(ch))
                            .notes
                            .push(NoteEvent::new(
                                pitch,
                                tempo.seconds_at(start_tick),
                                tempo.seconds_at(tick),
                            ));
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    let dangling: usize = open.values().map(VecDeque::len).sum();
    if dangling > 0 {
        log::warn!("track {track_idx}: dropped {dangling} notes without a note-off");
    }

    channels
        .into_values()
        .map(|mut track| {
            track.name = name.clone();
            track.program = programs.get(&track.channel).copied();
            track.notes.sort_by(|a, b| a.start.total_cmp(&b.start));
            track
        })
        .collect()
}
