//! Shared fixtures for the integration tests: tiny MIDI files authored with
//! midly, minimal WAV files, and a MusicXML document.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

/// Ticks per quarter note in every fixture. At the default 120 BPM one
/// second is `2 * TPQ` ticks.
pub const TPQ: u16 = 480;
pub const TICKS_PER_SECOND: u32 = 2 * TPQ as u32;

/// A note in fixture ticks.
#[derive(Debug, Clone, Copy)]
pub struct FixtureNote {
    pub channel: u8,
    pub pitch: u8,
    pub start: u32,
    pub end: u32,
}

impl FixtureNote {
    pub fn secs(pitch: u8, start: f64, end: f64) -> Self {
        Self {
            channel: 0,
            pitch,
            start: (start * TICKS_PER_SECOND as f64).round() as u32,
            end: (end * TICKS_PER_SECOND as f64).round() as u32,
        }
    }

    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }
}

/// Build a format-1 SMF: a tempo track plus one track holding `notes`.
pub fn smf_bytes(track_name: Option<&str>, notes: &[FixtureNote]) -> Vec<u8> {
    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(TPQ))));

    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);

    // (tick, is_on, channel, pitch); offs sort before ons on the same tick.
    let mut timed: Vec<(u32, bool, u8, u8)> = Vec::new();
    for n in notes {
        timed.push((n.start, true, n.channel, n.pitch));
        timed.push((n.end, false, n.channel, n.pitch));
    }
    timed.sort_by_key(|&(tick, on, _, _)| (tick, on));

    let mut track = Vec::new();
    if let Some(name) = track_name {
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
        });
    }
    let mut last = 0;
    for (tick, on, channel, pitch) in timed {
        let message = if on {
            MidiMessage::NoteOn {
                key: u7::new(pitch),
                vel: u7::new(80),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(pitch),
                vel: u7::new(0),
            }
        };
        track.push(TrackEvent {
            delta: u28::new(tick - last),
            kind: TrackEventKind::Midi {
                channel: u4::new(channel),
                message,
            },
        });
        last = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    let mut out = Vec::new();
    smf.write_std(&mut out).expect("write SMF");
    out
}

pub fn write_midi(dir: &Path, name: &str, notes: &[FixtureNote]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, smf_bytes(Some("Fixture"), notes)).expect("write MIDI fixture");
    path
}

/// The canonical scenario: middle C held for exactly one second.
pub fn middle_c_second() -> Vec<FixtureNote> {
    vec![FixtureNote::secs(60, 0.0, 1.0)]
}

/// A 16-bit mono PCM WAV holding `samples` zero samples.
pub fn wav_bytes(samples: usize) -> Vec<u8> {
    let data_len = (samples * 2) as u32;
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&44_100u32.to_le_bytes());
    out.extend_from_slice(&88_200u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(out.len() + data_len as usize, 0);
    out
}

pub const MUSICXML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">
<score-partwise version="3.1">
  <work><work-title>Etude</work-title></work>
  <identification><creator type="composer">Czerny</creator></identification>
  <part-list>
    <score-part id="P1"><part-name>Right</part-name></score-part>
    <score-part id="P2"><part-name>Left</part-name></score-part>
  </part-list>
  <part id="P1"><measure number="1"/></part>
  <part id="P2"><measure number="1"/></part>
</score-partwise>"#;
