//! Keyboard geometry — where each pitch sits on screen.
//!
//! The drawn keyboard has 88 keys, A0 (21) to C8 (108). The octave grid is
//! anchored so that A0 lands at x = 0: the partial lowest octave contributes
//! two white keys (A0, B0) before the first full octave starting at C1.
//! Pitches outside the 88-key range still get positions; they simply fall
//! off the canvas and are clipped.
//!
//! The same `KeyboardGeometry` feeds both the keyboard strip and the note
//! lane, so falling bars always line up with their keys.

use crate::config::RenderConfig;

pub const SEMITONES_PER_OCTAVE: u8 = 12;
pub const WHITE_PITCH_CLASSES: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
pub const BLACK_PITCH_CLASSES: [u8; 5] = [1, 3, 6, 8, 10];

/// Lowest and highest keys on the drawn keyboard.
pub const LOWEST_KEY: u8 = 21;
pub const HIGHEST_KEY: u8 = 108;
/// Full octaves of black keys drawn above the special lowest one (A#0).
const FULL_OCTAVES: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    White,
    Black,
}

/// Horizontal placement of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPosition {
    pub kind: KeyKind,
    /// Left edge in pixels (may be negative for pitches below A0)
    pub x: i64,
    pub width: i64,
}

impl KeyPosition {
    pub fn is_black(&self) -> bool {
        self.kind == KeyKind::Black
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        self.x + self.width
    }
}

#[derive(Debug, Clone)]
pub struct KeyboardGeometry {
    white_width: i64,
    black_width: i64,
    positions: [KeyPosition; 128],
}

impl KeyboardGeometry {
    pub fn new(white_width: u32, black_width: u32) -> Self {
        let white_width = white_width as i64;
        let black_width = black_width as i64;
        let positions = std::array::from_fn(|pitch| {
            key_position(pitch as u8, white_width, black_width)
        });
        Self {
            white_width,
            black_width,
            positions,
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(config.white_key_width, config.black_key_width())
    }

    pub fn white_width(&self) -> i64 {
        self.white_width
    }

    pub fn black_width(&self) -> i64 {
        self.black_width
    }

    /// Placement of a MIDI pitch. Pitches above 127 are masked to 7 bits.
    pub fn key(&self, pitch: u8) -> KeyPosition {
        self.positions[(pitch & 0x7F) as usize]
    }

    /// Left edges of the 52 white keys, left to right.
    pub fn white_key_columns(&self, count: u32) -> impl Iterator<Item = i64> + '_ {
        (0..count as i64).map(move |i| i * self.white_width)
    }

    /// Left edges of the drawn black keys: A#0 first, then 7 octaves of 5.
    pub fn black_key_columns(&self) -> Vec<i64> {
        let w = self.white_width;
        let b = self.black_width;
        let mut columns = Vec::with_capacity(1 + FULL_OCTAVES as usize * BLACK_PITCH_CLASSES.len());
        // A#0 sits between A0 and B0 of the partial lowest octave.
        columns.push(2 * w - 2 * b);
        for octave in 0..FULL_OCTAVES {
            for &pc in &BLACK_PITCH_CLASSES {
                columns.push(2 * w + octave * 7 * w + pc as i64 * b);
            }
        }
        columns
    }
}

impl Default for KeyboardGeometry {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

pub fn is_black_key(pitch: u8) -> bool {
    BLACK_PITCH_CLASSES.contains(&(pitch % SEMITONES_PER_OCTAVE))
}

/// Index of a white pitch class within its octave (C = 0 ... B = 6).
pub fn white_index(pitch: u8) -> Option<usize> {
    let pc = pitch % SEMITONES_PER_OCTAVE;
    WHITE_PITCH_CLASSES.iter().position(|&w| w == pc)
}

fn key_position(pitch: u8, white_width: i64, black_width: i64) -> KeyPosition {
    let octave = (pitch / SEMITONES_PER_OCTAVE) as i64;
    // Shift left by 12 white widths: pitch 21 (A0) has octave 1 and white
    // index 5, which puts it at 7W - 12W + 5W = 0.
    let octave_origin = octave * 7 * white_width - 12 * white_width;

    match white_index(pitch) {
        Some(idx) => KeyPosition {
            kind: KeyKind::White,
            x: octave_origin + idx as i64 * white_width,
            width: white_width,
        },
        None => KeyPosition {
            kind: KeyKind::Black,
            x: octave_origin + (pitch % SEMITONES_PER_OCTAVE) as i64 * black_width,
            width: black_width,
        },
    }
}
