//! Render configuration — frame geometry, colors, the sound profile and the
//! external tools a job shells out to.
//!
//! Every field has a default, so a JSON config file only needs the values it
//! changes:
//!
//! ```json
//! { "frame_rate": 60, "sound_profile": { "name": "grand", "path": "grand.sf2" } }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::canvas::Rgb;
use crate::error::RenderError;

// ── Defaults ────────────────────────────────────────────────────────
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const DEFAULT_FRAME_PIXEL_SIZE: u32 = 6; // height of one matrix row in the note lane
pub const DEFAULT_WHITE_KEY_WIDTH: u32 = 24;
pub const DEFAULT_KEYBOARD_HEIGHT: u32 = 144;
pub const DEFAULT_SCREEN_HEIGHT: u32 = 702;
/// White keys on an 88-key keyboard.
pub const WHITE_KEY_COUNT: u32 = 52;

/// What happens when two notes of the same pitch land on the same matrix cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// The note processed later overwrites the cell.
    #[default]
    LastWriteWins,
    /// The cell keeps whichever countdown is longer.
    LongestWins,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub lane_background: Rgb,
    pub white_note: Rgb,
    pub black_note: Rgb,
    pub keyboard_background: Rgb,
    pub key_outline: Rgb,
    pub black_key: Rgb,
    pub pressed_white_key: Rgb,
    pub pressed_black_key: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            lane_background: Rgb([16, 16, 16]),
            white_note: Rgb([0, 128, 250]),
            black_note: Rgb([250, 128, 0]),
            keyboard_background: Rgb::WHITE,
            key_outline: Rgb::BLACK,
            black_key: Rgb::BLACK,
            pressed_white_key: Rgb([0, 128, 250]),
            pressed_black_key: Rgb([250, 128, 0]),
        }
    }
}

/// A named instrument timbre (SoundFont file) handed to the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundProfile {
    pub name: String,
    pub path: PathBuf,
}

impl Default for SoundProfile {
    fn default() -> Self {
        Self {
            name: "piano".into(),
            path: PathBuf::from("piano.sf3"),
        }
    }
}

/// Executables for the external collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub fluidsynth: PathBuf,
    pub musescore: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        let from_env = |var: &str, fallback: &str| {
            std::env::var_os(var)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(fallback))
        };
        Self {
            ffmpeg: from_env("PIANOROLL_FFMPEG", "ffmpeg"),
            fluidsynth: from_env("PIANOROLL_FLUIDSYNTH", "fluidsynth"),
            musescore: from_env("PIANOROLL_MUSESCORE", "mscore"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub frame_rate: u32,
    pub frame_pixel_size: u32,
    pub white_key_width: u32,
    /// Defaults to `round(white_key_width * 7 / 12)`.
    pub black_key_width: Option<u32>,
    pub keyboard_height: u32,
    /// Defaults to 52 white keys.
    pub screen_width: Option<u32>,
    pub screen_height: u32,
    pub palette: Palette,
    pub overlap_policy: OverlapPolicy,
    /// Fail with `RenderError::EmptyScore` instead of rendering a blank video.
    pub reject_empty_scores: bool,
    pub sound_profile: SoundProfile,
    pub tools: ToolPaths,
    pub audio_sample_rate: u32,
    pub synth_gain: f32,
    pub encoder_threads: u32,
    /// Parent directory for per-job scratch workspaces. System temp dir if unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            frame_pixel_size: DEFAULT_FRAME_PIXEL_SIZE,
            white_key_width: DEFAULT_WHITE_KEY_WIDTH,
            black_key_width: None,
            keyboard_height: DEFAULT_KEYBOARD_HEIGHT,
            screen_width: None,
            screen_height: DEFAULT_SCREEN_HEIGHT,
            palette: Palette::default(),
            overlap_policy: OverlapPolicy::default(),
            reject_empty_scores: false,
            sound_profile: SoundProfile::default(),
            tools: ToolPaths::default(),
            audio_sample_rate: 44_100,
            synth_gain: 0.8,
            encoder_threads: 4,
            work_dir: None,
        }
    }
}

impl RenderConfig {
    /// Load a config from a JSON file; missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RenderError::io(format!("reading config '{}'", path.display()), e))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(json: &str) -> Result<Self, RenderError> {
        serde_json::from_str(json).map_err(|e| RenderError::Config(format!("bad config JSON: {e}")))
    }

    pub fn black_key_width(&self) -> u32 {
        self.black_key_width
            .unwrap_or_else(|| (self.white_key_width as f64 * 7.0 / 12.0).round() as u32)
    }

    pub fn screen_width(&self) -> u32 {
        self.screen_width
            .unwrap_or(WHITE_KEY_COUNT * self.white_key_width)
    }

    pub fn note_lane_height(&self) -> u32 {
        self.screen_height.saturating_sub(self.keyboard_height)
    }

    /// Number of matrix rows visible in the note lane at once.
    pub fn frames_on_screen(&self) -> usize {
        if self.frame_pixel_size == 0 {
            return 0;
        }
        (self.note_lane_height() as f64 / self.frame_pixel_size as f64).round() as usize
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        let fail = |msg: String| Err(RenderError::Config(msg));

        if self.frame_rate == 0 {
            return fail("frame_rate must be positive".into());
        }
        if self.frame_pixel_size == 0 {
            return fail("frame_pixel_size must be positive".into());
        }
        if self.white_key_width == 0 || self.black_key_width() == 0 {
            return fail("key widths must be positive".into());
        }
        if self.keyboard_height == 0 || self.keyboard_height >= self.screen_height {
            return fail(format!(
                "keyboard_height {} must be positive and below screen_height {}",
                self.keyboard_height, self.screen_height
            ));
        }
        if self.frames_on_screen() == 0 {
            return fail("note lane is shorter than one frame row".into());
        }
        // yuv420p needs even dimensions.
        let (w, h) = (self.screen_width(), self.screen_height);
        if w == 0 || w % 2 != 0 || h % 2 != 0 {
            return fail(format!("screen size {w}x{h} must be non-zero and even"));
        }
        if self.encoder_threads == 0 {
            return fail("encoder_threads must be positive".into());
        }
        Ok(())
    }
}
