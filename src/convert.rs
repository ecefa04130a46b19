//! External collaborators: notation → performance and performance → audio.
//!
//! Both are traits so a host can plug in its own converters (and tests can
//! run without MuseScore or FluidSynth installed). The default
//! implementations shell out to the command-line tools.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::config::{RenderConfig, SoundProfile};
use crate::error::RenderError;
use crate::score::ScoreFormat;

/// Converts a notation file into a Standard MIDI File.
/// Never called for inputs that are already MIDI.
pub trait ScoreConverter {
    fn convert(&self, score: &Path, format: ScoreFormat, performance_out: &Path) -> Result<(), RenderError>;
}

/// Renders a performance file to audio with a sound profile.
pub trait AudioSynthesizer {
    fn synthesize(
        &self,
        performance: &Path,
        profile: &SoundProfile,
        audio_out: &Path,
    ) -> Result<(), RenderError>;
}

// ═══════════════════════════════════════════════════════════════════════
// MuseScore
// ═══════════════════════════════════════════════════════════════════════

/// Converts MusicXML / MXL with the MuseScore command line (`mscore -o out.mid in`).
#[derive(Debug, Clone)]
pub struct MuseScoreConverter {
    pub program: PathBuf,
}

impl MuseScoreConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(&config.tools.musescore)
    }
}

impl ScoreConverter for MuseScoreConverter {
    fn convert(&self, score: &Path, format: ScoreFormat, performance_out: &Path) -> Result<(), RenderError> {
        log::debug!("converting {format:?} score with MuseScore");
        let mut cmd = Command::new(&self.program);
        cmd.arg("-o").arg(performance_out).arg(score);

        run_tool(&mut cmd, "score converter")
            .map_err(|reason| RenderError::input(score, reason))?;

        match std::fs::metadata(performance_out) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(RenderError::input(
                score,
                "score converter finished but wrote no performance file",
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// FluidSynth
// ═══════════════════════════════════════════════════════════════════════

/// Renders MIDI to WAV with FluidSynth in fast-render mode.
#[derive(Debug, Clone)]
pub struct FluidSynth {
    pub program: PathBuf,
    pub sample_rate: u32,
    pub gain: f32,
}

impl FluidSynth {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            program: config.tools.fluidsynth.clone(),
            sample_rate: config.audio_sample_rate,
            gain: config.synth_gain,
        }
    }
}

impl AudioSynthesizer for FluidSynth {
    fn synthesize(
        &self,
        performance: &Path,
        profile: &SoundProfile,
        audio_out: &Path,
    ) -> Result<(), RenderError> {
        if !profile.path.is_file() {
            return Err(RenderError::AudioSynthesis(format!(
                "sound font for profile '{}' not found at '{}'",
                profile.name,
                profile.path.display()
            )));
        }

        let mut cmd = Command::new(&self.program);
        cmd.arg("-ni")
            .arg("-g")
            .arg(self.gain.to_string())
            .arg("-F")
            .arg(audio_out)
            .arg("-r")
            .arg(self.sample_rate.to_string())
            .arg(&profile.path)
            .arg(performance);

        run_tool(&mut cmd, "audio synthesizer").map_err(RenderError::AudioSynthesis)?;
        verify_audio(audio_out)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════

/// Run an external tool to completion, turning a spawn failure or non-zero
/// exit into a readable message that includes the tool's stderr.
pub(crate) fn run_tool(cmd: &mut Command, what: &str) -> Result<Output, String> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    log::debug!("running {what}: {}", describe(cmd));

    let output = cmd.output().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            format!("{what} '{program}' was not found on PATH")
        } else {
            format!("failed to start {what} '{program}': {e}")
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        return Err(format!("{what} '{program}' failed ({}): {stderr}", output.status));
    }
    Ok(output)
}

pub(crate) fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check that a synthesized audio file exists and holds samples.
///
/// WAV files are walked chunk by chunk and must have a non-empty `data`
/// chunk; any other file only needs to be non-empty.
pub fn verify_audio(path: &Path) -> Result<(), RenderError> {
    let data = std::fs::read(path).map_err(|e| {
        RenderError::AudioSynthesis(format!("no audio written to '{}': {e}", path.display()))
    })?;
    if data.is_empty() {
        return Err(RenderError::AudioSynthesis(format!(
            "audio file '{}' is empty",
            path.display()
        )));
    }

    if data.starts_with(b"RIFF") {
        match wav_data_len(&data) {
            Some(len) if len > 0 => {}
            _ => {
                return Err(RenderError::AudioSynthesis(format!(
                    "audio file '{}' contains no samples",
                    path.display()
                )))
            }
        }
    }
    Ok(())
}

/// Length of the `data` chunk of a RIFF/WAVE file.
fn wav_data_len(data: &[u8]) -> Option<u32> {
    if data.len() < 12 || &data[8..12] != b"WAVE" {
        return None;
    }
    let mut pos = 12;
    while pos + 8 <= data.len() {
        let id = &data[pos..pos + 4];
        let len = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().ok()?);
        if id == b"data" {
            // Streaming writers may leave the size unset; count what is there.
            let available = (data.len() - pos - 8) as u32;
            return Some(len.min(available));
        }
        // Chunks are padded to even sizes.
        pos += 8 + len as usize + (len as usize & 1);
    }
    None
}
