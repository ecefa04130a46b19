//! Error taxonomy for a render job.
//!
//! Every fatal failure aborts the job and carries enough detail for a
//! front end to show a message. `kind()` gives a stable tag for callers
//! that only branch on the category.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// The render configuration is unusable (zero frame rate, keyboard taller
    /// than the screen, ...).
    #[error("invalid render configuration: {0}")]
    Config(String),

    /// The score or performance file is unreadable or could not be converted.
    #[error("could not read score '{}': {reason}", path.display())]
    InputFormat { path: PathBuf, reason: String },

    /// The sound font is missing, the synthesizer failed, or it produced no audio.
    #[error("audio synthesis failed: {0}")]
    AudioSynthesis(String),

    /// The performance holds no melodic notes and empty scores are rejected.
    #[error("score contains no playable notes")]
    EmptyScore,

    /// The video writer failed (missing ffmpeg, codec error, disk full, ...).
    #[error("video encoding failed: {0}")]
    Encoding(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A render task thread panicked before producing a result.
    #[error("render worker panicked")]
    WorkerPanicked,
}

impl RenderError {
    pub(crate) fn input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RenderError::InputFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RenderError::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable snake_case category name, used in the JSON outcome.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::Config(_) => "config",
            RenderError::InputFormat { .. } => "input_format",
            RenderError::AudioSynthesis(_) => "audio_synthesis",
            RenderError::EmptyScore => "empty_score",
            RenderError::Encoding(_) => "encoding",
            RenderError::Io { .. } => "io",
            RenderError::WorkerPanicked => "worker_panicked",
        }
    }
}
