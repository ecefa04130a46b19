//! pianoroll — renders a score as a falling-notes piano video.
//!
//! Accepts MusicXML (.musicxml / .xml), compressed MXL (.mxl) and Standard
//! MIDI Files. Notation is converted to a performance by an external
//! converter, the performance is synthesized to audio, and every video frame
//! is drawn from a per-frame activation matrix before ffmpeg muxes the lot.
//!
//! # Example
//! ```no_run
//! use pianoroll::{render_file_to_video, RenderConfig};
//!
//! let report = render_file_to_video("song.mxl", "song.mp4", &RenderConfig::default()).unwrap();
//! println!("{} frames, {:.1}s", report.total_frames, report.duration_secs);
//! ```

pub mod activation;
pub mod canvas;
pub mod compositor;
pub mod config;
pub mod convert;
pub mod encoder;
pub mod error;
pub mod geometry;
pub mod model;
pub mod performance;
pub mod pipeline;
pub mod score;
pub mod task;
pub mod timeline;

use std::path::Path;

use serde::Serialize;

pub use activation::{ActivationMatrix, MatrixRow, PITCH_COUNT};
pub use canvas::{FrameCanvas, Rgb};
pub use compositor::FrameCompositor;
pub use config::{OverlapPolicy, Palette, RenderConfig, SoundProfile, ToolPaths};
pub use convert::{AudioSynthesizer, FluidSynth, MuseScoreConverter, ScoreConverter};
pub use encoder::{FfmpegMuxer, SegmentPlan, SegmentWriter, VideoMetadata, VideoMuxer};
pub use error::RenderError;
pub use geometry::{KeyKind, KeyPosition, KeyboardGeometry};
pub use model::{NoteEvent, Performance, Track};
pub use performance::{parse_performance, read_performance};
pub use pipeline::{render_file_to_video, RenderJob, RenderReport};
pub use score::{inspect_score, open_mxl, MxlRoot, ScoreFormat, ScoreInfo};
pub use task::{RenderHandle, RenderTask};
pub use timeline::{SegmentKind, SegmentSpan, Timeline};

/// Render one frame of a score to PNG with the default collaborators.
/// Handy for checking colors and geometry without a full encode.
pub fn render_preview_frame<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    frame_index: usize,
    png: Q,
    config: &RenderConfig,
) -> Result<Timeline, RenderError> {
    // The output path is never written by a preview.
    RenderJob::new(input.as_ref(), png.as_ref(), config.clone()).preview(frame_index, png.as_ref())
}

/// Result of a render as reported across the C boundary.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderOutcome {
    Completed { report: RenderReport },
    Failed { kind: String, message: String },
}

impl RenderOutcome {
    pub fn from_result(result: Result<RenderReport, RenderError>) -> Self {
        match result {
            Ok(report) => RenderOutcome::Completed { report },
            Err(err) => RenderOutcome::Failed {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "status": "failed",
                "kind": "io",
                "message": format!("JSON serialization error: {e}"),
            })
            .to_string()
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// C FFI — for hosts that embed the static or dynamic library
// ═══════════════════════════════════════════════════════════════════════

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Render `input` to `output` and return a JSON `RenderOutcome`.
/// The caller must free the returned string with `pianoroll_free_string`.
///
/// `config_json` may be null for the default configuration; a config that
/// fails to parse is reported as a failed outcome.
///
/// # Safety
/// `input` and `output` must be valid null-terminated UTF-8 C strings.
/// `config_json` must be null or a valid null-terminated UTF-8 C string.
#[no_mangle]
pub unsafe extern "C" fn pianoroll_render_file(
    input: *const c_char,
    output: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    let (Some(input), Some(output)) = (unsafe { str_arg(input) }, unsafe { str_arg(output) }) else {
        return std::ptr::null_mut();
    };

    let config = if config_json.is_null() {
        Ok(RenderConfig::default())
    } else {
        match unsafe { str_arg(config_json) } {
            Some(json) => RenderConfig::from_json_str(json),
            None => return std::ptr::null_mut(),
        }
    };

    let result = config.and_then(|config| render_file_to_video(input, output, &config));
    let json = RenderOutcome::from_result(result).to_json();
    CString::new(json).unwrap_or_default().into_raw()
}

/// Free a string previously returned by pianoroll functions.
///
/// # Safety
/// `ptr` must be a string previously returned by a pianoroll function, or null.
#[no_mangle]
pub unsafe extern "C" fn pianoroll_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}
