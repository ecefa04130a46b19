//! Render pipeline — runs one score through conversion, synthesis, frame
//! generation and muxing.
//!
//! A `RenderJob` owns its collaborators and a private scratch workspace.
//! Every intermediate file lives in that workspace, which is removed when
//! `run` returns, whether the job succeeded or not.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;

use crate::activation::ActivationMatrix;
use crate::compositor::FrameCompositor;
use crate::config::RenderConfig;
use crate::convert::{AudioSynthesizer, FluidSynth, MuseScoreConverter, ScoreConverter};
use crate::encoder::{FfmpegMuxer, SegmentPlan, VideoMetadata, VideoMuxer, SEGMENT_EXTENSION};
use crate::error::RenderError;
use crate::model::Performance;
use crate::performance::read_performance;
use crate::score::{inspect_score, ScoreInfo};
use crate::timeline::{SegmentKind, Timeline};

/// Called after every encoded frame with `(frames_done, total_frames)`.
pub type ProgressCallback = Box<dyn FnMut(usize, usize) + Send>;

const PERFORMANCE_FILE: &str = "performance.mid";
const AUDIO_FILE: &str = "audio.wav";
const STAGED_OUTPUT_STEM: &str = "video";

/// Summary of a finished render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderReport {
    pub output: PathBuf,
    pub score: ScoreInfo,
    pub note_count: usize,
    pub matrix_rows: usize,
    pub frames_on_screen: usize,
    pub total_frames: usize,
    pub lead_in_frames: usize,
    pub frame_rate: u32,
    pub duration_secs: f64,
    /// The performance had no melodic notes; the video is a blank scroll.
    pub empty_score: bool,
}

impl RenderReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub struct RenderJob {
    input: PathBuf,
    output: PathBuf,
    config: RenderConfig,
    converter: Box<dyn ScoreConverter + Send>,
    synthesizer: Box<dyn AudioSynthesizer + Send>,
    muxer: Box<dyn VideoMuxer + Send>,
    progress: Option<ProgressCallback>,
}

impl RenderJob {
    /// A job using MuseScore, FluidSynth and ffmpeg as configured.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, config: RenderConfig) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            converter: Box::new(MuseScoreConverter::from_config(&config)),
            synthesizer: Box::new(FluidSynth::from_config(&config)),
            muxer: Box::new(FfmpegMuxer::from_config(&config)),
            config,
            progress: None,
        }
    }

    pub fn with_converter(mut self, converter: impl ScoreConverter + Send + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: impl AudioSynthesizer + Send + 'static) -> Self {
        self.synthesizer = Box::new(synthesizer);
        self
    }

    pub fn with_muxer(mut self, muxer: impl VideoMuxer + Send + 'static) -> Self {
        self.muxer = Box::new(muxer);
        self
    }

    pub fn on_progress(mut self, callback: impl FnMut(usize, usize) + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Run the job to completion.
    pub fn run(mut self) -> Result<RenderReport, RenderError> {
        self.config.validate()?;

        let score = inspect_score(&self.input)?;
        log::info!(
            "rendering '{}' ({:?}, {} parts) to '{}'",
            self.input.display(),
            score.format,
            score.part_count,
            self.output.display()
        );

        let workspace = self.create_workspace()?;
        let performance_path = workspace.path().join(PERFORMANCE_FILE);
        let audio_path = workspace.path().join(AUDIO_FILE);

        let performance = self.load_performance(&score, &performance_path)?;

        let empty_score = performance.is_empty();
        if empty_score {
            if self.config.reject_empty_scores {
                return Err(RenderError::EmptyScore);
            }
            log::warn!(
                "'{}' contains no playable notes; rendering an empty keyboard",
                self.input.display()
            );
        }

        // ── Performance → audio ──────────────────────────────────────
        self.synthesizer
            .synthesize(&performance_path, &self.config.sound_profile, &audio_path)?;
        log::info!("synthesized audio with profile '{}'", self.config.sound_profile.name);

        // ── Activation matrix ────────────────────────────────────────
        let matrix = ActivationMatrix::build(
            &performance,
            self.config.frame_rate,
            self.config.overlap_policy,
        );

        let timeline = Timeline::new(
            self.config.frame_rate,
            matrix.row_count(),
            self.config.frames_on_screen(),
        );
        log::info!(
            "matrix: {} rows; video: {} frames ({:.2}s, {:.2}s lead-in)",
            matrix.row_count(),
            timeline.total_frames(),
            timeline.duration_secs(),
            timeline.lead_in_secs()
        );

        // ── Frames → segments → output ───────────────────────────────
        let segments = self.encode_segments(&matrix, &timeline, workspace.path(), &audio_path)?;

        let metadata = VideoMetadata {
            title: score.title.clone(),
            composer: score.composer.clone(),
        };
        // Join inside the workspace; the output path is only touched once the
        // video is complete.
        let staged = workspace.path().join(staged_output_name(&self.output));
        self.muxer.concat(&segments, &staged, &metadata)?;
        publish_output(&staged, &self.output)?;
        log::info!("wrote '{}'", self.output.display());

        Ok(RenderReport {
            output: self.output.clone(),
            score,
            note_count: performance.note_count(),
            matrix_rows: matrix.row_count(),
            frames_on_screen: timeline.frames_on_screen,
            total_frames: timeline.total_frames(),
            lead_in_frames: timeline.lead_in_frames(),
            frame_rate: timeline.frame_rate,
            duration_secs: timeline.duration_secs(),
            empty_score,
        })
        // `workspace` drops here and takes the intermediates with it.
    }

    /// Render the single output frame `frame_index` to a PNG without
    /// synthesizing audio or encoding video. Returns the clip's timeline.
    pub fn preview(&self, frame_index: usize, png: &Path) -> Result<Timeline, RenderError> {
        self.config.validate()?;
        let score = inspect_score(&self.input)?;
        let workspace = self.create_workspace()?;
        let performance = self.load_performance(&score, &workspace.path().join(PERFORMANCE_FILE))?;

        let matrix = ActivationMatrix::build(
            &performance,
            self.config.frame_rate,
            self.config.overlap_policy,
        );
        let timeline = Timeline::new(
            self.config.frame_rate,
            matrix.row_count(),
            self.config.frames_on_screen(),
        );
        if frame_index >= timeline.total_frames() {
            return Err(RenderError::Config(format!(
                "preview frame {frame_index} is past the end of the clip ({} frames)",
                timeline.total_frames()
            )));
        }

        let mut compositor = FrameCompositor::new(&self.config, &matrix)?;
        compositor
            .render_frame(timeline.frame_offset(frame_index))?
            .save_png(png)?;
        log::info!("wrote preview frame {frame_index} to '{}'", png.display());
        Ok(timeline)
    }

    /// Put a performance file at `performance_path` and parse it. MIDI
    /// input is copied as is; notation goes through the converter.
    fn load_performance(&self, score: &ScoreInfo, performance_path: &Path) -> Result<Performance, RenderError> {
        if score.format.is_performance() {
            std::fs::copy(&self.input, performance_path)
                .map_err(|e| RenderError::io("copying performance into workspace", e))?;
        } else {
            self.converter
                .convert(&self.input, score.format, performance_path)?;
        }
        let performance = read_performance(performance_path)?;
        log::info!(
            "performance: {} tracks, {} notes, {:.2}s",
            performance.tracks.len(),
            performance.note_count(),
            performance.end_time()
        );
        Ok(performance)
    }

    fn create_workspace(&self) -> Result<TempDir, RenderError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pianoroll-");
        let dir = match &self.config.work_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        dir.map_err(|e| RenderError::io("creating job workspace", e))
    }

    fn encode_segments(
        &mut self,
        matrix: &ActivationMatrix,
        timeline: &Timeline,
        workspace: &Path,
        audio: &Path,
    ) -> Result<Vec<PathBuf>, RenderError> {
        let mut compositor = FrameCompositor::new(&self.config, matrix)?;
        let total = timeline.total_frames();
        let mut done = 0;
        let mut paths = Vec::new();

        for span in timeline.segments() {
            let name = match span.kind {
                SegmentKind::LeadIn => "lead-in",
                SegmentKind::Main => "main",
            };
            let plan = SegmentPlan {
                span,
                path: workspace.join(format!("{name}.{SEGMENT_EXTENSION}")),
                audio: span.has_audio().then(|| audio.to_path_buf()),
                width: self.config.screen_width(),
                height: self.config.screen_height,
                frame_rate: self.config.frame_rate,
            };
            log::debug!(
                "segment {name}: frames {:?}, audio: {}",
                span.frames(),
                plan.audio.is_some()
            );

            let mut writer = self.muxer.open_segment(&plan)?;
            for index in span.frames() {
                let frame = compositor.render_frame(timeline.frame_offset(index))?;
                writer.write_frame(frame.as_bytes())?;
                done += 1;
                if let Some(progress) = self.progress.as_mut() {
                    progress(done, total);
                }
            }
            writer.finish()?;
            log::info!("encoded {name} segment ({} frames)", span.frame_count);
            paths.push(plan.path);
        }

        Ok(paths)
    }
}

/// Name for the joined video inside the workspace. Keeps the output's
/// extension, which selects the container.
fn staged_output_name(output: &Path) -> String {
    match output.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{STAGED_OUTPUT_STEM}.{ext}"),
        None => STAGED_OUTPUT_STEM.to_string(),
    }
}

/// Move the finished video to its destination, replacing any earlier file.
fn publish_output(staged: &Path, output: &Path) -> Result<(), RenderError> {
    if std::fs::rename(staged, output).is_ok() {
        return Ok(());
    }
    // Rename fails across filesystems. Copy next to the destination first so
    // a failed copy still leaves the old file alone.
    let context = || format!("writing '{}'", output.display());
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".pianoroll-")
        .tempfile_in(parent)
        .map_err(|e| RenderError::io(context(), e))?;
    let mut source = std::fs::File::open(staged).map_err(|e| RenderError::io(context(), e))?;
    std::io::copy(&mut source, temp.as_file_mut()).map_err(|e| RenderError::io(context(), e))?;
    temp.persist(output)
        .map(|_| ())
        .map_err(|e| RenderError::io(context(), e.error))
}

/// Render a score with the default command-line collaborators.
pub fn render_file_to_video<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &RenderConfig,
) -> Result<RenderReport, RenderError> {
    RenderJob::new(input.as_ref(), output.as_ref(), config.clone()).run()
}
