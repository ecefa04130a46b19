//! Integration tests for the render pipeline with in-process stand-ins for
//! the converter, synthesizer and video muxer.

mod common;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use pianoroll::{
    AudioSynthesizer, RenderConfig, RenderError, RenderJob, RenderOutcome, RenderTask,
    ScoreConverter, ScoreFormat, SegmentKind, SegmentPlan, SegmentWriter, SoundProfile,
    VideoMetadata, VideoMuxer,
};
use pretty_assertions::assert_eq;

// ═══════════════════════════════════════════════════════════════════════
// Stand-ins
// ═══════════════════════════════════════════════════════════════════════

/// Writes a fixed performance for any notation input.
struct FixtureConverter {
    notes: Vec<common::FixtureNote>,
}

impl ScoreConverter for FixtureConverter {
    fn convert(&self, _score: &Path, _format: ScoreFormat, out: &Path) -> Result<(), RenderError> {
        std::fs::write(out, common::smf_bytes(None, &self.notes)).map_err(|e| RenderError::Io {
            context: "writing fixture performance".into(),
            source: e,
        })
    }
}

struct PanickingConverter;

impl ScoreConverter for PanickingConverter {
    fn convert(&self, _: &Path, _: ScoreFormat, _: &Path) -> Result<(), RenderError> {
        panic!("converter blew up");
    }
}

struct FixtureSynth;

impl AudioSynthesizer for FixtureSynth {
    fn synthesize(&self, _perf: &Path, _profile: &SoundProfile, out: &Path) -> Result<(), RenderError> {
        std::fs::write(out, common::wav_bytes(4410)).map_err(|e| RenderError::Io {
            context: "writing fixture audio".into(),
            source: e,
        })?;
        pianoroll::convert::verify_audio(out)
    }
}

/// Reports a missing sound font like a real synthesizer would.
struct BrokenSynth;

impl AudioSynthesizer for BrokenSynth {
    fn synthesize(&self, _: &Path, profile: &SoundProfile, _: &Path) -> Result<(), RenderError> {
        Err(RenderError::AudioSynthesis(format!("sound font '{}' missing", profile.name)))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RecordedSegment {
    kind: SegmentKind,
    expected_frames: usize,
    frames: usize,
    has_audio: bool,
    audio_present: bool,
    digest: u64,
}

#[derive(Debug, Default)]
struct Recording {
    segments: Vec<RecordedSegment>,
    concat_inputs: Vec<PathBuf>,
    concat_output: Option<PathBuf>,
    metadata_title: Option<String>,
}

#[derive(Clone, Default)]
struct RecordingMuxer {
    recording: Arc<Mutex<Recording>>,
    fail_concat: bool,
}

struct RecordingWriter {
    recording: Arc<Mutex<Recording>>,
    segment: RecordedSegment,
    hasher: DefaultHasher,
    frame_bytes: usize,
}

impl SegmentWriter for RecordingWriter {
    fn write_frame(&mut self, rgb: &[u8]) -> Result<(), RenderError> {
        assert_eq!(rgb.len(), self.frame_bytes);
        rgb.hash(&mut self.hasher);
        self.segment.frames += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), RenderError> {
        let this = *self;
        let mut segment = this.segment;
        segment.digest = this.hasher.finish();
        this.recording.lock().unwrap().segments.push(segment);
        Ok(())
    }
}

impl VideoMuxer for RecordingMuxer {
    fn open_segment(&self, plan: &SegmentPlan) -> Result<Box<dyn SegmentWriter>, RenderError> {
        std::fs::write(&plan.path, b"segment").unwrap();
        Ok(Box::new(RecordingWriter {
            recording: Arc::clone(&self.recording),
            segment: RecordedSegment {
                kind: plan.span.kind,
                expected_frames: plan.span.frame_count,
                frames: 0,
                has_audio: plan.audio.is_some(),
                audio_present: plan.audio.as_ref().is_some_and(|a| a.is_file()),
                digest: 0,
            },
            hasher: DefaultHasher::new(),
            frame_bytes: plan.frame_bytes(),
        }))
    }

    fn concat(&self, segments: &[PathBuf], output: &Path, metadata: &VideoMetadata) -> Result<(), RenderError> {
        std::fs::write(output, b"video").unwrap();
        let mut rec = self.recording.lock().unwrap();
        rec.concat_inputs = segments.to_vec();
        rec.concat_output = Some(output.to_path_buf());
        rec.metadata_title = metadata.title.clone();
        if self.fail_concat {
            return Err(RenderError::Encoding("disk full".into()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════

struct Fixture {
    dir: tempfile::TempDir,
    work: PathBuf,
    config: RenderConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir(&work).unwrap();
        let config = RenderConfig {
            work_dir: Some(work.clone()),
            ..RenderConfig::default()
        };
        Self { dir, work, config }
    }

    fn midi(&self, notes: &[common::FixtureNote]) -> PathBuf {
        common::write_midi(self.dir.path(), "song.mid", notes)
    }

    fn musicxml(&self) -> PathBuf {
        let path = self.dir.path().join("etude.musicxml");
        std::fs::write(&path, common::MUSICXML).unwrap();
        path
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("song.mp4")
    }

    fn job(&self, input: &Path, muxer: &RecordingMuxer) -> RenderJob {
        RenderJob::new(input, self.output(), self.config.clone())
            .with_converter(FixtureConverter {
                notes: common::middle_c_second(),
            })
            .with_synthesizer(FixtureSynth)
            .with_muxer(muxer.clone())
    }

    fn workspace_is_clean(&self) -> bool {
        std::fs::read_dir(&self.work).unwrap().next().is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Successful renders
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn midi_render_produces_lead_in_and_main_segments() {
    let fx = Fixture::new();
    let input = fx.midi(&common::middle_c_second());
    let muxer = RecordingMuxer::default();

    let report = fx.job(&input, &muxer).run().unwrap();

    assert_eq!(report.matrix_rows, 31);
    assert_eq!(report.frames_on_screen, 93);
    assert_eq!(report.lead_in_frames, 93);
    assert_eq!(report.total_frames, 31 + 2 * 93);
    assert!((report.duration_secs - 217.0 / 30.0).abs() < 1e-9);
    assert_eq!(report.note_count, 1);
    assert!(!report.empty_score);
    assert_eq!(report.score.format, ScoreFormat::Midi);
    assert_eq!(report.score.title.as_deref(), Some("Fixture"));

    let rec = muxer.recording.lock().unwrap();
    let kinds: Vec<_> = rec.segments.iter().map(|s| (s.kind, s.frames, s.has_audio)).collect();
    assert_eq!(
        kinds,
        vec![(SegmentKind::LeadIn, 93, false), (SegmentKind::Main, 124, true)]
    );
    assert!(rec.segments.iter().all(|s| s.frames == s.expected_frames));
    assert!(rec.segments[1].audio_present);
    assert_eq!(rec.concat_inputs.len(), 2);
    assert_eq!(rec.metadata_title.as_deref(), Some("Fixture"));

    assert!(fx.output().is_file());
    assert!(fx.workspace_is_clean());
    println!("✓ {} frames, {:.2}s", report.total_frames, report.duration_secs);
}

#[test]
fn notation_goes_through_the_converter() {
    let fx = Fixture::new();
    let input = fx.musicxml();
    let muxer = RecordingMuxer::default();

    let report = fx.job(&input, &muxer).run().unwrap();

    assert_eq!(report.score.format, ScoreFormat::MusicXml);
    assert_eq!(report.score.part_count, 2);
    assert_eq!(report.matrix_rows, 31);
    assert_eq!(muxer.recording.lock().unwrap().metadata_title.as_deref(), Some("Etude"));
}

#[test]
fn rendering_twice_gives_identical_frames() {
    let fx = Fixture::new();
    let input = fx.midi(&[
        common::FixtureNote::secs(60, 0.0, 1.0),
        common::FixtureNote::secs(61, 0.5, 0.75),
        common::FixtureNote::secs(21, 0.25, 1.5),
    ]);

    let first = RecordingMuxer::default();
    let second = RecordingMuxer::default();
    fx.job(&input, &first).run().unwrap();
    fx.job(&input, &second).run().unwrap();

    assert_eq!(
        first.recording.lock().unwrap().segments,
        second.recording.lock().unwrap().segments
    );
}

#[test]
fn progress_reaches_the_total() {
    let fx = Fixture::new();
    let input = fx.midi(&common::middle_c_second());
    let muxer = RecordingMuxer::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    fx.job(&input, &muxer)
        .on_progress(move |done, total| sink.lock().unwrap().push((done, total)))
        .run()
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 217);
    assert_eq!(seen.last(), Some(&(217, 217)));
}

// ═══════════════════════════════════════════════════════════════════════
// Empty scores
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn empty_score_renders_a_blank_clip_by_default() {
    let fx = Fixture::new();
    let input = fx.midi(&[]);
    let muxer = RecordingMuxer::default();

    let report = fx.job(&input, &muxer).run().unwrap();

    assert!(report.empty_score);
    assert_eq!(report.matrix_rows, 1);
    assert_eq!(report.total_frames, 1 + 2 * 93);
}

#[test]
fn empty_score_can_be_rejected() {
    let mut fx = Fixture::new();
    fx.config.reject_empty_scores = true;
    let input = fx.midi(&[]);
    let muxer = RecordingMuxer::default();

    let err = fx.job(&input, &muxer).run().unwrap_err();

    assert!(matches!(err, RenderError::EmptyScore));
    assert!(!fx.output().exists());
    assert!(fx.workspace_is_clean());
}

// ═══════════════════════════════════════════════════════════════════════
// Failures
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn synthesis_failure_aborts_before_encoding() {
    let fx = Fixture::new();
    let input = fx.midi(&common::middle_c_second());
    let muxer = RecordingMuxer::default();

    let err = fx
        .job(&input, &muxer)
        .with_synthesizer(BrokenSynth)
        .run()
        .unwrap_err();

    assert_eq!(err.kind(), "audio_synthesis");
    assert!(muxer.recording.lock().unwrap().segments.is_empty());
    assert!(!fx.output().exists());
    assert!(fx.workspace_is_clean());
}

#[test]
fn failed_concat_leaves_no_output() {
    let fx = Fixture::new();
    let input = fx.midi(&common::middle_c_second());
    let muxer = RecordingMuxer {
        fail_concat: true,
        ..RecordingMuxer::default()
    };

    let err = fx.job(&input, &muxer).run().unwrap_err();

    assert_eq!(err.kind(), "encoding");
    assert!(!fx.output().exists());
    assert!(fx.workspace_is_clean());
}

#[test]
fn failed_concat_keeps_an_earlier_video() {
    let fx = Fixture::new();
    let input = fx.midi(&common::middle_c_second());
    std::fs::write(fx.output(), b"previous render").unwrap();
    let muxer = RecordingMuxer {
        fail_concat: true,
        ..RecordingMuxer::default()
    };

    let err = fx.job(&input, &muxer).run().unwrap_err();

    assert_eq!(err.kind(), "encoding");
    assert_eq!(std::fs::read(fx.output()).unwrap(), b"previous render");
    assert!(fx.workspace_is_clean());
}

#[test]
fn finished_video_replaces_the_output() {
    let fx = Fixture::new();
    let input = fx.midi(&common::middle_c_second());
    std::fs::write(fx.output(), b"previous render").unwrap();
    let muxer = RecordingMuxer::default();

    fx.job(&input, &muxer).run().unwrap();

    assert_eq!(std::fs::read(fx.output()).unwrap(), b"video");
    let joined_into = muxer.recording.lock().unwrap().concat_output.clone();
    let joined_into = joined_into.expect("concat ran");
    assert!(joined_into.starts_with(&fx.work), "{}", joined_into.display());
    assert_eq!(joined_into.extension().and_then(|e| e.to_str()), Some("mp4"));
    assert!(fx.workspace_is_clean());
}

#[test]
fn unreadable_input_is_rejected_up_front() {
    let fx = Fixture::new();
    let input = fx.dir.path().join("notes.txt");
    std::fs::write(&input, "not a score").unwrap();
    let muxer = RecordingMuxer::default();

    let err = fx.job(&input, &muxer).run().unwrap_err();
    assert_eq!(err.kind(), "input_format");
    assert!(fx.workspace_is_clean());
}

#[test]
fn invalid_config_is_rejected() {
    let mut fx = Fixture::new();
    fx.config.frame_rate = 0;
    let input = fx.midi(&common::middle_c_second());

    let err = fx.job(&input, &RecordingMuxer::default()).run().unwrap_err();
    assert_eq!(err.kind(), "config");
}

// ═══════════════════════════════════════════════════════════════════════
// Tasks and outcomes
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn background_task_reports_through_callback_and_join() {
    let fx = Fixture::new();
    let input = fx.midi(&common::middle_c_second());
    let muxer = RecordingMuxer::default();
    let (tx, rx) = std::sync::mpsc::channel();

    let handle = RenderTask::spawn_with_callback(fx.job(&input, &muxer), move |result| {
        tx.send(result.as_ref().map(|r| r.total_frames).ok()).unwrap();
    })
    .unwrap();

    let report = handle.join().unwrap();
    assert_eq!(rx.recv().unwrap(), Some(report.total_frames));
}

#[test]
fn panicking_worker_becomes_an_error() {
    let fx = Fixture::new();
    let input = fx.musicxml();
    let job = fx
        .job(&input, &RecordingMuxer::default())
        .with_converter(PanickingConverter);

    let err = RenderTask::spawn(job).unwrap().join().unwrap_err();
    assert!(matches!(err, RenderError::WorkerPanicked));
}

#[test]
fn callback_still_fires_when_the_worker_panics() {
    let fx = Fixture::new();
    let input = fx.musicxml();
    let job = fx
        .job(&input, &RecordingMuxer::default())
        .with_converter(PanickingConverter);
    let (tx, rx) = std::sync::mpsc::channel();

    let handle = RenderTask::spawn_with_callback(job, move |result| {
        tx.send(result.as_ref().err().map(|e| e.kind())).unwrap();
    })
    .unwrap();

    let seen = rx
        .recv_timeout(std::time::Duration::from_secs(10))
        .expect("completion callback should run");
    assert_eq!(seen, Some("worker_panicked"));
    assert!(matches!(handle.join(), Err(RenderError::WorkerPanicked)));
    assert!(fx.workspace_is_clean());
    println!("✓ panicking job reported through callback");
}

#[test]
fn outcome_json_carries_status_and_kind() {
    let failed = RenderOutcome::from_result(Err(RenderError::EmptyScore));
    let json: serde_json::Value = serde_json::from_str(&failed.to_json()).unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["kind"], "empty_score");

    let fx = Fixture::new();
    let input = fx.midi(&common::middle_c_second());
    let report = fx.job(&input, &RecordingMuxer::default()).run().unwrap();
    let report_json = report.to_json().unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&RenderOutcome::from_result(Ok(report)).to_json()).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["report"]["total_frames"], 217);

    let report: serde_json::Value = serde_json::from_str(&report_json).unwrap();
    assert_eq!(report["matrix_rows"], 31);
    assert_eq!(report["score"]["format"], "midi");
}
