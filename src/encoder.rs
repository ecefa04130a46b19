//! Video muxing — turns streams of raw RGB frames into encoded segments and
//! joins the segments into the final file.
//!
//! `VideoMuxer` is the seam: the pipeline only hands it frames and paths.
//! `FfmpegMuxer` pipes `rgb24` frames into an ffmpeg child process per
//! segment and uses the concat demuxer to join them without re-encoding.

use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use crate::config::RenderConfig;
use crate::convert::{describe, run_tool};
use crate::error::RenderError;
use crate::timeline::SegmentSpan;

/// Container used for intermediate segments.
pub const SEGMENT_EXTENSION: &str = "mkv";

/// Everything needed to encode one segment.
#[derive(Debug, Clone)]
pub struct SegmentPlan {
    pub span: SegmentSpan,
    pub path: PathBuf,
    /// Audio laid under the segment from its first frame. `None` = silence.
    pub audio: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl SegmentPlan {
    pub fn duration_secs(&self) -> f64 {
        self.span.frame_count as f64 / self.frame_rate as f64
    }

    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Container tags for the final video.
#[derive(Debug, Clone, Default)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub composer: Option<String>,
}

/// Receives the frames of one segment in order.
pub trait SegmentWriter {
    fn write_frame(&mut self, rgb: &[u8]) -> Result<(), RenderError>;
    /// Flush and close the segment. Must be called for the segment to be usable.
    fn finish(self: Box<Self>) -> Result<(), RenderError>;
}

pub trait VideoMuxer {
    fn open_segment(&self, plan: &SegmentPlan) -> Result<Box<dyn SegmentWriter>, RenderError>;
    /// Join finished segments, in order, into `output`.
    fn concat(&self, segments: &[PathBuf], output: &Path, metadata: &VideoMetadata) -> Result<(), RenderError>;
}

// ═══════════════════════════════════════════════════════════════════════
// ffmpeg
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    pub program: PathBuf,
    pub threads: u32,
    pub sample_rate: u32,
}

impl FfmpegMuxer {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            program: config.tools.ffmpeg.clone(),
            threads: config.encoder_threads,
            sample_rate: config.audio_sample_rate,
        }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-hide_banner").arg("-loglevel").arg("error").arg("-y");
        cmd
    }
}

impl FfmpegMuxer {
    /// The ffmpeg invocation encoding one segment from `rgb24` frames on stdin.
    pub fn segment_command(&self, plan: &SegmentPlan) -> Command {
        let mut cmd = self.base_command();
        cmd.arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(format!("{}x{}", plan.width, plan.height))
            .arg("-r")
            .arg(plan.frame_rate.to_string())
            .arg("-i")
            .arg("-");

        match &plan.audio {
            Some(audio) => {
                cmd.arg("-i").arg(audio);
            }
            None => {
                // Silent track so every segment has the same stream layout for concat.
                cmd.arg("-f")
                    .arg("lavfi")
                    .arg("-t")
                    .arg(format!("{:.6}", plan.duration_secs()))
                    .arg("-i")
                    .arg(format!("anullsrc=r={}:cl=stereo", self.sample_rate));
            }
        }

        cmd.arg("-map")
            .arg("0:v:0")
            .arg("-map")
            .arg("1:a:0")
            .arg("-frames:v")
            .arg(plan.span.frame_count.to_string())
            .arg("-c:v")
            .arg("libx264")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-threads")
            .arg(self.threads.to_string())
            .arg("-c:a")
            .arg("aac")
            .arg("-ar")
            .arg(self.sample_rate.to_string())
            .arg("-ac")
            .arg("2");
        if plan.audio.is_some() {
            // Pad short audio with silence; -shortest then cuts at the last frame.
            cmd.arg("-af").arg("apad");
        }
        cmd.arg("-shortest").arg(&plan.path);
        cmd
    }

    /// The ffmpeg invocation joining the segments named in `list_path`.
    pub fn concat_command(&self, list_path: &Path, output: &Path, metadata: &VideoMetadata) -> Command {
        let mut cmd = self.base_command();
        cmd.arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(list_path)
            .arg("-c")
            .arg("copy");
        if let Some(title) = &metadata.title {
            cmd.arg("-metadata").arg(format!("title={title}"));
        }
        if let Some(composer) = &metadata.composer {
            cmd.arg("-metadata").arg(format!("artist={composer}"));
        }
        let is_mp4 = output
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("mp4") || e.eq_ignore_ascii_case("m4v"));
        if is_mp4 {
            cmd.arg("-movflags").arg("+faststart");
        }
        cmd.arg(output);
        cmd
    }
}

/// Body of an ffmpeg concat demuxer list, one quoted `file` line per segment.
pub fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| format!("file '{}'\n", p.display().to_string().replace('\'', r"'\''")))
        .collect()
}

impl VideoMuxer for FfmpegMuxer {
    fn open_segment(&self, plan: &SegmentPlan) -> Result<Box<dyn SegmentWriter>, RenderError> {
        let cmd = self.segment_command(plan);
        log::debug!("encoding {:?} segment: {}", plan.span.kind, describe(&cmd));
        FfmpegSegmentWriter::spawn(cmd, plan).map(|w| Box::new(w) as Box<dyn SegmentWriter>)
    }

    fn concat(&self, segments: &[PathBuf], output: &Path, metadata: &VideoMetadata) -> Result<(), RenderError> {
        let Some(first) = segments.first() else {
            return Err(RenderError::Encoding("no segments to concatenate".into()));
        };

        let list_path = first.with_file_name("segments.txt");
        std::fs::write(&list_path, concat_list(segments))
            .map_err(|e| RenderError::io("writing concat list", e))?;

        let mut cmd = self.concat_command(&list_path, output, metadata);
        run_tool(&mut cmd, "video encoder").map_err(RenderError::Encoding)?;
        Ok(())
    }
}

/// One running ffmpeg process fed through stdin.
struct FfmpegSegmentWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    frame_bytes: usize,
    expected_frames: usize,
    frames_written: usize,
    finished: bool,
}

impl FfmpegSegmentWriter {
    fn spawn(mut cmd: Command, plan: &SegmentPlan) -> Result<Self, RenderError> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let program = cmd.get_program().to_string_lossy().into_owned();
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RenderError::Encoding(format!("video encoder '{program}' was not found on PATH"))
            } else {
                RenderError::Encoding(format!("failed to start video encoder '{program}': {e}"))
            }
        })?;

        let stdin = child.stdin.take();
        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = child.stderr.take().map(|stderr| {
            std::thread::spawn(move || {
                let mut output = String::new();
                if let Err(err) = BufReader::new(stderr).read_to_string(&mut output) {
                    output = format!("<failed to read ffmpeg stderr: {err}>");
                }
                output
            })
        });

        Ok(Self {
            child,
            stdin,
            stderr_task,
            frame_bytes: plan.frame_bytes(),
            expected_frames: plan.span.frame_count,
            frames_written: 0,
            finished: false,
        })
    }

    fn collect_stderr(&mut self) -> String {
        self.stderr_task
            .take()
            .and_then(|task| task.join().ok())
            .map(|s| s.trim().to_owned())
            .unwrap_or_default()
    }

    /// Stop the process after a failed write and report what it said.
    fn abort(&mut self, err: std::io::Error) -> RenderError {
        self.stdin = None;
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.finished = true;
        let stderr = self.collect_stderr();
        RenderError::Encoding(format!(
            "failed to write frame {} to ffmpeg: {err}. {stderr}",
            self.frames_written
        ))
    }
}

impl SegmentWriter for FfmpegSegmentWriter {
    fn write_frame(&mut self, rgb: &[u8]) -> Result<(), RenderError> {
        if rgb.len() != self.frame_bytes {
            return Err(RenderError::Encoding(format!(
                "frame size mismatch: expected {} bytes, got {}",
                self.frame_bytes,
                rgb.len()
            )));
        }
        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(rgb),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder input already closed",
            )),
        };
        match result {
            Ok(()) => {
                self.frames_written += 1;
                Ok(())
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    fn finish(mut self: Box<Self>) -> Result<(), RenderError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .flush()
                .map_err(|e| RenderError::Encoding(format!("failed to flush ffmpeg input: {e}")))?;
        }

        let status = self
            .child
            .wait()
            .map_err(|e| RenderError::Encoding(format!("failed to wait for ffmpeg: {e}")))?;
        self.finished = true;
        let stderr = self.collect_stderr();

        if !status.success() {
            return Err(RenderError::Encoding(format!("ffmpeg failed ({status}): {stderr}")));
        }
        if self.frames_written != self.expected_frames {
            return Err(RenderError::Encoding(format!(
                "segment received {} frames, expected {}",
                self.frames_written, self.expected_frames
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegSegmentWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.stdin = None;
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
