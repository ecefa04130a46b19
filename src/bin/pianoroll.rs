use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::LevelFilter;

use pianoroll::{render_preview_frame, RenderConfig, RenderJob};

#[derive(Parser)]
#[command(author, version, about = "Render a score as a falling-notes piano video", long_about = None)]
struct Cli {
    /// Score to render (.mxl, .musicxml, .xml, .mid)
    input: PathBuf,

    /// Output video. Defaults to the input path with an .mp4 extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON render configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sound font used for synthesis
    #[arg(long)]
    sound_font: Option<PathBuf>,

    /// Video frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Render only this output frame to PNG instead of encoding a video
    #[arg(long, requires = "preview_out")]
    preview_frame: Option<usize>,

    /// PNG written by --preview-frame
    #[arg(long)]
    preview_out: Option<PathBuf>,

    /// Print the render report as JSON when done
    #[arg(long)]
    report: bool,
}

fn init_logger() {
    env_logger::builder()
        .default_format()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RenderConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RenderConfig::default(),
    };
    if let Some(sound_font) = cli.sound_font {
        config.sound_profile.path = sound_font;
    }
    if let Some(fps) = cli.fps {
        config.frame_rate = fps;
    }

    if let Some(frame) = cli.preview_frame {
        let Some(png) = cli.preview_out.as_ref() else {
            bail!("--preview-frame needs --preview-out");
        };
        let timeline = render_preview_frame(&cli.input, frame, png, &config)
            .with_context(|| format!("previewing {}", cli.input.display()))?;
        println!(
            "Wrote frame {frame} of {} to {}",
            timeline.total_frames(),
            png.display()
        );
        return Ok(());
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("mp4"));

    let job = RenderJob::new(&cli.input, &output, config).on_progress(|done, total| {
        if done == total || done % 300 == 0 {
            log::info!("encoded {done}/{total} frames");
        }
    });
    let report = job
        .run()
        .with_context(|| format!("rendering {}", cli.input.display()))?;

    if cli.report {
        println!("{}", report.to_json().context("serializing render report")?);
    } else {
        println!(
            "Wrote {} ({} frames, {:.1}s)",
            report.output.display(),
            report.total_frames,
            report.duration_secs
        );
    }
    Ok(())
}
