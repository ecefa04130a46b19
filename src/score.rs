//! Score preflight — checks that an input file is something the converter
//! can take before any external process runs, and pulls out the metadata
//! used to label the video.
//!
//! Supports uncompressed MusicXML (.musicxml / .xml), compressed MXL (.mxl,
//! a ZIP archive whose `META-INF/container.xml` names the root file) and
//! Standard MIDI Files, which skip conversion entirely.

use std::io::{Cursor, Read};
use std::path::Path;

use serde::Serialize;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFormat {
    MusicXml,
    Mxl,
    Midi,
}

impl ScoreFormat {
    /// Performance files need no notation conversion.
    pub fn is_performance(&self) -> bool {
        *self == ScoreFormat::Midi
    }
}

/// What the preflight learned about a score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreInfo {
    pub format: ScoreFormat,
    pub title: Option<String>,
    pub composer: Option<String>,
    /// Parts for MusicXML, tracks for MIDI
    pub part_count: usize,
    /// Archive entry holding the score, for .mxl input
    pub root_file: Option<String>,
}

/// Read and validate a score file.
pub fn inspect_score<P: AsRef<Path>>(path: P) -> Result<ScoreInfo, RenderError> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .map_err(|e| RenderError::input(path, format!("failed to read file: {e}")))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    inspect_bytes(&data, extension.as_deref()).map_err(|reason| RenderError::input(path, reason))
}

/// Validate score bytes with an optional extension hint.
/// Without a recognised extension the format is sniffed from the content.
pub fn inspect_bytes(data: &[u8], extension: Option<&str>) -> Result<ScoreInfo, String> {
    if data.is_empty() {
        return Err("file is empty".into());
    }

    match extension {
        Some("mxl") => inspect_mxl(data),
        Some("musicxml") | Some("xml") => inspect_xml_bytes(data, ScoreFormat::MusicXml),
        Some("mid") | Some("midi") => inspect_midi(data),
        _ => match sniff_format(data) {
            Some(ScoreFormat::Midi) => inspect_midi(data),
            Some(ScoreFormat::Mxl) => inspect_mxl(data),
            Some(ScoreFormat::MusicXml) => inspect_xml_bytes(data, ScoreFormat::MusicXml),
            None => Err("unrecognised score format (expected MusicXML, MXL or MIDI)".into()),
        },
    }
}

/// Guess the format from magic bytes.
pub fn sniff_format(data: &[u8]) -> Option<ScoreFormat> {
    if data.starts_with(b"MThd") {
        return Some(ScoreFormat::Midi);
    }
    if data.starts_with(b"PK\x03\x04") {
        return Some(ScoreFormat::Mxl);
    }
    let text = std::str::from_utf8(data).ok()?;
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with('<').then_some(ScoreFormat::MusicXml)
}

// ─── MusicXML ────────────────────────────────────────────────────────

fn inspect_xml_bytes(data: &[u8], format: ScoreFormat) -> Result<ScoreInfo, String> {
    let xml = std::str::from_utf8(data).map_err(|e| format!("invalid UTF-8 in MusicXML file: {e}"))?;
    inspect_musicxml(xml, format)
}

fn inspect_musicxml(xml: &str, format: ScoreFormat) -> Result<ScoreInfo, String> {
    // MusicXML files include a DOCTYPE declaration, so we must allow DTDs
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = roxmltree::Document::parse_with_options(xml, options)
        .map_err(|e| format!("XML parse error: {e}"))?;
    let root = doc.root_element();

    let root_name = root.tag_name().name();
    if root_name != "score-partwise" && root_name != "score-timewise" {
        return Err(format!(
            "unsupported root element '{root_name}', expected a MusicXML score"
        ));
    }

    let mut title = None;
    let mut movement_title = None;
    let mut composer = None;
    let mut part_count = 0;

    for node in root.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "work-title" if title.is_none() => title = element_text(&node),
            "movement-title" if movement_title.is_none() => movement_title = element_text(&node),
            "creator" if composer.is_none() && node.attribute("type") == Some("composer") => {
                composer = element_text(&node)
            }
            "score-part" => part_count += 1,
            _ => {}
        }
    }

    if part_count == 0 {
        return Err("score declares no parts".into());
    }

    Ok(ScoreInfo {
        format,
        title: title.or(movement_title),
        composer,
        part_count,
        root_file: None,
    })
}

fn element_text(node: &roxmltree::Node) -> Option<String> {
    node.text()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

// ─── MXL ─────────────────────────────────────────────────────────────

const CONTAINER_ENTRY: &str = "META-INF/container.xml";

/// The score document found inside an .mxl archive.
#[derive(Debug, Clone, PartialEq)]
pub struct MxlRoot {
    /// Entry name within the archive
    pub path: String,
    pub xml: String,
}

fn inspect_mxl(data: &[u8]) -> Result<ScoreInfo, String> {
    let root = open_mxl(data)?;
    let mut info = inspect_musicxml(&root.xml, ScoreFormat::Mxl)
        .map_err(|e| format!("{}: {e}", root.path))?;
    info.root_file = Some(root.path);
    Ok(info)
}

/// Locate and read the score inside .mxl bytes.
///
/// The container manifest decides when present; otherwise the first
/// MusicXML entry outside `META-INF/` is taken.
pub fn open_mxl(data: &[u8]) -> Result<MxlRoot, String> {
    let mut archive =
        ZipArchive::new(Cursor::new(data)).map_err(|e| format!("failed to open MXL archive: {e}"))?;

    let path = match read_entry(&mut archive, CONTAINER_ENTRY)? {
        Some(manifest) => root_from_manifest(&manifest)?,
        None => first_score_entry(&archive)?,
    };
    let xml = read_entry(&mut archive, &path)?
        .ok_or_else(|| format!("archive lists '{path}' as its score but has no such entry"))?;

    Ok(MxlRoot { path, xml })
}

/// Text of one archive entry, `None` if the archive has no such entry.
fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<String>, String> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(format!("cannot open '{name}' in archive: {e}")),
    };
    let mut text = String::with_capacity(entry.size() as usize);
    entry
        .read_to_string(&mut text)
        .map_err(|e| format!("cannot read '{name}' from archive: {e}"))?;
    Ok(Some(text))
}

/// First `rootfile` of the manifest. Later rootfiles are alternate
/// renditions (PDF, images) of the same score.
fn root_from_manifest(manifest: &str) -> Result<String, String> {
    let doc = roxmltree::Document::parse(manifest)
        .map_err(|e| format!("{CONTAINER_ENTRY} is not valid XML: {e}"))?;
    let root = doc
        .descendants()
        .filter(|n| n.has_tag_name("rootfile"))
        .filter_map(|n| n.attribute("full-path"))
        .map(|p| p.trim_start_matches('/'))
        .find(|p| !p.is_empty());
    match root {
        Some(path) => Ok(path.to_string()),
        None => Err(format!("{CONTAINER_ENTRY} names no rootfile")),
    }
}

fn first_score_entry(archive: &ZipArchive<Cursor<&[u8]>>) -> Result<String, String> {
    let is_score = |name: &str| {
        !name.starts_with("META-INF/") && (name.ends_with(".musicxml") || name.ends_with(".xml"))
    };
    if let Some(name) = archive.file_names().find(|&n| is_score(n)) {
        return Ok(name.to_string());
    }
    let names: Vec<&str> = archive.file_names().collect();
    Err(format!("no MusicXML file found in archive (entries: {})", names.join(", ")))
}

// ─── MIDI ────────────────────────────────────────────────────────────

fn inspect_midi(data: &[u8]) -> Result<ScoreInfo, String> {
    let smf = midly::Smf::parse(data).map_err(|e| format!("invalid MIDI data: {e}"))?;

    // The first named track; format 1 files often leave the tempo track unnamed.
    let title = smf.tracks.iter().find_map(|track| {
        track.iter().find_map(|event| match event.kind {
            midly::TrackEventKind::Meta(midly::MetaMessage::TrackName(bytes)) => {
                let name = String::from_utf8_lossy(bytes).trim().to_string();
                (!name.is_empty()).then_some(name)
            }
            _ => None,
        })
    });

    Ok(ScoreInfo {
        format: ScoreFormat::Midi,
        title,
        composer: None,
        part_count: smf.tracks.len(),
        root_file: None,
    })
}
