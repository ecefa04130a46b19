//! Frame compositor — paints one output frame for a matrix offset.
//!
//! The frame is two layers stacked top to bottom:
//!
//! - the **note lane**, showing `frames_on_screen` matrix rows starting at
//!   the offset. It is drawn with the current row at the top of a scratch
//!   buffer and flipped on composite, so bars fall toward the keyboard;
//! - the **keyboard strip**, with keys pressed according to row `offset - 1`.
//!
//! Every call repaints both layers completely; nothing carries over from
//! the previous frame except the scratch allocations.

use crate::activation::{ActivationMatrix, PITCH_COUNT};
use crate::canvas::FrameCanvas;
use crate::config::{Palette, RenderConfig, WHITE_KEY_COUNT};
use crate::error::RenderError;
use crate::geometry::{KeyKind, KeyboardGeometry};

pub struct FrameCompositor<'a> {
    matrix: &'a ActivationMatrix,
    geometry: KeyboardGeometry,
    palette: Palette,
    frame_pixel_size: i64,
    frames_on_screen: usize,
    keyboard_height: u32,
    lane_height: u32,
    canvas: FrameCanvas,
    lane: FrameCanvas,
}

impl<'a> FrameCompositor<'a> {
    pub fn new(config: &RenderConfig, matrix: &'a ActivationMatrix) -> Result<Self, RenderError> {
        config.validate()?;
        let width = config.screen_width();
        let lane_height = config.note_lane_height();
        Ok(Self {
            matrix,
            geometry: KeyboardGeometry::from_config(config),
            palette: config.palette.clone(),
            frame_pixel_size: config.frame_pixel_size as i64,
            frames_on_screen: config.frames_on_screen(),
            keyboard_height: config.keyboard_height,
            lane_height,
            canvas: FrameCanvas::new(width, config.screen_height),
            lane: FrameCanvas::new(width, lane_height),
        })
    }

    pub fn frames_on_screen(&self) -> usize {
        self.frames_on_screen
    }

    pub fn geometry(&self) -> &KeyboardGeometry {
        &self.geometry
    }

    /// Paint the frame whose note lane starts at matrix row `frame_offset`.
    pub fn render_frame(&mut self, frame_offset: i64) -> Result<&FrameCanvas, RenderError> {
        self.draw_notes(frame_offset);
        self.canvas.blit_flipped(&self.lane, 0)?;
        self.draw_keyboard(frame_offset);
        Ok(&self.canvas)
    }

    // ─── Note lane ───────────────────────────────────────────────────

    fn draw_notes(&mut self, offset: i64) {
        self.lane.fill(self.palette.lane_background);
        let fs = self.frame_pixel_size;

        for i in offset..offset + self.frames_on_screen as i64 {
            let Some(row) = self.matrix.row(i) else {
                continue;
            };
            let previous = if i > offset { self.matrix.row(i - 1) } else { None };

            for pitch in 0..PITCH_COUNT {
                let remaining = row[pitch];
                if remaining == 0 {
                    continue;
                }
                // A cell continuing the countdown from the row above is already
                // covered by that row's bar.
                if previous.is_some_and(|p| p[pitch] == remaining + 1) {
                    continue;
                }

                let key = self.geometry.key(pitch as u8);
                let color = match key.kind {
                    KeyKind::White => self.palette.white_note,
                    KeyKind::Black => self.palette.black_note,
                };
                let y = (i - offset) * fs;
                self.lane
                    .fill_rect(key.x, y, key.width, remaining as i64 * fs, color);
            }
        }
    }

    // ─── Keyboard strip ──────────────────────────────────────────────

    fn draw_keyboard(&mut self, offset: i64) {
        let top = self.lane_height as i64;
        let height = self.keyboard_height as i64;
        let black_height = (height as f64 / 2.0).round() as i64;
        let width = self.canvas.width() as i64;
        let white_w = self.geometry.white_width();
        let black_w = self.geometry.black_width();

        self.canvas
            .fill_rect(0, top, width, height, self.palette.keyboard_background);

        // Keys sound on the row the lane just scrolled past.
        let pressed = self.matrix.row(offset - 1).copied();

        if let Some(row) = &pressed {
            for (pitch, &remaining) in row.iter().enumerate() {
                let key = self.geometry.key(pitch as u8);
                if remaining > 0 && key.kind == KeyKind::White {
                    self.canvas
                        .fill_rect(key.x, top, key.width, height, self.palette.pressed_white_key);
                }
            }
        }

        // Neighbouring keys share a border column.
        let columns: Vec<i64> = self.geometry.white_key_columns(WHITE_KEY_COUNT).collect();
        for x in columns {
            self.canvas
                .outline_rect(x, top, white_w + 1, height, self.palette.key_outline);
        }

        for x in self.geometry.black_key_columns() {
            self.canvas
                .fill_rect(x, top, black_w, black_height, self.palette.black_key);
        }

        if let Some(row) = &pressed {
            for (pitch, &remaining) in row.iter().enumerate() {
                let key = self.geometry.key(pitch as u8);
                if remaining > 0 && key.kind == KeyKind::Black {
                    self.canvas
                        .fill_rect(key.x, top, key.width, black_height, self.palette.pressed_black_key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Rgb;
    use crate::config::OverlapPolicy;
    use crate::model::NoteEvent;

    fn middle_c_matrix() -> ActivationMatrix {
        ActivationMatrix::from_notes(
            &[NoteEvent::new(60, 0.0, 1.0)],
            1.0,
            30,
            OverlapPolicy::LastWriteWins,
        )
    }

    #[test]
    fn bar_tip_sits_on_the_play_line() {
        let cfg = RenderConfig::default();
        let matrix = middle_c_matrix();
        let mut comp = FrameCompositor::new(&cfg, &matrix).unwrap();
        let frame = comp.render_frame(0).unwrap();

        let key = KeyboardGeometry::default().key(60);
        let x = (key.x + key.width / 2) as u32;
        let lane_bottom = cfg.note_lane_height() - 1;
        // 31 rows × 6px bar, anchored at the bottom of the lane.
        assert_eq!(frame.pixel(x, lane_bottom), cfg.palette.white_note);
        assert_eq!(frame.pixel(x, lane_bottom - 31 * 6 + 1), cfg.palette.white_note);
        assert_eq!(frame.pixel(x, lane_bottom - 31 * 6), cfg.palette.lane_background);
    }

    #[test]
    fn black_key_note_uses_black_accent() {
        let cfg = RenderConfig::default();
        let matrix = ActivationMatrix::from_notes(
            &[NoteEvent::new(61, 0.0, 0.5)],
            0.5,
            30,
            OverlapPolicy::LastWriteWins,
        );
        let mut comp = FrameCompositor::new(&cfg, &matrix).unwrap();
        let key = comp.geometry().key(61);
        let frame = comp.render_frame(1).unwrap();

        let x = (key.x + key.width / 2) as u32;
        let lane_bottom = cfg.note_lane_height() - 1;
        assert_eq!(frame.pixel(x, lane_bottom), cfg.palette.black_note);

        let key_y = cfg.note_lane_height() + 2;
        assert_eq!(frame.pixel(x, key_y), cfg.palette.pressed_black_key);
    }

    #[test]
    fn scrolled_away_rows_are_blank() {
        let cfg = RenderConfig::default();
        let matrix = middle_c_matrix();
        let mut comp = FrameCompositor::new(&cfg, &matrix).unwrap();
        let frame = comp.render_frame(200).unwrap();

        for y in 0..cfg.note_lane_height() {
            for x in (0..frame.width()).step_by(7) {
                assert_eq!(frame.pixel(x, y), cfg.palette.lane_background);
            }
        }
    }

    #[test]
    fn repaint_is_complete() {
        let cfg = RenderConfig::default();
        let matrix = middle_c_matrix();
        let mut comp = FrameCompositor::new(&cfg, &matrix).unwrap();
        let fresh = comp.render_frame(-50).unwrap().clone();

        comp.render_frame(5).unwrap();
        let again = comp.render_frame(-50).unwrap();
        assert_eq!(fresh.as_bytes(), again.as_bytes());
    }

    #[test]
    fn unpressed_keyboard_colors() {
        let cfg = RenderConfig::default();
        let matrix = middle_c_matrix();
        let mut comp = FrameCompositor::new(&cfg, &matrix).unwrap();
        let frame = comp.render_frame(-10).unwrap();

        let top = cfg.note_lane_height();
        let g = KeyboardGeometry::default();
        let c4 = g.key(60);
        let cs4 = g.key(61);
        // Lower half of a white key, away from outlines.
        assert_eq!(frame.pixel((c4.x + 3) as u32, top + 120), Rgb::WHITE);
        assert_eq!(frame.pixel((cs4.x + 3) as u32, top + 10), cfg.palette.black_key);
        assert_eq!(frame.pixel(c4.x as u32, top + 120), cfg.palette.key_outline);
    }
}
