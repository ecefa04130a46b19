//! Frame canvas — an RGB raster buffer with the few drawing primitives the
//! compositor needs. All rectangles are half-open (`[x, x + w)`) and clipped
//! to the canvas, so callers can pass keys that sit partly or fully off-screen.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// An RGB color. Serialized as a `[r, g, b]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const BLACK: Rgb = Rgb([0, 0, 0]);
    pub const WHITE: Rgb = Rgb([255, 255, 255]);
}

#[derive(Debug, Clone)]
pub struct FrameCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl FrameCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 3],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed `rgb24` bytes, row-major, top row first.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        let i = self.index(x, y);
        Rgb([self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]])
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }

    pub fn fill(&mut self, color: Rgb) {
        for px in self.pixels.chunks_exact_mut(3) {
            px.copy_from_slice(&color.0);
        }
    }

    /// Fill `[x, x + w) × [y, y + h)`, clipped to the canvas.
    pub fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, color: Rgb) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + w).min(self.width as i64);
        let y1 = (y + h).min(self.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let row_bytes = (x1 - x0) as usize * 3;
        for row in y0..y1 {
            let start = self.index(x0 as u32, row as u32);
            for px in self.pixels[start..start + row_bytes].chunks_exact_mut(3) {
                px.copy_from_slice(&color.0);
            }
        }
    }

    /// One-pixel outline of `[x, x + w) × [y, y + h)`, clipped to the canvas.
    pub fn outline_rect(&mut self, x: i64, y: i64, w: i64, h: i64, color: Rgb) {
        if w <= 0 || h <= 0 {
            return;
        }
        self.fill_rect(x, y, w, 1, color);
        self.fill_rect(x, y + h - 1, w, 1, color);
        self.fill_rect(x, y, 1, h, color);
        self.fill_rect(x + w - 1, y, 1, h, color);
    }

    /// Copy `src` into this canvas starting at row `dst_y`, upside down.
    /// Rows that would land outside the canvas are dropped.
    pub fn blit_flipped(&mut self, src: &FrameCanvas, dst_y: u32) -> Result<(), RenderError> {
        if src.width != self.width {
            return Err(RenderError::Config(format!(
                "cannot composite a {}px wide layer onto a {}px wide frame",
                src.width, self.width
            )));
        }

        let row_bytes = self.width as usize * 3;
        for src_row in 0..src.height {
            let dst_row = dst_y + (src.height - 1 - src_row);
            if dst_row >= self.height {
                continue;
            }
            let s = src.index(0, src_row);
            let d = self.index(0, dst_row);
            self.pixels[d..d + row_bytes].copy_from_slice(&src.pixels[s..s + row_bytes]);
        }
        Ok(())
    }

    /// Write the canvas as a PNG image.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<(), RenderError> {
        let path = path.as_ref();
        let img = image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| RenderError::Encoding("canvas buffer has the wrong size".into()))?;
        img.save(path)
            .map_err(|e| RenderError::Encoding(format!("failed to write '{}': {e}", path.display())))
    }
}
