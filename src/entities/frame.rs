//! Pixel arrays flowing through the node graph.
//!
//! A `Frame` is an immutable `(height, width, channels)` f32 buffer, row-major,
//! origin top-left. Channels are either 1 (grayscale) or 4 (RGBA). The buffer
//! lives behind an `Arc`, so cloning a frame (cache fan-out, previews) is cheap.
//!
//! # Normalization
//!
//! Anything treated as a final or preview image goes through `to_rgba()`:
//! a single-channel frame is broadcast to RGB with alpha = 1.0.
//!
//! # Host layout
//!
//! `to_rect()` produces the per-pixel `[r, g, b, a]` layout the host's result
//! passes use; `fit()` crops or pads to the result rectangle first.

use image::{ImageBuffer, Rgba};
use log::debug;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Channel layout of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    Gray,
    Rgba,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Channels::Gray => 1,
            Channels::Rgba => 4,
        }
    }

    pub fn from_count(count: usize) -> Result<Self, FrameError> {
        match count {
            1 => Ok(Channels::Gray),
            4 => Ok(Channels::Rgba),
            n => Err(FrameError::UnsupportedChannels(n)),
        }
    }
}

/// Anchor used when cropping or padding to a different size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropAlign {
    LeftTop,
    Center,
}

/// Frame construction and I/O errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("buffer length {actual} does not match shape ({expected} expected)")]
    Shape { expected: usize, actual: usize },
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(usize),
    #[error("image error: {0}")]
    Image(String),
}

impl From<image::ImageError> for FrameError {
    fn from(e: image::ImageError) -> Self {
        FrameError::Image(e.to_string())
    }
}

/// Immutable pixel array `(height, width, channels)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    channels: Channels,
    data: Arc<Vec<f32>>,
}

impl Frame {
    /// Zero-filled frame (transparent black for RGBA)
    pub fn new(width: usize, height: usize, channels: Channels) -> Self {
        Self {
            width,
            height,
            channels,
            data: Arc::new(vec![0.0; width * height * channels.count()]),
        }
    }

    /// Single-channel frame filled with `value`
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            channels: Channels::Gray,
            data: Arc::new(vec![value; width * height]),
        }
    }

    /// RGBA frame filled with one colour
    pub fn solid(width: usize, height: usize, color: [f32; 4]) -> Self {
        let mut data = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            channels: Channels::Rgba,
            data: Arc::new(data),
        }
    }

    /// Wrap an existing buffer, validating its length against the shape.
    pub fn from_vec(
        width: usize,
        height: usize,
        channels: Channels,
        data: Vec<f32>,
    ) -> Result<Self, FrameError> {
        let expected = width * height * channels.count();
        if data.len() != expected {
            return Err(FrameError::Shape {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data: Arc::new(data),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Shape as `(height, width, channels)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels.count())
    }

    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Pixel as RGBA; grayscale broadcasts with alpha = 1.0.
    pub fn pixel(&self, x: usize, y: usize) -> [f32; 4] {
        let idx = (y * self.width + x) * self.channels.count();
        match self.channels {
            Channels::Gray => {
                let v = self.data[idx];
                [v, v, v, 1.0]
            }
            Channels::Rgba => [
                self.data[idx],
                self.data[idx + 1],
                self.data[idx + 2],
                self.data[idx + 3],
            ],
        }
    }

    /// Normalize to four channels. RGBA frames share their buffer.
    pub fn to_rgba(&self) -> Frame {
        match self.channels {
            Channels::Rgba => self.clone(),
            Channels::Gray => {
                let mut data = Vec::with_capacity(self.data.len() * 4);
                for &v in self.data.iter() {
                    data.extend_from_slice(&[v, v, v, 1.0]);
                }
                Frame {
                    width: self.width,
                    height: self.height,
                    channels: Channels::Rgba,
                    data: Arc::new(data),
                }
            }
        }
    }

    /// Crop or pad (transparent) to `width` x `height`, returning RGBA.
    pub fn fit(&self, width: usize, height: usize, align: CropAlign) -> Frame {
        let src = self.to_rgba();
        if src.width == width && src.height == height {
            return src;
        }
        debug!(
            "Fitting {}x{} frame into {}x{} ({:?})",
            src.width, src.height, width, height, align
        );

        let (off_x, off_y) = match align {
            CropAlign::LeftTop => (0i64, 0i64),
            CropAlign::Center => (
                (src.width as i64 - width as i64) / 2,
                (src.height as i64 - height as i64) / 2,
            ),
        };

        let mut out = vec![0.0f32; width * height * 4];
        out.par_chunks_mut(width.max(1) * 4).enumerate().for_each(|(y, row)| {
            let sy = y as i64 + off_y;
            if sy < 0 || sy >= src.height as i64 {
                return;
            }
            for x in 0..width {
                let sx = x as i64 + off_x;
                if sx < 0 || sx >= src.width as i64 {
                    continue;
                }
                let s = (sy as usize * src.width + sx as usize) * 4;
                row[x * 4..x * 4 + 4].copy_from_slice(&src.data[s..s + 4]);
            }
        });

        Frame {
            width,
            height,
            channels: Channels::Rgba,
            data: Arc::new(out),
        }
    }

    /// Bilinear resize, keeping the channel layout.
    pub fn resize(&self, width: usize, height: usize) -> Frame {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let ch = self.channels.count();
        let (src_w, src_h) = (self.width, self.height);
        let mut out = vec![0.0f32; width * height * ch];
        if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
            return Frame {
                width,
                height,
                channels: self.channels,
                data: Arc::new(out),
            };
        }

        let sx = src_w as f32 / width as f32;
        let sy = src_h as f32 / height as f32;
        out.par_chunks_mut(width * ch).enumerate().for_each(|(y, row)| {
            // Sample at pixel centers
            let fy = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, (src_h - 1) as f32);
            for x in 0..width {
                let fx = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, (src_w - 1) as f32);
                sample_bilinear(&self.data, src_w, src_h, ch, fx, fy, &mut row[x * ch..x * ch + ch]);
            }
        });

        Frame {
            width,
            height,
            channels: self.channels,
            data: Arc::new(out),
        }
    }

    /// RGBA copy with colour channels multiplied by alpha.
    pub fn premultiplied(&self) -> Frame {
        let src = self.to_rgba();
        let mut data = src.data.to_vec();
        data.par_chunks_mut(4).for_each(|px| {
            let a = px[3];
            px[0] *= a;
            px[1] *= a;
            px[2] *= a;
        });
        Frame {
            width: src.width,
            height: src.height,
            channels: Channels::Rgba,
            data: Arc::new(data),
        }
    }

    /// Flatten to the host's `rect` layout: one `[r, g, b, a]` per pixel.
    pub fn to_rect(&self) -> Vec<[f32; 4]> {
        let src = self.to_rgba();
        src.data
            .chunks_exact(4)
            .map(|px| [px[0], px[1], px[2], px[3]])
            .collect()
    }

    /// Load an image file as an RGBA float frame.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Frame, FrameError> {
        let path = path.as_ref();
        debug!("Loading image {}", path.display());
        let img = image::open(path)?.into_rgba32f();
        let (w, h) = img.dimensions();
        Frame::from_vec(w as usize, h as usize, Channels::Rgba, img.into_raw())
    }

    /// 8-bit RGBA bytes, clamped to 0..1.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.to_rgba()
            .data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }

    /// Save as 8-bit PNG.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<(), FrameError> {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_raw(self.width as u32, self.height as u32, self.to_rgba8())
                .ok_or_else(|| FrameError::Image("buffer too small for image".to_string()))?;
        img.save(path.as_ref())?;
        Ok(())
    }
}

fn sample_bilinear(
    buffer: &[f32],
    width: usize,
    height: usize,
    ch: usize,
    x: f32,
    y: f32,
    out: &mut [f32],
) {
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let idx00 = (y0 * width + x0) * ch;
    let idx10 = (y0 * width + x1) * ch;
    let idx01 = (y1 * width + x0) * ch;
    let idx11 = (y1 * width + x1) * ch;

    for c in 0..ch {
        let top = buffer[idx00 + c] * (1.0 - fx) + buffer[idx10 + c] * fx;
        let bottom = buffer[idx01 + c] * (1.0 - fx) + buffer[idx11 + c] * fx;
        out[c] = top * (1.0 - fy) + bottom * fy;
    }
}
