//! Procedural frame source for demos and tests

use crate::{FrameSource, Readback};
use snapgif_core::{PixelFormat, RawPixels};
use std::time::Duration;
use tracing::debug;

/// Renders a scrolling gradient with a bouncing block
pub struct SyntheticSource {
    width: u32,
    height: u32,
    format: PixelFormat,
    latency: Duration,
    frame: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgb,
            latency: Duration::ZERO,
            frame: 0,
        }
    }

    /// Builder pattern: deliver RGBA instead of RGB
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Builder pattern: complete readbacks after a delay on a helper thread
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn render(&self, mut target: Vec<u8>) -> RawPixels {
        let (w, h) = (self.width as usize, self.height as usize);
        let bpp = self.format.bytes_per_pixel();
        target.clear();
        target.reserve(w * h * bpp);

        let t = self.frame as usize;
        let block = (w.min(h) / 4).max(1);
        let span_x = w.saturating_sub(block).max(1);
        let span_y = h.saturating_sub(block).max(1);
        let bx = bounce(t * 3, span_x);
        let by = bounce(t * 2, span_y);

        for y in 0..h {
            for x in 0..w {
                let inside = x >= bx && x < bx + block && y >= by && y < by + block;
                let rgb = if inside {
                    [250, 250, 40]
                } else {
                    [
                        ((x + t * 4) * 255 / w.max(1)) as u8,
                        (y * 255 / h.max(1)) as u8,
                        ((t * 8) % 256) as u8,
                    ]
                };
                target.extend_from_slice(&rgb);
                if bpp == 4 {
                    target.push(255);
                }
            }
        }

        RawPixels::new(self.format, target)
    }
}

fn bounce(t: usize, span: usize) -> usize {
    let period = span * 2;
    let phase = t % period.max(1);
    if phase < span {
        phase
    } else {
        period - phase
    }
}

impl FrameSource for SyntheticSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn request_readback(&mut self, target: Vec<u8>) -> Readback {
        let pixels = self.render(target);
        self.frame += 1;

        if self.latency.is_zero() {
            return Readback::completed(Ok(pixels));
        }

        let (tx, readback) = Readback::channel();
        let latency = self.latency;
        std::thread::spawn(move || {
            std::thread::sleep(latency);
            tx.complete(Ok(pixels));
        });
        debug!("Synthetic readback {} scheduled", self.frame);
        readback
    }
}
