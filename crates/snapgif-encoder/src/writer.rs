//! Animated GIF container writer
//!
//! [`GifWriter`] moves through `start` → `add_frame`* → `finish`. The first
//! frame carries the logical screen descriptor, the global palette and the
//! optional loop extension; later frames always bring a local palette.

use crate::lzw;
use crate::quantizer::{ColorTable, Quantizer};
use snapgif_core::{CaptureConfig, Error, Repeat, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

pub const SIGNATURE: &[u8; 6] = b"GIF89a";

/// Known GIF block types
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Block {
    /// Image block.
    Image = 0x2C,
    /// Extension block.
    Extension = 0x21,
    /// Image trailer.
    Trailer = 0x3B,
}

/// Extension labels written by this encoder
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Extension {
    /// Graphic control extension.
    Control = 0xF9,
    /// Application extension.
    Application = 0xFF,
}

trait WriteLe<T> {
    fn write_le(&mut self, n: T) -> io::Result<()>;
}

impl<W: Write + ?Sized> WriteLe<u8> for W {
    fn write_le(&mut self, n: u8) -> io::Result<()> {
        self.write_all(&[n])
    }
}

impl<W: Write + ?Sized> WriteLe<u16> for W {
    fn write_le(&mut self, n: u16) -> io::Result<()> {
        self.write_all(&n.to_le_bytes())
    }
}

/// Per-file encoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u16,
    pub height: u16,
    pub repeat: Repeat,
    /// Quantizer sampling interval
    pub quality: u8,
    pub frame_delay_ms: u32,
}

impl EncoderSettings {
    /// Snapshot the encoding parameters of a validated configuration
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            width: config.width.min(u16::MAX as u32) as u16,
            height: config.height.min(u16::MAX as u32) as u16,
            repeat: config.repeat_mode(),
            quality: config.quality,
            frame_delay_ms: config.frame_delay_ms(),
        }
    }

    /// Frame delay in hundredths of a second, rounded
    pub fn delay_centis(&self) -> u16 {
        ((self.frame_delay_ms + 5) / 10).min(u16::MAX as u32) as u16
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// GIF encoder state machine over any byte sink
pub struct GifWriter<W: Write> {
    settings: EncoderSettings,
    sink: Option<W>,
    first_frame: bool,
    frames_written: usize,
    indices: Vec<u8>,
}

impl<W: Write> GifWriter<W> {
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            settings,
            sink: None,
            first_frame: true,
            frames_written: 0,
            indices: Vec::new(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.sink.is_some()
    }

    /// Frames written since the last `start`
    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    /// Begin a new file on `sink` by writing the signature
    pub fn start(&mut self, mut sink: W) -> Result<()> {
        if self.sink.is_some() {
            return Err(Error::InvalidState("start called on a writer that is already started"));
        }
        sink.write_all(SIGNATURE)?;
        self.sink = Some(sink);
        self.first_frame = true;
        self.frames_written = 0;
        Ok(())
    }

    /// Quantize and append one RGB frame
    pub fn add_frame(&mut self, rgb: &[u8]) -> Result<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or(Error::InvalidState("add_frame called before start"))?;
        if rgb.is_empty() {
            return Err(Error::EmptyFrame);
        }
        let expected = self.settings.pixel_count();
        if rgb.len() != expected * 3 {
            return Err(Error::size_mismatch(expected, rgb.len() / 3));
        }

        let quantizer = Quantizer::new(rgb, self.settings.quality);
        let table = quantizer.color_table();
        quantizer.map_pixels(rgb, &mut self.indices);

        if self.first_frame {
            write_screen_descriptor(sink, &self.settings, &table)?;
            write_color_table(sink, &table)?;
            write_loop_extension(sink, self.settings.repeat)?;
        }
        write_graphic_control(sink, self.settings.delay_centis())?;
        let local_table = if self.first_frame { None } else { Some(&table) };
        write_image_descriptor(sink, &self.settings, local_table)?;
        if let Some(table) = local_table {
            write_color_table(sink, table)?;
        }
        lzw::write_image_data(sink, &self.indices, table.size_bits())?;

        self.first_frame = false;
        self.frames_written += 1;
        Ok(())
    }

    /// Write the trailer, flush and hand back the sink.
    ///
    /// The writer returns to its unstarted state and can encode another file.
    pub fn finish(&mut self) -> Result<W> {
        let mut sink = self
            .sink
            .take()
            .ok_or(Error::InvalidState("finish called before start"))?;
        sink.write_le(Block::Trailer as u8)?;
        sink.flush()?;

        debug!("GIF finished after {} frames", self.frames_written);
        self.indices = Vec::new();
        self.first_frame = true;
        Ok(sink)
    }
}

impl GifWriter<BufWriter<File>> {
    /// Open `path` for writing and start a new file there
    pub fn create(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.is_started() {
            return Err(Error::InvalidState("start called on a writer that is already started"));
        }
        let file = File::create(path)?;
        self.start(BufWriter::new(file))
    }
}

fn write_screen_descriptor<W: Write>(
    w: &mut W,
    settings: &EncoderSettings,
    table: &ColorTable,
) -> io::Result<()> {
    let size = table.size_bits() - 1;
    let mut flags = 0b1000_0000; // global color table
    flags |= size << 4; // color resolution
    flags |= size;
    w.write_le(settings.width)?;
    w.write_le(settings.height)?;
    w.write_le(flags)?;
    w.write_le(0u8)?; // background index
    w.write_le(0u8) // aspect ratio
}

fn write_color_table<W: Write>(w: &mut W, table: &ColorTable) -> io::Result<()> {
    w.write_all(table.as_bytes())?;
    // Pad up to the declared power of two
    for _ in table.len()..(1usize << table.size_bits()) {
        w.write_all(&[0, 0, 0])?;
    }
    Ok(())
}

fn write_loop_extension<W: Write>(w: &mut W, repeat: Repeat) -> io::Result<()> {
    let count = match repeat {
        Repeat::Disabled => return Ok(()),
        Repeat::Infinite => 0,
        Repeat::Finite(n) => n,
    };
    w.write_le(Block::Extension as u8)?;
    w.write_le(Extension::Application as u8)?;
    w.write_le(11u8)?;
    w.write_all(b"NETSCAPE2.0")?;
    w.write_le(3u8)?;
    w.write_le(1u8)?;
    w.write_le(count)?;
    w.write_le(0u8)
}

fn write_graphic_control<W: Write>(w: &mut W, delay: u16) -> io::Result<()> {
    w.write_le(Block::Extension as u8)?;
    w.write_le(Extension::Control as u8)?;
    w.write_le(4u8)?;
    // disposal unspecified, no user input, no transparency
    w.write_le(0u8)?;
    w.write_le(delay)?;
    w.write_le(0u8)?;
    w.write_le(0u8)
}

fn write_image_descriptor<W: Write>(
    w: &mut W,
    settings: &EncoderSettings,
    local_table: Option<&ColorTable>,
) -> io::Result<()> {
    w.write_le(Block::Image as u8)?;
    w.write_le(0u16)?; // left
    w.write_le(0u16)?; // top
    w.write_le(settings.width)?;
    w.write_le(settings.height)?;
    let flags = match local_table {
        Some(table) => 0b1000_0000 | (table.size_bits() - 1),
        None => 0,
    };
    w.write_le(flags)
}
