//! SnapGif Encoder - animated GIF encoding
//!
//! This crate turns RGB frames into a GIF89a file:
//! - a neural-network color quantizer reducing each frame to 256 colors
//! - the variable-width LZW compressor required by the image data blocks
//! - a container writer assembling headers, palettes and extensions

pub mod lzw;
pub mod quantizer;
pub mod writer;

pub use lzw::LzwEncoder;
pub use quantizer::{ColorTable, Quantizer};
pub use writer::{EncoderSettings, GifWriter};
