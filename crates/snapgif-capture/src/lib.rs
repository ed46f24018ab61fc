//! SnapGif Capture - frame readback and buffering
//!
//! This crate provides:
//! - the [`FrameSource`] capability through which render output is read back
//! - a procedural [`SyntheticSource`] for demos and tests
//! - the [`FrameRing`] holding the most recent frames

pub mod readback;
pub mod ring;
pub mod synthetic;

pub use readback::{Readback, ReadbackSender, ReadbackStatus};
pub use ring::FrameRing;
pub use snapgif_core::Frame;
pub use synthetic::SyntheticSource;

/// Something that can read back the current render output
pub trait FrameSource: Send {
    /// Size of the images this source produces
    fn dimensions(&self) -> (u32, u32);

    /// Start an asynchronous readback.
    ///
    /// `target` is a recycled allocation the source may fill and return
    /// inside the result instead of allocating.
    fn request_readback(&mut self, target: Vec<u8>) -> Readback;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn request_readback(&mut self, target: Vec<u8>) -> Readback {
        (**self).request_readback(target)
    }
}
