//! Asynchronous pixel readback handles

use snapgif_core::{Error, RawPixels, Result};
use tokio::sync::oneshot::{self, error::TryRecvError};

/// State of an in-flight readback
#[derive(Debug)]
pub enum ReadbackStatus {
    Pending,
    Ready(Result<RawPixels>),
}

/// Receiving end of a readback request, polled once per tick
pub struct Readback {
    rx: oneshot::Receiver<Result<RawPixels>>,
}

/// Completion side handed to whatever performs the copy
pub struct ReadbackSender {
    tx: oneshot::Sender<Result<RawPixels>>,
}

impl ReadbackSender {
    pub fn complete(self, result: Result<RawPixels>) {
        // The requester may have gone away; nothing to report then
        let _ = self.tx.send(result);
    }
}

impl Readback {
    pub fn channel() -> (ReadbackSender, Readback) {
        let (tx, rx) = oneshot::channel();
        (ReadbackSender { tx }, Readback { rx })
    }

    /// A readback that has already finished
    pub fn completed(result: Result<RawPixels>) -> Self {
        let (tx, readback) = Self::channel();
        tx.complete(result);
        readback
    }

    /// Check for completion without blocking.
    ///
    /// A sender dropped without completing counts as a failed capture.
    pub fn poll(&mut self) -> ReadbackStatus {
        match self.rx.try_recv() {
            Ok(result) => ReadbackStatus::Ready(result),
            Err(TryRecvError::Empty) => ReadbackStatus::Pending,
            Err(TryRecvError::Closed) => ReadbackStatus::Ready(Err(Error::Capture(
                "readback abandoned before completion".to_string(),
            ))),
        }
    }
}
