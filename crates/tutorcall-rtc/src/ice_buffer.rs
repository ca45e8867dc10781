//! Remote ICE candidates held until a remote description exists

use std::collections::VecDeque;

use tutorcall_media_sdk::IceCandidate;

/// FIFO of candidates that arrived before the remote description.
///
/// Drained in receipt order; every buffered candidate comes out exactly once.
#[derive(Debug, Default)]
pub struct PendingIceBuffer {
    candidates: VecDeque<IceCandidate>,
}

impl PendingIceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: IceCandidate) {
        self.candidates.push_back(candidate);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
    }

    /// Empties the buffer, oldest candidate first
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.candidates.drain(..).collect()
    }
}
