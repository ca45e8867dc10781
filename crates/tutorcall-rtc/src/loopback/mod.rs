//! In-process platform backend.
//!
//! Fake capture devices and a peer connection that speaks a minimal textual
//! SDP. Two negotiators wired to the same relay complete a full
//! offer/answer/ICE exchange without any native media stack.

mod devices;
mod peer;

pub use devices::LoopbackMediaDevices;
pub use peer::{LoopbackPeerConnection, LoopbackPeerFactory, LoopbackSender};
