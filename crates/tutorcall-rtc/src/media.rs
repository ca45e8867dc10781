//! Local media: tracks, streams and the capture-device seam
//!
//! [`MediaStreamTrack`] and [`MediaStream`] are shared handles, cheap to clone,
//! mirroring the browser objects of the same name. Capture itself happens
//! behind [`MediaDevices`], implemented by the platform binding.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tutorcall_media_sdk::{MediaConstraints, TrackKind};
use uuid::Uuid;

/// Capture device access (`getUserMedia` / `getDisplayMedia`)
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Camera and/or microphone, per the constraints
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<MediaStream, MediaError>;

    /// Screen, window or tab capture
    async fn get_display_media(&self, constraints: MediaConstraints) -> Result<MediaStream, MediaError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No device found: {0}")]
    NotFound(String),

    #[error("Capture aborted: {0}")]
    Aborted(String),

    #[error("Device error: {0}")]
    Device(String),
}

/// Ready state as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Live,
    /// Ended by a local `stop()`
    Stopped,
    /// Ended because the source went away (device unplugged, native "stop sharing")
    SourceEnded,
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    lifecycle: watch::Sender<Lifecycle>,
}

/// A single audio or video track
#[derive(Clone)]
pub struct MediaStreamTrack {
    inner: Arc<TrackInner>,
}

impl MediaStreamTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::Live);
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                lifecycle,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Mutes or unmutes the track without touching the connection
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn ready_state(&self) -> TrackState {
        match *self.inner.lifecycle.borrow() {
            Lifecycle::Live => TrackState::Live,
            Lifecycle::Stopped | Lifecycle::SourceEnded => TrackState::Ended,
        }
    }

    pub fn is_live(&self) -> bool {
        self.ready_state() == TrackState::Live
    }

    /// Releases the device. Does not wake [`source_ended`](Self::source_ended).
    pub fn stop(&self) {
        self.transition(Lifecycle::Stopped);
    }

    /// Called by the platform when the source stops producing media
    pub fn end_from_source(&self) {
        self.transition(Lifecycle::SourceEnded);
    }

    fn transition(&self, next: Lifecycle) {
        self.inner.lifecycle.send_if_modified(|state| {
            if *state == Lifecycle::Live {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    /// Resolves once the track is no longer live; `true` if the source ended it
    pub async fn source_ended(&self) -> bool {
        let mut rx = self.inner.lifecycle.subscribe();
        let ended = match rx.wait_for(|state| *state != Lifecycle::Live).await {
            Ok(state) => *state == Lifecycle::SourceEnded,
            Err(_) => false,
        };
        ended
    }

    pub fn same_track(&self, other: &MediaStreamTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MediaStreamTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStreamTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("enabled", &self.is_enabled())
            .field("state", &self.ready_state())
            .finish()
    }
}

impl PartialEq for MediaStreamTrack {
    fn eq(&self, other: &Self) -> bool {
        self.same_track(other)
    }
}

/// An ordered, mutable set of tracks
#[derive(Clone)]
pub struct MediaStream {
    id: Arc<str>,
    tracks: Arc<Mutex<Vec<MediaStreamTrack>>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaStreamTrack>) -> Self {
        Self {
            id: Arc::from(Uuid::new_v4().to_string()),
            tracks: Arc::new(Mutex::new(tracks)),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> Vec<MediaStreamTrack> {
        self.tracks.lock().clone()
    }

    pub fn tracks_of(&self, kind: TrackKind) -> Vec<MediaStreamTrack> {
        self.tracks.lock().iter().filter(|t| t.kind() == kind).cloned().collect()
    }

    pub fn first_track(&self, kind: TrackKind) -> Option<MediaStreamTrack> {
        self.tracks.lock().iter().find(|t| t.kind() == kind).cloned()
    }

    /// First track of `kind` that has not ended
    pub fn live_track(&self, kind: TrackKind) -> Option<MediaStreamTrack> {
        self.tracks
            .lock()
            .iter()
            .find(|t| t.kind() == kind && t.is_live())
            .cloned()
    }

    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.tracks.lock().iter().any(|t| t.kind() == kind)
    }

    pub fn add_track(&self, track: MediaStreamTrack) {
        let mut tracks = self.tracks.lock();
        if !tracks.iter().any(|t| t.same_track(&track)) {
            tracks.push(track);
        }
    }

    pub fn remove_track(&self, track: &MediaStreamTrack) -> bool {
        let mut tracks = self.tracks.lock();
        let before = tracks.len();
        tracks.retain(|t| !t.same_track(track));
        tracks.len() != before
    }

    /// Drops ended tracks of `kind`, returning how many were removed
    pub fn prune_ended(&self, kind: TrackKind) -> usize {
        let mut tracks = self.tracks.lock();
        let before = tracks.len();
        tracks.retain(|t| t.kind() != kind || t.is_live());
        before - tracks.len()
    }

    pub fn stop_all(&self) {
        for track in self.tracks.lock().iter() {
            track.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.lock().is_empty()
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &*self.tracks.lock())
            .finish()
    }
}

impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_ends_track_once() {
        let track = MediaStreamTrack::new(TrackKind::Video, "camera");
        assert_eq!(track.ready_state(), TrackState::Live);
        track.stop();
        assert_eq!(track.ready_state(), TrackState::Ended);
        track.end_from_source();
        assert_eq!(track.ready_state(), TrackState::Ended);
    }

    #[tokio::test]
    async fn test_source_ended_distinguishes_local_stop() {
        let stopped = MediaStreamTrack::new(TrackKind::Video, "screen");
        stopped.stop();
        assert!(!stopped.source_ended().await);

        let ended = MediaStreamTrack::new(TrackKind::Video, "screen");
        let watcher = {
            let ended = ended.clone();
            tokio::spawn(async move { ended.source_ended().await })
        };
        tokio::task::yield_now().await;
        ended.end_from_source();
        assert!(watcher.await.unwrap());
    }

    #[test]
    fn test_stream_track_management() {
        let camera = MediaStreamTrack::new(TrackKind::Video, "camera");
        let mic = MediaStreamTrack::new(TrackKind::Audio, "microphone");
        let stream = MediaStream::new(vec![camera.clone(), mic.clone()]);

        stream.add_track(camera.clone());
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.first_track(TrackKind::Audio), Some(mic.clone()));

        camera.end_from_source();
        assert!(stream.live_track(TrackKind::Video).is_none());
        assert_eq!(stream.prune_ended(TrackKind::Video), 1);
        assert!(!stream.has_track(TrackKind::Video));

        assert!(stream.remove_track(&mic));
        assert!(stream.is_empty());
    }

    #[test]
    fn test_clones_share_enabled_flag() {
        let track = MediaStreamTrack::new(TrackKind::Audio, "microphone");
        let clone = track.clone();
        clone.set_enabled(false);
        assert!(!track.is_enabled());
        assert_eq!(track, clone);
    }
}
