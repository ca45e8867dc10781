use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tutorcall_media_sdk::{MediaConstraints, TrackKind};

use crate::media::{MediaDevices, MediaError, MediaStream, MediaStreamTrack};

/// Fake camera, microphone and display sources
#[derive(Default)]
pub struct LoopbackMediaDevices {
    deny_camera: AtomicBool,
    deny_microphone: AtomicBool,
    deny_display: AtomicBool,
    latency: Mutex<Duration>,
    user_media_requests: AtomicUsize,
    display_media_requests: AtomicUsize,
    issued: Mutex<Vec<MediaStreamTrack>>,
    last_display: Mutex<Option<MediaStreamTrack>>,
}

impl LoopbackMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_camera(&self, deny: bool) {
        self.deny_camera.store(deny, Ordering::SeqCst);
    }

    pub fn deny_microphone(&self, deny: bool) {
        self.deny_microphone.store(deny, Ordering::SeqCst);
    }

    pub fn deny_display(&self, deny: bool) {
        self.deny_display.store(deny, Ordering::SeqCst);
    }

    /// Delay applied to every capture request
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn user_media_requests(&self) -> usize {
        self.user_media_requests.load(Ordering::SeqCst)
    }

    pub fn display_media_requests(&self) -> usize {
        self.display_media_requests.load(Ordering::SeqCst)
    }

    /// Every track handed out so far, in issue order
    pub fn issued_tracks(&self) -> Vec<MediaStreamTrack> {
        self.issued.lock().clone()
    }

    pub fn live_tracks(&self) -> usize {
        self.issued.lock().iter().filter(|t| t.is_live()).count()
    }

    /// Video track of the latest display capture; call `end_from_source`
    /// on it to mimic the browser's "stop sharing" control
    pub fn last_display_track(&self) -> Option<MediaStreamTrack> {
        self.last_display.lock().clone()
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn issue(&self, tracks: Vec<MediaStreamTrack>) -> MediaStream {
        self.issued.lock().extend(tracks.iter().cloned());
        MediaStream::new(tracks)
    }
}

#[async_trait]
impl MediaDevices for LoopbackMediaDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<MediaStream, MediaError> {
        self.user_media_requests.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if constraints.video && self.deny_camera.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("camera".to_string()));
        }
        if constraints.audio && self.deny_microphone.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("microphone".to_string()));
        }

        let mut tracks = Vec::new();
        if constraints.wants(TrackKind::Video) {
            tracks.push(MediaStreamTrack::new(TrackKind::Video, "camera"));
        }
        if constraints.wants(TrackKind::Audio) {
            tracks.push(MediaStreamTrack::new(TrackKind::Audio, "microphone"));
        }
        if tracks.is_empty() {
            return Err(MediaError::NotFound("no media kind requested".to_string()));
        }
        Ok(self.issue(tracks))
    }

    async fn get_display_media(&self, constraints: MediaConstraints) -> Result<MediaStream, MediaError> {
        self.display_media_requests.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.deny_display.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("display capture".to_string()));
        }

        let screen = MediaStreamTrack::new(TrackKind::Video, "screen");
        let mut tracks = vec![screen.clone()];
        if constraints.audio {
            tracks.push(MediaStreamTrack::new(TrackKind::Audio, "system-audio"));
        }
        *self.last_display.lock() = Some(screen);
        Ok(self.issue(tracks))
    }
}
