//! Track toggles and screen share

use tracing::{debug, info, warn};
use tutorcall_media_sdk::{MediaConstraints, TrackKind};

use super::{CallSlot, Inner};
use crate::media::{MediaError, MediaStream, MediaStreamTrack};
use crate::peer::{sender_for, PeerConnection, PeerError};

impl Inner {
    pub(super) async fn toggle_track(&self, kind: TrackKind) -> bool {
        let slot = self.call.lock().await;
        let (Some(stream), Some(peer)) = (slot.local_stream.clone(), slot.peer.clone()) else {
            debug!(session_id = %self.session_id, kind = %kind, "Toggle ignored, no active call");
            return false;
        };

        if let Some(track) = stream.live_track(kind) {
            let enabled = !track.is_enabled();
            track.set_enabled(enabled);
            self.publish_enabled(kind, enabled);
            info!(session_id = %self.session_id, kind = %kind, enabled, "Track toggled");
            return enabled;
        }

        stream.prune_ended(kind);
        let track = match self.acquire_track(kind).await {
            Ok(track) => track,
            Err(e) => {
                warn!(session_id = %self.session_id, kind = %kind, error = %e, "Failed to acquire track");
                return false;
            }
        };

        stream.add_track(track.clone());
        if let Err(e) = attach_track(peer.as_ref(), &track, &stream).await {
            warn!(session_id = %self.session_id, kind = %kind, error = %e, "Failed to attach new track");
            stream.remove_track(&track);
            track.stop();
            return false;
        }

        self.publish_enabled(kind, true);
        info!(session_id = %self.session_id, kind = %kind, "Track acquired and attached");
        true
    }

    pub(super) async fn toggle_screen_share(&self) -> bool {
        let mut slot = self.call.lock().await;
        if !slot.active || slot.peer.is_none() {
            debug!(session_id = %self.session_id, "Screen share toggle ignored, no active call");
            return false;
        }

        if slot.screen_track.is_some() {
            self.stop_screen_share(&mut slot, false).await;
        } else {
            self.start_screen_share(&mut slot).await;
        }
        slot.screen_track.is_some()
    }

    async fn start_screen_share(&self, slot: &mut CallSlot) {
        let (Some(stream), Some(peer)) = (slot.local_stream.clone(), slot.peer.clone()) else {
            return;
        };

        let capture = match self.devices.get_display_media(MediaConstraints::audio_video()).await {
            Ok(capture) => capture,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Screen capture request failed");
                return;
            }
        };
        let Some(screen) = capture.first_track(TrackKind::Video) else {
            warn!(session_id = %self.session_id, "Screen capture returned no video track");
            capture.stop_all();
            return;
        };
        // The call has a single audio sender, owned by the microphone
        for extra in capture.tracks() {
            if !extra.same_track(&screen) {
                extra.stop();
            }
        }

        if let Err(e) = attach_track(peer.as_ref(), &screen, &stream).await {
            warn!(session_id = %self.session_id, error = %e, "Failed to send screen capture");
            screen.stop();
            return;
        }

        for camera in stream.tracks_of(TrackKind::Video) {
            camera.stop();
            stream.remove_track(&camera);
        }
        stream.add_track(screen.clone());
        slot.screen_track = Some(screen.clone());
        slot.tasks.screen = Some(self.spawn_screen_watcher(screen));

        self.state.send_modify(|s| {
            s.local_stream = Some(stream);
            s.is_screen_sharing = true;
            s.is_video_enabled = true;
        });
        info!(session_id = %self.session_id, "Screen share started");
    }

    /// Puts the camera back on the video sender and drops the capture track.
    ///
    /// `from_watcher` is set when the source-ended watcher itself reverts,
    /// in which case its handle is detached rather than aborted.
    async fn stop_screen_share(&self, slot: &mut CallSlot, from_watcher: bool) {
        let Some(screen) = slot.screen_track.take() else {
            return;
        };
        if let Some(watcher) = slot.tasks.screen.take() {
            if !from_watcher {
                watcher.abort();
            }
        }

        let (Some(stream), Some(peer)) = (slot.local_stream.clone(), slot.peer.clone()) else {
            screen.stop();
            return;
        };

        let camera_restored = match self.acquire_track(TrackKind::Video).await {
            Ok(camera) => {
                stream.add_track(camera.clone());
                match attach_track(peer.as_ref(), &camera, &stream).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(session_id = %self.session_id, error = %e, "Failed to send restored camera");
                        stream.remove_track(&camera);
                        camera.stop();
                        false
                    }
                }
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Could not reacquire camera after screen share");
                false
            }
        };

        if !camera_restored {
            if let Some(sender) = sender_for(peer.as_ref(), TrackKind::Video) {
                if let Err(e) = sender.replace_track(None).await {
                    warn!(session_id = %self.session_id, error = %e, "Failed to clear video sender");
                }
            }
        }

        screen.stop();
        stream.remove_track(&screen);

        self.state.send_modify(|s| {
            s.local_stream = Some(stream);
            s.is_screen_sharing = false;
            s.is_video_enabled = camera_restored;
        });
        info!(session_id = %self.session_id, camera_restored, "Screen share stopped");
    }

    fn spawn_screen_watcher(&self, screen: MediaStreamTrack) -> tokio::task::JoinHandle<()> {
        let me = self.me.clone();
        tokio::spawn(async move {
            if !screen.source_ended().await {
                return;
            }
            let Some(inner) = me.upgrade() else { return };
            info!(session_id = %inner.session_id, "Screen capture ended by the user, reverting to camera");

            let mut slot = inner.call.lock().await;
            let current = slot
                .screen_track
                .as_ref()
                .is_some_and(|track| track.same_track(&screen));
            if current {
                inner.stop_screen_share(&mut slot, true).await;
            }
        })
    }

    /// A single track of `kind`; any extra tracks the device returned are stopped
    async fn acquire_track(&self, kind: TrackKind) -> Result<MediaStreamTrack, MediaError> {
        let captured = self.devices.get_user_media(MediaConstraints::only(kind)).await?;
        let track = captured.first_track(kind).ok_or_else(|| {
            captured.stop_all();
            MediaError::NotFound(format!("device returned no {} track", kind))
        })?;
        for extra in captured.tracks() {
            if !extra.same_track(&track) {
                extra.stop();
            }
        }
        Ok(track)
    }

    fn publish_enabled(&self, kind: TrackKind, enabled: bool) {
        self.state.send_modify(|s| match kind {
            TrackKind::Video => s.is_video_enabled = enabled,
            TrackKind::Audio => s.is_audio_enabled = enabled,
        });
    }
}

/// Live substitution on the sender of the same kind, or a new sender if there is none
async fn attach_track(
    peer: &dyn PeerConnection,
    track: &MediaStreamTrack,
    stream: &MediaStream,
) -> Result<(), PeerError> {
    if let Some(sender) = sender_for(peer, track.kind()) {
        match sender.replace_track(Some(track.clone())).await {
            Ok(()) => return Ok(()),
            Err(e) => warn!(kind = %track.kind(), error = %e, "replace_track failed, adding a sender"),
        }
    }
    peer.add_track(track.clone(), stream).await.map(|_| ())
}
