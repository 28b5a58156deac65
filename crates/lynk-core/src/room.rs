//! Room participant records and partial status updates.

use crate::{ConnectionId, UserId};
use serde::{Deserialize, Serialize};

/// One member of a call/meeting room.
///
/// Invariant: a `user_id` appears at most once per room; a second join from
/// the same user replaces the connection id instead of duplicating the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    pub connection_id: ConnectionId,
    pub mic_on: bool,
    pub video_on: bool,
    pub screen_sharing: bool,
}

impl Participant {
    /// Creates a participant with the media defaults a fresh join starts with:
    /// mic and camera on, no screen share.
    pub fn new(
        user_id: impl Into<UserId>,
        display_name: impl Into<String>,
        connection_id: impl Into<ConnectionId>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            connection_id: connection_id.into(),
            mic_on: true,
            video_on: true,
            screen_sharing: false,
        }
    }

    /// Applies a partial status update; unspecified fields keep their value.
    pub fn apply(&mut self, patch: &StatusPatch) {
        if let Some(mic_on) = patch.mic_on {
            self.mic_on = mic_on;
        }
        if let Some(video_on) = patch.video_on {
            self.video_on = video_on;
        }
        if let Some(screen_sharing) = patch.screen_sharing {
            self.screen_sharing = screen_sharing;
        }
    }
}

/// Partial update of a participant's media status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusPatch {
    pub mic_on: Option<bool>,
    pub video_on: Option<bool>,
    pub screen_sharing: Option<bool>,
}

impl StatusPatch {
    pub fn mic(on: bool) -> Self {
        Self {
            mic_on: Some(on),
            ..Self::default()
        }
    }

    pub fn video(on: bool) -> Self {
        Self {
            video_on: Some(on),
            ..Self::default()
        }
    }

    pub fn screen_sharing(on: bool) -> Self {
        Self {
            screen_sharing: Some(on),
            ..Self::default()
        }
    }

    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.mic_on.is_none() && self.video_on.is_none() && self.screen_sharing.is_none()
    }
}
