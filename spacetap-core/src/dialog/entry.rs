//! Dialog lines and speaker avatars.

use serde::{Deserialize, Serialize};

/// Portraits the dialog panel can show next to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Avatar {
    Commander,
    Trader,
    Alien,
    Scientist,
    Computer,
}

impl Avatar {
    /// Avatars in index order.
    pub const ALL: [Avatar; 5] = [
        Avatar::Commander,
        Avatar::Trader,
        Avatar::Alien,
        Avatar::Scientist,
        Avatar::Computer,
    ];

    /// Avatar at `index`, if any.
    pub fn from_index(index: i32) -> Option<Avatar> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn index(&self) -> i32 {
        match self {
            Avatar::Commander => 0,
            Avatar::Trader => 1,
            Avatar::Alien => 2,
            Avatar::Scientist => 3,
            Avatar::Computer => 4,
        }
    }

    /// Name of the image asset.
    pub fn asset_name(&self) -> &'static str {
        match self {
            Avatar::Commander => "avatar_commander",
            Avatar::Trader => "avatar_trader",
            Avatar::Alien => "avatar_alien",
            Avatar::Scientist => "avatar_scientist",
            Avatar::Computer => "avatar_computer",
        }
    }
}

/// One line of dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogEntry {
    pub speaker: String,
    pub text: String,
    /// Index into [`Avatar::ALL`]. Out-of-range values show no avatar.
    pub avatar_index: i32,
}

impl DialogEntry {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>, avatar_index: i32) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            avatar_index,
        }
    }

    /// A line spoken by a known avatar.
    pub fn spoken(speaker: impl Into<String>, text: impl Into<String>, avatar: Avatar) -> Self {
        Self::new(speaker, text, avatar.index())
    }

    /// A line with no speaker and no avatar.
    pub fn narration(text: impl Into<String>) -> Self {
        Self::new("", text, -1)
    }

    pub fn avatar(&self) -> Option<Avatar> {
        Avatar::from_index(self.avatar_index)
    }
}
