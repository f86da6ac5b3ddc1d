//! Identifiers for users, communities and channels
//!
//! Chat-platform ids are 64-bit snowflakes. Zero is never issued, so it is
//! treated as malformed input.

use serde::{Deserialize, Serialize};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn get(&self) -> u64 {
                self.0
            }

            /// Zero is not a valid snowflake
            pub const fn is_valid(&self) -> bool {
                self.0 != 0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake_id!(
    /// A chat user
    UserId
);
snowflake_id!(
    /// A community (guild)
    CommunityId
);
snowflake_id!(
    /// A channel inside a community
    ChannelId
);

/// Identifier of a persisted companion record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where to deliver a notification for a user
///
/// The last channel a user spoke in; level-up notices go there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelHandle {
    pub community_id: CommunityId,
    pub channel_id: ChannelId,
}

impl ChannelHandle {
    pub fn new(community_id: CommunityId, channel_id: ChannelId) -> Self {
        Self {
            community_id,
            channel_id,
        }
    }
}

impl core::fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.community_id, self.channel_id)
    }
}
