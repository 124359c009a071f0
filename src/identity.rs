//! Cluster identities
//!
//! Member ids and leadership epochs as observed by this process.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one cluster member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    /// Generate a fresh random member id
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell members apart in logs
        let s = self.0.simple().to_string();
        write!(f, "MemberId{{{}}}", &s[..8])
    }
}

/// A leadership epoch: the leader recognized for one term
///
/// `leader` is `None` while the cluster has no known leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaderEpoch {
    pub term: u64,
    pub leader: Option<MemberId>,
}

impl LeaderEpoch {
    pub fn new(term: u64, leader: Option<MemberId>) -> Self {
        Self { term, leader }
    }

    /// Whether `member` leads this epoch
    pub fn is_led_by(&self, member: MemberId) -> bool {
        self.leader == Some(member)
    }
}

/// Notification that leadership changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderSwitch {
    pub epoch: LeaderEpoch,

    /// Last log index appended before the new leader took over
    pub last_index_before_election: i64,
}

impl LeaderSwitch {
    pub fn new(epoch: LeaderEpoch, last_index_before_election: i64) -> Self {
        Self {
            epoch,
            last_index_before_election,
        }
    }
}
