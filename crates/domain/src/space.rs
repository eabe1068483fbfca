use serde::{Deserialize, Serialize};

use crate::thread::ThreadState;

/// A shared thread with multiple agent/human members. Turn-taking is
/// mediated by the space router; membership and permission checks are
/// owned by an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub space_id: String,
    pub members: Vec<SpaceMember>,
    #[serde(default)]
    pub thread: ThreadState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceMember {
    pub member_id: String,
    pub member_type: MemberType,
    #[serde(default)]
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    Agent,
    Human,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self { read: true, write: true }
    }
}

impl SpaceMember {
    pub fn agent(member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            member_type: MemberType::Agent,
            permissions: Permissions::default(),
        }
    }

    pub fn human(member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            member_type: MemberType::Human,
            permissions: Permissions::default(),
        }
    }
}
