//! Resource identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for identities derived from physical resource names.
const RESOURCE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b9e_8d44_4c1a_9e57_3a0d_b2c4_71e5);

/// A unique identifier for any resource in the system.
///
/// Synthesized resources use [`ResourceId::derive`] so that re-running
/// synthesis with the same inputs yields the same ids. Pipeline runs use
/// time-ordered UUIDv7 ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("{_0}")]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Create a new unique ResourceId using UUIDv7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Derive a stable ResourceId (UUIDv5) from a physical resource name.
    pub fn derive(name: &str) -> Self {
        Self(Uuid::new_v5(&RESOURCE_NAMESPACE, name.as_bytes()))
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ResourceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ResourceId> for Uuid {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ResourceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
