use std::{
    fmt,
    hash::{Hash, Hasher},
};

use uuid::Uuid;

/// Liveness token of one avatar runtime.
///
/// Every time a model is assigned to a character a fresh id is minted, so deferred work
/// (timers, async loads) tagged with an older id can tell that its avatar is gone.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct InstanceId {
    id: Uuid,
}

impl InstanceId {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Hash for InstanceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (hi, lo) = self.id.as_u64_pair();
        state.write_u64(hi ^ lo);
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id.simple())
    }
}

/// Identity of a concrete humanoid rig. Mixers remember the rig they were bound to and
/// rebuild themselves when handed a different one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct RigId {
    id: Uuid,
}

impl RigId {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

impl Default for RigId {
    fn default() -> Self {
        Self::new()
    }
}

impl Hash for RigId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (hi, lo) = self.id.as_u64_pair();
        state.write_u64(hi ^ lo);
    }
}
