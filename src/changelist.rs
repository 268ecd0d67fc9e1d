use serde::{Deserialize, Serialize};
use std::fmt;

/// A Perforce changelist number as seen by this client.
///
/// One integer covers four lifecycles:
/// - `0`: the default changelist, which always exists
/// - `-1`: explicitly not assigned to any changelist
/// - `< -1`: reserved locally, not yet created on the server
/// - `> 0`: a changelist number confirmed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangelistId(i64);

impl ChangelistId {
    pub const DEFAULT: ChangelistId = ChangelistId(0);
    pub const UNASSIGNED: ChangelistId = ChangelistId(-1);

    /// First id handed out by local reservation.
    pub const FIRST_LOCAL: ChangelistId = ChangelistId(-2);

    pub fn new(id: i64) -> Self {
        ChangelistId(id)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_default(self) -> bool {
        self.0 == 0
    }

    pub fn is_unassigned(self) -> bool {
        self.0 == -1
    }

    /// Reserved on this client and not yet known to the server.
    pub fn is_local(self) -> bool {
        self.0 < -1
    }

    /// A real, server-assigned changelist number.
    pub fn is_server_confirmed(self) -> bool {
        self.0 > 0
    }

    /// The default and unassigned ids can never be renamed or deleted.
    pub fn is_protected(self) -> bool {
        self.is_default() || self.is_unassigned()
    }

    /// The local id to hand out after this one.
    pub(crate) fn next_local(self) -> ChangelistId {
        if self.is_local() {
            ChangelistId(self.0 - 1)
        } else {
            Self::FIRST_LOCAL
        }
    }
}

impl fmt::Display for ChangelistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "default"),
            -1 => write!(f, "unassigned"),
            n if n < -1 => write!(f, "local{n}"),
            n => write!(f, "{n}"),
        }
    }
}
