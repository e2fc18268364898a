use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Declares a UUID-backed record identifier.
///
/// Every identifier gets the same surface: `new()` (time-ordered UUID v7),
/// `from_uuid`, `as_uuid`, `short_id`, `Display` as the hyphenated UUID, and
/// `FromStr` that reports the identifier's name on failure.
macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generate a new time-ordered identifier (UUID v7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Create from an existing UUID.
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Short representation (first 8 characters of the UUID).
            pub fn short_id(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.short_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| TypeError::InvalidId {
                        input: s.to_string(),
                        reason: format!(concat!("not a valid ", $label, ": {}"), e),
                    })
            }
        }
    };
}

record_id!(
    /// Tenant workspace that owns sites and deployments.
    WorkspaceId,
    "workspace id"
);
record_id!(
    /// A documentation site; the unit that owns branches and commits.
    SiteId,
    "site id"
);
record_id!(
    /// Deployment target (e.g. production, preview) of a site.
    EnvironmentId,
    "environment id"
);
record_id!(
    /// Author of a commit or trigger of a deployment.
    UserId,
    "user id"
);
record_id!(
    /// Identifier of an immutable commit record.
    CommitId,
    "commit id"
);
record_id!(
    /// Identifier of a mutable branch pointer.
    BranchId,
    "branch id"
);
record_id!(
    /// Identifier of a single tree entry row.
    TreeEntryId,
    "tree entry id"
);
record_id!(
    /// Identifier of one publish attempt.
    DeploymentId,
    "deployment id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(CommitId::new(), CommitId::new());
    }

    #[test]
    fn parse_accepts_display_output() {
        let id = SiteId::new();
        let parsed: SiteId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_trims_whitespace() {
        let id = CommitId::new();
        let parsed: CommitId = format!("  {id}\n").parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_error_names_the_identifier() {
        let err = "not-a-uuid".parse::<CommitId>().unwrap_err();
        match err {
            TypeError::InvalidId { input, reason } => {
                assert_eq!(input, "not-a-uuid");
                assert!(reason.contains("commit id"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn short_id_is_8_chars() {
        assert_eq!(BranchId::new().short_id().len(), 8);
    }

    #[test]
    fn debug_uses_type_name() {
        let id = WorkspaceId::new();
        assert!(format!("{id:?}").starts_with("WorkspaceId("));
    }

    #[test]
    fn serde_is_transparent() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
