//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a [`Uuid`]. This prevents accidentally interchanging, for example, a
//! [`ColumnId`] with a [`TableId`] even though both are UUIDs under the hood.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for UUID-wrapped newtypes.
// Generates: struct (Copy), new_random(), from_uuid(), as_uuid(), Display, FromStr.
// ---------------------------------------------------------------------------
macro_rules! uuid_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID (e.g. loaded from storage).
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying [`Uuid`].
            pub fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Tenant scope
// ---------------------------------------------------------------------------

uuid_id! {
    /// Identifies a project: the tenant boundary for every ontology record.
    ProjectId
}

uuid_id! {
    /// Identifies a relational datasource registered under a project.
    DatasourceId
}

uuid_id! {
    /// Identifies an ontology version owned by a project.
    OntologyId
}

// ---------------------------------------------------------------------------
// Extraction runs
// ---------------------------------------------------------------------------

uuid_id! {
    /// Identifies one end-to-end ontology-extraction run for a datasource.
    ///
    /// Propagated through spans so all activity for a run can be correlated.
    RunId
}

uuid_id! {
    /// Identifies a single node record belonging to a run.
    NodeId
}

uuid_id! {
    /// Identity of one server process.
    ///
    /// Generated once at startup; the value recorded as a run's owner and
    /// refreshed by its heartbeat.
    InstanceId
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

uuid_id! {
    /// Identifies a table in the stored schema of a datasource.
    TableId
}

uuid_id! {
    /// Identifies a column in the stored schema of a datasource.
    ColumnId
}

uuid_id! {
    /// Identifies a review question raised against an ontology.
    QuestionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_round_trips_through_display_and_parse() {
        let id = RunId::new_random();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_identifier_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<ColumnId>().is_err());
    }

    #[test]
    fn test_identifier_serialises_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_string(&TableId::from_uuid(uuid)).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }
}
