//! Typed ids assigned by the catalog store.
//!
//! Each table hands out monotonically increasing `u64` ids. The newtypes keep
//! ids from different tables from being mixed up at compile time; ordering
//! follows creation order within a table.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

define_id!(
    /// Id of an ingestion workflow run.
    WorkflowId
);
define_id!(
    /// Id of a single seed-URL item inside a workflow.
    WorkflowItemId
);
define_id!(
    /// Id of an append-only evidence snapshot.
    EvidenceId
);
define_id!(
    /// Id of a deduplicated cable variant.
    VariantId
);
define_id!(
    /// Id of a normalized capability spec.
    SpecId
);
define_id!(
    /// Id of an enrichment job.
    JobId
);
