// crates/cortex-trust-core/src/identifiers.rs
// ============================================================================
// Module: Cortex Trust Identifiers
// Description: Opaque UUID-backed identifiers for trust gate entities.
// Purpose: Provide strongly typed, serializable identifiers with stable wire
//          forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Every persisted entity in the data model is keyed by one of the newtypes
//! below. They are opaque UUIDv4 values that serialize as strings.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID value.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_identifier!(DecisionId, "Identifier for a [`crate::model::Decision`] row.");
uuid_identifier!(OverrideId, "Identifier for a [`crate::model::TrustOverride`] row.");
uuid_identifier!(MilestoneId, "Identifier for a [`crate::model::Milestone`] row.");
uuid_identifier!(ConfirmationId, "Identifier for a [`crate::model::PendingConfirmation`] row.");
