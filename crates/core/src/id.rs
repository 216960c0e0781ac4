//! Strongly-typed identifiers used across the domain.
//!
//! Run identifiers are time-ordered (UUIDv7). Exception and approval request
//! identifiers are name-based (UUIDv5) so that re-running detection over the
//! same input yields the same identifiers, which is what makes resume and
//! re-execution idempotent.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Namespace for name-based identifiers minted by this engine.
const GSTFLOW_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a57_93e4_4b1d_8c0e_5d7a_41b2_c3f9);

/// Identifier of a processing run (one channel/GSTIN/month batch).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

/// Identifier of a detected exception.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExceptionId(Uuid);

/// Identifier of an approval request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new time-ordered identifier (UUIDv7).
            ///
            /// Prefer passing IDs explicitly in tests for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Derive a stable identifier from its naming parts (UUIDv5).
            ///
            /// Parts are joined with a unit separator so `["ab", "c"]` and
            /// `["a", "bc"]` never collide.
            pub fn derive(parts: &[&str]) -> Self {
                let name = parts.join("\u{1f}");
                let scoped = format!("{}\u{1f}{}", $name, name);
                Self(Uuid::new_v5(&GSTFLOW_NAMESPACE, scoped.as_bytes()))
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(RunId, "RunId");
impl_uuid_newtype!(ExceptionId, "ExceptionId");
impl_uuid_newtype!(RequestId, "RequestId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_ids_are_stable_and_part_sensitive() {
        let a = ExceptionId::derive(&["run", "LED-001", "TXN-1"]);
        let b = ExceptionId::derive(&["run", "LED-001", "TXN-1"]);
        let c = ExceptionId::derive(&["run", "LED-001", "TXN-2"]);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let split_left = ExceptionId::derive(&["ab", "c"]);
        let split_right = ExceptionId::derive(&["a", "bc"]);
        assert_ne!(split_left, split_right);
    }

    #[test]
    fn derived_ids_are_scoped_by_type() {
        let exception = ExceptionId::derive(&["x"]);
        let request = RequestId::derive(&["x"]);
        assert_ne!(exception.as_uuid(), request.as_uuid());
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = RunId::from_str("not-a-uuid").unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(msg) if msg.starts_with("RunId")));
    }
}
