//! String-backed identifiers.
//!
//! The record store and the value-transfer ledger own their identifier
//! formats; the engine treats every id as an opaque string and only ever
//! compares them for equality and ordering.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Return the raw id string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identity of a challenge.
    ChallengeId
);
string_id!(
    /// Identity of a user, as resolved by the session provider.
    UserId
);
string_id!(
    /// Identity of a video submission.
    SubmissionId
);
string_id!(
    /// Reference to a transaction on the value-transfer ledger.
    TxRef
);
string_id!(
    /// An account (treasury pool or protocol account) on the value-transfer ledger.
    AccountRef
);
string_id!(
    /// Key attached to a fee or transfer request so the ledger executes it at most once.
    IdempotencyKey
);

impl ChallengeId {
    /// A fresh random challenge id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl SubmissionId {
    /// A fresh random submission id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
