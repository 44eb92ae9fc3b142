//! Opaque identifiers for worlds, agents and messages.
//!
//! All three are value-equal wrappers around a string. They serialize as a
//! plain string so configuration files and snapshot records stay readable.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// The raw string value.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a world (one runtime instance).
    WorldId
);

string_id!(
    /// Identifier of an agent. Unique within a runtime.
    AgentId
);

string_id!(
    /// Identifier of a single signal, request or projection.
    MessageId
);

impl MessageId {
    /// Generate a fresh random message id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
