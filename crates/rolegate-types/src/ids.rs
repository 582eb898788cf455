//! Entity identifiers
//!
//! Users and roles get system-generated identifiers that never depend on a
//! mutable field such as an email address. Permission identifiers are usually
//! chosen by the caller (e.g. `document.create`) and are wrapped as-is.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident $(, generated $prefix:literal)?) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            $(
                /// Generate a fresh, collision-resistant identifier.
                pub fn generate() -> Self {
                    Self(format!("{}_{}", $prefix, Uuid::new_v4()))
                }
            )?

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
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
    };
}

entity_id!(
    /// Identifier of a [`User`](crate::User).
    UserId,
    generated "usr"
);

entity_id!(
    /// Identifier of a [`Role`](crate::Role).
    RoleId,
    generated "rol"
);

entity_id!(
    /// Identifier of a [`Permission`](crate::Permission).
    PermissionId
);
