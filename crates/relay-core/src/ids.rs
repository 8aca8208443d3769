//! String-backed identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing string without validation.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
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
    /// Identity of one accepted socket. Two handles are the same connection
    /// only if their ids are equal.
    ConnectionId
);

string_id!(
    /// Tenant (restaurant) identifier scoping exactly one agent registration.
    TenantId
);

impl ConnectionId {
    /// Generate a fresh, time-ordered connection id.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_has_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn tenant_id_preserves_value() {
        let id = TenantId::from_raw("rest-42");
        assert_eq!(id.as_str(), "rest-42");
        assert_eq!(id.to_string(), "rest-42");
    }

    #[test]
    fn tenant_id_serializes_transparently() {
        let id = TenantId::from_raw("rest-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"rest-42\"");
        let back: TenantId = serde_json::from_str("\"rest-42\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn parse_from_str() {
        let id: TenantId = "abc".parse().unwrap();
        assert_eq!(id, TenantId::from_raw("abc"));
    }
}
