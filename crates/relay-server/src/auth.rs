//! Connection admission.
//!
//! A client presents `token`, `restaurantId` and `role` in the upgrade URL's
//! query string. The token is accepted when it equals either the
//! process-wide shared secret (valid for any tenant) or the claimed tenant
//! id itself.
//!
//! The tenant-token rule means anyone who knows a tenant id can connect as
//! that tenant. It is kept as documented behavior; tightening it is a
//! product decision.

use std::fmt;

use relay_core::{Role, TenantId};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use subtle::ConstantTimeEq;

/// Connection parameters parsed from the upgrade request's query string.
#[derive(Clone, Default, Deserialize)]
pub struct ConnectParams {
    /// Presented credential.
    pub token: Option<String>,
    /// Claimed tenant.
    #[serde(rename = "restaurantId", alias = "tenantId")]
    pub restaurant_id: Option<String>,
    /// Claimed role, `agent` or `saas`.
    pub role: Option<String>,
}

impl ConnectParams {
    fn field(value: Option<&String>) -> Option<&str> {
        value.map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Non-empty token.
    pub fn token(&self) -> Option<&str> {
        Self::field(self.token.as_ref())
    }

    /// Non-empty tenant id.
    pub fn restaurant_id(&self) -> Option<&str> {
        Self::field(self.restaurant_id.as_ref())
    }

    /// Non-empty role string.
    pub fn role(&self) -> Option<&str> {
        Self::field(self.role.as_ref())
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("restaurant_id", &self.restaurant_id)
            .field("role", &self.role)
            .finish()
    }
}

/// Which credential admitted the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Credential {
    /// The shared secret.
    Master,
    /// The tenant's own identifier.
    Tenant,
}

impl Credential {
    /// Label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Tenant => "tenant",
        }
    }
}

/// A successful admission: the role and tenant the connection is bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    /// Bound tenant.
    pub tenant_id: TenantId,
    /// Bound role.
    pub role: Role,
    /// Credential that matched.
    pub credential: Credential,
}

/// Why a connection was refused. The display text is the WebSocket close
/// reason sent with code 1008.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Token missing or matching neither credential.
    #[error("Unauthorized")]
    Unauthorized,
    /// `restaurantId` or `role` missing.
    #[error("Missing params")]
    MissingParams,
    /// `role` is neither `agent` nor `saas`.
    #[error("Invalid role")]
    InvalidRole,
}

impl Rejection {
    /// Close reason sent to the client.
    pub fn close_reason(self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::MissingParams => "Missing params",
            Self::InvalidRole => "Invalid role",
        }
    }

    /// Metric label.
    pub fn kind(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::MissingParams => "missing_params",
            Self::InvalidRole => "invalid_role",
        }
    }
}

/// Validates connection parameters against the shared secret.
pub struct Authenticator {
    shared_secret: SecretString,
}

impl Authenticator {
    /// Create an authenticator for the given shared secret.
    pub fn new(shared_secret: SecretString) -> Self {
        Self { shared_secret }
    }

    /// Admit or reject a connection.
    ///
    /// The credential is settled before any other parameter is inspected:
    /// a token matching neither the shared secret nor the claimed
    /// `restaurantId` is `Unauthorized` whatever else is missing. Only an
    /// authenticated client learns about missing params or a bad role.
    pub fn authenticate(&self, params: &ConnectParams) -> Result<Admission, Rejection> {
        let token = params.token().ok_or(Rejection::Unauthorized)?;
        let credential = if constant_time_eq(token, self.shared_secret.expose_secret()) {
            Credential::Master
        } else if params
            .restaurant_id()
            .is_some_and(|restaurant_id| constant_time_eq(token, restaurant_id))
        {
            Credential::Tenant
        } else {
            return Err(Rejection::Unauthorized);
        };

        let (Some(restaurant_id), Some(role)) = (params.restaurant_id(), params.role()) else {
            return Err(Rejection::MissingParams);
        };
        let role: Role = role.parse().map_err(|_| Rejection::InvalidRole)?;

        Ok(Admission {
            tenant_id: TenantId::from_raw(restaurant_id),
            role,
            credential,
        })
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Authenticator([REDACTED])")
    }
}

/// Constant-time string comparison. Unequal lengths short-circuit; only the
/// length is observable.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
