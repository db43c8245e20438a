//! Bearer token authentication and role checks.

use super::{ApiError, AppState};
use crate::config::TokenConfig;
use anyhow::{bail, Result};
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Access level, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Operator,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "viewer" | "read" | "readonly" => Some(Role::Viewer),
            "operator" | "write" => Some(Role::Operator),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Viewer => write!(f, "viewer"),
            Role::Operator => write!(f, "operator"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Identity attached to every authenticated request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub role: Role,
    /// Whether a token was actually checked.
    pub authenticated: bool,
}

impl AuthContext {
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.role >= role {
            Ok(())
        } else {
            Err(ApiError::Forbidden { required: role })
        }
    }
}

/// Token to role lookup. Empty means authentication is disabled.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, Role>,
}

impl TokenTable {
    pub fn from_config(tokens: &[TokenConfig]) -> Result<Self> {
        let mut table = HashMap::new();
        for entry in tokens {
            if entry.token.trim().is_empty() {
                bail!("Empty API token in [server].tokens");
            }
            let Some(role) = Role::parse(&entry.role) else {
                bail!(
                    "Invalid role '{}' in [server].tokens (use viewer, operator or admin)",
                    entry.role
                );
            };
            table.insert(entry.token.clone(), role);
        }
        Ok(Self { tokens: table })
    }

    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Resolve an `Authorization` header value.
    pub fn authenticate(&self, header: Option<&str>) -> Result<AuthContext, ApiError> {
        if !self.is_enabled() {
            return Ok(AuthContext {
                role: Role::Admin,
                authenticated: false,
            });
        }

        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        self.tokens
            .get(token)
            .map(|role| AuthContext {
                role: *role,
                authenticated: true,
            })
            .ok_or(ApiError::Unauthorized)
    }
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.tokens.authenticate(header) {
        Ok(auth) => {
            debug!("{} {} as {}", request.method(), request.uri().path(), auth.role);
            request.extensions_mut().insert(auth);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TokenTable {
        TokenTable::from_config(&[
            TokenConfig {
                token: "view-token".to_string(),
                role: "viewer".to_string(),
            },
            TokenConfig {
                token: "admin-token".to_string(),
                role: "ADMIN".to_string(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Viewer < Role::Operator);
        assert!(Role::Operator < Role::Admin);
        assert_eq!(Role::parse("Operator"), Some(Role::Operator));
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn test_authenticate() {
        let table = table();
        assert_eq!(
            table.authenticate(Some("Bearer admin-token")).unwrap().role,
            Role::Admin
        );
        assert!(matches!(
            table.authenticate(Some("Bearer nope")),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            table.authenticate(Some("admin-token")),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(table.authenticate(None), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_disabled_auth_grants_admin() {
        let auth = TokenTable::default().authenticate(None).unwrap();
        assert_eq!(auth.role, Role::Admin);
        assert!(!auth.authenticated);
    }

    #[test]
    fn test_require() {
        let viewer = table().authenticate(Some("Bearer view-token")).unwrap();
        assert!(viewer.require(Role::Viewer).is_ok());
        assert!(matches!(
            viewer.require(Role::Operator),
            Err(ApiError::Forbidden {
                required: Role::Operator
            })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad_role = [TokenConfig {
            token: "t".to_string(),
            role: "superuser".to_string(),
        }];
        assert!(TokenTable::from_config(&bad_role).is_err());

        let empty = [TokenConfig {
            token: " ".to_string(),
            role: "admin".to_string(),
        }];
        assert!(TokenTable::from_config(&empty).is_err());
    }
}
