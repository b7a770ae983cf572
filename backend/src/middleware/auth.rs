//! Authentication middleware
//!
//! Tokens are issued by the district's auth service. This server only
//! verifies them and turns the claims into an [`Actor`] with a list of
//! `resource:action` permission strings.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::error::{AppError, AppResult};
use crate::AppState;

/// Permission strings checked by handlers
pub mod permissions {
    pub const ADMIN: &str = "admin:all";
    pub const INVENTORY_READ: &str = "inventory:read";
    pub const INVENTORY_WRITE: &str = "inventory:write";
    pub const ORDERS_CREATE: &str = "orders:create";
    pub const ORDERS_READ: &str = "orders:read";
    pub const SESSIONS_READ: &str = "sessions:read";
    pub const SESSIONS_MANAGE: &str = "sessions:manage";
    pub const SESSIONS_CLOSE: &str = "sessions:close";
    pub const PURCHASES_READ: &str = "purchases:read";
    pub const PURCHASES_WRITE: &str = "purchases:write";
    pub const MENU_READ: &str = "menu:read";
    pub const MENU_WRITE: &str = "menu:write";
    pub const PROGRAMS_READ: &str = "programs:read";
    pub const PROGRAMS_WRITE: &str = "programs:write";
    pub const LOSSES_READ: &str = "losses:read";
    pub const LOSSES_WRITE: &str = "losses:write";
    pub const REIMBURSEMENTS_READ: &str = "reimbursements:read";
    pub const REIMBURSEMENTS_WRITE: &str = "reimbursements:write";
}

/// The authenticated caller
#[derive(Clone, Debug)]
pub struct Actor {
    pub user_id: String,
    pub display_name: String,
    pub permissions: Vec<String>,
}

impl Actor {
    /// Check if the actor holds a permission (admins hold all of them)
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == permission || p == permissions::ADMIN)
    }

    /// Fail with 403 unless the actor holds the permission
    pub fn require(&self, permission: &str) -> AppResult<()> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(AppError::InsufficientPermissions(permission.to_string()))
        }
    }

    /// Name recorded in `created_by` style audit columns
    pub fn audit_name(&self) -> String {
        self.display_name.clone()
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub iss: Option<String>,
}

/// Decode and validate an HS256 token
pub fn decode_token(token: &str, config: &JwtConfig) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    if let Some(issuer) = &config.issuer {
        validation.set_issuer(&[issuer]);
    }

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken,
    })
}

/// Authentication middleware that validates bearer tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        Some(token) => token,
        None => {
            return AppError::Unauthorized("Missing or invalid Authorization header".to_string())
                .into_response()
        }
    };

    let claims = match decode_token(token, &state.config.jwt) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    let actor = Actor {
        display_name: claims.name.unwrap_or_else(|| claims.sub.clone()),
        user_id: claims.sub,
        permissions: claims.permissions,
    };

    tracing::debug!(user_id = %actor.user_id, "Authenticated request");
    request.extensions_mut().insert(actor);

    next.run(request).await
}

/// Extractor for the authenticated actor
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub Actor);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Actor>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".to_string(),
            issuer: None,
        }
    }

    fn token(exp: i64) -> String {
        let claims = Claims {
            sub: "42".to_string(),
            name: Some("Ms. Rivera".to_string()),
            permissions: vec![permissions::SESSIONS_CLOSE.to_string()],
            exp,
            iat: None,
            iss: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_valid_token() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let claims = decode_token(&token(exp), &config()).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.permissions, vec!["sessions:close".to_string()]);
    }

    #[test]
    fn test_expired_token() {
        let exp = chrono::Utc::now().timestamp() - 3600;
        assert!(matches!(
            decode_token(&token(exp), &config()),
            Err(AppError::TokenExpired)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let other = JwtConfig {
            secret: "other".to_string(),
            issuer: None,
        };
        assert!(matches!(
            decode_token(&token(exp), &other),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_admin_holds_every_permission() {
        let actor = Actor {
            user_id: "1".into(),
            display_name: "Admin".into(),
            permissions: vec![permissions::ADMIN.to_string()],
        };
        assert!(actor.require(permissions::PURCHASES_WRITE).is_ok());

        let cashier = Actor {
            user_id: "2".into(),
            display_name: "Cashier".into(),
            permissions: vec![permissions::ORDERS_CREATE.to_string()],
        };
        assert!(cashier.require(permissions::ORDERS_CREATE).is_ok());
        assert!(matches!(
            cashier.require(permissions::SESSIONS_CLOSE),
            Err(AppError::InsufficientPermissions(_))
        ));
    }
}
