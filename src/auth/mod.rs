use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod password;

pub use password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidToken(String),
    #[error("account is disabled")]
    Inactive,
    #[error("password too short")]
    WeakPassword,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("JWT secret not configured")]
    MissingSecret,
}

/// User roles, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// True when this role grants at least `required`
    pub fn allows(&self, required: Role) -> bool {
        *self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Role::Viewer),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub tenant_id: Option<Uuid>,
    pub tenant: Option<String>,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, tenant_id: Option<Uuid>, tenant: Option<String>, role: Role, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user_id,
            tenant_id,
            tenant,
            role,
            exp,
            iat: now.timestamp(),
        }
    }
}

/// Signs and verifies tokens with a shared HMAC secret
#[derive(Clone)]
pub struct JwtKeys {
    secret: String,
    expiry_hours: u64,
}

impl JwtKeys {
    pub fn new(secret: impl Into<String>, expiry_hours: u64) -> Self {
        Self {
            secret: secret.into(),
            expiry_hours,
        }
    }

    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self::new(config.security.jwt_secret.clone(), config.security.jwt_expiry_hours)
    }

    pub fn expiry_hours(&self) -> u64 {
        self.expiry_hours
    }

    pub fn issue(&self, user_id: Uuid, tenant_id: Option<Uuid>, tenant: Option<String>, role: Role) -> Result<String, AuthError> {
        self.encode(&Claims::new(user_id, tenant_id, tenant, role, self.expiry_hours))
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }
        encode(&Header::default(), claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }

    /// Verify signature and expiry
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        self.decode_with(token, Validation::default())
    }

    /// Verify signature; accept tokens whose expiry passed less than
    /// `grace_hours` ago. Used by the refresh endpoint.
    pub fn decode_with_grace(&self, token: &str, grace_hours: u64) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        let claims = self.decode_with(token, validation)?;

        let oldest_allowed = Utc::now().timestamp() - (grace_hours as i64) * 3600;
        if claims.exp < oldest_allowed {
            return Err(AuthError::InvalidToken("Token expired beyond refresh window".to_string()));
        }
        Ok(claims)
    }

    fn decode_with(&self, token: &str, validation: Validation) -> Result<Claims, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }
        decode::<Claims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(format!("Invalid JWT token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered() {
        assert!(Role::SuperAdmin.allows(Role::Admin));
        assert!(Role::Admin.allows(Role::Editor));
        assert!(Role::Editor.allows(Role::Editor));
        assert!(!Role::Viewer.allows(Role::Editor));
        assert_eq!("super_admin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn issued_token_decodes() {
        let keys = JwtKeys::new("test-secret", 1);
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let token = keys.issue(user, Some(tenant), Some("acme".into()), Role::Editor).unwrap();

        let claims = keys.decode(&token).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.tenant_id, Some(tenant));
        assert_eq!(claims.role, Role::Editor);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = JwtKeys::new("one", 1).issue(Uuid::new_v4(), None, None, Role::SuperAdmin).unwrap();
        assert!(matches!(JwtKeys::new("two", 1).decode(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn expired_token_refreshes_only_within_grace() {
        let keys = JwtKeys::new("test-secret", 1);
        let mut claims = Claims::new(Uuid::new_v4(), None, None, Role::Admin, 1);
        claims.exp = Utc::now().timestamp() - 2 * 3600;
        let token = keys.encode(&claims).unwrap();

        assert!(keys.decode(&token).is_err());
        assert!(keys.decode_with_grace(&token, 3).is_ok());
        assert!(keys.decode_with_grace(&token, 1).is_err());
    }

    #[test]
    fn empty_secret_is_refused() {
        let keys = JwtKeys::new("", 1);
        assert!(matches!(keys.issue(Uuid::new_v4(), None, None, Role::Viewer), Err(AuthError::MissingSecret)));
    }
}
