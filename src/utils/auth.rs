use anyhow::{Result, anyhow};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // principal id
    pub exp: usize,
    pub jti: String,
}

impl Claims {
    /// The authenticated principal.
    pub fn principal(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| anyhow!("token subject is not a valid id"))
    }
}

pub fn create_jwt(user_id: &str, secret: &str, ttl: Duration) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| anyhow!("token lifetime out of range"))?
        .timestamp();

    let claims = Claims {
        sub: user_id.to_owned(),
        exp: expiration as usize,
        jti: Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_cycle() {
        let secret = "test_secret";
        let user_id = Uuid::new_v4().to_string();
        let token = create_jwt(&user_id, secret, Duration::hours(1)).unwrap();
        let claims = validate_jwt(&token, secret).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.principal().unwrap().to_string(), user_id);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_jwt("user", "right", Duration::hours(1)).unwrap();
        assert!(validate_jwt(&token, "wrong").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = create_jwt("user", "secret", Duration::hours(-2)).unwrap();
        assert!(validate_jwt(&token, "secret").is_err());
    }

    #[test]
    fn test_non_uuid_subject() {
        let token = create_jwt("user_123", "secret", Duration::hours(1)).unwrap();
        let claims = validate_jwt(&token, "secret").unwrap();
        assert!(claims.principal().is_err());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }
}
