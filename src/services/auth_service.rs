use tracing::{debug, info};
use axum::http::{self};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation, TokenData};
use serde_json::Value;

use crate::error::AuthError;
use crate::models::Identity;

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = req.headers().get(http::header::COOKIE)
            .ok_or_else(|| "Missing Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        for c in cookie::Cookie::split_parse(cookie_header).flatten() {
            if c.name() == "auth_token" {
                return Ok(c.value().to_string());
            }
        }
        Err("auth_token cookie not found".to_string())
    }
}

/// Validate a session token and build the identity it carries.
///
/// Pure function of the token and the shared secret: signature, expiry and
/// the presence of a user id are checked, nothing else.
pub fn authenticate(token: &str, secret: Option<&str>) -> Result<Identity, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    let secret = secret.ok_or(AuthError::MissingSecret)?;

    let token_data = validate_jwt(token, secret)?;
    let identity = identity_from_claims(&token_data.claims)?;
    info!("JWT token validated successfully for user: {}", identity.id);
    Ok(identity)
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Value>(token, &decoding_key, &validation)
}

fn identity_from_claims(claims: &Value) -> Result<Identity, AuthError> {
    let id = ["sub", "userId", "id"]
        .iter()
        .find_map(|key| claim_as_string(claims, key))
        .ok_or(AuthError::MissingSubject)?;

    let name = ["name", "username"]
        .iter()
        .find_map(|key| claim_as_string(claims, key))
        .unwrap_or_else(|| id.clone());

    let email = claim_as_string(claims, "email");
    debug!("Token claims resolved to user {} ({})", id, name);
    Ok(Identity::new(id, name, email))
}

// Ids are sometimes issued as numbers
fn claim_as_string(claims: &Value, key: &str) -> Option<String> {
    match claims.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn token_for(claims: Value, secret: &str) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn exp_in(seconds: i64) -> i64 {
        (Utc::now() + Duration::seconds(seconds)).timestamp()
    }

    #[test]
    fn valid_token_yields_identity_with_color() {
        let token = token_for(
            json!({"sub": "u-1", "name": "Ada", "email": "ada@example.com", "exp": exp_in(600)}),
            SECRET,
        );
        let identity = authenticate(&token, Some(SECRET)).unwrap();
        assert_eq!(identity.id, "u-1");
        assert_eq!(identity.name, "Ada");
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
        assert_eq!(identity.color, crate::models::presence_color("u-1"));
    }

    #[test]
    fn numeric_user_id_and_missing_name_are_accepted() {
        let token = token_for(json!({"userId": 42, "exp": exp_in(600)}), SECRET);
        let identity = authenticate(&token, Some(SECRET)).unwrap();
        assert_eq!(identity.id, "42");
        assert_eq!(identity.name, "42");
        assert!(identity.email.is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = token_for(json!({"sub": "u-1", "exp": exp_in(-3600)}), SECRET);
        assert!(matches!(authenticate(&token, Some(SECRET)), Err(AuthError::Expired)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = token_for(json!({"sub": "u-1", "exp": exp_in(600)}), "other-secret");
        assert!(matches!(authenticate(&token, Some(SECRET)), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn garbage_and_empty_tokens_are_rejected() {
        assert!(matches!(authenticate("not-a-jwt", Some(SECRET)), Err(AuthError::Invalid(_))));
        assert!(matches!(authenticate("  ", Some(SECRET)), Err(AuthError::MissingToken)));
    }

    #[test]
    fn token_without_user_id_is_rejected() {
        let token = token_for(json!({"name": "ghost", "exp": exp_in(600)}), SECRET);
        assert!(matches!(authenticate(&token, Some(SECRET)), Err(AuthError::MissingSubject)));
    }

    #[test]
    fn missing_secret_fails_closed() {
        let token = token_for(json!({"sub": "u-1", "exp": exp_in(600)}), SECRET);
        assert!(matches!(authenticate(&token, None), Err(AuthError::MissingSecret)));
    }

    #[test]
    fn token_is_read_from_header_then_cookie() {
        let req = http::Request::builder()
            .header(http::header::AUTHORIZATION, "Bearer abc")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "abc");

        let req = http::Request::builder()
            .header(http::header::COOKIE, "theme=dark; auth_token=xyz")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "xyz");

        let req = http::Request::builder().body(()).unwrap();
        assert!(get_auth_token(&req).is_err());
    }
}
