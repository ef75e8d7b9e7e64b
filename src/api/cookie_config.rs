//! Session cookie
//!
//! The cookie carries `{token}.{hex hmac-sha256(token)}`. A cookie whose
//! signature does not verify is treated as absent.

use axum::http::header::{HeaderValue, COOKIE, SET_COOKIE};
use axum::http::HeaderMap;
use cookie::{Cookie, SameSite};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies session tokens carried in a cookie
#[derive(Clone)]
pub struct SessionCookies {
    name: String,
    key: Vec<u8>,
    /// Seconds
    max_age: i64,
    /// HTTPS only; off in debug mode
    secure: bool,
}

impl SessionCookies {
    pub fn new(name: impl Into<String>, secret: &str, max_age: i64, secure: bool) -> Self {
        Self {
            name: name.into(),
            key: secret.as_bytes().to_vec(),
            max_age,
            secure,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(&self.key).ok()
    }

    /// `{token}.{signature}`
    pub fn sign(&self, token: &str) -> Option<String> {
        let mut mac = self.mac()?;
        mac.update(token.as_bytes());
        Some(format!("{}.{}", token, hex::encode(mac.finalize().into_bytes())))
    }

    /// Token from a signed value, or None if the signature is bad.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (token, signature) = value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;
        let mut mac = self.mac()?;
        mac.update(token.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(token.to_string())
    }

    /// Verified session token from the request's `Cookie` headers
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|raw| Cookie::split_parse(raw.to_string()))
            .filter_map(|parsed| parsed.ok())
            .filter(|c| c.name() == self.name)
            .find_map(|c| self.verify(c.value()))
    }

    /// Signed session cookie for `token`
    pub fn session_cookie(&self, token: &str) -> Option<Cookie<'static>> {
        let cookie = Cookie::build((self.name.clone(), self.sign(token)?))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(cookie::time::Duration::seconds(self.max_age))
            .build();
        Some(cookie)
    }

    /// Append the `Set-Cookie` header for `token`.
    pub fn set_session_cookie(&self, token: &str, headers: &mut HeaderMap) -> Result<(), String> {
        let cookie = self
            .session_cookie(token)
            .ok_or_else(|| "session cookie signing failed".to_string())?;
        let value = HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| format!("Invalid cookie value: {}", e))?;
        headers.append(SET_COOKIE, value);
        Ok(())
    }
}
