mod google;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use data_encoding::BASE64URL_NOPAD;
use serde_derive::Deserialize;
use thiserror::Error;

use crate::http::Headers;
use crate::util::unix_seconds;

pub use google::{MetadataServer, ServiceAccount};

/// Tokens are treated as expired this long before their `exp` claim, so a
/// token never runs out while a request is in flight.
pub const CLOCK_SKEW: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("unable to load credentials: {0}")]
    Credentials(Box<str>),

    #[error("identity service transport error: {0}")]
    Transport(Box<str>),

    #[error("identity service returned HTTP {0}: {1}")]
    Rejected(u16, Box<str>),

    #[error("malformed identity token: {0}")]
    MalformedToken(Box<str>),

    #[error("the identity service handed out an already expired token")]
    Expired,
}

/// A bearer credential and the moment it stops being valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdToken {
    value: Box<str>,
    expiry: SystemTime,
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: u64,
}

impl IdToken {
    pub fn new(value: impl Into<Box<str>>, expiry: SystemTime) -> Self {
        Self {
            value: value.into(),
            expiry,
        }
    }

    /// Reads the expiry out of a JWT's `exp` claim. The signature is not
    /// checked; the token is only ever forwarded.
    pub fn from_jwt(jwt: &str) -> Result<Self, AuthError> {
        let jwt = jwt.trim();

        let Some(payload) = jwt.split('.').nth(1) else {
            return Err(AuthError::MalformedToken("expected three dot-separated parts".into()));
        };

        let payload = BASE64URL_NOPAD
            .decode(payload.trim_end_matches('=').as_bytes())
            .map_err(|e| AuthError::MalformedToken(e.to_string().into()))?;

        let claim = serde_json::from_slice::<ExpiryClaim>(&payload)
            .map_err(|e| AuthError::MalformedToken(e.to_string().into()))?;

        Ok(Self::new(jwt, UNIX_EPOCH + Duration::from_secs(claim.exp)))
    }

    pub fn expiry(&self) -> SystemTime {
        self.expiry
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        match now.checked_add(CLOCK_SKEW) {
            Some(deadline) => deadline >= self.expiry,
            None => true,
        }
    }

    fn authorization(&self) -> Box<str> {
        (String::from("Bearer ") + &self.value).into()
    }
}

/// Mints a fresh token for the given audience.
pub trait TokenSource {
    fn fetch_token(&self, audience: &str, now: SystemTime) -> Result<IdToken, AuthError>;
}

/// Supplies the credentials for the update call.
pub trait IdentityProvider {
    /// Adds an `Authorization` header carrying a token that is valid at
    /// `now`, minting a new one first if needed.
    fn authenticate(&mut self, headers: &mut Headers, now: SystemTime) -> Result<(), AuthError>;
}

/// Adds no credentials, for endpoints that don't need any.
#[derive(Clone, Copy, Debug, Default)]
pub struct Anonymous;

impl IdentityProvider for Anonymous {
    fn authenticate(&mut self, _headers: &mut Headers, _now: SystemTime) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Holds on to the last token and refreshes it lazily once it expires.
pub struct CachedIdentity<S> {
    source: S,
    audience: Box<str>,
    token: Option<IdToken>,
}

impl<S: TokenSource> CachedIdentity<S> {
    pub fn new(source: S, audience: impl Into<Box<str>>) -> Self {
        Self {
            source,
            audience: audience.into(),
            token: None,
        }
    }

    fn valid_token(&mut self, now: SystemTime) -> Result<&IdToken, AuthError> {
        let usable = matches!(&self.token, Some(token) if !token.is_expired(now));

        if !usable {
            log::info!("an identity token needs to be generated for {}", self.audience);
            self.token = None;

            let token = self.source.fetch_token(&self.audience, now)?;
            if token.is_expired(now) {
                log::error!("failed to obtain a valid identity token");
                return Err(AuthError::Expired);
            }

            log::info!(
                "obtained a new identity token expiring at {}",
                unix_seconds(token.expiry())
            );
            self.token = Some(token);
        }

        self.token.as_ref().ok_or(AuthError::Expired)
    }
}

impl<S: TokenSource> IdentityProvider for CachedIdentity<S> {
    fn authenticate(&mut self, headers: &mut Headers, now: SystemTime) -> Result<(), AuthError> {
        let authorization = self.valid_token(now)?.authorization();
        headers.push(("Authorization".into(), authorization));
        Ok(())
    }
}

#[cfg(test)]
pub use fake::StaticTokens;
