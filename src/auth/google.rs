use std::fs;
use std::path::Path;
use std::time::SystemTime;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_derive::{Deserialize, Serialize};

use crate::http::{Error, Request, Response};
use crate::util::unix_seconds;

use super::{AuthError, IdToken, TokenSource};

const METADATA_IDENTITY_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/identity";

const JWT_BEARER_GRANT: &str = "urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer";

/// Lifetime requested for the signed assertion. The token endpoint caps
/// this at one hour.
const ASSERTION_LIFETIME: u64 = 3600;

fn default_token_uri() -> Box<str> {
    "https://oauth2.googleapis.com/token".into()
}

fn rejected(error: Error) -> AuthError {
    match error {
        Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            AuthError::Rejected(code, body.trim().into())
        }
        Error::Transport(tp) => AuthError::Transport(tp),
    }
}

fn read_body(response: Response) -> Result<String, AuthError> {
    response
        .into_string()
        .map_err(|e| AuthError::Transport(e.to_string().into()))
}

/// The subset of a service account key file we need.
#[derive(Deserialize, Clone)]
struct KeyFile {
    client_email: Box<str>,
    private_key: Box<str>,
    #[serde(default)]
    private_key_id: Option<Box<str>>,
    #[serde(default = "default_token_uri")]
    token_uri: Box<str>,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    target_audience: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    id_token: Box<str>,
}

/// Exchanges a self-signed assertion from a service account key for an
/// OpenID Connect identity token.
pub struct ServiceAccount {
    key: KeyFile,
    signing_key: EncodingKey,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.key.client_email)
            .field("token_uri", &self.key.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            AuthError::Credentials(format!("{}: {}", path.display(), e).into())
        })?;

        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let key = serde_json::from_str::<KeyFile>(json)
            .map_err(|e| AuthError::Credentials(e.to_string().into()))?;

        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| AuthError::Credentials(e.to_string().into()))?;

        Ok(Self { key, signing_key })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn assertion(&self, audience: &str, now: SystemTime) -> Result<String, AuthError> {
        let iat = unix_seconds(now);
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            sub: &self.key.client_email,
            aud: &self.key.token_uri,
            target_audience: audience,
            iat,
            exp: iat + ASSERTION_LIFETIME,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.as_deref().map(String::from);

        jsonwebtoken::encode(&header, &claims, &self.signing_key)
            .map_err(|e| AuthError::Credentials(e.to_string().into()))
    }
}

impl TokenSource for ServiceAccount {
    fn fetch_token(&self, audience: &str, now: SystemTime) -> Result<IdToken, AuthError> {
        let assertion = self.assertion(audience, now)?;
        let form = String::from("grant_type=") + JWT_BEARER_GRANT + "&assertion=" + &assertion;

        let response = Request::post(&self.key.token_uri)
            .send_form(&form)
            .map_err(rejected)?;

        let body = read_body(response)?;
        let token = serde_json::from_str::<TokenResponse>(&body)
            .map_err(|e| AuthError::MalformedToken(e.to_string().into()))?;

        IdToken::from_jwt(&token.id_token)
    }
}

/// Asks the compute metadata server for an identity token on behalf of the
/// instance's default service account.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetadataServer;

impl TokenSource for MetadataServer {
    fn fetch_token(&self, audience: &str, _now: SystemTime) -> Result<IdToken, AuthError> {
        let response = Request::get(METADATA_IDENTITY_URL)
            .query("audience", audience)
            .query("format", "full")
            .set("Metadata-Flavor", "Google")
            .call()
            .map_err(rejected)?;

        IdToken::from_jwt(&read_body(response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_broken_key_files() {
        assert!(matches!(
            ServiceAccount::from_json("{}"),
            Err(AuthError::Credentials(_))
        ));

        let not_a_key = r#"{
            "client_email": "updater@project.iam.gserviceaccount.com",
            "private_key": "this is not PEM"
        }"#;
        assert!(matches!(
            ServiceAccount::from_json(not_a_key),
            Err(AuthError::Credentials(_))
        ));

        assert!(matches!(
            ServiceAccount::from_file("/nonexistent/credentials.json"),
            Err(AuthError::Credentials(_))
        ));
    }

    #[test]
    fn key_file_defaults() {
        let key = serde_json::from_str::<KeyFile>(
            r#"{"client_email": "a@b.c", "private_key": "pem", "type": "service_account"}"#,
        )
        .unwrap();
        assert_eq!(&*key.token_uri, "https://oauth2.googleapis.com/token");
        assert_eq!(key.private_key_id, None);
    }
}
