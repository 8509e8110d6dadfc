// Bearer token supply.
//
// The services authenticate every request with `Authorization: auth_token
// <token>`. Token acquisition and refresh belong to the session layer; the
// clients here only ask for the current value on each request.

use std::fmt;
use std::sync::Arc;

use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Supplies the current access token for outbound requests.
pub trait TokenProvider: Send + Sync + fmt::Debug {
    fn access_token(&self) -> Result<SecretString, Error>;
}

/// A fixed token, typically resolved once from config or the keyring.
#[derive(Debug, Clone)]
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self(token)
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Result<SecretString, Error> {
        if self.0.expose_secret().is_empty() {
            return Err(Error::Authentication {
                message: "access token is empty".into(),
            });
        }
        Ok(self.0.clone())
    }
}

/// Shared handle used by every client.
pub type SharedTokenProvider = Arc<dyn TokenProvider>;

/// Build the `Authorization` header value for the current token.
pub(crate) fn authorization_header(provider: &dyn TokenProvider) -> Result<HeaderValue, Error> {
    let token = provider.access_token()?;
    let mut value = HeaderValue::from_str(&format!("auth_token {}", token.expose_secret()))
        .map_err(|e| Error::Authentication {
            message: format!("invalid token header value: {e}"),
        })?;
    value.set_sensitive(true);
    Ok(value)
}
