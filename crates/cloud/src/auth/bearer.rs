//! Static bearer-token authentication.

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};

/// Sends `Authorization: Bearer <token>` with every request.
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return Err(CloudError::Auth("bearer token must be a single non-empty word".into()));
        }
        Ok(Self { token })
    }
}

impl CloudAuth for BearerToken {
    fn sign_request(&self, _url: &str, _method: &str, headers: &mut Vec<(String, String)>) -> Result<()> {
        headers.push(("Authorization".to_string(), format!("Bearer {}", self.token)));
        Ok(())
    }
}
