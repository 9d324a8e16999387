//! Request authentication for the processing endpoint.

mod bearer;
mod none;

pub use bearer::BearerToken;
pub use none::NoAuth;

use crate::error::Result;

/// Trait for signing HTTP requests to an imagery service.
///
/// Implementations add authentication headers to outgoing requests before
/// they are sent.
pub trait CloudAuth: Send + Sync {
    /// Append authentication headers for a request to `url`.
    fn sign_request(&self, url: &str, method: &str, headers: &mut Vec<(String, String)>) -> Result<()>;
}
