//! Profile check against the REST backend.
//!
//! Async HTTP client using `reqwest` with Bearer token authentication.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::SessionError;

/// Upper bound on one profile request.
pub const PROFILE_TIMEOUT: Duration = Duration::from_secs(10);

const PROFILE_PATH: &str = "/api/profile";

/// Approval status the backend reports for an admitted user.
pub const STATUS_ACTIVE: &str = "active";

/// The subset of the user profile the bootstrap looks at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub is_active: bool,
}

impl Profile {
    /// Returns `true` when the account is approved and enabled.
    pub fn is_approved(&self) -> bool {
        self.status == STATUS_ACTIVE && self.is_active
    }
}

/// Fetches the profile of the token's owner.
pub trait ProfileApi: Send + Sync {
    /// Returns the profile on HTTP 200, [`SessionError::ProfileCheckFailed`]
    /// on any other status.
    fn fetch_profile<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Profile, SessionError>> + Send + 'a>>;
}

/// [`ProfileApi`] over HTTPS.
pub struct HttpProfileApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpProfileApi {
    /// Creates a client for the backend rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder().timeout(PROFILE_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn profile_url(&self) -> String {
        format!("{}{PROFILE_PATH}", self.base_url)
    }
}

impl ProfileApi for HttpProfileApi {
    fn fetch_profile<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Profile, SessionError>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.profile_url();
            let resp = self.http.get(&url).bearer_auth(token).send().await?;
            let status = resp.status();
            debug!(%url, status = status.as_u16(), "profile check response");

            if status != reqwest::StatusCode::OK {
                return Err(SessionError::ProfileCheckFailed {
                    status: status.as_u16(),
                });
            }

            let body = resp.bytes().await?;
            Ok(serde_json::from_slice(&body)?)
        })
    }
}
