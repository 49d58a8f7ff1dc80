use crate::error::{LibraryError, Result};
use serde::{Deserialize, Serialize};

/// Identity verified by the external provider before it reaches the service.
/// The service never inspects credentials; it only mirrors this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    user: Option<AuthUser>,
}

impl RequestContext {
    pub fn authenticated(user: AuthUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn user(&self) -> Result<&AuthUser> {
        self.user.as_ref().ok_or(LibraryError::AuthenticationRequired)
    }
}
