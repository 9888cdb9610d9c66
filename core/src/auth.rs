//! Login state, passed explicitly to whoever needs it.
//!
//! Credentials live only in memory for the lifetime of the login and are
//! wiped on drop. Nothing here persists them.

use std::fmt;

use serde::Serialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::backends::{AuthBackend, AuthStatus};
use crate::errors::{AuthError, BackendError};

/// Username and password as typed on the login form.
#[derive(Clone, Serialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authentication state with an explicit lifecycle.
///
/// `init` restores an existing backend login on startup, `login` establishes
/// a new one, and `teardown` forgets everything.
#[derive(Debug, Default)]
pub struct AuthContext {
    username: Option<String>,
    credentials: Option<Credentials>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the backend whether a previous login is still valid.
    ///
    /// A 401 simply means "not logged in" here.
    pub async fn init(&mut self, backend: &dyn AuthBackend) -> Result<bool, AuthError> {
        match backend.check_auth().await {
            Ok(AuthStatus {
                authenticated: true,
                username: Some(username),
            }) => {
                self.username = Some(username);
                Ok(true)
            }
            Ok(_) | Err(BackendError::Unauthorized) => {
                self.teardown();
                Ok(false)
            }
            Err(e) => Err(AuthError::Backend(e)),
        }
    }

    pub async fn login(
        &mut self,
        backend: &dyn AuthBackend,
        credentials: Credentials,
    ) -> Result<(), AuthError> {
        match backend.login(&credentials).await {
            Ok(()) => {
                self.username = Some(credentials.username.clone());
                self.credentials = Some(credentials);
                Ok(())
            }
            Err(BackendError::Unauthorized) => Err(AuthError::InvalidCredentials),
            Err(e) => Err(AuthError::Backend(e)),
        }
    }

    /// Log out on the backend, then forget local state either way.
    pub async fn logout(&mut self, backend: &dyn AuthBackend) -> Result<(), AuthError> {
        let result = backend.logout().await;
        self.teardown();
        match result {
            Ok(()) | Err(BackendError::Unauthorized) => Ok(()),
            Err(e) => Err(AuthError::Backend(e)),
        }
    }

    /// Forget the login without contacting the backend.
    pub fn teardown(&mut self) {
        self.username = None;
        self.credentials = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Username for calls that require a login.
    pub fn require_user(&self) -> Result<&str, AuthError> {
        self.username().ok_or(AuthError::NotAuthenticated)
    }
}
