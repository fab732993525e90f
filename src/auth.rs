//! Session authentication capability.
//!
//! The sessions never own authentication state; they are handed an
//! [`AuthProvider`] at construction and only read from it. Every outgoing
//! request (search and stream alike) goes through
//! [`AuthProvider::authorize`] so both carry the same credentials.
//!
//! [`SessionAuth`] is the concrete provider built from the `[auth]` config
//! section. Tests substitute their own implementations.

use reqwest::header::{AUTHORIZATION, COOKIE};

use crate::config::{AuthConfig, AuthScheme};

/// Environment variable consulted when `[auth].token` is not set.
pub const TOKEN_ENV: &str = "CAMVAULT_TOKEN";

/// Credentials attached to backend requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `Cookie: <name>=<value>`
    Cookie { name: String, value: String },
}

impl Credentials {
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Credentials::Bearer(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            Credentials::Cookie { name, value } => {
                request.header(COOKIE, format!("{}={}", name, value))
            }
        }
    }
}

/// Read-only view of the externally owned authentication session.
pub trait AuthProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;

    /// Opaque user identity, when the provider knows one.
    fn user(&self) -> Option<String>;

    fn credentials(&self) -> Option<Credentials>;

    /// Attach this session's credentials to a request.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials() {
            Some(credentials) => credentials.apply(request),
            None => request,
        }
    }
}

/// Fixed authentication session; authenticated exactly when it holds credentials.
#[derive(Debug, Clone, Default)]
pub struct SessionAuth {
    user: Option<String>,
    credentials: Option<Credentials>,
}

impl SessionAuth {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            user: None,
            credentials: Some(Credentials::Bearer(token.into())),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Build from the `[auth]` section, falling back to [`TOKEN_ENV`].
    pub fn from_config(config: &AuthConfig) -> Self {
        let token = config
            .token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .filter(|t| !t.trim().is_empty());
        Self::from_parts(config, token)
    }

    fn from_parts(config: &AuthConfig, token: Option<String>) -> Self {
        let credentials = token.map(|token| match config.scheme {
            AuthScheme::Bearer => Credentials::Bearer(token),
            AuthScheme::Cookie => Credentials::Cookie {
                name: config.cookie_name.clone(),
                value: token,
            },
        });
        Self {
            user: config.user.clone(),
            credentials,
        }
    }
}

impl AuthProvider for SessionAuth {
    fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    fn user(&self) -> Option<String> {
        self.user.clone()
    }

    fn credentials(&self) -> Option<Credentials> {
        self.credentials.clone()
    }
}
