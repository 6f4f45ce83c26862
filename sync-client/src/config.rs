//! Connection settings for the dataset service.

/// Server used when neither the environment nor the credential file names one.
pub const DEFAULT_SERVER: &str = "https://openneuro.org";

/// Settings needed to build a remote client.
///
/// Passed explicitly into [`crate::HttpRemote::new`]; nothing in this crate
/// reads the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the service, without a trailing slash.
    pub server: String,
    /// API token. `None` gives an unauthenticated client.
    pub token: Option<String>,
}

impl ClientConfig {
    /// Create a configuration for the given server (trailing slashes removed).
    pub fn new(server: &str) -> Self {
        Self {
            server: normalize_server(server),
            token: None,
        }
    }

    /// Set the API token. Empty tokens are treated as absent.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Check if requests will carry credentials.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server", &self.server)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Strip surrounding whitespace and trailing slashes from a server URL.
pub fn normalize_server(server: &str) -> String {
    server.trim().trim_end_matches('/').to_string()
}
