use serde::{Deserialize, Serialize};

/// Settings shared by every session of one HMR service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrConfig {
    /// Host the packager is reachable on. Used to build `sourceURLs`.
    pub host: String,
    /// Port the packager is reachable on.
    pub port: u16,
}

impl HmrConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host clients should use to reach the packager. Wildcard listen
    /// addresses are not routable, so they map to `localhost`.
    pub fn public_host(&self) -> &str {
        match self.host.trim() {
            "" | "0.0.0.0" | "::" | "[::]" => "localhost",
            host => host,
        }
    }
}

impl Default for HmrConfig {
    fn default() -> Self {
        Self::new("localhost", 8081)
    }
}
