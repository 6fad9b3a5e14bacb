//! Host resolution for probed backends.

use async_trait::async_trait;

/// Resolves the base URL (`scheme://host[:port]`) of a backend.
///
/// Implementations may look the host up from anywhere (a static string, a
/// route status, a client configuration). It is resolved on every check so
/// a moving host is followed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve_host(&self) -> Result<String, String>;
}

/// A host that never changes
#[derive(Debug, Clone)]
pub struct StaticHost {
    host: String,
}

impl StaticHost {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl HostResolver for StaticHost {
    async fn resolve_host(&self) -> Result<String, String> {
        Ok(self.host.clone())
    }
}
