//! Host lookups with their own deadline.
//!
//! A lookup that hangs would otherwise only surface as the connect timeout,
//! which cannot be told apart from a backend that accepts no connections.
//! Bounding the lookup separately gives resolver stalls a stable error text,
//! `lookup <host>: i/o timeout`, that the consumer records at warning level.

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::future::Future;
use std::io;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a host lookup failed
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("lookup {host}: i/o timeout")]
    Timeout { host: String },

    #[error("lookup {host}: {source}")]
    Failed { host: String, source: io::Error },
}

/// System resolver bounded by `timeout`
#[derive(Debug, Clone)]
pub struct TimedResolver {
    timeout: Duration,
}

impl TimedResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Resolve for TimedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let timeout = self.timeout;
        let host = name.as_str().to_string();
        Box::pin(async move {
            // Port 0 is replaced by the request's port when connecting.
            let lookup = tokio::net::lookup_host((host.clone(), 0));
            let resolved: Result<Addrs, BoxError> = match lookup_with_timeout(&host, timeout, lookup).await {
                Ok(addrs) => Ok(Box::new(addrs) as Addrs),
                Err(e) => Err(Box::new(e) as BoxError),
            };
            resolved
        })
    }
}

/// Run `lookup`, failing with [`LookupError::Timeout`] once `timeout` passes.
pub async fn lookup_with_timeout<T>(
    host: &str,
    timeout: Duration,
    lookup: impl Future<Output = io::Result<T>>,
) -> Result<T, LookupError> {
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(addrs)) => Ok(addrs),
        Ok(Err(source)) => Err(LookupError::Failed {
            host: host.to_string(),
            source,
        }),
        Err(_) => Err(LookupError::Timeout {
            host: host.to_string(),
        }),
    }
}
