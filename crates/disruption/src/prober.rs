//! HTTP prober for a single backend and connection type.

use crate::dns::TimedResolver;
use crate::hook::SamplerHook;
use crate::host::{HostResolver, StaticHost};
use crate::locator::Locator;
use crate::sampler::Session;
use crate::types::ConnectionType;
use regex::Regex;
use reqwest::StatusCode;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Header carrying the per-request correlation id
pub const AUDIT_ID_HEADER: &str = "Audit-ID";

/// Source recorded in the `disruption` key of locators built here
pub const SAMPLER_SOURCE: &str = "disruption-sampler";

/// Timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// API servers allow 34s for a request; the prober mirrors that budget.
pub const API_SERVER_TIMEOUT: Duration = Duration::from_secs(34);

/// Time between two samples
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Why a single check failed.
///
/// The display text is what the consumer compares to decide whether two
/// failures belong to the same disruption, so it must be stable for a given
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to resolve host: {0}")]
    HostResolution(String),

    #[error("missing URL")]
    MissingUrl,

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("failed to read bearer token: {0}")]
    Token(String),

    #[error("{0}")]
    Transport(String),

    #[error("failed to read response body: {0}")]
    BodyRead(String),

    #[error("error running request: {status}: {body}")]
    Status { status: String, body: String },

    #[error("response did not contain the correct body contents: {0:?}")]
    BodyMismatch(String),

    #[error("request did not finish within {0:?}")]
    Timeout(Duration),

    #[error("sample was abandoned before the check completed")]
    Abandoned,
}

impl ProbeError {
    /// A transport level failure with the given text.
    pub fn transport(msg: impl fmt::Display) -> Self {
        ProbeError::Transport(msg.to_string())
    }
}

/// Result of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Random id sent with the request for log correlation
    pub correlation_id: String,

    /// Failure, if the check did not pass
    pub error: Option<ProbeError>,

    /// The check was interrupted by cancellation. Cancellation is not a failure.
    pub cancelled: bool,
}

impl CheckOutcome {
    pub fn passed(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            error: None,
            cancelled: false,
        }
    }

    pub fn failed(correlation_id: impl Into<String>, error: ProbeError) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            error: Some(error),
            cancelled: false,
        }
    }

    pub fn cancelled(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            error: None,
            cancelled: true,
        }
    }

    pub fn is_available(&self) -> bool {
        self.error.is_none()
    }
}

/// TLS settings for the probe client.
///
/// Without a TLS config the prober does not verify server certificates.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// PEM bundle of CAs trusted to sign the server certificate
    pub ca_bundle_pem: Option<Vec<u8>>,

    /// PEM client certificate and private key
    pub client_identity_pem: Option<Vec<u8>>,

    /// Skip server certificate verification
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    fn apply(&self, mut builder: reqwest::ClientBuilder) -> Result<reqwest::ClientBuilder, ProbeError> {
        if self.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(pem) = &self.ca_bundle_pem {
            let certs = reqwest::Certificate::from_pem_bundle(pem)
                .map_err(|e| ProbeError::Client(error_chain(&e)))?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(pem) = &self.client_identity_pem {
            let identity =
                reqwest::Identity::from_pem(pem).map_err(|e| ProbeError::Client(error_chain(&e)))?;
            builder = builder.identity(identity);
        }
        Ok(builder)
    }
}

/// Probes one HTTP endpoint and records availability intervals for it.
///
/// Construct with [`BackendSamplerBuilder`]. Configuration is immutable once
/// built; the HTTP client is created on first use and shared by every check.
pub struct BackendSampler {
    pub(crate) locator: Locator,
    pub(crate) connection_type: ConnectionType,
    path: String,
    host_resolver: Arc<dyn HostResolver>,
    bearer_token: Option<String>,
    bearer_token_file: Option<PathBuf>,
    timeout: Duration,
    tls: Option<TlsConfig>,
    expected_status: Option<u16>,
    expected_body: Option<String>,
    expected_body_regex: Option<Regex>,
    user_agent: Option<String>,
    pub(crate) hooks: Vec<Arc<dyn SamplerHook>>,
    pub(crate) sample_interval: Duration,

    http_client: OnceLock<Result<reqwest::Client, ProbeError>>,
    pub(crate) session: Mutex<Option<Session>>,
}

impl fmt::Debug for BackendSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSampler")
            .field("locator", &self.locator.to_string())
            .field("connection_type", &self.connection_type)
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BackendSampler {
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    pub fn disruption_backend_name(&self) -> &str {
        self.locator.backend_disruption_name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Resolve the full URL that is probed.
    pub async fn url(&self) -> Result<String, ProbeError> {
        let host = self
            .host_resolver
            .resolve_host()
            .await
            .map_err(ProbeError::HostResolution)?;
        if host.is_empty() {
            return Err(ProbeError::MissingUrl);
        }
        Ok(format!("{}{}", host, self.path))
    }

    /// The shared HTTP client, built on first use.
    pub(crate) fn http_client(&self) -> Result<&reqwest::Client, ProbeError> {
        self.http_client
            .get_or_init(|| self.build_http_client())
            .as_ref()
            .map_err(Clone::clone)
    }

    fn has_bearer_auth(&self) -> bool {
        self.bearer_token.as_deref().is_some_and(|t| !t.is_empty()) || self.bearer_token_file.is_some()
    }

    fn build_http_client(&self) -> Result<reqwest::Client, ProbeError> {
        // Individual phases get less than the whole budget so a slow phase
        // shows up as its own failure. Lookups give up before the connect
        // phase does, so resolver stalls are reported as such.
        let part_timeout = self.timeout * 4 / 5;
        let lookup_timeout = self.timeout * 3 / 5;

        if self.has_bearer_auth() && self.tls.is_none() {
            return Err(ProbeError::Client(
                "a TLS config is required if you are providing a token".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .dns_resolver(Arc::new(TimedResolver::new(lookup_timeout)))
            .connect_timeout(part_timeout)
            .read_timeout(part_timeout)
            .pool_idle_timeout(part_timeout)
            .timeout(self.timeout);

        builder = match self.connection_type {
            ConnectionType::New => builder
                .pool_max_idle_per_host(0)
                .tcp_keepalive(None::<Duration>),
            ConnectionType::Reused => builder,
        };

        builder = match &self.tls {
            Some(tls) => tls.apply(builder)?,
            None => builder.danger_accept_invalid_certs(true),
        };

        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        builder.build().map_err(|e| ProbeError::Client(error_chain(&e)))
    }

    async fn bearer_token(&self) -> Result<Option<String>, ProbeError> {
        if let Some(path) = &self.bearer_token_file {
            // Re-read on every check so rotated tokens are picked up.
            let token = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ProbeError::Token(format!("{}: {}", path.display(), e)))?;
            return Ok(Some(token.trim().to_string()));
        }
        Ok(self.bearer_token.clone().filter(|t| !t.is_empty()))
    }

    /// Perform one GET against the backend.
    ///
    /// Cancellation is not a failure: a check interrupted by `cancel` reports
    /// no error. No retries happen here; cadence belongs to the producer.
    pub async fn check_connection(&self, cancel: &CancellationToken) -> CheckOutcome {
        let correlation_id = Uuid::new_v4().to_string();
        if cancel.is_cancelled() {
            return CheckOutcome::cancelled(correlation_id);
        }

        // Longer than the client timeout so it never trips first, but
        // guarantees the check finishes eventually.
        let backstop = self.timeout * 3 / 2;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => CheckOutcome::cancelled(correlation_id),
            result = tokio::time::timeout(backstop, self.get(&correlation_id)) => match result {
                Ok(Ok(())) => CheckOutcome::passed(correlation_id),
                Ok(Err(e)) => CheckOutcome::failed(correlation_id, e),
                Err(_) => CheckOutcome::failed(correlation_id, ProbeError::Timeout(backstop)),
            },
        }
    }

    async fn get(&self, correlation_id: &str) -> Result<(), ProbeError> {
        let client = self.http_client()?;
        let url = self.url().await?;

        let mut request = client.get(&url).header(AUDIT_ID_HEADER, correlation_id);
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProbeError::Transport(error_chain(&e)))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProbeError::BodyRead(error_chain(&e)))?;

        self.classify(status, &body)
    }

    /// Decide whether a response counts as available.
    fn classify(&self, status: StatusCode, body: &[u8]) -> Result<(), ProbeError> {
        if self.expected_status == Some(status.as_u16()) {
            return Ok(());
        }
        if !(200..=399).contains(&status.as_u16()) {
            return Err(ProbeError::Status {
                status: status.to_string(),
                body: String::from_utf8_lossy(body).into_owned(),
            });
        }
        self.body_matches(body)
    }

    fn body_matches(&self, body: &[u8]) -> Result<(), ProbeError> {
        let text = String::from_utf8_lossy(body);
        let contains = self
            .expected_body
            .as_deref()
            .is_none_or(|expected| expected.is_empty() || text.contains(expected));
        let matches = self.expected_body_regex.as_ref().is_none_or(|re| re.is_match(&text));
        if contains && matches {
            Ok(())
        } else {
            Err(ProbeError::BodyMismatch(text.into_owned()))
        }
    }
}

/// Render an error and all of its sources, `outer: inner: root`.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

/// Builder for [`BackendSampler`]
pub struct BackendSamplerBuilder {
    locator: Locator,
    connection_type: ConnectionType,
    path: String,
    host_resolver: Arc<dyn HostResolver>,
    bearer_token: Option<String>,
    bearer_token_file: Option<PathBuf>,
    timeout: Option<Duration>,
    tls: Option<TlsConfig>,
    expected_status: Option<u16>,
    expected_body: Option<String>,
    expected_body_regex: Option<String>,
    user_agent: Option<String>,
    hooks: Vec<Arc<dyn SamplerHook>>,
    sample_interval: Duration,
}

impl BackendSamplerBuilder {
    /// Start from an explicit locator and host resolver.
    pub fn new(
        locator: Locator,
        host_resolver: Arc<dyn HostResolver>,
        path: impl Into<String>,
        connection_type: ConnectionType,
    ) -> Self {
        Self {
            locator,
            connection_type,
            path: path.into(),
            host_resolver,
            bearer_token: None,
            bearer_token_file: None,
            timeout: None,
            tls: None,
            expected_status: None,
            expected_body: None,
            expected_body_regex: None,
            user_agent: None,
            hooks: Vec::new(),
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    /// A generic server reachable at a fixed host.
    pub fn simple(
        host: impl Into<String>,
        backend_name: &str,
        path: impl Into<String>,
        connection_type: ConnectionType,
    ) -> Self {
        Self::new(
            Locator::disruption_check(backend_name, SAMPLER_SOURCE, connection_type),
            Arc::new(StaticHost::new(host)),
            path,
            connection_type,
        )
    }

    /// A fixed host recorded under a caller supplied locator.
    pub fn with_locator(
        locator: Locator,
        host: impl Into<String>,
        path: impl Into<String>,
        connection_type: ConnectionType,
    ) -> Self {
        Self::new(locator, Arc::new(StaticHost::new(host)), path, connection_type)
    }

    /// A kube-like API server. Uses the API server's own 34s request budget.
    pub fn api_server(
        host: impl Into<String>,
        backend_name: &str,
        path: impl Into<String>,
        connection_type: ConnectionType,
    ) -> Self {
        let historical_name = format!("{}-{}-connections", backend_name, connection_type);
        Self::new(
            Locator::disruption_check(&historical_name, SAMPLER_SOURCE, connection_type),
            Arc::new(StaticHost::new(host)),
            path,
            connection_type,
        )
        .timeout(API_SERVER_TIMEOUT)
    }

    /// A backend exposed through a named route whose host is looked up by `host_resolver`.
    pub fn route(
        host_resolver: Arc<dyn HostResolver>,
        namespace: &str,
        route: &str,
        backend_name: &str,
        path: impl Into<String>,
        connection_type: ConnectionType,
    ) -> Self {
        let historical_name = format!("{}-{}-connections", backend_name, connection_type);
        Self::new(
            Locator::route_disruption_check(
                &historical_name,
                SAMPLER_SOURCE,
                namespace,
                route,
                connection_type,
            ),
            host_resolver,
            path,
            connection_type,
        )
    }

    /// Locator the sampler will record under.
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Qualify the locator with the load balancer the traffic goes through.
    pub fn load_balancer(mut self, load_balancer: &str) -> Self {
        self.locator = self.locator.with_load_balancer(load_balancer);
        self
    }

    /// Bearer token, literal or read from a file before each check.
    /// A TLS config is required alongside.
    pub fn bearer_token_auth(mut self, token: Option<String>, token_file: Option<PathBuf>) -> Self {
        self.bearer_token = token;
        self.bearer_token_file = token_file;
        self
    }

    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Accept this status code even outside 200-399.
    pub fn expected_status_code(mut self, status: u16) -> Self {
        self.expected_status = Some(status);
        self
    }

    /// Require the body to contain this text. Useful through proxies, where a
    /// connection may not reach the backend you expect.
    pub fn expected_body(mut self, body: impl Into<String>) -> Self {
        self.expected_body = Some(body.into());
        self
    }

    /// Require the body to match this regular expression.
    pub fn expected_body_regex(mut self, pattern: impl Into<String>) -> Self {
        self.expected_body_regex = Some(pattern.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn sampler_hook(mut self, hook: Arc<dyn SamplerHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn sampler_hooks(mut self, hooks: impl IntoIterator<Item = Arc<dyn SamplerHook>>) -> Self {
        self.hooks.extend(hooks);
        self
    }

    /// Validate the configuration and build the sampler.
    pub fn build(self) -> common::Result<BackendSampler> {
        if self.locator.backend_disruption_name().is_empty() {
            return Err(common::Error::config("missing disruption backend name"));
        }
        if !self.path.starts_with('/') {
            return Err(common::Error::config(format!(
                "path {:?} must start with a slash",
                self.path
            )));
        }
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(common::Error::config("timeout must be greater than zero"));
        }
        if self.sample_interval.is_zero() {
            return Err(common::Error::config("sample interval must be greater than zero"));
        }
        let expected_body_regex = self
            .expected_body_regex
            .map(|pattern| {
                Regex::new(&pattern).map_err(|e| {
                    common::Error::config(format!("invalid expected body regex {:?}: {}", pattern, e))
                })
            })
            .transpose()?;

        Ok(BackendSampler {
            locator: self.locator,
            connection_type: self.connection_type,
            path: self.path,
            host_resolver: self.host_resolver,
            bearer_token: self.bearer_token,
            bearer_token_file: self.bearer_token_file,
            timeout,
            tls: self.tls,
            expected_status: self.expected_status,
            expected_body: self.expected_body,
            expected_body_regex,
            user_agent: self.user_agent,
            hooks: self.hooks,
            sample_interval: self.sample_interval,
            http_client: OnceLock::new(),
            session: Mutex::new(None),
        })
    }
}
