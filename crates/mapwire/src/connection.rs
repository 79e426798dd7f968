//! The request/response pipeline every endpoint goes through.
//!
//! One call to [`ApiConnection::exchange`] is one HTTP exchange: the request
//! is built from the configuration snapshot taken when the call starts,
//! signed if the endpoint needs it, and sent. A successful response body is
//! streamed straight into a [`ResponseDecoder`]; a failed one is drained and
//! classified with [`classify_status`]. The response body is owned by the
//! exchange, so the connection is released whichever way the call ends.

use bon::Builder;
use bytes::Bytes;
use futures::StreamExt;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{Method, Request};
use mapwire_common::error::{ApiError, AuthError, ConnectionError, classify_status};
use mapwire_common::http_client::{ByteStream, HttpClient};
use mapwire_common::{ApiResult, RequestSigner};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

use crate::response::{BodyReader, ResponseDecoder};

/// Base URL of the public production API.
pub const DEFAULT_BASE_URL: &str = "https://api.openstreetmap.org/api/0.6/";

/// Default limit for the response head to arrive.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default limit for the gap between two received body chunks.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(45);

const DEFAULT_USER_AGENT: &str = concat!("mapwire/", env!("CARGO_PKG_VERSION"));

/// Settings shared by all exchanges of one [`ApiConnection`].
///
/// ```
/// # use mapwire::connection::ApiConfig;
/// let config = ApiConfig::new()
///     .base_url(url::Url::parse("https://master.apis.dev.openstreetmap.org/api/0.6/").unwrap())
///     .user_agent("my-editor/1.0")
///     .build();
/// assert_eq!(config.user_agent, "my-editor/1.0");
/// ```
#[derive(Clone, Builder)]
#[builder(start_fn = new)]
pub struct ApiConfig {
    /// Base URL every endpoint path is resolved against
    pub base_url: Url,
    /// Value of the `User-Agent` header
    #[builder(into, default = DEFAULT_USER_AGENT.to_owned())]
    pub user_agent: String,
    /// Limit for the response head to arrive after sending
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    pub connect_timeout: Duration,
    /// Limit for each read of the response body
    #[builder(default = DEFAULT_READ_TIMEOUT)]
    pub read_timeout: Duration,
    /// Signs requests to endpoints that need authentication
    pub signer: Option<Arc<dyn RequestSigner>>,
}

impl ApiConfig {
    /// Configuration for `base_url` with default settings and no signer.
    pub fn for_url(base_url: Url) -> Self {
        Self::new().base_url(base_url).build()
    }

    /// Absolute URL for an endpoint path, which may carry a query string.
    pub fn endpoint(&self, path: &str) -> Url {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let mut url = self.base_url.clone();
        let mut full = url.path().trim_end_matches('/').to_owned();
        full.push('/');
        full.push_str(path.trim_start_matches('/'));
        url.set_path(&full);
        url.set_query(query);
        url
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("user_agent", &self.user_agent)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("signer", &self.signer.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Runs exchanges against one API with a shared configuration.
///
/// The configuration can be changed at any time through the setters. A
/// change only affects exchanges started after it; exchanges in flight keep
/// the snapshot they started with. Exchanges share nothing else, so one
/// connection can be used from many tasks at once.
pub struct ApiConnection<C> {
    client: C,
    config: RwLock<Arc<ApiConfig>>,
}

impl<C> ApiConnection<C> {
    /// Connection sending through `client`.
    pub fn new(client: C, config: ApiConfig) -> Self {
        Self {
            client,
            config: RwLock::new(Arc::new(config)),
        }
    }

    /// The underlying HTTP client
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Snapshot of the current configuration.
    pub async fn config(&self) -> Arc<ApiConfig> {
        self.config.read().await.clone()
    }

    /// Replace the whole configuration.
    pub async fn set_config(&self, config: ApiConfig) {
        *self.config.write().await = Arc::new(config);
    }

    /// Change the connect timeout for subsequent exchanges.
    pub async fn set_connect_timeout(&self, timeout: Duration) {
        self.update(|config| config.connect_timeout = timeout).await;
    }

    /// Change the read timeout for subsequent exchanges.
    pub async fn set_read_timeout(&self, timeout: Duration) {
        self.update(|config| config.read_timeout = timeout).await;
    }

    /// Install or remove the request signer.
    pub async fn set_signer(&self, signer: Option<Arc<dyn RequestSigner>>) {
        self.update(|config| config.signer = signer).await;
    }

    /// Change the `User-Agent` header.
    pub async fn set_user_agent(&self, user_agent: impl Into<String>) {
        let user_agent = user_agent.into();
        self.update(|config| config.user_agent = user_agent).await;
    }

    async fn update(&self, change: impl FnOnce(&mut ApiConfig)) {
        let mut guard = self.config.write().await;
        let mut next = ApiConfig::clone(&guard);
        change(&mut next);
        *guard = Arc::new(next);
    }
}

#[cfg(feature = "reqwest-client")]
impl ApiConnection<reqwest::Client> {
    /// Connection using a default `reqwest` client.
    pub fn with_reqwest(config: ApiConfig) -> Self {
        Self::new(reqwest::Client::new(), config)
    }
}

impl<C> fmt::Debug for ApiConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConnection").finish_non_exhaustive()
    }
}

impl<C: HttpClient + Sync> ApiConnection<C> {
    /// Run one exchange.
    ///
    /// `path` is resolved against the configured base URL. When
    /// `authenticate` is set the request goes through the configured signer,
    /// and a missing signer fails the exchange before anything is sent. On a
    /// success status the body is handed to `decoder`; otherwise it is drained
    /// and the status classified.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, body, decoder)))]
    pub async fn exchange<D>(
        &self,
        method: Method,
        path: &str,
        authenticate: bool,
        body: Option<Bytes>,
        decoder: D,
    ) -> ApiResult<D::Output>
    where
        D: ResponseDecoder,
    {
        let config = self.config().await;
        let request = build_request(&config, method, path, authenticate, body)?;

        let response =
            match tokio::time::timeout(config.connect_timeout, self.client.send_http(request))
                .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(ApiError::Connection(e.into())),
                Err(_) => return Err(ConnectionError::Timeout.into()),
            };

        let (parts, body) = response.into_parts();
        let body = with_read_timeout(body, config.read_timeout);

        if !parts.status.is_success() {
            let text = drain(body).await;
            #[cfg(feature = "tracing")]
            tracing::debug!(status = %parts.status, "exchange failed");
            return Err(classify_status(parts.status, text));
        }

        decoder.decode(BodyReader::new(body)).await
    }
}

/// Build the HTTP request for an exchange, signing it if asked to.
pub fn build_request(
    config: &ApiConfig,
    method: Method,
    path: &str,
    authenticate: bool,
    body: Option<Bytes>,
) -> ApiResult<Request<Bytes>> {
    let url = config.endpoint(path);
    let mut builder = Request::builder()
        .method(method)
        .uri(url.as_str())
        .header(USER_AGENT, config.user_agent.as_str());
    if body.is_some() {
        builder = builder.header(CONTENT_TYPE, "text/xml; charset=utf-8");
    }
    let mut request = builder
        .body(body.unwrap_or_default())
        .map_err(|e| ConnectionError::InvalidRequest(e.to_string()))?;

    if authenticate {
        let signer = config
            .signer
            .as_ref()
            .ok_or(AuthError::NotAuthenticated)?;
        signer.sign(&mut request).map_err(AuthError::Signing)?;
    }
    Ok(request)
}

/// Wrap a body so that every chunk has to arrive within `timeout`.
///
/// A late chunk ends the stream with a `TimedOut` I/O error and drops the
/// inner body.
pub fn with_read_timeout(body: ByteStream, timeout: Duration) -> ByteStream {
    Box::pin(futures::stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(timeout, body.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(body))),
            Ok(None) => None,
            Err(_) => Some((
                Err(io::Error::new(io::ErrorKind::TimedOut, "response read timed out")),
                None,
            )),
        }
    }))
}

/// Read an error body to its end. Whatever arrived before a read failure
/// is kept.
async fn drain(mut body: ByteStream) -> Option<String> {
    let mut buffer = Vec::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => buffer.extend_from_slice(&chunk),
            Err(_) => break,
        }
    }
    let text = String::from_utf8_lossy(&buffer).trim().to_owned();
    (!text.is_empty()).then_some(text)
}
