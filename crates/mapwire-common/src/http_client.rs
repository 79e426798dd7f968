//! Minimal HTTP client abstraction with streamed response bodies.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ConnectionError;

/// Response body as a stream of chunks.
///
/// Dropping the stream releases the underlying connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// A body stream yielding `bytes` as a single chunk.
pub fn full_body(bytes: impl Into<Bytes>) -> ByteStream {
    let bytes = bytes.into();
    Box::pin(futures::stream::once(async move { Ok(bytes) }))
}

/// A body stream yielding nothing.
pub fn empty_body() -> ByteStream {
    Box::pin(futures::stream::empty())
}

/// HTTP client trait for sending a request and receiving a streamed response.
///
/// Implementations perform exactly one exchange per call and must not retry.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait HttpClient {
    /// Error type returned by the HTTP client.
    ///
    /// The conversion decides how client failures surface, e.g. as
    /// [`ConnectionError::Timeout`] or [`ConnectionError::Connect`].
    type Error: std::error::Error + Display + Send + Sync + Into<ConnectionError> + 'static;

    /// Send an HTTP request and return the response with its body unread.
    fn send_http(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = core::result::Result<http::Response<ByteStream>, Self::Error>>;
}

#[cfg(feature = "reqwest-client")]
impl HttpClient for reqwest::Client {
    type Error = reqwest::Error;

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(method = %request.method(), uri = %request.uri()))
    )]
    async fn send_http(
        &self,
        request: http::Request<Bytes>,
    ) -> core::result::Result<http::Response<ByteStream>, Self::Error> {
        // Convert http::Request to reqwest::Request
        let (parts, body) = request.into_parts();

        let mut req = self.request(parts.method, parts.uri.to_string()).body(body);

        // Copy headers
        for (name, value) in parts.headers.iter() {
            req = req.header(name.as_str(), value.as_bytes());
        }

        let resp = req.send().await?;

        let status = resp.status();
        let headers = resp.headers().clone();
        #[cfg(feature = "tracing")]
        tracing::debug!(%status, "response head received");

        // Body chunks arrive as the decoder pulls them
        let stream = resp.bytes_stream().map(|chunk| chunk.map_err(io::Error::other));

        let mut response = http::Response::new(Box::pin(stream) as ByteStream);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl<T: HttpClient + Sync> HttpClient for Arc<T> {
    type Error = T::Error;

    fn send_http(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = core::result::Result<http::Response<ByteStream>, Self::Error>> + Send
    {
        self.as_ref().send_http(request)
    }
}
