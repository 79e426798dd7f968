#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use http::{Response as HttpResponse, StatusCode};
use mapwire::connection::{ApiConfig, ApiConnection};
use mapwire::http_client::{ByteStream, HttpClient};
use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct MockClient {
    // Queue of HTTP responses to pop for each send_http call
    queue: Arc<Mutex<VecDeque<HttpResponse<ByteStream>>>>,
    // Capture requests for assertions
    log: Arc<Mutex<Vec<http::Request<Bytes>>>>,
}

impl MockClient {
    pub async fn push(&self, resp: HttpResponse<ByteStream>) {
        self.queue.lock().await.push_back(resp);
    }

    pub async fn take_log(&self) -> Vec<http::Request<Bytes>> {
        std::mem::take(&mut *self.log.lock().await)
    }
}

impl HttpClient for MockClient {
    type Error = std::convert::Infallible;

    fn send_http(
        &self,
        request: http::Request<Bytes>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<ByteStream>, Self::Error>,
    > + Send {
        let log = self.log.clone();
        let queue = self.queue.clone();
        async move {
            log.lock().await.push(request);
            Ok(queue.lock().await.pop_front().expect("no queued response"))
        }
    }
}

/// Set once the body it was attached to has been dropped.
#[derive(Clone, Default)]
pub struct Released(Arc<AtomicBool>);

impl Released {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct ReleaseOnDrop(Released);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        (self.0).0.store(true, Ordering::SeqCst);
    }
}

pub fn response(status: u16, body: &'static str) -> HttpResponse<ByteStream> {
    chunked(status, vec![body])
}

pub fn chunked(status: u16, chunks: Vec<&'static str>) -> HttpResponse<ByteStream> {
    let stream = futures::stream::iter(
        chunks
            .into_iter()
            .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes()))),
    );
    with_status(status, Box::pin(stream))
}

/// A body whose drop is observable through the returned flag.
pub fn tracked(status: u16, body: &'static str) -> (HttpResponse<ByteStream>, Released) {
    let released = Released::default();
    let guard = ReleaseOnDrop(released.clone());
    let stream = futures::stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(
        body.as_bytes(),
    ))])
    .map(move |chunk| {
        let _guard = &guard;
        chunk
    });
    (with_status(status, Box::pin(stream)), released)
}

/// A body delivering `first`, then `rest` only after `delay`.
pub fn delayed(first: &'static str, delay: Duration, rest: &'static str) -> HttpResponse<ByteStream> {
    let head = futures::stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(first.as_bytes()))]);
    let tail = futures::stream::once(async move {
        tokio::time::sleep(delay).await;
        Ok::<_, std::io::Error>(Bytes::from_static(rest.as_bytes()))
    });
    with_status(200, Box::pin(head.chain(tail)))
}

fn with_status(status: u16, body: ByteStream) -> HttpResponse<ByteStream> {
    let mut response = HttpResponse::new(body);
    *response.status_mut() = StatusCode::from_u16(status).unwrap();
    response
}

pub fn config() -> ApiConfig {
    ApiConfig::for_url("https://api.example.org/api/0.6/".parse().unwrap())
}

pub fn connection() -> (ApiConnection<MockClient>, MockClient) {
    let client = MockClient::default();
    (ApiConnection::new(client.clone(), config()), client)
}

pub const NODE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="test">
  <node id="246773347" version="1" changeset="80692" timestamp="2008-02-09T10:59:23Z" user="Yeah" uid="12503" lat="51.7463194" lon="0.2428181"/>
</osm>"#;
