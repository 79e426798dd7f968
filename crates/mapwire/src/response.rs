//! Decoders that consume a successful response body.

use bytes::Bytes;
use mapwire_common::ApiResult;
use mapwire_common::http_client::ByteStream;
use mapwire_common::types::{ChangesetInfo, DiffElement, MapDataSink};
use mapwire_xml::{ChangesetInfoDecoder, DiffResultDecoder, MapDataDecoder};
use std::future::Future;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

/// Buffered reader over a response body, as handed to decoders.
pub type BodyReader = StreamReader<ByteStream, Bytes>;

/// Turns the body of a successful response into a value.
///
/// A decoder gets the body exactly once and owns it; when `decode` returns,
/// the body is dropped along with the connection it came from.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait ResponseDecoder {
    /// Decoded value
    type Output;

    /// Consume the body.
    fn decode(self, body: BodyReader) -> impl Future<Output = ApiResult<Self::Output>>;
}

/// Streams map data into a sink as it arrives.
#[derive(Debug)]
pub struct MapDataResponse<'s, S: ?Sized>(pub &'s mut S);

impl<S> ResponseDecoder for MapDataResponse<'_, S>
where
    S: MapDataSink + Send + ?Sized,
{
    type Output = ();

    async fn decode(self, body: BodyReader) -> ApiResult<()> {
        MapDataDecoder::new(body).decode(self.0).await?;
        Ok(())
    }
}

/// Collects upload acknowledgements in document order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffResponse;

impl ResponseDecoder for DiffResponse {
    type Output = Vec<DiffElement>;

    async fn decode(self, body: BodyReader) -> ApiResult<Vec<DiffElement>> {
        Ok(DiffResultDecoder::new(body).decode().await?)
    }
}

/// Collects extended changeset records.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangesetInfoResponse;

impl ResponseDecoder for ChangesetInfoResponse {
    type Output = Vec<ChangesetInfo>;

    async fn decode(self, body: BodyReader) -> ApiResult<Vec<ChangesetInfo>> {
        Ok(ChangesetInfoDecoder::new(body).decode().await?)
    }
}

/// Reads a plain-text numeric id, as returned when something is created.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdResponse;

impl ResponseDecoder for IdResponse {
    type Output = i64;

    async fn decode(self, mut body: BodyReader) -> ApiResult<i64> {
        let mut text = String::new();
        body.read_to_string(&mut text).await.map_err(io_error)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(mapwire_common::ApiError::Parse(
                mapwire_common::error::ParseError::new("empty body where an id was expected"),
            ));
        }
        text.parse().map_err(|e| {
            mapwire_common::ApiError::Parse(mapwire_common::error::ParseError::with_source(
                format!("expected a numeric id, got {text:?}"),
                e,
            ))
        })
    }
}

/// Reads the body to its end and ignores it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl ResponseDecoder for Discard {
    type Output = ();

    async fn decode(self, mut body: BodyReader) -> ApiResult<()> {
        tokio::io::copy(&mut body, &mut tokio::io::sink())
            .await
            .map_err(io_error)?;
        Ok(())
    }
}

fn io_error(error: std::io::Error) -> mapwire_common::ApiError {
    mapwire_common::error::ConnectionError::Io(error).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapwire_common::ErrorKind;
    use mapwire_common::http_client::full_body;
    use mapwire_common::types::MapData;

    fn body(text: &'static str) -> BodyReader {
        StreamReader::new(full_body(text))
    }

    fn failing() -> BodyReader {
        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"<osm><node id=\"1\" lat=\"1\" lon=\"1\"/>")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        StreamReader::new(Box::pin(futures::stream::iter(chunks)) as ByteStream)
    }

    #[tokio::test]
    async fn id_is_trimmed_and_parsed() {
        assert_eq!(IdResponse.decode(body("1234\n")).await.unwrap(), 1234);
        let err = IdResponse.decode(body("<html/>")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        let err = IdResponse.decode(body("  \n")).await.unwrap_err();
        assert!(err.to_string().contains("empty body"));
    }

    #[tokio::test]
    async fn map_data_streams_into_the_sink() {
        let mut data = MapData::default();
        MapDataResponse(&mut data)
            .decode(body(r#"<osm><node id="1" lat="1.5" lon="2.5"/></osm>"#))
            .await
            .unwrap();
        assert_eq!(data.nodes.len(), 1);
    }

    #[tokio::test]
    async fn mid_body_failure_is_a_connection_error() {
        let mut data = MapData::default();
        let err = MapDataResponse(&mut data)
            .decode(failing())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        // the node completed before the failure was delivered
        assert_eq!(data.nodes.len(), 1);

        let err = Discard.decode(failing()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let err = DiffResponse
            .decode(body("<diffResult><node old_id=\"x\"/></diffResult>"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
