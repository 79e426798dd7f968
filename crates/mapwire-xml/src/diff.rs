//! Decoder for upload acknowledgements (`diffResult` documents).

use mapwire_common::types::{DiffElement, ElementType};
use tokio::io::AsyncBufRead;

use crate::XmlError;
use crate::token::{Token, TokenStream};

/// Decodes the id/version reconciliation the server returns after an upload.
///
/// Records come back in document order, which is the order the batch was
/// written in. Callers correlate them with the uploaded elements by
/// position, so the order is never changed here.
#[derive(Debug)]
pub struct DiffResultDecoder<R> {
    tokens: TokenStream<R>,
}

impl<R: AsyncBufRead + Unpin> DiffResultDecoder<R> {
    /// Decoder over the given response body.
    pub fn new(reader: R) -> Self {
        Self {
            tokens: TokenStream::new(reader),
        }
    }

    /// Decode every acknowledgement, handing each one to `sink` in order.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn decode_each<F>(mut self, mut sink: F) -> Result<(), XmlError>
    where
        F: FnMut(DiffElement),
    {
        while let Some(token) = self.tokens.next().await? {
            // records are direct children of the root
            if token != Token::Start || self.tokens.depth() != 2 {
                continue;
            }
            let element_type = match self.tokens.name() {
                Some("node") => ElementType::Node,
                Some("way") => ElementType::Way,
                Some("relation") => ElementType::Relation,
                _ => continue,
            };
            sink(DiffElement {
                element_type,
                client_id: self.tokens.required("old_id")?,
                server_id: self.tokens.attribute_i64("new_id")?,
                server_version: self.tokens.attribute_i32("new_version")?,
            });
        }
        Ok(())
    }

    /// Decode every acknowledgement into a list, in document order.
    pub async fn decode(self) -> Result<Vec<DiffElement>, XmlError> {
        let mut out = Vec::new();
        self.decode_each(|diff| out.push(diff)).await?;
        Ok(out)
    }
}
