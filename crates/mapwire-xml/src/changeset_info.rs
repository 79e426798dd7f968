//! Decoder for extended changeset records.

use mapwire_common::types::{BoundingBox, ChangesetComment, ChangesetInfo, Tags};
use smol_str::SmolStr;
use tokio::io::AsyncBufRead;

use crate::XmlError;
use crate::identity::IdentityCache;
use crate::token::{Token, TokenStream};

/// Streaming decoder for `changeset` records, including their tags and
/// discussion. Users are deduplicated the same way map data decoding does.
#[derive(Debug)]
pub struct ChangesetInfoDecoder<R> {
    tokens: TokenStream<R>,
    cache: IdentityCache,
}

impl<R: AsyncBufRead + Unpin> ChangesetInfoDecoder<R> {
    /// Decoder over the given response body.
    pub fn new(reader: R) -> Self {
        Self {
            tokens: TokenStream::new(reader),
            cache: IdentityCache::new(),
        }
    }

    /// Decode every changeset record, handing each to `sink` once complete.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn decode_each<F>(mut self, mut sink: F) -> Result<(), XmlError>
    where
        F: FnMut(ChangesetInfo),
    {
        let mut info: Option<ChangesetInfo> = None;
        let mut comment: Option<ChangesetComment> = None;

        while let Some(token) = self.tokens.next().await? {
            let name = SmolStr::new(self.tokens.name().unwrap_or_default());
            let in_changeset = self.tokens.parent_name() == Some("changeset");
            match (token, name.as_str()) {
                (Token::Start, "changeset") => info = Some(self.start_changeset()?),
                (Token::Start, "tag") if in_changeset => {
                    if let Some(info) = info.as_mut() {
                        let key = self.tokens.required_str("k")?.to_owned();
                        let value = self.tokens.required_str("v")?.to_owned();
                        info.tags.get_or_insert_with(Tags::new).insert(key, value);
                    }
                }
                (Token::Start, "discussion") => {
                    if let Some(info) = info.as_mut() {
                        info.discussion.get_or_insert_with(Vec::new);
                    }
                }
                (Token::Start, "comment") => {
                    let user = match self.tokens.attribute_i64("uid")? {
                        Some(uid) => Some(
                            self.cache
                                .user(uid, self.tokens.attribute("user").unwrap_or_default()),
                        ),
                        None => None,
                    };
                    comment = Some(ChangesetComment {
                        date: self.tokens.attribute_datetime("date")?,
                        user,
                        text: None,
                    });
                }
                (Token::End, "text") => {
                    if let Some(comment) = comment.as_mut() {
                        comment.text = self.tokens.text().map(str::to_owned);
                    }
                }
                (Token::End, "comment") => {
                    if let (Some(done), Some(info)) = (comment.take(), info.as_mut()) {
                        info.discussion.get_or_insert_with(Vec::new).push(done);
                    }
                }
                (Token::End, "changeset") => {
                    if let Some(done) = info.take() {
                        sink(done);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Decode every changeset record into a list, in document order.
    pub async fn decode(self) -> Result<Vec<ChangesetInfo>, XmlError> {
        let mut out = Vec::new();
        self.decode_each(|info| out.push(info)).await?;
        Ok(out)
    }

    fn start_changeset(&mut self) -> Result<ChangesetInfo, XmlError> {
        let tokens = &self.tokens;
        let user = match tokens.attribute_i64("uid")? {
            Some(uid) => Some(
                self.cache
                    .user(uid, tokens.attribute("user").unwrap_or_default()),
            ),
            None => None,
        };

        let corners = (
            tokens.attribute_f64("min_lat")?,
            tokens.attribute_f64("min_lon")?,
            tokens.attribute_f64("max_lat")?,
            tokens.attribute_f64("max_lon")?,
        );
        let bounds = match corners {
            (Some(min_lat), Some(min_lon), Some(max_lat), Some(max_lon)) => Some(
                BoundingBox::from_coords(min_lat, min_lon, max_lat, max_lon).map_err(|source| {
                    XmlError::InvalidValue {
                        element: tokens.element_name(),
                        source,
                    }
                })?,
            ),
            _ => None,
        };

        Ok(ChangesetInfo {
            id: tokens.required("id")?,
            user,
            tags: None,
            bounds,
            created_at: tokens.attribute_datetime("created_at")?,
            closed_at: tokens.attribute_datetime("closed_at")?,
            open: tokens.attribute_bool("open")?.unwrap_or(false),
            comments_count: tokens.attribute_as("comments_count")?.unwrap_or(0),
            changes_count: tokens.attribute_as("changes_count")?.unwrap_or(0),
            discussion: None,
        })
    }
}
