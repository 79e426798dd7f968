//! Decoder for map data responses (`bounds`, `node`, `way`, `relation`).
//!
//! Entities go to the sink the moment their closing tag is read, in document
//! order; nothing is buffered beyond the element currently being built. That
//! lets a caller start working on a large response before it has fully
//! arrived.

use mapwire_common::types::{
    BoundingBox, ElementMeta, ElementType, LatLon, MapDataSink, MapEntity, Node, Relation,
    RelationMember, Tags, Way,
};
use smol_str::SmolStr;
use tokio::io::AsyncBufRead;

use crate::identity::IdentityCache;
use crate::token::{Token, TokenStream};
use crate::XmlError;

/// Streaming decoder for node, way, relation and bounds records.
#[derive(Debug)]
pub struct MapDataDecoder<R> {
    tokens: TokenStream<R>,
    cache: IdentityCache,
}

struct Pending {
    meta: ElementMeta,
    shape: Shape,
}

enum Shape {
    Node(LatLon),
    Way(Vec<i64>),
    Relation(Vec<RelationMember>),
}

impl Pending {
    fn into_entity(self) -> MapEntity {
        let meta = self.meta;
        match self.shape {
            Shape::Node(position) => MapEntity::Node(Node { meta, position }),
            Shape::Way(node_ids) => MapEntity::Way(Way { meta, node_ids }),
            Shape::Relation(members) => MapEntity::Relation(Relation { meta, members }),
        }
    }
}

impl<R: AsyncBufRead + Unpin> MapDataDecoder<R> {
    /// Decoder over the given response body.
    pub fn new(reader: R) -> Self {
        Self {
            tokens: TokenStream::new(reader),
            cache: IdentityCache::new(),
        }
    }

    /// Decode the whole document, handing each entity to `sink` as soon as
    /// it is complete.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn decode<S>(mut self, sink: &mut S) -> Result<(), XmlError>
    where
        S: MapDataSink + ?Sized,
    {
        let mut pending: Option<Pending> = None;
        #[cfg(feature = "tracing")]
        let mut emitted = 0usize;

        while let Some(token) = self.tokens.next().await? {
            let name = SmolStr::new(self.tokens.name().unwrap_or_default());
            match (token, name.as_str()) {
                (Token::Start, "node" | "way" | "relation") => {
                    if pending.is_some() {
                        return Err(self.nested_element());
                    }
                    pending = Some(self.start_element()?);
                }
                (Token::Start, "tag") => {
                    if let Some(element) = pending.as_mut() {
                        let key = self.tokens.required_str("k")?.to_owned();
                        let value = self.tokens.required_str("v")?.to_owned();
                        element
                            .meta
                            .tags
                            .get_or_insert_with(Tags::new)
                            .insert(key, value);
                    }
                }
                (Token::Start, "nd") => {
                    if let Some(Pending {
                        shape: Shape::Way(node_ids),
                        ..
                    }) = pending.as_mut()
                    {
                        node_ids.push(self.tokens.required("ref")?);
                    }
                }
                (Token::Start, "member") => {
                    if let Some(Pending {
                        shape: Shape::Relation(members),
                        ..
                    }) = pending.as_mut()
                    {
                        members.push(self.member()?);
                    }
                }
                (Token::End, "node" | "way" | "relation") => {
                    if let Some(element) = pending.take() {
                        sink.accept(element.into_entity());
                        #[cfg(feature = "tracing")]
                        {
                            emitted += 1;
                        }
                    }
                }
                (Token::End, "bounds") => {
                    sink.accept(MapEntity::Bounds(self.bounds()?));
                }
                _ => {}
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            elements = emitted,
            users = self.cache.user_count(),
            changesets = self.cache.changeset_count(),
            "decoded map data"
        );
        Ok(())
    }

    fn start_element(&mut self) -> Result<Pending, XmlError> {
        let tokens = &self.tokens;

        let mut meta = ElementMeta::new(
            tokens.required("id")?,
            tokens.attribute_as("version")?.unwrap_or(0),
        );

        let user = match tokens.attribute_i64("uid")? {
            Some(uid) => Some(
                self.cache
                    .user(uid, tokens.attribute("user").unwrap_or_default()),
            ),
            None => None,
        };
        meta.timestamp = tokens.attribute_datetime("timestamp")?;
        if let Some(changeset_id) = tokens.attribute_i64("changeset")? {
            meta.changeset = Some(self.cache.changeset(changeset_id, meta.timestamp, user));
        }

        let shape = match tokens.name() {
            Some("node") => {
                let lat = tokens.required("lat")?;
                let lon = tokens.required("lon")?;
                Shape::Node(LatLon::new(lat, lon).map_err(|source| self.invalid_value(source))?)
            }
            Some("way") => Shape::Way(Vec::new()),
            _ => Shape::Relation(Vec::new()),
        };

        Ok(Pending { meta, shape })
    }

    fn member(&self) -> Result<RelationMember, XmlError> {
        let tokens = &self.tokens;
        let ref_id = tokens.required("ref")?;
        let raw_type = tokens.required_str("type")?;
        let member_type =
            raw_type
                .parse::<ElementType>()
                .map_err(|_| XmlError::InvalidAttribute {
                    element: SmolStr::new_static("member"),
                    name: SmolStr::new_static("type"),
                    value: raw_type.to_owned(),
                    expected: "element type",
                })?;
        let role = tokens.attribute("role").unwrap_or_default();
        RelationMember::new(ref_id, member_type, role).map_err(|source| self.invalid_value(source))
    }

    fn bounds(&self) -> Result<BoundingBox, XmlError> {
        let tokens = &self.tokens;
        BoundingBox::from_coords(
            tokens.required("minlat")?,
            tokens.required("minlon")?,
            tokens.required("maxlat")?,
            tokens.required("maxlon")?,
        )
        .map_err(|source| self.invalid_value(source))
    }

    fn invalid_value(&self, source: mapwire_common::types::ValueError) -> XmlError {
        XmlError::InvalidValue {
            element: self.tokens.element_name(),
            source,
        }
    }

    fn nested_element(&self) -> XmlError {
        XmlError::Malformed {
            message: format!(
                "<{}> nested inside another element record",
                self.tokens.element_name()
            ),
            position: self.tokens.position(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapwire_common::types::MapData;
    use std::sync::Arc;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="test">
  <bounds minlat="51.7" minlon="0.2" maxlat="51.8" maxlon="0.3"/>
  <node id="246773347" version="1" changeset="80692" timestamp="2008-02-09T10:59:23Z" user="Yeah" uid="12503" lat="51.7463194" lon="0.2428181"/>
  <node id="246773348" version="3" changeset="80692" timestamp="2008-02-09T10:59:24Z" user="Yeah" uid="12503" lat="51.7463" lon="0.2428">
    <tag k="amenity" v="bench"/>
    <tag k="name" v="Fish &amp; Chips"/>
  </node>
  <way id="22" version="2" changeset="80693" user="Other" uid="5">
    <nd ref="246773347"/>
    <nd ref="246773348"/>
    <tag k="highway" v="path"/>
  </way>
  <way id="23" version="1"/>
  <relation id="9" version="4" changeset="80692" user="Yeah" uid="12503">
    <member type="way" ref="22" role="outer"/>
    <member type="node" ref="246773347" role=""/>
  </relation>
  <relation id="10" version="1"></relation>
</osm>"#;

    async fn decode(xml: &str) -> Result<MapData, XmlError> {
        let mut data = MapData::default();
        MapDataDecoder::new(xml.as_bytes()).decode(&mut data).await?;
        Ok(data)
    }

    #[tokio::test]
    async fn decodes_single_node() {
        let xml = r#"<osm><node id="246773347" version="1" changeset="80692" timestamp="2008-02-09T10:59:23Z" user="Yeah" uid="12503" lat="51.7463194" lon="0.2428181"/></osm>"#;
        let data = decode(xml).await.unwrap();
        assert_eq!(data.nodes.len(), 1);

        let node = &data.nodes[0];
        assert_eq!(node.meta.id, 246773347);
        assert_eq!(node.meta.version, 1);
        assert_eq!(node.position.lat(), 51.7463194);
        assert_eq!(node.position.lon(), 0.2428181);
        assert!(node.meta.tags.is_none());
        assert!(!node.meta.modified);
        assert!(!node.meta.deleted);

        let changeset = node.meta.changeset.as_ref().unwrap();
        assert_eq!(changeset.id, 80692);
        assert_eq!(changeset.user.as_ref().unwrap().display_name, "Yeah");
        assert_eq!(changeset.user.as_ref().unwrap().id, 12503);
        assert_eq!(
            changeset.date.unwrap().to_rfc3339(),
            "2008-02-09T10:59:23+00:00"
        );
    }

    #[tokio::test]
    async fn every_element_keeps_its_own_timestamp() {
        let xml = r#"<osm>
  <node id="1" version="1" changeset="80692" timestamp="2008-02-09T10:59:23Z" lat="0" lon="0"/>
  <node id="2" version="4" changeset="80692" timestamp="2019-06-01T00:00:00Z" lat="0" lon="0"/>
  <node id="3" version="1" lat="0" lon="0"/>
</osm>"#;
        let data = decode(xml).await.unwrap();
        let stamps: Vec<_> = data
            .nodes
            .iter()
            .map(|n| n.meta.timestamp.map(|t| t.to_rfc3339()))
            .collect();
        assert_eq!(
            stamps,
            vec![
                Some("2008-02-09T10:59:23+00:00".to_owned()),
                Some("2019-06-01T00:00:00+00:00".to_owned()),
                None,
            ]
        );
        // the shared changeset keeps the first date it saw
        let changeset = data.nodes[1].meta.changeset.as_ref().unwrap();
        assert_eq!(changeset.date, data.nodes[0].meta.timestamp);
    }

    #[tokio::test]
    async fn repeated_identities_share_instances() {
        let data = decode(SAMPLE).await.unwrap();
        let first = data.nodes[0].meta.changeset.as_ref().unwrap();
        let second = data.nodes[1].meta.changeset.as_ref().unwrap();
        assert!(Arc::ptr_eq(first, second));
        assert!(Arc::ptr_eq(
            first.user.as_ref().unwrap(),
            second.user.as_ref().unwrap()
        ));

        // relation from the same changeset resolves to the same instance as well
        let relation_cs = data.relations[0].meta.changeset.as_ref().unwrap();
        assert!(Arc::ptr_eq(first, relation_cs));

        let other = data.ways[0].meta.changeset.as_ref().unwrap();
        assert!(!Arc::ptr_eq(first, other));
    }

    #[tokio::test]
    async fn tags_absent_unless_seen_children_always_present() {
        let data = decode(SAMPLE).await.unwrap();
        assert!(data.nodes[0].meta.tags.is_none());
        let tags = data.nodes[1].meta.tags.as_ref().unwrap();
        assert_eq!(tags.get("name").map(String::as_str), Some("Fish & Chips"));
        assert_eq!(tags.len(), 2);

        assert_eq!(data.ways[0].node_ids, vec![246773347, 246773348]);
        assert!(data.ways[1].node_ids.is_empty());
        assert!(data.ways[1].meta.tags.is_none());
        assert!(data.ways[1].meta.changeset.is_none());

        let members = &data.relations[0].members;
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].member_type(), ElementType::Way);
        assert_eq!(members[0].ref_id(), 22);
        assert_eq!(members[0].role(), "outer");
        assert_eq!(members[1].role(), "");
        assert!(data.relations[1].members.is_empty());
    }

    #[tokio::test]
    async fn entities_arrive_in_document_order() {
        let mut order = Vec::new();
        let mut sink = |entity: MapEntity| {
            order.push(match entity {
                MapEntity::Bounds(_) => "bounds".to_owned(),
                MapEntity::Node(n) => format!("node {}", n.meta.id),
                MapEntity::Way(w) => format!("way {}", w.meta.id),
                MapEntity::Relation(r) => format!("relation {}", r.meta.id),
            })
        };
        MapDataDecoder::new(SAMPLE.as_bytes())
            .decode(&mut sink)
            .await
            .unwrap();
        assert_eq!(
            order,
            vec![
                "bounds",
                "node 246773347",
                "node 246773348",
                "way 22",
                "way 23",
                "relation 9",
                "relation 10"
            ]
        );
    }

    #[tokio::test]
    async fn bounds_are_decoded() {
        let data = decode(SAMPLE).await.unwrap();
        let bounds = data.bounds.unwrap();
        assert_eq!(bounds.min().lat(), 51.7);
        assert_eq!(bounds.max().lon(), 0.3);
    }

    #[tokio::test]
    async fn entities_before_a_broken_tail_are_already_delivered() {
        let xml = r#"<osm><node id="1" lat="1" lon="2"/><node id="2" lat="1" lon="2"/><way id="3"><nd ref="x"/></way></osm>"#;
        let mut data = MapData::default();
        let err = MapDataDecoder::new(xml.as_bytes())
            .decode(&mut data)
            .await
            .unwrap_err();
        assert!(matches!(err, XmlError::InvalidAttribute { .. }));
        assert_eq!(data.nodes.len(), 2);
        assert!(data.ways.is_empty());
    }

    #[tokio::test]
    async fn malformed_attributes_are_errors() {
        let bad_lat = r#"<osm><node id="1" lat="north" lon="2"/></osm>"#;
        assert!(matches!(
            decode(bad_lat).await,
            Err(XmlError::InvalidAttribute { .. })
        ));

        let out_of_range = r#"<osm><node id="1" lat="91" lon="2"/></osm>"#;
        assert!(matches!(
            decode(out_of_range).await,
            Err(XmlError::InvalidValue { .. })
        ));

        let missing_id = r#"<osm><way version="1"/></osm>"#;
        assert!(matches!(
            decode(missing_id).await,
            Err(XmlError::MissingAttribute { .. })
        ));

        let bad_member = r#"<osm><relation id="1"><member type="area" ref="1" role=""/></relation></osm>"#;
        assert!(matches!(
            decode(bad_member).await,
            Err(XmlError::InvalidAttribute { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_elements_are_ignored() {
        let xml = r#"<osm><note id="4"><comment>hi</comment></note><node id="1" lat="1" lon="2"/></osm>"#;
        let data = decode(xml).await.unwrap();
        assert_eq!(data.len(), 1);
    }
}
