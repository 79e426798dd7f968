//! Ordering and serialization of local edits for upload.

use mapwire_common::types::{Element, Tags};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::cmp::Reverse;
use std::io;

const GENERATOR: &str = concat!("mapwire ", env!("CARGO_PKG_VERSION"));

/// Errors produced while writing an upload document.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum WriteError {
    /// Writing to the output failed
    #[error("failed to write upload document")]
    #[diagnostic(code(mapwire::xml::write_io))]
    Io(#[from] io::Error),

    /// The XML writer rejected an event
    #[error("failed to encode upload document")]
    #[diagnostic(code(mapwire::xml::write_encode))]
    Xml(#[from] quick_xml::Error),
}

/// The section of an upload an element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Elements with placeholder ids
    Create,
    /// Existing elements that were changed
    Modify,
    /// Existing elements marked for deletion
    Delete,
}

impl Bucket {
    /// Classify an element by its local state.
    ///
    /// Returns `None` for elements that must not be uploaded: unchanged
    /// ones, and ones that were created and deleted again locally.
    pub fn of(element: &Element) -> Option<Self> {
        match (element.is_new(), element.is_deleted(), element.is_modified()) {
            (true, true, _) => None,
            (true, false, _) => Some(Self::Create),
            (false, true, _) => Some(Self::Delete),
            (false, false, true) => Some(Self::Modify),
            (false, false, false) => None,
        }
    }

    /// Section element name in the upload document
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

/// A set of local edits, bucketed and ordered for upload.
///
/// Creations are ordered nodes, ways, relations so that a way can refer to
/// nodes created earlier in the same upload. Modifications and deletions go
/// the other way round, so a relation is detached before anything it
/// references disappears. Elements of the same type keep their input order.
#[derive(Debug, Clone, Default)]
pub struct ChangesetBatch<'a> {
    create: Vec<&'a Element>,
    modify: Vec<&'a Element>,
    delete: Vec<&'a Element>,
}

impl<'a> ChangesetBatch<'a> {
    /// Bucket and order the given elements. Elements with nothing to upload
    /// are left out.
    pub fn new<I>(elements: I) -> Self
    where
        I: IntoIterator<Item = &'a Element>,
    {
        let mut batch = Self::default();
        for element in elements {
            match Bucket::of(element) {
                Some(Bucket::Create) => batch.create.push(element),
                Some(Bucket::Modify) => batch.modify.push(element),
                Some(Bucket::Delete) => batch.delete.push(element),
                None => {}
            }
        }
        batch.create.sort_by_key(|e| e.element_type().rank());
        batch.modify.sort_by_key(|e| Reverse(e.element_type().rank()));
        batch.delete.sort_by_key(|e| Reverse(e.element_type().rank()));
        batch
    }

    /// Whether anything needs uploading at all
    pub fn has_changes(&self) -> bool {
        !self.is_empty()
    }

    /// Number of elements across all buckets
    pub fn len(&self) -> usize {
        self.create.len() + self.modify.len() + self.delete.len()
    }

    /// Whether every bucket is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements of one bucket, in upload order
    pub fn bucket(&self, bucket: Bucket) -> &[&'a Element] {
        match bucket {
            Bucket::Create => &self.create,
            Bucket::Modify => &self.modify,
            Bucket::Delete => &self.delete,
        }
    }

    /// Every element in the order it is written, which is also the order the
    /// server acknowledges them in.
    pub fn iter(&self) -> impl Iterator<Item = &'a Element> + '_ {
        self.create
            .iter()
            .chain(&self.modify)
            .chain(&self.delete)
            .copied()
    }

    /// Serialize the batch as an `osmChange` document for `changeset_id`.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, out)))]
    pub fn write_to<W: io::Write>(&self, changeset_id: i64, out: W) -> Result<(), WriteError> {
        let mut writer = Writer::new_with_indent(out, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("osmChange");
        root.push_attribute(("version", "0.6"));
        root.push_attribute(("generator", GENERATOR));
        if self.is_empty() {
            writer.write_event(Event::Empty(root))?;
            return Ok(());
        }
        writer.write_event(Event::Start(root))?;

        for bucket in [Bucket::Create, Bucket::Modify, Bucket::Delete] {
            let elements = self.bucket(bucket);
            if elements.is_empty() {
                continue;
            }
            writer.write_event(Event::Start(BytesStart::new(bucket.as_str())))?;
            for element in elements {
                write_element(&mut writer, element, changeset_id)?;
            }
            writer.write_event(Event::End(BytesEnd::new(bucket.as_str())))?;
        }

        writer.write_event(Event::End(BytesEnd::new("osmChange")))?;
        Ok(())
    }

    /// Serialize the batch into a fresh buffer.
    pub fn to_xml(&self, changeset_id: i64) -> Result<Vec<u8>, WriteError> {
        let mut out = Vec::new();
        self.write_to(changeset_id, &mut out)?;
        Ok(out)
    }
}

/// Serialize the document that opens a changeset with the given tags.
pub fn changeset_document(tags: &Tags) -> Result<Vec<u8>, WriteError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("osm")))?;
    if tags.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new("changeset")))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new("changeset")))?;
        for (key, value) in tags {
            let mut tag = BytesStart::new("tag");
            tag.push_attribute(("k", key.as_str()));
            tag.push_attribute(("v", value.as_str()));
            writer.write_event(Event::Empty(tag))?;
        }
        writer.write_event(Event::End(BytesEnd::new("changeset")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("osm")))?;
    Ok(writer.into_inner())
}

/// Plain decimal text for a coordinate.
///
/// `f64`'s `Display` never switches to exponent notation and prints the
/// shortest text that parses back to the same value.
pub fn format_coordinate(value: f64) -> String {
    value.to_string()
}

fn write_element<W: io::Write>(
    writer: &mut Writer<W>,
    element: &Element,
    changeset_id: i64,
) -> Result<(), WriteError> {
    let name = element.element_type().as_str();
    let mut start = BytesStart::new(name);
    start.push_attribute(("id", element.id().to_string().as_str()));
    start.push_attribute(("version", element.version().to_string().as_str()));
    start.push_attribute(("changeset", changeset_id.to_string().as_str()));
    if let Element::Node(node) = element {
        start.push_attribute(("lat", format_coordinate(node.position.lat()).as_str()));
        start.push_attribute(("lon", format_coordinate(node.position.lon()).as_str()));
    }

    let tags = element.tags().filter(|tags| !tags.is_empty());
    let has_children = tags.is_some()
        || match element {
            Element::Node(_) => false,
            Element::Way(way) => !way.node_ids.is_empty(),
            Element::Relation(relation) => !relation.members.is_empty(),
        };
    if !has_children {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;

    match element {
        Element::Node(_) => {}
        Element::Way(way) => {
            for node_id in &way.node_ids {
                let mut nd = BytesStart::new("nd");
                nd.push_attribute(("ref", node_id.to_string().as_str()));
                writer.write_event(Event::Empty(nd))?;
            }
        }
        Element::Relation(relation) => {
            for member in &relation.members {
                let mut tag = BytesStart::new("member");
                tag.push_attribute(("type", member.member_type().as_str()));
                tag.push_attribute(("ref", member.ref_id().to_string().as_str()));
                tag.push_attribute(("role", member.role()));
                writer.write_event(Event::Empty(tag))?;
            }
        }
    }

    for (key, value) in tags.into_iter().flatten() {
        let mut tag = BytesStart::new("tag");
        tag.push_attribute(("k", key.as_str()));
        tag.push_attribute(("v", value.as_str()));
        writer.write_event(Event::Empty(tag))?;
    }

    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
