use crate::types::bounds::BoundingBox;
use crate::types::element::{ElementMeta, Node, Relation, Way};

/// One decoded unit of a map data response.
///
/// Responses carry at most one bounds record followed by nodes, ways and
/// relations; decoders emit them in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEntity {
    /// The area the response covers
    Bounds(BoundingBox),
    /// See [`Node`]
    Node(Node),
    /// See [`Way`]
    Way(Way),
    /// See [`Relation`]
    Relation(Relation),
}

impl MapEntity {
    /// Element state, `None` for bounds.
    pub fn meta(&self) -> Option<&ElementMeta> {
        match self {
            Self::Bounds(_) => None,
            Self::Node(n) => Some(&n.meta),
            Self::Way(w) => Some(&w.meta),
            Self::Relation(r) => Some(&r.meta),
        }
    }
}

/// Receiver for streamed map entities.
pub trait MapDataSink {
    /// Called once per entity as soon as its closing tag is decoded.
    fn accept(&mut self, entity: MapEntity);
}

impl<F> MapDataSink for F
where
    F: FnMut(MapEntity),
{
    fn accept(&mut self, entity: MapEntity) {
        self(entity)
    }
}

/// A sink that simply keeps everything it receives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapData {
    /// Bounds record, if the response had one
    pub bounds: Option<BoundingBox>,
    /// Nodes in document order
    pub nodes: Vec<Node>,
    /// Ways in document order
    pub ways: Vec<Way>,
    /// Relations in document order
    pub relations: Vec<Relation>,
}

impl MapData {
    /// Number of elements collected, bounds excluded
    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }

    /// Whether no element was collected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MapDataSink for MapData {
    fn accept(&mut self, entity: MapEntity) {
        match entity {
            MapEntity::Bounds(b) => self.bounds = Some(b),
            MapEntity::Node(n) => self.nodes.push(n),
            MapEntity::Way(w) => self.ways.push(w),
            MapEntity::Relation(r) => self.relations.push(r),
        }
    }
}
