//! Typed endpoints on top of [`ApiConnection`].

use bytes::Bytes;
use http::Method;
use mapwire_common::error::ApiError;
use mapwire_common::http_client::HttpClient;
use mapwire_common::types::{
    BoundingBox, ChangesetInfo, DiffElement, Element, ElementType, MapData, MapDataSink, Node,
    Relation, Tags, Way,
};
use mapwire_common::{ApiResult, ErrorKind};
use mapwire_xml::{ChangesetBatch, changeset_document};

use crate::connection::ApiConnection;
use crate::response::{
    ChangesetInfoResponse, DiffResponse, Discard, IdResponse, MapDataResponse,
};

impl<C: HttpClient + Sync> ApiConnection<C> {
    /// Read access to map data
    pub fn map_data(&self) -> MapDataApi<'_, C> {
        MapDataApi { connection: self }
    }

    /// Changeset management and uploads
    pub fn changesets(&self) -> ChangesetApi<'_, C> {
        ChangesetApi { connection: self }
    }
}

/// Queries for elements and areas.
#[derive(Debug)]
pub struct MapDataApi<'a, C> {
    connection: &'a ApiConnection<C>,
}

impl<C: HttpClient + Sync> MapDataApi<'_, C> {
    /// Stream everything inside `bounds` into `sink`.
    ///
    /// Boxes crossing the antimeridian are rejected; query each half from
    /// [`BoundingBox::split_at_antimeridian`] instead.
    pub async fn get_map<S>(&self, bounds: &BoundingBox, sink: &mut S) -> ApiResult<()>
    where
        S: MapDataSink + Send + ?Sized,
    {
        if bounds.crosses_antimeridian() {
            return Err(ApiError::InvalidInput(format!(
                "bounding box {} crosses the antimeridian, split it first",
                bounds.to_query_value()
            )));
        }
        let path = format!("map?bbox={}", bounds.to_query_value());
        self.connection
            .exchange(Method::GET, &path, false, None, MapDataResponse(sink))
            .await
    }

    /// The current version of a node, `None` if it does not exist or was deleted.
    pub async fn get_node(&self, id: i64) -> ApiResult<Option<Node>> {
        Ok(self
            .get_element(ElementType::Node, id)
            .await?
            .and_then(|data| data.nodes.into_iter().find(|n| n.meta.id == id)))
    }

    /// The current version of a way, `None` if it does not exist or was deleted.
    pub async fn get_way(&self, id: i64) -> ApiResult<Option<Way>> {
        Ok(self
            .get_element(ElementType::Way, id)
            .await?
            .and_then(|data| data.ways.into_iter().find(|w| w.meta.id == id)))
    }

    /// The current version of a relation, `None` if it does not exist or was deleted.
    pub async fn get_relation(&self, id: i64) -> ApiResult<Option<Relation>> {
        Ok(self
            .get_element(ElementType::Relation, id)
            .await?
            .and_then(|data| data.relations.into_iter().find(|r| r.meta.id == id)))
    }

    /// Every way that uses the given node.
    pub async fn get_ways_for_node(&self, node_id: i64) -> ApiResult<Vec<Way>> {
        let mut data = MapData::default();
        let path = format!("node/{node_id}/ways");
        self.connection
            .exchange(Method::GET, &path, false, None, MapDataResponse(&mut data))
            .await?;
        Ok(data.ways)
    }

    /// Every relation that has the given element as a member.
    pub async fn get_relations_for_element(
        &self,
        element_type: ElementType,
        id: i64,
    ) -> ApiResult<Vec<Relation>> {
        let mut data = MapData::default();
        let path = format!("{element_type}/{id}/relations");
        self.connection
            .exchange(Method::GET, &path, false, None, MapDataResponse(&mut data))
            .await?;
        Ok(data.relations)
    }

    async fn get_element(&self, element_type: ElementType, id: i64) -> ApiResult<Option<MapData>> {
        let mut data = MapData::default();
        let path = format!("{element_type}/{id}");
        let result = self
            .connection
            .exchange(Method::GET, &path, false, None, MapDataResponse(&mut data))
            .await;
        match result {
            Ok(()) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Opening, closing, querying and uploading to changesets.
#[derive(Debug)]
pub struct ChangesetApi<'a, C> {
    connection: &'a ApiConnection<C>,
}

impl<C: HttpClient + Sync> ChangesetApi<'_, C> {
    /// Open a changeset with the given tags and return its id.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn open(&self, tags: &Tags) -> ApiResult<i64> {
        let body = Bytes::from(changeset_document(tags)?);
        self.connection
            .exchange(Method::PUT, "changeset/create", true, Some(body), IdResponse)
            .await
    }

    /// Close a changeset. Further uploads to it are rejected with a conflict.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self)))]
    pub async fn close(&self, id: i64) -> ApiResult<()> {
        let path = format!("changeset/{id}/close");
        self.connection
            .exchange(Method::PUT, &path, true, None, Discard)
            .await
    }

    /// A changeset with its discussion, `None` if it does not exist.
    pub async fn get(&self, id: i64) -> ApiResult<Option<ChangesetInfo>> {
        let path = format!("changeset/{id}?include_discussion=true");
        let result = self
            .connection
            .exchange(Method::GET, &path, false, None, ChangesetInfoResponse)
            .await;
        match result {
            Ok(infos) => Ok(infos.into_iter().find(|info| info.id == id)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Upload a batch to an open changeset.
    ///
    /// The returned records are in the same order as [`ChangesetBatch::iter`],
    /// so the n-th record belongs to the n-th uploaded element.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, batch), fields(elements = batch.len())))]
    pub async fn upload(&self, id: i64, batch: &ChangesetBatch<'_>) -> ApiResult<Vec<DiffElement>> {
        let body = Bytes::from(batch.to_xml(id)?);
        let path = format!("changeset/{id}/upload");
        self.connection
            .exchange(Method::POST, &path, true, Some(body), DiffResponse)
            .await
    }
}

/// Outcome of [`upload_changes`].
#[derive(Debug)]
pub struct Upload {
    /// The changeset that was opened for the upload
    pub changeset_id: i64,
    /// Acknowledgements in upload order
    pub diffs: Vec<DiffElement>,
    /// Set when the upload went through but closing the changeset failed.
    /// The server closes idle changesets on its own eventually.
    pub close_error: Option<ApiError>,
}

/// Upload local edits in a changeset of their own.
///
/// Nothing is sent when no element carries a change, and `Ok(None)` is
/// returned. Otherwise a changeset is opened with `tags`, the batch uploaded,
/// and the changeset closed again, also when the upload failed. Nothing is
/// retried.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
pub async fn upload_changes<'e, C, I>(
    connection: &ApiConnection<C>,
    tags: &Tags,
    elements: I,
) -> ApiResult<Option<Upload>>
where
    C: HttpClient + Sync,
    I: IntoIterator<Item = &'e Element>,
{
    let batch = ChangesetBatch::new(elements);
    if !batch.has_changes() {
        return Ok(None);
    }

    let api = connection.changesets();
    let changeset_id = api.open(tags).await?;
    let uploaded = api.upload(changeset_id, &batch).await;
    let closed = api.close(changeset_id).await;

    match uploaded {
        Ok(diffs) => Ok(Some(Upload {
            changeset_id,
            diffs,
            close_error: closed.err(),
        })),
        Err(e) => {
            #[cfg(feature = "tracing")]
            if let Err(close_error) = &closed {
                tracing::warn!(changeset_id, error = %close_error, "could not close changeset after failed upload");
            }
            Err(e)
        }
    }
}
