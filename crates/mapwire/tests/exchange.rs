mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{NODE_XML, chunked, config, connection, delayed, response, tracked};
use http::Method;
use mapwire::connection::ApiConnection;
use mapwire::error::{AuthError, ConnectionError};
use mapwire::http_client::{ByteStream, HttpClient};
use mapwire::response::Discard;
use mapwire::types::{BoundingBox, ElementType, MapData};
use mapwire::{ApiError, AuthorizationToken, ErrorKind};

#[tokio::test]
async fn status_mapping_end_to_end() {
    let cases = [
        (409, ErrorKind::Conflict),
        (401, ErrorKind::AuthorizationFailed),
        (403, ErrorKind::AuthorizationFailed),
        (404, ErrorKind::NotFound),
        (410, ErrorKind::NotFound),
        (400, ErrorKind::BadUserInput),
        (418, ErrorKind::GenericClientError),
        (503, ErrorKind::ServiceUnavailable),
        (500, ErrorKind::Connection),
    ];
    let (connection, client) = connection();
    for (status, _) in cases {
        client.push(response(status, "server says no")).await;
    }

    for (status, kind) in cases {
        let err = connection
            .exchange(Method::GET, "node/1", false, None, Discard)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), kind, "status {status}");
        let http = err.http().expect("status-derived error carries the response");
        assert_eq!(http.status.as_u16(), status);
        assert_eq!(http.body.as_deref(), Some("server says no"));
    }
}

#[tokio::test]
async fn single_node_fetch() {
    let (connection, client) = connection();
    client.push(response(200, NODE_XML)).await;

    let node = connection
        .map_data()
        .get_node(246773347)
        .await
        .unwrap()
        .expect("node exists");
    assert_eq!(node.meta.version, 1);
    assert_eq!(node.position.lat(), 51.7463194);
    let changeset = node.meta.changeset.as_ref().unwrap();
    assert_eq!(changeset.id, 80692);
    assert_eq!(changeset.user.as_ref().unwrap().display_name, "Yeah");
    assert!(node.meta.tags.is_none());

    let log = client.take_log().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].method(), Method::GET);
    assert_eq!(
        log[0].uri().to_string(),
        "https://api.example.org/api/0.6/node/246773347"
    );
    assert!(log[0].headers().get("authorization").is_none());
}

#[tokio::test]
async fn not_found_and_gone_are_absent() {
    let (connection, client) = connection();
    client.push(response(404, "")).await;
    client.push(response(410, "")).await;
    client.push(response(404, "")).await;
    client.push(response(500, "boom")).await;

    let api = connection.map_data();
    assert!(api.get_way(5).await.unwrap().is_none());
    assert!(api.get_relation(6).await.unwrap().is_none());
    assert!(connection.changesets().get(7).await.unwrap().is_none());

    // only the not-found family is downgraded
    let err = api.get_node(8).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn listing_endpoints_use_element_paths() {
    let (connection, client) = connection();
    client
        .push(response(
            200,
            r#"<osm><way id="3" version="1"><nd ref="1"/></way></osm>"#,
        ))
        .await;
    client
        .push(response(
            200,
            r#"<osm><relation id="4" version="2"><member type="way" ref="3" role=""/></relation></osm>"#,
        ))
        .await;

    let api = connection.map_data();
    let ways = api.get_ways_for_node(1).await.unwrap();
    assert_eq!(ways.len(), 1);
    assert_eq!(ways[0].node_ids, vec![1]);

    let relations = api
        .get_relations_for_element(ElementType::Way, 3)
        .await
        .unwrap();
    assert_eq!(relations[0].members[0].ref_id(), 3);

    let paths: Vec<String> = client
        .take_log()
        .await
        .iter()
        .map(|r| r.uri().path().to_owned())
        .collect();
    assert_eq!(paths, vec!["/api/0.6/node/1/ways", "/api/0.6/way/3/relations"]);
}

#[tokio::test]
async fn map_query_rejects_antimeridian_boxes_locally() {
    let (connection, client) = connection();
    let crossing = BoundingBox::from_coords(-10.0, 170.0, 10.0, -170.0).unwrap();
    let mut data = MapData::default();

    let err = connection
        .map_data()
        .get_map(&crossing, &mut data)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(client.take_log().await.is_empty());

    for half in crossing.split_at_antimeridian() {
        client.push(response(200, "<osm/>")).await;
        connection.map_data().get_map(&half, &mut data).await.unwrap();
    }
    let queries: Vec<String> = client
        .take_log()
        .await
        .iter()
        .map(|r| r.uri().query().unwrap_or_default().to_owned())
        .collect();
    assert_eq!(queries, vec!["bbox=170,-10,180,10", "bbox=-180,-10,-170,10"]);
}

#[tokio::test]
async fn missing_signer_is_authorization_failure() {
    let (connection, client) = connection();
    let err = connection.changesets().close(5).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::AuthorizationFailed(AuthError::NotAuthenticated)
    ));
    assert!(client.take_log().await.is_empty());

    connection
        .set_signer(Some(Arc::new(AuthorizationToken::Bearer("t0ken".into()))))
        .await;
    client.push(response(200, "")).await;
    connection.changesets().close(5).await.unwrap();
    let log = client.take_log().await;
    assert_eq!(log[0].method(), Method::PUT);
    assert_eq!(log[0].headers()["authorization"], "Bearer t0ken");
}

#[tokio::test]
async fn body_is_released_on_every_path() {
    let (connection, client) = connection();

    let (ok, released) = tracked(200, NODE_XML);
    client.push(ok).await;
    connection.map_data().get_node(246773347).await.unwrap();
    assert!(released.get());

    let (malformed, released) = tracked(200, "<osm><node id=\"1\" lat=\"x\" lon=\"0\"/></osm>");
    client.push(malformed).await;
    let err = connection.map_data().get_node(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert!(released.get());

    let (failed, released) = tracked(409, "conflict");
    client.push(failed).await;
    let err = connection
        .exchange(Method::GET, "node/1", false, None, Discard)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(released.get());
}

#[tokio::test]
async fn stalled_body_is_a_connection_error() {
    let (connection, client) = connection();
    connection.set_read_timeout(Duration::from_millis(30)).await;
    client
        .push(delayed(
            "<osm><node id=\"1\" lat=\"0\" lon=\"0\"/>",
            Duration::from_secs(5),
            "</osm>",
        ))
        .await;

    let mut data = MapData::default();
    let bounds = BoundingBox::from_coords(-1.0, -1.0, 1.0, 1.0).unwrap();
    let err = connection
        .map_data()
        .get_map(&bounds, &mut data)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Connection(ConnectionError::Io(_))), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.kind().is_retryable());
    // what arrived before the stall was still delivered
    assert_eq!(data.nodes.len(), 1);
}

#[derive(Clone, Copy)]
struct StalledClient;

impl HttpClient for StalledClient {
    type Error = std::convert::Infallible;

    fn send_http(
        &self,
        _request: http::Request<bytes::Bytes>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<ByteStream>, Self::Error>,
    > + Send {
        futures::future::pending()
    }
}

#[tokio::test]
async fn unanswered_request_times_out() {
    let connection = ApiConnection::new(StalledClient, config());
    connection.set_connect_timeout(Duration::from_millis(20)).await;
    let err = connection
        .exchange(Method::GET, "capabilities", false, None, Discard)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::Connection(ConnectionError::Timeout)
    ));
}

#[tokio::test]
async fn in_flight_exchange_keeps_its_snapshot() {
    let (connection, client) = connection();
    client
        .push(delayed("<osm>", Duration::from_millis(150), "</osm>"))
        .await;

    let mut data = MapData::default();
    let bounds = BoundingBox::from_coords(-1.0, -1.0, 1.0, 1.0).unwrap();
    let api = connection.map_data();
    let (result, ()) = tokio::join!(
        api.get_map(&bounds, &mut data),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            connection.set_read_timeout(Duration::from_millis(10)).await;
        }
    );
    result.unwrap();

    // the next exchange sees the new timeout
    client
        .push(delayed("<osm>", Duration::from_millis(150), "</osm>"))
        .await;
    let err = api.get_map(&bounds, &mut data).await.unwrap_err();
    assert!(matches!(err, ApiError::Connection(ConnectionError::Io(_))), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn concurrent_exchanges_share_one_connection() {
    let (connection, client) = connection();
    for _ in 0..4 {
        client.push(chunked(200, vec!["<osm>", "</osm>"])).await;
    }
    let connection = Arc::new(connection);

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let connection = connection.clone();
            tokio::spawn(async move {
                let mut data = MapData::default();
                let bounds = BoundingBox::from_coords(0.0, 0.0, 1.0, i as f64 + 1.0).unwrap();
                connection.map_data().get_map(&bounds, &mut data).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(client.take_log().await.len(), 4);
}
