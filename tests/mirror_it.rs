//! End-to-end mirror pass against mocked platform APIs.
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use skymirror::bluesky::{BlueskyClient, BlueskyPublisher};
use skymirror::cursor::CursorStore;
use skymirror::pipeline;
use skymirror::twitter::TwitterClient;

const BEARER: &str = "test-bearer";

async fn mount_source(server: &MockServer, timeline: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/2/users/by/username/someone"))
        .and(header("authorization", format!("Bearer {BEARER}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "4242", "name": "Someone", "username": "someone" }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/users/4242/tweets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(timeline))
        .mount(server)
        .await;
}

async fn mount_destination(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessJwt": "jwt-abc",
            "refreshJwt": "jwt-refresh",
            "did": "did:plc:mirror",
            "handle": "mirror.example.com"
        })))
        .mount(server)
        .await;
    // Specific failure case first: the blob store rejects this body.
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.uploadBlob"))
        .and(body_string_contains("REJECTME"))
        .respond_with(ResponseTemplate::new(500).set_body_string("blob store down"))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.uploadBlob"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "blob": {
                "$type": "blob",
                "ref": { "$link": "bafy-uploaded" },
                "mimeType": "image/jpeg",
                "size": 9
            }
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.createRecord"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uri": "at://did:plc:mirror/app.bsky.feed.post/1",
            "cid": "bafy-record"
        })))
        .mount(server)
        .await;
}

async fn mount_media(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/m/ok.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(b"GOODIMAGE".to_vec()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/m/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/m/bad.gif"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/gif")
                .set_body_bytes(b"REJECTME!".to_vec()),
        )
        .mount(server)
        .await;
}

async fn created_records(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|req| req.url.path() == "/xrpc/com.atproto.repo.createRecord")
        .map(|req| serde_json::from_slice(&req.body).unwrap())
        .collect()
}

#[tokio::test]
async fn full_pass_mirrors_in_order_with_degraded_media() {
    let server = MockServer::start().await;
    let base = server.uri();
    let timeline = json!({
        "data": [
            {
                "id": "7",
                "text": "second https://t.co/zzz",
                "created_at": "2024-05-02T09:00:00.000Z",
                "attachments": { "media_keys": ["3_ok", "3_missing", "3_bad"] }
            },
            {
                "id": "6",
                "text": "first post",
                "created_at": "2024-05-01T09:00:00.000Z"
            }
        ],
        "includes": {
            "media": [
                { "media_key": "3_ok", "type": "photo", "url": format!("{base}/m/ok.jpg") },
                { "media_key": "3_missing", "type": "photo", "url": format!("{base}/m/missing.png") },
                { "media_key": "3_bad", "type": "photo", "url": format!("{base}/m/bad.gif") }
            ]
        }
    });
    mount_source(&server, timeline).await;
    mount_destination(&server).await;
    mount_media(&server).await;

    let td = tempdir().unwrap();
    let scratch = td.path().join("scratch");
    std::fs::create_dir_all(&scratch).unwrap();
    let store = CursorStore::new(td.path().join("cursor.txt"));

    let source = TwitterClient::with_base_url(BEARER.into(), "someone".into(), base.clone());
    let client = BlueskyClient::new(base.clone());
    let publisher = BlueskyPublisher::login(client, "me@example.com", "hunter2", &scratch)
        .await
        .unwrap();

    let summary = pipeline::run(&source, &publisher, &store).await.unwrap();
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.published, 2);
    assert_eq!(summary.cursor, Some(7));
    assert_eq!(store.read(), Some(7));

    // Oldest first, and the media-degraded post still went out with the
    // one surviving image.
    let records = created_records(&server).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["record"]["text"], "first post");
    assert!(records[0]["record"].get("embed").is_none());
    assert_eq!(records[1]["record"]["text"], "second");
    let images = records[1]["record"]["embed"]["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["alt"], "Image");
    assert_eq!(images[0]["image"]["ref"]["$link"], "bafy-uploaded");
    assert_eq!(records[1]["repo"], "did:plc:mirror");

    // No scratch file may outlive a publish call, success or failure.
    let leftovers: Vec<_> = std::fs::read_dir(&scratch).unwrap().collect();
    assert!(leftovers.is_empty(), "scratch files leaked: {leftovers:?}");
}

#[tokio::test]
async fn forbidden_source_degrades_to_empty_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/by/username/someone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "4242", "name": "Someone", "username": "someone" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/users/4242/tweets"))
        .respond_with(ResponseTemplate::new(403).set_body_string("suspended"))
        .mount(&server)
        .await;

    let source = TwitterClient::with_base_url(BEARER.into(), "someone".into(), server.uri());
    let posts = source.fetch_new(Some(4)).await.unwrap();
    assert!(posts.is_empty());
}

#[tokio::test]
async fn unknown_user_resolves_to_user_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/by/username/ghost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "title": "Not Found Error" }]
        })))
        .mount(&server)
        .await;

    let source = TwitterClient::with_base_url(BEARER.into(), "ghost".into(), server.uri());
    let err = source.fetch_new(None).await.unwrap_err();
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn media_download_maps_content_type_and_fails_on_404() {
    let server = MockServer::start().await;
    mount_media(&server).await;

    let td = tempdir().unwrap();
    let http = reqwest::Client::new();

    let asset = skymirror::media::download(&http, &format!("{}/m/ok.jpg", server.uri()), td.path())
        .await
        .unwrap();
    assert_eq!(asset.content_type, "image/jpeg");
    assert_eq!(asset.path.extension().and_then(|e| e.to_str()), Some("jpg"));
    assert_eq!(std::fs::read(&asset.path).unwrap(), b"GOODIMAGE");
    asset.remove().await;

    let err = skymirror::media::download(
        &http,
        &format!("{}/m/missing.png", server.uri()),
        td.path(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn truncated_download_leaves_no_scratch_file() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Declare a large body, send a few bytes, then close the connection.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: image/jpeg\r\ncontent-length: 1000000\r\n\r\ntwelve bytes",
            )
            .await;
    });

    let td = tempdir().unwrap();
    let http = reqwest::Client::new();
    let err = skymirror::media::download(&http, &format!("http://{addr}/img.jpg"), td.path())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        skymirror::media::MediaDownloadError::Transport(_)
    ));

    let leftovers: Vec<_> = std::fs::read_dir(td.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "scratch files leaked: {leftovers:?}");
}
