mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::*;
use docmill::engine::Engine;
use docmill::server::router;
use tower::ServiceExt;

const BOUNDARY: &str = "docmill-test-boundary";

enum Part<'a> {
    File(&'a str, &'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

fn multipart(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File(name, file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(body: Body) -> serde_json::Value {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_lists_every_engine() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let h = Harness::new(&cfg, fake_toolset(&cfg));
    let app = router(h.orchestrator.clone(), &cfg.server);

    let res = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engines"].as_array().unwrap().len(), Engine::ALL.len());

    h.stop().await;
}

#[tokio::test]
async fn convert_streams_the_artifact_as_an_attachment() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let h = Harness::new(&cfg, fake_toolset(&cfg));
    let app = router(h.orchestrator.clone(), &cfg.server);

    let req = multipart(
        "/convert",
        &[
            Part::File("file", "memo.docx", b"memo body"),
            Part::Text("to", "pdf"),
        ],
    );
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        res.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"result.pdf\""
    );
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"memo body");
    assert_eq!(h.live_workspaces(), 0);

    h.stop().await;
}

#[tokio::test]
async fn unsupported_conversion_is_a_400() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let h = Harness::new(&cfg, fake_toolset(&cfg));
    let app = router(h.orchestrator.clone(), &cfg.server);

    let req = multipart(
        "/convert",
        &[
            Part::File("file", "clip.pdf", b"%PDF"),
            Part::Text("from", "pdf"),
            Part::Text("to", "mp4"),
        ],
    );
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json_body(res.into_body()).await;
    assert_eq!(body["error"], "unsupported");
    assert_eq!(h.live_workspaces(), 0);

    h.stop().await;
}

#[tokio::test]
async fn missing_fields_are_a_400() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let h = Harness::new(&cfg, fake_toolset(&cfg));
    let app = router(h.orchestrator.clone(), &cfg.server);

    let no_target = multipart("/convert", &[Part::File("file", "a.docx", b"x")]);
    let res = app.clone().oneshot(no_target).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let one_file = multipart("/merge", &[Part::File("files", "a.pdf", b"%PDF")]);
    let res = app.clone().oneshot(one_file).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let no_file = multipart("/compress", &[Part::Text("angle", "90")]);
    let res = app.oneshot(no_file).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.live_workspaces(), 0);

    h.stop().await;
}

#[tokio::test]
async fn engine_failure_is_a_500_with_the_diagnostic() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let toolset = fake_toolset(&cfg).with_converter(Engine::Compression, ExitsWithOne);
    let h = Harness::new(&cfg, toolset);
    let app = router(h.orchestrator.clone(), &cfg.server);

    let req = multipart("/compress", &[Part::File("file", "big.pdf", b"%PDF")]);
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(res.into_body()).await;
    assert_eq!(body["error"], "conversion_failed");
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("boom: corrupt input")
    );
    assert_eq!(h.live_workspaces(), 0);

    h.stop().await;
}

#[tokio::test]
async fn merge_and_rotate_routes_reach_the_orchestrator() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let toolset = fake_toolset(&cfg).with_converter(Engine::Page, EchoOptions);
    let h = Harness::new(&cfg, toolset);
    let app = router(h.orchestrator.clone(), &cfg.server);

    let req = multipart(
        "/merge",
        &[
            Part::File("files", "same.pdf", b"%PDF"),
            Part::File("files", "same.pdf", b"%PDF"),
        ],
    );
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"pdf:2");

    let req = multipart(
        "/rotate",
        &[
            Part::File("file", "deck.pdf", b"%PDF"),
            Part::Text("angle", "180"),
        ],
    );
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let seen = String::from_utf8_lossy(&bytes);
    assert!(seen.contains("angle=180"), "{seen}");

    let req = multipart(
        "/rotate",
        &[
            Part::File("file", "deck.pdf", b"%PDF"),
            Part::Text("angle", "33"),
        ],
    );
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.live_workspaces(), 0);

    h.stop().await;
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = test_config(tmp.path());
    cfg.server.convert_limit_bytes = 1024;
    let h = Harness::new(&cfg, fake_toolset(&cfg));
    let app = router(h.orchestrator.clone(), &cfg.server);

    let big = vec![b'a'; 4096];
    let req = multipart(
        "/convert",
        &[Part::File("file", "a.txt", &big), Part::Text("to", "pdf")],
    );
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(h.live_workspaces(), 0);

    h.stop().await;
}
