mod common;

use actix_web::web::Bytes;
use futures_util::StreamExt;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use common::{doctor, seeded_store, state_with};
use imaging_hub::conf::{AppSettings, ImagingSettings};
use imaging_hub::error::AppError;
use imaging_hub::modules::directory::models::{EndpointRef, ResolutionSource};
use imaging_hub::modules::imaging::models::{ImagingOp, OpBody, OpKind, OpMethod, OpRequest, RoutedResponse};
use imaging_hub::modules::imaging::{AccessRouter, RouteError};

const DICOM: &[u8] = b"DICM\x00\x01\x02\x03 fake instance payload";

/// 最小的 HTTP/1.1 假归档 / Minimal HTTP/1.1 fake archive
async fn spawn_archive() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream));
        }
    });
    format!("http://{}", addr)
}

/// 已关闭端口的地址 / Address of a port nobody listens on
async fn refused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn serve(mut stream: TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("").to_string();
    let path = request_line.next().unwrap_or("").to_string();
    let mut content_length = 0usize;
    let mut content_type = String::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            match k.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = v.trim().parse().unwrap_or(0),
                "content-type" => content_type = v.trim().to_string(),
                _ => {}
            }
        }
    }
    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
        }
    }

    let (status, ctype, payload): (&str, &str, Vec<u8>) = match (method.as_str(), path.as_str()) {
        ("GET", "/system") => (
            "200 OK",
            "application/json",
            json!({ "Name": "Orthanc", "Version": "1.12.1" }).to_string().into_bytes(),
        ),
        ("GET", "/patients") => ("200 OK", "application/json", b"[\"p1\",\"p2\"]".to_vec()),
        ("GET", "/instances/abc123/file") => ("200 OK", "application/dicom", DICOM.to_vec()),
        ("GET", "/instances/missing") => (
            "404 Not Found",
            "application/json",
            json!({ "HttpError": "Not Found", "HttpStatus": 404, "Message": "Unknown resource" })
                .to_string()
                .into_bytes(),
        ),
        ("GET", "/broken") => ("500 Internal Server Error", "text/plain", b"archive exploded".to_vec()),
        ("POST", "/instances") => (
            "200 OK",
            "application/json",
            json!({ "ID": "new-instance", "Size": body.len(), "ContentType": content_type })
                .to_string()
                .into_bytes(),
        ),
        (_, "/hang") => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return;
        }
        _ => ("404 Not Found", "text/plain", Vec::new()),
    };
    let header = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        ctype,
        payload.len()
    );
    let _ = stream.write_all(header.as_bytes()).await;
    let _ = stream.write_all(&payload).await;
    let _ = stream.shutdown().await;
}

fn settings() -> ImagingSettings {
    ImagingSettings {
        request_timeout_ms: 800,
        probe_timeout_ms: 300,
        ..ImagingSettings::default()
    }
}

fn endpoint(base_url: &str) -> EndpointRef {
    EndpointRef {
        hospital_id: Some("h1".to_string()),
        base_url: base_url.to_string(),
        source: ResolutionSource::ImageOrigin,
    }
}

fn get(base_url: &str, kind: OpKind, path: &str) -> ImagingOp {
    ImagingOp::new(kind, OpMethod::Get, endpoint(base_url), path)
}

async fn collect(routed: RoutedResponse) -> (Option<String>, Vec<u8>) {
    match routed {
        RoutedResponse::Stream {
            content_type, mut stream, ..
        } => {
            let mut out = Vec::new();
            while let Some(chunk) = stream.next().await {
                out.extend_from_slice(&chunk.unwrap());
            }
            (content_type, out)
        }
        other => panic!("expected a stream, got {:?}", other),
    }
}

#[tokio::test]
async fn probe_reports_archive_system() {
    let base = spawn_archive().await;
    let router = AccessRouter::new(&settings()).unwrap();
    let status = router.probe(&endpoint(&base)).await.unwrap();
    assert!(status.reachable);
    assert_eq!(status.hospital_id.as_deref(), Some("h1"));
    assert_eq!(status.system.unwrap()["Name"], "Orthanc");
}

#[tokio::test]
async fn json_response_is_parsed() {
    let base = spawn_archive().await;
    let router = AccessRouter::new(&settings()).unwrap();
    match router.route_operation(get(&base, OpKind::Metadata, "/patients")).await.unwrap() {
        RoutedResponse::Json { status, body } => {
            assert_eq!(status, 200);
            assert_eq!(body, json!(["p1", "p2"]));
        }
        other => panic!("expected json, got {:?}", other),
    }
}

#[tokio::test]
async fn binary_response_streams_verbatim() {
    let base = spawn_archive().await;
    let router = AccessRouter::new(&settings()).unwrap();
    let routed = router
        .route_operation(get(&base, OpKind::FetchBinary, "/instances/abc123/file"))
        .await
        .unwrap();
    assert_eq!(routed.status(), 200);
    let (content_type, bytes) = collect(routed).await;
    assert_eq!(content_type.as_deref(), Some("application/dicom"));
    assert_eq!(bytes, DICOM);
}

#[tokio::test]
async fn upstream_4xx_keeps_status_and_envelope() {
    let base = spawn_archive().await;
    let router = AccessRouter::new(&settings()).unwrap();
    let err = router
        .route_operation(get(&base, OpKind::Metadata, "/instances/missing"))
        .await
        .unwrap_err();
    match err {
        RouteError::Rejected { status, envelope } => {
            assert_eq!(status, 404);
            assert_eq!(envelope.error, "Unknown resource");
            assert_eq!(envelope.details["HttpStatus"], 404);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn upstream_plain_text_error_is_wrapped() {
    let base = spawn_archive().await;
    let router = AccessRouter::new(&settings()).unwrap();
    let err = router
        .route_operation(get(&base, OpKind::Metadata, "/broken"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RouteError::Rejected { status: 500, ref envelope } if envelope.error == "archive exploded"
    ));
}

#[tokio::test]
async fn refused_connection_is_unavailable() {
    let base = refused_endpoint().await;
    let router = AccessRouter::new(&settings()).unwrap();
    let err = router
        .route_operation(get(&base, OpKind::Metadata, "/system"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::Unavailable { .. }), "{:?}", err);
}

#[tokio::test]
async fn hung_archive_times_out() {
    let base = spawn_archive().await;
    let router = AccessRouter::new(&settings()).unwrap();
    let started = Instant::now();
    let err = router
        .route_operation(get(&base, OpKind::Metadata, "/hang"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::Timeout { .. }), "{:?}", err);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn probe_uses_its_own_short_deadline() {
    let base = spawn_archive().await;
    let router = AccessRouter::new(&ImagingSettings {
        probe_path: "/hang".to_string(),
        ..settings()
    })
    .unwrap();
    let started = Instant::now();
    let err = router.probe(&endpoint(&base)).await.unwrap_err();
    assert!(matches!(err, RouteError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_millis(800));
}

#[tokio::test]
async fn upload_preserves_content_type() {
    let base = spawn_archive().await;
    let router = AccessRouter::new(&settings()).unwrap();
    let op = ImagingOp::new(OpKind::UploadBinary, OpMethod::Post, endpoint(&base), "/instances").with_body(
        OpBody::Bytes {
            data: Bytes::from_static(DICOM),
            content_type: Some("application/dicom".to_string()),
        },
    );
    match router.route_operation(op).await.unwrap() {
        RoutedResponse::Json { body, .. } => {
            assert_eq!(body["Size"], DICOM.len());
            assert_eq!(body["ContentType"], "application/dicom");
        }
        other => panic!("expected json, got {:?}", other),
    }
}

#[tokio::test]
async fn rejected_path_never_reaches_network() {
    let router = AccessRouter::new(&settings()).unwrap();
    for path in ["/../secrets", "http://evil.example/x", "//evil.example/x", "instances"] {
        let err = router
            .route_operation(get("http://127.0.0.1:9", OpKind::Metadata, path))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidRequest { .. }), "{} accepted", path);
    }
}

#[tokio::test]
async fn grantee_fetches_bytes_from_origin_archive() {
    let h1 = spawn_archive().await;
    let h2 = refused_endpoint().await;
    let store = seeded_store(&h1, &h2);
    let state = state_with(
        store,
        AppSettings {
            imaging: settings(),
            ..AppSettings::default()
        },
    );
    state.ledger.grant_share(&doctor("doc-a"), "doc-b", "img-001").await.unwrap();

    let routed = state
        .gateway
        .proxy(
            &doctor("doc-b"),
            OpRequest {
                path: "/instances/abc123/file".to_string(),
                method: "GET".to_string(),
                body: None,
                image_id: Some("img-001".to_string()),
                kind: None,
            },
        )
        .await
        .unwrap();
    let (_, bytes) = collect(routed).await;
    assert_eq!(bytes, DICOM);
}

#[tokio::test]
async fn origin_down_is_unavailable_or_timeout_not_unresolved() {
    let down = refused_endpoint().await;
    let hung = spawn_archive().await;
    let state = state_with(
        seeded_store(&down, &hung),
        AppSettings {
            imaging: settings(),
            ..AppSettings::default()
        },
    );

    let endpoint = state
        .directory
        .resolve_endpoint(Some("doc-a"), Some("img-001"))
        .await
        .unwrap();
    assert_eq!(endpoint.base_url, down);

    let req = |path: &str| OpRequest {
        path: path.to_string(),
        method: "GET".to_string(),
        body: None,
        image_id: None,
        kind: Some(OpKind::Metadata),
    };
    let err = state.gateway.proxy(&doctor("doc-a"), req("/system")).await.unwrap_err();
    assert!(matches!(err, AppError::Imaging(RouteError::Unavailable { .. })), "{:?}", err);
    let err = state.gateway.proxy(&doctor("doc-b"), req("/hang")).await.unwrap_err();
    assert!(matches!(err, AppError::Imaging(RouteError::Timeout { .. })), "{:?}", err);
}
