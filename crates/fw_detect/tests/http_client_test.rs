use std::io::Read;
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use fw_core::{ApiConfig, EncodedFrame, ErrorKind, FloorWatchError, FramePayload, Transport};
use fw_detect::{DetectionClient, Detector};

/// 一条被 mock 服务端收到的请求
struct Captured {
    method: String,
    url: String,
    content_type: Option<String>,
    body: Vec<u8>,
}

struct Reply {
    status: u16,
    body: &'static str,
    delay: Duration,
}

fn reply(status: u16, body: &'static str) -> Reply {
    Reply {
        status,
        body,
        delay: Duration::ZERO,
    }
}

/// 启动一个按顺序返回预设响应的 mock 服务端
fn serve(replies: Vec<Reply>) -> (String, mpsc::Receiver<Captured>) {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for reply in replies {
            let mut request = match server.recv() {
                Ok(request) => request,
                Err(_) => return,
            };
            let mut body = Vec::new();
            let _ = request.as_reader().read_to_end(&mut body);
            let content_type = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Content-Type"))
                .map(|h| h.value.as_str().to_string());
            let _ = tx.send(Captured {
                method: request.method().to_string(),
                url: request.url().to_string(),
                content_type,
                body,
            });

            thread::sleep(reply.delay);
            let response = tiny_http::Response::from_string(reply.body)
                .with_status_code(reply.status)
                .with_header(
                    "Content-Type: application/json"
                        .parse::<tiny_http::Header>()
                        .unwrap(),
                );
            let _ = request.respond(response);
        }
    });

    (format!("http://{addr}"), rx)
}

fn client(base_url: &str, transport: Transport) -> DetectionClient {
    DetectionClient::new(&ApiConfig {
        base_url: base_url.to_string(),
        timeout_secs: 5,
        transport,
        notes: Some("kitchen".to_string()),
    })
    .unwrap()
}

fn frame() -> EncodedFrame {
    EncodedFrame::new(
        FramePayload::Jpeg(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x10, 0x20, 0xFF, 0xD9]),
        640,
        480,
        0.9,
    )
}

#[tokio::test]
async fn test_detect_json_transport() {
    let (base, rx) = serve(vec![reply(
        200,
        r#"{"id": 11, "is_dirty": true, "confidence": 0.92, "created_at": "2024-06-01T12:00:00"}"#,
    )]);
    let client = client(&base, Transport::Json);

    let result = client.detect(frame()).await.unwrap();
    assert_eq!(result.id, 11);
    assert!(result.is_dirty);
    assert_eq!(result.label(), "dirty");

    let captured = rx.recv().unwrap();
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.url, "/detect/frame");
    assert!(captured
        .content_type
        .unwrap_or_default()
        .starts_with("application/json"));

    let body: serde_json::Value = serde_json::from_slice(&captured.body).unwrap();
    assert_eq!(body["image_base64"], frame().payload.to_base64());
    assert_eq!(body["notes"], "kitchen");
}

#[tokio::test]
async fn test_detect_multipart_transport() {
    let (base, rx) = serve(vec![reply(
        200,
        r#"{"id": 12, "is_dirty": false, "confidence": 0.3, "created_at": "2024-06-01T12:00:05Z"}"#,
    )]);
    let client = client(&base, Transport::Multipart);

    let result = client.detect(frame()).await.unwrap();
    assert_eq!(result.id, 12);
    assert_eq!(result.label(), "clean");

    let captured = rx.recv().unwrap();
    assert!(captured
        .content_type
        .unwrap_or_default()
        .starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&captured.body);
    assert!(body.contains(r#"name="file"; filename="frame.jpg""#));
    assert!(body.contains("image/jpeg"));
    assert!(body.contains(r#"name="notes""#));
}

#[tokio::test]
async fn test_server_errors_are_classified() {
    let (base, _rx) = serve(vec![
        reply(503, r#"{"detail": "Model not loaded"}"#),
        reply(422, r#"{"detail": [{"loc": ["body", "image_base64"], "msg": "field required"}]}"#),
        reply(200, "not json at all"),
    ]);
    let client = client(&base, Transport::Json);

    let err = client.detect(frame()).await.unwrap_err();
    assert_eq!(
        err,
        FloorWatchError::ServiceUnavailable {
            status: 503,
            detail: "Model not loaded".to_string()
        }
    );
    assert!(err.is_transient());

    let err = client.detect(frame()).await.unwrap_err();
    assert_eq!(
        err,
        FloorWatchError::Request {
            status: 422,
            detail: "field required".to_string()
        }
    );
    assert!(!err.is_transient());

    let err = client.detect(frame()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
}

#[tokio::test]
async fn test_unreachable_service_is_network_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = client(&format!("http://127.0.0.1:{port}"), Transport::Json);

    let err = client.detect(frame()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let (base, _rx) = serve(vec![Reply {
        status: 200,
        body: r#"{"id": 1, "is_dirty": false, "confidence": 0.5}"#,
        delay: Duration::from_secs(3),
    }]);
    let client = DetectionClient::new(&ApiConfig {
        base_url: base,
        timeout_secs: 1,
        transport: Transport::Json,
        notes: None,
    })
    .unwrap();

    let err = client.detect(frame()).await.unwrap_err();
    assert!(matches!(err, FloorWatchError::Network(ref msg) if msg.contains("no response")));
}

#[tokio::test]
async fn test_health_and_history() {
    let (base, rx) = serve(vec![
        reply(200, r#"{"status": "healthy", "service": "floor-detector"}"#),
        reply(
            200,
            r#"[{"id": 5, "source": "mobile", "is_dirty": true, "confidence": 0.81, "notes": null, "created_at": "2024-06-01T09:30:00"},
                {"id": 4, "source": "upload", "is_dirty": false, "confidence": null, "notes": "hall", "created_at": null}]"#,
        ),
    ]);
    let client = client(&base, Transport::Json);

    let health = client.health().await.unwrap();
    assert!(health.is_healthy());
    assert_eq!(rx.recv().unwrap().url, "/health");

    let items = client.history(2, 0).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, 5);
    assert_eq!(items[1].notes.as_deref(), Some("hall"));

    let captured = rx.recv().unwrap();
    assert_eq!(captured.method, "GET");
    assert_eq!(captured.url, "/history?limit=2&offset=0");
}
