//! The HTTP inference client and notifier against a canned loopback server.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;
use std::time::Duration;

use guardian_agent::{DetectionService, HttpDetectionService, Notifier};

/// Accept one connection, capture the request body, answer with the given
/// status and body.
fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let join = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let request = read_request(&mut stream);
        let response = format!(
            "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).expect("write response");
        request
    });
    (format!("http://{}", addr), join)
}

fn read_request(stream: &mut TcpStream) -> String {
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("read timeout");
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    let mut content_length: Option<usize> = None;
    let mut header_end: Option<usize> = None;
    loop {
        let n = stream.read(&mut buf).expect("read request");
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);

        if header_end.is_none() {
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                header_end = Some(pos + 4);
                let headers = String::from_utf8_lossy(&data[..pos]);
                content_length = headers
                    .lines()
                    .find(|l| l.to_lowercase().starts_with("content-length:"))
                    .and_then(|l| l.split(':').nth(1))
                    .and_then(|v| v.trim().parse().ok());
            }
        }
        if let (Some(end), Some(len)) = (header_end, content_length) {
            if data.len() >= end + len {
                return String::from_utf8_lossy(&data[end..end + len]).into_owned();
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

#[test]
fn analyze_posts_contract_fields_and_parses_response() {
    let (endpoint, join) = serve_once(
        "HTTP/1.1 200 OK",
        r#"{"detections":[{"incident":"person fallen","emergency_level":"high","summary":"Fall detected.","suggestion":"Call for help."}],"danger":true}"#,
    );

    let service = HttpDetectionService::new(&endpoint, Duration::from_secs(2));
    let outcome = service
        .analyze(b"\xFF\xD8fake-jpeg\xFF\xD9", "Kitchen", 1_700_000_000_000)
        .expect("analyze");

    assert!(outcome.danger);
    assert_eq!(outcome.detections[0].incident, "person fallen");

    let request_body = join.join().expect("server thread");
    let parsed: serde_json::Value = serde_json::from_str(&request_body).expect("request json");
    assert_eq!(parsed["location"], "Kitchen");
    assert_eq!(parsed["time"], 1_700_000_000_000u64);
    // The image travels base64-encoded.
    let image = parsed["base64_image"].as_str().expect("base64_image");
    assert!(!image.is_empty());
    assert!(!image.contains(|c: char| c == '{' || c == '"'));
}

#[test]
fn non_success_status_is_an_error() {
    let (endpoint, join) = serve_once("HTTP/1.1 500 Internal Server Error", r#"{"error":"boom"}"#);
    let service = HttpDetectionService::new(&endpoint, Duration::from_secs(2));
    let result = service.analyze(b"img", "Kitchen", 0);
    assert!(result.is_err());
    join.join().expect("server thread");
}

#[test]
fn malformed_payload_is_an_error() {
    let (endpoint, join) = serve_once("HTTP/1.1 200 OK", "not json at all");
    let service = HttpDetectionService::new(&endpoint, Duration::from_secs(2));
    let result = service.analyze(b"img", "Kitchen", 0);
    assert!(result.is_err());
    join.join().expect("server thread");
}

#[test]
fn unreachable_service_is_an_error_not_a_panic() {
    // Nothing listens on this port after the listener is dropped.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let service = HttpDetectionService::new(&format!("http://{}", addr), Duration::from_millis(500));
    assert!(service.analyze(b"img", "Kitchen", 0).is_err());
}

#[test]
fn notifier_reports_endpoint_rejection() {
    let (endpoint, join) = serve_once(
        "HTTP/1.1 200 OK",
        r#"{"success":false,"error":"no pager configured"}"#,
    );
    let notifier = Notifier::new(&endpoint, Duration::from_secs(2));
    let response = notifier.send("Guardian Alert: test").expect("send");
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("no pager configured"));

    let request_body = join.join().expect("server thread");
    let parsed: serde_json::Value = serde_json::from_str(&request_body).expect("request json");
    assert_eq!(parsed["message"], "Guardian Alert: test");
}

#[test]
fn notifier_success_roundtrip() {
    let (endpoint, join) = serve_once("HTTP/1.1 200 OK", r#"{"success":true}"#);
    let notifier = Notifier::new(&endpoint, Duration::from_secs(2));
    let response = notifier.send("ping").expect("send");
    assert!(response.success);
    assert!(response.error.is_none());
    join.join().expect("server thread");
}
