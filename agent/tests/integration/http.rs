//! Minimal scripted HTTP server for adapter tests.

#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

/// Raw requests received, in order.
pub type Requests = Arc<Mutex<Vec<String>>>;

/// Serve `responses` to consecutive connections, one each, then stop.
/// Returns the port and the log of received requests.
pub fn serve(responses: Vec<Vec<u8>>) -> (u16, Requests) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let requests: Requests = Arc::default();
    let log = requests.clone();
    std::thread::spawn(move || {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            log.lock().unwrap().push(read_request(&mut stream));
            let _ = stream.write_all(&response);
        }
    });
    (port, requests)
}

/// Read headers plus a `Content-Length` body.
fn read_request(stream: &mut impl Read) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let Ok(n) = stream.read(&mut buf) else { break };
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&data);
        if let Some(end) = text.find("\r\n\r\n") {
            let body_len = text[..end]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if data.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

pub fn http_status(code: u16, reason: &str) -> Vec<u8> {
    format!("HTTP/1.1 {code} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
        .into_bytes()
}

pub fn http_body(code: u16, reason: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

pub fn http_ok(body: &[u8]) -> Vec<u8> {
    http_body(200, "OK", "application/octet-stream", body)
}

pub fn http_json(body: &serde_json::Value) -> Vec<u8> {
    http_body(200, "OK", "application/json", body.to_string().as_bytes())
}
