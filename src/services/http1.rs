// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const MAX_HEAD_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// One parsed HTTP/1.1 request. Only what the gateway's listeners need:
/// method, path, a couple of headers, and the full body.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

pub async fn read_request(stream: &mut TcpStream) -> Result<HttpRequest, AppError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(AppError::Decode("request head too large".into()));
        }
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| AppError::Connection(format!("request read failed: {e}")))?;
        if n == 0 {
            return Err(AppError::Connection("connection closed mid-request".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines
        .next()
        .ok_or_else(|| AppError::Decode("empty request".into()))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| AppError::Decode("missing method".into()))?
        .to_string();
    let path = parts
        .next()
        .ok_or_else(|| AppError::Decode("missing path".into()))?
        .to_string();

    let mut content_length = 0usize;
    let mut content_type = None;
    let mut authorization = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.to_ascii_lowercase().as_str() {
            "content-length" => {
                content_length = value
                    .parse()
                    .map_err(|_| AppError::Decode("bad content-length".into()))?;
            }
            "content-type" => content_type = Some(value.to_string()),
            "authorization" => authorization = Some(value.to_string()),
            _ => {}
        }
    }
    if content_length > MAX_BODY_BYTES {
        return Err(AppError::Decode("request body too large".into()));
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| AppError::Connection(format!("body read failed: {e}")))?;
        if n == 0 {
            return Err(AppError::Connection("connection closed mid-body".into()));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(HttpRequest {
        method,
        path,
        content_type,
        authorization,
        body,
    })
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

pub async fn write_response(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &[u8],
) {
    write_response_with_headers(stream, status, &[("Content-Type", content_type)], body).await;
}

/// Response with caller-supplied headers, used to mirror an upstream reply.
/// Length and connection framing are always ours.
pub async fn write_response_with_headers(
    stream: &mut TcpStream,
    status: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) {
    let mut head = format!("HTTP/1.1 {}\r\n", status);
    for (name, value) in headers {
        let lowered = name.to_ascii_lowercase();
        if matches!(
            lowered.as_str(),
            "content-length" | "connection" | "transfer-encoding"
        ) {
            continue;
        }
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    ));
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(body).await;
}

pub async fn write_text(stream: &mut TcpStream, status: &str, body: &str) {
    write_response(stream, status, "text/plain", body.as_bytes()).await;
}

pub async fn write_json(stream: &mut TcpStream, status: &str, body: &serde_json::Value) {
    write_response(stream, status, "application/json", body.to_string().as_bytes()).await;
}
