//! Minimal HTTP/1.1 server speaking just enough of the Snowflake REST API for the CLI.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const LOGIN: &str = "/session/v1/login-request";
pub const AUTHENTICATOR: &str = "/session/authenticator-request";
pub const QUERY: &str = "/queries/v1/query-request";
pub const ABORT: &str = "/queries/v1/abort-request";
pub const CLOSE: &str = "/session";

pub enum Reply {
    Json(String),
    /// Keep the connection open without ever answering
    Hang,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub query: String,
    pub body: String,
}

type Handler = dyn Fn(&str) -> Reply + Send + Sync;

pub struct MockSnowflake {
    pub addr: SocketAddr,
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

impl MockSnowflake {
    pub async fn start<H>(handler: H) -> Self
    where
        H: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let log = Arc::clone(&recorded);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve(stream, Arc::clone(&handler), Arc::clone(&log)));
            }
        });

        MockSnowflake { addr, recorded }
    }

    pub fn args(&self, extra: &[&str]) -> Vec<String> {
        let port = self.addr.port().to_string();
        let mut argv: Vec<String> = [
            "snowflake-query",
            "--snowflake.account",
            "acc",
            "--snowflake.user",
            "bob",
            "--snowflake.protocol",
            "http",
            "--snowflake.host",
            "127.0.0.1",
            "--snowflake.port",
            &port,
            "--snowflake.max.retry.count",
            "-1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        argv.extend(extra.iter().map(|s| s.to_string()));
        argv
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.recorded().into_iter().map(|r| r.path).collect()
    }
}

async fn serve(mut stream: TcpStream, handler: Arc<Handler>, log: Arc<Mutex<Vec<Recorded>>>) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    let reply = handler(&request.path);
    log.lock().unwrap().push(request);

    match reply {
        Reply::Json(body) => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
        Reply::Hang => std::future::pending::<()>().await,
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let target = head.lines().next()?.split_whitespace().nth(1)?.to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target, String::new()),
    };

    Some(Recorded {
        path,
        query,
        body: String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn login_ok() -> Reply {
    Reply::Json(
        serde_json::json!({
            "data": {
                "token": "session-token",
                "masterToken": "master-token",
                "validityInSeconds": 3600,
                "masterValidityInSeconds": 14400,
                "sessionId": 42,
            },
            "code": null,
            "message": null,
            "success": true,
        })
        .to_string(),
    )
}

pub fn sso_ok(sso_url: &str, proof_key: &str) -> Reply {
    Reply::Json(
        serde_json::json!({
            "data": {
                "tokenUrl": null,
                "ssoUrl": sso_url,
                "proofKey": proof_key,
            },
            "code": null,
            "message": null,
            "success": true,
        })
        .to_string(),
    )
}

pub fn empty_ok() -> Reply {
    Reply::Json(
        serde_json::json!({"data": null, "code": null, "message": null, "success": true})
            .to_string(),
    )
}

pub fn json_rows(columns: &[&str], rows: serde_json::Value) -> Reply {
    let returned = rows.as_array().map(Vec::len).unwrap_or_default();
    let rowtype: Vec<_> = columns
        .iter()
        .map(|name| {
            serde_json::json!({
                "name": name,
                "type": "text",
                "length": 16777216,
                "byteLength": 16777216,
                "nullable": true,
            })
        })
        .collect();

    Reply::Json(
        serde_json::json!({
            "data": {
                "rowtype": rowtype,
                "rowset": rows,
                "total": returned,
                "returned": returned,
                "queryId": "01b2c3d4-0000-0001-0000-000000000001",
            },
            "code": null,
            "message": null,
            "success": true,
        })
        .to_string(),
    )
}

pub fn error(code: &str, message: &str) -> Reply {
    Reply::Json(
        serde_json::json!({
            "data": {"errorCode": code, "internalError": false},
            "code": code,
            "message": message,
            "success": false,
        })
        .to_string(),
    )
}
