//! Stdio JSON-RPC transport to the backend process.
//!
//! Requests are correlated to responses through a pending map of oneshot
//! senders keyed by request id. The background stdout reader resolves them;
//! on EOF or read error every pending request fails with `TransportClosed`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};

use crate::error::McpError;
use crate::types::McpServerConfig;

const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

pub(crate) const PROTOCOL_VERSION: &str = "2024-11-05";

type PendingResponse = oneshot::Sender<Result<Value, McpError>>;
type PendingMap = HashMap<u64, PendingResponse>;
type SharedPendingMap = Arc<Mutex<PendingMap>>;

pub(crate) struct McpConnection {
    child: Child,
    stdin: ChildStdin,
    pending: SharedPendingMap,
    next_id: AtomicU64,
}

impl McpConnection {
    pub(crate) async fn spawn(config: &McpServerConfig) -> Result<Self, McpError> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| McpError::SpawnFailed {
            command: config.command.clone(),
            message: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::SpawnFailed {
            command: config.command.clone(),
            message: "failed to capture stdin".to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| McpError::SpawnFailed {
            command: config.command.clone(),
            message: "failed to capture stdout".to_string(),
        })?;

        let pending = Arc::new(Mutex::new(HashMap::new()));
        spawn_stdout_loop(stdout, pending.clone());

        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_loop(stderr);
        }

        Ok(Self {
            child,
            stdin,
            pending,
            next_id: AtomicU64::new(1),
        })
    }

    /// Run the MCP `initialize` handshake and confirm it with the
    /// `notifications/initialized` notification.
    pub(crate) async fn initialize(&mut self, timeout: Duration) -> Result<(), McpError> {
        let init_result = self
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}, "resources": {}},
                    "clientInfo": {"name": "parley", "version": env!("CARGO_PKG_VERSION")}
                })),
                timeout,
            )
            .await
            .map_err(|e| McpError::Handshake(e.to_string()))?;

        if init_result.get("protocolVersion").is_none() {
            return Err(McpError::Handshake(
                "initialize response missing protocolVersion".to_string(),
            ));
        }

        self.notify("notifications/initialized", None).await
    }

    pub(crate) async fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params.unwrap_or_else(|| json!({}))
        });

        let payload =
            serde_json::to_vec(&request).map_err(|e| McpError::Serialization(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.write_line(&payload).await {
            let _ = self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::TransportClosed),
            Err(_) => {
                let _ = self.pending.lock().await.remove(&id);
                Err(McpError::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    pub(crate) async fn notify(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), McpError> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or_else(|| json!({}))
        });

        let payload = serde_json::to_vec(&notification)
            .map_err(|e| McpError::Serialization(e.to_string()))?;

        self.write_line(&payload).await
    }

    async fn write_line(&mut self, payload: &[u8]) -> Result<(), McpError> {
        self.stdin
            .write_all(payload)
            .await
            .map_err(|_| McpError::TransportClosed)?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|_| McpError::TransportClosed)?;
        self.stdin
            .flush()
            .await
            .map_err(|_| McpError::TransportClosed)?;
        Ok(())
    }

    pub(crate) async fn shutdown(&mut self) {
        let _ = self.stdin.shutdown().await;
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

fn spawn_stdout_loop(mut stdout: ChildStdout, pending: SharedPendingMap) {
    tokio::spawn(async move {
        let mut buffer = Vec::<u8>::new();
        let mut read_buf = [0u8; 8192];

        loop {
            match stdout.read(&mut read_buf).await {
                Ok(0) => {
                    fail_all_pending(&pending).await;
                    break;
                }
                Ok(n) => {
                    buffer.extend_from_slice(&read_buf[..n]);
                    while let Some(message_bytes) = extract_message(&mut buffer) {
                        if message_bytes.is_empty() {
                            continue;
                        }
                        dispatch_message(&message_bytes, &pending).await;
                    }
                }
                Err(_) => {
                    fail_all_pending(&pending).await;
                    break;
                }
            }
        }
    });
}

async fn dispatch_message(message_bytes: &[u8], pending: &SharedPendingMap) {
    let parsed: Value = match serde_json::from_slice(message_bytes) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse backend message");
            return;
        }
    };

    // Server-initiated notifications carry no id; nothing to correlate.
    let Some(id) = parsed.get("id").and_then(Value::as_u64) else {
        return;
    };

    if let Some(error) = parsed.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();

        if let Some(tx) = pending.lock().await.remove(&id) {
            let _ = tx.send(Err(McpError::Protocol { code, message }));
        }
        return;
    }

    if let Some(result) = parsed.get("result") {
        if let Some(tx) = pending.lock().await.remove(&id) {
            let _ = tx.send(Ok(result.clone()));
        }
    }
}

fn spawn_stderr_loop(stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!("backend stderr: {}", line);
        }
    });
}

async fn fail_all_pending(pending: &SharedPendingMap) {
    let mut lock = pending.lock().await;
    let mut drained = HashMap::new();
    std::mem::swap(&mut *lock, &mut drained);
    drop(lock);

    for (_, tx) in drained {
        let _ = tx.send(Err(McpError::TransportClosed));
    }
}

/// Pull one complete message off the front of `buffer`, supporting both
/// newline-delimited JSON and Content-Length framed messages.
fn extract_message(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    loop {
        while matches!(buffer.first(), Some(b'\n' | b'\r')) {
            buffer.remove(0);
        }

        if buffer.is_empty() {
            return None;
        }

        if starts_with_content_length(buffer) {
            let (header_end, delimiter_len) = find_header_end(buffer)?;
            let headers = String::from_utf8_lossy(&buffer[..header_end]);
            let mut content_length: Option<usize> = None;
            for line in headers.lines() {
                let lower = line.to_ascii_lowercase();
                if let Some(rest) = lower.strip_prefix("content-length:") {
                    content_length = rest.trim().parse::<usize>().ok();
                    break;
                }
            }

            let content_length = content_length?;
            if content_length > MAX_MESSAGE_SIZE {
                buffer.clear();
                return None;
            }
            let body_start = header_end + delimiter_len;
            if buffer.len() < body_start + content_length {
                return None;
            }

            let body = buffer[body_start..body_start + content_length].to_vec();
            buffer.drain(..body_start + content_length);
            return Some(body);
        }

        let newline_pos = buffer.iter().position(|b| *b == b'\n')?;
        let mut line = buffer[..newline_pos].to_vec();
        buffer.drain(..=newline_pos);

        while matches!(line.last(), Some(b'\r')) {
            line.pop();
        }

        if line.is_empty() {
            continue;
        }

        return Some(line);
    }
}

fn starts_with_content_length(buffer: &[u8]) -> bool {
    let prefix = b"content-length:";
    if buffer.len() < prefix.len() {
        return false;
    }

    buffer[..prefix.len()]
        .iter()
        .zip(prefix.iter())
        .all(|(a, b)| a.to_ascii_lowercase() == *b)
}

fn find_header_end(buffer: &[u8]) -> Option<(usize, usize)> {
    if let Some(pos) = find_subsequence(buffer, b"\r\n\r\n") {
        return Some((pos, 4));
    }
    if let Some(pos) = find_subsequence(buffer, b"\n\n") {
        return Some((pos, 2));
    }
    None
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
