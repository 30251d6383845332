//! MCP over a child process's stdio, one JSON message per line.
//!
//! Two background tasks own the pipes. The writer task sends whole lines
//! from a channel; the reader task routes each response to the request
//! waiting on its id. A caller that gives up (timeout, cancellation) only
//! drops its waiter, so no partial line is ever left on either pipe.

use super::protocol::{self, McpError, McpTool, INIT_TIMEOUT, MAX_MESSAGE_BYTES};
use crate::config::McpServerConfig;
use crate::llm::ToolContent;
use crate::runtime::{ToolBackend, ToolCallError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type Reply = Result<Value, McpError>;

/// Requests awaiting a response, keyed by JSON-RPC id
#[derive(Default)]
struct Pending {
    waiters: HashMap<u64, oneshot::Sender<Reply>>,
    /// Set once the server's stdout has ended
    closed: bool,
}

type SharedPending = Arc<Mutex<Pending>>;

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a waiter whose request ended without a reply
struct WaiterGuard<'a> {
    pending: &'a Mutex<Pending>,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).waiters.remove(&self.id);
    }
}

/// JSON-RPC client for one locally spawned MCP server
pub struct StdioClient {
    name: String,
    outgoing: mpsc::UnboundedSender<String>,
    pending: SharedPending,
    next_id: AtomicU64,
    request_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
    _child: Mutex<Option<Child>>,
}

impl StdioClient {
    /// Spawn the server process and complete the MCP handshake.
    pub async fn spawn(
        name: &str,
        config: &McpServerConfig,
        request_timeout: Duration,
    ) -> Result<Self, McpError> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(McpError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Protocol("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Protocol("stdout not captured".to_string()))?;

        // Surface server diagnostics in our logs
        if let Some(stderr) = child.stderr.take() {
            let server = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        tracing::warn!(mcp_server = %server, "{}", line.trim_end());
                    }
                }
            });
        }

        let client = Self::from_streams(
            name,
            stdin,
            stdout,
            request_timeout,
            MAX_MESSAGE_BYTES,
            Some(child),
        );
        client.initialize().await?;
        Ok(client)
    }

    fn from_streams(
        name: &str,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        reader: impl AsyncRead + Send + Unpin + 'static,
        request_timeout: Duration,
        max_message_bytes: usize,
        child: Option<Child>,
    ) -> Self {
        let (outgoing, lines) = mpsc::unbounded_channel();
        let pending = SharedPending::default();
        let tasks = vec![
            tokio::spawn(write_loop(name.to_string(), writer, lines)),
            tokio::spawn(read_loop(
                name.to_string(),
                BufReader::new(reader),
                Arc::clone(&pending),
                max_message_bytes,
            )),
        ];
        Self {
            name: name.to_string(),
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            tasks,
            _child: Mutex::new(child),
        }
    }

    async fn initialize(&self) -> Result<(), McpError> {
        self.request_within("initialize", protocol::initialize_params(), INIT_TIMEOUT)
            .await?;
        self.send(&protocol::notification("notifications/initialized", json!({})))
    }

    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        protocol::parse_tool_list(self.request("tools/list", json!({})).await?)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        self.request_within(method, params, self.request_timeout)
            .await
    }

    async fn request_within(
        &self,
        method: &str,
        params: Value,
        after: Duration,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (waiter, reply) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(McpError::Closed);
            }
            pending.waiters.insert(id, waiter);
        }
        let _waiter = WaiterGuard {
            pending: &self.pending,
            id,
        };

        self.send(&protocol::request(id, method, params))?;
        match tokio::time::timeout(after, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::Closed),
            Err(_) => Err(McpError::Timeout {
                method: method.to_string(),
                after,
            }),
        }
    }

    /// Queue one message; the writer task puts it on the pipe whole
    fn send(&self, message: &Value) -> Result<(), McpError> {
        let mut line =
            serde_json::to_string(message).map_err(|e| McpError::Protocol(e.to_string()))?;
        line.push('\n');
        self.outgoing.send(line).map_err(|_| McpError::Closed)
    }
}

impl Drop for StdioClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::debug!(mcp_server = %self.name, "MCP client dropped");
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    server: String,
    mut writer: W,
    mut lines: mpsc::UnboundedReceiver<String>,
) {
    while let Some(line) = lines.recv().await {
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            tracing::warn!(mcp_server = %server, error = %e, "Failed to write to MCP server");
            break;
        }
    }
}

async fn read_loop<R: AsyncRead + AsyncBufRead + Unpin>(
    server: String,
    mut reader: R,
    pending: SharedPending,
    max_message_bytes: usize,
) {
    let mut buf = Vec::new();
    loop {
        match read_frame(&mut reader, &mut buf, max_message_bytes).await {
            Ok(Frame::Message) => route(&server, &buf, &pending),
            Ok(Frame::Oversized(bytes)) => {
                // The id is inside the dropped bytes; its caller times out
                tracing::warn!(
                    mcp_server = %server,
                    bytes,
                    limit = max_message_bytes,
                    "Dropped oversized message"
                );
            }
            Ok(Frame::Eof) => break,
            Err(e) => {
                tracing::warn!(mcp_server = %server, error = %e, "Failed to read from MCP server");
                break;
            }
        }
    }

    let mut pending = lock(&pending);
    pending.closed = true;
    for (_, waiter) in pending.waiters.drain() {
        let _ = waiter.send(Err(McpError::Closed));
    }
    tracing::info!(mcp_server = %server, "MCP server closed its output");
}

#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// `buf` holds one complete line
    Message,
    /// A line longer than the limit was skipped; its total size
    Oversized(usize),
    Eof,
}

/// Read one line into `buf`, never buffering more than `limit + 1` bytes.
async fn read_frame<R: AsyncRead + AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<Frame> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);

    buf.clear();
    let read = (&mut *reader).take(cap).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() == Some(&b'\n') || buf.len() <= limit {
        return Ok(Frame::Message);
    }

    let mut skipped = buf.len();
    loop {
        buf.clear();
        let read = (&mut *reader).take(cap).read_until(b'\n', buf).await?;
        skipped += read;
        if read == 0 || buf.last() == Some(&b'\n') {
            buf.clear();
            return Ok(Frame::Oversized(skipped));
        }
    }
}

fn route(server: &str, line: &[u8], pending: &Mutex<Pending>) {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    let message: Value = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(mcp_server = %server, error = %e, "Unparseable message from MCP server");
            return;
        }
    };
    let Some(id) = protocol::response_id(&message) else {
        tracing::debug!(mcp_server = %server, "Skipping notification");
        return;
    };

    let waiter = lock(pending).waiters.remove(&id);
    match waiter {
        Some(waiter) => {
            let _ = waiter.send(protocol::into_result(message));
        }
        None => tracing::debug!(mcp_server = %server, id, "Reply to an abandoned request"),
    }
}

#[async_trait]
impl ToolBackend for StdioClient {
    async fn call_tool(
        &self,
        tool: &str,
        args: Map<String, Value>,
    ) -> Result<Vec<ToolContent>, ToolCallError> {
        let result = self
            .request("tools/call", json!({"name": tool, "arguments": args}))
            .await
            .map_err(|e| ToolCallError::Backend(e.to_string()))?;
        protocol::parse_call_result(result)
    }
}
