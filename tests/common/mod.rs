//! Framed JSON-RPC client for driving the server over an in-memory pipe.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{duplex, split, AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use questline::mcp::framing::{encode_frame, FrameDecoder};
use questline::mcp::{serve_framed, McpServer};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub struct Client {
    pub reader: ReadHalf<DuplexStream>,
    pub writer: WriteHalf<DuplexStream>,
    pub server: JoinHandle<anyhow::Result<()>>,
    decoder: FrameDecoder,
    unclaimed: VecDeque<Value>,
    next_id: i64,
    /// Result of the `initialize` handshake.
    pub init: Value,
}

impl Client {
    /// Spawn `service` on a duplex pipe without initializing.
    pub fn connect(service: McpServer) -> Self {
        let (client_io, server_io) = duplex(64 * 1024);
        let (server_read, server_write) = split(server_io);
        let server = tokio::spawn(serve_framed(service, server_read, server_write));

        let (reader, writer) = split(client_io);
        Self {
            reader,
            writer,
            server,
            decoder: FrameDecoder::new(),
            unclaimed: VecDeque::new(),
            next_id: 1000,
            init: Value::Null,
        }
    }

    /// Spawn `service` and complete the MCP handshake.
    pub async fn start(service: McpServer) -> Self {
        let mut client = Self::connect(service);
        client.handshake().await;
        client
    }

    pub async fn handshake(&mut self) {
        let response = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": "questline-tests", "version": "0" },
                }),
            )
            .await;
        assert!(response.get("result").is_some(), "initialize failed: {}", response);
        self.init = response["result"].clone();
        self.send(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write");
        self.writer.flush().await.expect("flush");
    }

    pub async fn send(&mut self, message: Value) {
        let body = serde_json::to_vec(&message).expect("json");
        self.send_raw(&encode_frame(&body)).await;
    }

    /// Next frame from the server, in arrival order.
    pub async fn recv(&mut self) -> Value {
        if let Some(value) = self.unclaimed.pop_front() {
            return value;
        }
        tokio::time::timeout(Duration::from_secs(5), read_frame(&mut self.reader, &mut self.decoder))
            .await
            .expect("response within five seconds")
    }

    /// Next frame answering `id`; other frames are kept for later `recv`s.
    pub async fn recv_id(&mut self, id: &Value) -> Value {
        if let Some(pos) = self.unclaimed.iter().position(|v| &v["id"] == id) {
            return self.unclaimed.remove(pos).expect("position is in range");
        }
        loop {
            let value = tokio::time::timeout(
                Duration::from_secs(5),
                read_frame(&mut self.reader, &mut self.decoder),
            )
            .await
            .expect("response within five seconds");
            if &value["id"] == id {
                return value;
            }
            self.unclaimed.push_back(value);
        }
    }

    pub async fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = json!(self.next_id);
        let mut message = json!({ "jsonrpc": "2.0", "id": id, "method": method });
        if !params.is_null() {
            message["params"] = params;
        }
        self.send(message).await;
        self.recv_id(&id).await
    }

    /// Call a tool that must succeed; returns its structured result.
    pub async fn call(&mut self, name: &str, arguments: Value) -> Value {
        let response = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await;
        assert!(response.get("error").is_none(), "{} failed: {}", name, response);
        assert_eq!(response["result"]["isError"], json!(false), "{}", response);
        response["result"]["structuredContent"].clone()
    }

    /// Call a tool that must fail; returns the JSON-RPC error object.
    pub async fn call_err(&mut self, name: &str, arguments: Value) -> Value {
        let response = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await;
        assert!(response.get("result").is_none(), "{} unexpectedly succeeded: {}", name, response);
        response["error"].clone()
    }
}

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, decoder: &mut FrameDecoder) -> Value {
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(frame) = decoder.next_frame() {
            let body = frame.expect("server writes well-formed frames");
            return serde_json::from_slice(&body).expect("json body");
        }
        let n = reader.read(&mut chunk).await.expect("read");
        assert!(n > 0, "server closed the stream early");
        decoder.extend(&chunk[..n]);
    }
}

/// [`Client`] driven from synchronous test bodies.
pub struct BlockingClient {
    rt: Runtime,
    client: Client,
}

impl BlockingClient {
    pub fn start(service: McpServer) -> Self {
        let rt = Runtime::new().expect("tokio runtime");
        let client = rt.block_on(Client::start(service));
        Self { rt, client }
    }

    pub fn init(&self) -> &Value {
        &self.client.init
    }

    pub fn send(&mut self, message: Value) {
        self.rt.block_on(self.client.send(message))
    }

    pub fn recv(&mut self) -> Value {
        self.rt.block_on(self.client.recv())
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.rt.block_on(self.client.request(method, params))
    }

    pub fn call(&mut self, name: &str, arguments: Value) -> Value {
        self.rt.block_on(self.client.call(name, arguments))
    }

    pub fn call_err(&mut self, name: &str, arguments: Value) -> Value {
        self.rt.block_on(self.client.call_err(name, arguments))
    }
}
