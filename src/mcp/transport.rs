//! `Content-Length` framed stdio transport for the rmcp service.
//!
//! [`FrameCodec`] turns frames into JSON-RPC messages and back. [`framed`]
//! splits a reader and writer into the sink and stream pair rmcp serves over.
//! rmcp runs each request as its own task, so a slow tool call never holds up
//! the ones behind it. Replies may leave in any order; clients match on `id`.
//! A single writer task owns the output, which keeps frames from interleaving.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::stream::{self, BoxStream};
use futures::{SinkExt, StreamExt};
use rmcp::model::{ClientJsonRpcMessage, JsonRpcMessage, ServerJsonRpcMessage};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tokio_util::sync::PollSender;

use super::framing::{encode_frame, FrameDecoder};

const OUTBOUND_QUEUE: usize = 64;

/// How long end of input waits for in-flight replies before giving up.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Methods the server answers. A request for one of these that rmcp cannot
/// decode has bad params; anything else is an unknown method.
const KNOWN_METHODS: &[&str] = &["initialize", "ping", "tools/list", "tools/call"];

const INVALID_PARAMS: i64 = -32602;
const METHOD_NOT_FOUND: i64 = -32601;

/// One decoded input frame.
#[derive(Debug)]
pub enum Inbound {
    Message(ClientJsonRpcMessage),
    /// A request rmcp cannot serve, with the error reply owed to the client.
    Rejected(ServerJsonRpcMessage),
}

/// Codec over [`FrameDecoder`]. Malformed frames and bodies are logged and
/// skipped so one bad message never ends the session.
#[derive(Debug, Default)]
pub struct FrameCodec {
    frames: FrameDecoder,
}

impl Decoder for FrameCodec {
    type Item = Inbound;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, io::Error> {
        if !src.is_empty() {
            self.frames.extend(&src.split());
        }
        while let Some(frame) = self.frames.next_frame() {
            match frame {
                Ok(body) => {
                    if let Some(inbound) = parse_body(&body) {
                        return Ok(Some(inbound));
                    }
                }
                Err(e) => tracing::warn!("Dropping malformed frame: {}", e),
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, io::Error> {
        if let Some(inbound) = self.decode(src)? {
            return Ok(Some(inbound));
        }
        if self.frames.buffered() > 0 {
            tracing::debug!(
                "Input closed with {} bytes of an incomplete frame",
                self.frames.buffered()
            );
        }
        Ok(None)
    }
}

impl Encoder<ServerJsonRpcMessage> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ServerJsonRpcMessage, dst: &mut BytesMut) -> Result<(), io::Error> {
        let body = serde_json::to_vec(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        dst.extend_from_slice(&encode_frame(&body));
        Ok(())
    }
}

fn parse_body(body: &[u8]) -> Option<Inbound> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Dropping unparseable body: {}", e);
            return None;
        }
    };
    if value.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        tracing::warn!("Dropping message without jsonrpc \"2.0\": {}", value);
        return None;
    }

    let id = value.get("id").filter(|id| !id.is_null()).cloned();
    let method = value
        .get("method")
        .and_then(Value::as_str)
        .map(str::to_owned);

    match serde_json::from_value::<ClientJsonRpcMessage>(value) {
        Ok(message) => Some(Inbound::Message(message)),
        Err(e) => {
            let (Some(id), Some(method)) = (id, method) else {
                tracing::warn!("Dropping undecodable message: {}", e);
                return None;
            };
            tracing::warn!("Rejecting request {} ({}): {}", id, method, e);
            rejection(id, &method, &e).map(Inbound::Rejected)
        }
    }
}

fn rejection(
    id: Value,
    method: &str,
    reason: &dyn std::fmt::Display,
) -> Option<ServerJsonRpcMessage> {
    if KNOWN_METHODS.contains(&method) {
        error_reply(id, INVALID_PARAMS, format!("Invalid params for {}: {}", method, reason))
    } else {
        error_reply(id, METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }
}

fn error_reply(id: Value, code: i64, message: String) -> Option<ServerJsonRpcMessage> {
    serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    }))
    .map_err(|e| tracing::warn!("Cannot reply to request {}: {}", id, e))
    .ok()
}

/// Sink and stream halves handed to rmcp, plus the writer task draining
/// the sink.
pub struct FramedTransport {
    pub sink: PollSender<ServerJsonRpcMessage>,
    pub stream: BoxStream<'static, ClientJsonRpcMessage>,
    pub writer: JoinHandle<io::Result<()>>,
}

/// Frame `reader` and `writer` for rmcp.
///
/// The stream counts requests it yields and the writer counts replies it
/// writes. At end of input the stream stays open until every request has
/// been answered, so rmcp does not shut down with replies still owed.
pub fn framed<R, W>(reader: R, writer: W) -> FramedTransport
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let in_flight = Arc::new(watch::Sender::new(0usize));

    let writer = tokio::spawn(write_frames(
        FramedWrite::new(writer, FrameCodec::default()),
        outbound_rx,
        Arc::clone(&in_flight),
    ));

    let inbox = Inbox {
        frames: FramedRead::new(reader, FrameCodec::default()),
        replies: outbound_tx.clone(),
        in_flight,
    };

    FramedTransport {
        sink: PollSender::new(outbound_tx),
        stream: stream::unfold(inbox, Inbox::next).boxed(),
        writer,
    }
}

struct Inbox<R> {
    frames: FramedRead<R, FrameCodec>,
    replies: mpsc::Sender<ServerJsonRpcMessage>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl<R: AsyncRead + Unpin> Inbox<R> {
    async fn next(mut self) -> Option<(ClientJsonRpcMessage, Self)> {
        loop {
            match self.frames.next().await {
                Some(Ok(Inbound::Message(message))) => {
                    if matches!(message, JsonRpcMessage::Request(_)) {
                        self.in_flight.send_modify(|n| *n += 1);
                    }
                    return Some((message, self));
                }
                Some(Ok(Inbound::Rejected(reply))) => {
                    self.in_flight.send_modify(|n| *n += 1);
                    if self.replies.send(reply).await.is_err() {
                        tracing::warn!("Writer closed; dropping error reply");
                        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("Input failed: {}", e);
                    break;
                }
                None => break,
            }
        }
        drain(self.in_flight.subscribe()).await;
        None
    }
}

async fn drain(mut owed: watch::Receiver<usize>) {
    if tokio::time::timeout(DRAIN_TIMEOUT, owed.wait_for(|n| *n == 0))
        .await
        .is_err()
    {
        tracing::warn!("Input closed with {} replies unsent", *owed.borrow());
    }
}

async fn write_frames<W: AsyncWrite + Unpin>(
    mut out: FramedWrite<W, FrameCodec>,
    mut outbound: mpsc::Receiver<ServerJsonRpcMessage>,
    in_flight: Arc<watch::Sender<usize>>,
) -> io::Result<()> {
    while let Some(message) = outbound.recv().await {
        let answers = matches!(
            message,
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_)
        );
        if let Err(e) = out.send(message).await {
            // Nothing more can be delivered.
            in_flight.send_replace(0);
            return Err(e);
        }
        if answers {
            in_flight.send_modify(|n| *n = n.saturating_sub(1));
        }
    }
    Ok(())
}
