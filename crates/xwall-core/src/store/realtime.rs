//! Supabase Realtime subscription over the Phoenix channel protocol.
//!
//! One reader thread owns the websocket. It joins a channel filtered to
//! `INSERT` events on the posts table, heartbeats every
//! [`HEARTBEAT_INTERVAL`], and hands every inserted row to the sink. Socket
//! reads and writes time out every [`READ_SLICE`], from the TCP connect
//! onwards, so the thread notices a stop request promptly even while a
//! handshake is stalled. A dropped connection is retried with capped
//! exponential backoff.

use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::{HandshakeError, Message};

use super::{PushEvent, PushSink, Subscription};
use crate::error::StoreError;
use crate::post::RawPost;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
pub const READ_SLICE: Duration = Duration::from_millis(500);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const CHANNEL: &str = "xwall-posts";

/// Where and what to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    pub socket_url: String,
    pub api_key: String,
    pub schema: String,
    pub table: String,
}

impl RealtimeConfig {
    /// Derive the websocket endpoint from the project's REST base URL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotConfigured`] if the URL is not http(s).
    pub fn new(base_url: &str, api_key: &str, schema: &str, table: &str) -> Result<Self, StoreError> {
        let base = base_url.trim_end_matches('/');
        let socket_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(StoreError::NotConfigured(format!(
                "store url must start with http:// or https://, got {base}"
            )));
        };

        Ok(Self {
            socket_url: format!("{socket_base}/realtime/v1/websocket?apikey={api_key}&vsn=1.0.0"),
            api_key: api_key.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    #[must_use]
    pub fn topic(&self) -> String {
        format!("realtime:{CHANNEL}")
    }
}

/// A decoded server frame, reduced to what the reader acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Joined,
    JoinRejected(String),
    Insert(RawPost),
    ChannelClosed(String),
    Ignored,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<Value>,
}

/// Start the reader thread. Dropping the returned handle leaves the
/// channel and joins the thread.
///
/// # Errors
///
/// Returns [`StoreError::Subscribe`] if the thread cannot be spawned.
pub fn spawn(config: RealtimeConfig, sink: PushSink) -> Result<Subscription, StoreError> {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);

    let handle = thread::Builder::new()
        .name("xwall-realtime".to_string())
        .spawn(move || run(&config, sink, &thread_stop))
        .map_err(|err| StoreError::Subscribe(format!("failed to spawn reader: {err}")))?;

    Ok(Subscription::on_cancel(move || {
        stop.store(true, Ordering::SeqCst);
        if handle.join().is_err() {
            warn!("realtime reader panicked during shutdown");
        }
    }))
}

fn run(config: &RealtimeConfig, mut sink: PushSink, stop: &AtomicBool) {
    let mut backoff = INITIAL_BACKOFF;

    while !stop.load(Ordering::SeqCst) {
        let mut connected = false;
        match session(config, &mut sink, stop, &mut connected) {
            Ok(()) => debug!("realtime session closed"),
            Err(err) => warn!(code = %err.code(), error = %err, "realtime session failed"),
        }
        if connected {
            sink(PushEvent::Disconnected);
            backoff = INITIAL_BACKOFF;
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }

        info!(delay_secs = backoff.as_secs(), "realtime reconnecting");
        sleep_unless_stopped(backoff, stop);
        backoff = next_backoff(backoff);
    }
}

fn session(
    config: &RealtimeConfig,
    sink: &mut PushSink,
    stop: &AtomicBool,
    connected: &mut bool,
) -> Result<(), StoreError> {
    let request = config
        .socket_url
        .as_str()
        .into_client_request()
        .map_err(subscribe_err)?;
    let uri = request.uri();
    let host = uri
        .host()
        .ok_or_else(|| StoreError::Subscribe("realtime url has no host".into()))?
        .to_string();
    let port = uri
        .port_u16()
        .unwrap_or_else(|| if uri.scheme_str() == Some("wss") { 443 } else { 80 });

    let stream = connect(&host, port)?;
    stream
        .set_read_timeout(Some(READ_SLICE))
        .map_err(subscribe_err)?;
    stream
        .set_write_timeout(Some(READ_SLICE))
        .map_err(subscribe_err)?;

    let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
    let mut attempt = tungstenite::client_tls(request, stream);
    let mut socket = loop {
        match attempt {
            Ok((socket, _response)) => break socket,
            Err(HandshakeError::Interrupted(mid)) => {
                if stop.load(Ordering::SeqCst) {
                    debug!("realtime handshake abandoned on stop");
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(StoreError::Subscribe(format!(
                        "handshake with {host}:{port} timed out"
                    )));
                }
                attempt = mid.handshake();
            }
            Err(HandshakeError::Failure(err)) => return Err(subscribe_err(err)),
        }
    };

    let topic = config.topic();
    let mut refs = 0_u64;
    let mut next_ref = || {
        refs += 1;
        refs.to_string()
    };

    let join_ref = next_ref();
    socket
        .send(Message::Text(join_message(config, &join_ref)))
        .map_err(subscribe_err)?;
    let mut last_heartbeat = Instant::now();

    loop {
        if stop.load(Ordering::SeqCst) {
            let _ = socket.send(Message::Text(leave_message(&topic, &next_ref())));
            let _ = socket.close(None);
            let _ = socket.flush();
            return Ok(());
        }

        if last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
            socket
                .send(Message::Text(heartbeat_message(&next_ref())))
                .map_err(subscribe_err)?;
            last_heartbeat = Instant::now();
        }

        let text = match socket.read() {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => continue,
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return Ok(());
            }
            Err(err) => return Err(subscribe_err(err)),
        };

        match decode_frame(&text, &topic, &join_ref) {
            Frame::Joined => {
                info!(%topic, "realtime channel joined");
                *connected = true;
                sink(PushEvent::Connected);
            }
            Frame::JoinRejected(reason) => {
                return Err(StoreError::Subscribe(format!("join rejected: {reason}")));
            }
            Frame::Insert(row) => sink(PushEvent::Inserted(row)),
            Frame::ChannelClosed(event) => {
                return Err(StoreError::Subscribe(format!("channel {event}")));
            }
            Frame::Ignored => {}
        }
    }
}

/// Connect to the first resolved address that answers within
/// [`CONNECT_TIMEOUT`].
fn connect(host: &str, port: u16) -> Result<TcpStream, StoreError> {
    let addrs = (host, port).to_socket_addrs().map_err(subscribe_err)?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.map_or_else(
        || StoreError::Subscribe(format!("{host} did not resolve")),
        subscribe_err,
    ))
}

/// Interpret one text frame received on the socket.
#[must_use]
pub fn decode_frame(text: &str, topic: &str, join_ref: &str) -> Frame {
    let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
        return Frame::Ignored;
    };
    if envelope.topic != topic {
        return Frame::Ignored;
    }

    match envelope.event.as_str() {
        "phx_reply" => {
            let is_join_reply = envelope
                .reference
                .as_ref()
                .and_then(Value::as_str)
                .is_some_and(|r| r == join_ref);
            if !is_join_reply {
                return Frame::Ignored;
            }
            match envelope.payload.get("status").and_then(Value::as_str) {
                Some("ok") => Frame::Joined,
                _ => Frame::JoinRejected(envelope.payload.get("response").map_or_else(
                    || "no response".to_string(),
                    Value::to_string,
                )),
            }
        }
        "postgres_changes" => {
            let data = envelope.payload.get("data");
            let is_insert = data
                .and_then(|d| d.get("type"))
                .and_then(Value::as_str)
                .is_some_and(|t| t.eq_ignore_ascii_case("insert"));
            data.and_then(|d| d.get("record"))
                .filter(|_| is_insert)
                .and_then(|record| serde_json::from_value(record.clone()).ok())
                .map_or(Frame::Ignored, Frame::Insert)
        }
        "INSERT" => envelope
            .payload
            .get("record")
            .and_then(|record| serde_json::from_value(record.clone()).ok())
            .map_or(Frame::Ignored, Frame::Insert),
        "phx_close" | "phx_error" => Frame::ChannelClosed(envelope.event),
        _ => Frame::Ignored,
    }
}

fn join_message(config: &RealtimeConfig, join_ref: &str) -> String {
    json!({
        "topic": config.topic(),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "INSERT", "schema": config.schema, "table": config.table }
                ],
                "private": false
            },
            "access_token": config.api_key
        },
        "ref": join_ref,
        "join_ref": join_ref
    })
    .to_string()
}

fn leave_message(topic: &str, reference: &str) -> String {
    json!({ "topic": topic, "event": "phx_leave", "payload": {}, "ref": reference }).to_string()
}

fn heartbeat_message(reference: &str) -> String {
    json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": reference })
        .to_string()
}

fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_BACKOFF)
}

fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(READ_SLICE));
    }
}

fn subscribe_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::Subscribe(err.to_string())
}
