//! Reload delivery over WebSocket
//!
//! Each browser tab holds one connection. The server pushes a single text
//! frame `"r"` per reload signal and pings periodically; the browser side
//! only answers pongs. Either loop failing ends the connection and
//! unsubscribes it from the broadcaster.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{Instant, interval_at, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use shared::{Broadcaster, Subscriber, Subsystem, subsystem_debug};

/// Payload instructing the browser to reload
pub const RELOAD_MESSAGE: &str = "r";

/// Connection timing parameters
#[derive(Debug, Clone)]
pub struct ChannelTimings {
    /// Limit on a single frame write
    pub write_wait: Duration,
    /// Read deadline, refreshed by every pong
    pub pong_wait: Duration,
    /// Ping cadence; must be shorter than `pong_wait`
    pub ping_period: Duration,
}

impl Default for ChannelTimings {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
        }
    }
}

/// Drive one upgraded connection until it fails or `cancel` fires
pub async fn serve_reload_socket(
    socket: WebSocket,
    broadcaster: Arc<Broadcaster>,
    timings: ChannelTimings,
    cancel: CancellationToken,
) {
    let connection = Uuid::new_v4();
    let mut subscriber = broadcaster.subscribe();
    subsystem_debug!(
        Subsystem::Reload,
        "🔗 Browser connected ({}), {} listeners",
        connection,
        broadcaster.listener_count()
    );

    let (mut sender, mut receiver) = socket.split();

    let reason = tokio::select! {
        reason = read_loop(&mut receiver, timings.pong_wait) => reason,
        reason = write_loop(&mut sender, &mut subscriber, &timings, &cancel) => reason,
    };

    broadcaster.unsubscribe(&subscriber);
    let _ = timeout(timings.write_wait, sender.close()).await;

    subsystem_debug!(
        Subsystem::Reload,
        "🔌 Browser disconnected ({}): {}, {} listeners",
        connection,
        reason,
        broadcaster.listener_count()
    );
}

/// Consume inbound frames; only pongs matter
async fn read_loop(receiver: &mut SplitStream<WebSocket>, pong_wait: Duration) -> &'static str {
    let mut deadline = Instant::now() + pong_wait;
    loop {
        match timeout_at(deadline, receiver.next()).await {
            Err(_) => return "read deadline exceeded",
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => return "closed by client",
            Ok(Some(Err(_))) => return "read error",
            Ok(Some(Ok(Message::Pong(_)))) => deadline = Instant::now() + pong_wait,
            Ok(Some(Ok(_))) => {}
        }
    }
}

/// Push reload signals and keepalive pings
async fn write_loop(
    sender: &mut SplitSink<WebSocket, Message>,
    subscriber: &mut Subscriber,
    timings: &ChannelTimings,
    cancel: &CancellationToken,
) -> &'static str {
    let mut ping = interval_at(Instant::now() + timings.ping_period, timings.ping_period);
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return "shutting down",
            signal = subscriber.recv() => match signal {
                Some(()) => Message::Text(RELOAD_MESSAGE.to_string()),
                None => return "unsubscribed",
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };

        match timeout(timings.write_wait, sender.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return "write error",
            Err(_) => return "write timed out",
        }
    }
}
