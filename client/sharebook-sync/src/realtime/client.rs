//! Websocket client for the realtime service
//!
//! Each subscription owns one socket joined to one topic. A background task
//! keeps it alive with heartbeats, rejoins after a dropped connection and
//! forwards decoded changes until the subscription is dropped. A renewed
//! access token is handed to the channel on the next heartbeat.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use resilience::{realtime_reconnect_config, with_retry_if, with_timeout_or, RetryConfig, ServiceConfig};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::messages::{ChannelMessage, Inbound};
use super::{ChangeEvent, ChangeFeed, Subscription, SubscriptionScope};
use crate::auth::SessionHandle;
use crate::config::Config;
use crate::error::{SyncError, SyncResult};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const PROTOCOL_VERSION: &str = "1.0.0";
const EVENT_BUFFER: usize = 256;

#[derive(Clone)]
pub struct RealtimeClient {
    endpoint: String,
    session: SessionHandle,
    heartbeat: Duration,
    reconnect: ServiceConfig,
    next_ref: Arc<AtomicU64>,
}

impl RealtimeClient {
    pub fn new(config: &Config, session: SessionHandle) -> SyncResult<Self> {
        let mut url = Url::parse(&config.backend.realtime_url())
            .map_err(|e| SyncError::Config(format!("Invalid realtime url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("apikey", &config.backend.anon_key)
            .append_pair("vsn", PROTOCOL_VERSION);

        Ok(Self {
            endpoint: url.to_string(),
            session,
            heartbeat: config.realtime.heartbeat_interval(),
            reconnect: realtime_reconnect_config(),
            next_ref: Arc::new(AtomicU64::new(1)),
        })
    }

    fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::Relaxed).to_string()
    }

    async fn send(socket: &mut Socket, message: &ChannelMessage) -> SyncResult<()> {
        socket.send(Message::Text(message.to_json()?)).await?;
        Ok(())
    }

    /// Frame carrying the session's token when it differs from the one last sent
    fn token_update(&self, topic: &str, sent: &mut Option<String>) -> Option<ChannelMessage> {
        let current = self.session.access_token()?;
        if sent.as_deref() == Some(current.as_str()) {
            return None;
        }
        let frame = ChannelMessage::access_token(topic, &current, self.next_ref());
        *sent = Some(current);
        Some(frame)
    }

    /// Open a socket and join the scope's topic, waiting for the join reply
    async fn connect(&self, scope: SubscriptionScope) -> SyncResult<Socket> {
        let attempt = async {
            let (mut socket, _) = connect_async(self.endpoint.as_str()).await?;
            let join_ref = self.next_ref();
            let token = self.session.access_token();
            let join = ChannelMessage::join(&scope, token.as_deref(), join_ref.clone());
            Self::send(&mut socket, &join).await?;

            while let Some(frame) = socket.next().await {
                let text = match frame? {
                    Message::Text(text) => text,
                    _ => continue,
                };
                let inbound = ChannelMessage::from_json(&text)?.into_inbound()?;
                if let Inbound::Reply {
                    msg_ref,
                    ok,
                    response,
                } = inbound
                {
                    if msg_ref.as_deref() != Some(join_ref.as_str()) {
                        continue;
                    }
                    if !ok {
                        return Err(SyncError::InvalidInput(format!(
                            "channel join rejected: {}",
                            response
                        )));
                    }
                    return Ok(socket);
                }
            }
            Err(SyncError::Realtime(
                "socket closed before join reply".to_string(),
            ))
        };

        with_timeout_or(self.reconnect.timeout.duration, attempt, |d| {
            SyncError::Realtime(format!("join timed out after {:?}", d))
        })
        .await
    }

    async fn connect_with_retry(&self, scope: SubscriptionScope) -> SyncResult<Socket> {
        let retry = self
            .reconnect
            .retry
            .clone()
            .unwrap_or_else(RetryConfig::none);
        with_retry_if(retry, SyncError::is_retryable, || self.connect(scope)).await
    }

    /// Forward changes until stopped, the receiver goes away or reconnects are exhausted
    async fn pump(
        self,
        mut socket: Socket,
        scope: SubscriptionScope,
        events: mpsc::Sender<ChangeEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let topic = scope.topic();
        let mut sent_token = self.session.access_token();
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.tick().await;

        loop {
            let healthy = tokio::select! {
                _ = &mut stop => {
                    self.leave(&mut socket, &topic).await;
                    break;
                }
                _ = events.closed() => {
                    self.leave(&mut socket, &topic).await;
                    break;
                }
                _ = heartbeat.tick() => {
                    let mut alive = Self::send(&mut socket, &ChannelMessage::heartbeat(self.next_ref()))
                        .await
                        .is_ok();
                    if let Some(update) = self.token_update(&topic, &mut sent_token) {
                        debug!(topic = %topic, "Sending renewed access token");
                        alive = alive && Self::send(&mut socket, &update).await.is_ok();
                    }
                    alive
                }
                frame = socket.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !forward(&text, scope, &events).await {
                            break;
                        }
                        true
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        socket.send(Message::Pong(payload)).await.is_ok()
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => false,
                    Some(Ok(_)) => true,
                },
            };

            if healthy {
                continue;
            }

            warn!(topic = %topic, "Realtime connection lost, rejoining");
            let rejoined = tokio::select! {
                _ = &mut stop => break,
                result = self.connect_with_retry(scope) => result,
            };
            match rejoined {
                Ok(fresh) => {
                    socket = fresh;
                    sent_token = self.session.access_token();
                    info!(topic = %topic, "Rejoined realtime channel");
                }
                Err(e) => {
                    error!(topic = %topic, error = %e, "Giving up on realtime channel");
                    break;
                }
            }
        }
        debug!(topic = %topic, "Realtime pump stopped");
    }

    async fn leave(&self, socket: &mut Socket, topic: &str) {
        let _ = Self::send(socket, &ChannelMessage::leave(topic, self.next_ref())).await;
        let _ = socket.close(None).await;
        info!(topic = %topic, "Left realtime channel");
    }
}

/// Decode one text frame and hand any change to the subscriber. Returns false once the
/// subscriber has gone away.
async fn forward(text: &str, scope: SubscriptionScope, events: &mpsc::Sender<ChangeEvent>) -> bool {
    let inbound = match ChannelMessage::from_json(text).and_then(ChannelMessage::into_inbound) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(error = %e, "Unreadable realtime frame");
            return true;
        }
    };

    match inbound {
        Inbound::Change(raw) => match ChangeEvent::decode(raw) {
            Ok(Some(event)) if scope.accepts(&event) => events.send(event).await.is_ok(),
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable change");
                true
            }
        },
        Inbound::Closed(reason) => {
            warn!(reason = %reason, "Realtime channel closed by server");
            true
        }
        Inbound::Reply { .. } | Inbound::Ignored => true,
    }
}

#[async_trait]
impl ChangeFeed for RealtimeClient {
    async fn subscribe(&self, scope: SubscriptionScope) -> SyncResult<Subscription> {
        let socket = self.connect_with_retry(scope).await?;
        info!(topic = %scope.topic(), "Subscribed to realtime channel");

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(self.clone().pump(socket, scope, events_tx, stop_rx));

        Ok(Subscription::new(scope, events_rx, Some(stop_tx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_carries_key_and_version() {
        let config = Config::local("https://demo.supabase.co", "anon-key");
        let client = RealtimeClient::new(&config, SessionHandle::new()).unwrap();
        assert_eq!(
            client.endpoint,
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );
    }

    #[test]
    fn test_refs_are_unique() {
        let config = Config::local("http://localhost:54321", "anon");
        let client = RealtimeClient::new(&config, SessionHandle::new()).unwrap();
        let clone = client.clone();
        assert_eq!(client.next_ref(), "1");
        assert_eq!(clone.next_ref(), "2");
    }

    #[test]
    fn test_renewed_token_is_sent_once() {
        let config = Config::local("http://localhost:54321", "anon");
        let session = SessionHandle::new();
        let client = RealtimeClient::new(&config, session.clone()).unwrap();
        let mut sent = None;

        assert!(client.token_update("realtime:posts", &mut sent).is_none());

        session.set(crate::auth::Session {
            access_token: "jwt-1".into(),
            refresh_token: "r".into(),
            user_id: uuid::Uuid::from_u128(1),
            email: None,
            expires_at: chrono::Utc::now(),
        });
        let frame = client.token_update("realtime:posts", &mut sent).unwrap();
        assert_eq!(frame.event, crate::realtime::messages::ACCESS_TOKEN);
        assert_eq!(frame.topic, "realtime:posts");
        assert_eq!(frame.payload["access_token"], "jwt-1");
        assert!(client.token_update("realtime:posts", &mut sent).is_none());

        let mut renewed = session.current().unwrap();
        renewed.access_token = "jwt-2".into();
        session.set(renewed);
        let frame = client.token_update("realtime:posts", &mut sent).unwrap();
        assert_eq!(frame.payload["access_token"], "jwt-2");
        assert_eq!(sent.as_deref(), Some("jwt-2"));
    }

    #[tokio::test]
    async fn test_forward_filters_by_scope() {
        let (tx, mut rx) = mpsc::channel(4);
        let frame = serde_json::json!({
            "topic": "realtime:notifications",
            "event": "postgres_changes",
            "payload": {"data": {
                "type": "INSERT",
                "table": "notifications",
                "record": {
                    "id": 1,
                    "senderId": uuid::Uuid::from_u128(2),
                    "receiverId": uuid::Uuid::from_u128(3),
                    "title": "commented on your post",
                    "data": "{}",
                    "seen": false
                }
            }},
            "ref": null
        })
        .to_string();

        let mine = SubscriptionScope::Notifications {
            receiver: uuid::Uuid::from_u128(1),
        };
        assert!(forward(&frame, mine, &tx).await);
        assert!(rx.try_recv().is_err());

        let theirs = SubscriptionScope::Notifications {
            receiver: uuid::Uuid::from_u128(3),
        };
        assert!(forward(&frame, theirs, &tx).await);
        assert!(matches!(
            rx.try_recv(),
            Ok(ChangeEvent::NotificationInserted(_))
        ));
    }

    #[tokio::test]
    async fn test_forward_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let frame = r#"{"topic":"realtime:posts","event":"postgres_changes","payload":{"data":{"type":"DELETE","table":"posts","old_record":{"id":4}}},"ref":null}"#;
        assert!(!forward(frame, SubscriptionScope::Posts, &tx).await);
    }

    #[tokio::test]
    async fn test_garbage_frame_is_skipped() {
        let (tx, _rx) = mpsc::channel(1);
        assert!(forward("not json", SubscriptionScope::Posts, &tx).await);
    }
}
