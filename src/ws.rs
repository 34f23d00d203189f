use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tokio::task::{self, JoinHandle};
use uuid::Uuid;

use crate::models::question_model::QuestionResponse;

/// Events buffered per room; a socket that falls further behind skips
/// ahead instead of stalling the whole room.
const EVENT_BUFFER: usize = 100;

/// Server-to-room events. `newQuestion` carries the full stored record,
/// `deleteQuestion` the hex id of the removed document.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RoomEvent {
    NewQuestion(QuestionResponse),
    DeleteQuestion(String),
}

/// Per-room broadcast groups, injected through application state rather
/// than held as a process global. Handlers publish after their database
/// write commits; sockets subscribe when they issue a join command.
pub struct RoomChannels {
    rooms: DashMap<String, broadcast::Sender<RoomEvent>>,
}

impl RoomChannels {
    pub fn new() -> Self {
        RoomChannels {
            rooms: DashMap::new(),
        }
    }

    /// Subscribes to a room's event stream, creating the group on first use.
    pub fn join(&self, room_code: &str) -> broadcast::Receiver<RoomEvent> {
        self.rooms
            .entry(room_code.to_owned())
            .or_insert_with(|| broadcast::channel(EVENT_BUFFER).0)
            .subscribe()
    }

    /// Sends an event to every socket joined to the room and returns how
    /// many received it.
    pub fn publish(&self, room_code: &str, event: RoomEvent) -> usize {
        let delivered = match self.rooms.get(room_code) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            self.prune(room_code);
        }

        delivered
    }

    /// Drops a room's group once nobody subscribes to it any more.
    pub fn prune(&self, room_code: &str) {
        self.rooms
            .remove_if(room_code, |_, sender| sender.receiver_count() == 0);
    }
}

impl Default for RoomChannels {
    fn default() -> Self {
        Self::new()
    }
}

/// Room membership of a single connection: the joined-set that makes
/// rejoins a no-op, plus one forward task per room pumping events into
/// the socket.
struct SocketSubscriptions {
    joined: HashSet<String>,
    forwards: Vec<JoinHandle<()>>,
}

impl SocketSubscriptions {
    fn new() -> Self {
        SocketSubscriptions {
            joined: HashSet::new(),
            forwards: Vec::new(),
        }
    }

    /// Subscribes to a room and spawns its forward task, unless this
    /// connection already joined the room. Returns whether it subscribed.
    fn join<F>(&mut self, channels: &RoomChannels, room_code: &str, spawn_forward: F) -> bool
    where
        F: FnOnce(broadcast::Receiver<RoomEvent>) -> JoinHandle<()>,
    {
        if !self.joined.insert(room_code.to_owned()) {
            return false;
        }

        self.forwards.push(spawn_forward(channels.join(room_code)));
        true
    }

    /// Aborts and awaits every forward task, then prunes the groups this
    /// connection left empty. Awaiting the aborted task guarantees its
    /// receiver is gone before the prune counts subscribers.
    async fn teardown(self, channels: &RoomChannels) {
        for forward in self.forwards {
            forward.abort();
            let _ = forward.await;
        }
        for room_code in &self.joined {
            channels.prune(room_code);
        }
    }
}

pub async fn handler(ws: WebSocketUpgrade, State(channels): State<Arc<RoomChannels>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, channels))
}

async fn handle_socket(socket: WebSocket, channels: Arc<RoomChannels>) {
    let socket_id = Uuid::new_v4();
    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));

    let mut subscriptions = SocketSubscriptions::new();

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let Some(room_code) = parse_join(&text) else {
                    continue;
                };

                let sink = sender.clone();
                let subscribed = subscriptions.join(&channels, &room_code, |rx| {
                    task::spawn(forward_events(rx, sink, socket_id))
                });
                if subscribed {
                    tracing::debug!(%socket_id, %room_code, "socket joined room");
                }
            }
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    // Disconnect tears down every room subscription.
    subscriptions.teardown(&channels).await;
    tracing::debug!(%socket_id, "socket closed");
}

/// Extracts the room code from a `{"type":"join","data":"<CODE>"}` frame.
/// Every other frame, including ones that fail to parse, is ignored.
fn parse_join(text: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(text).ok()?;
    if json["type"].as_str()? != "join" {
        return None;
    }
    json["data"].as_str().map(str::to_owned)
}

async fn forward_events(
    mut rx: broadcast::Receiver<RoomEvent>,
    sender: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    socket_id: Uuid,
) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(%socket_id, skipped, "socket lagged behind room events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(%socket_id, error = %err, "failed to encode room event");
                continue;
            }
        };

        let mut sender = sender.lock().await;
        if sender.send(Message::Text(payload.into())).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use pretty_assertions::assert_eq;

    use crate::models::question_model::Question;

    fn question(room_code: &str) -> QuestionResponse {
        Question::new(
            room_code.to_string(),
            "What is X?".to_string(),
            "userX".to_string(),
            ObjectId::new(),
        )
        .into()
    }

    fn drain(mut rx: broadcast::Receiver<RoomEvent>) -> JoinHandle<()> {
        task::spawn(async move { while rx.recv().await.is_ok() {} })
    }

    #[test]
    fn new_question_event_wire_shape() {
        let question = question("AB12CD");
        let id = question.id.clone();

        let value = serde_json::to_value(RoomEvent::NewQuestion(question)).unwrap();

        assert_eq!(value["event"], "newQuestion");
        assert_eq!(value["data"]["_id"], serde_json::Value::String(id));
        assert_eq!(value["data"]["roomCode"], "AB12CD");
        assert_eq!(value["data"]["content"], "What is X?");
        assert_eq!(value["data"]["user"], "userX");

        let created_at = value["data"]["createdAt"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(created_at).is_ok());
    }

    #[test]
    fn delete_question_event_carries_the_id() {
        let id = ObjectId::new().to_hex();
        let value = serde_json::to_value(RoomEvent::DeleteQuestion(id.clone())).unwrap();

        assert_eq!(value["event"], "deleteQuestion");
        assert_eq!(value["data"], serde_json::Value::String(id));
    }

    #[test]
    fn join_frames_are_parsed() {
        assert_eq!(
            parse_join(r#"{"type":"join","data":"AB12CD"}"#),
            Some("AB12CD".to_string())
        );
    }

    #[test]
    fn other_frames_are_ignored() {
        assert_eq!(parse_join(r#"{"type":"leave","data":"AB12CD"}"#), None);
        assert_eq!(parse_join(r#"{"type":"join"}"#), None);
        assert_eq!(parse_join(r#"{"type":"join","data":42}"#), None);
        assert_eq!(parse_join(r#"{"data":"AB12CD"}"#), None);
        assert_eq!(parse_join("not json"), None);
    }

    #[tokio::test]
    async fn publish_reaches_every_room_subscriber() {
        let channels = RoomChannels::new();
        let mut first = channels.join("AB12CD");
        let mut second = channels.join("AB12CD");

        let delivered = channels.publish("AB12CD", RoomEvent::NewQuestion(question("AB12CD")));
        assert_eq!(delivered, 2);

        assert!(matches!(
            first.recv().await.unwrap(),
            RoomEvent::NewQuestion(_)
        ));
        assert!(matches!(
            second.recv().await.unwrap(),
            RoomEvent::NewQuestion(_)
        ));
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let channels = RoomChannels::new();
        let _listener = channels.join("AB12CD");
        let mut other = channels.join("ZZZZZZ");

        let delivered = channels.publish("AB12CD", RoomEvent::DeleteQuestion("1".into()));
        assert_eq!(delivered, 1);

        assert!(matches!(
            other.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_delivers_nothing() {
        let channels = RoomChannels::new();

        let delivered = channels.publish("AB12CD", RoomEvent::DeleteQuestion("1".into()));
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn groups_are_recreated_after_everyone_leaves() {
        let channels = RoomChannels::new();
        let rx = channels.join("AB12CD");
        drop(rx);

        assert_eq!(
            channels.publish("AB12CD", RoomEvent::DeleteQuestion("1".into())),
            0
        );

        let mut rx = channels.join("AB12CD");
        assert_eq!(
            channels.publish("AB12CD", RoomEvent::DeleteQuestion("2".into())),
            1
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            RoomEvent::DeleteQuestion(id) if id == "2"
        ));
    }

    #[tokio::test]
    async fn rejoining_a_room_subscribes_once() {
        let channels = RoomChannels::new();
        let mut subscriptions = SocketSubscriptions::new();

        assert!(subscriptions.join(&channels, "AB12CD", drain));
        assert!(!subscriptions.join(&channels, "AB12CD", drain));

        let delivered = channels.publish("AB12CD", RoomEvent::DeleteQuestion("1".into()));
        assert_eq!(delivered, 1);

        subscriptions.teardown(&channels).await;
    }

    #[tokio::test]
    async fn one_connection_can_follow_several_rooms() {
        let channels = RoomChannels::new();
        let mut subscriptions = SocketSubscriptions::new();

        assert!(subscriptions.join(&channels, "AB12CD", drain));
        assert!(subscriptions.join(&channels, "ZZZZZZ", drain));

        assert_eq!(
            channels.publish("AB12CD", RoomEvent::DeleteQuestion("1".into())),
            1
        );
        assert_eq!(
            channels.publish("ZZZZZZ", RoomEvent::DeleteQuestion("2".into())),
            1
        );

        subscriptions.teardown(&channels).await;
    }

    #[tokio::test]
    async fn teardown_aborts_forwards_and_prunes_empty_groups() {
        let channels = RoomChannels::new();
        let mut subscriptions = SocketSubscriptions::new();
        subscriptions.join(&channels, "AB12CD", drain);
        subscriptions.join(&channels, "ZZZZZZ", drain);

        subscriptions.teardown(&channels).await;

        assert!(!channels.rooms.contains_key("AB12CD"));
        assert!(!channels.rooms.contains_key("ZZZZZZ"));
    }

    #[tokio::test]
    async fn teardown_keeps_groups_other_connections_still_follow() {
        let channels = RoomChannels::new();
        let mut leaving = SocketSubscriptions::new();
        let mut staying = SocketSubscriptions::new();
        leaving.join(&channels, "AB12CD", drain);
        staying.join(&channels, "AB12CD", drain);

        leaving.teardown(&channels).await;

        assert!(channels.rooms.contains_key("AB12CD"));
        assert_eq!(
            channels.publish("AB12CD", RoomEvent::DeleteQuestion("1".into())),
            1
        );

        staying.teardown(&channels).await;
        assert!(!channels.rooms.contains_key("AB12CD"));
    }
}
