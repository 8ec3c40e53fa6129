//! Live event stream. A broadcast hub fans envelopes out to every connected
//! client; each SSE connection filters down to the channels its user may see.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use stockroom_core::notify::{Channel, EventEnvelope, EventPublisher};

use crate::auth::CurrentUser;
use crate::state::AppState;

/// Fan-out hub behind `/api/events`. Publishing never blocks and never fails
/// the caller; subscribers that fall behind lose the oldest events and
/// reconcile through the REST endpoints.
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }
}

impl EventPublisher for EventHub {
    fn publish(&self, envelope: EventEnvelope) {
        // Err only means nobody is connected right now.
        let _ = self.sender.send(envelope);
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/events", get(stream))
}

/// Everyone sees `inventory`; each user additionally gets their private
/// channel, and admins the `admin` channel.
fn subscribed_topics(user: &CurrentUser) -> Vec<String> {
    let mut topics =
        vec![Channel::Inventory.topic(), Channel::User(user.user.id.clone()).topic()];
    if user.is_admin() {
        topics.push(Channel::Admin.topic());
    }
    topics
}

async fn stream(
    user: CurrentUser,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let topics = subscribed_topics(&user);
    let receiver = state.hub.subscribe();

    let stream = BroadcastStream::new(receiver).filter_map(move |received| match received {
        Ok(envelope) if topics.contains(&envelope.channel) => {
            Some(Ok::<_, Infallible>(sse_event(&envelope)))
        }
        Ok(_) => None,
        Err(lagged) => {
            // A gap in the live view only; clients reload over REST.
            debug!(
                event_name = "events.subscriber_lagged",
                error = %lagged,
                "subscriber fell behind the broadcast channel"
            );
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(envelope: &EventEnvelope) -> Event {
    let event = Event::default().event(&envelope.event);
    match serde_json::to_string(envelope) {
        Ok(payload) => event.data(payload),
        Err(_) => event.data("{}"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use tokio::sync::broadcast::error::RecvError;

    use stockroom_core::domain::user::{Role, User, UserId};
    use stockroom_core::notify::{events, Channel, EventEnvelope, EventPublisher};

    use super::{subscribed_topics, EventHub};
    use crate::auth::CurrentUser;

    fn current(role: Role) -> CurrentUser {
        let now = Utc::now();
        CurrentUser {
            user: User {
                id: UserId("u-77".to_owned()),
                name: "Pat".to_owned(),
                email: "pat@example.com".to_owned(),
                password_hash: "irrelevant".to_owned(),
                role,
                created_at: now,
                updated_at: now,
            },
            token: "token".to_owned(),
        }
    }

    #[tokio::test]
    async fn hub_fans_out_to_every_subscriber() {
        let hub = EventHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.publish(EventEnvelope::new(
            Channel::Inventory,
            events::CATALOG_CHANGED,
            json!({ "entity": "item" }),
        ));

        let received = first.recv().await.expect("first subscriber");
        assert_eq!(received.event, events::CATALOG_CHANGED);
        let received = second.recv().await.expect("second subscriber");
        assert_eq!(received.channel, "inventory");
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_noop() {
        let hub = EventHub::new(8);
        hub.publish(EventEnvelope::new(Channel::Admin, events::STOCK_LOW, json!({})));
    }

    #[tokio::test]
    async fn slow_subscribers_lag_instead_of_blocking_publishers() {
        let hub = EventHub::new(2);
        let mut receiver = hub.subscribe();

        for index in 0..4 {
            hub.publish(EventEnvelope::new(
                Channel::Inventory,
                events::CATALOG_CHANGED,
                json!({ "index": index }),
            ));
        }

        // Capacity two: the first recv reports the two dropped events, then
        // delivery resumes from the survivors.
        let first = receiver.recv().await;
        assert!(matches!(first, Err(RecvError::Lagged(2))));
        let survivor = receiver.recv().await.expect("oldest surviving event");
        assert_eq!(survivor.payload["index"], 2);
    }

    #[test]
    fn regular_users_see_inventory_and_their_own_channel() {
        let topics = subscribed_topics(&current(Role::User));
        assert_eq!(topics, vec!["inventory".to_owned(), "user-u-77".to_owned()]);
    }

    #[test]
    fn admins_additionally_watch_the_admin_channel() {
        let topics = subscribed_topics(&current(Role::Admin));
        assert!(topics.contains(&"admin".to_owned()));
        assert!(topics.contains(&"inventory".to_owned()));
        assert!(topics.contains(&"user-u-77".to_owned()));
    }
}
