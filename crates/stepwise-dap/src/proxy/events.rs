//! Event relay: one task per broker, applying each event to proxy state in
//! arrival order before publishing it.

use super::{Proxy, Readiness};
use crate::constants::events;
use crate::{ContinuedEventBody, Event, ExitedEventBody, OutputEventBody, StoppedEventBody};
use std::sync::Weak;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Backend event as seen by the session layer
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyEvent {
    /// The backend is ready for configuration
    Initialized,
    Stopped(StoppedEventBody),
    Continued { thread_id: Option<i64> },
    Terminated,
    Exited { exit_code: i64 },
    Output(OutputEventBody),
    Other(Event),
    /// The transport closed
    Closed,
}

impl ProxyEvent {
    pub fn from_event(event: &Event) -> Self {
        match event.event.as_str() {
            events::INITIALIZED => ProxyEvent::Initialized,
            events::STOPPED => match event.body_as::<StoppedEventBody>() {
                Some(body) => ProxyEvent::Stopped(body),
                None => ProxyEvent::Other(event.clone()),
            },
            events::CONTINUED => ProxyEvent::Continued {
                thread_id: event
                    .body_as::<ContinuedEventBody>()
                    .map(|body| body.thread_id),
            },
            events::TERMINATED => ProxyEvent::Terminated,
            events::EXITED => ProxyEvent::Exited {
                exit_code: event
                    .body_as::<ExitedEventBody>()
                    .map(|body| body.exit_code)
                    .unwrap_or_default(),
            },
            events::OUTPUT => match event.body_as::<OutputEventBody>() {
                Some(body) => ProxyEvent::Output(body),
                None => ProxyEvent::Other(event.clone()),
            },
            _ => ProxyEvent::Other(event.clone()),
        }
    }
}

pub(super) fn spawn_relay(
    proxy: Weak<Proxy>,
    mut events: mpsc::Receiver<Event>,
    from_child: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(proxy) = proxy.upgrade() else {
                return;
            };
            trace!(event = %event.event, from_child, "Relaying backend event");
            if from_child {
                proxy.apply_child_event(&event).await;
            } else {
                proxy.apply_event(&event).await;
            }
        }

        if let Some(proxy) = proxy.upgrade() {
            proxy.on_transport_closed(from_child).await;
        }
    })
}

impl Proxy {
    async fn apply_event(self: &std::sync::Arc<Self>, event: &Event) {
        let became_ready = {
            let mut state = self.adapter_state.lock().await;
            let was_ready = self.policy.is_session_ready(&state);
            self.policy.update_state_on_event(event, &mut state);
            !was_ready && self.policy.is_session_ready(&state)
        };

        let published = ProxyEvent::from_event(event);
        if let ProxyEvent::Stopped(body) = &published {
            if let Some(thread_id) = body.thread_id {
                *self.thread_id.lock().await = Some(thread_id);
            }
        }

        if became_ready || self.policy.is_ready_event(event) {
            self.readiness.send_if_modified(|current| {
                let changed = *current == Readiness::Pending;
                if changed {
                    *current = Readiness::Ready;
                }
                changed
            });
            self.flush_queue().await;
        }

        let _ = self.events.send(published);
    }

    /// Child events drive execution state, but only the parent's
    /// termination ends the session
    async fn apply_child_event(self: &std::sync::Arc<Self>, event: &Event) {
        match ProxyEvent::from_event(event) {
            ProxyEvent::Initialized => {}
            ProxyEvent::Terminated | ProxyEvent::Exited { .. } => {
                debug!("Child session ended");
                self.adapter_state.lock().await.child_active = false;
            }
            published => {
                if let ProxyEvent::Stopped(body) = &published {
                    if let Some(thread_id) = body.thread_id {
                        *self.thread_id.lock().await = Some(thread_id);
                    }
                }
                let _ = self.events.send(published);
            }
        }
    }

    async fn on_transport_closed(&self, from_child: bool) {
        if from_child {
            self.adapter_state.lock().await.child_active = false;
            self.child.write().await.take();
            return;
        }
        debug!("Backend transport closed");
        self.adapter_state.lock().await.connected = false;
        self.readiness.send_replace(Readiness::Closed);
        // Fail anything still queued
        self.queue.lock().await.clear();
        let _ = self.events.send(ProxyEvent::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stopped_event_carries_thread() {
        let event = Event::new(1, "stopped")
            .with_body(json!({"reason": "breakpoint", "threadId": 4}));
        match ProxyEvent::from_event(&event) {
            ProxyEvent::Stopped(body) => {
                assert_eq!(body.reason, "breakpoint");
                assert_eq!(body.thread_id, Some(4));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_stop_is_kept_as_other() {
        let event = Event::new(2, "stopped").with_body(json!({"threadId": 4}));
        assert!(matches!(ProxyEvent::from_event(&event), ProxyEvent::Other(_)));
    }

    #[test]
    fn test_exited_without_body_defaults_to_zero() {
        let event = Event::new(3, "exited");
        assert_eq!(
            ProxyEvent::from_event(&event),
            ProxyEvent::Exited { exit_code: 0 }
        );
    }
}
