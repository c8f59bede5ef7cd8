//! Event dispatch.
//!
//! Client callbacks must not block, so handlers only `try_send` onto a bounded
//! queue. When the queue is full the event is dropped and counted. A single
//! dispatcher drains the queue and spawns one processing task per event,
//! bounded by a semaphore; while every permit is taken the dispatcher stops
//! draining and the queue fills up.

use super::Gateway;
use crate::types::events::{Event, EventHandler};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub instance: String,
    pub event: String,
    pub data: Value,
    pub date_time: DateTime<Utc>,
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, payload: WebhookPayload) -> anyhow::Result<()>;
}

/// Logs every payload at debug level.
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn deliver(&self, payload: WebhookPayload) -> anyhow::Result<()> {
        debug!(target: "Gateway/Emitter", "{}", serde_json::to_string(&payload)?);
        Ok(())
    }
}

pub(crate) struct EmitJob {
    instance_id: String,
    event: Event,
}

pub(crate) struct Emitter {
    tx: mpsc::Sender<EmitJob>,
    dropped: Arc<AtomicU64>,
}

pub(crate) fn channel(capacity: usize) -> (Emitter, mpsc::Receiver<EmitJob>) {
    let (tx, rx) = mpsc::channel(capacity);
    let emitter = Emitter {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (emitter, rx)
}

impl Emitter {
    pub(crate) fn handler(&self, instance_id: &str) -> Arc<dyn EventHandler> {
        Arc::new(InstanceEventHandler {
            instance_id: instance_id.to_string(),
            tx: self.tx.clone(),
            dropped: self.dropped.clone(),
        })
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct InstanceEventHandler {
    instance_id: String,
    tx: mpsc::Sender<EmitJob>,
    dropped: Arc<AtomicU64>,
}

impl EventHandler for InstanceEventHandler {
    fn handle_event(&self, event: &Event) {
        let job = EmitJob {
            instance_id: self.instance_id.clone(),
            event: event.clone(),
        };
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "Gateway/Emitter",
                    "Emitter queue full, dropping event for {}",
                    self.instance_id
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    target: "Gateway/Emitter",
                    "Emitter stopped, ignoring event for {}",
                    self.instance_id
                );
            }
        }
    }
}

/// Dispatcher loop. Exits once every sender is gone or the gateway is dropped.
pub(crate) async fn run(
    gateway: Weak<Gateway>,
    mut rx: mpsc::Receiver<EmitJob>,
    semaphore: Arc<Semaphore>,
    sink: Arc<dyn EventSink>,
) {
    while let Some(job) = rx.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let Some(gateway) = gateway.upgrade() else {
            break;
        };
        let sink = sink.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let payload = gateway.build_payload(job).await;
            let (instance, event) = (payload.instance.clone(), payload.event.clone());
            if let Err(e) = sink.deliver(payload).await {
                error!(target: "Gateway/Emitter", "Failed to deliver {event} for {instance}: {e}");
            }
        });
    }
    debug!(target: "Gateway/Emitter", "Emitter shutting down");
}

impl Gateway {
    async fn build_payload(&self, job: EmitJob) -> WebhookPayload {
        let id = job.instance_id.as_str();
        let (event, data) = match job.event {
            Event::Connected => ("connection.update", json!({ "state": "open" })),
            Event::Disconnected => ("connection.update", json!({ "state": "close" })),
            Event::StreamReplaced => (
                "connection.update",
                json!({ "state": "close", "reason": "stream_replaced" }),
            ),
            Event::LoggedOut { on_connect, reason } => (
                "logout.instance",
                json!({ "onConnect": on_connect, "reason": reason }),
            ),
            Event::Message(msg) => {
                let (remote_jid, remote_jid_alt) = self.resolve_jid_lid(id, &msg.chat).await;
                let participant = if msg.chat.is_group() {
                    Some(self.resolve_jid_lid(id, &msg.sender).await.0)
                } else {
                    None
                };
                (
                    "messages.upsert",
                    json!({
                        "key": {
                            "remoteJid": remote_jid,
                            "remoteJidAlt": remote_jid_alt,
                            "fromMe": msg.from_me,
                            "id": msg.id,
                            "participant": participant,
                        },
                        "pushName": msg.push_name,
                        "message": { "conversation": msg.text },
                        "messageTimestamp": msg.timestamp.timestamp(),
                    }),
                )
            }
            Event::Receipt(receipt) => {
                let (remote_jid, remote_jid_alt) = self.resolve_jid_lid(id, &receipt.chat).await;
                (
                    "messages.update",
                    json!({
                        "keyIds": receipt.message_ids,
                        "remoteJid": remote_jid,
                        "remoteJidAlt": remote_jid_alt,
                        "status": receipt.kind,
                        "timestamp": receipt.timestamp.timestamp(),
                    }),
                )
            }
            Event::Presence(presence) => {
                let (jid, lid) = self.resolve_jid_lid(id, &presence.from).await;
                let state = if presence.unavailable {
                    "unavailable"
                } else {
                    "available"
                };
                (
                    "presence.update",
                    json!({
                        "id": jid,
                        "lid": lid,
                        "presence": state,
                        "lastSeen": presence.last_seen.map(|t| t.timestamp()),
                    }),
                )
            }
        };

        WebhookPayload {
            instance: job.instance_id,
            event: event.to_string(),
            data,
            date_time: Utc::now(),
        }
    }
}
