//! Progress tracker: emits per-stage lifecycle events with a heartbeat so a
//! consumer streaming this to a UI never stalls for more than ~500ms while a
//! stage is running.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

/// Which phase of the pipeline a component belongs to, for grouping in a
/// progress UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentGroup {
    Data,
    Decoding,
    Enrichment,
    Analysis,
    Finishing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Initiated,
    Running,
    Finished,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentUpdate {
    pub id: String,
    pub group: ComponentGroup,
    pub title: String,
    pub status: ComponentStatus,
    pub description: String,
    pub start_time: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    ComponentUpdate,
    Complete,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressEventType,
    pub component: Option<ComponentUpdate>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: u64,
}

impl ProgressEvent {
    pub fn component(update: ComponentUpdate, timestamp: u64) -> Self {
        Self {
            kind: ProgressEventType::ComponentUpdate,
            component: Some(update),
            result: None,
            error: None,
            timestamp,
        }
    }

    pub fn complete(result: serde_json::Value, timestamp: u64) -> Self {
        Self {
            kind: ProgressEventType::Complete,
            component: None,
            result: Some(result),
            error: None,
            timestamp,
        }
    }

    pub fn error(error: impl Into<String>, timestamp: u64) -> Self {
        Self {
            kind: ProgressEventType::Error,
            component: None,
            result: None,
            error: Some(error.into()),
            timestamp,
        }
    }
}

/// Sending half of the progress channel. Cloned into every tool invocation.
/// Sends are best-effort: a closed receiver must never panic the producer
///.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressEvent>,
    start_epoch_ms: u64,
}

impl ProgressSender {
    pub fn send(&self, event: ProgressEvent) {
        let _ = self.tx.try_send(event);
    }

    pub fn elapsed_ms(&self) -> u64 {
        now_epoch_ms().saturating_sub(self.start_epoch_ms)
    }
}

fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Tracks start times per component so `duration_ms` is monotonic
/// non-decreasing, emits a heartbeat (`running` re-emitted) on the
/// most-recently-running component every ~500ms, and stops cleanly when the
/// consumer is dropped.
pub struct ProgressTracker {
    sender: ProgressSender,
    starts: Arc<Mutex<HashMap<String, Instant>>>,
    heartbeat: Option<tokio::task::JoinHandle<()>>,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

impl ProgressTracker {
    /// Build a tracker plus the receiving half of its channel. `capacity`
    /// bounds the channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let sender = ProgressSender {
            tx,
            start_epoch_ms: now_epoch_ms(),
        };
        let tracker = Self {
            sender: sender.clone(),
            starts: Arc::new(Mutex::new(HashMap::new())),
            heartbeat: None,
        };
        (tracker, rx)
    }

    pub fn sender(&self) -> ProgressSender {
        self.sender.clone()
    }

    /// Mark a component as `running`, recording its start time, and start
    /// (or restart) the heartbeat against it.
    pub async fn start(&mut self, id: &str, group: ComponentGroup, title: &str, description: &str) {
        let now = Instant::now();
        self.starts.lock().await.insert(id.to_string(), now);
        self.sender.send(ProgressEvent::component(
            ComponentUpdate {
                id: id.to_string(),
                group,
                title: title.to_string(),
                status: ComponentStatus::Running,
                description: description.to_string(),
                start_time: self.sender.elapsed_ms(),
                duration_ms: 1,
            },
            self.sender.elapsed_ms(),
        ));

        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
        let sender = self.sender.clone();
        let starts = Arc::clone(&self.starts);
        let id = id.to_string();
        let group_copy = group;
        let title = title.to_string();
        let description = description.to_string();
        self.heartbeat = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                let elapsed_ms = {
                    let guard = starts.lock().await;
                    match guard.get(&id) {
                        Some(start) => start.elapsed().as_millis().max(1) as u64,
                        None => return,
                    }
                };
                sender.send(ProgressEvent::component(
                    ComponentUpdate {
                        id: id.clone(),
                        group: group_copy,
                        title: title.clone(),
                        status: ComponentStatus::Running,
                        description: description.clone(),
                        start_time: sender.elapsed_ms().saturating_sub(elapsed_ms),
                        duration_ms: elapsed_ms,
                    },
                    sender.elapsed_ms(),
                ));
            }
        }));
    }

    /// Mark a component finished or errored, stop its heartbeat, and emit
    /// the terminal update with a duration floor of 1ms.
    pub async fn finish(
        &mut self,
        id: &str,
        group: ComponentGroup,
        title: &str,
        description: &str,
        status: ComponentStatus,
    ) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
        let duration_ms = {
            let guard = self.starts.lock().await;
            guard
                .get(id)
                .map(|start| start.elapsed().as_millis().max(1) as u64)
                .unwrap_or(1)
        };
        self.sender.send(ProgressEvent::component(
            ComponentUpdate {
                id: id.to_string(),
                group,
                title: title.to_string(),
                status,
                description: description.to_string(),
                start_time: self.sender.elapsed_ms().saturating_sub(duration_ms),
                duration_ms,
            },
            self.sender.elapsed_ms(),
        ));
    }

    pub fn complete(&self, result: serde_json::Value) {
        self.sender
            .send(ProgressEvent::complete(result, self.sender.elapsed_ms()));
    }

    pub fn error(&self, error: impl Into<String>) {
        self.sender
            .send(ProgressEvent::error(error, self.sender.elapsed_ms()));
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_then_finish_has_floor_duration() {
        let (mut tracker, mut rx) = ProgressTracker::new(16);
        tracker
            .start("abi_resolver", ComponentGroup::Decoding, "ABI resolver", "running")
            .await;
        tracker
            .finish(
                "abi_resolver",
                ComponentGroup::Decoding,
                "ABI resolver",
                "done",
                ComponentStatus::Finished,
            )
            .await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.component.unwrap().status, ComponentStatus::Running);
        let second = rx.recv().await.unwrap();
        let update = second.component.unwrap();
        assert_eq!(update.status, ComponentStatus::Finished);
        assert!(update.duration_ms >= 1);
    }

    #[tokio::test]
    async fn closed_receiver_does_not_panic_sender() {
        let (mut tracker, rx) = ProgressTracker::new(1);
        drop(rx);
        tracker
            .start("x", ComponentGroup::Data, "X", "running")
            .await;
        tracker
            .finish("x", ComponentGroup::Data, "X", "done", ComponentStatus::Finished)
            .await;
        // No panic means pass.
    }
}
