//! Conversation history — per-chat transcript kept as JSON so messages sent
//! on a schedule show up in the assistant's context like any other reply.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use herald_core::error::Result;
use herald_core::traits::DeliveryPort;
use serde::{Deserialize, Serialize};

const FILE_NAME: &str = "conversation_history.json";

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: String,
    pub content: String,
}

/// Chat id → turns, persisted after every append.
pub struct ConversationHistory {
    path: PathBuf,
    turns: Mutex<BTreeMap<String, Vec<Turn>>>,
}

impl ConversationHistory {
    /// Open the history file in `dir`. A missing file starts empty.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(FILE_NAME);
        let turns = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            turns: Mutex::new(turns),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, chat_id: &str) -> Vec<Turn> {
        self.lock().get(chat_id).cloned().unwrap_or_default()
    }

    /// Append a turn and persist the whole history.
    pub fn add(&self, chat_id: &str, role: &str, content: &str) -> Result<()> {
        let mut turns = self.lock();
        let mut next = turns.clone();
        next.entry(chat_id.to_string()).or_default().push(Turn {
            role: role.to_string(),
            content: content.to_string(),
        });
        self.write(&next)?;
        *turns = next;
        Ok(())
    }

    fn write(&self, turns: &BTreeMap<String, Vec<Turn>>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(turns)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<Turn>>> {
        self.turns.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Delivery decorator: after a successful send, record the payload as an
/// `assistant` turn in the recipient's history.
pub struct RecordingDelivery<D> {
    inner: D,
    history: Arc<ConversationHistory>,
}

impl<D: DeliveryPort> RecordingDelivery<D> {
    pub fn new(inner: D, history: Arc<ConversationHistory>) -> Self {
        Self { inner, history }
    }
}

#[async_trait]
impl<D: DeliveryPort> DeliveryPort for RecordingDelivery<D> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn deliver(&self, recipient: &str, payload: &str) -> Result<()> {
        self.inner.deliver(recipient, payload).await?;

        // The message is already out; a history write failure must not turn
        // the job into a failed delivery.
        let history = self.history.clone();
        let (chat_id, content) = (recipient.to_string(), payload.to_string());
        let recorded =
            tokio::task::spawn_blocking(move || history.add(&chat_id, "assistant", &content)).await;
        match recorded {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("⚠️ Delivered to {recipient} but failed to record history: {e}")
            }
            Err(e) => tracing::warn!("⚠️ History writer for {recipient} did not finish: {e}"),
        }
        Ok(())
    }
}
