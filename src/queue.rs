//! Single-consumer forward queue.
//!
//! Inbound messages are snapshotted into `QueueItem`s and pushed onto an
//! unbounded channel. Exactly one worker task drains it: one item at a time,
//! strict arrival order, with a fixed delay between items to stay under the
//! transport's rate limits. All admission checks (forwarding toggle, filter
//! gate, pair lookup) run at dequeue time, so configuration changes apply to
//! items that were already queued.

use std::sync::Arc;
use std::time::Duration;

use teloxide::types::FileId;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::dispatch::dispatch;
use crate::gate::{should_drop, ProfanityList};
use crate::redact::clean;
use crate::store::Store;
use crate::transport::RelayTransport;

/// Immutable snapshot of one inbound message.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub origin_chat: i64,
    pub origin_message_id: i32,
    /// Sender username or chat title, for log lines only.
    pub sender: Option<String>,
    /// Text or media caption; empty for captionless media.
    pub text: String,
    pub media: MediaKind,
}

#[derive(Debug, Clone)]
pub enum MediaKind {
    Text,
    Photo(FileId),
    Video(FileId),
    Document(FileId),
}

pub struct ForwardQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl ForwardQueue {
    /// Spawns the consumer task and returns the producer handle.
    pub fn start(
        store: Arc<Mutex<Store>>,
        transport: Arc<dyn RelayTransport>,
        profanity: Arc<ProfanityList>,
        delay: Duration,
        attach_origin_link: bool,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueueItem>();

        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                process_item(&store, transport.as_ref(), &profanity, &item, attach_origin_link)
                    .await;
                sleep(delay).await;
            }
            info!("Forward queue consumer stopped");
        });

        Self { tx }
    }

    pub fn enqueue(&self, item: QueueItem) {
        if self.tx.send(item).is_err() {
            warn!("Forward queue closed, message dropped");
        }
    }
}

async fn process_item(
    store: &Arc<Mutex<Store>>,
    transport: &dyn RelayTransport,
    profanity: &ProfanityList,
    item: &QueueItem,
    attach_origin_link: bool,
) {
    // Snapshot configuration under the lock, release it before any network call.
    let (filters, targets) = {
        let store = store.lock().await;
        if !store.forwarding_enabled() {
            debug!("Forwarding disabled, skipping msg {}", item.origin_message_id);
            return;
        }
        let Some(pair) = store.lookup(item.origin_chat) else {
            return;
        };
        (store.filters().to_vec(), pair.targets.clone())
    };

    if should_drop(&item.text, &filters, profanity) {
        info!(
            "Dropped msg {} from {} ({}): banned term",
            item.origin_message_id,
            item.origin_chat,
            item.sender.as_deref().unwrap_or("-")
        );
        return;
    }

    let cleaned = clean(&item.text, &filters);
    if cleaned.is_empty() && matches!(item.media, MediaKind::Text) {
        // Nothing left to forward after redaction.
        return;
    }

    dispatch(transport, store, item, &targets, &cleaned, attach_origin_link).await;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::transport::ChatInfo;

    /// Mock transport recording every send; configured targets fail.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: StdMutex<Vec<(i64, String)>>,
        kinds: StdMutex<Vec<String>>,
        links: StdMutex<Vec<Option<String>>>,
        fail_targets: HashSet<i64>,
    }

    impl RecordingTransport {
        pub fn failing_for(targets: &[i64]) -> Self {
            Self {
                fail_targets: targets.iter().copied().collect(),
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn kinds(&self) -> Vec<String> {
            self.kinds.lock().unwrap().clone()
        }

        pub fn links(&self) -> Vec<Option<String>> {
            self.links.lock().unwrap().clone()
        }

        fn record(
            &self,
            kind: &str,
            chat_id: i64,
            text: &str,
            link: Option<&str>,
        ) -> Result<i64, String> {
            if self.fail_targets.contains(&chat_id) {
                return Err("simulated transport error".into());
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            self.kinds.lock().unwrap().push(kind.to_string());
            self.links.lock().unwrap().push(link.map(str::to_string));
            Ok(1)
        }
    }

    #[async_trait]
    impl RelayTransport for RecordingTransport {
        async fn send_text(
            &self,
            chat_id: i64,
            text: &str,
            origin_link: Option<&str>,
        ) -> Result<i64, String> {
            self.record("text", chat_id, text, origin_link)
        }

        async fn send_photo(
            &self,
            chat_id: i64,
            _file: FileId,
            caption: &str,
            origin_link: Option<&str>,
        ) -> Result<i64, String> {
            self.record("photo", chat_id, caption, origin_link)
        }

        async fn send_video(
            &self,
            chat_id: i64,
            _file: FileId,
            caption: &str,
            origin_link: Option<&str>,
        ) -> Result<i64, String> {
            self.record("video", chat_id, caption, origin_link)
        }

        async fn send_document(
            &self,
            chat_id: i64,
            _file: FileId,
            caption: &str,
            origin_link: Option<&str>,
        ) -> Result<i64, String> {
            self.record("document", chat_id, caption, origin_link)
        }

        async fn resolve_username(&self, _username: &str) -> Result<i64, String> {
            Err("not supported in tests".into())
        }

        async fn chat_info(&self, _chat_id: i64) -> Result<ChatInfo, String> {
            Err("not supported in tests".into())
        }
    }

    pub fn open_test_store() -> (Arc<Mutex<Store>>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("db.json")).unwrap();
        (Arc::new(Mutex::new(store)), dir)
    }

    fn text_item(origin_chat: i64, id: i32, text: &str) -> QueueItem {
        QueueItem {
            origin_chat,
            origin_message_id: id,
            sender: None,
            text: text.to_string(),
            media: MediaKind::Text,
        }
    }

    async fn drained(transport: &RecordingTransport, expected: usize) -> Vec<(i64, String)> {
        // Poll instead of a fixed long sleep; the worker runs with a 1ms delay.
        for _ in 0..200 {
            sleep(Duration::from_millis(5)).await;
            let sent = transport.sent();
            if sent.len() >= expected {
                return sent;
            }
        }
        transport.sent()
    }

    #[tokio::test]
    async fn test_items_dispatched_in_arrival_order() {
        let (store, _dir) = open_test_store();
        store.lock().await.upsert_targets(-1, &[10]).unwrap();
        let transport = Arc::new(RecordingTransport::default());

        let queue = ForwardQueue::start(
            store,
            transport.clone(),
            Arc::new(ProfanityList::default()),
            Duration::from_millis(1),
            false,
        );
        queue.enqueue(text_item(-1, 1, "A"));
        queue.enqueue(text_item(-1, 2, "B"));
        queue.enqueue(text_item(-1, 3, "C"));

        let sent = drained(&transport, 3).await;
        let texts: Vec<&str> = sent.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_disabled_forwarding_drops_items() {
        let (store, _dir) = open_test_store();
        {
            let mut store = store.lock().await;
            store.upsert_targets(-1, &[10]).unwrap();
            store.set_forwarding(false).unwrap();
        }
        let transport = Arc::new(RecordingTransport::default());

        let queue = ForwardQueue::start(
            store.clone(),
            transport.clone(),
            Arc::new(ProfanityList::default()),
            Duration::from_millis(1),
            false,
        );
        queue.enqueue(text_item(-1, 1, "hidden"));
        sleep(Duration::from_millis(50)).await;
        assert!(transport.sent().is_empty());

        // Re-enabling applies to later items.
        store.lock().await.set_forwarding(true).unwrap();
        queue.enqueue(text_item(-1, 2, "visible"));
        let sent = drained(&transport, 1).await;
        assert_eq!(sent, vec![(10, "visible".to_string())]);
    }

    #[tokio::test]
    async fn test_filter_gate_checked_at_dequeue() {
        let (store, _dir) = open_test_store();
        store.lock().await.upsert_targets(-1, &[10]).unwrap();
        let transport = Arc::new(RecordingTransport::default());

        let queue = ForwardQueue::start(
            store,
            transport.clone(),
            Arc::new(ProfanityList::default()),
            Duration::from_millis(1),
            false,
        );
        // "торг" is in the default filter list.
        queue.enqueue(text_item(-1, 1, "возможен ТОРГ"));
        queue.enqueue(text_item(-1, 2, "нормальное объявление"));

        let sent = drained(&transport, 1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "нормальное объявление");
    }

    #[tokio::test]
    async fn test_unpaired_source_is_ignored() {
        let (store, _dir) = open_test_store();
        let transport = Arc::new(RecordingTransport::default());

        let queue = ForwardQueue::start(
            store,
            transport.clone(),
            Arc::new(ProfanityList::default()),
            Duration::from_millis(1),
            false,
        );
        queue.enqueue(text_item(-99, 1, "no pair for me"));
        sleep(Duration::from_millis(50)).await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_fully_redacted_text_message_not_sent() {
        let (store, _dir) = open_test_store();
        store.lock().await.upsert_targets(-1, &[10]).unwrap();
        let transport = Arc::new(RecordingTransport::default());

        let queue = ForwardQueue::start(
            store,
            transport.clone(),
            Arc::new(ProfanityList::default()),
            Duration::from_millis(1),
            false,
        );
        // Nothing but a phone number: redaction leaves an empty body.
        queue.enqueue(text_item(-1, 1, "+7 912 345 67 89"));
        sleep(Duration::from_millis(50)).await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_captionless_media_is_forwarded() {
        let (store, _dir) = open_test_store();
        store.lock().await.upsert_targets(-1, &[10]).unwrap();
        let transport = Arc::new(RecordingTransport::default());

        let queue = ForwardQueue::start(
            store,
            transport.clone(),
            Arc::new(ProfanityList::default()),
            Duration::from_millis(1),
            false,
        );
        queue.enqueue(QueueItem {
            origin_chat: -1,
            origin_message_id: 1,
            sender: None,
            text: String::new(),
            media: MediaKind::Photo(FileId("f".into())),
        });
        let sent = drained(&transport, 1).await;
        assert_eq!(sent, vec![(10, String::new())]);
        assert_eq!(transport.kinds(), vec!["photo".to_string()]);
    }
}
