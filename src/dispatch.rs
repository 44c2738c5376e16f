//! Per-target delivery of one accepted queue item.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::queue::{MediaKind, QueueItem};
use crate::store::Store;
use crate::transport::RelayTransport;

/// Result of one delivery attempt. `Ok` carries the sent message id.
pub struct DeliveryOutcome {
    pub target: i64,
    pub result: Result<i64, String>,
}

/// Deep link back to the original message. Only channels/supergroups carry
/// the `-100` internal-id prefix that t.me/c links are built from.
pub fn origin_link(chat_id: i64, message_id: i32) -> Option<String> {
    let raw = chat_id.to_string();
    let internal = raw.strip_prefix("-100")?;
    Some(format!("https://t.me/c/{internal}/{message_id}"))
}

/// Sends the item to every target in turn. A failure for one target is
/// logged and does not abort delivery to the rest. Each success appends a
/// stat record, persisted immediately.
pub async fn dispatch(
    transport: &dyn RelayTransport,
    store: &Arc<Mutex<Store>>,
    item: &QueueItem,
    targets: &[i64],
    text: &str,
    attach_origin_link: bool,
) -> Vec<DeliveryOutcome> {
    let link = if attach_origin_link {
        origin_link(item.origin_chat, item.origin_message_id)
    } else {
        None
    };

    let mut outcomes = Vec::with_capacity(targets.len());
    for &target in targets {
        let result = match &item.media {
            MediaKind::Text => transport.send_text(target, text, link.as_deref()).await,
            MediaKind::Photo(file) => {
                transport
                    .send_photo(target, file.clone(), text, link.as_deref())
                    .await
            }
            MediaKind::Video(file) => {
                transport
                    .send_video(target, file.clone(), text, link.as_deref())
                    .await
            }
            MediaKind::Document(file) => {
                transport
                    .send_document(target, file.clone(), text, link.as_deref())
                    .await
            }
        };

        match &result {
            Ok(message_id) => {
                info!(
                    "Relayed msg {} from {} to {} (new msg {})",
                    item.origin_message_id, item.origin_chat, target, message_id
                );
                let now = Utc::now().timestamp_millis();
                let mut store = store.lock().await;
                if let Err(e) = store.record_delivery(item.origin_chat, target, now) {
                    warn!("Failed to persist delivery stat: {e}");
                }
            }
            Err(e) => {
                warn!(
                    "Forwarding from {} to {target} failed: {e}",
                    item.origin_chat
                );
            }
        }
        outcomes.push(DeliveryOutcome { target, result });
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::{open_test_store, RecordingTransport};
    use teloxide::types::FileId;

    fn item(media: MediaKind) -> QueueItem {
        QueueItem {
            origin_chat: -1001234567890,
            origin_message_id: 77,
            sender: None,
            text: "raw".into(),
            media,
        }
    }

    #[test]
    fn test_origin_link_for_channel() {
        assert_eq!(
            origin_link(-1001234567890, 77).as_deref(),
            Some("https://t.me/c/1234567890/77")
        );
    }

    #[test]
    fn test_no_origin_link_for_plain_chat() {
        assert_eq!(origin_link(123456, 77), None);
        assert_eq!(origin_link(-987654, 77), None);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_target() {
        let (store, _dir) = open_test_store();
        let transport = RecordingTransport::failing_for(&[10]);

        let outcomes = dispatch(
            &transport,
            &store,
            &item(MediaKind::Text),
            &[10, 20],
            "привет",
            false,
        )
        .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].target, 10);
        assert!(outcomes[0].result.is_err());
        assert_eq!(outcomes[1].target, 20);
        assert!(outcomes[1].result.is_ok());
        // The second target still received the message.
        assert_eq!(transport.sent(), vec![(20, "привет".to_string())]);
    }

    #[tokio::test]
    async fn test_records_stats_only_for_successes() {
        let (store, _dir) = open_test_store();
        let transport = RecordingTransport::failing_for(&[10]);

        dispatch(
            &transport,
            &store,
            &item(MediaKind::Text),
            &[10, 20],
            "x",
            false,
        )
        .await;

        let store = store.lock().await;
        let stats = store.deliveries_since(0);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].target, 20);
        assert_eq!(stats[0].source, -1001234567890);
    }

    #[tokio::test]
    async fn test_media_kinds_use_matching_send() {
        let (store, _dir) = open_test_store();
        let transport = RecordingTransport::default();

        for media in [
            MediaKind::Photo(FileId("f1".into())),
            MediaKind::Video(FileId("f2".into())),
            MediaKind::Document(FileId("f3".into())),
        ] {
            dispatch(&transport, &store, &item(media), &[5], "cap", true).await;
        }
        assert_eq!(
            transport.kinds(),
            vec!["photo".to_string(), "video".to_string(), "document".to_string()]
        );
        // Origin link was attached for the -100… source chat.
        assert!(transport
            .links()
            .iter()
            .all(|l| l.as_deref() == Some("https://t.me/c/1234567890/77")));
    }
}
