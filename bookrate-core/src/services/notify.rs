use chrono::Utc;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::content::ContentRef;
use crate::domain::{Notification, NotificationKind};
use crate::storage::Storage;

/// Create a notification, swallowing failures. A broken notification must
/// never fail the operation that triggered it.
pub(super) async fn notify(
    storage: &dyn Storage,
    recipient: Uuid,
    kind: NotificationKind,
    source: Option<ContentRef>,
    message: String,
) {
    let mut notification = Notification {
        id: None,
        user_id: recipient,
        kind,
        source,
        payload: json!({ "message": message }),
        is_read: false,
        created_at: Utc::now(),
    };
    if let Err(e) = storage.create_notification(&mut notification).await {
        warn!(
            "Failed to create {} notification for user {}: {}",
            kind.as_str(),
            recipient,
            e
        );
    }
}
