//! Message renderer — builds the outgoing activity for a notification.
//!
//! Card layout is presentation, not delivery contract: the dispatcher posts
//! whatever this produces without looking inside.

use herald_common::types::{MessagePayload, Notification};

pub struct MessageRenderer;

impl MessageRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render the activity posted into the recipient's conversation: a
    /// message carrying one adaptive-card attachment built from the
    /// notification's authored fields.
    pub fn render(&self, notification: &Notification) -> MessagePayload {
        let mut body = vec![serde_json::json!({
            "type": "TextBlock",
            "size": "Large",
            "weight": "Bolder",
            "text": notification.title,
            "wrap": true
        })];

        if !notification.author.is_empty() {
            body.push(serde_json::json!({
                "type": "TextBlock",
                "isSubtle": true,
                "spacing": "None",
                "text": notification.author,
                "wrap": true
            }));
        }
        if !notification.summary.is_empty() {
            body.push(serde_json::json!({
                "type": "TextBlock",
                "text": notification.summary,
                "wrap": true
            }));
        }
        if !notification.body.is_empty() {
            body.push(serde_json::json!({
                "type": "TextBlock",
                "text": notification.body,
                "wrap": true
            }));
        }

        let mut content = serde_json::json!({
            "type": "AdaptiveCard",
            "version": "1.2",
            "body": body
        });

        if let Some(url) = &notification.action_url {
            content["actions"] = serde_json::json!([{
                "type": "Action.OpenUrl",
                "title": "Read more",
                "url": url
            }]);
        }

        MessagePayload {
            activity: serde_json::json!({
                "type": "message",
                "summary": notification.title,
                "attachments": [{
                    "contentType": "application/vnd.microsoft.card.adaptive",
                    "content": content
                }]
            }),
        }
    }
}

impl Default for MessageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use herald_common::types::NotificationStatus;
    use uuid::Uuid;

    fn make_notification(action_url: Option<&str>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            title: "Quarterly update".to_string(),
            summary: "Numbers are in".to_string(),
            body: "Read the full report before Friday.".to_string(),
            author: "Comms team".to_string(),
            action_url: action_url.map(str::to_string),
            status: NotificationStatus::Sending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_carries_authored_fields() {
        let payload = MessageRenderer::new().render(&make_notification(None));
        let text = payload.activity.to_string();
        assert!(text.contains("Quarterly update"));
        assert!(text.contains("Comms team"));
        assert!(text.contains("Read the full report"));
        assert_eq!(payload.activity["type"], "message");
    }

    #[test]
    fn test_render_action_url_optional() {
        let without = MessageRenderer::new().render(&make_notification(None));
        assert!(
            without.activity["attachments"][0]["content"]
                .get("actions")
                .is_none()
        );

        let with =
            MessageRenderer::new().render(&make_notification(Some("https://intranet/report")));
        assert_eq!(
            with.activity["attachments"][0]["content"]["actions"][0]["url"],
            "https://intranet/report"
        );
    }

    #[test]
    fn test_render_skips_empty_blocks() {
        let mut notification = make_notification(None);
        notification.author = String::new();
        notification.summary = String::new();
        let payload = MessageRenderer::new().render(&notification);
        let blocks = payload.activity["attachments"][0]["content"]["body"]
            .as_array()
            .unwrap()
            .len();
        // title + body only
        assert_eq!(blocks, 2);
    }
}
