// Typed notification records and the push-event decoder
// Wire shape follows the backend's notification stream payloads

use serde::{Deserialize, Serialize};

use super::{NotifyError, NotifyResult};

/// A single decoded push notification.
///
/// Records are immutable once decoded; the presenter owns them for the
/// duration of their display lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Unique record identifier, also the basis of the presentation tag.
    pub id: String,
    /// Category tag, `type` on the wire (e.g. "task_due", "browser_notification").
    #[serde(rename = "type")]
    pub category: String,
    pub title: String,
    pub body: String,
    /// Presentation severity. Absent on the wire decodes as `normal`.
    #[serde(default)]
    pub urgency: Urgency,
    /// Optional application payload (navigation target, origin id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RecordPayload>,
    /// Optional per-record presentation overrides; win over computed defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<PresentationOverrides>,
}

impl NotificationRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: "notification".to_string(),
            title: title.into(),
            body: body.into(),
            urgency: Urgency::default(),
            data: None,
            options: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_data(mut self, data: RecordPayload) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_options(mut self, options: PresentationOverrides) -> Self {
        self.options = Some(options);
        self
    }

    /// Navigation target carried by the record, if any.
    pub fn navigation_url(&self) -> Option<&str> {
        self.data.as_ref()?.url.as_deref()
    }
}

/// Tri-level severity classification controlling presentation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Silent, auto-dismissed presentation.
    #[default]
    Normal,
    /// Audible, requires interaction to dismiss early.
    Urgent,
    /// Never auto-dismissed by the presenter.
    Critical,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Urgency::Normal => "normal",
            Urgency::Urgent => "urgent",
            Urgency::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl Urgency {
    /// Whether the platform should keep the notification up until the user
    /// acts on it.
    pub fn requires_interaction(&self) -> bool {
        !matches!(self, Urgency::Normal)
    }

    /// Whether presentation should be silent.
    pub fn is_silent(&self) -> bool {
        matches!(self, Urgency::Normal)
    }

    /// Whether the presenter may ever auto-dismiss this notification.
    pub fn auto_dismisses(&self) -> bool {
        !matches!(self, Urgency::Critical)
    }
}

/// Application payload attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Navigation URL handed to the embedder when the notification is clicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Identifier of the originating server-side notification, when distinct
    /// from the record id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
}

/// Per-record presentation overrides, camelCase on the wire.
///
/// Any field set here takes precedence over the presenter's computed
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresentationOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_interaction: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silent: Option<bool>,
}

/// Diagnostic payload of the server's `connected` handshake event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamHandshake {
    pub status: String,
    pub user_id: String,
}

/// Decode the payload of a `notification` channel event.
///
/// Failures are recoverable by design: the caller logs and drops the single
/// message, the stream stays open.
pub fn decode_record(payload: &str) -> NotifyResult<NotificationRecord> {
    serde_json::from_str(payload).map_err(|source| NotifyError::Decode {
        channel: "notification",
        source,
    })
}

/// Decode the payload of the `connected` handshake event.
pub fn decode_handshake(payload: &str) -> NotifyResult<StreamHandshake> {
    serde_json::from_str(payload).map_err(|source| NotifyError::Decode {
        channel: "connected",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_wire_record() {
        let payload = r#"{
            "id": "n1",
            "type": "task_due",
            "title": "Task due",
            "body": "Finish the quarterly report",
            "urgency": "urgent",
            "data": {"url": "/dashboard", "notification_id": "srv-42"},
            "options": {"tag": "custom-tag", "requireInteraction": false, "silent": true}
        }"#;

        let record = decode_record(payload).expect("valid payload");
        assert_eq!(record.id, "n1");
        assert_eq!(record.category, "task_due");
        assert_eq!(record.urgency, Urgency::Urgent);
        assert_eq!(record.navigation_url(), Some("/dashboard"));

        let options = record.options.expect("options present");
        assert_eq!(options.tag.as_deref(), Some("custom-tag"));
        assert_eq!(options.require_interaction, Some(false));
        assert_eq!(options.silent, Some(true));
    }

    #[test]
    fn decodes_minimal_record_with_default_urgency() {
        let payload = r#"{"id": "n2", "type": "info", "title": "Hi", "body": "there"}"#;
        let record = decode_record(payload).expect("valid payload");
        assert_eq!(record.urgency, Urgency::Normal);
        assert!(record.data.is_none());
        assert!(record.options.is_none());
    }

    #[test]
    fn rejects_non_json_payload() {
        let err = decode_record("not json").expect_err("must fail");
        assert!(matches!(
            err,
            NotifyError::Decode {
                channel: "notification",
                ..
            }
        ));
    }

    #[test]
    fn rejects_wrong_shape() {
        // Valid JSON, missing required fields.
        assert!(decode_record(r#"{"id": "n3"}"#).is_err());
    }

    #[test]
    fn urgency_policy_table() {
        assert!(!Urgency::Normal.requires_interaction());
        assert!(Urgency::Urgent.requires_interaction());
        assert!(Urgency::Critical.requires_interaction());

        assert!(Urgency::Normal.is_silent());
        assert!(!Urgency::Urgent.is_silent());

        assert!(Urgency::Normal.auto_dismisses());
        assert!(Urgency::Urgent.auto_dismisses());
        assert!(!Urgency::Critical.auto_dismisses());
    }

    #[test]
    fn decodes_handshake() {
        let handshake =
            decode_handshake(r#"{"status": "connected", "user_id": "user-123"}"#).expect("valid");
        assert_eq!(handshake.status, "connected");
        assert_eq!(handshake.user_id, "user-123");
    }
}
