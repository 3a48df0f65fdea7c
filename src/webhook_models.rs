use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level WhatsApp Cloud API webhook payload.
///
/// One POST can carry several entries, each with several changes; every change
/// holds inbound messages and/or delivery-status updates.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

impl WebhookPayload {
    /// Flatten the nested entry/changes structure into uniform event lists.
    pub fn into_events(self) -> (Vec<InboundMessage>, Vec<StatusUpdate>, Vec<WebhookContact>) {
        let mut messages = Vec::new();
        let mut statuses = Vec::new();
        let mut contacts = Vec::new();

        for entry in self.entry {
            for change in entry.changes {
                messages.extend(change.value.messages);
                statuses.extend(change.value.statuses);
                contacts.extend(change.value.contacts);
            }
        }

        (messages, statuses, contacts)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messaging_product: String,

    #[serde(default)]
    pub contacts: Vec<WebhookContact>,

    #[serde(default)]
    pub messages: Vec<InboundMessage>,

    #[serde(default)]
    pub statuses: Vec<StatusUpdate>,

    /// Raw value for any additional fields
    #[serde(flatten)]
    pub raw: Value,
}

/// Sender contact profile attached to inbound messages.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookContact {
    #[serde(default)]
    pub wa_id: String,
    pub profile: Option<ContactProfile>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContactProfile {
    pub name: Option<String>,
}

/// One inbound message event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InboundMessage {
    pub id: String,

    /// Sender phone in wa_id form (digits, no leading +).
    pub from: String,

    #[serde(default)]
    pub timestamp: String,

    #[serde(rename = "type", default)]
    pub message_type: String,

    pub text: Option<TextBody>,

    /// Raw message data for any additional fields
    #[serde(flatten)]
    pub raw: Value,
}

impl InboundMessage {
    pub fn body(&self) -> &str {
        self.text.as_ref().map(|t| t.body.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

/// Delivery-status update for a previously sent message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusUpdate {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub recipient_id: String,

    /// Raw status data for any additional fields
    #[serde(flatten)]
    pub raw: Value,
}

/// Verification handshake query parameters (GET side of the webhook).
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Response body for webhook POSTs.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: String,
    pub received: usize,
    pub processed: usize,
    pub duplicates: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inbound_message_payload() {
        let json = r#"
        {
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "entry1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "contacts": [{
                            "wa_id": "351912345678",
                            "profile": { "name": "Ana Silva" }
                        }],
                        "messages": [{
                            "id": "wamid.test123",
                            "from": "351912345678",
                            "timestamp": "1736937600",
                            "type": "text",
                            "text": { "body": "I want a BMW under 20" }
                        }]
                    }
                }]
            }]
        }
        "#;

        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        let (messages, statuses, contacts) = payload.into_events();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].from, "351912345678");
        assert_eq!(messages[0].body(), "I want a BMW under 20");
        assert!(statuses.is_empty());
        assert_eq!(
            contacts[0].profile.as_ref().unwrap().name.as_deref(),
            Some("Ana Silva")
        );
    }

    #[test]
    fn test_parse_status_update_payload() {
        let json = r#"
        {
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "entry1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "statuses": [{
                            "id": "wamid.test123",
                            "status": "delivered",
                            "timestamp": "1736937700",
                            "recipient_id": "351912345678"
                        }]
                    }
                }]
            }]
        }
        "#;

        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        let (messages, statuses, _) = payload.into_events();

        assert!(messages.is_empty());
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status, "delivered");
    }

    #[test]
    fn test_non_text_message_has_empty_body() {
        let json = r#"
        {
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messages": [{
                            "id": "wamid.audio1",
                            "from": "351912345678",
                            "type": "audio"
                        }]
                    }
                }]
            }]
        }
        "#;

        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        let (messages, _, _) = payload.into_events();
        assert_eq!(messages[0].body(), "");
        assert_eq!(messages[0].message_type, "audio");
    }
}
