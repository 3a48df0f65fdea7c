use crate::config::Config;
use crate::errors::AppError;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use serde_json::json;
use std::time::Duration;

/// Client for sending text messages through the WhatsApp Cloud API.
///
/// Sends are fire-and-forget: no delivery guarantee is surfaced to callers,
/// and no retries are attempted. Callers that must not fail on a send use
/// [`WhatsAppClient::send_text_best_effort`].
#[derive(Clone)]
pub struct WhatsAppClient {
    client: reqwest::Client,
    base_url: String,
    phone_number_id: String,
    token: String,
}

impl WhatsAppClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create WhatsApp client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.whatsapp_api_base_url.clone(),
            phone_number_id: config.whatsapp_phone_number_id.clone(),
            token: config.whatsapp_token.clone(),
        })
    }

    /// Send a text message to a phone number.
    pub async fn send_text(&self, to: &str, body: &str) -> Result<(), AppError> {
        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": { "body": body }
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("WhatsApp request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "WhatsApp API returned {}: {}",
                status, error_text
            )));
        }

        tracing::debug!("WhatsApp message sent to {}", to);
        Ok(())
    }

    /// Send a text message, swallowing any failure with a warning.
    ///
    /// Used everywhere a message is a side effect of already-committed state:
    /// a failed send must never roll back or abort the surrounding work.
    pub async fn send_text_best_effort(&self, to: &str, body: &str) {
        if let Err(e) = self.send_text(to, body).await {
            tracing::warn!("Failed to send WhatsApp message to {}: {}", to, e);
        }
    }
}

/// Validate and normalize a Portuguese phone number.
///
/// Parses with the PT region, validates, and returns the E.164 form
/// (+351912345678). Returns `(false, reason)` for numbers that do not parse
/// or are not valid Portuguese numbers.
pub fn validate_pt_phone(raw: &str) -> (bool, String) {
    if raw.trim().is_empty() || raw.len() < 8 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(CountryId::PT), raw) {
        Ok(number) => {
            if phonenumber::is_valid(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("Valid PT phone: {} -> {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::warn!("Invalid PT phone number: {}", raw);
                (false, "Invalid Portuguese phone number".to_string())
            }
        }
        Err(e) => {
            tracing::warn!("Failed to parse PT phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}

/// Digits-only form of a phone number, used as the lead lookup key.
///
/// The messaging channel delivers sender ids with or without a leading `+`;
/// stripping everything but digits makes lookups insensitive to that.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_plus_and_formatting() {
        assert_eq!(normalize_phone("+351 912 345 678"), "351912345678");
        assert_eq!(normalize_phone("351912345678"), "351912345678");
        assert_eq!(normalize_phone("(351) 912-345-678"), "351912345678");
    }

    #[test]
    fn valid_portuguese_mobile_normalizes_to_e164() {
        let (valid, normalized) = validate_pt_phone("912345678");
        assert!(valid);
        assert_eq!(normalized, "+351912345678");

        let (valid, normalized) = validate_pt_phone("+351912345678");
        assert!(valid);
        assert_eq!(normalized, "+351912345678");
    }

    #[test]
    fn invalid_phones_rejected() {
        let (valid, _) = validate_pt_phone("1234");
        assert!(!valid);

        let (valid, _) = validate_pt_phone("");
        assert!(!valid);

        let (valid, _) = validate_pt_phone("   ");
        assert!(!valid);
    }
}
