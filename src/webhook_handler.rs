//! WhatsApp Cloud API webhook handler.
//!
//! GET performs the platform verification handshake; POST receives inbound
//! messages and delivery-status updates. The POST side always answers 200 —
//! a non-2xx response would make the platform retry the delivery, and the
//! pipeline is at-most-once by design. Redelivered message ids are dropped
//! via a short-lived dedup cache.

use crate::errors::AppError;
use crate::handlers::AppState;
use crate::messaging::{normalize_phone, validate_pt_phone};
use crate::models::{Intent, Lead, LeadMeta, LeadStatus};
use crate::preferences::extract_intent;
use crate::webhook_models::{
    InboundMessage, StatusUpdate, VerifyParams, WebhookContact, WebhookPayload, WebhookResponse,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

/// GET /api/v1/webhooks/whatsapp
///
/// Webhook verification handshake: echo the challenge when the verify token
/// matches, 403 otherwise.
pub async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    let mode_ok = params.mode.as_deref() == Some("subscribe");
    let token_ok = params.verify_token.as_deref() == Some(state.config.whatsapp_verify_token.as_str());

    if mode_ok && token_ok {
        let challenge = params.challenge.unwrap_or_default();
        tracing::info!("Webhook verification handshake accepted");
        (StatusCode::OK, challenge).into_response()
    } else {
        tracing::warn!("Webhook verification rejected");
        StatusCode::FORBIDDEN.into_response()
    }
}

/// POST /api/v1/webhooks/whatsapp
///
/// Processes every message and status in the payload; failures are logged per
/// event and never surfaced to the platform.
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookPayload>,
) -> (StatusCode, Json<WebhookResponse>) {
    let (messages, statuses, contacts) = payload.into_events();
    let total_received = messages.len() + statuses.len();
    tracing::info!(
        "Received webhook: {} message(s), {} status update(s)",
        messages.len(),
        statuses.len()
    );

    let mut processed = 0;
    let mut duplicates = 0;

    for message in messages {
        // Drop platform redeliveries of the same message id
        if state.processed_messages_cache.get(&message.id).await.is_some() {
            duplicates += 1;
            tracing::debug!("Skipped duplicate message {}", message.id);
            continue;
        }
        state.processed_messages_cache.insert(message.id.clone(), 1).await;

        match process_inbound_message(&state, &message, &contacts).await {
            Ok(()) => processed += 1,
            Err(e) => {
                tracing::error!("Failed to process message {}: {}", message.id, e);
            }
        }
    }

    for status in statuses {
        if let Err(e) = apply_status_update(&state, &status).await {
            tracing::error!("Failed to apply status update {}: {}", status.id, e);
        } else {
            processed += 1;
        }
    }

    (
        StatusCode::OK,
        Json(WebhookResponse {
            status: "received".to_string(),
            received: total_received,
            processed,
            duplicates,
        }),
    )
}

/// Lead capture for one inbound message: find-or-create the lead, log the
/// message, reply, and hand off to the automation pipeline in the background.
async fn process_inbound_message(
    state: &Arc<AppState>,
    message: &InboundMessage,
    contacts: &[WebhookContact],
) -> Result<(), AppError> {
    let body = message.body();
    let normalized = normalize_phone(&message.from);
    tracing::info!(
        "[INBOUND] from={} type={} text={:.50}",
        message.from,
        message.message_type,
        body
    );

    let contact_name = contacts
        .iter()
        .find(|c| c.wa_id == message.from)
        .and_then(|c| c.profile.as_ref())
        .and_then(|p| p.name.clone());

    let intent = extract_intent(body);
    let leads = state.automation.leads();

    let lead = match leads.find_by_normalized_phone(&normalized).await? {
        Some(lead) => update_existing_lead(state, lead, body, intent, contact_name).await?,
        None => {
            create_new_lead(state, &message.from, &normalized, body, intent, contact_name).await?
        }
    };

    state
        .automation
        .messages()
        .log_inbound(&message.id, &message.from, Some(body), &message.message_type)
        .await?;

    // Automation runs detached; the webhook answers the platform immediately
    let automation = state.automation.clone();
    let lead_id = lead.id;
    let body = body.to_string();
    tokio::spawn(async move {
        let outcome = automation
            .process_incoming_message(lead_id, &body, Utc::now())
            .await;
        if !outcome.success {
            tracing::error!(
                "Background automation failed for lead {}: {:?}",
                lead_id,
                outcome.error
            );
        }
    });

    Ok(())
}

async fn create_new_lead(
    state: &Arc<AppState>,
    raw_phone: &str,
    normalized: &str,
    body: &str,
    intent: Intent,
    contact_name: Option<String>,
) -> Result<Lead, AppError> {
    let now = Utc::now();

    // The platform delivers wa_id digits without a +; store the E.164 form
    // when the number validates, the raw id otherwise
    let (valid, e164) = validate_pt_phone(&format!("+{}", raw_phone));
    let phone = if valid { e164 } else { raw_phone.to_string() };

    let meta = LeadMeta {
        first_message: Some(body.to_string()),
        last_whatsapp_message: Some(body.to_string()),
        last_contact_date: Some(now),
        message_count: 1,
        ..Default::default()
    };

    let lead = state
        .automation
        .leads()
        .insert(crate::db_storage::NewLead {
            phone: phone.clone(),
            normalized_phone: normalized.to_string(),
            name: contact_name,
            source: "whatsapp".to_string(),
            intent,
            automation_status_reason: "whatsapp_inbound_message".to_string(),
            meta,
        })
        .await?;

    tracing::info!("New lead created: {}", lead.id);

    state
        .whatsapp
        .send_text_best_effort(&phone, &welcome_message(intent, &state.config.dealership_name))
        .await;

    Ok(lead)
}

async fn update_existing_lead(
    state: &Arc<AppState>,
    mut lead: Lead,
    body: &str,
    extracted_intent: Intent,
    contact_name: Option<String>,
) -> Result<Lead, AppError> {
    let now = Utc::now();
    let leads = state.automation.leads();

    lead.meta.last_whatsapp_message = Some(body.to_string());
    lead.meta.last_contact_date = Some(now);
    lead.meta.message_count += 1;

    // A generic message does not downgrade an intent we already classified
    let intent = if extracted_intent != Intent::GeneralInquiry {
        extracted_intent
    } else {
        lead.intent
    };
    lead.intent = intent;

    leads
        .update_after_message(lead.id, intent, "whatsapp_follow_up", &lead.meta)
        .await?;

    if let Some(ref name) = contact_name {
        if lead.name.is_none() {
            leads.set_name_if_missing(lead.id, name).await?;
            lead.name = Some(name.clone());
        }
    }

    tracing::info!("Lead updated: {}", lead.id);

    state
        .whatsapp
        .send_text_best_effort(&lead.phone, &contextual_response(&lead, body))
        .await;

    Ok(lead)
}

async fn apply_status_update(
    state: &Arc<AppState>,
    status: &StatusUpdate,
) -> Result<(), AppError> {
    tracing::debug!(
        "[STATUS] id={} status={} timestamp={}",
        status.id,
        status.status,
        status.timestamp
    );

    state
        .automation
        .messages()
        .update_status(&status.id, &status.status, &status.timestamp)
        .await
}

fn welcome_message(intent: Intent, dealership_name: &str) -> String {
    let mut message = format!("👋 Hello! Thanks for reaching out to {}. ", dealership_name);

    match intent {
        Intent::PurchaseIntent => message.push_str(
            "I see you're interested in purchasing a vehicle. I'd be happy to help you \
             find the perfect car! What type of vehicle are you looking for?",
        ),
        Intent::SellIntent => message.push_str(
            "Looking to sell or trade your vehicle? Great! We offer competitive prices. \
             What's your car's make, model, and year?",
        ),
        Intent::ServiceIntent => message.push_str(
            "Need service or maintenance? Our expert team is here to help. \
             What service do you need?",
        ),
        Intent::PricingInquiry => message.push_str(
            "Looking for pricing information? I can help you with that. \
             Which vehicle or service are you interested in?",
        ),
        _ => message.push_str(
            "How can we help you today? Whether you're buying, selling, or need \
             service, we're here to assist! 🚗",
        ),
    }

    message
}

fn contextual_response(lead: &Lead, body: &str) -> String {
    if lead.status == LeadStatus::Qualified || lead.status == LeadStatus::Hot {
        format!(
            "Thanks for your message! Your dedicated representative will get back to you \
             shortly. Is this regarding your {}?",
            lead.intent
        )
    } else if body.to_lowercase().contains("urgent") {
        "I understand this is urgent. Let me connect you with our priority team right away. 🚨"
            .to_string()
    } else {
        "Thanks for your follow-up message! We'll review this and get back to you soon. 👍"
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_message_varies_by_intent() {
        let purchase = welcome_message(Intent::PurchaseIntent, "AutoTrust");
        assert!(purchase.contains("purchasing a vehicle"));
        assert!(purchase.contains("AutoTrust"));

        let generic = welcome_message(Intent::GeneralInquiry, "AutoTrust");
        assert!(generic.contains("How can we help you today?"));
    }
}
