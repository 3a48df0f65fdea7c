//! Time-based follow-up scheduler.
//!
//! A polling sweep over all non-converted WhatsApp leads. Rules are evaluated
//! in priority order and at most one fires per lead per sweep; each rule
//! carries an idempotency tag recorded on the lead so it can never fire twice
//! for the same lead, making repeated sweeps convergent.

use crate::db_storage::LeadStorage;
use crate::errors::AppError;
use crate::messaging::WhatsAppClient;
use crate::models::{JourneyStage, Lead};
use chrono::{DateTime, Utc};

const TAG_4H_RECOMMENDATION: &str = "4h_recommendation";
const TAG_1H_HOT_LEAD: &str = "1h_hot_lead";
const TAG_48H_GENERAL: &str = "48h_general";
const TAG_WEEKLY: &str = "weekly";

/// Pick the follow-up rule to fire for a lead, if any.
///
/// `hours_since_contact` is measured from the last recorded interaction (or
/// lead creation when none exists). Pure; the sweep handles persistence.
pub fn follow_up_rule(lead: &Lead, hours_since_contact: f64) -> Option<&'static str> {
    let meta = &lead.meta;
    let stage = meta.journey_stage;

    if stage == JourneyStage::RecommendationsSent
        && hours_since_contact >= 4.0
        && !meta.has_fired_follow_up(TAG_4H_RECOMMENDATION)
    {
        Some(TAG_4H_RECOMMENDATION)
    } else if stage == JourneyStage::HotLead
        && hours_since_contact >= 1.0
        && !meta.has_fired_follow_up(TAG_1H_HOT_LEAD)
    {
        Some(TAG_1H_HOT_LEAD)
    } else if hours_since_contact >= 48.0 && !meta.has_fired_follow_up(TAG_48H_GENERAL) {
        Some(TAG_48H_GENERAL)
    } else if hours_since_contact >= 168.0 && !meta.has_fired_follow_up(TAG_WEEKLY) {
        Some(TAG_WEEKLY)
    } else {
        None
    }
}

/// Fixed message template for a follow-up tag.
pub fn follow_up_message(tag: &str) -> Option<&'static str> {
    match tag {
        TAG_4H_RECOMMENDATION => Some(
            "Hi! Did you get a chance to check out those car recommendations?\n\
             Any questions about specs, financing, or scheduling a visit?",
        ),
        TAG_1H_HOT_LEAD => Some(
            "Still interested in that car?\n\
             I can hold it for you with just a small deposit.\n\
             Ready to move forward?",
        ),
        TAG_48H_GENERAL => Some(
            "Hi! Just following up on your car search.\n\
             Any new requirements or questions I can help with?",
        ),
        TAG_WEEKLY => Some(
            "Hope your car search is going well!\n\
             We have some exciting new arrivals this week.\n\
             Would you like to see what's new?",
        ),
        _ => None,
    }
}

/// Sweep all non-converted WhatsApp leads and fire at most one follow-up per
/// lead. Returns the number of follow-ups sent.
///
/// Each lead is handled independently: a crash mid-sweep leaves processed
/// leads tagged and the rest untouched, and the tags make a rerun safe.
pub async fn schedule_follow_ups(
    leads: &LeadStorage,
    whatsapp: &WhatsAppClient,
    now: DateTime<Utc>,
) -> Result<u32, AppError> {
    let candidates = leads.whatsapp_leads_not_converted().await?;
    tracing::info!("Follow-up sweep over {} lead(s)", candidates.len());

    let mut sent = 0;
    for mut lead in candidates {
        let last_interaction = lead.meta.last_interaction.unwrap_or(lead.created_at);
        let hours_ago = (now - last_interaction).num_minutes() as f64 / 60.0;

        let Some(tag) = follow_up_rule(&lead, hours_ago) else {
            continue;
        };
        let Some(message) = follow_up_message(tag) else {
            continue;
        };

        whatsapp.send_text_best_effort(&lead.phone, message).await;

        lead.meta.automated_follow_ups.push(tag.to_string());
        if let Err(e) = leads.update_meta(lead.id, &lead.meta).await {
            tracing::error!("Failed to record follow-up tag for lead {}: {}", lead.id, e);
            continue;
        }

        tracing::debug!("Follow-up '{}' sent to lead {}", tag, lead.id);
        sent += 1;
    }

    tracing::info!("Follow-up sweep sent {} message(s)", sent);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeadMeta;
    use uuid::Uuid;

    fn lead_in_stage(stage: JourneyStage) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            phone: "+351912345678".to_string(),
            normalized_phone: "351912345678".to_string(),
            name: None,
            email: None,
            source: "whatsapp".to_string(),
            intent: Default::default(),
            status: Default::default(),
            automation_status_reason: None,
            automation_status_at: None,
            meta: LeadMeta {
                journey_stage: stage,
                ..Default::default()
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn recommendation_rule_fires_after_four_hours() {
        let lead = lead_in_stage(JourneyStage::RecommendationsSent);
        assert_eq!(follow_up_rule(&lead, 3.9), None);
        assert_eq!(follow_up_rule(&lead, 4.0), Some(TAG_4H_RECOMMENDATION));
    }

    #[test]
    fn hot_lead_rule_fires_after_one_hour() {
        let lead = lead_in_stage(JourneyStage::HotLead);
        assert_eq!(follow_up_rule(&lead, 1.5), Some(TAG_1H_HOT_LEAD));
    }

    #[test]
    fn general_rule_applies_to_any_stage() {
        let lead = lead_in_stage(JourneyStage::InitialInterest);
        assert_eq!(follow_up_rule(&lead, 47.0), None);
        assert_eq!(follow_up_rule(&lead, 48.0), Some(TAG_48H_GENERAL));
    }

    #[test]
    fn rules_are_mutually_exclusive_in_priority_order() {
        // Stage rule outranks the general rule even at 200h elapsed.
        let lead = lead_in_stage(JourneyStage::RecommendationsSent);
        assert_eq!(follow_up_rule(&lead, 200.0), Some(TAG_4H_RECOMMENDATION));
    }

    #[test]
    fn fired_tags_never_fire_again() {
        let mut lead = lead_in_stage(JourneyStage::RecommendationsSent);
        lead.meta
            .automated_follow_ups
            .push(TAG_4H_RECOMMENDATION.to_string());

        // Falls through to the next applicable rule.
        assert_eq!(follow_up_rule(&lead, 200.0), Some(TAG_48H_GENERAL));

        lead.meta
            .automated_follow_ups
            .push(TAG_48H_GENERAL.to_string());
        assert_eq!(follow_up_rule(&lead, 200.0), Some(TAG_WEEKLY));

        lead.meta.automated_follow_ups.push(TAG_WEEKLY.to_string());
        assert_eq!(follow_up_rule(&lead, 200.0), None);
    }

    #[test]
    fn every_tag_has_a_template() {
        for tag in [
            TAG_4H_RECOMMENDATION,
            TAG_1H_HOT_LEAD,
            TAG_48H_GENERAL,
            TAG_WEEKLY,
        ] {
            assert!(follow_up_message(tag).is_some());
        }
        assert!(follow_up_message("unknown_tag").is_none());
    }
}
