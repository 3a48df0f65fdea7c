//! Lead scoring engine.
//!
//! The score is a pure additive function of the lead record: each rule
//! contributes independently and the sum is clamped to 100. The batch variant
//! rescans the trailing activity window, persists score and classification,
//! and alerts the sales team for every hot lead found in the pass (re-alerting
//! on later passes is accepted behavior).

use crate::config::Config;
use crate::db_storage::LeadStorage;
use crate::errors::AppError;
use crate::messaging::WhatsAppClient;
use crate::models::{Lead, LeadStatus};
use crate::preferences::has_urgency_keyword;
use chrono::{DateTime, Duration, Utc};

/// Score threshold at which a lead is classified hot.
pub const HOT_THRESHOLD: u8 = 80;
/// Score threshold for the warm classification.
pub const WARM_THRESHOLD: u8 = 60;
/// Score threshold for the qualified classification.
pub const QUALIFIED_THRESHOLD: u8 = 40;

/// Trailing window of lead activity considered by the batch pass.
const SCORING_WINDOW_DAYS: i64 = 7;

/// Compute the lead score, clamped to [0, 100].
///
/// Pure over the lead record and the supplied clock instant; no store access.
pub fn calculate_lead_score(lead: &Lead, now: DateTime<Utc>) -> u8 {
    let meta = &lead.meta;
    let mut score: u32 = 0;

    // Intent base score
    score += lead.intent.base_score();

    // Message frequency (highest threshold wins)
    let message_count = meta.message_count.max(1);
    if message_count >= 5 {
        score += 20;
    } else if message_count >= 3 {
        score += 15;
    } else if message_count >= 2 {
        score += 10;
    }

    // Urgency keywords in the most recent (or first) message
    let last_message = meta
        .last_whatsapp_message
        .as_deref()
        .or(meta.first_message.as_deref())
        .unwrap_or("");
    if has_urgency_keyword(last_message) {
        score += 25;
    }

    // Budget tier from stored preferences
    if let Some(budget) = meta.car_preferences.max_budget {
        if budget >= 20_000 {
            score += 20;
        } else if budget >= 10_000 {
            score += 15;
        } else if budget >= 5_000 {
            score += 10;
        }
    }

    // Specific interest signals
    if meta.car_preferences.make.is_some() {
        score += 15;
    }
    if meta.specific_car_interest {
        score += 20;
    }

    // Contact information completeness
    if lead.email.is_some() {
        score += 10;
    }
    if lead.name.is_some() {
        score += 5;
    }

    // Recency of last contact (tightest window wins)
    let last_contact = meta.last_contact_date.unwrap_or(lead.created_at);
    let hours_since_contact = (now - last_contact).num_minutes() as f64 / 60.0;
    if hours_since_contact <= 2.0 {
        score += 15;
    } else if hours_since_contact <= 24.0 {
        score += 10;
    } else if hours_since_contact <= 72.0 {
        score += 5;
    }

    score.min(100) as u8
}

/// Classification for a score, or `None` when the score leaves the stored
/// status unchanged.
pub fn classify(score: u8) -> Option<LeadStatus> {
    if score >= HOT_THRESHOLD {
        Some(LeadStatus::Hot)
    } else if score >= WARM_THRESHOLD {
        Some(LeadStatus::Warm)
    } else if score >= QUALIFIED_THRESHOLD {
        Some(LeadStatus::Qualified)
    } else {
        None
    }
}

fn status_reason(status: LeadStatus) -> &'static str {
    match status {
        LeadStatus::Hot => "high_purchase_intent_detected",
        LeadStatus::Warm => "moderate_interest_detected",
        LeadStatus::Qualified => "basic_interest_confirmed",
        _ => "score_recalculated",
    }
}

/// A lead flagged hot by the batch pass.
#[derive(Debug)]
pub struct HotLead {
    pub lead: Lead,
    pub score: u8,
}

/// Rescore every WhatsApp lead active in the trailing window, persist the
/// results, and alert the sales team for each hot lead.
///
/// Per-lead persistence failures are logged and skipped; a rerun converges on
/// the same scores, so the sweep is safe to repeat after a crash.
pub async fn detect_hot_leads(
    leads: &LeadStorage,
    whatsapp: &WhatsAppClient,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<Vec<HotLead>, AppError> {
    let since = now - Duration::days(SCORING_WINDOW_DAYS);
    let candidates = leads.whatsapp_leads_created_since(since).await?;
    tracing::info!("Scoring {} lead(s) from the last 7 days", candidates.len());

    let mut hot_leads = Vec::new();

    for mut lead in candidates {
        let score = calculate_lead_score(&lead, now);

        lead.meta.lead_score = Some(score);
        lead.meta.score_calculated_at = Some(now);

        let (new_status, reason) = match classify(score) {
            Some(status) => (status, status_reason(status)),
            None => (
                lead.status,
                lead.automation_status_reason
                    .as_deref()
                    .unwrap_or("score_recalculated"),
            ),
        };

        if let Err(e) = leads
            .update_scoring(lead.id, new_status, reason, &lead.meta)
            .await
        {
            tracing::error!("Failed to persist score for lead {}: {}", lead.id, e);
            continue;
        }

        if new_status == LeadStatus::Hot {
            hot_leads.push(HotLead { lead, score });
        }
    }

    alert_sales_team(&hot_leads, whatsapp, config, now).await;

    tracing::info!("Hot lead detection found {} lead(s)", hot_leads.len());
    Ok(hot_leads)
}

/// Send a hot-lead alert for each flagged lead to every configured sales
/// contact. Best-effort: failed sends are logged and skipped.
pub async fn alert_sales_team(
    hot_leads: &[HotLead],
    whatsapp: &WhatsAppClient,
    config: &Config,
    now: DateTime<Utc>,
) {
    for hot in hot_leads {
        let alert = hot_lead_alert_message(hot, now);
        for sales_phone in &config.sales_team_phones {
            whatsapp.send_text_best_effort(sales_phone, &alert).await;
        }
    }
}

fn hot_lead_alert_message(hot: &HotLead, now: DateTime<Utc>) -> String {
    let meta = &hot.lead.meta;
    let last_message = meta
        .last_whatsapp_message
        .as_deref()
        .or(meta.first_message.as_deref())
        .unwrap_or("");
    let make = meta
        .car_preferences
        .make
        .as_deref()
        .unwrap_or("Various cars");
    let budget = meta
        .car_preferences
        .max_budget
        .map(|b| format!("€{}", b))
        .unwrap_or_else(|| "Not specified".to_string());

    format!(
        "🔥 HOT LEAD ALERT!\n\
         📞 {}\n\
         📧 {}\n\
         🎯 Score: {}/100\n\
         💬 \"{}\"\n\
         🚗 Interested in: {}\n\
         💰 Budget: {}\n\
         ⏰ Last contact: {}\n\n\
         Action needed: Call within 1 hour!",
        hot.lead.phone,
        hot.lead.email.as_deref().unwrap_or("No email"),
        hot.score,
        last_message,
        make,
        budget,
        format_time_ago(meta.last_contact_date.unwrap_or(hot.lead.created_at), now),
    )
}

fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes();
    let hours = (now - then).num_hours();

    if minutes < 60 {
        format!("{} minutes ago", minutes)
    } else if hours < 24 {
        format!("{} hours ago", hours)
    } else {
        format!("{} days ago", hours / 24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CarPreferences, Intent, LeadMeta};
    use uuid::Uuid;

    fn lead_with(intent: Intent, meta: LeadMeta) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            phone: "+351912345678".to_string(),
            normalized_phone: "351912345678".to_string(),
            name: None,
            email: None,
            source: "whatsapp".to_string(),
            intent,
            status: LeadStatus::New,
            automation_status_reason: None,
            automation_status_at: None,
            meta,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn worked_example_scores_seventy() {
        let now = Utc::now();
        let mut lead = lead_with(Intent::PurchaseIntent, LeadMeta::default());
        lead.email = Some("buyer@example.com".to_string());
        lead.name = Some("Ana".to_string());
        lead.meta.last_contact_date = Some(now - Duration::hours(1));

        // 40 (intent) + 10 (email) + 5 (name) + 15 (contact within 2h)
        let score = calculate_lead_score(&lead, now);
        assert_eq!(score, 70);
        assert_eq!(classify(score), Some(LeadStatus::Warm));
    }

    #[test]
    fn score_is_clamped_to_one_hundred() {
        let now = Utc::now();
        let meta = LeadMeta {
            message_count: 9,
            last_whatsapp_message: Some("urgent, need it today".to_string()),
            car_preferences: CarPreferences {
                make: Some("Bmw".to_string()),
                max_budget: Some(50_000),
                ..Default::default()
            },
            specific_car_interest: true,
            last_contact_date: Some(now),
            ..Default::default()
        };
        let mut lead = lead_with(Intent::PurchaseIntent, meta);
        lead.email = Some("buyer@example.com".to_string());
        lead.name = Some("Ana".to_string());

        assert_eq!(calculate_lead_score(&lead, now), 100);
    }

    #[test]
    fn message_frequency_tiers_are_mutually_exclusive() {
        let now = Utc::now();
        let base = |count: u32| {
            let mut lead = lead_with(Intent::SellIntent, LeadMeta::default());
            lead.meta.message_count = count;
            // Push contact out of every recency window
            lead.created_at = now - Duration::days(10);
            lead
        };

        assert_eq!(calculate_lead_score(&base(1), now), 0);
        assert_eq!(calculate_lead_score(&base(2), now), 10);
        assert_eq!(calculate_lead_score(&base(3), now), 15);
        assert_eq!(calculate_lead_score(&base(4), now), 15);
        assert_eq!(calculate_lead_score(&base(5), now), 20);
        assert_eq!(calculate_lead_score(&base(50), now), 20);
    }

    #[test]
    fn recency_tiers_tightest_window_wins() {
        let now = Utc::now();
        let base = |hours_ago: i64| {
            let mut lead = lead_with(Intent::SellIntent, LeadMeta::default());
            lead.meta.message_count = 1;
            lead.meta.last_contact_date = Some(now - Duration::hours(hours_ago));
            lead
        };

        assert_eq!(calculate_lead_score(&base(1), now), 15);
        assert_eq!(calculate_lead_score(&base(20), now), 10);
        assert_eq!(calculate_lead_score(&base(60), now), 5);
        assert_eq!(calculate_lead_score(&base(100), now), 0);
    }

    #[test]
    fn budget_tiers() {
        let now = Utc::now();
        let base = |budget: i64| {
            let mut lead = lead_with(Intent::SellIntent, LeadMeta::default());
            lead.created_at = now - Duration::days(10);
            lead.meta.car_preferences.max_budget = Some(budget);
            lead
        };

        assert_eq!(calculate_lead_score(&base(25_000), now), 20);
        assert_eq!(calculate_lead_score(&base(15_000), now), 15);
        assert_eq!(calculate_lead_score(&base(7_000), now), 10);
        assert_eq!(calculate_lead_score(&base(3_000), now), 0);
    }

    #[test]
    fn urgency_keyword_in_first_message_counts_when_no_later_message() {
        let now = Utc::now();
        let mut lead = lead_with(Intent::SellIntent, LeadMeta::default());
        lead.created_at = now - Duration::days(10);
        lead.meta.first_message = Some("I need a car asap".to_string());

        assert_eq!(calculate_lead_score(&lead, now), 25);
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify(100), Some(LeadStatus::Hot));
        assert_eq!(classify(80), Some(LeadStatus::Hot));
        assert_eq!(classify(79), Some(LeadStatus::Warm));
        assert_eq!(classify(60), Some(LeadStatus::Warm));
        assert_eq!(classify(59), Some(LeadStatus::Qualified));
        assert_eq!(classify(40), Some(LeadStatus::Qualified));
        assert_eq!(classify(39), None);
        assert_eq!(classify(0), None);
    }
}
