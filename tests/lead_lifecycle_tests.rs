/// Unit tests for the lead lifecycle core: journey progression, scoring,
/// preference extraction, and follow-up rule selection.
use chrono::{Duration, Utc};
use rust_dealer_crm::follow_up::{follow_up_message, follow_up_rule};
use rust_dealer_crm::journey;
use rust_dealer_crm::models::{
    CarPreferences, Intent, Interaction, JourneyStage, Lead, LeadMeta, LeadStatus,
};
use rust_dealer_crm::preferences::extract_car_preferences;
use rust_dealer_crm::scoring::{calculate_lead_score, classify};
use uuid::Uuid;

fn make_lead() -> Lead {
    let now = Utc::now();
    Lead {
        id: Uuid::new_v4(),
        phone: "+351912345678".to_string(),
        normalized_phone: "351912345678".to_string(),
        name: None,
        email: None,
        source: "whatsapp".to_string(),
        intent: Intent::GeneralInquiry,
        status: LeadStatus::New,
        automation_status_reason: None,
        automation_status_at: None,
        meta: LeadMeta::default(),
        created_at: now,
        updated_at: now,
    }
}

fn message(content: &str) -> Interaction {
    Interaction {
        kind: "whatsapp_message".to_string(),
        content: content.to_string(),
        timestamp: Utc::now(),
        stage: JourneyStage::InitialInterest,
    }
}

#[cfg(test)]
mod journey_progression_tests {
    use super::*;

    /// A realistic conversation walks the lead through the funnel one
    /// adjacent transition at a time.
    #[test]
    fn conversation_progresses_through_adjacent_stages() {
        let lead = make_lead();
        let mut meta = LeadMeta::default();

        // Rich preferences arrive: initial_interest -> preferences_gathered
        meta.car_preferences = extract_car_preferences("automatic diesel BMW please", 1000);
        assert!(meta.car_preferences.populated_fields() > 2);
        let t = journey::advance(&lead, &mut meta, message("automatic diesel BMW please"));
        assert_eq!(t.stage, JourneyStage::PreferencesGathered);

        // Next message: preferences_gathered -> recommendations_sent
        let t = journey::advance(&lead, &mut meta, message("sounds good"));
        assert_eq!(t.stage, JourneyStage::RecommendationsSent);

        // Price question: recommendations_sent -> hot_lead
        let t = journey::advance(&lead, &mut meta, message("quanto custa o primeiro?"));
        assert_eq!(t.stage, JourneyStage::HotLead);

        // Visit request: hot_lead -> purchase_intent
        let t = journey::advance(&lead, &mut meta, message("I want to visit tomorrow"));
        assert_eq!(t.stage, JourneyStage::PurchaseIntent);
    }

    /// A price question in the very first message must not fast-track the
    /// lead: only the transition defined for the current stage applies.
    #[test]
    fn no_stage_skipping_from_initial_interest() {
        let lead = make_lead();
        let mut meta = LeadMeta::default();

        let t = journey::advance(&lead, &mut meta, message("what is the price? €20000"));
        assert_eq!(t.stage, JourneyStage::InitialInterest);

        // Even after the history holds a price keyword, the lead has to pass
        // through the intermediate stages first.
        let t = journey::advance(&lead, &mut meta, message("hello?"));
        assert_ne!(t.stage, JourneyStage::HotLead);
    }

    #[test]
    fn converted_and_dormant_leads_do_not_transition() {
        let lead = make_lead();

        for stage in [JourneyStage::Converted, JourneyStage::Dormant] {
            let mut meta = LeadMeta {
                journey_stage: stage,
                ..Default::default()
            };
            let t = journey::advance(&lead, &mut meta, message("quanto custa? I want to buy"));
            assert_eq!(t.stage, stage);
            assert!(!t.changed);
        }
    }

    #[test]
    fn history_grows_by_one_per_call() {
        let lead = make_lead();
        let mut meta = LeadMeta::default();

        for n in 1..=5 {
            journey::advance(&lead, &mut meta, message("hello"));
            assert_eq!(meta.interactions.len(), n);
        }
    }
}

#[cfg(test)]
mod scoring_tests {
    use super::*;

    #[test]
    fn documented_example_scores_seventy_warm() {
        let now = Utc::now();
        let mut lead = make_lead();
        lead.intent = Intent::PurchaseIntent;
        lead.email = Some("ana@example.com".to_string());
        lead.name = Some("Ana".to_string());
        lead.meta.last_contact_date = Some(now - Duration::hours(1));

        let score = calculate_lead_score(&lead, now);
        assert_eq!(score, 70);
        assert_eq!(classify(score), Some(LeadStatus::Warm));
    }

    #[test]
    fn score_never_exceeds_one_hundred() {
        let now = Utc::now();
        let mut lead = make_lead();
        lead.intent = Intent::PurchaseIntent;
        lead.email = Some("a@b.pt".to_string());
        lead.name = Some("A".to_string());
        lead.meta = LeadMeta {
            message_count: 20,
            last_whatsapp_message: Some("urgent urgent now asap".to_string()),
            car_preferences: CarPreferences {
                make: Some("Audi".to_string()),
                max_budget: Some(99_000),
                fuel: Some("Diesel".to_string()),
                ..Default::default()
            },
            specific_car_interest: true,
            last_contact_date: Some(now),
            ..Default::default()
        };

        assert_eq!(calculate_lead_score(&lead, now), 100);
    }

    #[test]
    fn stale_lead_with_no_signals_scores_zero() {
        let now = Utc::now();
        let mut lead = make_lead();
        lead.intent = Intent::SellIntent;
        lead.created_at = now - Duration::days(30);

        assert_eq!(calculate_lead_score(&lead, now), 0);
        assert_eq!(classify(0), None);
    }
}

#[cfg(test)]
mod extractor_tests {
    use super::*;

    #[test]
    fn bmw_under_twenty_yields_make_and_budget() {
        let prefs = extract_car_preferences("I want a BMW under 20", 1000);
        assert_eq!(prefs.make.as_deref(), Some("Bmw"));
        assert_eq!(prefs.max_budget, Some(20_000));
    }

    #[test]
    fn unrecognized_text_yields_empty_record() {
        let prefs = extract_car_preferences("olá, bom dia!", 1000);
        assert!(prefs.is_empty());
        assert_eq!(prefs, CarPreferences::default());
    }

    #[test]
    fn extraction_is_deterministic() {
        let a = extract_car_preferences("hybrid SUV até 30", 1000);
        let b = extract_car_preferences("hybrid SUV até 30", 1000);
        assert_eq!(a, b);
    }
}

#[cfg(test)]
mod follow_up_scheduler_tests {
    use super::*;

    fn lead_in_stage(stage: JourneyStage) -> Lead {
        let mut lead = make_lead();
        lead.meta.journey_stage = stage;
        lead
    }

    /// Simulating two consecutive sweeps: once a rule's tag is recorded, the
    /// same rule never fires again for that lead.
    #[test]
    fn sweep_is_idempotent_per_rule() {
        let mut lead = lead_in_stage(JourneyStage::RecommendationsSent);
        let hours = 6.0;

        let first = follow_up_rule(&lead, hours).expect("first sweep should fire");
        lead.meta.automated_follow_ups.push(first.to_string());

        // Immediate second sweep: the 4h rule is spent and no other rule
        // matches at 6 elapsed hours.
        assert_eq!(follow_up_rule(&lead, hours), None);
    }

    #[test]
    fn at_most_one_rule_fires_per_sweep() {
        // Every rule's time condition holds, but only the highest-priority
        // unfired one is selected.
        let lead = lead_in_stage(JourneyStage::HotLead);
        assert_eq!(follow_up_rule(&lead, 500.0), Some("1h_hot_lead"));
    }

    #[test]
    fn all_rules_eventually_exhaust() {
        let mut lead = lead_in_stage(JourneyStage::InitialInterest);
        let mut fired = Vec::new();

        while let Some(tag) = follow_up_rule(&lead, 500.0) {
            assert!(!fired.contains(&tag), "rule fired twice: {}", tag);
            assert!(follow_up_message(tag).is_some());
            fired.push(tag);
            lead.meta.automated_follow_ups.push(tag.to_string());
        }

        // Stage rules do not apply in initial_interest; the two generic
        // time rules both drain.
        assert_eq!(fired, vec!["48h_general", "weekly"]);
    }
}
