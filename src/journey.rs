//! Multi-stage customer journey state machine.
//!
//! The transition function is pure: given the current stage, the full
//! interaction history, and the latest interaction, it returns the next stage.
//! Conditions are evaluated per current stage and the first match wins; no
//! match leaves the stage unchanged. A single invocation only ever applies the
//! one transition defined for the current stage — a lead cannot jump from
//! initial_interest straight to hot_lead.
//!
//! Stage-entry side effects are returned as data ([`Effect`] values) and
//! executed by the dispatcher, never inside the transition itself.

use crate::effects::Effect;
use crate::models::{Interaction, JourneyStage, Lead, LeadMeta};
use crate::preferences::{has_price_keyword, has_visit_keyword};

/// Outcome of advancing a lead's journey by one interaction.
#[derive(Debug)]
pub struct StageTransition {
    pub stage: JourneyStage,
    pub changed: bool,
    pub effects: Vec<Effect>,
}

/// Compute the next journey stage.
///
/// `meta` must already contain the latest interaction in its history; the
/// interaction counts and keyword scans below run over the appended history.
pub fn next_stage(current: JourneyStage, meta: &LeadMeta, latest: &Interaction) -> JourneyStage {
    let has_car_preferences = meta.car_preferences.populated_fields() > 2;
    let has_multiple_messages = meta.interactions.len() >= 3;
    let has_price_inquiry = meta
        .interactions
        .iter()
        .any(|i| has_price_keyword(&i.content));

    match current {
        JourneyStage::InitialInterest => {
            if has_car_preferences {
                JourneyStage::PreferencesGathered
            } else if has_multiple_messages {
                JourneyStage::FollowUpEngaged
            } else {
                current
            }
        }
        JourneyStage::PreferencesGathered => JourneyStage::RecommendationsSent,
        JourneyStage::RecommendationsSent => {
            if has_price_inquiry {
                JourneyStage::HotLead
            } else if has_multiple_messages {
                JourneyStage::FollowUpEngaged
            } else {
                current
            }
        }
        JourneyStage::FollowUpEngaged => {
            if has_price_inquiry {
                JourneyStage::HotLead
            } else if meta.interactions.len() >= 8 {
                JourneyStage::PurchaseIntent
            } else {
                current
            }
        }
        JourneyStage::HotLead => {
            if has_visit_keyword(&latest.content) {
                JourneyStage::PurchaseIntent
            } else {
                current
            }
        }
        // Converted and dormant leads only move through explicit re-engagement,
        // not through the per-message transition table.
        JourneyStage::PurchaseIntent | JourneyStage::Converted | JourneyStage::Dormant => current,
    }
}

/// Append the interaction to the history and evaluate the transition.
///
/// Mutates `meta` in place (history, last-interaction timestamp, stage); the
/// caller persists the whole record in a single write so stage and history
/// never diverge. Effects are produced only when the stage actually changed,
/// so each stage entry fires its side effects exactly once.
pub fn advance(lead: &Lead, meta: &mut LeadMeta, mut interaction: Interaction) -> StageTransition {
    let current = meta.journey_stage;

    interaction.stage = current;
    meta.last_interaction = Some(interaction.timestamp);
    let latest = interaction.clone();
    meta.interactions.push(interaction);

    let next = next_stage(current, meta, &latest);
    let changed = next != current;
    meta.journey_stage = next;

    let effects = if changed {
        effects_on_entry(next, lead, meta)
    } else {
        Vec::new()
    };

    StageTransition {
        stage: next,
        changed,
        effects,
    }
}

/// Side effects triggered by entering a stage. Stages without an entry in this
/// table have no automatic side effect.
fn effects_on_entry(stage: JourneyStage, lead: &Lead, meta: &LeadMeta) -> Vec<Effect> {
    match stage {
        JourneyStage::PreferencesGathered => vec![Effect::SendRecommendations {
            lead_id: lead.id,
            phone: lead.phone.clone(),
        }],
        JourneyStage::HotLead => vec![
            Effect::NotifySalesTeam {
                lead_id: lead.id,
                phone: lead.phone.clone(),
                score: meta.lead_score,
            },
            Effect::SendUrgencyMessage {
                phone: lead.phone.clone(),
            },
        ],
        JourneyStage::PurchaseIntent => vec![Effect::ScheduleImmediateFollowUp {
            lead_id: lead.id,
            phone: lead.phone.clone(),
        }],
        JourneyStage::Dormant => vec![Effect::SendReEngagement {
            lead_id: lead.id,
            phone: lead.phone.clone(),
        }],
        _ => Vec::new(),
    }
}
