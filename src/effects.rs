//! Outbound side effects of journey stage transitions.
//!
//! The state machine returns [`Effect`] values as plain data; this dispatcher
//! executes them after the stage write has committed. Every effect is
//! best-effort — a failed send is logged and never rolls back the transition.

use crate::config::Config;
use crate::db_storage::{InventoryStorage, LeadStorage};
use crate::matching::{recommendations_message, RECOMMENDATION_LIMIT};
use crate::messaging::WhatsAppClient;
use uuid::Uuid;

/// A pending outbound action produced by a stage transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send up to three personalized vehicle recommendations to the lead.
    SendRecommendations { lead_id: Uuid, phone: String },
    /// Alert every configured sales contact about a hot lead.
    NotifySalesTeam {
        lead_id: Uuid,
        phone: String,
        score: Option<u8>,
    },
    /// Nudge the lead that hot stock moves quickly.
    SendUrgencyMessage { phone: String },
    /// Immediate follow-up on declared purchase intent.
    ScheduleImmediateFollowUp { lead_id: Uuid, phone: String },
    /// Re-engagement message for a dormant lead.
    SendReEngagement { lead_id: Uuid, phone: String },
}

/// Executes effects against the messaging gateway and stores.
pub struct EffectDispatcher<'a> {
    pub leads: &'a LeadStorage,
    pub inventory: &'a InventoryStorage,
    pub whatsapp: &'a WhatsAppClient,
    pub config: &'a Config,
}

impl<'a> EffectDispatcher<'a> {
    pub fn new(
        leads: &'a LeadStorage,
        inventory: &'a InventoryStorage,
        whatsapp: &'a WhatsAppClient,
        config: &'a Config,
    ) -> Self {
        Self {
            leads,
            inventory,
            whatsapp,
            config,
        }
    }

    /// Execute all effects in order. Failures are logged per effect and do
    /// not stop the remaining ones.
    pub async fn dispatch_all(&self, effects: Vec<Effect>) {
        for effect in effects {
            self.dispatch(effect).await;
        }
    }

    async fn dispatch(&self, effect: Effect) {
        match effect {
            Effect::SendRecommendations { lead_id, phone } => {
                if let Err(e) = self.send_recommendations(lead_id, &phone).await {
                    tracing::warn!("Recommendation send failed for lead {}: {}", lead_id, e);
                }
            }
            Effect::NotifySalesTeam {
                lead_id,
                phone,
                score,
            } => {
                self.notify_sales_team(lead_id, &phone, score).await;
            }
            Effect::SendUrgencyMessage { phone } => {
                self.whatsapp
                    .send_text_best_effort(&phone, URGENCY_MESSAGE)
                    .await;
            }
            Effect::ScheduleImmediateFollowUp { lead_id, phone } => {
                tracing::info!("Immediate follow-up for purchase-intent lead {}", lead_id);
                self.whatsapp
                    .send_text_best_effort(&phone, IMMEDIATE_FOLLOW_UP_MESSAGE)
                    .await;
            }
            Effect::SendReEngagement { lead_id, phone } => {
                tracing::info!("Re-engagement send for dormant lead {}", lead_id);
                self.whatsapp
                    .send_text_best_effort(&phone, RE_ENGAGEMENT_MESSAGE)
                    .await;
            }
        }
    }

    /// Top three freshest vehicles matching the lead's stored preferences.
    /// No matches is a normal outcome; the send is simply skipped.
    async fn send_recommendations(
        &self,
        lead_id: Uuid,
        phone: &str,
    ) -> Result<(), crate::errors::AppError> {
        let Some(lead) = self.leads.find_by_id(lead_id).await? else {
            tracing::warn!("Lead {} vanished before recommendations", lead_id);
            return Ok(());
        };

        let matches = self
            .inventory
            .newest_matching(&lead.meta.car_preferences, RECOMMENDATION_LIMIT)
            .await?;

        if matches.is_empty() {
            tracing::debug!("No inventory matches for lead {}, skipping send", lead_id);
            return Ok(());
        }

        self.whatsapp
            .send_text_best_effort(phone, &recommendations_message(&matches))
            .await;
        Ok(())
    }

    async fn notify_sales_team(&self, lead_id: Uuid, phone: &str, score: Option<u8>) {
        let score_display = score
            .map(|s| format!("{}/100", s))
            .unwrap_or_else(|| "pending".to_string());

        let message = format!(
            "🔥 HOT LEAD ALERT!\n\
             Lead ID: {}\n\
             Phone: {}\n\
             Score: {}\n\
             Stage: Hot Lead (Price Inquiry)\n\n\
             Immediate action required!\n\
             Call within 15 minutes for best conversion.",
            lead_id, phone, score_display
        );

        for sales_phone in &self.config.sales_team_phones {
            self.whatsapp
                .send_text_best_effort(sales_phone, &message)
                .await;
        }
    }
}

const URGENCY_MESSAGE: &str = "🔥 Limited Time Opportunity!\n\
     Our best cars go fast - this one might not last long.\n\n\
     💡 Pro tip: Schedule a visit today\n\
     📍 Or visit our showroom\n\n\
     Ready to move forward?\n\
     Reply \"VISIT\" to schedule immediately!";

const IMMEDIATE_FOLLOW_UP_MESSAGE: &str = "Thank you for your interest! \
     Would you like to schedule a viewing of the cars we discussed?";

const RE_ENGAGEMENT_MESSAGE: &str = "Hope your car search is going well!\n\
     We have some exciting new arrivals this week.\n\
     Would you like to see what's new?";
