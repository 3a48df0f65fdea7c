//! Automation orchestrator.
//!
//! Composes the extractor, journey state machine, scoring engine, matching
//! engine, and messaging gateway per inbound message and on periodic ticks.
//! This is the single top-level error boundary: component failures are caught
//! and logged here, already-committed writes are never rolled back, and the
//! caller always gets a structured outcome.

use crate::config::Config;
use crate::db_storage::{InventoryStorage, LeadStorage, MessageLog};
use crate::effects::EffectDispatcher;
use crate::errors::AppError;
use crate::inventory::{self, RESERVATION_HOURS};
use crate::journey;
use crate::matching;
use crate::messaging::WhatsAppClient;
use crate::models::{Interaction, JourneyStage, Lead, LeadStatus};
use crate::preferences::{
    extract_car_preferences, has_price_keyword, has_reservation_keyword, has_visit_keyword,
};
use crate::price_alerts;
use crate::scoring::{self, HotLead};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Outcome of processing one inbound message.
#[derive(Debug, Serialize)]
pub struct MessageOutcome {
    pub success: bool,
    pub stage: Option<JourneyStage>,
    pub score: Option<u8>,
    pub category: Option<LeadStatus>,
    pub recommendations: usize,
    pub error: Option<String>,
}

impl MessageOutcome {
    fn failed(error: AppError) -> Self {
        Self {
            success: false,
            stage: None,
            score: None,
            category: None,
            recommendations: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Counts aggregated by the daily tick.
#[derive(Debug, Default, Serialize)]
pub struct DailyReport {
    pub price_drops: u32,
    pub new_arrivals: u32,
    pub demand_makes: usize,
    pub slow_moving: usize,
    pub follow_ups: u32,
    pub hot_leads: usize,
}

/// Counts aggregated by the hourly tick.
#[derive(Debug, Default, Serialize)]
pub struct HourlyReport {
    pub hot_leads: usize,
    pub follow_ups: u32,
}

/// Mode parameter of the periodic trigger boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickMode {
    Hourly,
    Daily,
}

impl TickMode {
    /// Any string other than "hourly" or "daily" is a configuration error.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "hourly" => Ok(TickMode::Hourly),
            "daily" => Ok(TickMode::Daily),
            other => Err(AppError::BadRequest(format!(
                "Invalid automation mode '{}', expected 'hourly' or 'daily'",
                other
            ))),
        }
    }
}

/// Owns the stores and the messaging client for one automation pass.
pub struct Automation {
    leads: LeadStorage,
    inventory: InventoryStorage,
    messages: MessageLog,
    whatsapp: WhatsAppClient,
    config: Config,
}

impl Automation {
    pub fn new(pool: PgPool, whatsapp: WhatsAppClient, config: Config) -> Self {
        Self {
            leads: LeadStorage::new(pool.clone()),
            inventory: InventoryStorage::new(pool.clone()),
            messages: MessageLog::new(pool),
            whatsapp,
            config,
        }
    }

    pub fn leads(&self) -> &LeadStorage {
        &self.leads
    }

    pub fn inventory(&self) -> &InventoryStorage {
        &self.inventory
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    /// Full automation pipeline for one inbound message. Never propagates an
    /// error: every failure is logged and folded into the outcome.
    pub async fn process_incoming_message(
        &self,
        lead_id: Uuid,
        message: &str,
        now: DateTime<Utc>,
    ) -> MessageOutcome {
        tracing::info!(
            "Processing automation for lead {}: {:.50}",
            lead_id,
            message
        );

        match self.run_message_pipeline(lead_id, message, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Automation processing error for lead {}: {}", lead_id, e);
                MessageOutcome::failed(e)
            }
        }
    }

    async fn run_message_pipeline(
        &self,
        lead_id: Uuid,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<MessageOutcome, AppError> {
        let mut lead = self
            .leads
            .find_by_id(lead_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", lead_id)))?;

        // 1. Extract preferences and merge them over the stored record
        let extracted = extract_car_preferences(message, self.config.budget_unit_multiplier);
        let mut meta = lead.meta.clone();
        if !extracted.is_empty() {
            meta.car_preferences.merge(&extracted);
            tracing::info!("Updated preferences for lead {}: {:?}", lead_id, extracted);
        }

        // 2. Advance the customer journey
        let interaction = Interaction {
            kind: "whatsapp_message".to_string(),
            content: message.to_string(),
            timestamp: now,
            stage: meta.journey_stage,
        };
        let transition = journey::advance(&lead, &mut meta, interaction);
        tracing::info!("Lead {} progressed to stage: {}", lead_id, transition.stage);

        // 3. Recompute the lead score
        lead.meta = meta.clone();
        let score = scoring::calculate_lead_score(&lead, now);
        meta.lead_score = Some(score);
        meta.score_calculated_at = Some(now);
        let category = scoring::classify(score);
        tracing::info!("Lead score calculated: {} ({:?})", score, category);

        // Stage, history, preferences, and score land in one write
        lead.meta = meta;
        self.leads.update_meta(lead.id, &lead.meta).await?;

        // 4. Stage-entry side effects (best-effort, after the commit)
        let dispatcher =
            EffectDispatcher::new(&self.leads, &self.inventory, &self.whatsapp, &self.config);
        dispatcher.dispatch_all(transition.effects).await;

        // 5. Hot-lead handling for this single message
        if category == Some(LeadStatus::Hot) {
            let hot = HotLead {
                lead: lead.clone(),
                score,
            };
            scoring::alert_sales_team(&[hot], &self.whatsapp, &self.config, now).await;
            tracing::info!("Hot lead alert sent for {}", lead.phone);
        }

        // 6. Live inventory matching and recommendations
        let recommendations = match matching::match_for_lead(
            &self.inventory,
            &self.leads,
            &mut lead,
            now,
        )
        .await
        {
            Ok(matches) => {
                if !matches.is_empty() {
                    self.whatsapp
                        .send_text_best_effort(
                            &lead.phone,
                            &matching::recommendations_message(&matches),
                        )
                        .await;
                    tracing::info!(
                        "Sent {} car recommendation(s) to lead {}",
                        matches.len().min(3),
                        lead_id
                    );
                }
                matches.len()
            }
            Err(e) => {
                tracing::error!("Inventory matching failed for lead {}: {}", lead_id, e);
                0
            }
        };

        // 7. Lightweight intent side-handlers
        self.handle_special_intents(&mut lead, message, now).await;

        Ok(MessageOutcome {
            success: true,
            stage: Some(transition.stage),
            score: Some(score),
            category,
            recommendations,
            error: None,
        })
    }

    /// Keyword-triggered side handlers: reservation, pricing info, visit info.
    /// Each is independently best-effort.
    async fn handle_special_intents(&self, lead: &mut Lead, message: &str, now: DateTime<Utc>) {
        if has_reservation_keyword(message) {
            // Reserve the most recently recommended car, if any
            if let Some(car) = lead.meta.recommended_cars.first().cloned() {
                match inventory::reserve_car(
                    &self.leads,
                    &self.inventory,
                    &self.whatsapp,
                    lead,
                    car.id,
                    RESERVATION_HOURS,
                    now,
                )
                .await
                {
                    Ok(_) => tracing::info!("Car reserved for lead {}", lead.id),
                    Err(e) => tracing::error!("Reservation failed for lead {}: {}", lead.id, e),
                }
            } else {
                tracing::debug!(
                    "Reservation keyword from lead {} but no recommended car on file",
                    lead.id
                );
            }
        }

        if has_price_keyword(message) {
            self.whatsapp
                .send_text_best_effort(&lead.phone, PRICING_INFO_MESSAGE)
                .await;
        }

        if has_visit_keyword(message) {
            self.whatsapp
                .send_text_best_effort(&lead.phone, VISIT_INFO_MESSAGE)
                .await;
        }
    }

    /// Heavy daily pass: price alerts, demand analysis, slow movers,
    /// follow-ups, hot-lead detection. Every step is caught individually so a
    /// failing step never starves the rest.
    pub async fn run_daily(&self, now: DateTime<Utc>) -> DailyReport {
        tracing::info!("Running daily automations");
        let mut report = DailyReport::default();

        match price_alerts::check_price_drops(&self.leads, &self.inventory, &self.whatsapp, now)
            .await
        {
            Ok(count) => report.price_drops = count,
            Err(e) => tracing::error!("Price-drop pass failed: {}", e),
        }

        match price_alerts::process_new_arrivals(&self.leads, &self.inventory, &self.whatsapp, now)
            .await
        {
            Ok(count) => report.new_arrivals = count,
            Err(e) => tracing::error!("New-arrival pass failed: {}", e),
        }

        match inventory::demand_analysis(&self.leads, &self.inventory, now).await {
            Ok(demand) => report.demand_makes = demand.len(),
            Err(e) => tracing::error!("Demand analysis failed: {}", e),
        }

        match inventory::detect_slow_moving_inventory(
            &self.leads,
            &self.inventory,
            &self.whatsapp,
            now,
        )
        .await
        {
            Ok(slow) => report.slow_moving = slow.len(),
            Err(e) => tracing::error!("Slow-mover detection failed: {}", e),
        }

        match crate::follow_up::schedule_follow_ups(&self.leads, &self.whatsapp, now).await {
            Ok(count) => report.follow_ups = count,
            Err(e) => tracing::error!("Follow-up sweep failed: {}", e),
        }

        match scoring::detect_hot_leads(&self.leads, &self.whatsapp, &self.config, now).await {
            Ok(hot) => report.hot_leads = hot.len(),
            Err(e) => tracing::error!("Hot-lead detection failed: {}", e),
        }

        tracing::info!("Daily automations complete: {:?}", report);
        report
    }

    /// Light hourly pass: hot-lead detection and the follow-up sweep only.
    pub async fn run_hourly(&self, now: DateTime<Utc>) -> HourlyReport {
        tracing::info!("Running hourly automations");
        let mut report = HourlyReport::default();

        match scoring::detect_hot_leads(&self.leads, &self.whatsapp, &self.config, now).await {
            Ok(hot) => report.hot_leads = hot.len(),
            Err(e) => tracing::error!("Hot-lead detection failed: {}", e),
        }

        match crate::follow_up::schedule_follow_ups(&self.leads, &self.whatsapp, now).await {
            Ok(count) => report.follow_ups = count,
            Err(e) => tracing::error!("Follow-up sweep failed: {}", e),
        }

        tracing::info!("Hourly automations complete: {:?}", report);
        report
    }
}

const PRICING_INFO_MESSAGE: &str = "💰 Great question about pricing!\n\n\
     Our cars are competitively priced with:\n\
     ✅ Transparent pricing (no hidden fees)\n\
     ✅ Financing options available\n\
     ✅ Trade-in evaluations\n\
     ✅ Extended warranties\n\n\
     Want a personalized quote?\n\
     Tell me your budget range and I'll find perfect matches!";

const VISIT_INFO_MESSAGE: &str = "🏢 Perfect! We'd love to show you our cars.\n\n\
     🕒 Opening Hours:\n\
     Mon-Fri: 9:00-19:00\n\
     Saturday: 9:00-17:00\n\
     Sunday: 10:00-16:00\n\n\
     Reply \"SCHEDULE\" and I'll have someone call you within the hour!";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_mode_parses_known_values() {
        assert_eq!(TickMode::parse("hourly").unwrap(), TickMode::Hourly);
        assert_eq!(TickMode::parse("daily").unwrap(), TickMode::Daily);
    }

    #[test]
    fn tick_mode_rejects_unknown_values() {
        let err = TickMode::parse("weekly").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
