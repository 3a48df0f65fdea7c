//! Price-drop and new-arrival notifications.
//!
//! Daily passes that match fresh showroom events against stored lead
//! preferences and notify interested leads. Sends are fire-and-forget.

use crate::db_storage::{InventoryStorage, LeadStorage};
use crate::errors::AppError;
use crate::matching::vehicle_matches_preferences;
use crate::messaging::WhatsAppClient;
use crate::models::{Intent, Vehicle};
use chrono::{DateTime, Duration, Utc};

/// How far back the daily pass looks for new stock and fresh suggestions.
const ALERT_WINDOW_HOURS: i64 = 24;

/// Notify interested leads about vehicles added in the last 24 hours.
/// Returns the number of vehicles that produced at least one alert.
pub async fn process_new_arrivals(
    leads: &LeadStorage,
    inventory: &InventoryStorage,
    whatsapp: &WhatsAppClient,
    now: DateTime<Utc>,
) -> Result<u32, AppError> {
    let since = now - Duration::hours(ALERT_WINDOW_HOURS);
    let arrivals = inventory.arrivals_since(since).await?;
    if arrivals.is_empty() {
        return Ok(0);
    }

    let interested = leads
        .whatsapp_leads_by_intents(&[Intent::PurchaseIntent, Intent::CarShopping])
        .await?;

    let mut notified_vehicles = 0;
    for vehicle in &arrivals {
        let mut any_sent = false;
        for lead in &interested {
            if !vehicle_matches_preferences(vehicle, &lead.meta.car_preferences, false) {
                continue;
            }
            whatsapp
                .send_text_best_effort(&lead.phone, &new_arrival_message(vehicle))
                .await;
            any_sent = true;
        }
        if any_sent {
            notified_vehicles += 1;
        }
    }

    tracing::info!(
        "New-arrival pass: {} vehicle(s), {} produced alerts",
        arrivals.len(),
        notified_vehicles
    );
    Ok(notified_vehicles)
}

/// Notify leads whose preferences match vehicles with a freshly stored price
/// suggestion. The suggested (not the listed) price is matched against the
/// lead's budget, so a suggestion can bring a car into reach.
pub async fn check_price_drops(
    leads: &LeadStorage,
    inventory: &InventoryStorage,
    whatsapp: &WhatsAppClient,
    now: DateTime<Utc>,
) -> Result<u32, AppError> {
    let since = now - Duration::hours(ALERT_WINDOW_HOURS);
    let candidates = inventory.vehicles_with_pricing_suggestion().await?;

    let fresh: Vec<&Vehicle> = candidates
        .iter()
        .filter(|v| {
            v.automation_meta
                .pricing_suggestion
                .as_ref()
                .map(|s| s.suggested_at >= since && s.suggested_price < s.original_price)
                .unwrap_or(false)
        })
        .collect();

    if fresh.is_empty() {
        return Ok(0);
    }

    let interested = leads
        .whatsapp_leads_by_intents(&[
            Intent::PurchaseIntent,
            Intent::CarShopping,
            Intent::PricingInquiry,
        ])
        .await?;

    let mut alerts = 0;
    for vehicle in fresh {
        let suggestion = match vehicle.automation_meta.pricing_suggestion.as_ref() {
            Some(s) => s,
            None => continue,
        };

        for lead in &interested {
            let prefs = &lead.meta.car_preferences;
            if let Some(ref make) = prefs.make {
                if !vehicle.make.to_lowercase().contains(&make.to_lowercase()) {
                    continue;
                }
            }
            if let Some(budget) = prefs.max_budget {
                if suggestion.suggested_price > budget {
                    continue;
                }
            }

            whatsapp
                .send_text_best_effort(
                    &lead.phone,
                    &price_drop_message(vehicle, suggestion.suggested_price),
                )
                .await;
            alerts += 1;
        }
    }

    tracing::info!("Price-drop pass sent {} alert(s)", alerts);
    Ok(alerts)
}

fn new_arrival_message(vehicle: &Vehicle) -> String {
    format!(
        "🆕 New Arrival!\n\
         {}\n\
         💰 €{}\n\
         📍 {}\n\
         ⛽ {} | 🏃 {} km\n\
         🎯 Just added to our showroom!\n\
         Interested? Reply to book a viewing!",
        vehicle.display_name(),
        vehicle.price,
        vehicle.plate,
        vehicle.fuel,
        vehicle.mileage_km,
    )
}

fn price_drop_message(vehicle: &Vehicle, new_price: i64) -> String {
    format!(
        "💥 Price Drop Alert!\n\
         {}\n\
         🔻 Now €{} (was €{})\n\
         💾 Save €{}!\n\n\
         Limited time offer. Reply \"BOOK\" to reserve!",
        vehicle.display_name(),
        new_price,
        vehicle.price,
        vehicle.price - new_price,
    )
}
