//! Inventory automation: demand analysis, slow-mover detection with price
//! suggestions, and car reservations.

use crate::db_storage::{InventoryStorage, LeadStorage};
use crate::errors::AppError;
use crate::matching::vehicle_matches_preferences;
use crate::messaging::WhatsAppClient;
use crate::models::{
    Intent, Lead, PricingSuggestion, Reservation, TargetedOffer, Vehicle,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Trailing window of lead activity counted as demand.
const DEMAND_WINDOW_DAYS: i64 = 30;
/// Stock age at which a vehicle becomes a slow-mover candidate.
const SLOW_MOVER_MIN_DAYS: i32 = 90;
/// Maximum demand count for a slow-mover candidate.
const SLOW_MOVER_MAX_DEMAND: i32 = 1;
/// Default reservation window.
pub const RESERVATION_HOURS: i64 = 24;

/// Count make preferences across recent leads and write each active vehicle's
/// demand counter. Unchanged counters are not rewritten, so reruns of the
/// sweep converge without redundant writes.
///
/// Returns the per-make demand map (lowercased make -> lead count).
pub async fn demand_analysis(
    leads: &LeadStorage,
    inventory: &InventoryStorage,
    now: DateTime<Utc>,
) -> Result<HashMap<String, i32>, AppError> {
    let since = now - Duration::days(DEMAND_WINDOW_DAYS);
    let recent_leads = leads.whatsapp_leads_created_since(since).await?;

    let mut demand: HashMap<String, i32> = HashMap::new();
    for lead in &recent_leads {
        if let Some(ref make) = lead.meta.car_preferences.make {
            *demand.entry(make.to_lowercase()).or_insert(0) += 1;
        }
    }

    let vehicles = inventory.active_vehicles().await?;
    for vehicle in vehicles {
        let lead_demand = demand
            .get(&vehicle.make.to_lowercase())
            .copied()
            .unwrap_or(0);

        if lead_demand != vehicle.demand_count {
            inventory.set_demand_count(vehicle.id, lead_demand).await?;
        }
    }

    tracing::info!("Demand analysis covered {} make(s)", demand.len());
    Ok(demand)
}

/// Step-function discount for slow-moving stock. Vehicles right at the
/// 90-day threshold are flagged but get a 0% suggestion.
pub fn discount_percentage_for(days_in_stock: i32) -> u8 {
    if days_in_stock > 180 {
        15
    } else if days_in_stock > 120 {
        10
    } else if days_in_stock > 90 {
        5
    } else {
        0
    }
}

/// Suggested reduced price after applying the stock-age discount.
pub fn suggested_price(price: i64, discount_percentage: u8) -> i64 {
    (price as f64 * (1.0 - discount_percentage as f64 / 100.0)).round() as i64
}

/// Find slow-moving vehicles, store a price-reduction suggestion for each
/// (never auto-applied), and send targeted offers to leads whose preferences
/// match. Per-vehicle failures are logged and do not stop the sweep.
pub async fn detect_slow_moving_inventory(
    leads: &LeadStorage,
    inventory: &InventoryStorage,
    whatsapp: &WhatsAppClient,
    now: DateTime<Utc>,
) -> Result<Vec<Vehicle>, AppError> {
    let slow_movers = inventory
        .slow_movers(SLOW_MOVER_MIN_DAYS, SLOW_MOVER_MAX_DEMAND)
        .await?;
    tracing::info!("Found {} slow-moving vehicle(s)", slow_movers.len());

    for vehicle in &slow_movers {
        if let Err(e) = suggest_price_reduction(inventory, vehicle, now).await {
            tracing::error!(
                "Failed to store pricing suggestion for {}: {}",
                vehicle.plate,
                e
            );
        }
        if let Err(e) = send_targeted_offers(leads, whatsapp, vehicle, now).await {
            tracing::error!("Failed to send targeted offers for {}: {}", vehicle.plate, e);
        }
    }

    Ok(slow_movers)
}

/// Store a discount suggestion in the vehicle's automation meta.
async fn suggest_price_reduction(
    inventory: &InventoryStorage,
    vehicle: &Vehicle,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let discount = discount_percentage_for(vehicle.days_in_stock);

    let mut meta = vehicle.automation_meta.clone();
    meta.pricing_suggestion = Some(PricingSuggestion {
        original_price: vehicle.price,
        suggested_price: suggested_price(vehicle.price, discount),
        discount_percentage: discount,
        reason: "slow_moving_inventory".to_string(),
        suggested_at: now,
    });

    inventory
        .update_automation_meta(vehicle.id, &meta, Some("discount"))
        .await?;

    tracing::info!(
        "Suggested {}% reduction for {} ({} days in stock)",
        discount,
        vehicle.plate,
        vehicle.days_in_stock
    );
    Ok(())
}

/// Offer a slow-moving vehicle to leads whose stored preferences match it
/// (with 10% budget headroom), recording the offer on each lead.
async fn send_targeted_offers(
    leads: &LeadStorage,
    whatsapp: &WhatsAppClient,
    vehicle: &Vehicle,
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    let buyer_intents = [
        Intent::PurchaseIntent,
        Intent::CarShopping,
        Intent::PricingInquiry,
    ];
    let candidates = leads.whatsapp_leads_by_intents(&buyer_intents).await?;

    let mut sent = 0;
    for mut lead in candidates {
        if !vehicle_matches_preferences(vehicle, &lead.meta.car_preferences, true) {
            continue;
        }

        whatsapp
            .send_text_best_effort(&lead.phone, &targeted_offer_message(vehicle))
            .await;

        lead.meta.targeted_offers.push(TargetedOffer {
            car_id: vehicle.id,
            car_details: format!("{} {}", vehicle.make, vehicle.model),
            price: vehicle.price,
            sent_at: now,
        });
        if let Err(e) = leads.update_meta(lead.id, &lead.meta).await {
            tracing::error!("Failed to record targeted offer on lead {}: {}", lead.id, e);
        }
        sent += 1;
    }

    if sent > 0 {
        tracing::info!("Sent {} targeted offer(s) for {}", sent, vehicle.plate);
    }
    Ok(sent)
}

fn targeted_offer_message(vehicle: &Vehicle) -> String {
    format!(
        "🎯 Perfect Match for You!\n\
         {}\n\
         💰 €{} (Special offer available!)\n\
         📍 {}\n\
         ⛽ {} | 🏃 {} km{}\n\
         📅 {} days in stock\n\n\
         This matches your preferences perfectly!\n\
         Reply \"INTERESTED\" to reserve for 24h\n\
         Or \"DETAILS\" for more information.",
        vehicle.display_name(),
        vehicle.price,
        vehicle.plate,
        vehicle.fuel,
        vehicle.mileage_km,
        vehicle
            .color
            .as_deref()
            .map(|c| format!(" | 🎨 {}", c))
            .unwrap_or_default(),
        vehicle.days_in_stock,
    )
}

/// Place a timed hold on a vehicle for a lead, recording the reservation on
/// both records and confirming to the customer.
pub async fn reserve_car(
    leads: &LeadStorage,
    inventory: &InventoryStorage,
    whatsapp: &WhatsAppClient,
    lead: &mut Lead,
    car_id: Uuid,
    reservation_hours: i64,
    now: DateTime<Utc>,
) -> Result<Reservation, AppError> {
    let vehicle = inventory
        .find_by_id(car_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Vehicle {} not found", car_id)))?;

    let reservation = Reservation {
        lead_id: lead.id,
        car_id,
        reserved_until: now + Duration::hours(reservation_hours),
        status: "active".to_string(),
        created_at: now,
    };

    let mut vehicle_meta = vehicle.automation_meta.clone();
    vehicle_meta.reservation = Some(reservation.clone());
    inventory
        .update_automation_meta(vehicle.id, &vehicle_meta, None)
        .await?;

    lead.meta.car_reservations.push(reservation.clone());
    leads.update_meta(lead.id, &lead.meta).await?;

    whatsapp
        .send_text_best_effort(
            &lead.phone,
            &reservation_confirmation_message(&vehicle, &reservation, reservation_hours),
        )
        .await;

    tracing::info!(
        "Reserved {} for lead {} until {}",
        vehicle.plate,
        lead.id,
        reservation.reserved_until
    );
    Ok(reservation)
}

fn reservation_confirmation_message(
    vehicle: &Vehicle,
    reservation: &Reservation,
    hours: i64,
) -> String {
    format!(
        "✅ Car Reserved Successfully!\n\
         {} {}\n\
         💰 €{}\n\
         📍 {}\n\n\
         🔒 Reserved for {} hours\n\
         ⏰ Until: {}\n\n\
         Next steps:\n\
         📞 Call us to schedule viewing\n\
         💳 Arrange financing (if needed)\n\
         📋 Prepare documentation\n\n\
         Reply \"EXTEND\" to extend reservation\n\
         Reply \"CANCEL\" to cancel reservation",
        vehicle.make,
        vehicle.model,
        vehicle.price,
        vehicle.plate,
        hours,
        reservation.reserved_until.format("%Y-%m-%d %H:%M UTC"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_steps_follow_stock_age() {
        assert_eq!(discount_percentage_for(200), 15);
        assert_eq!(discount_percentage_for(181), 15);
        assert_eq!(discount_percentage_for(180), 10);
        assert_eq!(discount_percentage_for(121), 10);
        assert_eq!(discount_percentage_for(120), 5);
        assert_eq!(discount_percentage_for(100), 5);
        assert_eq!(discount_percentage_for(91), 5);
        // Right at the threshold: flagged as slow-moving, but no reduction yet
        assert_eq!(discount_percentage_for(90), 0);
        assert_eq!(discount_percentage_for(50), 0);
    }

    #[test]
    fn suggested_price_applies_discount_rounded() {
        assert_eq!(suggested_price(20_000, 15), 17_000);
        assert_eq!(suggested_price(20_000, 10), 18_000);
        assert_eq!(suggested_price(20_000, 5), 19_000);
        assert_eq!(suggested_price(20_000, 0), 20_000);
        assert_eq!(suggested_price(9_999, 5), 9_499);
    }
}
