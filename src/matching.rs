//! Inventory matching engine.
//!
//! Matches a (possibly partial) preference record against showroom stock.
//! Database-side filtering and ranking live in [`InventoryStorage::search`];
//! this module adds the pure in-memory matcher used by the batch passes and
//! the recommendation message formatting. An empty result set is a normal
//! outcome, not an error — callers simply skip the recommendation send.

use crate::db_storage::{InventoryStorage, LeadStorage};
use crate::errors::AppError;
use crate::models::{CarPreferences, Lead, RecommendedCar, Vehicle};
use chrono::{DateTime, Utc};

/// Result cap for live matching on an inbound message.
pub const LIVE_MATCH_LIMIT: i64 = 5;
/// Result cap for personalized recommendation messages.
pub const RECOMMENDATION_LIMIT: i64 = 3;
/// Result cap for generic recommendation queries.
pub const GENERIC_QUERY_LIMIT: i64 = 10;

/// Budget headroom multiplier for targeted offers: a car up to 10% over the
/// stated budget still counts as a match.
const TARGETED_OFFER_BUDGET_HEADROOM: f64 = 1.1;

/// Find showroom vehicles matching the given preferences, ranked by demand
/// (descending) then stock age (ascending).
pub async fn match_inventory(
    inventory: &InventoryStorage,
    preferences: &CarPreferences,
    limit: i64,
) -> Result<Vec<Vehicle>, AppError> {
    let matches = inventory.search(preferences, limit).await?;
    tracing::debug!(
        "Inventory match: {} vehicle(s) for preferences {:?}",
        matches.len(),
        preferences
    );
    Ok(matches)
}

/// Live matching for an inbound message: search with the lead's merged
/// preferences and record the recommendation snapshot on the lead.
pub async fn match_for_lead(
    inventory: &InventoryStorage,
    leads: &LeadStorage,
    lead: &mut Lead,
    now: DateTime<Utc>,
) -> Result<Vec<Vehicle>, AppError> {
    let matches = match_inventory(inventory, &lead.meta.car_preferences, LIVE_MATCH_LIMIT).await?;

    if !matches.is_empty() {
        lead.meta.recommended_cars = matches
            .iter()
            .map(|car| RecommendedCar {
                id: car.id,
                make: car.make.clone(),
                model: car.model.clone(),
                price: car.price,
                recommended_at: now,
            })
            .collect();
        lead.meta.last_recommendation_date = Some(now);
        leads.update_meta(lead.id, &lead.meta).await?;
    }

    Ok(matches)
}

/// Pure preference check used by the in-memory batch matchers.
///
/// `budget_headroom` of `true` allows a price up to 10% over the stated
/// budget (targeted offers for slow movers); `false` requires price within
/// budget (new-arrival and price-drop alerts).
pub fn vehicle_matches_preferences(
    vehicle: &Vehicle,
    preferences: &CarPreferences,
    budget_headroom: bool,
) -> bool {
    if let Some(ref make) = preferences.make {
        if !vehicle.make.to_lowercase().contains(&make.to_lowercase()) {
            return false;
        }
    }

    if let Some(max_budget) = preferences.max_budget {
        let ceiling = if budget_headroom {
            (max_budget as f64 * TARGETED_OFFER_BUDGET_HEADROOM) as i64
        } else {
            max_budget
        };
        if vehicle.price > ceiling {
            return false;
        }
    }

    if let Some(ref fuel) = preferences.fuel {
        if &vehicle.fuel != fuel {
            return false;
        }
    }

    true
}

/// Customer-facing recommendation message listing up to three matches.
pub fn recommendations_message(vehicles: &[Vehicle]) -> String {
    let mut message = String::from("🎯 Perfect matches for you:\n\n");

    for (index, car) in vehicles.iter().take(RECOMMENDATION_LIMIT as usize).enumerate() {
        message.push_str(&format!(
            "{}. {} {}\n💰 €{}\n⛽ {} | 🏃 {} km\n📍 {}\n\n",
            index + 1,
            car.make,
            car.model,
            car.price,
            car.fuel,
            car.mileage_km,
            car.plate,
        ));
    }

    message.push_str(
        "Which one interests you most?\n\
         Reply with the number (1, 2, or 3)\n\
         Or say \"MORE INFO\" for detailed specs",
    );

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VehicleAutomationMeta;
    use uuid::Uuid;

    fn vehicle(make: &str, price: i64, fuel: &str) -> Vehicle {
        let now = Utc::now();
        Vehicle {
            id: Uuid::new_v4(),
            plate: "AA-00-BB".to_string(),
            make: make.to_string(),
            model: "Test".to_string(),
            version: None,
            price,
            fuel: fuel.to_string(),
            transmission: "Manual".to_string(),
            color: None,
            mileage_km: 50_000,
            status: "Exposição".to_string(),
            is_active: true,
            days_in_stock: 30,
            demand_count: 0,
            automation_meta: VehicleAutomationMeta::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn empty_preferences_match_everything() {
        let car = vehicle("BMW", 18_000, "Diesel");
        assert!(vehicle_matches_preferences(
            &car,
            &CarPreferences::default(),
            false
        ));
    }

    #[test]
    fn make_match_is_case_insensitive_substring() {
        let car = vehicle("BMW", 18_000, "Diesel");
        let prefs = CarPreferences {
            make: Some("Bmw".to_string()),
            ..Default::default()
        };
        assert!(vehicle_matches_preferences(&car, &prefs, false));

        let other = CarPreferences {
            make: Some("Audi".to_string()),
            ..Default::default()
        };
        assert!(!vehicle_matches_preferences(&car, &other, false));
    }

    #[test]
    fn budget_headroom_allows_ten_percent_over() {
        let car = vehicle("BMW", 21_000, "Diesel");
        let prefs = CarPreferences {
            max_budget: Some(20_000),
            ..Default::default()
        };
        assert!(!vehicle_matches_preferences(&car, &prefs, false));
        assert!(vehicle_matches_preferences(&car, &prefs, true));

        let too_expensive = vehicle("BMW", 23_000, "Diesel");
        assert!(!vehicle_matches_preferences(&too_expensive, &prefs, true));
    }

    #[test]
    fn fuel_must_match_exactly() {
        let car = vehicle("BMW", 18_000, "Diesel");
        let prefs = CarPreferences {
            fuel: Some("Gasolina".to_string()),
            ..Default::default()
        };
        assert!(!vehicle_matches_preferences(&car, &prefs, false));
    }

    #[test]
    fn recommendations_message_lists_at_most_three() {
        let cars = vec![
            vehicle("BMW", 18_000, "Diesel"),
            vehicle("Audi", 19_000, "Diesel"),
            vehicle("Seat", 12_000, "Gasolina"),
            vehicle("Ford", 9_000, "Gasolina"),
        ];
        let message = recommendations_message(&cars);
        assert!(message.contains("1. BMW"));
        assert!(message.contains("3. Seat"));
        assert!(!message.contains("4. Ford"));
    }
}
