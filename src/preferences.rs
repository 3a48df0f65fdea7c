//! Keyword-based analysis of inbound message text.
//!
//! Everything here is pure and deterministic: the same text always yields the
//! same preference record, intent, and keyword flags. Vocabulary is a fixed
//! PT/EN pair list; absence of a keyword leaves the matching field unset.

use crate::models::{CarPreferences, Intent};
use regex::Regex;

/// Brand list scanned in order; the first match wins.
const BRANDS: [&str; 10] = [
    "bmw",
    "mercedes",
    "volkswagen",
    "audi",
    "toyota",
    "ford",
    "renault",
    "peugeot",
    "seat",
    "skoda",
];

/// Budget figure with an optional leading qualifier and currency marker.
/// Customers typically type thousands ("20" meaning 20 000), so the captured
/// digits are scaled by the configured multiplier.
const BUDGET_PATTERN: &str =
    r"(?i)(?:até|under|below|maximum|max)?\s*(?:€|euros?)?\s*(\d{1,2}[.,]?\d{0,3})";

/// Extract a car preference record from free-text message content.
///
/// `budget_unit_multiplier` scales the captured budget digits (normally 1000).
pub fn extract_car_preferences(message: &str, budget_unit_multiplier: i64) -> CarPreferences {
    let msg = message.to_lowercase();
    let mut preferences = CarPreferences::default();

    for brand in BRANDS {
        if msg.contains(brand) {
            preferences.make = Some(capitalize(brand));
            break;
        }
    }

    let budget_regex = Regex::new(BUDGET_PATTERN).unwrap();
    if let Some(captures) = budget_regex.captures(&msg) {
        let digits: String = captures[1].chars().filter(|c| c.is_ascii_digit()).collect();
        if let Ok(amount) = digits.parse::<i64>() {
            preferences.max_budget = Some(amount * budget_unit_multiplier);
        }
    }

    preferences.fuel = if msg.contains("diesel") {
        Some("Diesel".to_string())
    } else if msg.contains("gasolina") || msg.contains("petrol") {
        Some("Gasolina".to_string())
    } else if msg.contains("elétrico") || msg.contains("electric") {
        Some("Elétrico".to_string())
    } else if msg.contains("híbrido") || msg.contains("hybrid") {
        Some("Hibrido (Gasolina)".to_string())
    } else {
        None
    };

    preferences.transmission = if msg.contains("automática") || msg.contains("automatic") {
        Some("Automática".to_string())
    } else if msg.contains("manual") {
        Some("Manual".to_string())
    } else {
        None
    };

    preferences.body_type = if msg.contains("suv") {
        Some("SUV".to_string())
    } else if msg.contains("sedan") {
        Some("Sedan".to_string())
    } else if msg.contains("carrinha") || msg.contains("wagon") {
        Some("Carrinha".to_string())
    } else {
        None
    };

    preferences
}

/// Classify the business intent of an inbound message from its keywords.
pub fn extract_intent(message: &str) -> Intent {
    let msg = message.to_lowercase();

    if msg.contains("buy") || msg.contains("purchase") || msg.contains("interested") {
        return Intent::PurchaseIntent;
    }
    if msg.contains("sell") || msg.contains("trade") {
        return Intent::SellIntent;
    }
    if msg.contains("service") || msg.contains("maintenance") || msg.contains("repair") {
        return Intent::ServiceIntent;
    }
    if msg.contains("price") || msg.contains("cost") || msg.contains("quote") {
        return Intent::PricingInquiry;
    }
    if msg.contains("financing") || msg.contains("loan") || msg.contains("credit") {
        return Intent::FinancingInquiry;
    }
    if msg.contains("test drive") || msg.contains("viewing") || msg.contains("see") {
        return Intent::ViewingRequest;
    }

    Intent::GeneralInquiry
}

/// True when the message signals urgency (drives the +25 score bonus).
pub fn has_urgency_keyword(message: &str) -> bool {
    let msg = message.to_lowercase();
    ["urgent", "today", "now", "immediately", "asap"]
        .iter()
        .any(|keyword| msg.contains(keyword))
}

/// True when the message asks about price (drives the hot_lead transitions).
pub fn has_price_keyword(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("price") || msg.contains("quanto") || msg.contains('€')
}

/// True when the message asks to visit, see, or book a car.
pub fn has_visit_keyword(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("visit") || msg.contains("see") || msg.contains("book")
}

/// True when the message asks to reserve or hold a car.
pub fn has_reservation_keyword(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("reserve") || msg.contains("book") || msg.contains("hold")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_make_and_budget() {
        let prefs = extract_car_preferences("I want a BMW under 20", 1000);
        assert_eq!(prefs.make.as_deref(), Some("Bmw"));
        assert_eq!(prefs.max_budget, Some(20_000));
    }

    #[test]
    fn first_brand_in_list_order_wins() {
        // Both brands present; "bmw" precedes "audi" in the scan order.
        let prefs = extract_car_preferences("audi or bmw, not sure", 1000);
        assert_eq!(prefs.make.as_deref(), Some("Bmw"));
    }

    #[test]
    fn no_keywords_yields_empty_record() {
        let prefs = extract_car_preferences("hello there", 1000);
        assert!(prefs.is_empty());
    }

    #[test]
    fn budget_with_thousands_separator() {
        // digits "15500" scaled by the multiplier
        let prefs = extract_car_preferences("max 15.500 euros", 1000);
        assert_eq!(prefs.max_budget, Some(15_500_000));
    }

    #[test]
    fn budget_multiplier_is_configurable() {
        let prefs = extract_car_preferences("under 20", 1);
        assert_eq!(prefs.max_budget, Some(20));
    }

    #[test]
    fn extracts_fuel_transmission_and_body() {
        let prefs = extract_car_preferences("looking for an automatic diesel SUV", 1000);
        assert_eq!(prefs.fuel.as_deref(), Some("Diesel"));
        assert_eq!(prefs.transmission.as_deref(), Some("Automática"));
        assert_eq!(prefs.body_type.as_deref(), Some("SUV"));
    }

    #[test]
    fn portuguese_vocabulary_maps_to_canonical_labels() {
        let prefs = extract_car_preferences("carrinha a gasolina, caixa manual", 1000);
        assert_eq!(prefs.fuel.as_deref(), Some("Gasolina"));
        assert_eq!(prefs.transmission.as_deref(), Some("Manual"));
        assert_eq!(prefs.body_type.as_deref(), Some("Carrinha"));
    }

    #[test]
    fn fuel_scan_order_is_the_tie_break() {
        let prefs = extract_car_preferences("diesel or hybrid?", 1000);
        assert_eq!(prefs.fuel.as_deref(), Some("Diesel"));
    }

    #[test]
    fn intent_classification_matches_vocabulary() {
        assert_eq!(extract_intent("I want to buy a car"), Intent::PurchaseIntent);
        assert_eq!(extract_intent("can I trade in my car?"), Intent::SellIntent);
        assert_eq!(extract_intent("need a repair"), Intent::ServiceIntent);
        assert_eq!(extract_intent("what's the price?"), Intent::PricingInquiry);
        assert_eq!(extract_intent("do you offer financing?"), Intent::FinancingInquiry);
        assert_eq!(extract_intent("book a test drive"), Intent::ViewingRequest);
        assert_eq!(extract_intent("hello"), Intent::GeneralInquiry);
    }

    #[test]
    fn keyword_predicates() {
        assert!(has_urgency_keyword("I need it TODAY"));
        assert!(!has_urgency_keyword("sometime next month"));
        assert!(has_price_keyword("quanto custa?"));
        assert!(has_price_keyword("is 15€ enough"));
        assert!(!has_price_keyword("just browsing"));
        assert!(has_visit_keyword("can I come see it"));
        assert!(has_reservation_keyword("please hold it for me"));
    }
}
