use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============ Enumerations ============

/// Stage of a lead's journey through the sales funnel.
///
/// Serialized as snake_case strings; unknown strings read back from storage
/// fall back to the initial stage rather than failing the whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JourneyStage {
    #[default]
    InitialInterest,
    PreferencesGathered,
    RecommendationsSent,
    FollowUpEngaged,
    HotLead,
    PurchaseIntent,
    Converted,
    Dormant,
}

impl JourneyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JourneyStage::InitialInterest => "initial_interest",
            JourneyStage::PreferencesGathered => "preferences_gathered",
            JourneyStage::RecommendationsSent => "recommendations_sent",
            JourneyStage::FollowUpEngaged => "follow_up_engaged",
            JourneyStage::HotLead => "hot_lead",
            JourneyStage::PurchaseIntent => "purchase_intent",
            JourneyStage::Converted => "converted",
            JourneyStage::Dormant => "dormant",
        }
    }

    pub fn from_wire(s: &str) -> Self {
        match s {
            "initial_interest" => JourneyStage::InitialInterest,
            "preferences_gathered" => JourneyStage::PreferencesGathered,
            "recommendations_sent" => JourneyStage::RecommendationsSent,
            "follow_up_engaged" => JourneyStage::FollowUpEngaged,
            "hot_lead" => JourneyStage::HotLead,
            "purchase_intent" => JourneyStage::PurchaseIntent,
            "converted" => JourneyStage::Converted,
            "dormant" => JourneyStage::Dormant,
            other => {
                tracing::warn!("Unknown journey stage '{}', using initial_interest", other);
                JourneyStage::InitialInterest
            }
        }
    }
}

impl From<String> for JourneyStage {
    fn from(s: String) -> Self {
        JourneyStage::from_wire(&s)
    }
}

impl From<JourneyStage> for String {
    fn from(stage: JourneyStage) -> Self {
        stage.as_str().to_string()
    }
}

impl std::fmt::Display for JourneyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified intent of a lead, derived from inbound message keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Intent {
    PurchaseIntent,
    SellIntent,
    ServiceIntent,
    PricingInquiry,
    FinancingInquiry,
    ViewingRequest,
    CarShopping,
    #[default]
    GeneralInquiry,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::PurchaseIntent => "purchase_intent",
            Intent::SellIntent => "sell_intent",
            Intent::ServiceIntent => "service_intent",
            Intent::PricingInquiry => "pricing_inquiry",
            Intent::FinancingInquiry => "financing_inquiry",
            Intent::ViewingRequest => "viewing_request",
            Intent::CarShopping => "car_shopping",
            Intent::GeneralInquiry => "general_inquiry",
        }
    }

    pub fn from_wire(s: &str) -> Self {
        match s {
            "purchase_intent" => Intent::PurchaseIntent,
            "sell_intent" => Intent::SellIntent,
            "service_intent" => Intent::ServiceIntent,
            "pricing_inquiry" => Intent::PricingInquiry,
            "financing_inquiry" => Intent::FinancingInquiry,
            "viewing_request" => Intent::ViewingRequest,
            "car_shopping" => Intent::CarShopping,
            "general_inquiry" => Intent::GeneralInquiry,
            other => {
                tracing::warn!("Unknown intent '{}', using general_inquiry", other);
                Intent::GeneralInquiry
            }
        }
    }

    /// Base contribution of this intent to the lead score.
    pub fn base_score(&self) -> u32 {
        match self {
            Intent::PurchaseIntent => 40,
            Intent::FinancingInquiry => 35,
            Intent::ViewingRequest => 30,
            Intent::PricingInquiry => 25,
            Intent::CarShopping => 20,
            Intent::GeneralInquiry => 10,
            Intent::SellIntent | Intent::ServiceIntent => 0,
        }
    }
}

impl From<String> for Intent {
    fn from(s: String) -> Self {
        Intent::from_wire(&s)
    }
}

impl From<Intent> for String {
    fn from(intent: Intent) -> Self {
        intent.as_str().to_string()
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualification status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LeadStatus {
    #[default]
    New,
    Qualified,
    Warm,
    Hot,
    Converted,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Warm => "warm",
            LeadStatus::Hot => "hot",
            LeadStatus::Converted => "converted",
        }
    }

    pub fn from_wire(s: &str) -> Self {
        match s {
            "new" => LeadStatus::New,
            "qualified" => LeadStatus::Qualified,
            "warm" => LeadStatus::Warm,
            "hot" => LeadStatus::Hot,
            "converted" => LeadStatus::Converted,
            other => {
                tracing::warn!("Unknown lead status '{}', using new", other);
                LeadStatus::New
            }
        }
    }
}

impl From<String> for LeadStatus {
    fn from(s: String) -> Self {
        LeadStatus::from_wire(&s)
    }
}

impl From<LeadStatus> for String {
    fn from(status: LeadStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Lead meta (typed, stored as JSONB) ============

/// Car preferences extracted from free-text messages.
///
/// All fields are optional; an absent keyword simply leaves a field unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_type: Option<String>,
}

impl CarPreferences {
    /// Number of populated fields; drives the preferences_gathered transition.
    pub fn populated_fields(&self) -> usize {
        [
            self.make.is_some(),
            self.max_budget.is_some(),
            self.fuel.is_some(),
            self.transmission.is_some(),
            self.body_type.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.populated_fields() == 0
    }

    /// Merge newly extracted preferences over the stored record. Fields set in
    /// `newer` win; unset fields keep their previous value.
    pub fn merge(&mut self, newer: &CarPreferences) {
        if newer.make.is_some() {
            self.make = newer.make.clone();
        }
        if newer.max_budget.is_some() {
            self.max_budget = newer.max_budget;
        }
        if newer.fuel.is_some() {
            self.fuel = newer.fuel.clone();
        }
        if newer.transmission.is_some() {
            self.transmission = newer.transmission.clone();
        }
        if newer.body_type.is_some() {
            self.body_type = newer.body_type.clone();
        }
    }
}

/// A single recorded interaction with a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// Interaction channel/kind, e.g. "whatsapp_message".
    pub kind: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Stage the lead was in when the interaction was recorded.
    pub stage: JourneyStage,
}

/// A 24-hour hold placed on a vehicle for a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub lead_id: Uuid,
    pub car_id: Uuid,
    pub reserved_until: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Record of a targeted offer sent to a lead for a slow-moving vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetedOffer {
    pub car_id: Uuid,
    pub car_details: String,
    pub price: i64,
    pub sent_at: DateTime<Utc>,
}

/// Vehicle recommendation snapshot stored on the lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedCar {
    pub id: Uuid,
    pub make: String,
    pub model: String,
    pub price: i64,
    pub recommended_at: DateTime<Utc>,
}

/// Typed lead metadata, persisted as a JSONB column.
///
/// Every field defaults so partially populated blobs from older writes decode
/// cleanly; a malformed blob decodes to the empty record with a warning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadMeta {
    pub journey_stage: JourneyStage,
    pub interactions: Vec<Interaction>,
    pub car_preferences: CarPreferences,
    pub lead_score: Option<u8>,
    pub score_calculated_at: Option<DateTime<Utc>>,
    /// Idempotency tags of follow-up rules that already fired for this lead.
    pub automated_follow_ups: Vec<String>,
    pub car_reservations: Vec<Reservation>,
    pub targeted_offers: Vec<TargetedOffer>,
    pub recommended_cars: Vec<RecommendedCar>,
    pub specific_car_interest: bool,
    pub first_message: Option<String>,
    pub last_whatsapp_message: Option<String>,
    pub message_count: u32,
    pub last_interaction: Option<DateTime<Utc>>,
    pub last_contact_date: Option<DateTime<Utc>>,
    pub last_recommendation_date: Option<DateTime<Utc>>,
}

impl LeadMeta {
    /// Decode a stored JSONB blob. Malformed blobs are treated as empty rather
    /// than failing the whole lead record.
    pub fn from_value(value: serde_json::Value) -> Self {
        match serde_json::from_value(value) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("Malformed lead meta blob, treating as empty: {}", e);
                LeadMeta::default()
            }
        }
    }

    pub fn has_fired_follow_up(&self, tag: &str) -> bool {
        self.automated_follow_ups.iter().any(|t| t == tag)
    }
}

// ============ Vehicle automation meta ============

/// Price-reduction suggestion computed for slow-moving stock. Stored as a
/// suggestion only; prices are never changed automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSuggestion {
    pub original_price: i64,
    pub suggested_price: i64,
    pub discount_percentage: u8,
    pub reason: String,
    pub suggested_at: DateTime<Utc>,
}

/// Typed vehicle automation metadata, persisted as a JSONB column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleAutomationMeta {
    pub pricing_suggestion: Option<PricingSuggestion>,
    pub reservation: Option<Reservation>,
}

impl VehicleAutomationMeta {
    pub fn from_value(value: serde_json::Value) -> Self {
        match serde_json::from_value(value) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("Malformed vehicle automation meta, treating as empty: {}", e);
                VehicleAutomationMeta::default()
            }
        }
    }
}

// ============ Database entities ============

/// A prospective customer tracked through the sales journey.
#[derive(Debug, Clone, Serialize)]
pub struct Lead {
    pub id: Uuid,
    /// Contact address as received from the messaging channel.
    pub phone: String,
    /// Digits-only phone used as the lookup key.
    pub normalized_phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Channel tag, e.g. "whatsapp".
    pub source: String,
    pub intent: Intent,
    pub status: LeadStatus,
    pub automation_status_reason: Option<String>,
    pub automation_status_at: Option<DateTime<Utc>>,
    pub meta: LeadMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A vehicle in the dealership's inventory.
#[derive(Debug, Clone, Serialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub plate: String,
    pub make: String,
    pub model: String,
    pub version: Option<String>,
    /// Price in whole euros.
    pub price: i64,
    pub fuel: String,
    pub transmission: String,
    pub color: Option<String>,
    pub mileage_km: i32,
    /// Showroom status; only "Exposição" vehicles are shown to customers.
    pub status: String,
    pub is_active: bool,
    pub days_in_stock: i32,
    pub demand_count: i32,
    pub automation_meta: VehicleAutomationMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    /// One-line description used in customer-facing messages.
    pub fn display_name(&self) -> String {
        match &self.version {
            Some(version) => format!("{} {} {}", self.make, self.model, version),
            None => format!("{} {}", self.make, self.model),
        }
    }
}
