//! Data access for leads, inventory, and the message log.
//!
//! Rows carry their meta blobs as raw JSONB; decoding into the typed structs
//! happens here, at the store boundary, so the rest of the crate only ever
//! sees validated records.

use crate::errors::AppError;
use crate::models::{
    CarPreferences, Intent, Lead, LeadMeta, LeadStatus, Vehicle, VehicleAutomationMeta,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, QueryBuilder};
use uuid::Uuid;

const LEAD_COLUMNS: &str = "id, phone, normalized_phone, name, email, source, intent, status, \
     automation_status_reason, automation_status_at, meta, created_at, updated_at";

const CAR_COLUMNS: &str = "id, plate, make, model, version, price, fuel, transmission, color, \
     mileage_km, status, is_active, days_in_stock, demand_count, automation_meta, \
     created_at, updated_at";

#[derive(Debug, FromRow)]
struct LeadRow {
    id: Uuid,
    phone: String,
    normalized_phone: String,
    name: Option<String>,
    email: Option<String>,
    source: String,
    intent: String,
    status: String,
    automation_status_reason: Option<String>,
    automation_status_at: Option<DateTime<Utc>>,
    meta: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LeadRow> for Lead {
    fn from(row: LeadRow) -> Self {
        Lead {
            id: row.id,
            phone: row.phone,
            normalized_phone: row.normalized_phone,
            name: row.name,
            email: row.email,
            source: row.source,
            intent: Intent::from_wire(&row.intent),
            status: LeadStatus::from_wire(&row.status),
            automation_status_reason: row.automation_status_reason,
            automation_status_at: row.automation_status_at,
            meta: LeadMeta::from_value(row.meta),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct VehicleRow {
    id: Uuid,
    plate: String,
    make: String,
    model: String,
    version: Option<String>,
    price: i64,
    fuel: String,
    transmission: String,
    color: Option<String>,
    mileage_km: i32,
    status: String,
    is_active: bool,
    days_in_stock: i32,
    demand_count: i32,
    automation_meta: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VehicleRow> for Vehicle {
    fn from(row: VehicleRow) -> Self {
        Vehicle {
            id: row.id,
            plate: row.plate,
            make: row.make,
            model: row.model,
            version: row.version,
            price: row.price,
            fuel: row.fuel,
            transmission: row.transmission,
            color: row.color,
            mileage_km: row.mileage_km,
            status: row.status,
            is_active: row.is_active,
            days_in_stock: row.days_in_stock,
            demand_count: row.demand_count,
            automation_meta: VehicleAutomationMeta::from_value(row.automation_meta),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Fields required to create a lead on first inbound contact.
#[derive(Debug)]
pub struct NewLead {
    pub phone: String,
    pub normalized_phone: String,
    pub name: Option<String>,
    pub source: String,
    pub intent: Intent,
    pub automation_status_reason: String,
    pub meta: LeadMeta,
}

/// Lead record store.
pub struct LeadStorage {
    pool: PgPool,
}

impl LeadStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_normalized_phone(
        &self,
        normalized_phone: &str,
    ) -> Result<Option<Lead>, AppError> {
        let row = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {} FROM leads WHERE normalized_phone = $1 LIMIT 1",
            LEAD_COLUMNS
        ))
        .bind(normalized_phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Lead::from))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let row = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {} FROM leads WHERE id = $1",
            LEAD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Lead::from))
    }

    pub async fn insert(&self, new_lead: NewLead) -> Result<Lead, AppError> {
        let meta_value = serde_json::to_value(&new_lead.meta)?;

        let row = sqlx::query_as::<_, LeadRow>(&format!(
            r#"
            INSERT INTO leads
                (id, phone, normalized_phone, name, source, intent, status,
                 automation_status_reason, automation_status_at, meta, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), $9, now(), now())
            RETURNING {}
            "#,
            LEAD_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new_lead.phone)
        .bind(&new_lead.normalized_phone)
        .bind(&new_lead.name)
        .bind(&new_lead.source)
        .bind(new_lead.intent.as_str())
        .bind(LeadStatus::New.as_str())
        .bind(&new_lead.automation_status_reason)
        .bind(meta_value)
        .fetch_one(&self.pool)
        .await?;

        Ok(Lead::from(row))
    }

    /// Persist the meta blob in one write; stage, history, and follow-up tags
    /// always land together.
    pub async fn update_meta(&self, id: Uuid, meta: &LeadMeta) -> Result<(), AppError> {
        let meta_value = serde_json::to_value(meta)?;

        sqlx::query("UPDATE leads SET meta = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(meta_value)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Update intent, status reason, and meta after an inbound message.
    pub async fn update_after_message(
        &self,
        id: Uuid,
        intent: Intent,
        automation_status_reason: &str,
        meta: &LeadMeta,
    ) -> Result<(), AppError> {
        let meta_value = serde_json::to_value(meta)?;

        sqlx::query(
            r#"
            UPDATE leads
            SET intent = $2,
                automation_status_reason = $3,
                automation_status_at = now(),
                meta = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(intent.as_str())
        .bind(automation_status_reason)
        .bind(meta_value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a recomputed score and classification from the batch pass.
    pub async fn update_scoring(
        &self,
        id: Uuid,
        status: LeadStatus,
        automation_status_reason: &str,
        meta: &LeadMeta,
    ) -> Result<(), AppError> {
        let meta_value = serde_json::to_value(meta)?;

        sqlx::query(
            r#"
            UPDATE leads
            SET status = $2,
                automation_status_reason = $3,
                automation_status_at = now(),
                meta = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(automation_status_reason)
        .bind(meta_value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fill in the display name from the contact profile if we have none yet.
    pub async fn set_name_if_missing(&self, id: Uuid, name: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE leads SET name = COALESCE(name, $2), updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// WhatsApp leads created within the trailing scoring window, most
    /// recently updated first.
    pub async fn whatsapp_leads_created_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Lead>, AppError> {
        let rows = sqlx::query_as::<_, LeadRow>(&format!(
            r#"
            SELECT {} FROM leads
            WHERE source = 'whatsapp' AND created_at >= $1
            ORDER BY updated_at DESC
            "#,
            LEAD_COLUMNS
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Lead::from).collect())
    }

    /// All WhatsApp leads still in play for the follow-up sweep.
    pub async fn whatsapp_leads_not_converted(&self) -> Result<Vec<Lead>, AppError> {
        let rows = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {} FROM leads WHERE source = 'whatsapp' AND status <> 'converted'",
            LEAD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Lead::from).collect())
    }

    /// WhatsApp leads holding any of the given intents (targeted offers,
    /// new-arrival alerts).
    pub async fn whatsapp_leads_by_intents(
        &self,
        intents: &[Intent],
    ) -> Result<Vec<Lead>, AppError> {
        let wire: Vec<String> = intents.iter().map(|i| i.as_str().to_string()).collect();

        let rows = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {} FROM leads WHERE source = 'whatsapp' AND intent = ANY($1)",
            LEAD_COLUMNS
        ))
        .bind(wire)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Lead::from).collect())
    }

    /// Filtered listing for the operational endpoints.
    pub async fn list(
        &self,
        status: Option<LeadStatus>,
        intent: Option<Intent>,
        limit: i64,
    ) -> Result<Vec<Lead>, AppError> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM leads WHERE TRUE", LEAD_COLUMNS));

        if let Some(status) = status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(intent) = intent {
            builder.push(" AND intent = ");
            builder.push_bind(intent.as_str());
        }
        builder.push(" ORDER BY updated_at DESC LIMIT ");
        builder.push_bind(limit);

        let rows = builder
            .build_query_as::<LeadRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Lead::from).collect())
    }
}

/// Vehicle inventory store.
pub struct InventoryStorage {
    pool: PgPool,
}

impl InventoryStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Vehicle>, AppError> {
        let row = sqlx::query_as::<_, VehicleRow>(&format!(
            "SELECT {} FROM cars WHERE id = $1",
            CAR_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Vehicle::from))
    }

    /// Preference-filtered search over showroom vehicles, ranked by customer
    /// demand and stock freshness (demand desc, days-in-stock asc).
    pub async fn search(
        &self,
        preferences: &CarPreferences,
        limit: i64,
    ) -> Result<Vec<Vehicle>, AppError> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM cars WHERE is_active = TRUE AND status = 'Exposição'",
            CAR_COLUMNS
        ));

        if let Some(ref make) = preferences.make {
            builder.push(" AND make ILIKE ");
            builder.push_bind(format!("%{}%", make));
        }
        if let Some(max_budget) = preferences.max_budget {
            builder.push(" AND price <= ");
            builder.push_bind(max_budget);
        }
        if let Some(ref fuel) = preferences.fuel {
            builder.push(" AND fuel = ");
            builder.push_bind(fuel.clone());
        }
        if let Some(ref transmission) = preferences.transmission {
            builder.push(" AND transmission = ");
            builder.push_bind(transmission.clone());
        }

        builder.push(" ORDER BY demand_count DESC, days_in_stock ASC LIMIT ");
        builder.push_bind(limit);

        let rows = builder
            .build_query_as::<VehicleRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Vehicle::from).collect())
    }

    /// Newest stock matching make/budget, for personalized recommendation
    /// messages (freshest arrivals first).
    pub async fn newest_matching(
        &self,
        preferences: &CarPreferences,
        limit: i64,
    ) -> Result<Vec<Vehicle>, AppError> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM cars WHERE is_active = TRUE AND status = 'Exposição'",
            CAR_COLUMNS
        ));

        if let Some(ref make) = preferences.make {
            builder.push(" AND make ILIKE ");
            builder.push_bind(format!("%{}%", make));
        }
        if let Some(max_budget) = preferences.max_budget {
            builder.push(" AND price <= ");
            builder.push_bind(max_budget);
        }

        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);

        let rows = builder
            .build_query_as::<VehicleRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Vehicle::from).collect())
    }

    /// All active vehicles, for the demand analysis pass.
    pub async fn active_vehicles(&self) -> Result<Vec<Vehicle>, AppError> {
        let rows = sqlx::query_as::<_, VehicleRow>(&format!(
            "SELECT {} FROM cars WHERE is_active = TRUE",
            CAR_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Vehicle::from).collect())
    }

    pub async fn set_demand_count(&self, id: Uuid, demand_count: i32) -> Result<(), AppError> {
        sqlx::query("UPDATE cars SET demand_count = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(demand_count)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Active vehicles in stock for at least `min_days` with demand at or
    /// below `max_demand`.
    pub async fn slow_movers(
        &self,
        min_days: i32,
        max_demand: i32,
    ) -> Result<Vec<Vehicle>, AppError> {
        let rows = sqlx::query_as::<_, VehicleRow>(&format!(
            r#"
            SELECT {} FROM cars
            WHERE is_active = TRUE AND days_in_stock >= $1 AND demand_count <= $2
            "#,
            CAR_COLUMNS
        ))
        .bind(min_days)
        .bind(max_demand)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Vehicle::from).collect())
    }

    pub async fn update_automation_meta(
        &self,
        id: Uuid,
        meta: &VehicleAutomationMeta,
        pricing_signal: Option<&str>,
    ) -> Result<(), AppError> {
        let meta_value = serde_json::to_value(meta)?;

        sqlx::query(
            r#"
            UPDATE cars
            SET automation_meta = $2,
                pricing_signal = COALESCE($3, pricing_signal),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(meta_value)
        .bind(pricing_signal)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Showroom vehicles added since the given instant (new-arrival alerts).
    pub async fn arrivals_since(&self, since: DateTime<Utc>) -> Result<Vec<Vehicle>, AppError> {
        let rows = sqlx::query_as::<_, VehicleRow>(&format!(
            r#"
            SELECT {} FROM cars
            WHERE is_active = TRUE AND status = 'Exposição' AND created_at >= $1
            "#,
            CAR_COLUMNS
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Vehicle::from).collect())
    }

    /// Active vehicles carrying a stored pricing suggestion.
    pub async fn vehicles_with_pricing_suggestion(&self) -> Result<Vec<Vehicle>, AppError> {
        let rows = sqlx::query_as::<_, VehicleRow>(&format!(
            r#"
            SELECT {} FROM cars
            WHERE is_active = TRUE AND automation_meta ? 'pricing_suggestion'
            "#,
            CAR_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Vehicle::from).collect())
    }
}

/// Append-only log of inbound messages and their delivery-status updates.
pub struct MessageLog {
    pool: PgPool,
}

impl MessageLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an inbound message. Redeliveries of the same message id are
    /// ignored.
    pub async fn log_inbound(
        &self,
        message_id: &str,
        phone: &str,
        body: Option<&str>,
        message_type: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO whatsapp_messages (message_id, phone, direction, body, message_type, received_at)
            VALUES ($1, $2, 'inbound', $3, $4, now())
            ON CONFLICT (message_id) DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(phone)
        .bind(body)
        .bind(message_type)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply a delivery-status callback to a previously logged message.
    pub async fn update_status(
        &self,
        message_id: &str,
        status: &str,
        status_timestamp: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE whatsapp_messages
            SET status = $2, status_timestamp = $3
            WHERE message_id = $1
            "#,
        )
        .bind(message_id)
        .bind(status)
        .bind(status_timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
