use std::env;

use chrono::Utc;
use rust_dealer_crm::db::Database;
use rust_dealer_crm::db_storage::{LeadStorage, NewLead};
use rust_dealer_crm::models::{Intent, JourneyStage, LeadMeta};

/// Integration smoke test for lead storage round-trips.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn lead_round_trip_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let storage = LeadStorage::new(db.pool.clone());

    // Unique phone per run to avoid conflicts on repeated executions.
    let suffix = Utc::now().timestamp_millis() % 1_000_000_000;
    let normalized = format!("351{:09}", suffix);

    let meta = LeadMeta {
        first_message: Some("I want a BMW under 20".to_string()),
        message_count: 1,
        ..Default::default()
    };

    let lead = storage
        .insert(NewLead {
            phone: format!("+{}", normalized),
            normalized_phone: normalized.clone(),
            name: Some("Smoke Test".to_string()),
            source: "whatsapp".to_string(),
            intent: Intent::PurchaseIntent,
            automation_status_reason: "whatsapp_inbound_message".to_string(),
            meta,
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let found = storage
        .find_by_normalized_phone(&normalized)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .expect("lead should be findable by normalized phone");

    assert_eq!(found.id, lead.id);
    assert_eq!(found.intent, Intent::PurchaseIntent);
    assert_eq!(found.meta.journey_stage, JourneyStage::InitialInterest);
    assert_eq!(found.meta.message_count, 1);

    // Meta updates persist the typed blob as-is.
    let mut meta = found.meta.clone();
    meta.automated_follow_ups.push("48h_general".to_string());
    storage
        .update_meta(found.id, &meta)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let reloaded = storage
        .find_by_id(found.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .expect("lead should still exist");
    assert!(reloaded.meta.has_fired_follow_up("48h_general"));

    Ok(())
}
