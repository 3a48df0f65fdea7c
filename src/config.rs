use serde::Deserialize;

/// Application configuration, loaded once at startup and injected into every
/// component. Business logic never reads the environment directly.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Base URL of the WhatsApp Cloud API (overridable for tests).
    pub whatsapp_api_base_url: String,
    pub whatsapp_token: String,
    pub whatsapp_phone_number_id: String,
    /// Token echoed back during the webhook verification handshake.
    pub whatsapp_verify_token: String,
    /// Sales-team numbers that receive hot-lead alerts, E.164 format.
    pub sales_team_phones: Vec<String>,
    /// Multiplier applied to extracted budget figures. The inbound vocabulary
    /// assumes customers type thousands ("20" means 20 000), so this defaults
    /// to 1000; deployments whose customers type full amounts can set it to 1.
    pub budget_unit_multiplier: i64,
    /// Dealership display name used in customer-facing messages.
    pub dealership_name: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            whatsapp_api_base_url: std::env::var("WHATSAPP_API_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "https://graph.facebook.com/v20.0".to_string()),
            whatsapp_token: std::env::var("WHATSAPP_TOKEN")
                .map_err(|_| anyhow::anyhow!("WHATSAPP_TOKEN environment variable required"))
                .and_then(|token| {
                    if token.trim().is_empty() {
                        anyhow::bail!("WHATSAPP_TOKEN cannot be empty");
                    }
                    Ok(token)
                })?,
            whatsapp_phone_number_id: std::env::var("PHONE_NUMBER_ID")
                .map_err(|_| anyhow::anyhow!("PHONE_NUMBER_ID environment variable required"))
                .and_then(|id| {
                    if id.trim().is_empty() {
                        anyhow::bail!("PHONE_NUMBER_ID cannot be empty");
                    }
                    Ok(id)
                })?,
            whatsapp_verify_token: std::env::var("WHATSAPP_VERIFY_TOKEN")
                .map_err(|_| anyhow::anyhow!("WHATSAPP_VERIFY_TOKEN environment variable required"))
                .and_then(|token| {
                    if token.trim().is_empty() {
                        anyhow::bail!("WHATSAPP_VERIFY_TOKEN cannot be empty");
                    }
                    Ok(token)
                })?,
            sales_team_phones: std::env::var("SALES_TEAM_PHONES")
                .map_err(|_| {
                    anyhow::anyhow!(
                        "SALES_TEAM_PHONES environment variable required (comma-separated E.164 numbers)"
                    )
                })
                .and_then(parse_sales_team_phones)?,
            budget_unit_multiplier: std::env::var("BUDGET_UNIT_MULTIPLIER")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BUDGET_UNIT_MULTIPLIER must be a positive integer"))
                .and_then(|m: i64| {
                    if m < 1 {
                        anyhow::bail!("BUDGET_UNIT_MULTIPLIER must be >= 1");
                    }
                    Ok(m)
                })?,
            dealership_name: std::env::var("DEALERSHIP_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "AutoTrust".to_string()),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("WhatsApp API base URL: {}", config.whatsapp_api_base_url);
        tracing::debug!(
            "Sales team contacts configured: {}",
            config.sales_team_phones.len()
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Parse and validate the comma-separated sales-team phone list.
///
/// Each number must be a valid Portuguese number; invalid entries fail startup
/// rather than silently dropping an alert recipient.
fn parse_sales_team_phones(raw: String) -> anyhow::Result<Vec<String>> {
    let mut phones = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (valid, normalized) = crate::messaging::validate_pt_phone(entry);
        if !valid {
            anyhow::bail!("SALES_TEAM_PHONES contains an invalid number: {}", entry);
        }
        phones.push(normalized);
    }
    if phones.is_empty() {
        anyhow::bail!("SALES_TEAM_PHONES must contain at least one number");
    }
    Ok(phones)
}
