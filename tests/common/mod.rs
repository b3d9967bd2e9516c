#![allow(dead_code)]

use chrono::{Duration, Utc};
use promo_api::{
    db,
    entities::campaign::DiscountType,
    events::{process_events, EventSender},
    handlers::AppServices,
    services::campaigns::CreateCampaignInput,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connects an in-memory SQLite database, runs the embedded migrations, and
/// wires the service layer. A single pooled connection keeps every task in
/// the test on the same shared in-memory database.
pub async fn setup_services() -> (Arc<DatabaseConnection>, AppServices) {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_owned());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);

    let pool = Database::connect(opt).await.expect("db connect");
    db::run_migrations(&pool).await.expect("migrations");

    let db_arc = Arc::new(pool);
    let (tx, rx) = mpsc::channel(256);
    let sender = EventSender::new(tx);
    tokio::spawn(process_events(rx));

    let services = AppServices::new(db_arc.clone(), Arc::new(sender));
    (db_arc, services)
}

/// A percentage campaign input with sensible defaults; tweak fields per test.
pub fn percentage_campaign(slug: &str, prefix: &str, percent: Decimal) -> CreateCampaignInput {
    let now = Utc::now();
    CreateCampaignInput {
        name: format!("{} campaign", slug),
        slug: slug.to_string(),
        code_prefix: prefix.to_string(),
        description: None,
        discount_type: DiscountType::Percentage,
        discount_value: percent,
        max_discount_cap: None,
        min_purchase_amount: None,
        eligibility_tags: vec![],
        applicable_category_ids: vec![],
        applicable_item_ids: vec![],
        max_usage_per_user: 1,
        max_global_usage: None,
        is_unique_per_user: false,
        valid_from: now - Duration::days(1),
        valid_until: now + Duration::days(30),
    }
}

pub fn fixed_amount_campaign(slug: &str, prefix: &str, amount: Decimal) -> CreateCampaignInput {
    CreateCampaignInput {
        discount_type: DiscountType::FixedAmount,
        discount_value: amount,
        ..percentage_campaign(slug, prefix, dec!(1))
    }
}

pub fn free_shipping_campaign(slug: &str, prefix: &str) -> CreateCampaignInput {
    CreateCampaignInput {
        discount_type: DiscountType::FreeShipping,
        discount_value: Decimal::ZERO,
        ..percentage_campaign(slug, prefix, dec!(1))
    }
}
