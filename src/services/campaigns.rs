use crate::{
    entities::campaign::{self, DiscountType, EligibilityTag, Entity as Campaign},
    errors::{RedemptionError, ServiceError},
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Durable storage and retrieval of campaign definitions. Enforces the
/// schema-level invariants on create/update; the only other mutation it
/// performs is the conditional global-usage increment used by the
/// redemption commit path.
#[derive(Clone)]
pub struct CampaignService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCampaignInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub slug: String,
    #[validate(length(min = 2, max = 16))]
    pub code_prefix: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_discount_cap: Option<Decimal>,
    pub min_purchase_amount: Option<Decimal>,
    #[serde(default)]
    pub eligibility_tags: Vec<EligibilityTag>,
    #[serde(default)]
    pub applicable_category_ids: Vec<Uuid>,
    #[serde(default)]
    pub applicable_item_ids: Vec<Uuid>,
    pub max_usage_per_user: i32,
    pub max_global_usage: Option<i32>,
    #[serde(default)]
    pub is_unique_per_user: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

/// Administrative rule/limit changes. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateCampaignInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub discount_value: Option<Decimal>,
    pub max_discount_cap: Option<Decimal>,
    pub min_purchase_amount: Option<Decimal>,
    pub eligibility_tags: Option<Vec<EligibilityTag>>,
    pub applicable_category_ids: Option<Vec<Uuid>>,
    pub applicable_item_ids: Option<Vec<Uuid>>,
    pub max_usage_per_user: Option<i32>,
    pub max_global_usage: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl CampaignService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input))]
    pub async fn create_campaign(
        &self,
        input: CreateCampaignInput,
    ) -> Result<campaign::Model, ServiceError> {
        input.validate()?;
        validate_rule_fields(
            &input.discount_type,
            input.discount_value,
            input.max_discount_cap,
            input.min_purchase_amount,
            input.max_usage_per_user,
            input.max_global_usage,
            input.valid_from,
            input.valid_until,
        )?;

        let now = Utc::now();
        let campaign = campaign::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            slug: Set(input.slug),
            code_prefix: Set(input.code_prefix.to_ascii_uppercase()),
            description: Set(input.description),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            max_discount_cap: Set(input.max_discount_cap),
            min_purchase_amount: Set(input.min_purchase_amount),
            eligibility_tags: Set(serde_json::json!(input.eligibility_tags)),
            applicable_category_ids: Set(serde_json::json!(input.applicable_category_ids)),
            applicable_item_ids: Set(serde_json::json!(input.applicable_item_ids)),
            max_usage_per_user: Set(input.max_usage_per_user),
            max_global_usage: Set(input.max_global_usage),
            is_unique_per_user: Set(input.is_unique_per_user),
            global_usage_count: Set(0),
            valid_from: Set(input.valid_from),
            valid_until: Set(input.valid_until),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let campaign = campaign.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CampaignCreated(campaign.id))
            .await;

        info!("Created campaign {} ({})", campaign.slug, campaign.id);
        Ok(campaign)
    }

    pub async fn get_campaign(&self, campaign_id: Uuid) -> Result<campaign::Model, ServiceError> {
        Campaign::find_by_id(campaign_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Campaign {} not found", campaign_id)))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<campaign::Model, ServiceError> {
        Campaign::find()
            .filter(campaign::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Campaign '{}' not found", slug)))
    }

    pub async fn list_campaigns(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<campaign::Model>, u64), ServiceError> {
        let paginator = Campaign::find()
            .order_by_desc(campaign::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let campaigns = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((campaigns, total))
    }

    /// Applies administrative rule/limit changes, re-validating the merged
    /// campaign against the schema invariants before persisting.
    #[instrument(skip(self, input))]
    pub async fn update_campaign(
        &self,
        campaign_id: Uuid,
        input: UpdateCampaignInput,
    ) -> Result<campaign::Model, ServiceError> {
        let existing = self.get_campaign(campaign_id).await?;

        let discount_value = input.discount_value.unwrap_or(existing.discount_value);
        let max_discount_cap = input.max_discount_cap.or(existing.max_discount_cap);
        let min_purchase_amount = input.min_purchase_amount.or(existing.min_purchase_amount);
        let max_usage_per_user = input.max_usage_per_user.unwrap_or(existing.max_usage_per_user);
        let max_global_usage = input.max_global_usage.or(existing.max_global_usage);
        let valid_from = input.valid_from.unwrap_or(existing.valid_from);
        let valid_until = input.valid_until.unwrap_or(existing.valid_until);

        validate_rule_fields(
            &existing.discount_type,
            discount_value,
            max_discount_cap,
            min_purchase_amount,
            max_usage_per_user,
            max_global_usage,
            valid_from,
            valid_until,
        )?;

        let mut active: campaign::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(tags) = input.eligibility_tags {
            active.eligibility_tags = Set(serde_json::json!(tags));
        }
        if let Some(categories) = input.applicable_category_ids {
            active.applicable_category_ids = Set(serde_json::json!(categories));
        }
        if let Some(items) = input.applicable_item_ids {
            active.applicable_item_ids = Set(serde_json::json!(items));
        }
        active.discount_value = Set(discount_value);
        active.max_discount_cap = Set(max_discount_cap);
        active.min_purchase_amount = Set(min_purchase_amount);
        active.max_usage_per_user = Set(max_usage_per_user);
        active.max_global_usage = Set(max_global_usage);
        active.valid_from = Set(valid_from);
        active.valid_until = Set(valid_until);
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CampaignUpdated(updated.id))
            .await;

        Ok(updated)
    }

    /// Administrative kill switch. Campaigns are never deleted.
    #[instrument(skip(self))]
    pub async fn set_active(
        &self,
        campaign_id: Uuid,
        active: bool,
    ) -> Result<campaign::Model, ServiceError> {
        let existing = self.get_campaign(campaign_id).await?;

        let mut model: campaign::ActiveModel = existing.into();
        model.is_active = Set(active);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db).await?;

        let event = if active {
            Event::CampaignActivated(updated.id)
        } else {
            Event::CampaignDeactivated(updated.id)
        };
        self.event_sender.send_or_log(event).await;

        Ok(updated)
    }

    /// Atomically claims one slot of the campaign's global usage budget.
    ///
    /// A single conditional UPDATE gated on `global_usage_count <
    /// max_global_usage` (or the cap being unset): under concurrent
    /// redemptions of the last slot, exactly one caller observes a row
    /// update. Returns `false` when the cap was already reached — the
    /// counter is left untouched.
    pub async fn increment_global_usage<C: ConnectionTrait>(
        &self,
        conn: &C,
        campaign_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = Campaign::update_many()
            .col_expr(
                campaign::Column::GlobalUsageCount,
                Expr::col(campaign::Column::GlobalUsageCount).add(1),
            )
            .col_expr(campaign::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(campaign::Column::Id.eq(campaign_id))
            .filter(
                Condition::any()
                    .add(campaign::Column::MaxGlobalUsage.is_null())
                    .add(
                        Expr::col(campaign::Column::GlobalUsageCount)
                            .lt(Expr::col(campaign::Column::MaxGlobalUsage)),
                    ),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!("Campaign {} global usage cap reached", campaign_id);
            return Ok(false);
        }

        Ok(true)
    }
}

/// Schema-level invariants shared by create and update.
#[allow(clippy::too_many_arguments)]
fn validate_rule_fields(
    discount_type: &DiscountType,
    discount_value: Decimal,
    max_discount_cap: Option<Decimal>,
    min_purchase_amount: Option<Decimal>,
    max_usage_per_user: i32,
    max_global_usage: Option<i32>,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let invalid = |msg: String| {
        Err(ServiceError::Redemption(RedemptionError::InvalidCampaignSpec(msg)))
    };

    match discount_type {
        DiscountType::Percentage => {
            if discount_value <= Decimal::ZERO || discount_value > Decimal::from(100) {
                return invalid(format!(
                    "percentage discount must be in (0, 100], got {}",
                    discount_value
                ));
            }
        }
        DiscountType::FixedAmount => {
            if discount_value <= Decimal::ZERO {
                return invalid(format!(
                    "fixed discount amount must be positive, got {}",
                    discount_value
                ));
            }
        }
        // Discount value is ignored for free shipping.
        DiscountType::FreeShipping => {}
    }

    if let Some(cap) = max_discount_cap {
        if cap <= Decimal::ZERO {
            return invalid(format!("max discount cap must be positive, got {}", cap));
        }
    }

    if let Some(min) = min_purchase_amount {
        if min < Decimal::ZERO {
            return invalid(format!(
                "minimum purchase amount must be non-negative, got {}",
                min
            ));
        }
    }

    if max_usage_per_user < 1 {
        return invalid(format!(
            "max usage per user must be at least 1, got {}",
            max_usage_per_user
        ));
    }

    if let Some(max) = max_global_usage {
        if max < 1 {
            return invalid(format!("max global usage must be at least 1, got {}", max));
        }
    }

    if valid_from > valid_until {
        return invalid(format!(
            "valid_from {} is after valid_until {}",
            valid_from, valid_until
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now, now + Duration::days(30))
    }

    #[test]
    fn percentage_value_must_be_within_range() {
        let (from, until) = window();
        assert!(validate_rule_fields(
            &DiscountType::Percentage,
            dec!(25),
            None,
            None,
            1,
            None,
            from,
            until
        )
        .is_ok());

        for bad in [dec!(0), dec!(-5), dec!(101)] {
            let err = validate_rule_fields(
                &DiscountType::Percentage,
                bad,
                None,
                None,
                1,
                None,
                from,
                until,
            )
            .unwrap_err();
            assert!(matches!(
                err,
                ServiceError::Redemption(RedemptionError::InvalidCampaignSpec(_))
            ));
        }
    }

    #[test]
    fn fixed_amount_must_be_positive() {
        let (from, until) = window();
        assert!(validate_rule_fields(
            &DiscountType::FixedAmount,
            dec!(10),
            None,
            None,
            1,
            None,
            from,
            until
        )
        .is_ok());

        assert!(validate_rule_fields(
            &DiscountType::FixedAmount,
            dec!(0),
            None,
            None,
            1,
            None,
            from,
            until
        )
        .is_err());
    }

    #[test]
    fn window_must_be_ordered() {
        let now = Utc::now();
        let err = validate_rule_fields(
            &DiscountType::FreeShipping,
            Decimal::ZERO,
            None,
            None,
            1,
            None,
            now,
            now - Duration::days(1),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Redemption(RedemptionError::InvalidCampaignSpec(_))
        ));
    }

    #[test]
    fn usage_limits_must_be_at_least_one() {
        let (from, until) = window();
        assert!(validate_rule_fields(
            &DiscountType::Percentage,
            dec!(10),
            None,
            None,
            0,
            None,
            from,
            until
        )
        .is_err());

        assert!(validate_rule_fields(
            &DiscountType::Percentage,
            dec!(10),
            None,
            None,
            1,
            Some(0),
            from,
            until
        )
        .is_err());
    }
}
