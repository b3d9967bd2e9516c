use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum DiscountType {
    #[sea_orm(string_value = "Percentage")]
    Percentage,
    #[sea_orm(string_value = "FixedAmount")]
    FixedAmount,
    #[sea_orm(string_value = "FreeShipping")]
    FreeShipping,
}

/// Closed set of eligibility predicates evaluated against the caller-supplied
/// profile snapshot. Not a free-form string: the engine never does external
/// lookups to decide eligibility.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EligibilityTag {
    NewUser,
    SpecificUserGroup,
    None,
}

/// A discount campaign: the reusable definition of a promotion, its rules,
/// limits, and validity window. Campaigns are never physically deleted —
/// `is_active` is the administrative kill switch.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "campaigns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    /// Prefix used to generate and recognize individual coupon codes.
    pub code_prefix: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Percentage 0-100 or currency amount; ignored for FreeShipping.
    pub discount_value: Decimal,
    /// Upper bound on the computed discount; Percentage campaigns only.
    pub max_discount_cap: Option<Decimal>,
    pub min_purchase_amount: Option<Decimal>,
    /// JSON array of EligibilityTag values.
    pub eligibility_tags: Json,
    /// JSON array of category UUIDs; empty = applies to the whole cart.
    pub applicable_category_ids: Json,
    /// JSON array of item UUIDs; empty = applies to the whole cart.
    pub applicable_item_ids: Json,
    pub max_usage_per_user: i32,
    /// None = unlimited.
    pub max_global_usage: Option<i32>,
    pub is_unique_per_user: bool,
    /// Monotone; never exceeds max_global_usage. Mutated only through the
    /// conditional increment in CampaignService.
    pub global_usage_count: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon::Entity")]
    Coupon,
}

impl Related<super::coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Coupon.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn eligibility_tags(&self) -> Vec<EligibilityTag> {
        serde_json::from_value(self.eligibility_tags.clone()).unwrap_or_default()
    }

    pub fn applicable_category_ids(&self) -> Vec<Uuid> {
        serde_json::from_value(self.applicable_category_ids.clone()).unwrap_or_default()
    }

    pub fn applicable_item_ids(&self) -> Vec<Uuid> {
        serde_json::from_value(self.applicable_item_ids.clone()).unwrap_or_default()
    }

    /// True when `now` falls inside the campaign's inclusive validity window.
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_from && now <= self.valid_until
    }
}
