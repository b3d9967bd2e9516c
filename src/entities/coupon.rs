use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One ledger entry per issued coupon: a user-held instance of a campaign,
/// tracking how many times that specific code has been redeemed. Rows are
/// retained for audit even after the entry becomes terminal.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    /// Redeemable code presented at checkout; unique across the system.
    #[sea_orm(unique)]
    pub code: String,
    /// 0 ≤ count ≤ campaign.max_usage_per_user at every commit point.
    pub current_usage_count: i32,
    pub is_active: bool,
    /// Entry-level expiration, independent of campaign.valid_until; the
    /// earlier of the two governs.
    pub expires_at: Option<DateTime<Utc>>,
    pub assigned_at: DateTime<Utc>,
    pub last_usage_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::campaign::Entity",
        from = "Column::CampaignId",
        to = "super::campaign::Column::Id"
    )]
    Campaign,
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaign.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Derived lifecycle state of a ledger entry. Purely a function of the entry
/// and its campaign; never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponState {
    IssuedUnused,
    PartiallyUsed,
    Exhausted,
    Expired,
    Deactivated,
}

impl Model {
    /// The instant after which this entry no longer redeems: the earlier of
    /// the entry expiry and the campaign's valid_until.
    pub fn effective_expiry(&self, campaign: &super::campaign::Model) -> DateTime<Utc> {
        match self.expires_at {
            Some(entry_expiry) => entry_expiry.min(campaign.valid_until),
            None => campaign.valid_until,
        }
    }

    pub fn state(&self, campaign: &super::campaign::Model, now: DateTime<Utc>) -> CouponState {
        if !self.is_active {
            return CouponState::Deactivated;
        }
        if now > self.effective_expiry(campaign) {
            return CouponState::Expired;
        }
        if self.current_usage_count >= campaign.max_usage_per_user {
            return CouponState::Exhausted;
        }
        if self.current_usage_count == 0 {
            CouponState::IssuedUnused
        } else {
            CouponState::PartiallyUsed
        }
    }
}
