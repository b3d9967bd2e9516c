use crate::{
    entities::{
        campaign::{self, DiscountType, EligibilityTag, Entity as Campaign},
        coupon,
    },
    errors::{RedemptionError, ServiceError},
    events::{Event, EventSender},
    services::{campaigns::CampaignService, coupons::CouponService},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Cart line reference supplied by the cart/order integration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemRef {
    pub item_id: Uuid,
    pub category_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Read-only snapshot of the cart a coupon is being applied to. The caller
/// precomputes the user-profile eligibility flags; the engine never looks a
/// user up.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartSnapshot {
    pub subtotal: Decimal,
    pub items: Vec<CartItemRef>,
    pub user_profile_flags: Vec<EligibilityTag>,
}

/// Successful redemption (or preview) result. Ephemeral — returned to the
/// caller to persist against its own order, never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RedemptionOutcome {
    pub coupon_id: Uuid,
    pub campaign_id: Uuid,
    /// Monetary discount, rounded half-up to the currency minor unit.
    /// Zero for free-shipping campaigns.
    pub discount_amount: Decimal,
    /// Signals the cart to zero its shipping cost.
    pub free_shipping: bool,
    pub current_usage_count: i32,
    pub global_usage_count: i32,
}

/// The single entry point deciding whether a coupon may discount a cart, by
/// how much, and committing usage atomically across the ledger entry and the
/// campaign counter.
#[derive(Clone)]
pub struct RedemptionService {
    db: Arc<DatabaseConnection>,
    campaigns: Arc<CampaignService>,
    coupons: Arc<CouponService>,
    event_sender: Arc<EventSender>,
}

impl RedemptionService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        campaigns: Arc<CampaignService>,
        coupons: Arc<CouponService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            campaigns,
            coupons,
            event_sender,
        }
    }

    /// Validates and prices a coupon against a cart without committing
    /// usage. Side-effect-free: intended for cart-page display, callable any
    /// number of times.
    #[instrument(skip(self, cart), fields(code = %coupon_code))]
    pub async fn preview_discount(
        &self,
        coupon_code: &str,
        user_id: Uuid,
        cart: &CartSnapshot,
    ) -> Result<RedemptionOutcome, ServiceError> {
        let (entry, campaign) = self.resolve(coupon_code, user_id).await?;

        let now = Utc::now();
        validate_redemption(&entry, &campaign, cart, now)?;
        let (discount_amount, free_shipping) = compute_discount(&campaign, cart.subtotal);

        Ok(RedemptionOutcome {
            coupon_id: entry.id,
            campaign_id: campaign.id,
            discount_amount,
            free_shipping,
            current_usage_count: entry.current_usage_count,
            global_usage_count: campaign.global_usage_count,
        })
    }

    /// Applies a coupon to a cart: full validation, discount computation,
    /// then the atomic usage commit.
    ///
    /// Validation is read-only and freely retryable. The commit claims the
    /// ledger-entry slot first and the campaign slot second, both as
    /// conditional increments; losing the entry race returns
    /// `ConcurrentLimitExceeded`, losing the campaign race rolls the entry
    /// back and returns `GlobalLimitReached`. The caller must not subtract
    /// the discount unless this returns Ok.
    #[instrument(skip(self, cart), fields(code = %coupon_code))]
    pub async fn apply_coupon(
        &self,
        coupon_code: &str,
        user_id: Uuid,
        cart: &CartSnapshot,
    ) -> Result<RedemptionOutcome, ServiceError> {
        let (entry, campaign) = self.resolve(coupon_code, user_id).await?;

        let now = Utc::now();
        validate_redemption(&entry, &campaign, cart, now)?;
        let (discount_amount, free_shipping) = compute_discount(&campaign, cart.subtotal);

        // Commit phase. Two conditional single-row updates; the entry
        // increment goes first so the campaign cap loss can be compensated.
        let claimed = self
            .coupons
            .increment_usage(&*self.db, entry.id, campaign.max_usage_per_user)
            .await?;
        if !claimed {
            warn!(
                "Coupon {} lost the per-user slot race at commit time",
                entry.code
            );
            return Err(RedemptionError::ConcurrentLimitExceeded.into());
        }

        let global_claimed = self
            .campaigns
            .increment_global_usage(&*self.db, campaign.id)
            .await;

        match global_claimed {
            Ok(true) => {}
            Ok(false) => {
                self.coupons.decrement_usage_compensating(entry.id).await?;
                return Err(RedemptionError::GlobalLimitReached.into());
            }
            Err(e) => {
                // The campaign counter was never incremented; roll the entry
                // back before surfacing the store failure.
                self.coupons.decrement_usage_compensating(entry.id).await?;
                return Err(e);
            }
        }

        // Read back post-commit counters for the caller to persist.
        let committed_entry = self.coupons.get_entry(entry.id).await?;
        let committed_campaign = self.campaigns.get_campaign(campaign.id).await?;

        self.event_sender
            .send_or_log(Event::CouponRedeemed {
                coupon_id: entry.id,
                campaign_id: campaign.id,
                user_id,
                discount_amount,
                free_shipping,
            })
            .await;

        info!(
            "Redeemed coupon {} for {} off (free_shipping={})",
            entry.code, discount_amount, free_shipping
        );

        Ok(RedemptionOutcome {
            coupon_id: entry.id,
            campaign_id: campaign.id,
            discount_amount,
            free_shipping,
            current_usage_count: committed_entry.current_usage_count,
            global_usage_count: committed_campaign.global_usage_count,
        })
    }

    async fn resolve(
        &self,
        coupon_code: &str,
        user_id: Uuid,
    ) -> Result<(coupon::Model, campaign::Model), ServiceError> {
        let entry = self
            .coupons
            .find_by_code(coupon_code)
            .await?
            // A code held by a different user resolves as not-found rather
            // than leaking that the code exists.
            .filter(|entry| entry.user_id == user_id)
            .ok_or(RedemptionError::CouponNotFound)?;

        let campaign = Campaign::find_by_id(entry.campaign_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                // A ledger entry always references an existing campaign;
                // campaigns are deactivated, never deleted.
                ServiceError::InternalError(format!(
                    "coupon {} references missing campaign {}",
                    entry.id, entry.campaign_id
                ))
            })?;

        Ok((entry, campaign))
    }
}

/// Ordered eligibility checks (validation steps after code resolution). The
/// first failing check short-circuits with its specific error; no state is
/// touched.
pub fn validate_redemption(
    entry: &coupon::Model,
    campaign: &campaign::Model,
    cart: &CartSnapshot,
    now: DateTime<Utc>,
) -> Result<(), RedemptionError> {
    // Entry liveness and the combined time window: the earlier of the entry
    // expiry and campaign valid_until governs.
    if !entry.is_active
        || now < campaign.valid_from
        || now > entry.effective_expiry(campaign)
    {
        return Err(RedemptionError::CouponExpiredOrInactive);
    }

    if !campaign.is_active {
        return Err(RedemptionError::CampaignInactive);
    }

    if let Some(min) = campaign.min_purchase_amount {
        if cart.subtotal < min {
            return Err(RedemptionError::BelowMinimumPurchase {
                required: min,
                subtotal: cart.subtotal,
            });
        }
    }

    check_item_eligibility(campaign, cart)?;
    check_user_eligibility(campaign, cart)?;

    if entry.current_usage_count >= campaign.max_usage_per_user {
        return Err(RedemptionError::PerUserLimitReached);
    }

    if let Some(max_global) = campaign.max_global_usage {
        if campaign.global_usage_count >= max_global {
            return Err(RedemptionError::GlobalLimitReached);
        }
    }

    Ok(())
}

/// Empty restriction sets mean the campaign applies to the whole cart;
/// otherwise at least one cart line must fall in the restricted sets.
fn check_item_eligibility(
    campaign: &campaign::Model,
    cart: &CartSnapshot,
) -> Result<(), RedemptionError> {
    let item_ids = campaign.applicable_item_ids();
    let category_ids = campaign.applicable_category_ids();

    if item_ids.is_empty() && category_ids.is_empty() {
        return Ok(());
    }

    let any_eligible = cart.items.iter().any(|line| {
        item_ids.contains(&line.item_id)
            || line
                .category_id
                .map_or(false, |category| category_ids.contains(&category))
    });

    if any_eligible {
        Ok(())
    } else {
        Err(RedemptionError::ItemsNotEligible)
    }
}

/// Every predicate the campaign carries (other than the explicit None tag)
/// must be present in the caller-supplied profile flags. Pure: no lookups.
fn check_user_eligibility(
    campaign: &campaign::Model,
    cart: &CartSnapshot,
) -> Result<(), RedemptionError> {
    for tag in campaign.eligibility_tags() {
        if tag == EligibilityTag::None {
            continue;
        }
        if !cart.user_profile_flags.contains(&tag) {
            return Err(RedemptionError::UserNotEligible);
        }
    }

    Ok(())
}

/// Prices a campaign against a cart subtotal. Returns the monetary discount
/// (rounded half-up to 2 decimal places) and the free-shipping flag.
pub fn compute_discount(campaign: &campaign::Model, subtotal: Decimal) -> (Decimal, bool) {
    let raw = match campaign.discount_type {
        DiscountType::Percentage => {
            let raw = subtotal * campaign.discount_value / Decimal::from(100);
            match campaign.max_discount_cap {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        // Never discount below a zero cart total.
        DiscountType::FixedAmount => campaign.discount_value.min(subtotal),
        DiscountType::FreeShipping => return (Decimal::ZERO, true),
    };

    let rounded = raw
        .max(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    (rounded, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn test_campaign(discount_type: DiscountType, discount_value: Decimal) -> campaign::Model {
        let now = Utc::now();
        campaign::Model {
            id: Uuid::new_v4(),
            name: "Test Campaign".into(),
            slug: "test-campaign".into(),
            code_prefix: "TEST".into(),
            description: None,
            discount_type,
            discount_value,
            max_discount_cap: None,
            min_purchase_amount: None,
            eligibility_tags: serde_json::json!([]),
            applicable_category_ids: serde_json::json!([]),
            applicable_item_ids: serde_json::json!([]),
            max_usage_per_user: 2,
            max_global_usage: Some(500),
            is_unique_per_user: false,
            global_usage_count: 0,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn test_entry(campaign: &campaign::Model) -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            campaign_id: campaign.id,
            user_id: Uuid::new_v4(),
            code: "TEST-A1B2C3D4".into(),
            current_usage_count: 0,
            is_active: true,
            expires_at: None,
            assigned_at: Utc::now(),
            last_usage_at: None,
        }
    }

    fn cart(subtotal: Decimal) -> CartSnapshot {
        CartSnapshot {
            subtotal,
            items: vec![],
            user_profile_flags: vec![],
        }
    }

    #[test]
    fn percentage_discount_respects_cap() {
        // 20% of $150 = $30, capped at $25
        let mut campaign = test_campaign(DiscountType::Percentage, dec!(20));
        campaign.max_discount_cap = Some(dec!(25));

        let (discount, free_shipping) = compute_discount(&campaign, dec!(150));
        assert_eq!(discount, dec!(25.00));
        assert!(!free_shipping);
    }

    #[test]
    fn percentage_discount_rounds_half_up() {
        // 12.5% of $9.99 = $1.24875 -> $1.25
        let campaign = test_campaign(DiscountType::Percentage, dec!(12.5));
        let (discount, _) = compute_discount(&campaign, dec!(9.99));
        assert_eq!(discount, dec!(1.25));

        // 10% of $0.05 = $0.005 -> $0.01
        let campaign = test_campaign(DiscountType::Percentage, dec!(10));
        let (discount, _) = compute_discount(&campaign, dec!(0.05));
        assert_eq!(discount, dec!(0.01));
    }

    #[test]
    fn fixed_amount_never_exceeds_subtotal() {
        let campaign = test_campaign(DiscountType::FixedAmount, dec!(10));
        let (discount, _) = compute_discount(&campaign, dec!(7.50));
        assert_eq!(discount, dec!(7.50));

        let (discount, _) = compute_discount(&campaign, dec!(100));
        assert_eq!(discount, dec!(10.00));
    }

    #[test]
    fn free_shipping_discounts_nothing_and_sets_flag() {
        let campaign = test_campaign(DiscountType::FreeShipping, Decimal::ZERO);
        let (discount, free_shipping) = compute_discount(&campaign, dec!(42));
        assert_eq!(discount, Decimal::ZERO);
        assert!(free_shipping);
    }

    #[test]
    fn discount_is_deterministic() {
        let mut campaign = test_campaign(DiscountType::Percentage, dec!(20));
        campaign.max_discount_cap = Some(dec!(25));
        let first = compute_discount(&campaign, dec!(150));
        let second = compute_discount(&campaign, dec!(150));
        assert_eq!(first, second);
    }

    #[test]
    fn expired_window_fails_even_with_zero_usage() {
        let mut campaign = test_campaign(DiscountType::Percentage, dec!(10));
        campaign.valid_until = Utc::now() - Duration::days(1);
        let entry = test_entry(&campaign);
        assert_eq!(entry.current_usage_count, 0);

        let err = validate_redemption(&entry, &campaign, &cart(dec!(100)), Utc::now()).unwrap_err();
        assert_eq!(err, RedemptionError::CouponExpiredOrInactive);
    }

    #[test]
    fn entry_expiry_earlier_than_campaign_window_governs() {
        let campaign = test_campaign(DiscountType::Percentage, dec!(10));
        let mut entry = test_entry(&campaign);
        entry.expires_at = Some(Utc::now() - Duration::hours(1));

        let err = validate_redemption(&entry, &campaign, &cart(dec!(100)), Utc::now()).unwrap_err();
        assert_eq!(err, RedemptionError::CouponExpiredOrInactive);
    }

    #[test]
    fn not_yet_started_campaign_rejects() {
        let mut campaign = test_campaign(DiscountType::Percentage, dec!(10));
        campaign.valid_from = Utc::now() + Duration::days(1);
        campaign.valid_until = Utc::now() + Duration::days(30);
        let entry = test_entry(&campaign);

        let err = validate_redemption(&entry, &campaign, &cart(dec!(100)), Utc::now()).unwrap_err();
        assert_eq!(err, RedemptionError::CouponExpiredOrInactive);
    }

    #[test]
    fn inactive_campaign_rejects_after_window_check() {
        let mut campaign = test_campaign(DiscountType::Percentage, dec!(10));
        campaign.is_active = false;
        let entry = test_entry(&campaign);

        let err = validate_redemption(&entry, &campaign, &cart(dec!(100)), Utc::now()).unwrap_err();
        assert_eq!(err, RedemptionError::CampaignInactive);
    }

    #[test]
    fn below_minimum_purchase_reports_amounts() {
        let mut campaign = test_campaign(DiscountType::FixedAmount, dec!(50));
        campaign.min_purchase_amount = Some(dec!(200));
        let entry = test_entry(&campaign);

        let err = validate_redemption(&entry, &campaign, &cart(dec!(150)), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            RedemptionError::BelowMinimumPurchase {
                required: dec!(200),
                subtotal: dec!(150)
            }
        );
    }

    #[test]
    fn restricted_campaign_requires_intersecting_cart() {
        let mut campaign = test_campaign(DiscountType::Percentage, dec!(10));
        let eligible_category = Uuid::new_v4();
        campaign.applicable_category_ids = serde_json::json!([eligible_category]);
        let entry = test_entry(&campaign);

        let mut snapshot = cart(dec!(100));
        snapshot.items = vec![CartItemRef {
            item_id: Uuid::new_v4(),
            category_id: Some(Uuid::new_v4()),
            quantity: 1,
            unit_price: dec!(100),
        }];
        let err = validate_redemption(&entry, &campaign, &snapshot, Utc::now()).unwrap_err();
        assert_eq!(err, RedemptionError::ItemsNotEligible);

        snapshot.items[0].category_id = Some(eligible_category);
        assert!(validate_redemption(&entry, &campaign, &snapshot, Utc::now()).is_ok());
    }

    #[test]
    fn unrestricted_campaign_applies_to_any_cart() {
        let campaign = test_campaign(DiscountType::Percentage, dec!(10));
        let entry = test_entry(&campaign);
        assert!(validate_redemption(&entry, &campaign, &cart(dec!(100)), Utc::now()).is_ok());
    }

    #[test]
    fn eligibility_tags_check_caller_supplied_flags() {
        let mut campaign = test_campaign(DiscountType::Percentage, dec!(10));
        campaign.eligibility_tags = serde_json::json!([EligibilityTag::NewUser]);
        let entry = test_entry(&campaign);

        let mut snapshot = cart(dec!(100));
        let err = validate_redemption(&entry, &campaign, &snapshot, Utc::now()).unwrap_err();
        assert_eq!(err, RedemptionError::UserNotEligible);

        snapshot.user_profile_flags = vec![EligibilityTag::NewUser];
        assert!(validate_redemption(&entry, &campaign, &snapshot, Utc::now()).is_ok());
    }

    #[test]
    fn none_tag_gates_nothing() {
        let mut campaign = test_campaign(DiscountType::Percentage, dec!(10));
        campaign.eligibility_tags = serde_json::json!([EligibilityTag::None]);
        let entry = test_entry(&campaign);

        assert!(validate_redemption(&entry, &campaign, &cart(dec!(100)), Utc::now()).is_ok());
    }

    #[test]
    fn per_user_limit_blocks_exhausted_entry() {
        let campaign = test_campaign(DiscountType::Percentage, dec!(10));
        let mut entry = test_entry(&campaign);
        entry.current_usage_count = campaign.max_usage_per_user;

        let err = validate_redemption(&entry, &campaign, &cart(dec!(100)), Utc::now()).unwrap_err();
        assert_eq!(err, RedemptionError::PerUserLimitReached);
    }

    #[test]
    fn global_limit_blocks_exhausted_campaign() {
        let mut campaign = test_campaign(DiscountType::Percentage, dec!(10));
        campaign.max_global_usage = Some(5);
        campaign.global_usage_count = 5;
        let entry = test_entry(&campaign);

        let err = validate_redemption(&entry, &campaign, &cart(dec!(100)), Utc::now()).unwrap_err();
        assert_eq!(err, RedemptionError::GlobalLimitReached);
    }
}
