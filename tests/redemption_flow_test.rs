mod common;

use chrono::{Duration, Utc};
use common::{fixed_amount_campaign, free_shipping_campaign, percentage_campaign, setup_services};
use promo_api::{
    errors::{RedemptionError, ServiceError},
    services::{coupons::IssueCouponInput, redemption::CartSnapshot},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn cart(subtotal: Decimal) -> CartSnapshot {
    CartSnapshot {
        subtotal,
        items: vec![],
        user_profile_flags: vec![],
    }
}

fn redemption_kind(err: ServiceError) -> RedemptionError {
    match err {
        ServiceError::Redemption(kind) => kind,
        other => panic!("expected a redemption error, got {:?}", other),
    }
}

// Campaign SUMMER25: 25% off, $100 minimum, 2 uses per user, 500 global.
// A $200 cart discounts $50.00 and advances both counters; the third apply
// after two successful uses fails with the per-user limit.
#[tokio::test]
async fn summer25_lifecycle() {
    let (_db, services) = setup_services().await;

    let mut input = percentage_campaign("summer25", "SUMMER25", dec!(25));
    input.min_purchase_amount = Some(dec!(100));
    input.max_usage_per_user = 2;
    input.max_global_usage = Some(500);
    let campaign = services.campaigns.create_campaign(input).await.unwrap();

    let user_id = Uuid::new_v4();
    let entry = services
        .coupons
        .issue(IssueCouponInput {
            campaign_id: campaign.id,
            user_id,
            expires_at: None,
        })
        .await
        .unwrap();
    assert_eq!(entry.current_usage_count, 0);

    let outcome = services
        .redemption
        .apply_coupon(&entry.code, user_id, &cart(dec!(200)))
        .await
        .unwrap();
    assert_eq!(outcome.discount_amount, dec!(50.00));
    assert!(!outcome.free_shipping);
    assert_eq!(outcome.current_usage_count, 1);
    assert_eq!(outcome.global_usage_count, 1);

    let outcome = services
        .redemption
        .apply_coupon(&entry.code, user_id, &cart(dec!(200)))
        .await
        .unwrap();
    assert_eq!(outcome.current_usage_count, 2);
    assert_eq!(outcome.global_usage_count, 2);

    let err = services
        .redemption
        .apply_coupon(&entry.code, user_id, &cart(dec!(200)))
        .await
        .unwrap_err();
    assert_eq!(redemption_kind(err), RedemptionError::PerUserLimitReached);

    // Ledger state is unchanged by the failed attempt
    let entry = services.coupons.get_entry(entry.id).await.unwrap();
    assert_eq!(entry.current_usage_count, 2);
}

// Campaign VIP50: $50 off with a $200 floor. A $150 cart fails the minimum
// purchase check and mutates nothing.
#[tokio::test]
async fn vip50_below_minimum_purchase() {
    let (_db, services) = setup_services().await;

    let mut input = fixed_amount_campaign("vip50", "VIP50", dec!(50));
    input.min_purchase_amount = Some(dec!(200));
    let campaign = services.campaigns.create_campaign(input).await.unwrap();

    let user_id = Uuid::new_v4();
    let entry = services
        .coupons
        .issue(IssueCouponInput {
            campaign_id: campaign.id,
            user_id,
            expires_at: None,
        })
        .await
        .unwrap();

    let err = services
        .redemption
        .apply_coupon(&entry.code, user_id, &cart(dec!(150)))
        .await
        .unwrap_err();
    assert_eq!(
        redemption_kind(err),
        RedemptionError::BelowMinimumPurchase {
            required: dec!(200),
            subtotal: dec!(150),
        }
    );

    let entry = services.coupons.get_entry(entry.id).await.unwrap();
    assert_eq!(entry.current_usage_count, 0);
    let campaign = services.campaigns.get_campaign(campaign.id).await.unwrap();
    assert_eq!(campaign.global_usage_count, 0);
}

#[tokio::test]
async fn preview_is_idempotent_and_side_effect_free() {
    let (_db, services) = setup_services().await;

    let campaign = services
        .campaigns
        .create_campaign(percentage_campaign("preview", "PREVIEW", dec!(10)))
        .await
        .unwrap();

    let user_id = Uuid::new_v4();
    let entry = services
        .coupons
        .issue(IssueCouponInput {
            campaign_id: campaign.id,
            user_id,
            expires_at: None,
        })
        .await
        .unwrap();

    for _ in 0..3 {
        let outcome = services
            .redemption
            .preview_discount(&entry.code, user_id, &cart(dec!(80)))
            .await
            .unwrap();
        assert_eq!(outcome.discount_amount, dec!(8.00));
        assert_eq!(outcome.current_usage_count, 0);
        assert_eq!(outcome.global_usage_count, 0);
    }

    let entry = services.coupons.get_entry(entry.id).await.unwrap();
    assert_eq!(entry.current_usage_count, 0);
    let campaign = services.campaigns.get_campaign(campaign.id).await.unwrap();
    assert_eq!(campaign.global_usage_count, 0);

    // The commit path still works after any number of previews
    let outcome = services
        .redemption
        .apply_coupon(&entry.code, user_id, &cart(dec!(80)))
        .await
        .unwrap();
    assert_eq!(outcome.current_usage_count, 1);
}

// An unused coupon on a campaign whose window already closed is still dead.
#[tokio::test]
async fn expired_window_rejects_unused_coupon() {
    let (_db, services) = setup_services().await;

    let now = Utc::now();
    let mut input = percentage_campaign("lapsed", "LAPSED", dec!(20));
    input.valid_from = now - Duration::days(10);
    input.valid_until = now - Duration::days(1);
    let campaign = services.campaigns.create_campaign(input).await.unwrap();

    let user_id = Uuid::new_v4();
    let entry = services
        .coupons
        .issue(IssueCouponInput {
            campaign_id: campaign.id,
            user_id,
            expires_at: None,
        })
        .await
        .unwrap();
    assert_eq!(entry.current_usage_count, 0);

    let err = services
        .redemption
        .apply_coupon(&entry.code, user_id, &cart(dec!(100)))
        .await
        .unwrap_err();
    assert_eq!(redemption_kind(err), RedemptionError::CouponExpiredOrInactive);
}

#[tokio::test]
async fn entry_expiry_beats_open_campaign_window() {
    let (_db, services) = setup_services().await;

    let campaign = services
        .campaigns
        .create_campaign(percentage_campaign("short-lived", "SHORT", dec!(20)))
        .await
        .unwrap();

    let user_id = Uuid::new_v4();
    let entry = services
        .coupons
        .issue(IssueCouponInput {
            campaign_id: campaign.id,
            user_id,
            expires_at: Some(Utc::now() - Duration::hours(1)),
        })
        .await
        .unwrap();

    let err = services
        .redemption
        .apply_coupon(&entry.code, user_id, &cart(dec!(100)))
        .await
        .unwrap_err();
    assert_eq!(redemption_kind(err), RedemptionError::CouponExpiredOrInactive);
}

#[tokio::test]
async fn free_shipping_flags_without_discounting() {
    let (_db, services) = setup_services().await;

    let campaign = services
        .campaigns
        .create_campaign(free_shipping_campaign("ship-free", "SHIPFREE"))
        .await
        .unwrap();

    let user_id = Uuid::new_v4();
    let entry = services
        .coupons
        .issue(IssueCouponInput {
            campaign_id: campaign.id,
            user_id,
            expires_at: None,
        })
        .await
        .unwrap();

    let outcome = services
        .redemption
        .apply_coupon(&entry.code, user_id, &cart(dec!(42)))
        .await
        .unwrap();
    assert_eq!(outcome.discount_amount, Decimal::ZERO);
    assert!(outcome.free_shipping);
    assert_eq!(outcome.current_usage_count, 1);
}

// A $10 fixed discount on a $7.50 cart discounts exactly $7.50.
#[tokio::test]
async fn fixed_discount_clamps_to_subtotal() {
    let (_db, services) = setup_services().await;

    let campaign = services
        .campaigns
        .create_campaign(fixed_amount_campaign("tenner", "TENNER", dec!(10)))
        .await
        .unwrap();

    let user_id = Uuid::new_v4();
    let entry = services
        .coupons
        .issue(IssueCouponInput {
            campaign_id: campaign.id,
            user_id,
            expires_at: None,
        })
        .await
        .unwrap();

    let outcome = services
        .redemption
        .apply_coupon(&entry.code, user_id, &cart(dec!(7.50)))
        .await
        .unwrap();
    assert_eq!(outcome.discount_amount, dec!(7.50));
}

#[tokio::test]
async fn unknown_code_is_coupon_not_found() {
    let (_db, services) = setup_services().await;

    let err = services
        .redemption
        .apply_coupon("NOSUCH-DEADBEEF", Uuid::new_v4(), &cart(dec!(50)))
        .await
        .unwrap_err();
    assert_eq!(redemption_kind(err), RedemptionError::CouponNotFound);
}

// Another user's code does not resolve; the holder's ledger stays intact.
#[tokio::test]
async fn someone_elses_code_is_coupon_not_found() {
    let (_db, services) = setup_services().await;

    let campaign = services
        .campaigns
        .create_campaign(percentage_campaign("personal", "MINE", dec!(10)))
        .await
        .unwrap();

    let holder = Uuid::new_v4();
    let entry = services
        .coupons
        .issue(IssueCouponInput {
            campaign_id: campaign.id,
            user_id: holder,
            expires_at: None,
        })
        .await
        .unwrap();

    let err = services
        .redemption
        .apply_coupon(&entry.code, Uuid::new_v4(), &cart(dec!(100)))
        .await
        .unwrap_err();
    assert_eq!(redemption_kind(err), RedemptionError::CouponNotFound);

    let entry = services.coupons.get_entry(entry.id).await.unwrap();
    assert_eq!(entry.current_usage_count, 0);
}
