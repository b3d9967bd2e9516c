use crate::{
    entities::{
        campaign::Entity as Campaign,
        coupon::{self, Entity as Coupon},
    },
    errors::{RedemptionError, ServiceError},
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Shape of every code this service issues: uppercase campaign prefix, a
/// dash, then an 8-character random suffix.
static COUPON_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{2,16}-[A-Z0-9]{8}$").expect("valid coupon code regex"));

const CODE_SUFFIX_LEN: usize = 8;
const COMPENSATION_ATTEMPTS: u32 = 5;
const COMPENSATION_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Per-user coupon issuance and usage tracking.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueCouponInput {
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    /// Entry-level expiration; the earlier of this and the campaign's
    /// valid_until governs redemption.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Issues a coupon for a campaign to a user.
    ///
    /// Fails with `DuplicateIssuance` when the campaign is unique-per-user
    /// and the user already holds an entry; the unique code index backstops
    /// the residual race between the check and the insert.
    #[instrument(skip(self))]
    pub async fn issue(&self, input: IssueCouponInput) -> Result<coupon::Model, ServiceError> {
        let campaign = Campaign::find_by_id(input.campaign_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Campaign {} not found", input.campaign_id))
            })?;

        if campaign.is_unique_per_user {
            let existing = Coupon::find()
                .filter(coupon::Column::CampaignId.eq(input.campaign_id))
                .filter(coupon::Column::UserId.eq(input.user_id))
                .one(&*self.db)
                .await?;

            if existing.is_some() {
                return Err(RedemptionError::DuplicateIssuance.into());
            }
        }

        let entry = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            campaign_id: Set(campaign.id),
            user_id: Set(input.user_id),
            code: Set(generate_code(&campaign.code_prefix)),
            current_usage_count: Set(0),
            is_active: Set(true),
            expires_at: Set(input.expires_at),
            assigned_at: Set(Utc::now()),
            last_usage_at: Set(None),
        };

        let entry = entry.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CouponIssued {
                coupon_id: entry.id,
                campaign_id: entry.campaign_id,
                user_id: entry.user_id,
            })
            .await;

        info!("Issued coupon {} for campaign {}", entry.code, campaign.slug);
        Ok(entry)
    }

    /// Resolves a presented code to its ledger entry. Input is normalized
    /// (trimmed, uppercased); codes that cannot have been issued by this
    /// service short-circuit without a database round trip.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<coupon::Model>, ServiceError> {
        let normalized = normalize_code(code);
        if !COUPON_CODE_RE.is_match(&normalized) {
            return Ok(None);
        }

        Coupon::find()
            .filter(coupon::Column::Code.eq(normalized))
            .one(&*self.db)
            .await
            .map_err(ServiceError::from)
    }

    pub async fn get_entry(&self, entry_id: Uuid) -> Result<coupon::Model, ServiceError> {
        Coupon::find_by_id(entry_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", entry_id)))
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<coupon::Model>, u64), ServiceError> {
        let paginator = Coupon::find()
            .filter(coupon::Column::UserId.eq(user_id))
            .order_by_desc(coupon::Column::AssignedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let entries = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((entries, total))
    }

    /// Per-entry administrative kill switch. The row is retained for audit.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, entry_id: Uuid) -> Result<coupon::Model, ServiceError> {
        let entry = self.get_entry(entry_id).await?;

        let mut active: coupon::ActiveModel = entry.into();
        active.is_active = Set(false);
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CouponDeactivated(updated.id))
            .await;

        Ok(updated)
    }

    /// Atomic compare-and-increment of the entry's usage count.
    ///
    /// Gated on `current_usage_count < max_usage_per_user` in the UPDATE
    /// filter itself, so two concurrent redemptions of the last slot can
    /// never both succeed. Returns `false` without mutating state when the
    /// cap was already taken.
    pub async fn increment_usage<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry_id: Uuid,
        max_usage_per_user: i32,
    ) -> Result<bool, ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::CurrentUsageCount,
                Expr::col(coupon::Column::CurrentUsageCount).add(1),
            )
            .col_expr(coupon::Column::LastUsageAt, Expr::value(Some(Utc::now())))
            .filter(coupon::Column::Id.eq(entry_id))
            .filter(coupon::Column::CurrentUsageCount.lt(max_usage_per_user))
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Saga rollback for the commit path: returns the usage slot claimed by
    /// `increment_usage` after the campaign-level increment lost the global
    /// cap race. Retried with backoff on transient store failure — leaving
    /// the entry incremented without an applied discount would strand the
    /// user's allowance.
    pub async fn decrement_usage_compensating(&self, entry_id: Uuid) -> Result<(), ServiceError> {
        let mut backoff = COMPENSATION_BACKOFF_BASE;
        let mut last_err: Option<ServiceError> = None;

        for attempt in 1..=COMPENSATION_ATTEMPTS {
            let result = Coupon::update_many()
                .col_expr(
                    coupon::Column::CurrentUsageCount,
                    Expr::col(coupon::Column::CurrentUsageCount).sub(1),
                )
                .filter(coupon::Column::Id.eq(entry_id))
                .filter(coupon::Column::CurrentUsageCount.gt(0))
                .exec(&*self.db)
                .await;

            match result {
                Ok(res) => {
                    if res.rows_affected == 0 {
                        warn!(
                            "Compensating decrement for coupon {} found usage count already 0",
                            entry_id
                        );
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Compensating decrement for coupon {} failed (attempt {}/{}): {}",
                        entry_id, attempt, COMPENSATION_ATTEMPTS, e
                    );
                    last_err = Some(e.into());
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }

        error!(
            "Compensating decrement for coupon {} exhausted retries; usage slot stranded",
            entry_id
        );
        Err(last_err.unwrap_or_else(|| {
            ServiceError::InternalError("compensation retries exhausted".to_string())
        }))
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn generate_code(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_SUFFIX_LEN)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();

    format!("{}-{}", prefix.to_ascii_uppercase(), suffix)
}
