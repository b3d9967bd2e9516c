pub mod campaigns;
pub mod common;
pub mod coupons;
pub mod redemptions;

use crate::db::DbPool;
use crate::events::EventSender;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub campaigns: Arc<crate::services::campaigns::CampaignService>,
    pub coupons: Arc<crate::services::coupons::CouponService>,
    pub redemption: Arc<crate::services::redemption::RedemptionService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        let campaigns = Arc::new(crate::services::campaigns::CampaignService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let coupons = Arc::new(crate::services::coupons::CouponService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let redemption = Arc::new(crate::services::redemption::RedemptionService::new(
            db_pool,
            campaigns.clone(),
            coupons.clone(),
            event_sender,
        ));

        Self {
            campaigns,
            coupons,
            redemption,
        }
    }
}
