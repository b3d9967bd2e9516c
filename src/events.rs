use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events emitted by the campaign, coupon, and redemption services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CampaignCreated(Uuid),
    CampaignUpdated(Uuid),
    CampaignActivated(Uuid),
    CampaignDeactivated(Uuid),
    CouponIssued {
        coupon_id: Uuid,
        campaign_id: Uuid,
        user_id: Uuid,
    },
    CouponDeactivated(Uuid),
    CouponRedeemed {
        coupon_id: Uuid,
        campaign_id: Uuid,
        user_id: Uuid,
        discount_amount: Decimal,
        free_shipping: bool,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the receiver is gone.
    /// Event delivery is best-effort; business state is already committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!("Dropped event {:?}: {}", event, e);
        }
    }
}

/// Event processing loop. Consumes events until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CampaignCreated(id) => info!(campaign_id = %id, "Campaign created"),
            Event::CampaignUpdated(id) => info!(campaign_id = %id, "Campaign updated"),
            Event::CampaignActivated(id) => info!(campaign_id = %id, "Campaign activated"),
            Event::CampaignDeactivated(id) => info!(campaign_id = %id, "Campaign deactivated"),
            Event::CouponIssued {
                coupon_id,
                campaign_id,
                user_id,
            } => info!(
                coupon_id = %coupon_id,
                campaign_id = %campaign_id,
                user_id = %user_id,
                "Coupon issued"
            ),
            Event::CouponDeactivated(id) => info!(coupon_id = %id, "Coupon deactivated"),
            Event::CouponRedeemed {
                coupon_id,
                campaign_id,
                user_id,
                discount_amount,
                free_shipping,
            } => info!(
                coupon_id = %coupon_id,
                campaign_id = %campaign_id,
                user_id = %user_id,
                discount_amount = %discount_amount,
                free_shipping = free_shipping,
                "Coupon redeemed"
            ),
        }

        // Downstream integrations (notification fan-out, analytics) hook in
        // here; a failed hook must not fail the loop.
        if let Err(e) = dispatch(&event).await {
            error!("Failed to dispatch event {:?}: {}", event, e);
        }
    }

    info!("Event processing loop stopped");
}

async fn dispatch(_event: &Event) -> Result<(), String> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_does_not_panic_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender.send_or_log(Event::CampaignCreated(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_round_trip_through_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let id = Uuid::new_v4();
        sender.send(Event::CampaignDeactivated(id)).await.unwrap();

        match rx.recv().await {
            Some(Event::CampaignDeactivated(got)) => assert_eq!(got, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
