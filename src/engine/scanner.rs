use std::sync::Arc;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::error::AppError;
use crate::state::AppState;

/// Background loop reclaiming offers that couriers left unanswered.
pub async fn run_reassignment_scanner(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(state.scan_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        period_secs = state.scan_period.as_secs(),
        offer_timeout_secs = state.offer_timeout.num_seconds(),
        "reassignment scanner started"
    );

    loop {
        ticker.tick().await;
        if let Err(err) = scan_once(&state).await {
            error!(error = %err, "reassignment pass failed");
        }
    }
}

/// One scanner pass. Skips the order scan entirely while nothing is
/// outstanding.
pub async fn scan_once(state: &AppState) -> Result<usize, AppError> {
    if state.store.count_assigned() == 0 {
        return Ok(0);
    }

    let cutoff = Utc::now() - state.offer_timeout;
    let reclaimed = state.dispatcher.reassign_timed_out(cutoff).await?;
    if reclaimed > 0 {
        info!(reclaimed, "stale offers reassigned");
    }
    Ok(reclaimed)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::scan_once;
    use crate::config::Config;
    use crate::models::courier::Courier;
    use crate::models::order::{Order, OrderStatus};
    use crate::state::AppState;

    fn state_with_zero_offer_timeout() -> AppState {
        AppState::new(&Config {
            http_port: 0,
            log_level: "info".to_string(),
            dispatch_radius_km: 10.0,
            candidate_limit: 50,
            offer_timeout_secs: 0,
            scan_period_secs: 20,
            request_timeout_secs: 10,
        })
    }

    fn available_courier(state: &AppState, lat: f64, lng: f64) -> Courier {
        let mut courier = Courier::new(Uuid::new_v4());
        courier.available = true;
        courier.latitude = Some(lat);
        courier.longitude = Some(lng);
        state.store.insert_courier(courier)
    }

    fn pending_order(state: &AppState) -> Order {
        let now = Utc::now();
        state
            .store
            .create_order(Order {
                id: Uuid::new_v4(),
                customer_id: Uuid::new_v4(),
                assigned_courier: None,
                type_id: Uuid::new_v4(),
                vehicle_class_id: Uuid::new_v4(),
                receiver_phone: "+251911000000".to_string(),
                pickup_address: "Bole Road".to_string(),
                pickup_lat: Some(10.00),
                pickup_lng: Some(20.00),
                dropoff_address: "Piassa".to_string(),
                dropoff_lat: None,
                dropoff_lng: None,
                estimated_price_cents: 12_000,
                status: OrderStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn idle_pass_does_nothing() {
        let state = state_with_zero_offer_timeout();
        assert_eq!(scan_once(&state).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stale_offer_is_handed_to_the_next_courier() {
        let state = state_with_zero_offer_timeout();
        let first = available_courier(&state, 10.01, 20.01);
        let second = available_courier(&state, 10.05, 20.05);
        let order = pending_order(&state);

        state.dispatcher.assign(order.id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(scan_once(&state).await.unwrap(), 1);

        let updated = state.store.get_order(order.id).unwrap();
        assert_eq!(updated.assigned_courier, Some(second.id));
        assert!(state.store.tried_couriers(order.id).contains(&first.id));
    }

    #[tokio::test]
    async fn pass_survives_exhaustion_of_one_order() {
        let state = state_with_zero_offer_timeout();
        available_courier(&state, 10.01, 20.01);
        let lonely = pending_order(&state);

        state.dispatcher.assign(lonely.id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(scan_once(&state).await.unwrap(), 0);
        assert_eq!(
            state.store.get_order(lonely.id).unwrap().status,
            OrderStatus::NoNearbyDriver
        );
    }
}
