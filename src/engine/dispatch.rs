use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::courier::Courier;
use crate::models::order::{Order, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::realtime::events::{self, AssignmentPayload, OfferPayload, OrderStatusPayload};
use crate::realtime::hub::Hub;
use crate::store::MemoryStore;

/// Search radius when the order has no pickup coordinates: effectively the
/// whole globe, yielding an arbitrary-but-deterministic ordering.
const GLOBAL_RADIUS_KM: f64 = 20_000.0;

pub struct DispatchOutcome {
    pub order: Order,
    pub courier: Option<Courier>,
}

/// Candidate selection and offer management. All mutating paths for one
/// order serialize on an in-process lock keyed by order-id, so two
/// concurrent dispatch calls can never both emit an offer.
pub struct Dispatcher {
    store: Arc<MemoryStore>,
    hub: Arc<Hub>,
    metrics: Metrics,
    // TODO: evict entries once their order reaches a terminal status.
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    radius_km: f64,
    candidate_limit: usize,
}

impl Dispatcher {
    pub fn new(
        store: Arc<MemoryStore>,
        hub: Arc<Hub>,
        metrics: Metrics,
        radius_km: f64,
        candidate_limit: usize,
    ) -> Self {
        Self {
            store,
            hub,
            metrics,
            locks: DashMap::new(),
            radius_km,
            candidate_limit,
        }
    }

    fn order_lock(&self, order_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Picks a courier for the order and emits the offer. Idempotent: an
    /// intact assignment is returned as-is.
    pub async fn assign(&self, order_id: Uuid) -> Result<DispatchOutcome, AppError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;
        self.select_and_assign(order_id, None, None).await
    }

    /// Immediate retry after a decline, never re-offering to the decliner.
    pub async fn reassign_after_decline(
        &self,
        order_id: Uuid,
        declined_by: Uuid,
    ) -> Result<DispatchOutcome, AppError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;
        let outcome = self.select_and_assign(order_id, Some(declined_by), None).await?;
        if outcome.courier.is_some() {
            self.metrics
                .reassignments_total
                .with_label_values(&["decline"])
                .inc();
        }
        Ok(outcome)
    }

    /// Reclaims offers older than `cutoff`. A failure on one order never
    /// aborts the pass. Returns how many orders got a replacement courier.
    pub async fn reassign_timed_out(&self, cutoff: DateTime<Utc>) -> Result<usize, AppError> {
        let stale = self.store.list_assigned_older_than(cutoff);
        let mut reassigned = 0;
        for order in stale {
            match self.reclaim_stale_offer(order.id, cutoff).await {
                Ok(true) => reassigned += 1,
                Ok(false) => {}
                Err(err) => {
                    error!(order_id = %order.id, error = %err, "failed to reclaim stale offer");
                }
            }
        }
        Ok(reassigned)
    }

    async fn reclaim_stale_offer(
        &self,
        order_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;

        // Re-read under the lock: the courier may have answered while this
        // pass was waiting.
        let order = self.store.get_order(order_id)?;
        if order.status != OrderStatus::Assigned || order.updated_at >= cutoff {
            return Ok(false);
        }
        let Some(prev) = order.assigned_courier else {
            return Ok(false);
        };

        self.hub
            .notify_courier(
                prev,
                events::ORDER_ASSIGNMENT_TIMED_OUT,
                &AssignmentPayload::from_order(&order),
            )
            .await;
        self.store.clear_assignment(order_id)?;

        let outcome = self.select_and_assign(order_id, Some(prev), Some(prev)).await?;
        if outcome.courier.is_some() {
            self.hub
                .notify_courier(
                    prev,
                    events::ORDER_REASSIGNED_AWAY,
                    &AssignmentPayload::from_order(&outcome.order),
                )
                .await;
            self.metrics
                .reassignments_total
                .with_label_values(&["timeout"])
                .inc();
            return Ok(true);
        }
        Ok(false)
    }

    /// Core selection. Caller must hold the order's lock. `exclude` is the
    /// courier who just refused; `prev_offered` additionally receives the
    /// no-longer-yours notification when the search comes up empty.
    async fn select_and_assign(
        &self,
        order_id: Uuid,
        exclude: Option<Uuid>,
        prev_offered: Option<Uuid>,
    ) -> Result<DispatchOutcome, AppError> {
        let start = Instant::now();
        let order = self.store.get_order(order_id)?;

        if order.status.is_terminal() {
            return Ok(DispatchOutcome {
                order,
                courier: None,
            });
        }

        if let Some(current) = order.assigned_courier {
            let courier = self.store.get_courier(current).ok();
            self.observe(start, "noop");
            return Ok(DispatchOutcome { order, courier });
        }

        let (center, radius_km) = match order.pickup_point() {
            Some(point) => (point, self.radius_km),
            None => (GeoPoint { lat: 0.0, lng: 0.0 }, GLOBAL_RADIUS_KM),
        };

        let candidates = self
            .store
            .nearest_available(center, radius_km, self.candidate_limit);
        let tried = self.store.tried_couriers(order_id);
        let chosen = candidates
            .into_iter()
            .find(|candidate| !tried.contains(&candidate.id) && exclude != Some(candidate.id));

        let Some(chosen) = chosen else {
            return self.exhaust(order_id, prev_offered, start).await;
        };

        self.store.clear_assignment(order_id)?;
        self.store.assign(order_id, chosen.id)?;
        self.store.set_status(order_id, OrderStatus::Assigned)?;
        self.store.record_attempt(order_id, chosen.id);

        let updated = self.store.get_order(order_id)?;

        self.hub
            .notify_courier(
                chosen.id,
                events::ORDER_ASSIGNED,
                &OfferPayload::from_order(&updated),
            )
            .await;
        self.hub
            .notify_customer(
                updated.customer_id,
                events::ORDER_STATUS,
                &OrderStatusPayload::detailed(&updated),
            )
            .await;

        info!(order_id = %updated.id, courier_id = %chosen.id, "order assigned");
        self.observe(start, "assigned");
        Ok(DispatchOutcome {
            order: updated,
            courier: Some(chosen),
        })
    }

    async fn exhaust(
        &self,
        order_id: Uuid,
        prev_offered: Option<Uuid>,
        start: Instant,
    ) -> Result<DispatchOutcome, AppError> {
        self.store.mark_exhausted(order_id)?;
        let updated = self.store.get_order(order_id)?;

        self.hub
            .notify_customer(
                updated.customer_id,
                events::ORDER_STATUS,
                &OrderStatusPayload::brief(&updated),
            )
            .await;
        if let Some(prev) = prev_offered {
            self.hub
                .notify_courier(
                    prev,
                    events::ORDER_NO_NEARBY_DRIVER,
                    &AssignmentPayload::from_order(&updated),
                )
                .await;
        }

        warn!(order_id = %updated.id, "no nearby couriers; order exhausted");
        self.observe(start, "exhausted");
        Ok(DispatchOutcome {
            order: updated,
            courier: None,
        })
    }

    fn observe(&self, start: Instant, outcome: &str) {
        self.metrics
            .dispatch_total
            .with_label_values(&[outcome])
            .inc();
        self.metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::Dispatcher;
    use crate::models::courier::Courier;
    use crate::models::order::{Order, OrderStatus};
    use crate::observability::metrics::Metrics;
    use crate::realtime::hub::Hub;
    use crate::store::MemoryStore;

    fn dispatcher(store: Arc<MemoryStore>) -> Dispatcher {
        Dispatcher::new(store, Arc::new(Hub::new()), Metrics::new(), 10.0, 50)
    }

    fn courier_at(store: &MemoryStore, lat: f64, lng: f64) -> Courier {
        let mut courier = Courier::new(Uuid::new_v4());
        courier.available = true;
        courier.latitude = Some(lat);
        courier.longitude = Some(lng);
        store.insert_courier(courier)
    }

    fn order_with_pickup(store: &MemoryStore, lat: Option<f64>, lng: Option<f64>) -> Order {
        let now = Utc::now();
        store
            .create_order(Order {
                id: Uuid::new_v4(),
                customer_id: Uuid::new_v4(),
                assigned_courier: None,
                type_id: Uuid::new_v4(),
                vehicle_class_id: Uuid::new_v4(),
                receiver_phone: "+251911000000".to_string(),
                pickup_address: "Bole Road".to_string(),
                pickup_lat: lat,
                pickup_lng: lng,
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
    async fn assigns_the_nearest_available_courier() {
        let store = Arc::new(MemoryStore::new());
        let near = courier_at(&store, 10.01, 20.01);
        courier_at(&store, 10.05, 20.05);
        let order = order_with_pickup(&store, Some(10.00), Some(20.00));

        let outcome = dispatcher(store.clone()).assign(order.id).await.unwrap();

        assert_eq!(outcome.order.status, OrderStatus::Assigned);
        assert_eq!(outcome.order.assigned_courier, Some(near.id));
        assert_eq!(outcome.courier.unwrap().id, near.id);
        assert!(store.tried_couriers(order.id).contains(&near.id));
    }

    #[tokio::test]
    async fn repeated_assign_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        let courier = courier_at(&store, 10.01, 20.01);
        let order = order_with_pickup(&store, Some(10.00), Some(20.00));
        let dispatcher = dispatcher(store.clone());

        let first = dispatcher.assign(order.id).await.unwrap();
        let second = dispatcher.assign(order.id).await.unwrap();

        assert_eq!(first.order.assigned_courier, Some(courier.id));
        assert_eq!(second.order.assigned_courier, Some(courier.id));
        assert_eq!(store.tried_couriers(order.id).len(), 1);
    }

    #[tokio::test]
    async fn no_candidates_marks_the_order_exhausted() {
        let store = Arc::new(MemoryStore::new());
        let order = order_with_pickup(&store, Some(10.00), Some(20.00));

        let outcome = dispatcher(store.clone()).assign(order.id).await.unwrap();

        assert_eq!(outcome.order.status, OrderStatus::NoNearbyDriver);
        assert_eq!(outcome.order.assigned_courier, None);
        assert!(outcome.courier.is_none());
    }

    #[tokio::test]
    async fn decline_cascade_walks_candidates_then_exhausts() {
        let store = Arc::new(MemoryStore::new());
        let first = courier_at(&store, 10.01, 20.01);
        let second = courier_at(&store, 10.05, 20.05);
        let order = order_with_pickup(&store, Some(10.00), Some(20.00));
        let dispatcher = dispatcher(store.clone());

        let outcome = dispatcher.assign(order.id).await.unwrap();
        assert_eq!(outcome.order.assigned_courier, Some(first.id));

        // First courier declines.
        store.set_status(order.id, OrderStatus::Declined).unwrap();
        store.clear_assignment(order.id).unwrap();
        let outcome = dispatcher
            .reassign_after_decline(order.id, first.id)
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Assigned);
        assert_eq!(outcome.order.assigned_courier, Some(second.id));

        let tried = store.tried_couriers(order.id);
        assert!(tried.contains(&first.id) && tried.contains(&second.id));

        // Second courier declines too; nobody is left.
        store.set_status(order.id, OrderStatus::Declined).unwrap();
        store.clear_assignment(order.id).unwrap();
        let outcome = dispatcher
            .reassign_after_decline(order.id, second.id)
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::NoNearbyDriver);
        assert!(outcome.courier.is_none());
    }

    #[tokio::test]
    async fn decliner_is_excluded_even_when_only_candidate() {
        let store = Arc::new(MemoryStore::new());
        let only = courier_at(&store, 10.01, 20.01);
        let order = order_with_pickup(&store, Some(10.00), Some(20.00));
        let dispatcher = dispatcher(store.clone());

        let outcome = dispatcher
            .reassign_after_decline(order.id, only.id)
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::NoNearbyDriver);
    }

    #[tokio::test]
    async fn timed_out_offer_moves_to_next_courier() {
        let store = Arc::new(MemoryStore::new());
        let first = courier_at(&store, 10.01, 20.01);
        let second = courier_at(&store, 10.05, 20.05);
        let order = order_with_pickup(&store, Some(10.00), Some(20.00));
        let dispatcher = dispatcher(store.clone());

        dispatcher.assign(order.id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        // Everything assigned before this instant is stale.
        let reclaimed = dispatcher.reassign_timed_out(Utc::now()).await.unwrap();
        assert_eq!(reclaimed, 1);

        let updated = store.get_order(order.id).unwrap();
        assert_eq!(updated.status, OrderStatus::Assigned);
        assert_eq!(updated.assigned_courier, Some(second.id));
        assert!(store.tried_couriers(order.id).contains(&first.id));
    }

    #[tokio::test]
    async fn timed_out_offer_exhausts_when_no_replacement_exists() {
        let store = Arc::new(MemoryStore::new());
        courier_at(&store, 10.01, 20.01);
        let order = order_with_pickup(&store, Some(10.00), Some(20.00));
        let dispatcher = dispatcher(store.clone());

        dispatcher.assign(order.id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let reclaimed = dispatcher.reassign_timed_out(Utc::now()).await.unwrap();
        assert_eq!(reclaimed, 0);

        let updated = store.get_order(order.id).unwrap();
        assert_eq!(updated.status, OrderStatus::NoNearbyDriver);
        assert_eq!(updated.assigned_courier, None);
    }

    #[tokio::test]
    async fn fresh_offers_survive_the_scan() {
        let store = Arc::new(MemoryStore::new());
        let courier = courier_at(&store, 10.01, 20.01);
        courier_at(&store, 10.05, 20.05);
        let order = order_with_pickup(&store, Some(10.00), Some(20.00));
        let dispatcher = dispatcher(store.clone());

        dispatcher.assign(order.id).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::seconds(60);
        let reclaimed = dispatcher.reassign_timed_out(cutoff).await.unwrap();
        assert_eq!(reclaimed, 0);
        assert_eq!(
            store.get_order(order.id).unwrap().assigned_courier,
            Some(courier.id)
        );
    }

    #[tokio::test]
    async fn terminal_orders_are_never_dispatched() {
        let store = Arc::new(MemoryStore::new());
        courier_at(&store, 10.01, 20.01);
        let order = order_with_pickup(&store, Some(10.00), Some(20.00));
        store
            .set_status(order.id, OrderStatus::CanceledByCustomer)
            .unwrap();

        let outcome = dispatcher(store.clone()).assign(order.id).await.unwrap();
        assert_eq!(outcome.order.status, OrderStatus::CanceledByCustomer);
        assert!(outcome.courier.is_none());
        assert!(store.tried_couriers(order.id).is_empty());
    }

    #[tokio::test]
    async fn orders_without_pickup_coordinates_search_globally() {
        let store = Arc::new(MemoryStore::new());
        let far_away = courier_at(&store, -33.9249, 18.4241);
        let order = order_with_pickup(&store, None, None);

        let outcome = dispatcher(store.clone()).assign(order.id).await.unwrap();
        assert_eq!(outcome.order.assigned_courier, Some(far_away.id));
    }

    #[tokio::test]
    async fn busy_courier_is_skipped_for_the_second_order() {
        let store = Arc::new(MemoryStore::new());
        let first = courier_at(&store, 10.01, 20.01);
        let second = courier_at(&store, 10.05, 20.05);
        let dispatcher = dispatcher(store.clone());

        let one = order_with_pickup(&store, Some(10.00), Some(20.00));
        let two = order_with_pickup(&store, Some(10.00), Some(20.00));

        let outcome = dispatcher.assign(one.id).await.unwrap();
        assert_eq!(outcome.order.assigned_courier, Some(first.id));

        let outcome = dispatcher.assign(two.id).await.unwrap();
        assert_eq!(outcome.order.assigned_courier, Some(second.id));
    }
}
