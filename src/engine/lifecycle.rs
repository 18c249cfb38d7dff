use std::sync::Arc;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::realtime::events::{self, OrderStatusPayload};
use crate::realtime::hub::Hub;
use crate::store::MemoryStore;

/// Legal transitions of the order state machine. `sys`-driven edges
/// (assignment, exhaustion, re-offer) are included so the dispatcher and
/// the command surface share one table.
pub fn transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Assigned)
            | (Pending, NoNearbyDriver)
            | (Pending, CanceledByCustomer)
            | (Assigned, Accepted)
            | (Assigned, Declined)
            | (Assigned, Assigned)
            | (Assigned, NoNearbyDriver)
            | (Assigned, CanceledByCustomer)
            | (Assigned, CanceledByCourier)
            | (Declined, Assigned)
            | (Declined, NoNearbyDriver)
            | (Accepted, Arrived)
            | (Accepted, CanceledByCustomer)
            | (Accepted, CanceledByCourier)
            | (Arrived, PickedUp)
            | (Arrived, CanceledByCustomer)
            | (Arrived, CanceledByCourier)
            | (PickedUp, Delivered)
    )
}

/// Validates and applies actor-driven transitions. Each mutation runs under
/// the order's store entry guard, so of two racing commands exactly one
/// observes the pre-transition status and the loser gets `InvalidTransition`
/// with the fresh state.
pub struct OrderLifecycle {
    store: Arc<MemoryStore>,
    hub: Arc<Hub>,
}

impl OrderLifecycle {
    pub fn new(store: Arc<MemoryStore>, hub: Arc<Hub>) -> Self {
        Self { store, hub }
    }

    /// Courier progress commands: accepted, declined, arrived, picked_up,
    /// delivered. The caller must be the order's assigned courier.
    pub async fn courier_update(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        target: OrderStatus,
    ) -> Result<Order, AppError> {
        let (_, updated) = self.store.update_order(order_id, |order| {
            if order.assigned_courier != Some(courier_id) {
                return Err(AppError::Forbidden(
                    "caller is not the assigned courier".to_string(),
                ));
            }
            if !transition_allowed(order.status, target) {
                return Err(AppError::InvalidTransition {
                    current: order.status,
                });
            }
            order.status = target;
            // Declined is transient: the assignment is released here and the
            // dispatcher immediately looks for a replacement.
            if target == OrderStatus::Declined {
                order.assigned_courier = None;
            }
            Ok(())
        })?;

        // The declining courier's own command is its ack; peers do not
        // receive a 'declined' event.
        if target != OrderStatus::Declined {
            self.hub
                .notify_customer(
                    updated.customer_id,
                    events::ORDER_STATUS,
                    &OrderStatusPayload::brief(&updated),
                )
                .await;
        }
        Ok(updated)
    }

    pub async fn cancel_by_customer(
        &self,
        order_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Order, AppError> {
        let current = self.store.get_order(order_id)?;
        if current.customer_id != customer_id {
            return Err(AppError::Forbidden(
                "caller does not own this order".to_string(),
            ));
        }
        // Re-canceling an already-canceled order is a no-op.
        if matches!(
            current.status,
            OrderStatus::CanceledByCustomer | OrderStatus::CanceledByCourier
        ) {
            return Ok(current);
        }

        let (prev_courier, updated) = self.store.update_order(order_id, |order| {
            if order.customer_id != customer_id {
                return Err(AppError::Forbidden(
                    "caller does not own this order".to_string(),
                ));
            }
            if !transition_allowed(order.status, OrderStatus::CanceledByCustomer) {
                return Err(AppError::InvalidTransition {
                    current: order.status,
                });
            }
            let prev = order.assigned_courier;
            order.assigned_courier = None;
            order.status = OrderStatus::CanceledByCustomer;
            Ok(prev)
        })?;

        let payload = OrderStatusPayload::brief(&updated);
        self.hub
            .notify_customer(updated.customer_id, events::ORDER_STATUS, &payload)
            .await;
        if let Some(courier) = prev_courier {
            self.hub
                .notify_courier(courier, events::ORDER_STATUS, &payload)
                .await;
        }
        Ok(updated)
    }

    /// Releases an in-flight assignment so the dispatcher can search for a
    /// replacement: a courier cancel from assigned, accepted, or arrived is
    /// treated as a decline. The transient `declined` status is not
    /// broadcast; the follow-up reassignment settles the order's fate.
    pub async fn courier_release(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
    ) -> Result<Order, AppError> {
        let (_, updated) = self.store.update_order(order_id, |order| {
            if order.assigned_courier != Some(courier_id) {
                return Err(AppError::Forbidden(
                    "caller is not the assigned courier".to_string(),
                ));
            }
            if !matches!(
                order.status,
                OrderStatus::Assigned | OrderStatus::Accepted | OrderStatus::Arrived
            ) {
                return Err(AppError::InvalidTransition {
                    current: order.status,
                });
            }
            order.status = OrderStatus::Declined;
            order.assigned_courier = None;
            Ok(())
        })?;
        Ok(updated)
    }

    /// Direct courier cancellation. The command surface prefers routing a
    /// courier cancel through the dispatcher (treated as a decline); this is
    /// the terminal fallback when no replacement search is wanted.
    pub async fn cancel_by_courier(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
    ) -> Result<Order, AppError> {
        let (_, updated) = self.store.update_order(order_id, |order| {
            if order.assigned_courier != Some(courier_id) {
                return Err(AppError::Forbidden(
                    "caller is not the assigned courier".to_string(),
                ));
            }
            if !transition_allowed(order.status, OrderStatus::CanceledByCourier) {
                return Err(AppError::InvalidTransition {
                    current: order.status,
                });
            }
            order.assigned_courier = None;
            order.status = OrderStatus::CanceledByCourier;
            Ok(())
        })?;

        let payload = OrderStatusPayload::brief(&updated);
        self.hub
            .notify_customer(updated.customer_id, events::ORDER_STATUS, &payload)
            .await;
        self.hub
            .notify_courier(courier_id, events::ORDER_STATUS, &payload)
            .await;
        Ok(updated)
    }
}
