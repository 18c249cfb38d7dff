use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::store::{touch, AssignmentAttempt, MemoryStore};

impl MemoryStore {
    pub fn create_order(&self, order: Order) -> Result<Order, AppError> {
        if self.orders.contains_key(&order.id) {
            return Err(AppError::Conflict(format!("order {} already exists", order.id)));
        }
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    pub fn get_order(&self, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    /// Unconditional status write; legality is the state machine's concern.
    pub fn set_status(&self, id: Uuid, status: OrderStatus) -> Result<(), AppError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        let order = entry.value_mut();
        order.status = status;
        touch(&mut order.updated_at);
        Ok(())
    }

    /// Sets the assignment pointer. Refuses to overwrite a different existing
    /// assignment; callers clear first.
    pub fn assign(&self, id: Uuid, courier_id: Uuid) -> Result<(), AppError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        let order = entry.value_mut();
        if let Some(current) = order.assigned_courier {
            if current != courier_id {
                return Err(AppError::Conflict(format!(
                    "order {id} already assigned to courier {current}"
                )));
            }
        }
        order.assigned_courier = Some(courier_id);
        touch(&mut order.updated_at);
        Ok(())
    }

    pub fn clear_assignment(&self, id: Uuid) -> Result<(), AppError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        let order = entry.value_mut();
        order.assigned_courier = None;
        touch(&mut order.updated_at);
        Ok(())
    }

    /// Clears the assignment and sets `no_nearby_driver` under one entry
    /// guard; the scanner must never observe the intermediate state.
    pub fn mark_exhausted(&self, id: Uuid) -> Result<(), AppError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        let order = entry.value_mut();
        order.assigned_courier = None;
        order.status = OrderStatus::NoNearbyDriver;
        touch(&mut order.updated_at);
        Ok(())
    }

    /// Runs a validated mutation against the live order under its entry
    /// guard. The state machine routes courier and customer transitions
    /// through this so check-then-write races lose cleanly.
    pub fn update_order<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Order) -> Result<T, AppError>,
    ) -> Result<(T, Order), AppError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        let order = entry.value_mut();
        let out = f(order)?;
        touch(&mut order.updated_at);
        Ok((out, order.clone()))
    }

    pub fn list_assigned_older_than(&self, cutoff: DateTime<Utc>) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| {
                let o = entry.value();
                o.status == OrderStatus::Assigned && o.updated_at < cutoff
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn count_assigned(&self) -> usize {
        self.orders
            .iter()
            .filter(|entry| entry.value().status == OrderStatus::Assigned)
            .count()
    }

    /// Set-insert into the exclusion memory; duplicates are tolerated so
    /// retried dispatch steps converge.
    pub fn record_attempt(&self, order_id: Uuid, courier_id: Uuid) {
        let mut entry = self.attempts.entry(order_id).or_default();
        if !entry.iter().any(|a| a.courier_id == courier_id) {
            entry.push(AssignmentAttempt {
                order_id,
                courier_id,
                created_at: Utc::now(),
            });
        }
    }

    pub fn tried_couriers(&self, order_id: Uuid) -> HashSet<Uuid> {
        self.attempts
            .get(&order_id)
            .map(|entry| entry.iter().map(|a| a.courier_id).collect())
            .unwrap_or_default()
    }

    pub fn list_active_for_customer(&self, customer_id: Uuid) -> Vec<Order> {
        let mut list: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                let o = entry.value();
                o.customer_id == customer_id && !o.status.is_terminal()
            })
            .map(|entry| entry.value().clone())
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        list
    }

    /// Most recently updated non-terminal order assigned to the courier.
    pub fn active_for_courier(&self, courier_id: Uuid) -> Option<Order> {
        self.orders
            .iter()
            .filter(|entry| {
                let o = entry.value();
                o.assigned_courier == Some(courier_id) && !o.status.is_terminal()
            })
            .map(|entry| entry.value().clone())
            .max_by_key(|o| o.updated_at)
    }

    pub fn list_history_for_customer(
        &self,
        customer_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> (Vec<Order>, usize) {
        let mut list: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.value().customer_id == customer_id)
            .map(|entry| entry.value().clone())
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let total = list.len();
        (paginate(list, limit, offset), total)
    }

    pub fn list_delivered_for_courier(
        &self,
        courier_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> (Vec<Order>, usize) {
        let mut list: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                let o = entry.value();
                o.status == OrderStatus::Delivered && o.assigned_courier == Some(courier_id)
            })
            .map(|entry| entry.value().clone())
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let total = list.len();
        (paginate(list, limit, offset), total)
    }
}

fn paginate(list: Vec<Order>, limit: usize, offset: usize) -> Vec<Order> {
    list.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::error::AppError;
    use crate::models::order::{Order, OrderStatus};
    use crate::store::MemoryStore;

    fn order(customer_id: Uuid) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            customer_id,
            assigned_courier: None,
            type_id: Uuid::new_v4(),
            vehicle_class_id: Uuid::new_v4(),
            receiver_phone: "+251900000000".to_string(),
            pickup_address: "Bole Road".to_string(),
            pickup_lat: Some(9.0054),
            pickup_lng: Some(38.7636),
            dropoff_address: "Piassa".to_string(),
            dropoff_lat: Some(9.0357),
            dropoff_lng: Some(38.7500),
            estimated_price_cents: 15_000,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let store = MemoryStore::new();
        let o = order(Uuid::new_v4());
        store.create_order(o.clone()).unwrap();
        assert!(matches!(
            store.create_order(o),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn assign_refuses_to_overwrite_other_courier() {
        let store = MemoryStore::new();
        let o = store.create_order(order(Uuid::new_v4())).unwrap();
        let c1 = Uuid::new_v4();
        let c2 = Uuid::new_v4();

        store.assign(o.id, c1).unwrap();
        assert!(matches!(store.assign(o.id, c2), Err(AppError::Conflict(_))));
        // Re-assigning the same courier is a no-op, not a conflict.
        store.assign(o.id, c1).unwrap();

        store.clear_assignment(o.id).unwrap();
        store.assign(o.id, c2).unwrap();
        assert_eq!(store.get_order(o.id).unwrap().assigned_courier, Some(c2));
    }

    #[test]
    fn mark_exhausted_clears_assignment_and_sets_status_together() {
        let store = MemoryStore::new();
        let o = store.create_order(order(Uuid::new_v4())).unwrap();
        store.assign(o.id, Uuid::new_v4()).unwrap();
        store.set_status(o.id, OrderStatus::Assigned).unwrap();

        store.mark_exhausted(o.id).unwrap();

        let got = store.get_order(o.id).unwrap();
        assert_eq!(got.status, OrderStatus::NoNearbyDriver);
        assert_eq!(got.assigned_courier, None);
    }

    #[test]
    fn updated_at_strictly_increases_across_mutations() {
        let store = MemoryStore::new();
        let o = store.create_order(order(Uuid::new_v4())).unwrap();
        let mut last = o.updated_at;
        for status in [
            OrderStatus::Assigned,
            OrderStatus::Accepted,
            OrderStatus::Arrived,
            OrderStatus::PickedUp,
            OrderStatus::Delivered,
        ] {
            store.set_status(o.id, status).unwrap();
            let now = store.get_order(o.id).unwrap().updated_at;
            assert!(now > last, "updated_at must strictly increase");
            last = now;
        }
    }

    #[test]
    fn attempts_grow_monotonically_without_duplicates() {
        let store = MemoryStore::new();
        let oid = Uuid::new_v4();
        let c1 = Uuid::new_v4();
        let c2 = Uuid::new_v4();

        store.record_attempt(oid, c1);
        store.record_attempt(oid, c1);
        store.record_attempt(oid, c2);

        let tried = store.tried_couriers(oid);
        assert_eq!(tried.len(), 2);
        assert!(tried.contains(&c1));
        assert!(tried.contains(&c2));
    }

    #[test]
    fn stale_assigned_listing_respects_cutoff() {
        let store = MemoryStore::new();
        let o = store.create_order(order(Uuid::new_v4())).unwrap();
        store.assign(o.id, Uuid::new_v4()).unwrap();
        store.set_status(o.id, OrderStatus::Assigned).unwrap();
        assert_eq!(store.count_assigned(), 1);

        let past = Utc::now() - chrono::Duration::seconds(60);
        assert!(store.list_assigned_older_than(past).is_empty());

        let future = Utc::now() + chrono::Duration::seconds(60);
        assert_eq!(store.list_assigned_older_than(future).len(), 1);
    }

    #[test]
    fn history_pagination_returns_newest_first() {
        let store = MemoryStore::new();
        let customer = Uuid::new_v4();
        for _ in 0..5 {
            store.create_order(order(customer)).unwrap();
        }

        let (first_page, total) = store.list_history_for_customer(customer, 2, 0);
        assert_eq!(total, 5);
        assert_eq!(first_page.len(), 2);
        let (last_page, _) = store.list_history_for_customer(customer, 2, 4);
        assert_eq!(last_page.len(), 1);

        let (all, _) = store.list_history_for_customer(customer, 10, 0);
        for pair in all.windows(2) {
            assert!(pair[0].updated_at >= pair[1].updated_at);
        }
    }

    #[test]
    fn delivered_listing_filters_by_courier() {
        let store = MemoryStore::new();
        let courier = Uuid::new_v4();
        let o = store.create_order(order(Uuid::new_v4())).unwrap();
        store.assign(o.id, courier).unwrap();
        store.set_status(o.id, OrderStatus::Delivered).unwrap();

        let other = store.create_order(order(Uuid::new_v4())).unwrap();
        store.assign(other.id, Uuid::new_v4()).unwrap();
        store.set_status(other.id, OrderStatus::Delivered).unwrap();

        let (delivered, total) = store.list_delivered_for_courier(courier, 10, 0);
        assert_eq!(total, 1);
        assert_eq!(delivered[0].id, o.id);
    }
}
