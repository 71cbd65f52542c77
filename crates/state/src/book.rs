//! The order book: in-memory order list mirrored to the `ordini` key.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;

use bottega_core::{DomainError, OrderId};
use bottega_orders::{Order, OrderStatus};
use bottega_store::{KvStore, keys};

use crate::change::{ChangeOp, ChangeSink, PendingChange};
use crate::error::StateError;

/// Domain state container for orders.
///
/// Holds the full order list in memory and re-serializes it to the `ordini`
/// key after every mutation. There is no incremental diffing: the list is
/// small (a day's orders for one shop) and whole-list writes keep the
/// persisted value equal to the in-memory one by construction.
///
/// Orders are never removed from the list. Cancellation is a status
/// transition and the order stays visible.
pub struct OrderBook {
    store: KvStore,
    sink: Arc<dyn ChangeSink>,
    orders: RwLock<Vec<Order>>,
}

impl OrderBook {
    /// Load the order list from the store and wrap it.
    ///
    /// A missing or corrupt `ordini` value hydrates as an empty list; the
    /// store logs the fallback.
    pub async fn hydrate(store: KvStore, sink: Arc<dyn ChangeSink>) -> Self {
        let orders: Vec<Order> = store.get_or_default(keys::ORDINI).await;
        tracing::debug!(count = orders.len(), "hydrated order book");
        Self {
            store,
            sink,
            orders: RwLock::new(orders),
        }
    }

    /// Re-read the list from the store, discarding the in-memory copy.
    /// Used after a backup restore rewrites the underlying keys.
    pub async fn reload(&self) {
        let fresh: Vec<Order> = self.store.get_or_default(keys::ORDINI).await;
        let mut orders = self.orders.write().await;
        tracing::debug!(count = fresh.len(), "reloaded order book from store");
        *orders = fresh;
    }

    /// Snapshot of the current list.
    pub async fn list(&self) -> Vec<Order> {
        self.orders.read().await.clone()
    }

    pub async fn get(&self, id: OrderId) -> Option<Order> {
        self.orders.read().await.iter().find(|o| o.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    /// Append a new order.
    pub async fn add(&self, order: Order) -> Result<Order, StateError> {
        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.id == order.id) {
            return Err(DomainError::invariant(format!("duplicate order id {}", order.id)).into());
        }

        let mut next = orders.clone();
        next.push(order.clone());

        self.commit(&mut orders, next, change_for(&order, ChangeOp::Create)?)
            .await?;
        Ok(order)
    }

    /// Replace an existing order wholesale.
    ///
    /// The status must not change through this path; use [`set_status`] or
    /// [`cancel`] so the lifecycle rules apply.
    ///
    /// [`set_status`]: OrderBook::set_status
    /// [`cancel`]: OrderBook::cancel
    pub async fn update(&self, mut order: Order) -> Result<Order, StateError> {
        let mut orders = self.orders.write().await;
        let Some(pos) = orders.iter().position(|o| o.id == order.id) else {
            return Err(DomainError::not_found(format!("order {}", order.id)).into());
        };

        let current = &orders[pos];
        if !current.is_modifiable() {
            return Err(DomainError::illegal_transition(format!(
                "order {} is {}",
                order.id,
                current.status.as_str()
            ))
            .into());
        }
        if order.status != current.status {
            return Err(DomainError::illegal_transition(
                "status changes go through set_status",
            )
            .into());
        }

        order.updated_at = chrono::Utc::now();
        let mut next = orders.clone();
        next[pos] = order.clone();

        self.commit(&mut orders, next, change_for(&order, ChangeOp::Update)?)
            .await?;
        Ok(order)
    }

    /// Move an order through its lifecycle.
    pub async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, StateError> {
        let mut orders = self.orders.write().await;
        let Some(pos) = orders.iter().position(|o| o.id == id) else {
            return Err(DomainError::not_found(format!("order {id}")).into());
        };

        let mut next = orders.clone();
        next[pos].set_status(status)?;
        let updated = next[pos].clone();

        self.commit(&mut orders, next, change_for(&updated, ChangeOp::Update)?)
            .await?;
        Ok(updated)
    }

    /// Cancel an order. The order stays in the list with status `Cancelled`.
    pub async fn cancel(&self, id: OrderId) -> Result<Order, StateError> {
        self.set_status(id, OrderStatus::Cancelled).await
    }

    /// Overwrite local state with the remote list, keeping local versions of
    /// any order whose id is in `protected` (changes still waiting to sync).
    ///
    /// Records no pending change: this is the pull side of sync, not a local
    /// mutation. An empty remote list persists `[]`, never a missing key.
    pub async fn reconcile_remote(
        &self,
        remote: Vec<Order>,
        protected: &HashSet<OrderId>,
    ) -> Result<(), StateError> {
        let mut orders = self.orders.write().await;

        let mut next = remote;
        for local in orders.iter() {
            if !protected.contains(&local.id) {
                continue;
            }
            match next.iter_mut().find(|o| o.id == local.id) {
                Some(slot) => *slot = local.clone(),
                None => next.push(local.clone()),
            }
        }

        self.store.set(keys::ORDINI, &next).await?;
        *orders = next;
        Ok(())
    }

    /// Persist `next`, report the change, then commit it to memory.
    ///
    /// Failures leave the in-memory list untouched, so memory never runs
    /// ahead of the store.
    async fn commit(
        &self,
        orders: &mut Vec<Order>,
        next: Vec<Order>,
        change: PendingChange,
    ) -> Result<(), StateError> {
        self.store.set(keys::ORDINI, &next).await?;
        self.sink.record(change).await.map_err(StateError::Sink)?;
        *orders = next;
        Ok(())
    }
}

fn change_for(order: &Order, op: ChangeOp) -> Result<PendingChange, StateError> {
    let payload = serde_json::to_value(order).map_err(bottega_store::StoreError::from)?;
    Ok(PendingChange::new("ordini", order.id.to_string(), op, payload))
}
