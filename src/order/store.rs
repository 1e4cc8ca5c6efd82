// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

// Order Store: persistence for swap orders
//
// Storage format (sled):
//   Tree: "swap_orders"
//   Key: "order:{id}"
//   Value: SwapOrder as JSON
//
// Orders are never deleted: terminal orders remain queryable.

use parking_lot::RwLock;
use sled::Db;
use std::collections::HashMap;
use std::path::Path;

use super::model::SwapOrder;
use super::status::OrderStatus;
use crate::errors::{Result, SwapError};

const ORDER_TREE: &str = "swap_orders";

/// Keyed order persistence. Implementations only store; transition rules
/// live on the order itself.
pub trait OrderStore: Send + Sync {
    /// Fails with `DuplicateOrder` if the id is taken.
    fn insert(&self, order: &SwapOrder) -> Result<()>;

    /// Fails with `OrderNotFound` for unknown ids.
    fn load(&self, id: &str) -> Result<SwapOrder>;

    /// Overwrite an existing order.
    fn save(&self, order: &SwapOrder) -> Result<()>;

    /// All orders, oldest first.
    fn list(&self) -> Result<Vec<SwapOrder>>;

    fn list_by_status(&self, status: OrderStatus) -> Result<Vec<SwapOrder>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|order| order.status == status)
            .collect())
    }
}

fn oldest_first(orders: &mut [SwapOrder]) {
    orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

// ============================================================================
// IN-MEMORY
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<String, SwapOrder>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

impl OrderStore for MemoryOrderStore {
    fn insert(&self, order: &SwapOrder) -> Result<()> {
        let mut orders = self.orders.write();
        if orders.contains_key(&order.id) {
            return Err(SwapError::DuplicateOrder(order.id.clone()));
        }
        orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<SwapOrder> {
        self.orders
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SwapError::OrderNotFound(id.to_string()))
    }

    fn save(&self, order: &SwapOrder) -> Result<()> {
        let mut orders = self.orders.write();
        match orders.get_mut(&order.id) {
            Some(slot) => {
                *slot = order.clone();
                Ok(())
            }
            None => Err(SwapError::OrderNotFound(order.id.clone())),
        }
    }

    fn list(&self) -> Result<Vec<SwapOrder>> {
        let mut all: Vec<SwapOrder> = self.orders.read().values().cloned().collect();
        oldest_first(&mut all);
        Ok(all)
    }
}

// ============================================================================
// SLED
// ============================================================================

/// Durable store backed by a sled tree. Every write is flushed.
#[derive(Debug, Clone)]
pub struct SledOrderStore {
    tree: sled::Tree,
}

impl SledOrderStore {
    /// Open (or create) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::new(&db)
    }

    /// Use the order tree of an already open database.
    pub fn new(db: &Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(ORDER_TREE)?,
        })
    }

    fn make_key(id: &str) -> String {
        format!("order:{}", id)
    }
}

impl OrderStore for SledOrderStore {
    fn insert(&self, order: &SwapOrder) -> Result<()> {
        let value = serde_json::to_vec(order)?;
        let key = Self::make_key(&order.id);
        // Only succeeds when the key is absent
        let swapped = self
            .tree
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value))?;
        if swapped.is_err() {
            return Err(SwapError::DuplicateOrder(order.id.clone()));
        }
        self.tree.flush()?;
        Ok(())
    }

    fn load(&self, id: &str) -> Result<SwapOrder> {
        match self.tree.get(Self::make_key(id).as_bytes())? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Err(SwapError::OrderNotFound(id.to_string())),
        }
    }

    fn save(&self, order: &SwapOrder) -> Result<()> {
        let key = Self::make_key(&order.id);
        if !self.tree.contains_key(key.as_bytes())? {
            return Err(SwapError::OrderNotFound(order.id.clone()));
        }
        self.tree.insert(key.as_bytes(), serde_json::to_vec(order)?)?;
        self.tree.flush()?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<SwapOrder>> {
        let mut all = Vec::new();
        for entry in self.tree.scan_prefix(b"order:") {
            let (_, raw) = entry?;
            all.push(serde_json::from_slice::<SwapOrder>(&raw)?);
        }
        oldest_first(&mut all);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::model::{LegTerms, SwapEvent};
    use crate::escrow::Identity;
    use crate::swap::{Chain, SecretCommitment};

    fn sample() -> SwapOrder {
        SwapOrder::from_commitment(
            LegTerms::new(Chain::Starknet, "STRK", 10, "0x1"),
            LegTerms::new(Chain::Bitcoin, "BTC", 20, "tb1qx"),
            SecretCommitment::generate(),
        )
    }

    fn exercise(store: &dyn OrderStore) {
        let mut order = sample();
        store.insert(&order).unwrap();
        assert_eq!(
            store.insert(&order),
            Err(SwapError::DuplicateOrder(order.id.clone()))
        );
        assert_eq!(store.load(&order.id).unwrap(), order);

        order.apply(SwapEvent::Fill { taker: Identity::ZERO }).unwrap();
        store.save(&order).unwrap();
        assert_eq!(store.load(&order.id).unwrap().status, OrderStatus::Filled);

        let other = sample();
        store.insert(&other).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
        let filled = store.list_by_status(OrderStatus::Filled).unwrap();
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].id, order.id);

        assert!(matches!(store.load("missing"), Err(SwapError::OrderNotFound(_))));
        let ghost = sample();
        assert!(matches!(store.save(&ghost), Err(SwapError::OrderNotFound(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryOrderStore::new();
        exercise(&store);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_sled_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledOrderStore::open(dir.path().join("orders")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_sled_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders");
        let order = sample();
        {
            let store = SledOrderStore::open(&path).unwrap();
            store.insert(&order).unwrap();
        }
        let store = SledOrderStore::open(&path).unwrap();
        let loaded = store.load(&order.id).unwrap();
        assert_eq!(loaded, order);
        assert!(loaded.secret.is_some());
    }
}
