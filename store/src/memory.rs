//! In-memory backend for dev servers and tests.
//!
//! Tables live behind one `Arc<Mutex<_>>`. A transaction clones the tables,
//! applies its writes to the clone, and swaps the clone back in on commit.
//! The swap is guarded by a version counter, so a commit that would erase
//! writes landed since `begin` fails instead. Not a production backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use kickflip_core::{
    Address, AddressForm, Id, NewOrder, NewOrderLine, Order, OrderLine, OrderStatus, Product,
};

use crate::{Store, StoreError, StoreTx};

#[derive(Debug, Clone, Default)]
struct Tables {
    products: HashMap<Id, Product>,
    orders: HashMap<Id, Order>,
    lines: Vec<OrderLine>,
    addresses: HashMap<Id, Address>,
    user_addresses: HashMap<Id, Id>,
    next_order_id: Id,
    next_line_id: Id,
    next_address_id: Id,
    // Bumped on every committed write so an open transaction can detect
    // that its snapshot went stale.
    version: u64,
}

impl Tables {
    fn new() -> Self {
        Self {
            next_order_id: 1,
            next_line_id: 1,
            next_address_id: 1,
            ..Self::default()
        }
    }
}

/// In-memory [`Store`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Tables::new())),
        }
    }

    /// Build a store pre-populated with catalog products.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.inner.lock().unwrap_or_else(|e| e.into_inner());
            for product in products {
                tables.products.insert(product.id, product);
            }
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let staged = self.lock()?.clone();
        Ok(Box::new(MemoryTx {
            inner: Arc::clone(&self.inner),
            staged,
        }))
    }

    async fn product(&self, id: Id) -> Result<Option<Product>, StoreError> {
        Ok(self.lock()?.products.get(&id).cloned())
    }

    async fn products(&self) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<_> = self.lock()?.products.values().cloned().collect();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    async fn order(&self, id: Id) -> Result<Option<Order>, StoreError> {
        Ok(self.lock()?.orders.get(&id).cloned())
    }

    async fn order_lines(&self, order_id: Id) -> Result<Vec<OrderLine>, StoreError> {
        Ok(self
            .lock()?
            .lines
            .iter()
            .filter(|line| line.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn update_order_status(&self, id: Id, status: OrderStatus) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        match tables.orders.get_mut(&id) {
            Some(order) => {
                order.status = status;
                tables.version += 1;
                Ok(())
            }
            None => Err(StoreError::Backend(format!("no such order: {id}"))),
        }
    }

    async fn set_tracking_code(&self, id: Id, code: &str) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        match tables.orders.get_mut(&id) {
            Some(order) => {
                order.tracking_code = Some(code.to_string());
                tables.version += 1;
                Ok(())
            }
            None => Err(StoreError::Backend(format!("no such order: {id}"))),
        }
    }

    async fn user_address(&self, user_id: Id) -> Result<Option<Address>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .user_addresses
            .get(&user_id)
            .and_then(|address_id| tables.addresses.get(address_id))
            .cloned())
    }

    async fn attach_address(
        &self,
        user_id: Id,
        form: &AddressForm,
    ) -> Result<Address, StoreError> {
        let mut tables = self.lock()?;
        let id = tables.next_address_id;
        tables.next_address_id += 1;

        let address = Address {
            id,
            street: form.street.clone(),
            locality: form.locality.clone(),
            region: form.region.clone(),
        };
        tables.addresses.insert(id, address.clone());
        tables.user_addresses.insert(user_id, id);
        tables.version += 1;
        Ok(address)
    }
}

/// A unit of work over a cloned snapshot of the tables.
struct MemoryTx {
    inner: Arc<Mutex<Tables>>,
    staged: Tables,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn product(&mut self, id: Id) -> Result<Option<Product>, StoreError> {
        Ok(self.staged.products.get(&id).cloned())
    }

    async fn insert_order(&mut self, new: NewOrder) -> Result<Order, StoreError> {
        let id = self.staged.next_order_id;
        self.staged.next_order_id += 1;

        let order = Order {
            id,
            user_id: new.user_id,
            created_at: Utc::now(),
            status: OrderStatus::Pending,
            total: new.total,
            tracking_code: None,
        };
        self.staged.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn insert_line(&mut self, line: NewOrderLine) -> Result<OrderLine, StoreError> {
        let id = self.staged.next_line_id;
        self.staged.next_line_id += 1;

        let line = OrderLine {
            id,
            order_id: line.order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        };
        self.staged.lines.push(line.clone());
        Ok(line)
    }

    async fn reserve_stock(&mut self, product_id: Id, quantity: u32) -> Result<bool, StoreError> {
        match self.staged.products.get_mut(&product_id) {
            Some(product) if product.stock >= i64::from(quantity) => {
                product.stock -= i64::from(quantity);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tables = self
            .inner
            .lock()
            .map_err(|_| StoreError::Commit("memory store lock poisoned".into()))?;
        // The swap would erase anything committed after our snapshot was
        // taken; refuse instead, like a serialization failure.
        if tables.version != self.staged.version {
            return Err(StoreError::Commit(
                "tables changed since the transaction began".into(),
            ));
        }
        let mut staged = self.staged;
        staged.version += 1;
        *tables = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // The staged clone is simply dropped.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryStore {
        MemoryStore::with_products([
            Product::new(1, "Maple Deck 8.0", 19990, 5),
            Product::new(2, "54mm Wheels", 9990, 2),
        ])
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = seeded();

        let mut tx = store.begin().await.unwrap();
        let order = tx
            .insert_order(NewOrder {
                user_id: 7,
                total: 24990,
            })
            .await
            .unwrap();
        tx.insert_line(NewOrderLine {
            order_id: order.id,
            product_id: 1,
            quantity: 1,
            unit_price: 19990,
        })
        .await
        .unwrap();
        assert!(tx.reserve_stock(1, 1).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.order(order.id).await.unwrap().unwrap().total, 24990);
        assert_eq!(store.order_lines(order.id).await.unwrap().len(), 1);
        assert_eq!(store.product(1).await.unwrap().unwrap().stock, 4);
    }

    #[tokio::test]
    async fn rolled_back_writes_are_discarded() {
        let store = seeded();

        let mut tx = store.begin().await.unwrap();
        let order = tx
            .insert_order(NewOrder {
                user_id: 7,
                total: 9990,
            })
            .await
            .unwrap();
        assert!(tx.reserve_stock(2, 2).await.unwrap());
        tx.rollback().await.unwrap();

        assert!(store.order(order.id).await.unwrap().is_none());
        assert_eq!(store.product(2).await.unwrap().unwrap().stock, 2);
    }

    #[tokio::test]
    async fn stale_transaction_cannot_erase_newer_writes() {
        let store = seeded();

        let mut stale = store.begin().await.unwrap();
        stale
            .insert_order(NewOrder {
                user_id: 7,
                total: 19990,
            })
            .await
            .unwrap();

        // Another handle lands a write while the transaction is open.
        let mut winner = store.begin().await.unwrap();
        let order = winner
            .insert_order(NewOrder {
                user_id: 8,
                total: 9990,
            })
            .await
            .unwrap();
        winner.commit().await.unwrap();

        assert!(matches!(
            stale.commit().await,
            Err(StoreError::Commit(_))
        ));
        // The earlier commit survives.
        assert_eq!(store.order(order.id).await.unwrap().unwrap().user_id, 8);
    }

    #[tokio::test]
    async fn direct_writes_also_invalidate_open_transactions() {
        let store = seeded();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.reserve_stock(1, 1).await.unwrap());

        store
            .update_order_status(1, OrderStatus::Paid)
            .await
            .unwrap_err(); // no such order, no version bump
        store
            .attach_address(
                7,
                &AddressForm {
                    street: "Av. Uno 1".into(),
                    locality: "Santiago".into(),
                    region: "RM".into(),
                },
            )
            .await
            .unwrap();

        assert!(matches!(tx.commit().await, Err(StoreError::Commit(_))));
        assert_eq!(store.product(1).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn reserve_stock_is_guarded() {
        let store = seeded();

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.reserve_stock(2, 3).await.unwrap(), "only 2 in stock");
        assert!(!tx.reserve_stock(99, 1).await.unwrap(), "unknown product");
        assert!(tx.reserve_stock(2, 2).await.unwrap());
        assert!(!tx.reserve_stock(2, 1).await.unwrap(), "now exhausted");
    }

    #[tokio::test]
    async fn attach_address_replaces_previous() {
        let store = seeded();
        let first = AddressForm {
            street: "Av. Uno 1".into(),
            locality: "Santiago".into(),
            region: "RM".into(),
        };
        let second = AddressForm {
            street: "Av. Dos 2".into(),
            locality: "Valparaiso".into(),
            region: "V".into(),
        };

        store.attach_address(7, &first).await.unwrap();
        store.attach_address(7, &second).await.unwrap();

        let current = store.user_address(7).await.unwrap().unwrap();
        assert_eq!(current.street, "Av. Dos 2");
    }
}
