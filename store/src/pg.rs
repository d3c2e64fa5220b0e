//! PostgreSQL backend on `sqlx`.
//!
//! Runtime queries only (no compile-time checking macros, so the crate
//! builds without a live database). The guarded stock decrement is a
//! conditional `UPDATE ... WHERE stock >= $n`, which is what keeps two
//! concurrent checkouts from driving stock negative.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kickflip_core::{
    Address, AddressForm, Id, NewOrder, NewOrderLine, Order, OrderLine, OrderStatus, Product,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::{Store, StoreError, StoreTx};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS products (
    id         BIGSERIAL PRIMARY KEY,
    name       TEXT NOT NULL,
    price      BIGINT NOT NULL,
    stock      BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS addresses (
    id         BIGSERIAL PRIMARY KEY,
    street     TEXT NOT NULL,
    locality   TEXT NOT NULL,
    region     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS user_addresses (
    user_id    BIGINT PRIMARY KEY,
    address_id BIGINT NOT NULL REFERENCES addresses(id)
);
CREATE TABLE IF NOT EXISTS orders (
    id            BIGSERIAL PRIMARY KEY,
    user_id       BIGINT NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    status        TEXT NOT NULL DEFAULT 'pending',
    total         BIGINT NOT NULL,
    tracking_code TEXT
);
CREATE TABLE IF NOT EXISTS order_lines (
    id         BIGSERIAL PRIMARY KEY,
    order_id   BIGINT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
    product_id BIGINT NOT NULL REFERENCES products(id) ON DELETE RESTRICT,
    quantity   BIGINT NOT NULL,
    unit_price BIGINT NOT NULL
);
";

/// PostgreSQL [`Store`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and bootstrap the schema.
    ///
    /// `order_lines.product_id` is `ON DELETE RESTRICT`: a product that is
    /// still referenced by any order line cannot be deleted.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::debug!("schema bootstrap complete");
        Ok(())
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, StoreError> {
    OrderStatus::parse(raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown order status in database: {raw}")))
}

fn quantity_from_row(raw: i64) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(|_| StoreError::Backend(format!("bad quantity in database: {raw}")))
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        stock: row.try_get("stock")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let raw_status: String = row.try_get("status")?;
    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        status: parse_status(&raw_status)?,
        total: row.try_get("total")?,
        tracking_code: row.try_get("tracking_code")?,
    })
}

fn line_from_row(row: &PgRow) -> Result<OrderLine, StoreError> {
    Ok(OrderLine {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        product_id: row.try_get("product_id")?,
        quantity: quantity_from_row(row.try_get("quantity")?)?,
        unit_price: row.try_get("unit_price")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Begin(e.to_string()))?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }

    async fn product(&self, id: Id) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, name, price, stock FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query("SELECT id, name, price, stock FROM products ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn order(&self, id: Id) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, created_at, status, total, tracking_code \
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn order_lines(&self, order_id: Id) -> Result<Vec<OrderLine>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, order_id, product_id, quantity, unit_price \
             FROM order_lines WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(line_from_row).collect()
    }

    async fn update_order_status(&self, id: Id, status: OrderStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!("no such order: {id}")));
        }
        Ok(())
    }

    async fn set_tracking_code(&self, id: Id, code: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET tracking_code = $2 WHERE id = $1")
            .bind(id)
            .bind(code)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!("no such order: {id}")));
        }
        Ok(())
    }

    async fn user_address(&self, user_id: Id) -> Result<Option<Address>, StoreError> {
        let row = sqlx::query(
            "SELECT a.id, a.street, a.locality, a.region \
             FROM addresses a \
             JOIN user_addresses ua ON ua.address_id = a.id \
             WHERE ua.user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Address {
                id: row.try_get("id")?,
                street: row.try_get("street")?,
                locality: row.try_get("locality")?,
                region: row.try_get("region")?,
            })
        })
        .transpose()
    }

    async fn attach_address(
        &self,
        user_id: Id,
        form: &AddressForm,
    ) -> Result<Address, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Begin(e.to_string()))?;

        let row = sqlx::query(
            "INSERT INTO addresses (street, locality, region) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&form.street)
        .bind(&form.locality)
        .bind(&form.region)
        .fetch_one(&mut *tx)
        .await?;
        let id: Id = row.try_get("id")?;

        sqlx::query(
            "INSERT INTO user_addresses (user_id, address_id) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET address_id = EXCLUDED.address_id",
        )
        .bind(user_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Commit(e.to_string()))?;

        Ok(Address {
            id,
            street: form.street.clone(),
            locality: form.locality.clone(),
            region: form.region.clone(),
        })
    }
}

/// A unit of work over one `sqlx` transaction.
struct PgTx {
    tx: Option<sqlx::Transaction<'static, sqlx::Postgres>>,
}

impl PgTx {
    fn active(&mut self) -> Result<&mut sqlx::Transaction<'static, sqlx::Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::Completed)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn product(&mut self, id: Id) -> Result<Option<Product>, StoreError> {
        let tx = self.active()?;
        let row = sqlx::query("SELECT id, name, price, stock FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn insert_order(&mut self, new: NewOrder) -> Result<Order, StoreError> {
        let tx = self.active()?;
        let row = sqlx::query(
            "INSERT INTO orders (user_id, status, total) \
             VALUES ($1, 'pending', $2) RETURNING id, created_at",
        )
        .bind(new.user_id)
        .bind(new.total)
        .fetch_one(&mut **tx)
        .await?;

        Ok(Order {
            id: row.try_get("id")?,
            user_id: new.user_id,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            status: OrderStatus::Pending,
            total: new.total,
            tracking_code: None,
        })
    }

    async fn insert_line(&mut self, line: NewOrderLine) -> Result<OrderLine, StoreError> {
        let tx = self.active()?;
        let row = sqlx::query(
            "INSERT INTO order_lines (order_id, product_id, quantity, unit_price) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(line.order_id)
        .bind(line.product_id)
        .bind(i64::from(line.quantity))
        .bind(line.unit_price)
        .fetch_one(&mut **tx)
        .await?;

        Ok(OrderLine {
            id: row.try_get("id")?,
            order_id: line.order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        })
    }

    async fn reserve_stock(&mut self, product_id: Id, quantity: u32) -> Result<bool, StoreError> {
        let tx = self.active()?;
        let result = sqlx::query(
            "UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2",
        )
        .bind(product_id)
        .bind(i64::from(quantity))
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .take()
            .ok_or(StoreError::Completed)?
            .commit()
            .await
            .map_err(|e| StoreError::Commit(e.to_string()))
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .take()
            .ok_or(StoreError::Completed)?
            .rollback()
            .await
            .map_err(|e| StoreError::Rollback(e.to_string()))
    }
}
