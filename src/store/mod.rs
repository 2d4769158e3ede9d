//! Persistence backends.
//!
//! A [`Store`] writes whole rows inside one atomic unit: either every value of
//! the row is written or none is, and uniqueness violations come back as
//! [`IntegrityError`](crate::error::IntegrityError) so the slug retry loop can
//! classify them.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::Result;
use crate::model::{Model, Row};
use crate::query::{CompiledQuery, Selected};
use async_trait::async_trait;

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert (`id` is `None`) or update a row atomically and return its id.
    async fn save_atomic(&self, model: &Model, id: Option<i64>, row: &Row) -> Result<i64>;

    /// Stored row by id.
    async fn fetch(&self, model: &Model, id: i64) -> Result<Option<Row>>;

    /// Remove a row. Returns whether it existed.
    async fn delete(&self, model: &Model, id: i64) -> Result<bool>;

    /// Rows selected by a compiled query, in query order.
    async fn select(&self, query: &CompiledQuery) -> Result<Vec<Selected>>;
}
