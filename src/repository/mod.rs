pub mod entities;
pub mod interface;
pub mod memory;
mod migrations;
pub mod sql;
use crate::clock::Clock;
use crate::error::Result;
use crate::settings::Setup;
use entities::{CommandRecord, Submission};
use std::sync::Arc;

/// Database setting that selects the in-process store instead of SQLite.
pub const MEMORY_BACKEND: &str = "memory";

#[derive(Clone, Debug)]
pub enum Repository {
    Sql(sql::Warehouse),
    Memory(memory::MemoryWarehouse),
}

impl Repository {
    pub async fn new(s: &Setup, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn_str = s.get_database();
        let capacity = s.get_command_capacity();

        if conn_str == MEMORY_BACKEND {
            let m = memory::MemoryWarehouse::new(capacity, clock);
            return Ok(Self::Memory(m));
        }
        if !conn_str.is_empty() && conn_str != "sqlite::memory:" {
            let s = sql::Warehouse::new(sql::DatabaseStorage::Path(conn_str), capacity, clock).await?;
            return Ok(Self::Sql(s));
        }
        let s = sql::Warehouse::new(sql::DatabaseStorage::Ram, capacity, clock).await?;
        Ok(Self::Sql(s))
    }
}

impl interface::CommandRepository for Repository {
    async fn migrate(&mut self) -> Result<()> {
        match self {
            Repository::Sql(r) => r.migrate().await,
            Repository::Memory(r) => r.migrate().await,
        }
    }

    async fn submit(&self, text: &str) -> Result<Submission> {
        match &self {
            Repository::Sql(r) => r.submit(text).await,
            Repository::Memory(r) => r.submit(text).await,
        }
    }

    async fn latest(&self) -> Result<Option<CommandRecord>> {
        match &self {
            Repository::Sql(r) => r.latest().await,
            Repository::Memory(r) => r.latest().await,
        }
    }

    async fn list(&self) -> Result<Vec<CommandRecord>> {
        match &self {
            Repository::Sql(r) => r.list().await,
            Repository::Memory(r) => r.list().await,
        }
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool> {
        match &self {
            Repository::Sql(r) => r.delete_by_id(id).await,
            Repository::Memory(r) => r.delete_by_id(id).await,
        }
    }

    async fn count(&self) -> Result<usize> {
        match &self {
            Repository::Sql(r) => r.count().await,
            Repository::Memory(r) => r.count().await,
        }
    }

    async fn close(&self) {
        match &self {
            Repository::Sql(r) => r.close().await,
            Repository::Memory(r) => r.close().await,
        }
    }
}
