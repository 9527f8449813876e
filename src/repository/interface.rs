use super::entities::{CommandRecord, Submission};
use crate::error::Result;

/// CommandRepository provides full functionality of the command store.
///
/// `submit` is one atomic unit of work: the lookup by text, the insert or
/// timestamp refresh, the capacity check and the eviction either all apply
/// or none do.
///
pub trait CommandRepository: Send + Sync + Clone {
    async fn migrate(&mut self) -> Result<()>;
    async fn submit(&self, text: &str) -> Result<Submission>;
    async fn latest(&self) -> Result<Option<CommandRecord>>;
    async fn list(&self) -> Result<Vec<CommandRecord>>;
    async fn delete_by_id(&self, id: i64) -> Result<bool>;
    async fn count(&self) -> Result<usize>;
    async fn close(&self);
}
