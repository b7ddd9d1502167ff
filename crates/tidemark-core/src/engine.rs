//! The storage engine seam.

use async_trait::async_trait;

use crate::command::Command;
use crate::error::EngineResult;
use crate::value::{Row, Value};

/// Executes commands against a TimescaleDB-compatible engine.
///
/// Implementations must be thread-safe (`Send + Sync`). Each call is a
/// single request; engine errors are returned verbatim.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run a command and return every result row in order.
    async fn run(&self, command: &Command) -> EngineResult<Vec<Row>>;

    /// Run a command and return the first column of the first row, or
    /// [`Value::Null`] when there are no rows.
    async fn fetch_scalar(&self, command: &Command) -> EngineResult<Value> {
        let rows = self.run(command).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map_or(Value::Null, |(_, value)| value))
    }
}

#[async_trait]
impl<E: Engine + ?Sized> Engine for std::sync::Arc<E> {
    async fn run(&self, command: &Command) -> EngineResult<Vec<Row>> {
        (**self).run(command).await
    }
}
