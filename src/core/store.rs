// logfacts - core/store.rs
//
// The fact store contract. Statements are self-contained SQL strings with
// inlined, quoted values; there is no parameter binding. Implementations
// live in the platform layer.

use crate::util::error::StoreError;
use std::time::Duration;

/// A single result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Real(r) => Some(*r as i64),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// One result row, cells in select-list order.
pub type Row = Vec<Value>;

/// Where facts and project metadata are written.
pub trait FactStore: Send + Sync {
    /// Execute one statement; returns the number of affected rows.
    fn execute_write(&self, statement: &str) -> Result<usize, StoreError>;

    /// Run a query and collect every row.
    fn execute_query(&self, statement: &str) -> Result<Vec<Row>, StoreError>;

    /// `MAX(column)` over `table` rows matching `filter` (a SQL boolean
    /// expression, empty for all rows). `Value::Null` when no row matches.
    fn max_value(&self, table: &str, column: &str, filter: &str) -> Result<Value, StoreError> {
        let statement = if filter.trim().is_empty() {
            format!("SELECT MAX({column}) FROM {table}")
        } else {
            format!("SELECT MAX({column}) FROM {table} WHERE {filter}")
        };
        Ok(self
            .execute_query(&statement)?
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or(Value::Null))
    }

    /// Execute several statements as one unit where the store supports it.
    /// Returns the total number of affected rows.
    fn execute_batch(&self, statements: &[String]) -> Result<usize, StoreError> {
        let mut affected = 0;
        for statement in statements {
            affected += self.execute_write(statement)?;
        }
        Ok(affected)
    }
}

impl std::fmt::Debug for dyn FactStore + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FactStore")
    }
}

// =============================================================================
// Retry with backoff
// =============================================================================

/// Capped exponential backoff for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; 1 disables retrying.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        use crate::util::constants::{
            DEFAULT_WRITE_ATTEMPTS, DEFAULT_WRITE_RETRY_DELAY_MS, MAX_WRITE_RETRY_DELAY_MS,
        };
        Self {
            max_attempts: DEFAULT_WRITE_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_WRITE_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_WRITE_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): doubles each time, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut retry = 0;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && retry + 1 < self.max_attempts => {
                    let delay = self.delay_for(retry);
                    tracing::debug!(
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient store failure, retrying"
                    );
                    std::thread::sleep(delay);
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Wraps a store so every call is retried under a `RetryPolicy`.
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: FactStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: FactStore> FactStore for RetryingStore<S> {
    fn execute_write(&self, statement: &str) -> Result<usize, StoreError> {
        self.policy.run(|| self.inner.execute_write(statement))
    }

    fn execute_query(&self, statement: &str) -> Result<Vec<Row>, StoreError> {
        self.policy.run(|| self.inner.execute_query(statement))
    }

    fn max_value(&self, table: &str, column: &str, filter: &str) -> Result<Value, StoreError> {
        self.policy.run(|| self.inner.max_value(table, column, filter))
    }

    fn execute_batch(&self, statements: &[String]) -> Result<usize, StoreError> {
        self.policy.run(|| self.inner.execute_batch(statements))
    }
}

impl<S: FactStore + ?Sized> FactStore for std::sync::Arc<S> {
    fn execute_write(&self, statement: &str) -> Result<usize, StoreError> {
        (**self).execute_write(statement)
    }

    fn execute_query(&self, statement: &str) -> Result<Vec<Row>, StoreError> {
        (**self).execute_query(statement)
    }

    fn max_value(&self, table: &str, column: &str, filter: &str) -> Result<Value, StoreError> {
        (**self).max_value(table, column, filter)
    }

    fn execute_batch(&self, statements: &[String]) -> Result<usize, StoreError> {
        (**self).execute_batch(statements)
    }
}
