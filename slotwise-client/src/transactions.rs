//! Transaction outcomes (MULTI/EXEC/WATCH/DISCARD)
//!
//! Transactions are driven through [`CommandConnection`]:
//!
//! ```no_run
//! # use slotwise_client::{Client, Commands, TransactionOutcome};
//! # async fn example(client: &Client) -> slotwise_client::Result<()> {
//! let mut conn = client.connection().await?;
//! conn.watch(&["balance"]).await?;
//! conn.begin_transaction()?;
//! let incremented = conn.strings().incr_by("balance", 10).await?.pending()?;
//! match conn.commit().await? {
//!     TransactionOutcome::Committed(results) => {
//!         println!("balance is now {}", results.get(&incremented)?);
//!     }
//!     TransactionOutcome::Aborted => println!("balance changed, retry"),
//! }
//! client.release(conn).await;
//! # Ok(())
//! # }
//! ```
//!
//! [`CommandConnection`]: crate::connection::CommandConnection

use crate::pipeline::BatchResults;

/// Result returned by a commit
#[derive(Debug, Clone)]
pub enum TransactionOutcome {
    /// EXEC ran; per-command failures stay in their own slot
    Committed(BatchResults),
    /// A watched key changed; nothing was applied
    Aborted,
}

impl TransactionOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, TransactionOutcome::Aborted)
    }

    pub fn results(&self) -> Option<&BatchResults> {
        match self {
            TransactionOutcome::Committed(results) => Some(results),
            TransactionOutcome::Aborted => None,
        }
    }

    pub fn into_results(self) -> Option<BatchResults> {
        match self {
            TransactionOutcome::Committed(results) => Some(results),
            TransactionOutcome::Aborted => None,
        }
    }
}
