//! String (key-value) operations

use crate::cmd::{Cmd, ToArg};
use crate::commands::{CommandTarget, run};
use crate::error::Result;
use crate::pipeline::Execution;
use crate::value::FromValue;
use std::time::Duration;

/// String commands over any [`CommandTarget`]
pub struct StringManager<'a, C: ?Sized> {
    target: &'a mut C,
}

impl<'a, C: CommandTarget + ?Sized> StringManager<'a, C> {
    pub(crate) fn new(target: &'a mut C) -> Self {
        Self { target }
    }

    /// Get a value by key
    ///
    /// Request `Option<_>` to tell a missing key apart from an empty value.
    ///
    /// # Example
    /// ```no_run
    /// # use slotwise_client::{Client, Commands};
    /// # async fn example(client: &Client) -> slotwise_client::Result<()> {
    /// let mut conn = client.connection().await?;
    /// let name: Option<String> = conn.strings().get("user:1").await?.done()?;
    /// let raw = conn.strings().get::<Option<Vec<u8>>>("avatar:1").await?.done()?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get<T: FromValue>(self, key: impl ToArg) -> Result<Execution<T>> {
        run(self.target, Cmd::new("GET").key(key)).await
    }

    /// Set a key-value pair
    pub async fn set(self, key: impl ToArg, value: impl ToArg) -> Result<Execution<()>> {
        run(self.target, Cmd::new("SET").key(key).arg(value)).await
    }

    /// Set a value that expires after `ttl` (whole seconds, at least one)
    pub async fn set_ex(
        self,
        key: impl ToArg,
        value: impl ToArg,
        ttl: Duration,
    ) -> Result<Execution<()>> {
        let seconds = ttl.as_secs().max(1);
        run(
            self.target,
            Cmd::new("SET").key(key).arg(value).arg("EX").arg(seconds),
        )
        .await
    }

    /// Set only if the key does not exist; `true` when the value was written
    pub async fn set_nx(self, key: impl ToArg, value: impl ToArg) -> Result<Execution<bool>> {
        run(self.target, Cmd::new("SET").key(key).arg(value).arg("NX")).await
    }

    /// Set a new value and return the old one (GETSET)
    pub async fn get_set<T: FromValue>(
        self,
        key: impl ToArg,
        value: impl ToArg,
    ) -> Result<Execution<T>> {
        run(self.target, Cmd::new("GETSET").key(key).arg(value)).await
    }

    /// Get several values, in key order
    pub async fn mget<T: FromValue, K: ToArg>(self, keys: &[K]) -> Result<Execution<Vec<T>>> {
        let mut cmd = Cmd::new("MGET");
        for key in keys {
            cmd.push_key(key);
        }
        run(self.target, cmd).await
    }

    /// Set several key-value pairs
    pub async fn mset<K: ToArg, V: ToArg>(self, pairs: &[(K, V)]) -> Result<Execution<()>> {
        let mut cmd = Cmd::new("MSET");
        for (key, value) in pairs {
            cmd.push_key(key);
            cmd.push_arg(value);
        }
        run(self.target, cmd).await
    }

    pub async fn incr(self, key: impl ToArg) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("INCR").key(key)).await
    }

    pub async fn incr_by(self, key: impl ToArg, delta: i64) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("INCRBY").key(key).arg(delta)).await
    }

    pub async fn decr(self, key: impl ToArg) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("DECR").key(key)).await
    }

    pub async fn decr_by(self, key: impl ToArg, delta: i64) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("DECRBY").key(key).arg(delta)).await
    }

    /// Append to a value, returning the new length
    pub async fn append(self, key: impl ToArg, value: impl ToArg) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("APPEND").key(key).arg(value)).await
    }

    pub async fn strlen(self, key: impl ToArg) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("STRLEN").key(key)).await
    }
}
