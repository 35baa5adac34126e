//! Hash data structure operations

use crate::cmd::{Cmd, ToArg};
use crate::commands::{CommandTarget, run};
use crate::error::Result;
use crate::pipeline::Execution;
use crate::value::FromValue;

/// Hash data structure interface
///
/// Hash is a field-value map, ideal for storing objects.
pub struct HashManager<'a, C: ?Sized> {
    target: &'a mut C,
}

impl<'a, C: CommandTarget + ?Sized> HashManager<'a, C> {
    pub(crate) fn new(target: &'a mut C) -> Self {
        Self { target }
    }

    /// Set field in hash; returns the number of new fields
    pub async fn hset(
        self,
        key: impl ToArg,
        field: impl ToArg,
        value: impl ToArg,
    ) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("HSET").key(key).arg(field).arg(value)).await
    }

    /// Get field from hash
    pub async fn hget<T: FromValue>(self, key: impl ToArg, field: impl ToArg) -> Result<Execution<T>> {
        run(self.target, Cmd::new("HGET").key(key).arg(field)).await
    }

    /// Get several fields, in field order
    pub async fn hmget<T: FromValue, F: ToArg>(
        self,
        key: impl ToArg,
        fields: &[F],
    ) -> Result<Execution<Vec<T>>> {
        let mut cmd = Cmd::new("HMGET").key(key);
        for field in fields {
            cmd.push_arg(field);
        }
        run(self.target, cmd).await
    }

    /// Get all fields and values, e.g. as `HashMap<String, String>`
    pub async fn hgetall<T: FromValue>(self, key: impl ToArg) -> Result<Execution<T>> {
        run(self.target, Cmd::new("HGETALL").key(key)).await
    }

    /// Delete fields from hash
    pub async fn hdel<F: ToArg>(self, key: impl ToArg, fields: &[F]) -> Result<Execution<i64>> {
        let mut cmd = Cmd::new("HDEL").key(key);
        for field in fields {
            cmd.push_arg(field);
        }
        run(self.target, cmd).await
    }

    pub async fn hexists(self, key: impl ToArg, field: impl ToArg) -> Result<Execution<bool>> {
        run(self.target, Cmd::new("HEXISTS").key(key).arg(field)).await
    }

    pub async fn hlen(self, key: impl ToArg) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("HLEN").key(key)).await
    }

    pub async fn hkeys<T: FromValue>(self, key: impl ToArg) -> Result<Execution<Vec<T>>> {
        run(self.target, Cmd::new("HKEYS").key(key)).await
    }

    pub async fn hvals<T: FromValue>(self, key: impl ToArg) -> Result<Execution<Vec<T>>> {
        run(self.target, Cmd::new("HVALS").key(key)).await
    }

    /// Increment field by integer
    pub async fn hincr_by(
        self,
        key: impl ToArg,
        field: impl ToArg,
        delta: i64,
    ) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("HINCRBY").key(key).arg(field).arg(delta)).await
    }
}
