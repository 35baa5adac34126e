//! List data structure operations

use crate::cmd::{Cmd, ToArg};
use crate::commands::{CommandTarget, run};
use crate::error::Result;
use crate::pipeline::Execution;
use crate::value::FromValue;

/// List data structure interface
pub struct ListManager<'a, C: ?Sized> {
    target: &'a mut C,
}

impl<'a, C: CommandTarget + ?Sized> ListManager<'a, C> {
    pub(crate) fn new(target: &'a mut C) -> Self {
        Self { target }
    }

    fn push_all<V: ToArg>(name: &str, key: impl ToArg, values: &[V]) -> Cmd {
        let mut cmd = Cmd::new(name).key(key);
        for value in values {
            cmd.push_arg(value);
        }
        cmd
    }

    /// Push elements to the head; returns the new length
    pub async fn lpush<V: ToArg>(self, key: impl ToArg, values: &[V]) -> Result<Execution<i64>> {
        run(self.target, Self::push_all("LPUSH", key, values)).await
    }

    /// Push elements to the tail; returns the new length
    pub async fn rpush<V: ToArg>(self, key: impl ToArg, values: &[V]) -> Result<Execution<i64>> {
        run(self.target, Self::push_all("RPUSH", key, values)).await
    }

    pub async fn lpop<T: FromValue>(self, key: impl ToArg) -> Result<Execution<T>> {
        run(self.target, Cmd::new("LPOP").key(key)).await
    }

    pub async fn rpop<T: FromValue>(self, key: impl ToArg) -> Result<Execution<T>> {
        run(self.target, Cmd::new("RPOP").key(key)).await
    }

    /// Elements between `start` and `stop` inclusive; negative indexes count
    /// from the tail
    pub async fn lrange<T: FromValue>(
        self,
        key: impl ToArg,
        start: i64,
        stop: i64,
    ) -> Result<Execution<Vec<T>>> {
        run(self.target, Cmd::new("LRANGE").key(key).arg(start).arg(stop)).await
    }

    pub async fn llen(self, key: impl ToArg) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("LLEN").key(key)).await
    }

    pub async fn lindex<T: FromValue>(self, key: impl ToArg, index: i64) -> Result<Execution<T>> {
        run(self.target, Cmd::new("LINDEX").key(key).arg(index)).await
    }

    /// Remove `count` occurrences of `value` (0 removes all)
    pub async fn lrem(self, key: impl ToArg, count: i64, value: impl ToArg) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("LREM").key(key).arg(count).arg(value)).await
    }

    pub async fn ltrim(self, key: impl ToArg, start: i64, stop: i64) -> Result<Execution<()>> {
        run(self.target, Cmd::new("LTRIM").key(key).arg(start).arg(stop)).await
    }
}
