//! Set data structure operations

use crate::cmd::{Cmd, ToArg};
use crate::commands::{CommandTarget, run};
use crate::error::Result;
use crate::pipeline::Execution;
use crate::value::FromValue;

/// Set data structure interface
///
/// Unordered collections of unique members. The multi-key operations
/// (`sinter`, `sunion`, `sdiff`) require every key in one hash slot when run
/// against a cluster.
pub struct SetManager<'a, C: ?Sized> {
    target: &'a mut C,
}

fn with_members<M: ToArg>(mut cmd: Cmd, members: &[M]) -> Cmd {
    for member in members {
        cmd.push_arg(member);
    }
    cmd
}

fn with_keys<K: ToArg>(mut cmd: Cmd, keys: &[K]) -> Cmd {
    for key in keys {
        cmd.push_key(key);
    }
    cmd
}

impl<'a, C: CommandTarget + ?Sized> SetManager<'a, C> {
    pub(crate) fn new(target: &'a mut C) -> Self {
        Self { target }
    }

    /// Add members; returns how many were new
    pub async fn sadd<M: ToArg>(self, key: impl ToArg, members: &[M]) -> Result<Execution<i64>> {
        run(self.target, with_members(Cmd::new("SADD").key(key), members)).await
    }

    pub async fn srem<M: ToArg>(self, key: impl ToArg, members: &[M]) -> Result<Execution<i64>> {
        run(self.target, with_members(Cmd::new("SREM").key(key), members)).await
    }

    pub async fn smembers<T: FromValue>(self, key: impl ToArg) -> Result<Execution<Vec<T>>> {
        run(self.target, Cmd::new("SMEMBERS").key(key)).await
    }

    pub async fn sismember(self, key: impl ToArg, member: impl ToArg) -> Result<Execution<bool>> {
        run(self.target, Cmd::new("SISMEMBER").key(key).arg(member)).await
    }

    pub async fn scard(self, key: impl ToArg) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("SCARD").key(key)).await
    }

    /// Remove and return a random member
    pub async fn spop<T: FromValue>(self, key: impl ToArg) -> Result<Execution<T>> {
        run(self.target, Cmd::new("SPOP").key(key)).await
    }

    pub async fn sinter<T: FromValue, K: ToArg>(self, keys: &[K]) -> Result<Execution<Vec<T>>> {
        run(self.target, with_keys(Cmd::new("SINTER"), keys)).await
    }

    pub async fn sunion<T: FromValue, K: ToArg>(self, keys: &[K]) -> Result<Execution<Vec<T>>> {
        run(self.target, with_keys(Cmd::new("SUNION"), keys)).await
    }

    pub async fn sdiff<T: FromValue, K: ToArg>(self, keys: &[K]) -> Result<Execution<Vec<T>>> {
        run(self.target, with_keys(Cmd::new("SDIFF"), keys)).await
    }
}
