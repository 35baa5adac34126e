//! Key space operations

use crate::cmd::{Cmd, ToArg};
use crate::commands::{CommandTarget, run};
use crate::error::Result;
use crate::pipeline::Execution;
use crate::value::FromValue;
use std::time::Duration;

/// Generic key commands
pub struct KeyManager<'a, C: ?Sized> {
    target: &'a mut C,
}

fn multi_key<K: ToArg>(name: &str, keys: &[K]) -> Cmd {
    let mut cmd = Cmd::new(name);
    for key in keys {
        cmd.push_key(key);
    }
    cmd
}

impl<'a, C: CommandTarget + ?Sized> KeyManager<'a, C> {
    pub(crate) fn new(target: &'a mut C) -> Self {
        Self { target }
    }

    /// Delete keys; returns how many existed
    pub async fn del<K: ToArg>(self, keys: &[K]) -> Result<Execution<i64>> {
        run(self.target, multi_key("DEL", keys)).await
    }

    /// Count how many of `keys` exist
    pub async fn exists<K: ToArg>(self, keys: &[K]) -> Result<Execution<i64>> {
        run(self.target, multi_key("EXISTS", keys)).await
    }

    /// Set a timeout in seconds; `false` if the key does not exist
    pub async fn expire(self, key: impl ToArg, ttl: Duration) -> Result<Execution<bool>> {
        run(self.target, Cmd::new("EXPIRE").key(key).arg(ttl.as_secs())).await
    }

    pub async fn pexpire(self, key: impl ToArg, ttl: Duration) -> Result<Execution<bool>> {
        run(self.target, Cmd::new("PEXPIRE").key(key).arg(ttl.as_millis() as u64)).await
    }

    /// Remaining seconds, -1 without expiry, -2 for a missing key
    pub async fn ttl(self, key: impl ToArg) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("TTL").key(key)).await
    }

    pub async fn pttl(self, key: impl ToArg) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("PTTL").key(key)).await
    }

    pub async fn persist(self, key: impl ToArg) -> Result<Execution<bool>> {
        run(self.target, Cmd::new("PERSIST").key(key)).await
    }

    /// Value type name (`string`, `hash`, ..., `none`)
    pub async fn key_type(self, key: impl ToArg) -> Result<Execution<String>> {
        run(self.target, Cmd::new("TYPE").key(key)).await
    }

    pub async fn rename(self, key: impl ToArg, new_key: impl ToArg) -> Result<Execution<()>> {
        run(self.target, Cmd::new("RENAME").key(key).key(new_key)).await
    }

    /// Keys matching a glob pattern. On a cluster this runs on every master.
    pub async fn keys<T: FromValue>(self, pattern: impl ToArg) -> Result<Execution<Vec<T>>> {
        run(self.target, Cmd::new("KEYS").arg(pattern)).await
    }

    pub async fn random_key<T: FromValue>(self) -> Result<Execution<T>> {
        run(self.target, Cmd::new("RANDOMKEY")).await
    }

    pub async fn touch<K: ToArg>(self, keys: &[K]) -> Result<Execution<i64>> {
        run(self.target, multi_key("TOUCH", keys)).await
    }

    pub async fn unlink<K: ToArg>(self, keys: &[K]) -> Result<Execution<i64>> {
        run(self.target, multi_key("UNLINK", keys)).await
    }
}
