//! Server commands
//!
//! Against a cluster, `flush_db`, `flush_all`, `save`, `bg_save`,
//! `config_set` and `ping` run on every master and succeed only when every
//! master does; `db_size` is summed and `last_save` is the latest. Use
//! [`ClusterConnection`](crate::cluster::ClusterConnection) fan-out methods
//! for per-node outcomes.

use crate::cmd::{Cmd, ToArg};
use crate::commands::{CommandTarget, run};
use crate::error::Result;
use crate::pipeline::Execution;
use crate::value::FromValue;
use std::collections::HashMap;

pub struct ServerManager<'a, C: ?Sized> {
    target: &'a mut C,
}

impl<'a, C: CommandTarget + ?Sized> ServerManager<'a, C> {
    pub(crate) fn new(target: &'a mut C) -> Self {
        Self { target }
    }

    pub async fn ping(self) -> Result<Execution<String>> {
        run(self.target, Cmd::new("PING")).await
    }

    pub async fn echo<T: FromValue>(self, message: impl ToArg) -> Result<Execution<T>> {
        run(self.target, Cmd::new("ECHO").arg(message)).await
    }

    pub async fn db_size(self) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("DBSIZE")).await
    }

    pub async fn flush_db(self) -> Result<Execution<()>> {
        run(self.target, Cmd::new("FLUSHDB")).await
    }

    pub async fn flush_all(self) -> Result<Execution<()>> {
        run(self.target, Cmd::new("FLUSHALL")).await
    }

    /// INFO text, optionally for one section
    pub async fn info(self, section: Option<&str>) -> Result<Execution<String>> {
        let mut cmd = Cmd::new("INFO");
        if let Some(section) = section {
            cmd.push_arg(section);
        }
        run(self.target, cmd).await
    }

    /// Configuration parameters matching `pattern`
    pub async fn config_get(
        self,
        pattern: impl ToArg,
    ) -> Result<Execution<HashMap<String, String>>> {
        run(self.target, Cmd::new("CONFIG").arg("GET").arg(pattern)).await
    }

    pub async fn config_set(self, parameter: impl ToArg, value: impl ToArg) -> Result<Execution<()>> {
        run(
            self.target,
            Cmd::new("CONFIG").arg("SET").arg(parameter).arg(value),
        )
        .await
    }

    pub async fn save(self) -> Result<Execution<()>> {
        run(self.target, Cmd::new("SAVE")).await
    }

    pub async fn bg_save(self) -> Result<Execution<()>> {
        run(self.target, Cmd::new("BGSAVE")).await
    }

    /// Unix time of the last successful save
    pub async fn last_save(self) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("LASTSAVE")).await
    }

    /// Server time as `[seconds, microseconds]`
    pub async fn time(self) -> Result<Execution<Vec<i64>>> {
        run(self.target, Cmd::new("TIME")).await
    }

    /// Switch database. Only database 0 exists on a cluster.
    pub async fn select(self, database: u32) -> Result<Execution<()>> {
        run(self.target, Cmd::new("SELECT").arg(database)).await
    }
}
