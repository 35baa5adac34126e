//! Command family entry points
//!
//! Every typed command family works over anything implementing
//! [`CommandTarget`]: a single-node [`CommandConnection`] (in any mode) or a
//! [`ClusterConnection`]. Families are reached through the [`Commands`]
//! extension trait:
//!
//! ```no_run
//! # use slotwise_client::{Client, Commands};
//! # async fn example(client: &Client) -> slotwise_client::Result<()> {
//! let mut conn = client.connection().await?;
//! conn.strings().set("greeting", "hello").await?;
//! let value: Option<String> = conn.strings().get("greeting").await?.done()?;
//! # Ok(())
//! # }
//! ```
//!
//! [`ClusterConnection`]: crate::cluster::ClusterConnection

use crate::cmd::Cmd;
use crate::connection::CommandConnection;
use crate::error::Result;
use crate::hash::HashManager;
use crate::keys::KeyManager;
use crate::kv::StringManager;
use crate::list::ListManager;
use crate::pipeline::Execution;
use crate::server::ServerManager;
use crate::set::SetManager;
use crate::sorted_set::SortedSetManager;
use crate::value::{FromValue, Value};
use async_trait::async_trait;

/// Something that can run a [`Cmd`]
#[async_trait]
pub trait CommandTarget: Send {
    async fn dispatch(&mut self, cmd: Cmd) -> Result<Execution<Value>>;
}

#[async_trait]
impl CommandTarget for CommandConnection {
    async fn dispatch(&mut self, cmd: Cmd) -> Result<Execution<Value>> {
        self.execute(cmd).await
    }
}

/// Typed command families for any [`CommandTarget`]
pub trait Commands: CommandTarget {
    fn strings(&mut self) -> StringManager<'_, Self> {
        StringManager::new(self)
    }

    fn hashes(&mut self) -> HashManager<'_, Self> {
        HashManager::new(self)
    }

    fn lists(&mut self) -> ListManager<'_, Self> {
        ListManager::new(self)
    }

    fn sets(&mut self) -> SetManager<'_, Self> {
        SetManager::new(self)
    }

    fn sorted_sets(&mut self) -> SortedSetManager<'_, Self> {
        SortedSetManager::new(self)
    }

    fn keys(&mut self) -> KeyManager<'_, Self> {
        KeyManager::new(self)
    }

    fn server(&mut self) -> ServerManager<'_, Self> {
        ServerManager::new(self)
    }
}

impl<T: CommandTarget + ?Sized> Commands for T {}

/// Dispatch and convert; shared by every family
pub(crate) async fn run<C, T>(target: &mut C, cmd: Cmd) -> Result<Execution<T>>
where
    C: CommandTarget + ?Sized,
    T: FromValue,
{
    target.dispatch(cmd).await?.convert()
}
