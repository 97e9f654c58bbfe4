use std::sync::Arc;

use crate::account::AccountService;
use crate::config::{self, StorageKind};
use crate::error;
use crate::sec;
use crate::storage::{MemoryStore, PgStore, Store};

pub mod db;

#[derive(Debug)]
pub struct Shared {
    accounts: AccountService<Store>,
}

pub type ArcShared = Arc<Shared>;

impl Shared {
    pub fn from_config(config: &config::Config) -> error::Result<Shared> {
        tracing::debug!("creating Shared state");

        let store = match config.settings.storage.kind {
            StorageKind::Memory => {
                tracing::info!("using in memory user store");

                Store::Memory(MemoryStore::new())
            },
            StorageKind::Postgres => {
                tracing::info!("using postgres user store");

                Store::Postgres(PgStore::new(db::from_config(config)?))
            }
        };

        Ok(Shared {
            accounts: AccountService::new(
                store,
                sec::state::Sec::from_config(config)?,
                config.settings.storage.timeout,
            ),
        })
    }

    /// prepares the configured store for use
    pub async fn setup(&self) -> error::Result<()> {
        if let Store::Postgres(pg) = self.accounts.store() {
            pg.setup().await?;
        }

        Ok(())
    }

    pub fn accounts(&self) -> &AccountService<Store> {
        &self.accounts
    }

    #[inline]
    pub fn sec(&self) -> &sec::state::Sec {
        self.accounts.sec()
    }
}
