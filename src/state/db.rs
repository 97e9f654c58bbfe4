use tokio_postgres::{Config, NoTls};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};

use crate::config;

pub const MAX_POOL_SIZE: usize = 4;

/// builds the connection pool for the postgres store. connection and pool
/// waits are bounded by the storage timeout
pub fn from_config(config: &config::Config) -> Result<Pool, deadpool_postgres::BuildError> {
    let db = &config.settings.db;
    let timeout = config.settings.storage.timeout;
    let mut pg_config = Config::new();

    pg_config.user(db.user.as_str());

    if let Some(password) = &db.password {
        pg_config.password(password.as_str());
    }

    pg_config.host(db.host.as_str());
    pg_config.port(db.port);
    pg_config.dbname(db.dbname.as_str());
    pg_config.connect_timeout(timeout);

    let manager_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let manager = Manager::from_config(pg_config, NoTls, manager_config);

    tracing::debug!(
        host = %db.host,
        port = db.port,
        dbname = %db.dbname,
        "creating postgres pool"
    );

    Pool::builder(manager)
        .max_size(MAX_POOL_SIZE)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(timeout))
        .build()
}
