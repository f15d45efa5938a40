// db.rs
//
// Pool de conexiones SQLite compartido por el almacén social y por el
// backend del ledger. Las migraciones están embebidas y se aplican al
// construir el pool.
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info};
use social_domain::DomainError;
use std::sync::Arc;

use crate::ledger_persistence::DieselLedgerBackend;
use crate::social_persistence::DieselSocialStore;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

pub(crate) type DbConn = SqliteConnection;
pub(crate) type DbPool = Pool<ConnectionManager<DbConn>>;
pub(crate) type PooledConn = PooledConnection<ConnectionManager<DbConn>>;

const DEFAULT_POOL_SIZE: u32 = 8;

/// Ajustes por conexión. `busy_timeout` es propio de cada conexión, así que
/// se aplica cada vez que el pool abre una.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<DbConn, diesel::r2d2::Error> for SqlitePragmas {
  fn on_acquire(&self, conn: &mut DbConn) -> Result<(), diesel::r2d2::Error> {
    conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA synchronous = NORMAL;")
        .map_err(diesel::r2d2::Error::QueryError)
  }
}

/// Base de datos SQLite con el esquema social y el del ledger.
#[derive(Clone)]
pub struct Database {
  pool: Arc<DbPool>,
}

impl Database {
  pub fn new(database_url: &str) -> Result<Self, DomainError> {
    Self::with_pool_size(database_url, DEFAULT_POOL_SIZE)
  }

  pub fn with_pool_size(database_url: &str, max_size: u32) -> Result<Self, DomainError> {
    let manager = ConnectionManager::<DbConn>::new(database_url);
    let pool = Pool::builder().max_size(max_size)
                              .connection_customizer(Box::new(SqlitePragmas))
                              .build(manager)
                              .map_err(|e| DomainError::ExternalError(format!("pool: {}", e)))?;
    let db = Database { pool: Arc::new(pool) };
    let mut c = db.conn()?;
    if let Err(e) = c.batch_execute("PRAGMA journal_mode = WAL;") {
      debug!("{} sigue sin WAL: {}", database_url, e);
    }
    let applied = c.run_pending_migrations(MIGRATIONS)
                   .map_err(|e| DomainError::ExternalError(format!("migraciones: {}", e)))?;
    if !applied.is_empty() {
      info!("{} migraciones aplicadas en {}", applied.len(), database_url);
    }
    debug!("pool SQLite listo ({} conexiones máx.)", max_size);
    Ok(db)
  }

  pub(crate) fn conn(&self) -> Result<PooledConn, DomainError> {
    self.pool.get().map_err(|e| DomainError::ExternalError(format!("pool: {}", e)))
  }

  /// Almacén social sobre este pool.
  pub fn social_store(&self) -> DieselSocialStore {
    DieselSocialStore::new(self.clone())
  }

  /// Backend del ledger sobre este pool.
  pub fn ledger_backend(&self) -> DieselLedgerBackend {
    DieselLedgerBackend::new(self.clone())
  }
}

/// Crea la base de datos desde el entorno: `TIMELINE_DB_URL`, luego
/// `DATABASE_URL`. En tests, sin ninguna de las dos, usa SQLite en memoria
/// con caché compartida.
pub fn new_from_env() -> Result<Database, DomainError> {
  dotenvy::dotenv().ok();
  let url = std::env::var("TIMELINE_DB_URL").or_else(|_| std::env::var("DATABASE_URL"));
  let url = match url {
    Ok(u) => u,
    Err(_) if cfg!(test) => "file:timelinedb?mode=memory&cache=shared".to_string(),
    Err(_) => return Err(DomainError::ExternalError("TIMELINE_DB_URL / DATABASE_URL not set".into())),
  };
  let l = url.to_lowercase();
  if l.starts_with("postgres") || l.starts_with("mysql") {
    return Err(DomainError::ExternalError("social-persistence sólo soporta SQLite".into()));
  }
  Database::new(&url)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn falls_back_to_shared_memory_database_in_tests() {
    std::env::remove_var("TIMELINE_DB_URL");
    std::env::remove_var("DATABASE_URL");
    let db = new_from_env().expect("db");
    assert!(db.conn().is_ok());
  }
}
