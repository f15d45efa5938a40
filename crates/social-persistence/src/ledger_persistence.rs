use crate::db::{Database, DbConn};
use crate::schema::{ledger_hashes, ledger_sets};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use std::collections::HashMap;
use task_ledger::{LedgerBackend, LedgerError, Result};

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = ledger_sets)]
struct SetRow {
  pub set_key: String,
  pub member: String,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = ledger_hashes)]
struct HashRow {
  pub hash_key: String,
  pub field: String,
  pub value: String,
}

fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T> {
  res.map_err(|e| LedgerError::Storage(format!("db: {}", e)))
}

/// Backend del ledger sobre las tablas `ledger_sets` y `ledger_hashes`.
///
/// Cada llamada toma una conexión del pool; no mantiene conexiones abiertas
/// entre llamadas.
#[derive(Clone)]
pub struct DieselLedgerBackend {
  db: Database,
}

impl DieselLedgerBackend {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  fn with_conn<T, F>(&self, f: F) -> Result<T>
    where F: FnOnce(&mut DbConn) -> QueryResult<T>
  {
    let mut conn = self.db.conn().map_err(|e| LedgerError::Storage(e.to_string()))?;
    map_db_err(f(&mut *conn))
  }
}

impl LedgerBackend for DieselLedgerBackend {
  fn sadd(&self, key: &str, member: &str) -> Result<bool> {
    let row = SetRow { set_key: key.to_string(), member: member.to_string() };
    let n = self.with_conn(|c| diesel::insert_or_ignore_into(ledger_sets::table).values(&row).execute(c))?;
    Ok(n > 0)
  }

  fn srem(&self, key: &str, member: &str) -> Result<bool> {
    let n = self.with_conn(|c| diesel::delete(ledger_sets::table.find((key, member))).execute(c))?;
    Ok(n > 0)
  }

  fn smembers(&self, key: &str) -> Result<Vec<String>> {
    self.with_conn(|c| {
          ledger_sets::table.filter(ledger_sets::set_key.eq(key))
                            .select(ledger_sets::member)
                            .order(ledger_sets::member.asc())
                            .load(c)
        })
  }

  fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
    let rows: Vec<HashRow> = fields.iter()
                                   .map(|(f, v)| HashRow { hash_key: key.to_string(), field: f.clone(), value: v.clone() })
                                   .collect();
    self.with_conn(|c| {
          c.transaction::<_, DieselError, _>(|c| {
             for r in rows.iter() {
               diesel::replace_into(ledger_hashes::table).values(r).execute(c)?;
             }
             Ok(())
           })
        })
  }

  fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
    self.with_conn(|c| {
          ledger_hashes::table.find((key, field))
                              .select(ledger_hashes::value)
                              .first::<String>(c)
                              .optional()
        })
  }

  fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
    let rows = self.with_conn(|c| ledger_hashes::table.filter(ledger_hashes::hash_key.eq(key)).load::<HashRow>(c))?;
    Ok(rows.into_iter().map(|r| (r.field, r.value)).collect())
  }

  fn hdel(&self, key: &str, field: &str) -> Result<bool> {
    let n = self.with_conn(|c| diesel::delete(ledger_hashes::table.find((key, field))).execute(c))?;
    Ok(n > 0)
  }

  fn del(&self, key: &str) -> Result<()> {
    self.with_conn(|c| {
          c.transaction::<_, DieselError, _>(|c| {
             diesel::delete(ledger_sets::table.filter(ledger_sets::set_key.eq(key))).execute(c)?;
             diesel::delete(ledger_hashes::table.filter(ledger_hashes::hash_key.eq(key))).execute(c)?;
             Ok(())
           })
        })
  }
}
