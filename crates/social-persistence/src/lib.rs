//! Persistencia SQLite (Diesel + r2d2) del almacén social y del ledger de
//! tareas. Expone el módulo `schema`, la base de datos compartida
//! (`Database`), el conector de sesiones (`DieselSocialStore`) y el backend
//! del ledger (`DieselLedgerBackend`).

mod db;
mod ledger_persistence;
pub mod schema;
mod social_persistence;

pub use db::{new_from_env, Database, MIGRATIONS};
pub use ledger_persistence::DieselLedgerBackend;
pub use social_persistence::{DieselSession, DieselSocialStore};
