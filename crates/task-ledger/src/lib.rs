//! Crate `task-ledger` — registro durable de tareas de propagación
//!
//! Cada propagación de timeline se registra como una tarea (`TaskSpec`)
//! antes de ejecutarse. Las sub-operaciones que fallan se anotan como
//! `FailedOp` bajo la tarea, con lo justo para reintentarlas por separado;
//! cuando no queda ninguna pendiente la tarea se elimina del ledger.
//!
//! Diseño resumido:
//! - `TaskLedger` es el contrato que consume el propagador.
//! - `KvTaskLedger` lo implementa una sola vez sobre cualquier
//!   `LedgerBackend` (conjuntos y hashes, al estilo Redis).
//! - `InMemoryLedgerBackend` sirve para pruebas; la persistencia SQLite vive
//!   en `social-persistence`.
//!
//! Ejemplo rápido:
//! ```rust
//! use task_ledger::{InMemoryTaskLedger, TaskLedger};
//! let ledger = InMemoryTaskLedger::in_memory();
//! assert!(ledger.push_task_args("create_post", &[]).is_empty());
//! ```
pub mod domain;
pub mod errors;
pub mod keys;
pub mod ledger;
pub mod repository;
pub mod stubs;

pub use domain::*;
pub use errors::*;
pub use ledger::*;
pub use repository::*;
pub use stubs::*;
