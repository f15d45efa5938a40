// Archivo: repository.rs
// Propósito: definir el contrato del ledger de tareas (`TaskLedger`) y el
// del backend clave/valor sobre el que se implementa (`LedgerBackend`).
use crate::domain::{FailId, FailedOp, FailedOpRecord, LiveTask, TaskId, TaskKind, TaskSpec};
use crate::errors::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Primitivas de un almacén tipo Redis: conjuntos y hashes de cadenas.
///
/// Cada llamada es atómica por sí misma; el ledger compone varias y deshace
/// las anteriores cuando una posterior falla.
pub trait LedgerBackend: Send + Sync {
    /// Añade `member` al conjunto. Devuelve `true` si no estaba.
    fn sadd(&self, key: &str, member: &str) -> Result<bool>;
    /// Quita `member` del conjunto. Devuelve `true` si estaba.
    fn srem(&self, key: &str, member: &str) -> Result<bool>;
    fn smembers(&self, key: &str) -> Result<Vec<String>>;
    /// Escribe (o sobrescribe) los campos indicados del hash.
    fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()>;
    fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
    /// Hash completo; vacío si la clave no existe.
    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;
    fn hdel(&self, key: &str, field: &str) -> Result<bool>;
    /// Borra la clave (conjunto o hash). No falla si no existe.
    fn del(&self, key: &str) -> Result<()>;
}

impl<B: LedgerBackend + ?Sized> LedgerBackend for Arc<B> {
    fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        (**self).sadd(key, member)
    }

    fn srem(&self, key: &str, member: &str) -> Result<bool> {
        (**self).srem(key, member)
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>> {
        (**self).smembers(key)
    }

    fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        (**self).hset(key, fields)
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        (**self).hget(key, field)
    }

    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        (**self).hgetall(key)
    }

    fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        (**self).hdel(key, field)
    }

    fn del(&self, key: &str) -> Result<()> {
        (**self).del(key)
    }
}

/// Contrato del ledger de tareas de propagación.
///
/// `push_task*` y `push_fail*` siguen un contrato resultado-o-vacío: ante
/// cualquier error de validación o de almacenamiento devuelven el id vacío
/// (`is_empty()`), que el llamador debe comprobar.
pub trait TaskLedger: Send + Sync {
    /// Registra una tarea nueva y devuelve su id.
    fn push_task(&self, spec: &TaskSpec) -> TaskId;

    /// Forma posicional: valida el tipo y la aridad antes de escribir nada.
    fn push_task_args(&self, kind: &str, args: &[&str]) -> TaskId;

    /// Registra una sub-operación fallida bajo la tarea. Devuelve vacío si
    /// el id de tarea es vacío o la operación no corresponde al tipo.
    fn push_fail(&self, kind: TaskKind, task: &TaskId, op: &FailedOp) -> FailId;

    /// Forma posicional de `push_fail`. Devuelve vacío si `args` está vacío.
    fn push_fail_args(&self, kind: &str, task: &TaskId, args: &[&str]) -> FailId;

    /// Elimina la tarea, su conjunto de fallos y los hashes de cada fallo.
    /// Idempotente.
    fn task_done(&self, kind: TaskKind, task: &TaskId) -> Result<()>;

    /// Elimina un fallo resuelto y, si era el último, cierra la tarea.
    fn failed_op_solved(&self, kind: TaskKind, task: &TaskId, fail: &FailId) -> Result<()>;

    /// Tareas vivas con su carga.
    fn live_tasks(&self) -> Result<Vec<LiveTask>>;

    /// Fallos pendientes de una tarea.
    fn failed_ops(&self, kind: TaskKind, task: &TaskId) -> Result<Vec<FailedOpRecord>>;

    /// Anota un reintento fallido y programa el siguiente. Devuelve el número
    /// de intentos acumulados.
    fn record_failed_attempt(&self, fail: &FailId, error: &str, next_attempt_at: DateTime<Utc>) -> Result<u32>;

    /// Abandona un fallo: lo mueve a `task_op_dead`, lo quita de la tarea y
    /// cierra la tarea si no quedan fallos.
    fn bury_failed_op(&self, kind: TaskKind, task: &TaskId, fail: &FailId) -> Result<()>;

    /// Fallos abandonados, conservados para inspección.
    fn dead_ops(&self) -> Result<Vec<FailedOpRecord>>;
}
