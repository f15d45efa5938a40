// Archivo: keys.rs
// Propósito: esquema de claves del ledger sobre un backend tipo Redis
// (conjuntos y hashes).
use crate::domain::{FailId, TaskId, TaskKind};

/// Conjunto de ids de tareas vivas.
pub const TASKS: &str = "tasks";
/// Hash id de tarea -> tipo, para localizar `kind:id` desde un id suelto.
pub const TASK_INDEX: &str = "task_index";
/// Conjunto de operaciones fallidas abandonadas tras agotar reintentos.
pub const DEAD_OPS: &str = "task_op_dead";

/// Hash de atributos de la tarea.
pub fn task(kind: TaskKind, id: &TaskId) -> String {
    format!("{}:{}", kind.as_str(), id)
}

/// Conjunto de fallos pendientes de la tarea.
pub fn fail_set(kind: TaskKind, id: &TaskId) -> String {
    format!("{}:{}:fail", kind.as_str(), id)
}

/// Hash de una operación fallida.
pub fn failed_op(id: &FailId) -> String {
    format!("task_op_fail:{}", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn key_layout() {
        let id = TaskId(Uuid::nil());
        assert_eq!(task(TaskKind::PostLike, &id), "post_like:00000000-0000-0000-0000-000000000000");
        assert!(fail_set(TaskKind::DeleteUser, &id).starts_with("delete_user:"));
        assert!(fail_set(TaskKind::DeleteUser, &id).ends_with(":fail"));
        assert!(failed_op(&FailId(Uuid::nil())).starts_with("task_op_fail:"));
    }
}
