// Archivo: errors.rs
// Propósito: definir los errores del ledger de tareas y el alias Result<T>
// usado por las APIs del crate.
use thiserror::Error;
/// Errores del ledger de tareas.
///
/// - `NotFound`: clave o registro inexistente.
/// - `InvalidArgs`: tipo de tarea desconocido o argumentos insuficientes.
/// - `Storage`: error del backend clave/valor.
/// - `Other`: cualquier otro error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Registro no encontrado (tarea, fallo o campo).
    #[error("No encontrado: {0}")]
    NotFound(String),
    /// Validación de tipo o aridad.
    #[error("Argumentos inválidos: {0}")]
    InvalidArgs(String),
    /// Error genérico de almacenamiento (BD, Redis, etc.).
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
    /// Otro tipo de error.
    #[error("Otro: {0}")]
    Other(String),
}
/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, LedgerError>;
