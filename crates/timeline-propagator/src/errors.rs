use thiserror::Error;

// Errores comunes del propagador de timelines.
//
// Centraliza los errores del almacén social (`DomainError`), del ledger de
// tareas (`LedgerError`), del despacho asíncrono y de la configuración.
#[derive(Error, Debug)]
pub enum PropagationError {
  /// Errores originados por el almacén social.
  #[error("Error de dominio: {0}")]
  Domain(#[from] social_domain::DomainError),

  /// Errores del ledger de tareas (incluye no poder registrar una tarea o un
  /// fallo).
  #[error("Error de ledger: {0}")]
  Ledger(#[from] task_ledger::LedgerError),

  /// La cola de trabajos está cerrada o el worker terminó sin responder.
  #[error("Error de despacho: {0}")]
  Dispatch(String),

  /// Valor de configuración inválido.
  #[error("Error de configuración: {0}")]
  Config(String),

  /// Error genérico.
  #[error("Otro error: {0}")]
  Other(String),
}

pub type Result<T> = std::result::Result<T, PropagationError>;
