// follow.rs
use crate::UserId;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Arista del grafo social: `from` sigue a `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Follow {
  pub id: Uuid,
  #[serde(rename = "user_from")]
  pub from: UserId,
  #[serde(rename = "user_to")]
  pub to: UserId,
  pub time: DateTime<Utc>,
}

impl Follow {
  pub fn new(from: UserId, to: UserId) -> Self {
    Self { id: Uuid::new_v4(), from, to, time: Utc::now().trunc_subsecs(3) }
  }
}

/// Consulta mínima sobre el grafo de seguidores que necesita la evaluación
/// de privacidad.
pub trait FollowGraph {
  /// `true` si `from` sigue a `to`.
  fn follows(&self, from: &UserId, to: &UserId) -> Result<bool, crate::DomainError>;
}
