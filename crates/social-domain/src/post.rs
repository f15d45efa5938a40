// post.rs
use crate::{PostId, PrivacySettings, UserId};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Modelo de lectura de un post. Sólo incluye los campos que necesita la
/// propagación de timelines; el contenido (texto, fotos, enlaces) vive en la
/// capa de handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
  pub id: PostId,
  pub author: UserId,
  pub created: DateTime<Utc>,
  pub privacy: PrivacySettings,
}

impl Post {
  pub fn new(author: UserId, privacy: PrivacySettings) -> Self {
    // La persistencia guarda milisegundos; truncamos para que el valor
    // leído de vuelta sea idéntico.
    Self { id: Uuid::new_v4(), author, created: Utc::now().trunc_subsecs(3), privacy }
  }

  pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
    self.created = created.trunc_subsecs(3);
    self
  }
}
