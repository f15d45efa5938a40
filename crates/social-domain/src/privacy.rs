// privacy.rs
use crate::{DomainError, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Modo de control de acceso asociado a un post.
///
/// Los códigos numéricos (1..=8) se conservan porque son los que viajan en
/// los formularios y en las filas persistidas (`privacy_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PrivacyType {
  Public,
  FollowersOnly,
  FollowingOnly,
  None,
  AllBut,
  FollowersBut,
  FollowingBut,
  NoneBut,
}

impl PrivacyType {
  pub fn code(self) -> u8 {
    match self {
      PrivacyType::Public => 1,
      PrivacyType::FollowersOnly => 2,
      PrivacyType::FollowingOnly => 3,
      PrivacyType::None => 4,
      PrivacyType::AllBut => 5,
      PrivacyType::FollowersBut => 6,
      PrivacyType::FollowingBut => 7,
      PrivacyType::NoneBut => 8,
    }
  }

  pub fn from_code(code: u8) -> Result<Self, DomainError> {
    match code {
      1 => Ok(PrivacyType::Public),
      2 => Ok(PrivacyType::FollowersOnly),
      3 => Ok(PrivacyType::FollowingOnly),
      4 => Ok(PrivacyType::None),
      5 => Ok(PrivacyType::AllBut),
      6 => Ok(PrivacyType::FollowersBut),
      7 => Ok(PrivacyType::FollowingBut),
      8 => Ok(PrivacyType::NoneBut),
      other => Err(DomainError::ValidationError(format!("Tipo de privacidad inválido: {}", other))),
    }
  }

  /// Indica si el tipo usa la lista explícita de usuarios.
  pub fn uses_user_list(self) -> bool {
    matches!(self,
             PrivacyType::AllBut | PrivacyType::FollowersBut | PrivacyType::FollowingBut | PrivacyType::NoneBut)
  }
}

impl TryFrom<u8> for PrivacyType {
  type Error = DomainError;

  fn try_from(code: u8) -> Result<Self, Self::Error> {
    Self::from_code(code)
  }
}

impl From<PrivacyType> for u8 {
  fn from(t: PrivacyType) -> Self {
    t.code()
  }
}

impl fmt::Display for PrivacyType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}({})", self, self.code())
  }
}

/// Configuración de privacidad de un post: tipo + lista explícita de
/// usuarios (sólo relevante para los tipos "all but" / "none but").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
  #[serde(rename = "privacy_type")]
  pub kind: PrivacyType,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub users: Vec<UserId>,
}

impl PrivacySettings {
  pub fn new(kind: PrivacyType, users: Vec<UserId>) -> Result<Self, DomainError> {
    if !kind.uses_user_list() && !users.is_empty() {
      return Err(DomainError::ValidationError(format!("El tipo {} no admite lista de usuarios", kind)));
    }
    Ok(Self { kind, users })
  }

  pub fn public() -> Self {
    Self { kind: PrivacyType::Public, users: Vec::new() }
  }

  pub fn lists(&self, user: &UserId) -> bool {
    self.users.iter().any(|u| u == user)
  }
}

impl Default for PrivacySettings {
  fn default() -> Self {
    Self { kind: PrivacyType::None, users: Vec::new() }
  }
}
