// user.rs
use crate::{DomainError, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: UserId,
  pub username: String,
}

impl User {
  pub fn new(username: &str) -> Result<Self, DomainError> {
    let username = username.trim();
    if username.is_empty() {
      return Err(DomainError::ValidationError("El nombre de usuario no puede estar vacío".to_string()));
    }
    Ok(Self { id: Uuid::new_v4(), username: username.to_string() })
  }
}
