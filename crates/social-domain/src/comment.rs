// comment.rs
use crate::{CommentId, DomainError, PostId, UserId};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
  pub id: CommentId,
  pub post: PostId,
  pub author: UserId,
  pub message: String,
  pub created: DateTime<Utc>,
}

impl Comment {
  pub fn new(post: PostId, author: UserId, message: &str) -> Result<Self, DomainError> {
    if message.trim().is_empty() {
      return Err(DomainError::ValidationError("El comentario no puede estar vacío".to_string()));
    }
    Ok(Self { id: Uuid::new_v4(),
              post,
              author,
              message: message.trim().to_string(),
              created: Utc::now().trunc_subsecs(3) })
  }
}
