// timeline_entry.rs
use crate::{CommentId, Post, PostId, TimelineId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fila desnormalizada del timeline: un post visible para `owner`.
///
/// Existe como mucho una entrada por par (owner, post). `post_author`,
/// `liked` y `comments` se copian aquí para que leer el feed sea una única
/// consulta indexada por `owner`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
  pub id: TimelineId,
  #[serde(rename = "user_id")]
  pub owner: UserId,
  #[serde(rename = "post_id")]
  pub post: PostId,
  #[serde(rename = "post_user_id")]
  pub post_author: UserId,
  pub liked: bool,
  pub comments: Vec<CommentId>,
  pub time: DateTime<Utc>,
}

impl TimelineEntry {
  /// Construye la entrada de `post` para el timeline de `owner`. Cada
  /// entrada recibe su propio id.
  pub fn for_post(owner: UserId, post: &Post, liked: bool) -> Self {
    Self { id: Uuid::new_v4(),
           owner,
           post: post.id,
           post_author: post.author,
           liked,
           comments: Vec::new(),
           time: post.created }
  }
}

/// Resultado de la inserción condicional de una entrada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
  Inserted,
  /// Ya existía una entrada para (owner, post); no se escribe nada.
  AlreadyPresent,
  /// El post o el dueño del timeline ya no existen.
  SourceGone,
}
