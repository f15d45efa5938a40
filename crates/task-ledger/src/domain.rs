// Archivo: domain.rs
// Propósito: tipos del ledger. Tipos de tarea y su aridad, identificadores
// con centinela vacío, la carga tipada de cada tarea (`TaskSpec`) y la
// operación fallida reintentable (`FailedOp`). Todos se serializan a pares
// campo/valor para guardarse como hashes en el backend.
use crate::errors::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! ledger_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Genera un id nuevo (v4).
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Centinela "id vacío" devuelto por las operaciones que fallan.
            pub fn empty() -> Self {
                Self(Uuid::nil())
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self> {
                parse_uuid(stringify!($name), s).map(Self)
            }
        }
    };
}

ledger_id!(
    /// Identificador de una tarea de propagación.
    TaskId
);
ledger_id!(
    /// Identificador de una sub-operación fallida.
    FailId
);

/// Tipos de tarea. El nombre textual forma parte del esquema de claves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CreatePost,
    FollowUser,
    UnfollowUser,
    PostDelete,
    PostLike,
    CreateComment,
    DeleteComment,
    DeleteUser,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [TaskKind::CreatePost,
                                    TaskKind::FollowUser,
                                    TaskKind::UnfollowUser,
                                    TaskKind::PostDelete,
                                    TaskKind::PostLike,
                                    TaskKind::CreateComment,
                                    TaskKind::DeleteComment,
                                    TaskKind::DeleteUser];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::CreatePost => "create_post",
            TaskKind::FollowUser => "follow_user",
            TaskKind::UnfollowUser => "unfollow_user",
            TaskKind::PostDelete => "post_delete",
            TaskKind::PostLike => "post_like",
            TaskKind::CreateComment => "create_comment",
            TaskKind::DeleteComment => "delete_comment",
            TaskKind::DeleteUser => "delete_user",
        }
    }

    /// Número mínimo de argumentos que exige la forma posicional.
    pub fn min_args(self) -> usize {
        match self {
            TaskKind::CreatePost | TaskKind::PostLike => 3,
            TaskKind::FollowUser | TaskKind::UnfollowUser | TaskKind::CreateComment | TaskKind::DeleteComment => 2,
            TaskKind::PostDelete | TaskKind::DeleteUser => 1,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        TaskKind::ALL.iter()
                     .copied()
                     .find(|k| k.as_str() == s)
                     .ok_or_else(|| LedgerError::InvalidArgs(format!("tipo de tarea desconocido: '{}'", s)))
    }
}

/// Carga tipada de una tarea: una variante por tipo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskSpec {
    /// `refresh` marca un cambio de privacidad: la reejecución purga antes
    /// de volver a propagar.
    CreatePost { post: Uuid, author: Uuid, created: DateTime<Utc>, refresh: bool },
    FollowUser { follower: Uuid, followed: Uuid },
    UnfollowUser { follower: Uuid, unfollowed: Uuid },
    PostDelete { post: Uuid },
    PostLike { user: Uuid, post: Uuid, liked: bool },
    CreateComment { post: Uuid, comment: Uuid },
    DeleteComment { post: Uuid, comment: Uuid },
    DeleteUser { user: Uuid },
}

impl TaskSpec {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskSpec::CreatePost { .. } => TaskKind::CreatePost,
            TaskSpec::FollowUser { .. } => TaskKind::FollowUser,
            TaskSpec::UnfollowUser { .. } => TaskKind::UnfollowUser,
            TaskSpec::PostDelete { .. } => TaskKind::PostDelete,
            TaskSpec::PostLike { .. } => TaskKind::PostLike,
            TaskSpec::CreateComment { .. } => TaskKind::CreateComment,
            TaskSpec::DeleteComment { .. } => TaskKind::DeleteComment,
            TaskSpec::DeleteUser { .. } => TaskKind::DeleteUser,
        }
    }

    /// Construye la carga a partir de la forma posicional. Falla si faltan
    /// argumentos para el tipo o si alguno no se puede interpretar.
    pub fn from_args(kind: TaskKind, args: &[&str]) -> Result<Self> {
        if args.len() < kind.min_args() {
            return Err(LedgerError::InvalidArgs(format!("{} requiere {} argumentos, recibió {}",
                                                        kind,
                                                        kind.min_args(),
                                                        args.len())));
        }
        let spec = match kind {
            TaskKind::CreatePost => TaskSpec::CreatePost { post: parse_uuid("post", args[0])?,
                                                           author: parse_uuid("author", args[1])?,
                                                           created: parse_millis("created", args[2])?,
                                                           refresh: match args.get(3) {
                                                               Some(raw) => parse_bool("refresh", raw)?,
                                                               None => false,
                                                           } },
            TaskKind::FollowUser => TaskSpec::FollowUser { follower: parse_uuid("follower", args[0])?,
                                                           followed: parse_uuid("followed", args[1])? },
            TaskKind::UnfollowUser => TaskSpec::UnfollowUser { follower: parse_uuid("follower", args[0])?,
                                                               unfollowed: parse_uuid("unfollowed", args[1])? },
            TaskKind::PostDelete => TaskSpec::PostDelete { post: parse_uuid("post", args[0])? },
            TaskKind::PostLike => TaskSpec::PostLike { user: parse_uuid("user", args[0])?,
                                                       post: parse_uuid("post", args[1])?,
                                                       liked: parse_bool("liked", args[2])? },
            TaskKind::CreateComment => TaskSpec::CreateComment { post: parse_uuid("post", args[0])?,
                                                                 comment: parse_uuid("comment", args[1])? },
            TaskKind::DeleteComment => TaskSpec::DeleteComment { post: parse_uuid("post", args[0])?,
                                                                 comment: parse_uuid("comment", args[1])? },
            TaskKind::DeleteUser => TaskSpec::DeleteUser { user: parse_uuid("user", args[0])? },
        };
        Ok(spec)
    }

    /// Campos del hash `kind:task`.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let pairs: Vec<(&str, String)> = match self {
            TaskSpec::CreatePost { post, author, created, refresh } => {
                vec![("post", post.to_string()),
                     ("author", author.to_string()),
                     ("created", created.timestamp_millis().to_string()),
                     ("refresh", refresh.to_string())]
            }
            TaskSpec::FollowUser { follower, followed } => {
                vec![("follower", follower.to_string()), ("followed", followed.to_string())]
            }
            TaskSpec::UnfollowUser { follower, unfollowed } => {
                vec![("follower", follower.to_string()), ("unfollowed", unfollowed.to_string())]
            }
            TaskSpec::PostDelete { post } => vec![("post", post.to_string())],
            TaskSpec::PostLike { user, post, liked } => {
                vec![("user", user.to_string()), ("post", post.to_string()), ("liked", liked.to_string())]
            }
            TaskSpec::CreateComment { post, comment } | TaskSpec::DeleteComment { post, comment } => {
                vec![("post", post.to_string()), ("comment", comment.to_string())]
            }
            TaskSpec::DeleteUser { user } => vec![("user", user.to_string())],
        };
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    pub fn from_fields(kind: TaskKind, fields: &HashMap<String, String>) -> Result<Self> {
        let names: &[&str] = match kind {
            TaskKind::CreatePost => &["post", "author", "created"],
            TaskKind::FollowUser => &["follower", "followed"],
            TaskKind::UnfollowUser => &["follower", "unfollowed"],
            TaskKind::PostDelete => &["post"],
            TaskKind::PostLike => &["user", "post", "liked"],
            TaskKind::CreateComment | TaskKind::DeleteComment => &["post", "comment"],
            TaskKind::DeleteUser => &["user"],
        };
        let mut args = names.iter().map(|n| field(fields, n)).collect::<Result<Vec<&str>>>()?;
        // Opcional: las tareas escritas sin él son altas normales.
        if let (TaskKind::CreatePost, Some(refresh)) = (kind, fields.get("refresh")) {
            args.push(refresh.as_str());
        }
        Self::from_args(kind, &args)
    }
}

/// Sub-operación fallida, con lo justo para reintentarla por separado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FailedOp {
    /// Insertar el post en el timeline de `owner`.
    Materialize { owner: Uuid, post: Uuid },
    /// Re-propagar el post completo tras una purga de privacidad fallida.
    RefreshPost { post: Uuid },
    PurgePost { post: Uuid },
    PurgeOwnerAuthor { owner: Uuid, author: Uuid },
    PurgeAuthor { author: Uuid },
    SetLiked { owner: Uuid, post: Uuid, liked: bool },
    AppendComment { entry: Uuid, comment: Uuid },
    RemoveComment { entry: Uuid, comment: Uuid },
}

impl FailedOp {
    pub fn name(&self) -> &'static str {
        match self {
            FailedOp::Materialize { .. } => "materialize",
            FailedOp::RefreshPost { .. } => "refresh_post",
            FailedOp::PurgePost { .. } => "purge_post",
            FailedOp::PurgeOwnerAuthor { .. } => "purge_owner_author",
            FailedOp::PurgeAuthor { .. } => "purge_author",
            FailedOp::SetLiked { .. } => "set_liked",
            FailedOp::AppendComment { .. } => "append_comment",
            FailedOp::RemoveComment { .. } => "remove_comment",
        }
    }

    /// Indica si esta operación puede registrarse bajo una tarea de `kind`.
    pub fn allowed_for(&self, kind: TaskKind) -> bool {
        matches!((self, kind),
                 (FailedOp::Materialize { .. }, TaskKind::CreatePost | TaskKind::FollowUser)
                 | (FailedOp::RefreshPost { .. }, TaskKind::CreatePost)
                 | (FailedOp::PurgePost { .. }, TaskKind::PostDelete)
                 | (FailedOp::PurgeOwnerAuthor { .. }, TaskKind::UnfollowUser)
                 | (FailedOp::PurgeAuthor { .. }, TaskKind::DeleteUser)
                 | (FailedOp::SetLiked { .. }, TaskKind::PostLike)
                 | (FailedOp::AppendComment { .. }, TaskKind::CreateComment)
                 | (FailedOp::RemoveComment { .. }, TaskKind::DeleteComment))
    }

    /// Forma posicional por tipo de tarea (la variante por defecto de cada
    /// tipo). `create_post` y `follow_user` reciben `[owner, post]`.
    pub fn from_args(kind: TaskKind, args: &[&str]) -> Result<Self> {
        let need = match kind {
            TaskKind::PostDelete | TaskKind::DeleteUser => 1,
            TaskKind::PostLike => 3,
            _ => 2,
        };
        if args.len() < need {
            return Err(LedgerError::InvalidArgs(format!("fallo de {} requiere {} argumentos, recibió {}",
                                                        kind,
                                                        need,
                                                        args.len())));
        }
        let op = match kind {
            TaskKind::CreatePost | TaskKind::FollowUser => {
                FailedOp::Materialize { owner: parse_uuid("owner", args[0])?, post: parse_uuid("post", args[1])? }
            }
            TaskKind::UnfollowUser => FailedOp::PurgeOwnerAuthor { owner: parse_uuid("owner", args[0])?,
                                                                   author: parse_uuid("author", args[1])? },
            TaskKind::PostDelete => FailedOp::PurgePost { post: parse_uuid("post", args[0])? },
            TaskKind::PostLike => FailedOp::SetLiked { owner: parse_uuid("owner", args[0])?,
                                                       post: parse_uuid("post", args[1])?,
                                                       liked: parse_bool("liked", args[2])? },
            TaskKind::CreateComment => FailedOp::AppendComment { entry: parse_uuid("entry", args[0])?,
                                                                 comment: parse_uuid("comment", args[1])? },
            TaskKind::DeleteComment => FailedOp::RemoveComment { entry: parse_uuid("entry", args[0])?,
                                                                 comment: parse_uuid("comment", args[1])? },
            TaskKind::DeleteUser => FailedOp::PurgeAuthor { author: parse_uuid("author", args[0])? },
        };
        Ok(op)
    }

    /// Campos del hash `task_op_fail:<id>` (sin los de reintento).
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(&str, String)> = vec![("op", self.name().to_string())];
        match self {
            FailedOp::Materialize { owner, post } => {
                pairs.push(("owner", owner.to_string()));
                pairs.push(("post", post.to_string()));
            }
            FailedOp::RefreshPost { post } | FailedOp::PurgePost { post } => pairs.push(("post", post.to_string())),
            FailedOp::PurgeOwnerAuthor { owner, author } => {
                pairs.push(("owner", owner.to_string()));
                pairs.push(("author", author.to_string()));
            }
            FailedOp::PurgeAuthor { author } => pairs.push(("author", author.to_string())),
            FailedOp::SetLiked { owner, post, liked } => {
                pairs.push(("owner", owner.to_string()));
                pairs.push(("post", post.to_string()));
                pairs.push(("liked", liked.to_string()));
            }
            FailedOp::AppendComment { entry, comment } | FailedOp::RemoveComment { entry, comment } => {
                pairs.push(("entry", entry.to_string()));
                pairs.push(("comment", comment.to_string()));
            }
        }
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let uuid = |name: &str| field(fields, name).and_then(|v| parse_uuid(name, v));
        let op = match field(fields, "op")? {
            "materialize" => FailedOp::Materialize { owner: uuid("owner")?, post: uuid("post")? },
            "refresh_post" => FailedOp::RefreshPost { post: uuid("post")? },
            "purge_post" => FailedOp::PurgePost { post: uuid("post")? },
            "purge_owner_author" => FailedOp::PurgeOwnerAuthor { owner: uuid("owner")?, author: uuid("author")? },
            "purge_author" => FailedOp::PurgeAuthor { author: uuid("author")? },
            "set_liked" => FailedOp::SetLiked { owner: uuid("owner")?,
                                                post: uuid("post")?,
                                                liked: parse_bool("liked", field(fields, "liked")?)? },
            "append_comment" => FailedOp::AppendComment { entry: uuid("entry")?, comment: uuid("comment")? },
            "remove_comment" => FailedOp::RemoveComment { entry: uuid("entry")?, comment: uuid("comment")? },
            other => return Err(LedgerError::InvalidArgs(format!("operación desconocida: '{}'", other))),
        };
        Ok(op)
    }
}

/// Operación fallida tal como está guardada, con su estado de reintento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedOpRecord {
    pub id: FailId,
    pub kind: TaskKind,
    pub task: TaskId,
    pub op: FailedOp,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl FailedOpRecord {
    pub(crate) fn from_fields(id: FailId, fields: &HashMap<String, String>) -> Result<Self> {
        let attempts = field(fields, "attempts")?.parse::<u32>()
                                                .map_err(|e| LedgerError::InvalidArgs(format!("attempts: {}", e)))?;
        Ok(Self { id,
                  kind: field(fields, "kind")?.parse()?,
                  task: field(fields, "task")?.parse()?,
                  op: FailedOp::from_fields(fields)?,
                  attempts,
                  next_attempt_at: parse_millis("next_attempt_at", field(fields, "next_attempt_at")?)?,
                  last_error: fields.get("last_error").cloned() })
    }
}

/// Tarea viva leída del ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveTask {
    pub id: TaskId,
    pub spec: TaskSpec,
    pub created_at: DateTime<Utc>,
}

impl LiveTask {
    pub fn kind(&self) -> TaskKind {
        self.spec.kind()
    }
}

pub(crate) fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    fields.get(name)
          .map(String::as_str)
          .ok_or_else(|| LedgerError::NotFound(format!("campo '{}'", name)))
}

fn parse_uuid(name: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|e| LedgerError::InvalidArgs(format!("{}: {}", name, e)))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(LedgerError::InvalidArgs(format!("{}: '{}' no es booleano", name, other))),
    }
}

pub(crate) fn parse_millis(name: &str, raw: &str) -> Result<DateTime<Utc>> {
    let ms = raw.trim()
                .parse::<i64>()
                .map_err(|e| LedgerError::InvalidArgs(format!("{}: {}", name, e)))?;
    DateTime::from_timestamp_millis(ms).ok_or_else(|| LedgerError::InvalidArgs(format!("{}: fuera de rango", name)))
}
