use crate::{Comment, CommentId, DomainError, Follow, FollowGraph, InsertOutcome, Post, PostId, TimelineEntry,
            TimelineId, User, UserId};
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Trait que define las operaciones sobre el almacén social.
///
/// Agrupa tres familias de operaciones:
/// - escrituras de la fuente de verdad (usuarios, posts, follows,
///   comentarios, likes), invocadas por los handlers externos;
/// - lecturas que usa la propagación para calcular destinatarios;
/// - escrituras sobre `timelines`, reservadas al propagador.
///
/// Las escrituras de timeline son atómicas a nivel de campo: ninguna hace
/// read-modify-write de la fila completa.
pub trait SocialStore: FollowGraph + Send + Sync {
  fn save_user(&self, user: &User) -> Result<(), DomainError>;
  fn get_user(&self, id: &UserId) -> Result<Option<User>, DomainError>;
  /// Elimina el usuario junto con sus posts, follows (en ambos sentidos),
  /// likes y comentarios. Las entradas de timeline no se tocan.
  fn delete_user(&self, id: &UserId) -> Result<(), DomainError>;

  /// Inserta o reemplaza el post (un cambio de privacidad es un reemplazo).
  fn save_post(&self, post: &Post) -> Result<(), DomainError>;
  fn get_post(&self, id: &PostId) -> Result<Option<Post>, DomainError>;
  /// Elimina el post y sus likes y comentarios.
  fn delete_post(&self, id: &PostId) -> Result<(), DomainError>;
  fn posts_by(&self, author: &UserId) -> Result<Vec<Post>, DomainError>;

  /// `from` empieza a seguir a `to`. Idempotente: devuelve la arista
  /// existente si ya la había.
  fn follow(&self, from: &UserId, to: &UserId) -> Result<Follow, DomainError>;
  /// Devuelve `true` si existía la arista.
  fn unfollow(&self, from: &UserId, to: &UserId) -> Result<bool, DomainError>;
  /// Usuarios que siguen a `user`.
  fn followers_of(&self, user: &UserId) -> Result<Vec<UserId>, DomainError>;

  fn save_comment(&self, comment: &Comment) -> Result<(), DomainError>;
  fn get_comment(&self, id: &CommentId) -> Result<Option<Comment>, DomainError>;
  fn delete_comment(&self, id: &CommentId) -> Result<(), DomainError>;

  fn set_like(&self, user: &UserId, post: &PostId, liked: bool) -> Result<(), DomainError>;
  fn has_liked(&self, user: &UserId, post: &PostId) -> Result<bool, DomainError>;

  /// Inserta la entrada sólo si el post y el dueño siguen existiendo y no
  /// hay ya una entrada para (owner, post). La comprobación y la escritura
  /// son atómicas.
  fn insert_timeline_entry(&self, entry: &TimelineEntry) -> Result<InsertOutcome, DomainError>;
  fn timeline_entry(&self, owner: &UserId, post: &PostId) -> Result<Option<TimelineEntry>, DomainError>;
  fn timeline_entries_for_post(&self, post: &PostId) -> Result<Vec<TimelineEntry>, DomainError>;
  /// Feed de `owner` ordenado por `time` descendente.
  fn timeline_for(&self,
                  owner: &UserId,
                  newer_than: Option<DateTime<Utc>>,
                  limit: usize,
                  offset: usize)
                  -> Result<Vec<TimelineEntry>, DomainError>;
  /// Actualiza `liked`. Devuelve `false` si no existe la entrada.
  fn set_timeline_liked(&self, owner: &UserId, post: &PostId, liked: bool) -> Result<bool, DomainError>;
  /// Añade el comentario al final de la lista (no duplica). Devuelve
  /// `false` si no existe la entrada o si el comentario ya fue borrado; la
  /// comprobación y la escritura son atómicas.
  fn append_timeline_comment(&self, entry: &TimelineId, comment: &CommentId) -> Result<bool, DomainError>;
  /// Quita el comentario de la lista. Devuelve `false` si no existe la
  /// entrada.
  fn remove_timeline_comment(&self, entry: &TimelineId, comment: &CommentId) -> Result<bool, DomainError>;
  fn delete_timeline_for_post(&self, post: &PostId) -> Result<usize, DomainError>;
  fn delete_timeline_for_owner_author(&self, owner: &UserId, author: &UserId) -> Result<usize, DomainError>;
  /// Borra las entradas cuyo post es de `user` y las del propio feed de
  /// `user`.
  fn delete_timeline_for_user(&self, user: &UserId) -> Result<usize, DomainError>;
}

/// Capacidad de abrir una sesión independiente del almacén.
///
/// La propagación nunca reutiliza la conexión de la petición: abre su propia
/// sesión, que libera su conexión al destruirse.
pub trait StoreConnector: Send + Sync + 'static {
  type Session: SocialStore + 'static;

  fn open(&self) -> Result<Self::Session, DomainError>;
}

/// Fallos inyectables para pruebas de fallo parcial.
#[derive(Debug, Default)]
struct Faults {
  timeline_owners: HashSet<UserId>,
  entry_updates: HashSet<TimelineId>,
  like_updates: bool,
  bulk_deletes: bool,
}

#[derive(Debug, Default)]
struct SocialData {
  users: HashMap<UserId, User>,
  posts: HashMap<PostId, Post>,
  follows: HashMap<(UserId, UserId), Follow>,
  comments: HashMap<CommentId, Comment>,
  likes: HashSet<(UserId, PostId)>,
  timelines: HashMap<TimelineId, TimelineEntry>,
  timeline_index: HashMap<(UserId, PostId), TimelineId>,
  faults: Faults,
}

impl SocialData {
  fn remove_entries<F>(&mut self, pred: F) -> usize
    where F: Fn(&TimelineEntry) -> bool
  {
    let ids: Vec<TimelineId> = self.timelines.values().filter(|e| pred(e)).map(|e| e.id).collect();
    for id in ids.iter() {
      if let Some(e) = self.timelines.remove(id) {
        self.timeline_index.remove(&(e.owner, e.post));
      }
    }
    ids.len()
  }

  fn remove_post_children(&mut self, post: &PostId) {
    self.likes.retain(|(_, p)| p != post);
    self.comments.retain(|_, c| &c.post != post);
  }
}

/// Implementación en memoria para tests y desarrollo.
///
/// Es `Clone`: todas las copias comparten los mismos datos, de modo que
/// `open()` devuelve otra "sesión" sobre el mismo almacén.
#[derive(Clone, Default)]
pub struct InMemorySocialStore {
  data: Arc<Mutex<SocialData>>,
}

impl InMemorySocialStore {
  pub fn new() -> Self {
    Self::default()
  }

  // Helper to map poisoned mutex errors into DomainError
  fn lock(&self) -> Result<MutexGuard<'_, SocialData>, DomainError> {
    self.data
      .lock()
      .map_err(|e| DomainError::ExternalError(format!("Mutex 'social' poisoned: {}", e)))
  }

  /// Hace fallar las inserciones de timeline cuyo dueño es `owner`.
  pub fn fail_timeline_writes_for(&self, owner: UserId) {
    if let Ok(mut d) = self.lock() {
      d.faults.timeline_owners.insert(owner);
    }
  }

  /// Hace fallar las actualizaciones de comentarios sobre `entry`.
  pub fn fail_entry_updates_for(&self, entry: TimelineId) {
    if let Ok(mut d) = self.lock() {
      d.faults.entry_updates.insert(entry);
    }
  }

  pub fn fail_like_updates(&self, fail: bool) {
    if let Ok(mut d) = self.lock() {
      d.faults.like_updates = fail;
    }
  }

  pub fn fail_bulk_deletes(&self, fail: bool) {
    if let Ok(mut d) = self.lock() {
      d.faults.bulk_deletes = fail;
    }
  }

  pub fn clear_faults(&self) {
    if let Ok(mut d) = self.lock() {
      d.faults = Faults::default();
    }
  }

  /// Número total de entradas de timeline (útil en pruebas).
  pub fn timeline_len(&self) -> Result<usize, DomainError> {
    Ok(self.lock()?.timelines.len())
  }
}

fn injected(what: &str) -> DomainError {
  debug!("fallo inyectado en {}", what);
  DomainError::ExternalError(format!("fallo inyectado: {}", what))
}

impl StoreConnector for InMemorySocialStore {
  type Session = InMemorySocialStore;

  fn open(&self) -> Result<Self::Session, DomainError> {
    Ok(self.clone())
  }
}

impl FollowGraph for InMemorySocialStore {
  fn follows(&self, from: &UserId, to: &UserId) -> Result<bool, DomainError> {
    Ok(self.lock()?.follows.contains_key(&(*from, *to)))
  }
}

impl SocialStore for InMemorySocialStore {
  fn save_user(&self, user: &User) -> Result<(), DomainError> {
    self.lock()?.users.insert(user.id, user.clone());
    Ok(())
  }

  fn get_user(&self, id: &UserId) -> Result<Option<User>, DomainError> {
    Ok(self.lock()?.users.get(id).cloned())
  }

  fn delete_user(&self, id: &UserId) -> Result<(), DomainError> {
    let mut d = self.lock()?;
    d.users.remove(id);
    let posts: Vec<PostId> = d.posts.values().filter(|p| &p.author == id).map(|p| p.id).collect();
    for p in posts.iter() {
      d.posts.remove(p);
      d.remove_post_children(p);
    }
    d.follows.retain(|(from, to), _| from != id && to != id);
    d.likes.retain(|(u, _)| u != id);
    d.comments.retain(|_, c| &c.author != id);
    Ok(())
  }

  fn save_post(&self, post: &Post) -> Result<(), DomainError> {
    self.lock()?.posts.insert(post.id, post.clone());
    Ok(())
  }

  fn get_post(&self, id: &PostId) -> Result<Option<Post>, DomainError> {
    Ok(self.lock()?.posts.get(id).cloned())
  }

  fn delete_post(&self, id: &PostId) -> Result<(), DomainError> {
    let mut d = self.lock()?;
    d.posts.remove(id);
    d.remove_post_children(id);
    Ok(())
  }

  fn posts_by(&self, author: &UserId) -> Result<Vec<Post>, DomainError> {
    let d = self.lock()?;
    let mut posts: Vec<Post> = d.posts.values().filter(|p| &p.author == author).cloned().collect();
    posts.sort_by(|a, b| a.created.cmp(&b.created));
    Ok(posts)
  }

  fn follow(&self, from: &UserId, to: &UserId) -> Result<Follow, DomainError> {
    let mut d = self.lock()?;
    let f = d.follows.entry((*from, *to)).or_insert_with(|| Follow::new(*from, *to));
    Ok(f.clone())
  }

  fn unfollow(&self, from: &UserId, to: &UserId) -> Result<bool, DomainError> {
    Ok(self.lock()?.follows.remove(&(*from, *to)).is_some())
  }

  fn followers_of(&self, user: &UserId) -> Result<Vec<UserId>, DomainError> {
    let d = self.lock()?;
    Ok(d.follows.keys().filter(|(_, to)| to == user).map(|(from, _)| *from).collect())
  }

  fn save_comment(&self, comment: &Comment) -> Result<(), DomainError> {
    self.lock()?.comments.insert(comment.id, comment.clone());
    Ok(())
  }

  fn get_comment(&self, id: &CommentId) -> Result<Option<Comment>, DomainError> {
    Ok(self.lock()?.comments.get(id).cloned())
  }

  fn delete_comment(&self, id: &CommentId) -> Result<(), DomainError> {
    self.lock()?.comments.remove(id);
    Ok(())
  }

  fn set_like(&self, user: &UserId, post: &PostId, liked: bool) -> Result<(), DomainError> {
    let mut d = self.lock()?;
    if liked {
      d.likes.insert((*user, *post));
    } else {
      d.likes.remove(&(*user, *post));
    }
    Ok(())
  }

  fn has_liked(&self, user: &UserId, post: &PostId) -> Result<bool, DomainError> {
    Ok(self.lock()?.likes.contains(&(*user, *post)))
  }

  fn insert_timeline_entry(&self, entry: &TimelineEntry) -> Result<InsertOutcome, DomainError> {
    let mut d = self.lock()?;
    if d.faults.timeline_owners.contains(&entry.owner) {
      return Err(injected("timeline insert"));
    }
    if !d.posts.contains_key(&entry.post) || !d.users.contains_key(&entry.owner) {
      return Ok(InsertOutcome::SourceGone);
    }
    if d.timeline_index.contains_key(&(entry.owner, entry.post)) {
      return Ok(InsertOutcome::AlreadyPresent);
    }
    d.timeline_index.insert((entry.owner, entry.post), entry.id);
    d.timelines.insert(entry.id, entry.clone());
    Ok(InsertOutcome::Inserted)
  }

  fn timeline_entry(&self, owner: &UserId, post: &PostId) -> Result<Option<TimelineEntry>, DomainError> {
    let d = self.lock()?;
    Ok(d.timeline_index.get(&(*owner, *post)).and_then(|id| d.timelines.get(id)).cloned())
  }

  fn timeline_entries_for_post(&self, post: &PostId) -> Result<Vec<TimelineEntry>, DomainError> {
    let d = self.lock()?;
    Ok(d.timelines.values().filter(|e| &e.post == post).cloned().collect())
  }

  fn timeline_for(&self,
                  owner: &UserId,
                  newer_than: Option<DateTime<Utc>>,
                  limit: usize,
                  offset: usize)
                  -> Result<Vec<TimelineEntry>, DomainError> {
    let d = self.lock()?;
    let mut entries: Vec<TimelineEntry> =
      d.timelines
       .values()
       .filter(|e| &e.owner == owner && newer_than.map(|t| e.time > t).unwrap_or(true))
       .cloned()
       .collect();
    entries.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| a.id.cmp(&b.id)));
    Ok(entries.into_iter().skip(offset).take(limit).collect())
  }

  fn set_timeline_liked(&self, owner: &UserId, post: &PostId, liked: bool) -> Result<bool, DomainError> {
    let mut d = self.lock()?;
    if d.faults.like_updates {
      return Err(injected("like update"));
    }
    let Some(id) = d.timeline_index.get(&(*owner, *post)).copied() else {
      return Ok(false);
    };
    match d.timelines.get_mut(&id) {
      Some(e) => {
        e.liked = liked;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  fn append_timeline_comment(&self, entry: &TimelineId, comment: &CommentId) -> Result<bool, DomainError> {
    let mut d = self.lock()?;
    if d.faults.entry_updates.contains(entry) {
      return Err(injected("comment append"));
    }
    if !d.comments.contains_key(comment) {
      return Ok(false);
    }
    match d.timelines.get_mut(entry) {
      Some(e) => {
        if !e.comments.contains(comment) {
          e.comments.push(*comment);
        }
        Ok(true)
      }
      None => Ok(false),
    }
  }

  fn remove_timeline_comment(&self, entry: &TimelineId, comment: &CommentId) -> Result<bool, DomainError> {
    let mut d = self.lock()?;
    if d.faults.entry_updates.contains(entry) {
      return Err(injected("comment remove"));
    }
    match d.timelines.get_mut(entry) {
      Some(e) => {
        e.comments.retain(|c| c != comment);
        Ok(true)
      }
      None => Ok(false),
    }
  }

  fn delete_timeline_for_post(&self, post: &PostId) -> Result<usize, DomainError> {
    let mut d = self.lock()?;
    if d.faults.bulk_deletes {
      return Err(injected("bulk delete"));
    }
    Ok(d.remove_entries(|e| &e.post == post))
  }

  fn delete_timeline_for_owner_author(&self, owner: &UserId, author: &UserId) -> Result<usize, DomainError> {
    let mut d = self.lock()?;
    if d.faults.bulk_deletes {
      return Err(injected("bulk delete"));
    }
    Ok(d.remove_entries(|e| &e.owner == owner && &e.post_author == author))
  }

  fn delete_timeline_for_user(&self, user: &UserId) -> Result<usize, DomainError> {
    let mut d = self.lock()?;
    if d.faults.bulk_deletes {
      return Err(injected("bulk delete"));
    }
    Ok(d.remove_entries(|e| &e.post_author == user || &e.owner == user))
  }
}
