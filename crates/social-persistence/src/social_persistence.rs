use crate::db::{Database, DbConn, PooledConn};
use crate::schema::{comments, follows, likes, posts, timeline_comments, timelines, users};
use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sql_types::Text;
use social_domain::{Comment, CommentId, DomainError, Follow, FollowGraph, InsertOutcome, Post, PostId,
                    PrivacySettings, PrivacyType, SocialStore, StoreConnector, TimelineEntry, TimelineId, User,
                    UserId};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

// Filas Diesel de las tablas sociales
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = users)]
struct UserRow {
  pub id: String,
  pub username: String,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = posts)]
struct PostRow {
  pub id: String,
  pub author: String,
  pub created_ms: i64,
  pub privacy_type: i32,
  pub privacy_users: String,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = follows)]
struct FollowRow {
  pub id: String,
  pub user_from: String,
  pub user_to: String,
  pub time_ms: i64,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = comments)]
struct CommentRow {
  pub id: String,
  pub post_id: String,
  pub author: String,
  pub message: String,
  pub created_ms: i64,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = likes)]
struct LikeRow {
  pub user_id: String,
  pub post_id: String,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = timelines)]
struct TimelineRow {
  pub id: String,
  pub user_id: String,
  pub post_id: String,
  pub post_user_id: String,
  pub liked: bool,
  pub time_ms: i64,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = timeline_comments)]
struct TimelineCommentRow {
  pub timeline_id: String,
  pub comment_id: String,
  pub seq: i64,
}

fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T, DomainError> {
  res.map_err(|e| DomainError::ExternalError(format!("db: {}", e)))
}
fn parse_id(s: &str) -> Result<Uuid, DomainError> {
  Uuid::parse_str(s).map_err(|e| DomainError::ExternalError(format!("invalid uuid: {}", e)))
}
fn from_ms(ms: i64) -> Result<DateTime<Utc>, DomainError> {
  DateTime::from_timestamp_millis(ms).ok_or_else(|| DomainError::ExternalError(format!("timestamp fuera de rango: {}",
                                                                                       ms)))
}

impl UserRow {
  fn into_user(self) -> Result<User, DomainError> {
    Ok(User { id: parse_id(&self.id)?, username: self.username })
  }
}
impl PostRow {
  fn from_post(p: &Post) -> Result<Self, DomainError> {
    Ok(PostRow { id: p.id.to_string(),
                 author: p.author.to_string(),
                 created_ms: p.created.timestamp_millis(),
                 privacy_type: i32::from(p.privacy.kind.code()),
                 privacy_users: serde_json::to_string(&p.privacy.users)? })
  }
  fn into_post(self) -> Result<Post, DomainError> {
    let code = u8::try_from(self.privacy_type).map_err(|_| {
                                                  DomainError::ValidationError(format!("privacy_type inválido: {}",
                                                                                       self.privacy_type))
                                                })?;
    let users: Vec<UserId> = serde_json::from_str(&self.privacy_users)?;
    Ok(Post { id: parse_id(&self.id)?,
              author: parse_id(&self.author)?,
              created: from_ms(self.created_ms)?,
              privacy: PrivacySettings::new(PrivacyType::from_code(code)?, users)? })
  }
}
impl FollowRow {
  fn into_follow(self) -> Result<Follow, DomainError> {
    Ok(Follow { id: parse_id(&self.id)?,
                from: parse_id(&self.user_from)?,
                to: parse_id(&self.user_to)?,
                time: from_ms(self.time_ms)? })
  }
}
impl CommentRow {
  fn into_comment(self) -> Result<Comment, DomainError> {
    Ok(Comment { id: parse_id(&self.id)?,
                 post: parse_id(&self.post_id)?,
                 author: parse_id(&self.author)?,
                 message: self.message,
                 created: from_ms(self.created_ms)? })
  }
}
impl TimelineRow {
  fn into_entry(self, comment_ids: &[String]) -> Result<TimelineEntry, DomainError> {
    Ok(TimelineEntry { id: parse_id(&self.id)?,
                       owner: parse_id(&self.user_id)?,
                       post: parse_id(&self.post_id)?,
                       post_author: parse_id(&self.post_user_id)?,
                       liked: self.liked,
                       comments: comment_ids.iter().map(|c| parse_id(c)).collect::<Result<_, _>>()?,
                       time: from_ms(self.time_ms)? })
  }
}

/// Comentarios de cada entrada, en orden de inserción.
fn load_comment_ids(c: &mut DbConn, ids: &[String]) -> QueryResult<HashMap<String, Vec<String>>> {
  let rows = timeline_comments::table.filter(timeline_comments::timeline_id.eq_any(ids))
                                     .order((timeline_comments::timeline_id.asc(), timeline_comments::seq.asc()))
                                     .load::<TimelineCommentRow>(c)?;
  let mut out: HashMap<String, Vec<String>> = HashMap::new();
  for r in rows {
    out.entry(r.timeline_id).or_default().push(r.comment_id);
  }
  Ok(out)
}

fn load_entries(c: &mut DbConn, rows: Vec<TimelineRow>) -> QueryResult<Vec<(TimelineRow, Vec<String>)>> {
  let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
  let mut comment_map = load_comment_ids(c, &ids)?;
  Ok(rows.into_iter()
         .map(|r| {
           let cs = comment_map.remove(&r.id).unwrap_or_default();
           (r, cs)
         })
         .collect())
}

fn into_entries(pairs: Vec<(TimelineRow, Vec<String>)>) -> Result<Vec<TimelineEntry>, DomainError> {
  pairs.into_iter().map(|(r, cs)| r.into_entry(&cs)).collect()
}

/// Borra entradas y sus comentarios. Devuelve cuántas entradas se borraron.
fn delete_entries(c: &mut DbConn, ids: &[String]) -> QueryResult<usize> {
  diesel::delete(timeline_comments::table.filter(timeline_comments::timeline_id.eq_any(ids))).execute(c)?;
  diesel::delete(timelines::table.filter(timelines::id.eq_any(ids))).execute(c)
}

/// Conector Diesel: cada `open()` toma una conexión propia del pool.
#[derive(Clone)]
pub struct DieselSocialStore {
  db: Database,
}

impl DieselSocialStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

impl StoreConnector for DieselSocialStore {
  type Session = DieselSession;

  fn open(&self) -> Result<DieselSession, DomainError> {
    Ok(DieselSession { conn: Mutex::new(self.db.conn()?) })
  }
}

/// Sesión sobre una conexión del pool; la conexión vuelve al pool al
/// destruirse la sesión.
pub struct DieselSession {
  conn: Mutex<PooledConn>,
}

impl DieselSession {
  fn with_conn<T, F>(&self, f: F) -> Result<T, DomainError>
    where F: FnOnce(&mut DbConn) -> QueryResult<T>
  {
    let mut guard = self.conn
                        .lock()
                        .map_err(|e| DomainError::ExternalError(format!("Mutex 'conn' poisoned: {}", e)))?;
    map_db_err(f(&mut **guard))
  }
}

impl FollowGraph for DieselSession {
  fn follows(&self, from: &UserId, to: &UserId) -> Result<bool, DomainError> {
    let (f, t) = (from.to_string(), to.to_string());
    self.with_conn(|c| {
          diesel::select(exists(follows::table.filter(follows::user_from.eq(&f)).filter(follows::user_to.eq(&t))))
            .get_result::<bool>(c)
        })
  }
}

impl SocialStore for DieselSession {
  fn save_user(&self, user: &User) -> Result<(), DomainError> {
    let row = UserRow { id: user.id.to_string(), username: user.username.clone() };
    self.with_conn(|c| diesel::replace_into(users::table).values(&row).execute(c))?;
    Ok(())
  }

  fn get_user(&self, id: &UserId) -> Result<Option<User>, DomainError> {
    let id_s = id.to_string();
    let row = self.with_conn(|c| users::table.find(&id_s).first::<UserRow>(c).optional())?;
    row.map(UserRow::into_user).transpose()
  }

  fn delete_user(&self, id: &UserId) -> Result<(), DomainError> {
    let uid = id.to_string();
    self.with_conn(|c| {
          c.transaction::<_, DieselError, _>(|c| {
             let owned: Vec<String> = posts::table.filter(posts::author.eq(&uid)).select(posts::id).load(c)?;
             diesel::delete(likes::table.filter(likes::post_id.eq_any(&owned))).execute(c)?;
             diesel::delete(comments::table.filter(comments::post_id.eq_any(&owned))).execute(c)?;
             diesel::delete(posts::table.filter(posts::id.eq_any(&owned))).execute(c)?;
             diesel::delete(follows::table.filter(follows::user_from.eq(&uid).or(follows::user_to.eq(&uid)))).execute(c)?;
             diesel::delete(likes::table.filter(likes::user_id.eq(&uid))).execute(c)?;
             diesel::delete(comments::table.filter(comments::author.eq(&uid))).execute(c)?;
             diesel::delete(users::table.find(&uid)).execute(c)?;
             Ok(())
           })
        })
  }

  fn save_post(&self, post: &Post) -> Result<(), DomainError> {
    let row = PostRow::from_post(post)?;
    self.with_conn(|c| diesel::replace_into(posts::table).values(&row).execute(c))?;
    Ok(())
  }

  fn get_post(&self, id: &PostId) -> Result<Option<Post>, DomainError> {
    let id_s = id.to_string();
    let row = self.with_conn(|c| posts::table.find(&id_s).first::<PostRow>(c).optional())?;
    row.map(PostRow::into_post).transpose()
  }

  fn delete_post(&self, id: &PostId) -> Result<(), DomainError> {
    let pid = id.to_string();
    self.with_conn(|c| {
          c.transaction::<_, DieselError, _>(|c| {
             diesel::delete(likes::table.filter(likes::post_id.eq(&pid))).execute(c)?;
             diesel::delete(comments::table.filter(comments::post_id.eq(&pid))).execute(c)?;
             diesel::delete(posts::table.find(&pid)).execute(c)?;
             Ok(())
           })
        })
  }

  fn posts_by(&self, author: &UserId) -> Result<Vec<Post>, DomainError> {
    let a = author.to_string();
    let rows = self.with_conn(|c| {
                     posts::table.filter(posts::author.eq(&a))
                                 .order(posts::created_ms.asc())
                                 .load::<PostRow>(c)
                   })?;
    rows.into_iter().map(PostRow::into_post).collect()
  }

  fn follow(&self, from: &UserId, to: &UserId) -> Result<Follow, DomainError> {
    let fresh = Follow::new(*from, *to);
    let row = FollowRow { id: fresh.id.to_string(),
                          user_from: from.to_string(),
                          user_to: to.to_string(),
                          time_ms: fresh.time.timestamp_millis() };
    let stored = self.with_conn(|c| {
                       c.transaction::<_, DieselError, _>(|c| {
                          diesel::insert_or_ignore_into(follows::table).values(&row).execute(c)?;
                          follows::table.filter(follows::user_from.eq(&row.user_from))
                                        .filter(follows::user_to.eq(&row.user_to))
                                        .first::<FollowRow>(c)
                        })
                     })?;
    stored.into_follow()
  }

  fn unfollow(&self, from: &UserId, to: &UserId) -> Result<bool, DomainError> {
    let (f, t) = (from.to_string(), to.to_string());
    let n = self.with_conn(|c| {
                  diesel::delete(follows::table.filter(follows::user_from.eq(&f)).filter(follows::user_to.eq(&t)))
                    .execute(c)
                })?;
    Ok(n > 0)
  }

  fn followers_of(&self, user: &UserId) -> Result<Vec<UserId>, DomainError> {
    let u = user.to_string();
    let ids: Vec<String> =
      self.with_conn(|c| follows::table.filter(follows::user_to.eq(&u)).select(follows::user_from).load(c))?;
    ids.iter().map(|s| parse_id(s)).collect()
  }

  fn save_comment(&self, comment: &Comment) -> Result<(), DomainError> {
    let row = CommentRow { id: comment.id.to_string(),
                           post_id: comment.post.to_string(),
                           author: comment.author.to_string(),
                           message: comment.message.clone(),
                           created_ms: comment.created.timestamp_millis() };
    self.with_conn(|c| diesel::replace_into(comments::table).values(&row).execute(c))?;
    Ok(())
  }

  fn get_comment(&self, id: &CommentId) -> Result<Option<Comment>, DomainError> {
    let id_s = id.to_string();
    let row = self.with_conn(|c| comments::table.find(&id_s).first::<CommentRow>(c).optional())?;
    row.map(CommentRow::into_comment).transpose()
  }

  fn delete_comment(&self, id: &CommentId) -> Result<(), DomainError> {
    let id_s = id.to_string();
    self.with_conn(|c| diesel::delete(comments::table.find(&id_s)).execute(c))?;
    Ok(())
  }

  fn set_like(&self, user: &UserId, post: &PostId, liked: bool) -> Result<(), DomainError> {
    let row = LikeRow { user_id: user.to_string(), post_id: post.to_string() };
    self.with_conn(|c| {
          if liked {
            diesel::insert_or_ignore_into(likes::table).values(&row).execute(c)
          } else {
            diesel::delete(likes::table.find((&row.user_id, &row.post_id))).execute(c)
          }
        })?;
    Ok(())
  }

  fn has_liked(&self, user: &UserId, post: &PostId) -> Result<bool, DomainError> {
    let (u, p) = (user.to_string(), post.to_string());
    self.with_conn(|c| diesel::select(exists(likes::table.find((&u, &p)))).get_result::<bool>(c))
  }

  fn insert_timeline_entry(&self, entry: &TimelineEntry) -> Result<InsertOutcome, DomainError> {
    let row = TimelineRow { id: entry.id.to_string(),
                            user_id: entry.owner.to_string(),
                            post_id: entry.post.to_string(),
                            post_user_id: entry.post_author.to_string(),
                            liked: entry.liked,
                            time_ms: entry.time.timestamp_millis() };
    let comment_rows: Vec<TimelineCommentRow> =
      entry.comments
           .iter()
           .enumerate()
           .map(|(i, cid)| TimelineCommentRow { timeline_id: row.id.clone(),
                                                comment_id: cid.to_string(),
                                                seq: i as i64 + 1 })
           .collect();
    self.with_conn(|c| {
          c.immediate_transaction::<_, DieselError, _>(|c| {
             let post_ok = diesel::select(exists(posts::table.find(&row.post_id))).get_result::<bool>(c)?;
             let owner_ok = diesel::select(exists(users::table.find(&row.user_id))).get_result::<bool>(c)?;
             if !post_ok || !owner_ok {
               return Ok(InsertOutcome::SourceGone);
             }
             if diesel::insert_or_ignore_into(timelines::table).values(&row).execute(c)? == 0 {
               return Ok(InsertOutcome::AlreadyPresent);
             }
             for cr in comment_rows.iter() {
               diesel::insert_or_ignore_into(timeline_comments::table).values(cr).execute(c)?;
             }
             Ok(InsertOutcome::Inserted)
           })
        })
  }

  fn timeline_entry(&self, owner: &UserId, post: &PostId) -> Result<Option<TimelineEntry>, DomainError> {
    let (o, p) = (owner.to_string(), post.to_string());
    let pairs = self.with_conn(|c| {
                      let rows = timelines::table.filter(timelines::user_id.eq(&o))
                                                 .filter(timelines::post_id.eq(&p))
                                                 .load::<TimelineRow>(c)?;
                      load_entries(c, rows)
                    })?;
    Ok(into_entries(pairs)?.into_iter().next())
  }

  fn timeline_entries_for_post(&self, post: &PostId) -> Result<Vec<TimelineEntry>, DomainError> {
    let p = post.to_string();
    let pairs = self.with_conn(|c| {
                      let rows = timelines::table.filter(timelines::post_id.eq(&p)).load::<TimelineRow>(c)?;
                      load_entries(c, rows)
                    })?;
    into_entries(pairs)
  }

  fn timeline_for(&self,
                  owner: &UserId,
                  newer_than: Option<DateTime<Utc>>,
                  limit: usize,
                  offset: usize)
                  -> Result<Vec<TimelineEntry>, DomainError> {
    let o = owner.to_string();
    let pairs = self.with_conn(|c| {
                      let mut q = timelines::table.filter(timelines::user_id.eq(&o)).into_boxed();
                      if let Some(t) = newer_than {
                        q = q.filter(timelines::time_ms.gt(t.timestamp_millis()));
                      }
                      let rows = q.order((timelines::time_ms.desc(), timelines::id.asc()))
                                  .limit(limit as i64)
                                  .offset(offset as i64)
                                  .load::<TimelineRow>(c)?;
                      load_entries(c, rows)
                    })?;
    into_entries(pairs)
  }

  fn set_timeline_liked(&self, owner: &UserId, post: &PostId, liked: bool) -> Result<bool, DomainError> {
    let (o, p) = (owner.to_string(), post.to_string());
    let n = self.with_conn(|c| {
                  diesel::update(timelines::table.filter(timelines::user_id.eq(&o)).filter(timelines::post_id.eq(&p)))
                    .set(timelines::liked.eq(liked))
                    .execute(c)
                })?;
    Ok(n > 0)
  }

  fn append_timeline_comment(&self, entry: &TimelineId, comment: &CommentId) -> Result<bool, DomainError> {
    let (e, cm) = (entry.to_string(), comment.to_string());
    self.with_conn(|c| {
          c.immediate_transaction::<_, DieselError, _>(|c| {
             if !diesel::select(exists(timelines::table.find(&e))).get_result::<bool>(c)? {
               return Ok(false);
             }
             if !diesel::select(exists(comments::table.find(&cm))).get_result::<bool>(c)? {
               return Ok(false);
             }
             diesel::sql_query("INSERT OR IGNORE INTO timeline_comments (timeline_id, comment_id, seq) \
                                SELECT ?, ?, COALESCE(MAX(seq), 0) + 1 FROM timeline_comments WHERE timeline_id = ?")
               .bind::<Text, _>(&e)
               .bind::<Text, _>(&cm)
               .bind::<Text, _>(&e)
               .execute(c)?;
             Ok(true)
           })
        })
  }

  fn remove_timeline_comment(&self, entry: &TimelineId, comment: &CommentId) -> Result<bool, DomainError> {
    let (e, cm) = (entry.to_string(), comment.to_string());
    self.with_conn(|c| {
          c.immediate_transaction::<_, DieselError, _>(|c| {
             if !diesel::select(exists(timelines::table.find(&e))).get_result::<bool>(c)? {
               return Ok(false);
             }
             diesel::delete(timeline_comments::table.find((&e, &cm))).execute(c)?;
             Ok(true)
           })
        })
  }

  fn delete_timeline_for_post(&self, post: &PostId) -> Result<usize, DomainError> {
    let p = post.to_string();
    self.with_conn(|c| {
          c.immediate_transaction::<_, DieselError, _>(|c| {
             let ids: Vec<String> = timelines::table.filter(timelines::post_id.eq(&p)).select(timelines::id).load(c)?;
             delete_entries(c, &ids)
           })
        })
  }

  fn delete_timeline_for_owner_author(&self, owner: &UserId, author: &UserId) -> Result<usize, DomainError> {
    let (o, a) = (owner.to_string(), author.to_string());
    self.with_conn(|c| {
          c.immediate_transaction::<_, DieselError, _>(|c| {
             let ids: Vec<String> = timelines::table.filter(timelines::user_id.eq(&o))
                                                    .filter(timelines::post_user_id.eq(&a))
                                                    .select(timelines::id)
                                                    .load(c)?;
             delete_entries(c, &ids)
           })
        })
  }

  fn delete_timeline_for_user(&self, user: &UserId) -> Result<usize, DomainError> {
    let u = user.to_string();
    self.with_conn(|c| {
          c.immediate_transaction::<_, DieselError, _>(|c| {
             let ids: Vec<String> = timelines::table.filter(timelines::post_user_id.eq(&u).or(timelines::user_id.eq(&u)))
                                                    .select(timelines::id)
                                                    .load(c)?;
             delete_entries(c, &ids)
           })
        })
  }
}
