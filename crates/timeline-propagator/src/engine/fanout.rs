//! Fan-out síncrono de un evento sobre una sesión del almacén.
//!
//! Cada evento se descompone en sub-operaciones de un solo destino
//! (`FailedOp`). La misma función `apply_op` las ejecuta durante el fan-out
//! y cuando el Resolver las reintenta, así que un reintento hace
//! exactamente lo que hizo la primera ejecución.
//!
//! Todas las sub-operaciones son idempotentes y se evalúan contra el estado
//! actual de la fuente de verdad, no contra el evento: reejecutar una tarea
//! completa nunca duplica entradas ni deshace una escritura posterior.
use crate::engine::owner_locks::OwnerLocks;
use crate::errors::{PropagationError, Result};
use crate::event::TimelineEvent;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use social_domain::{can_access, DomainError, InsertOutcome, PostId, SocialStore, TimelineEntry, UserId};
use std::time::Instant;
use task_ledger::{FailedOp, LedgerError, TaskId, TaskKind, TaskLedger};

/// Resultado de aplicar una sub-operación.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Se escribió (o borró) algo.
    Done,
    /// No había nada que hacer: destino invisible, ya presente o ya borrado.
    Skipped,
}

/// Resumen de un fan-out terminado.
///
/// `attempted` cuenta los destinos enumerados; cada uno termina en
/// `succeeded`, `skipped`, `failed` o `timed_out`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutReport {
    pub task: TaskId,
    pub kind: TaskKind,
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// `true` si la tarea se cerró en el ledger.
    pub completed: bool,
}

impl FanoutReport {
    pub fn new(task: TaskId, kind: TaskKind) -> Self {
        FanoutReport { task,
                       kind,
                       attempted: 0,
                       succeeded: 0,
                       skipped: 0,
                       failed: 0,
                       timed_out: 0,
                       completed: false }
    }
}

type StoreResult<T> = std::result::Result<T, DomainError>;

/// Inserta `post` en el timeline de `owner` si corresponde.
///
/// Bajo el candado del dueño relee el post, comprueba que `owner` sea el
/// autor o siga al autor, evalúa la privacidad y hace la inserción
/// condicional. `liked` se toma del estado actual.
pub fn materialize<S>(store: &S, locks: &OwnerLocks, owner: &UserId, post: &PostId) -> StoreResult<Applied>
    where S: SocialStore + ?Sized
{
    locks.with_owner(owner, || -> StoreResult<Applied> {
             let Some(post) = store.get_post(post)? else {
                 return Ok(Applied::Skipped);
             };
             if &post.author != owner && !store.follows(owner, &post.author)? {
                 return Ok(Applied::Skipped);
             }
             if !can_access(store, owner, &post)? {
                 return Ok(Applied::Skipped);
             }
             let liked = store.has_liked(owner, &post.id)?;
             match store.insert_timeline_entry(&TimelineEntry::for_post(*owner, &post, liked))? {
                 InsertOutcome::Inserted => Ok(Applied::Done),
                 InsertOutcome::AlreadyPresent | InsertOutcome::SourceGone => Ok(Applied::Skipped),
             }
         })
}

/// Destinos de un post: el autor y sus seguidores, sin repetir.
pub fn post_audience<S>(store: &S, author: &UserId) -> StoreResult<Vec<UserId>>
    where S: SocialStore + ?Sized
{
    let mut owners = vec![*author];
    for f in store.followers_of(author)? {
        if !owners.contains(&f) {
            owners.push(f);
        }
    }
    Ok(owners)
}

/// Borra las entradas del post y lo vuelve a propagar a toda su audiencia.
fn refresh_post<S>(store: &S, locks: &OwnerLocks, post: &PostId) -> StoreResult<Applied>
    where S: SocialStore + ?Sized
{
    store.delete_timeline_for_post(post)?;
    let Some(current) = store.get_post(post)? else {
        return Ok(Applied::Done);
    };
    let mut first_err = None;
    for owner in post_audience(store, &current.author)? {
        if let Err(e) = materialize(store, locks, &owner, post) {
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(Applied::Done),
    }
}

/// Aplica una sub-operación contra el estado actual del almacén.
///
/// Las purgas sólo borran si la fuente de verdad sigue justificándolo (el
/// post no existe, ya no hay seguimiento, el usuario fue borrado); así un
/// reintento tardío no deshace una escritura más reciente.
pub fn apply_op<S>(store: &S, locks: &OwnerLocks, op: &FailedOp) -> StoreResult<Applied>
    where S: SocialStore + ?Sized
{
    match op {
        FailedOp::Materialize { owner, post } => materialize(store, locks, owner, post),
        FailedOp::RefreshPost { post } => refresh_post(store, locks, post),
        FailedOp::PurgePost { post } => {
            if store.get_post(post)?.is_some() {
                return Ok(Applied::Skipped);
            }
            let n = store.delete_timeline_for_post(post)?;
            Ok(if n > 0 { Applied::Done } else { Applied::Skipped })
        }
        FailedOp::PurgeOwnerAuthor { owner, author } => locks.with_owner(owner, || -> StoreResult<Applied> {
                                                            if store.follows(owner, author)? {
                                                                return Ok(Applied::Skipped);
                                                            }
                                                            let n = store.delete_timeline_for_owner_author(owner, author)?;
                                                            Ok(if n > 0 { Applied::Done } else { Applied::Skipped })
                                                        }),
        // Cubre los posts del usuario en otros feeds y su propio feed.
        FailedOp::PurgeAuthor { author } => {
            if store.get_user(author)?.is_some() {
                return Ok(Applied::Skipped);
            }
            let n = store.delete_timeline_for_user(author)?;
            Ok(if n > 0 { Applied::Done } else { Applied::Skipped })
        }
        FailedOp::SetLiked { owner, post, .. } => {
            // El valor se relee: con toggles concurrentes gana el último estado
            // guardado, no el último fan-out en terminar.
            let liked = store.has_liked(owner, post)?;
            let hit = store.set_timeline_liked(owner, post, liked)?;
            Ok(if hit { Applied::Done } else { Applied::Skipped })
        }
        FailedOp::AppendComment { entry, comment } => {
            // El almacén descarta el comentario si ya no existe.
            let hit = store.append_timeline_comment(entry, comment)?;
            Ok(if hit { Applied::Done } else { Applied::Skipped })
        }
        FailedOp::RemoveComment { entry, comment } => {
            let hit = store.remove_timeline_comment(entry, comment)?;
            Ok(if hit { Applied::Done } else { Applied::Skipped })
        }
    }
}

/// Una ejecución de fan-out para una tarea ya registrada en el ledger.
pub struct FanoutRun<'a, S: SocialStore + ?Sized> {
    store: &'a S,
    ledger: &'a dyn TaskLedger,
    locks: &'a OwnerLocks,
    kind: TaskKind,
    deadline: Instant,
    report: FanoutReport,
    unrecorded: usize,
}

impl<'a, S: SocialStore + ?Sized> FanoutRun<'a, S> {
    pub fn new(store: &'a S,
               ledger: &'a dyn TaskLedger,
               locks: &'a OwnerLocks,
               task: TaskId,
               kind: TaskKind,
               deadline: Instant)
               -> Self {
        FanoutRun { store,
                    ledger,
                    locks,
                    kind,
                    deadline,
                    report: FanoutReport::new(task, kind),
                    unrecorded: 0 }
    }

    /// Ejecuta el evento. La tarea se cierra sólo si todas las
    /// sub-operaciones terminaron bien; si no, quedan sus `FailedOp`.
    ///
    /// Devuelve error si no se pudieron enumerar los destinos o si algún
    /// fallo no pudo registrarse; en ambos casos la tarea queda viva para
    /// que el Resolver la reejecute.
    pub fn execute(mut self, event: &TimelineEvent) -> Result<FanoutReport> {
        let ops = self.plan(event)?;
        self.run_ops(ops);

        if self.unrecorded > 0 {
            return Err(PropagationError::Ledger(LedgerError::Storage(format!("{} fallos de {}:{} sin registrar",
                                                                             self.unrecorded,
                                                                             self.kind,
                                                                             self.report.task))));
        }
        if self.report.failed == 0 && self.report.timed_out == 0 {
            self.ledger.task_done(self.kind, &self.report.task)?;
            self.report.completed = true;
            info!("fan-out {}:{} completado ({} escritos, {} omitidos)",
                  self.kind,
                  self.report.task,
                  self.report.succeeded,
                  self.report.skipped);
        } else {
            warn!("fan-out {}:{} con {} fallos y {} destinos fuera de plazo",
                  self.kind,
                  self.report.task,
                  self.report.failed,
                  self.report.timed_out);
        }
        Ok(self.report)
    }

    /// Enumera las sub-operaciones del evento. Los borrados masivos son una
    /// única operación; un cambio de privacidad purga antes de enumerar.
    fn plan(&mut self, event: &TimelineEvent) -> Result<Vec<FailedOp>> {
        let store = self.store;
        let ops = match event {
            TimelineEvent::PostCreated { post } => {
                post_audience(store, &post.author)?.into_iter()
                                                   .map(|owner| FailedOp::Materialize { owner, post: post.id })
                                                   .collect()
            }
            TimelineEvent::PostPrivacyChanged { post } => match store.delete_timeline_for_post(&post.id) {
                Ok(n) => {
                    debug!("purga de privacidad de {}: {} entradas", post.id, n);
                    post_audience(store, &post.author)?.into_iter()
                                                       .map(|owner| FailedOp::Materialize { owner, post: post.id })
                                                       .collect()
                }
                Err(e) => {
                    self.report.attempted += 1;
                    self.record_failure(&FailedOp::RefreshPost { post: post.id }, &e.to_string(), false);
                    Vec::new()
                }
            },
            TimelineEvent::UserFollowed { actor, target } => {
                store.posts_by(target)?
                     .into_iter()
                     .map(|p| FailedOp::Materialize { owner: *actor, post: p.id })
                     .collect()
            }
            TimelineEvent::UserUnfollowed { actor, target } => {
                vec![FailedOp::PurgeOwnerAuthor { owner: *actor, author: *target }]
            }
            TimelineEvent::PostDeleted { post } => vec![FailedOp::PurgePost { post: *post }],
            TimelineEvent::PostLikeToggled { actor, post, liked } => {
                vec![FailedOp::SetLiked { owner: *actor, post: *post, liked: *liked }]
            }
            TimelineEvent::CommentCreated { post, comment } => {
                store.timeline_entries_for_post(post)?
                     .into_iter()
                     .map(|e| FailedOp::AppendComment { entry: e.id, comment: *comment })
                     .collect()
            }
            TimelineEvent::CommentDeleted { post, comment } => {
                store.timeline_entries_for_post(post)?
                     .into_iter()
                     .map(|e| FailedOp::RemoveComment { entry: e.id, comment: *comment })
                     .collect()
            }
            TimelineEvent::UserDeleted { user } => vec![FailedOp::PurgeAuthor { author: *user }],
        };
        Ok(ops)
    }

    fn run_ops(&mut self, ops: Vec<FailedOp>) {
        for (i, op) in ops.iter().enumerate() {
            if Instant::now() >= self.deadline {
                for rest in ops[i..].iter() {
                    self.report.attempted += 1;
                    self.record_failure(rest, "fan-out fuera de plazo", true);
                }
                return;
            }
            self.report.attempted += 1;
            match apply_op(self.store, self.locks, op) {
                Ok(Applied::Done) => {
                    debug!("{} {}:{} ok", op.name(), self.kind, self.report.task);
                    self.report.succeeded += 1;
                }
                Ok(Applied::Skipped) => self.report.skipped += 1,
                Err(e) => self.record_failure(op, &e.to_string(), false),
            }
        }
    }

    fn record_failure(&mut self, op: &FailedOp, reason: &str, timed_out: bool) {
        if timed_out {
            self.report.timed_out += 1;
        } else {
            self.report.failed += 1;
        }
        let fail = self.ledger.push_fail(self.kind, &self.report.task, op);
        if fail.is_empty() {
            self.unrecorded += 1;
        } else {
            warn!("{} {}:{} falló ({}); registrado como {}", op.name(), self.kind, self.report.task, reason, fail);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use social_domain::{DomainStubs, PrivacySettings, PrivacyType};
    use task_ledger::InMemoryTaskLedger;

    #[test]
    fn materialize_rechecks_membership_and_privacy() {
        let (store, users) = DomainStubs::sample_store().unwrap();
        let (ana, beto) = (&users[0], &users[1]);
        let locks = OwnerLocks::new();
        let outsider = DomainStubs::user(&store, "dario").unwrap();
        let public = DomainStubs::post(&store, &ana.id, PrivacySettings::public()).unwrap();
        let hidden = DomainStubs::post(&store, &ana.id, PrivacySettings::new(PrivacyType::None, vec![]).unwrap()).unwrap();

        assert_eq!(materialize(&store, &locks, &beto.id, &public.id).unwrap(), Applied::Done);
        assert_eq!(materialize(&store, &locks, &beto.id, &public.id).unwrap(), Applied::Skipped);
        assert_eq!(materialize(&store, &locks, &outsider.id, &public.id).unwrap(), Applied::Skipped);
        assert_eq!(materialize(&store, &locks, &beto.id, &hidden.id).unwrap(), Applied::Skipped);
        assert_eq!(materialize(&store, &locks, &ana.id, &hidden.id).unwrap(), Applied::Done);
    }

    #[test]
    fn late_purge_does_not_undo_a_refollow() {
        let (store, users) = DomainStubs::sample_store().unwrap();
        let (ana, beto) = (&users[0], &users[1]);
        let locks = OwnerLocks::new();
        let post = DomainStubs::post(&store, &ana.id, PrivacySettings::public()).unwrap();
        materialize(&store, &locks, &beto.id, &post.id).unwrap();

        let purge = FailedOp::PurgeOwnerAuthor { owner: beto.id, author: ana.id };
        assert_eq!(apply_op(&store, &locks, &purge).unwrap(), Applied::Skipped);
        assert!(store.timeline_entry(&beto.id, &post.id).unwrap().is_some());

        store.unfollow(&beto.id, &ana.id).unwrap();
        assert_eq!(apply_op(&store, &locks, &purge).unwrap(), Applied::Done);
        assert!(store.timeline_entry(&beto.id, &post.id).unwrap().is_none());
    }

    #[test]
    fn comment_append_after_its_removal_is_skipped() {
        let (store, users) = DomainStubs::sample_store().unwrap();
        let (ana, beto) = (&users[0], &users[1]);
        let locks = OwnerLocks::new();
        let post = DomainStubs::post(&store, &ana.id, PrivacySettings::public()).unwrap();
        materialize(&store, &locks, &beto.id, &post.id).unwrap();
        let entry = store.timeline_entry(&beto.id, &post.id).unwrap().unwrap();
        let comment = social_domain::Comment::new(post.id, ana.id, "hola").unwrap();
        store.save_comment(&comment).unwrap();

        store.delete_comment(&comment.id).unwrap();
        let remove = FailedOp::RemoveComment { entry: entry.id, comment: comment.id };
        let append = FailedOp::AppendComment { entry: entry.id, comment: comment.id };
        assert_eq!(apply_op(&store, &locks, &remove).unwrap(), Applied::Done);
        assert_eq!(apply_op(&store, &locks, &append).unwrap(), Applied::Skipped);
        assert!(store.timeline_entry(&beto.id, &post.id).unwrap().unwrap().comments.is_empty());
    }

    #[test]
    fn expired_deadline_records_every_target() {
        let (store, users) = DomainStubs::sample_store().unwrap();
        let ana = &users[0];
        let locks = OwnerLocks::new();
        let ledger = InMemoryTaskLedger::in_memory();
        let post = DomainStubs::post(&store, &ana.id, PrivacySettings::public()).unwrap();
        let event = TimelineEvent::PostCreated { post };
        let task = ledger.push_task(&event.task_spec());

        let past = Instant::now();
        let report = FanoutRun::new(&store, &ledger, &locks, task, TaskKind::CreatePost, past).execute(&event).unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.timed_out, 3);
        assert!(!report.completed);
        assert_eq!(ledger.failed_ops(TaskKind::CreatePost, &task).unwrap().len(), 3);
        assert_eq!(store.timeline_len().unwrap(), 0);
    }
}
