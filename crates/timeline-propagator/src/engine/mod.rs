//! Núcleo de ejecución compartido por el despachador y el Resolver.
pub mod fanout;
pub mod owner_locks;

use crate::errors::Result;
use crate::event::TimelineEvent;
use dashmap::DashSet;
use fanout::{apply_op, Applied, FanoutReport, FanoutRun};
use owner_locks::OwnerLocks;
use social_domain::{SocialStore, StoreConnector};
use std::sync::Arc;
use std::time::{Duration, Instant};
use task_ledger::{FailedOp, TaskId, TaskKind, TaskLedger, TaskSpec};

/// Estado compartido de la propagación: fábrica de sesiones, ledger,
/// candados por dueño y registro de tareas en curso.
///
/// Todos los métodos son bloqueantes; los llamadores asíncronos los
/// ejecutan dentro de `spawn_blocking`.
pub struct FanoutCore<C: StoreConnector> {
    connector: C,
    ledger: Arc<dyn TaskLedger>,
    locks: OwnerLocks,
    in_flight: DashSet<TaskId>,
    fanout_timeout: Duration,
}

impl<C: StoreConnector> FanoutCore<C> {
    pub fn new(connector: C, ledger: Arc<dyn TaskLedger>, fanout_timeout: Duration) -> Self {
        FanoutCore { connector,
                     ledger,
                     locks: OwnerLocks::new(),
                     in_flight: DashSet::new(),
                     fanout_timeout }
    }

    pub fn ledger(&self) -> &Arc<dyn TaskLedger> {
        &self.ledger
    }

    pub fn fanout_timeout(&self) -> Duration {
        self.fanout_timeout
    }

    /// Ejecuta el fan-out de una tarea sobre una sesión propia. La sesión se
    /// libera al salir, también si el fan-out falla.
    pub fn execute(&self, event: &TimelineEvent, task: TaskId, kind: TaskKind) -> Result<FanoutReport> {
        let session = self.connector.open()?;
        let deadline = Instant::now() + self.fanout_timeout;
        FanoutRun::new(&session, self.ledger.as_ref(), &self.locks, task, kind, deadline).execute(event)
    }

    /// Reintenta una sola sub-operación.
    pub fn retry(&self, op: &FailedOp) -> Result<Applied> {
        let session = self.connector.open()?;
        Ok(apply_op(&session, &self.locks, op)?)
    }

    /// Reconstruye el evento de una tarea registrada. `None` si ya no queda
    /// nada que propagar (el post de un `create_post` fue borrado).
    pub fn event_for(&self, spec: &TaskSpec) -> Result<Option<TimelineEvent>> {
        let current = match spec {
            TaskSpec::CreatePost { post, .. } => self.connector.open()?.get_post(post)?,
            _ => None,
        };
        Ok(TimelineEvent::from_spec(spec, current))
    }

    /// Marca la tarea como en curso. Devuelve `false` si ya lo estaba.
    pub fn begin(&self, task: TaskId) -> bool {
        self.in_flight.insert(task)
    }

    pub fn finish(&self, task: &TaskId) {
        self.in_flight.remove(task);
    }

    pub fn is_in_flight(&self, task: &TaskId) -> bool {
        self.in_flight.contains(task)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use social_domain::{DomainStubs, PrivacySettings};
    use task_ledger::InMemoryTaskLedger;

    #[test]
    fn replayed_create_post_without_post_has_no_event() {
        let (store, users) = DomainStubs::sample_store().unwrap();
        let core = FanoutCore::new(store.clone(), Arc::new(InMemoryTaskLedger::in_memory()), Duration::from_secs(5));
        let post = DomainStubs::post(&store, &users[0].id, PrivacySettings::public()).unwrap();
        let spec = TimelineEvent::PostCreated { post: post.clone() }.task_spec();

        assert!(matches!(core.event_for(&spec).unwrap(), Some(TimelineEvent::PostCreated { .. })));
        store.delete_post(&post.id).unwrap();
        assert_eq!(core.event_for(&spec).unwrap(), None);
    }

    #[test]
    fn execute_completes_the_task() {
        let (store, users) = DomainStubs::sample_store().unwrap();
        let ledger = Arc::new(InMemoryTaskLedger::in_memory());
        let core = FanoutCore::new(store.clone(), ledger.clone(), Duration::from_secs(5));
        let post = DomainStubs::post(&store, &users[0].id, PrivacySettings::public()).unwrap();
        let event = TimelineEvent::PostCreated { post };
        let task = ledger.push_task(&event.task_spec());

        let report = core.execute(&event, task, event.kind()).unwrap();
        assert!(report.completed);
        assert_eq!(report.succeeded, 3);
        assert!(ledger.live_tasks().unwrap().is_empty());
    }
}
