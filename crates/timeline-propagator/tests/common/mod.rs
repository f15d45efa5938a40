// Utilidades compartidas por los tests de integración del propagador.
#![allow(dead_code)]

use social_domain::{DomainStubs, InMemorySocialStore, User};
use std::sync::Arc;
use std::time::Duration;
use task_ledger::InMemoryTaskLedger;
use timeline_propagator::{FanoutHandle, FanoutReport, FanoutRuntime, PropagatorConfig, ResolverConfig, Result};

pub struct Harness {
  pub runtime: FanoutRuntime<InMemorySocialStore>,
  pub store: InMemorySocialStore,
  pub ledger: Arc<InMemoryTaskLedger>,
  /// `ana`, `beto`, `carla`; beto y carla siguen a ana.
  pub users: Vec<User>,
}

/// Configuración de pruebas: el bucle del Resolver nunca se dispara solo y
/// los reintentos no esperan.
pub fn test_config() -> PropagatorConfig {
  PropagatorConfig { debug: false,
                     workers: 4,
                     queue_capacity: 64,
                     fanout_timeout: Duration::from_secs(10),
                     resolver: ResolverConfig { interval: Duration::from_secs(3600),
                                                max_attempts: 3,
                                                base_backoff: Duration::ZERO,
                                                max_backoff: Duration::ZERO,
                                                stale_task_after: Duration::from_secs(3600) } }
}

pub fn harness_with(config: PropagatorConfig) -> Harness {
  let (store, users) = DomainStubs::sample_store().unwrap();
  let ledger = Arc::new(InMemoryTaskLedger::in_memory());
  let runtime = FanoutRuntime::start(store.clone(), ledger.clone(), config).unwrap();
  Harness { runtime, store, ledger, users }
}

pub fn harness() -> Harness {
  harness_with(test_config())
}

/// Espera el informe de un evento propagado.
pub async fn finished(handle: Result<Option<FanoutHandle>>) -> FanoutReport {
  handle.unwrap().expect("propagación activa").wait().await.unwrap()
}
