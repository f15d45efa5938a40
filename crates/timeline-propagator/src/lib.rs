//! Crate `timeline-propagator` — fan-out de timelines en escritura
//!
//! Cada evento social (post creado, follow, like, comentario, borrado...)
//! se registra como tarea en el ledger y se propaga de forma asíncrona a
//! las filas desnormalizadas de `timelines`, de modo que leer un feed es una
//! sola consulta indexada.
//!
//! Piezas:
//! - `Propagator`: API `on_*` que usan los handlers tras persistir el cambio.
//! - `Dispatcher`: pool fijo de workers con señal de finalización por
//!   trabajo (`FanoutHandle`) y `wait_idle`.
//! - `engine`: fan-out por destino, candados por dueño y re-evaluación de
//!   la visibilidad con `social_domain::can_access`.
//! - `Resolver`: reintenta las sub-operaciones fallidas con backoff y
//!   reejecuta tareas huérfanas.
//! - `FanoutRuntime`: cablea todo lo anterior.
//!
//! Ejemplo rápido:
//! ```rust,no_run
//! use std::sync::Arc;
//! use social_domain::{DomainStubs, PrivacySettings};
//! use task_ledger::InMemoryTaskLedger;
//! use timeline_propagator::{FanoutRuntime, PropagatorConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (store, users) = DomainStubs::sample_store()?;
//! let runtime = FanoutRuntime::start(store.clone(), Arc::new(InMemoryTaskLedger::in_memory()), PropagatorConfig::default())?;
//! let post = DomainStubs::post(&store, &users[0].id, PrivacySettings::public())?;
//! if let Some(handle) = runtime.propagator().on_post_created(&post).await? {
//!     let report = handle.wait().await?;
//!     assert!(report.completed);
//! }
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod event;
pub mod propagator;
pub mod resolver;
pub mod runtime;

pub use config::{PropagatorConfig, ResolverConfig};
pub use dispatch::{Dispatcher, FanoutHandle};
pub use engine::fanout::{Applied, FanoutReport};
pub use engine::owner_locks::OwnerLocks;
pub use engine::FanoutCore;
pub use errors::{PropagationError, Result};
pub use event::TimelineEvent;
pub use propagator::Propagator;
pub use resolver::{Resolver, ResolverReport};
pub use runtime::FanoutRuntime;
