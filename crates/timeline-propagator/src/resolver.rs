// Archivo: resolver.rs
// Propósito: reintento en segundo plano de las sub-operaciones fallidas y
// recuperación de tareas huérfanas (registradas pero nunca terminadas).
use crate::config::ResolverConfig;
use crate::engine::FanoutCore;
use crate::errors::{PropagationError, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use social_domain::StoreConnector;
use std::sync::Arc;
use std::time::Duration;
use task_ledger::{FailedOpRecord, LiveTask};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Resumen de una pasada del Resolver.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverReport {
    /// Tareas vivas examinadas.
    pub scanned: usize,
    /// Sub-operaciones reintentadas.
    pub retried: usize,
    pub solved: usize,
    /// Reintentos fallidos reprogramados con backoff.
    pub rescheduled: usize,
    /// Sub-operaciones abandonadas tras agotar los intentos.
    pub buried: usize,
    /// Tareas huérfanas reejecutadas completas.
    pub replayed: usize,
}

impl ResolverReport {
    fn is_quiet(&self) -> bool {
        self.retried == 0 && self.replayed == 0
    }
}

pub struct Resolver<C: StoreConnector> {
    core: Arc<FanoutCore<C>>,
    config: ResolverConfig,
}

impl<C: StoreConnector> Clone for Resolver<C> {
    fn clone(&self) -> Self {
        Resolver { core: self.core.clone(), config: self.config.clone() }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365))
}

impl<C: StoreConnector> Resolver<C> {
    pub fn new(core: Arc<FanoutCore<C>>, config: ResolverConfig) -> Self {
        Resolver { core, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Una pasada completa sobre el ledger.
    pub async fn resolve_once(&self) -> Result<ResolverReport> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.scan(Utc::now()))
            .await
            .map_err(|e| PropagationError::Other(format!("pasada del Resolver abortada: {}", e)))?
    }

    /// Lanza el bucle periódico. Termina cuando se cancela `cancel`.
    pub fn start(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            info!("Resolver iniciado (intervalo={:?})", interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Resolver detenido");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        match this.resolve_once().await {
                            Ok(r) if r.is_quiet() => debug!("Resolver: {} tareas sin trabajo", r.scanned),
                            Ok(r) => info!("Resolver: {:?}", r),
                            Err(e) => error!("Resolver: {}", e),
                        }
                    }
                }
            }
        })
    }

    fn scan(&self, now: DateTime<Utc>) -> Result<ResolverReport> {
        let mut report = ResolverReport::default();
        for task in self.core.ledger().live_tasks()? {
            report.scanned += 1;
            if self.core.is_in_flight(&task.id) {
                continue;
            }
            // Un error en una tarea no detiene la pasada.
            if let Err(e) = self.resolve_task(&task, now, &mut report) {
                error!("Resolver: tarea {}:{}: {}", task.kind(), task.id, e);
            }
        }
        Ok(report)
    }

    fn resolve_task(&self, task: &LiveTask, now: DateTime<Utc>, report: &mut ResolverReport) -> Result<()> {
        let fails = self.core.ledger().failed_ops(task.kind(), &task.id)?;
        if fails.is_empty() {
            if now - task.created_at >= chrono_duration(self.config.stale_task_after) {
                self.replay(task, report)?;
            }
            return Ok(());
        }
        for rec in fails.iter().filter(|r| r.next_attempt_at <= now) {
            self.retry(task, rec, now, report)?;
        }
        Ok(())
    }

    fn retry(&self, task: &LiveTask, rec: &FailedOpRecord, now: DateTime<Utc>, report: &mut ResolverReport) -> Result<()> {
        let ledger = self.core.ledger();
        report.retried += 1;
        match self.core.retry(&rec.op) {
            Ok(_) => {
                ledger.failed_op_solved(rec.kind, &task.id, &rec.id)?;
                debug!("{} de {}:{} resuelto", rec.op.name(), rec.kind, task.id);
                report.solved += 1;
            }
            Err(e) => {
                let next = now + chrono_duration(self.config.backoff(rec.attempts + 1));
                let attempts = ledger.record_failed_attempt(&rec.id, &e.to_string(), next)?;
                if attempts >= self.config.max_attempts {
                    ledger.bury_failed_op(rec.kind, &task.id, &rec.id)?;
                    warn!("{} de {}:{} abandonado tras {} intentos: {}",
                          rec.op.name(),
                          rec.kind,
                          task.id,
                          attempts,
                          e);
                    report.buried += 1;
                } else {
                    debug!("{} de {}:{} reprogramado ({} intentos)", rec.op.name(), rec.kind, task.id, attempts);
                    report.rescheduled += 1;
                }
            }
        }
        Ok(())
    }

    /// Reejecuta una tarea huérfana completa. Las sub-operaciones son
    /// idempotentes, así que repetir lo ya hecho no duplica nada.
    fn replay(&self, task: &LiveTask, report: &mut ResolverReport) -> Result<()> {
        if !self.core.begin(task.id) {
            return Ok(());
        }
        let res = self.replay_in_flight(task);
        self.core.finish(&task.id);
        if res.is_ok() {
            report.replayed += 1;
        }
        res
    }

    fn replay_in_flight(&self, task: &LiveTask) -> Result<()> {
        match self.core.event_for(&task.spec)? {
            Some(event) => {
                info!("reejecutando tarea huérfana {}:{}", task.kind(), task.id);
                self.core.execute(&event, task.id, task.kind())?;
            }
            None => {
                info!("tarea huérfana {}:{} sin nada que propagar; se cierra", task.kind(), task.id);
                self.core.ledger().task_done(task.kind(), &task.id)?;
            }
        }
        Ok(())
    }
}
