// Archivo: ledger.rs
// Propósito: implementación única de `TaskLedger` sobre cualquier
// `LedgerBackend`. Toda la lógica de claves, validación y limpieza vive
// aquí; los backends sólo guardan conjuntos y hashes.
use crate::domain::{FailId, FailedOp, FailedOpRecord, LiveTask, TaskId, TaskKind, TaskSpec};
use crate::errors::{LedgerError, Result};
use crate::keys;
use crate::repository::{LedgerBackend, TaskLedger};
use chrono::{DateTime, Utc};
use log::{debug, error, warn};

/// Ledger de tareas sobre un backend clave/valor.
pub struct KvTaskLedger<B: LedgerBackend> {
    backend: B,
}

impl<B: LedgerBackend> KvTaskLedger<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn try_push_task(&self, spec: &TaskSpec) -> Result<TaskId> {
        let id = TaskId::new();
        let kind = spec.kind();
        let mut fields = spec.to_fields();
        fields.push(("created_at".to_string(), Utc::now().timestamp_millis().to_string()));

        self.backend.sadd(keys::TASKS, &id.to_string())?;
        let written = self.backend
                          .hset(&keys::task(kind, &id), &fields)
                          .and_then(|_| {
                              self.backend
                                  .hset(keys::TASK_INDEX, &[(id.to_string(), kind.as_str().to_string())])
                          });
        if let Err(e) = written {
            // Deshacer lo escrito para no dejar una tarea a medias.
            let _ = self.backend.del(&keys::task(kind, &id));
            let _ = self.backend.srem(keys::TASKS, &id.to_string());
            return Err(e);
        }
        debug!("tarea {} registrada ({})", id, kind);
        Ok(id)
    }

    fn try_push_fail(&self, kind: TaskKind, task: &TaskId, op: &FailedOp) -> Result<FailId> {
        let id = FailId::new();
        let mut fields = op.to_fields();
        fields.push(("kind".to_string(), kind.as_str().to_string()));
        fields.push(("task".to_string(), task.to_string()));
        fields.push(("attempts".to_string(), "0".to_string()));
        fields.push(("next_attempt_at".to_string(), Utc::now().timestamp_millis().to_string()));

        let set = keys::fail_set(kind, task);
        self.backend.sadd(&set, &id.to_string())?;
        if let Err(e) = self.backend.hset(&keys::failed_op(&id), &fields) {
            let _ = self.backend.srem(&set, &id.to_string());
            return Err(e);
        }
        Ok(id)
    }

    fn read_record(&self, id: &FailId) -> Result<Option<FailedOpRecord>> {
        let fields = self.backend.hgetall(&keys::failed_op(id))?;
        if fields.is_empty() {
            return Ok(None);
        }
        FailedOpRecord::from_fields(*id, &fields).map(Some)
    }

    fn read_records(&self, key: &str) -> Result<Vec<FailedOpRecord>> {
        let mut out = Vec::new();
        for member in self.backend.smembers(key)? {
            let id = match member.parse::<FailId>() {
                Ok(id) => id,
                Err(e) => {
                    warn!("miembro inválido en {}: {}", key, e);
                    continue;
                }
            };
            match self.read_record(&id) {
                Ok(Some(r)) => out.push(r),
                Ok(None) => warn!("fallo {} sin hash en {}", id, key),
                Err(e) => warn!("fallo {} ilegible: {}", id, e),
            }
        }
        Ok(out)
    }
}

impl<B: LedgerBackend> TaskLedger for KvTaskLedger<B> {
    fn push_task(&self, spec: &TaskSpec) -> TaskId {
        match self.try_push_task(spec) {
            Ok(id) => id,
            Err(e) => {
                error!("no se pudo registrar la tarea {}: {}", spec.kind(), e);
                TaskId::empty()
            }
        }
    }

    fn push_task_args(&self, kind: &str, args: &[&str]) -> TaskId {
        let spec = kind.parse::<TaskKind>()
                       .and_then(|k| TaskSpec::from_args(k, args));
        match spec {
            Ok(spec) => self.push_task(&spec),
            Err(e) => {
                warn!("tarea rechazada ({}): {}", kind, e);
                TaskId::empty()
            }
        }
    }

    fn push_fail(&self, kind: TaskKind, task: &TaskId, op: &FailedOp) -> FailId {
        if task.is_empty() {
            warn!("fallo {} descartado: tarea vacía", op.name());
            return FailId::empty();
        }
        if !op.allowed_for(kind) {
            warn!("fallo {} no corresponde a tareas {}", op.name(), kind);
            return FailId::empty();
        }
        match self.try_push_fail(kind, task, op) {
            Ok(id) => id,
            Err(e) => {
                error!("no se pudo registrar el fallo {} de {}:{}: {}", op.name(), kind, task, e);
                FailId::empty()
            }
        }
    }

    fn push_fail_args(&self, kind: &str, task: &TaskId, args: &[&str]) -> FailId {
        if task.is_empty() || args.is_empty() {
            return FailId::empty();
        }
        let parsed = kind.parse::<TaskKind>()
                         .and_then(|k| FailedOp::from_args(k, args).map(|op| (k, op)));
        match parsed {
            Ok((k, op)) => self.push_fail(k, task, &op),
            Err(e) => {
                warn!("fallo rechazado ({}): {}", kind, e);
                FailId::empty()
            }
        }
    }

    fn task_done(&self, kind: TaskKind, task: &TaskId) -> Result<()> {
        let set = keys::fail_set(kind, task);
        for member in self.backend.smembers(&set)? {
            match member.parse::<FailId>() {
                Ok(fail) => self.backend.del(&keys::failed_op(&fail))?,
                Err(e) => warn!("miembro inválido en {}: {}", set, e),
            }
        }
        self.backend.del(&set)?;
        self.backend.del(&keys::task(kind, task))?;
        self.backend.hdel(keys::TASK_INDEX, &task.to_string())?;
        self.backend.srem(keys::TASKS, &task.to_string())?;
        debug!("tarea {}:{} cerrada", kind, task);
        Ok(())
    }

    fn failed_op_solved(&self, kind: TaskKind, task: &TaskId, fail: &FailId) -> Result<()> {
        let set = keys::fail_set(kind, task);
        self.backend.del(&keys::failed_op(fail))?;
        self.backend.srem(&set, &fail.to_string())?;
        if self.backend.smembers(&set)?.is_empty() {
            self.task_done(kind, task)?;
        }
        Ok(())
    }

    fn live_tasks(&self) -> Result<Vec<LiveTask>> {
        let mut out = Vec::new();
        for member in self.backend.smembers(keys::TASKS)? {
            let id = match member.parse::<TaskId>() {
                Ok(id) => id,
                Err(e) => {
                    warn!("id de tarea inválido: {}", e);
                    continue;
                }
            };
            let kind = match self.backend.hget(keys::TASK_INDEX, &member)? {
                Some(k) => k.parse::<TaskKind>()?,
                None => {
                    warn!("tarea {} sin entrada en {}", id, keys::TASK_INDEX);
                    continue;
                }
            };
            let fields = self.backend.hgetall(&keys::task(kind, &id))?;
            let created_at = crate::domain::field(&fields, "created_at")
                .and_then(|v| crate::domain::parse_millis("created_at", v));
            match (TaskSpec::from_fields(kind, &fields), created_at) {
                (Ok(spec), Ok(created_at)) => out.push(LiveTask { id, spec, created_at }),
                (Err(e), _) | (_, Err(e)) => warn!("tarea {}:{} ilegible: {}", kind, id, e),
            }
        }
        Ok(out)
    }

    fn failed_ops(&self, kind: TaskKind, task: &TaskId) -> Result<Vec<FailedOpRecord>> {
        self.read_records(&keys::fail_set(kind, task))
    }

    fn record_failed_attempt(&self, fail: &FailId, error: &str, next_attempt_at: DateTime<Utc>) -> Result<u32> {
        let key = keys::failed_op(fail);
        let current = self.backend
                          .hget(&key, "attempts")?
                          .ok_or_else(|| LedgerError::NotFound(format!("fallo {}", fail)))?;
        let attempts = current.parse::<u32>().unwrap_or(0).saturating_add(1);
        self.backend.hset(&key,
                          &[("attempts".to_string(), attempts.to_string()),
                            ("next_attempt_at".to_string(), next_attempt_at.timestamp_millis().to_string()),
                            ("last_error".to_string(), error.to_string())])?;
        Ok(attempts)
    }

    fn bury_failed_op(&self, kind: TaskKind, task: &TaskId, fail: &FailId) -> Result<()> {
        let set = keys::fail_set(kind, task);
        self.backend.sadd(keys::DEAD_OPS, &fail.to_string())?;
        self.backend.srem(&set, &fail.to_string())?;
        warn!("fallo {} de {}:{} abandonado", fail, kind, task);
        if self.backend.smembers(&set)?.is_empty() {
            self.task_done(kind, task)?;
        }
        Ok(())
    }

    fn dead_ops(&self) -> Result<Vec<FailedOpRecord>> {
        self.read_records(keys::DEAD_OPS)
    }
}
