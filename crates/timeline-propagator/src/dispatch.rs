// Archivo: dispatch.rs
// Propósito: pool fijo de workers tokio que ejecutan los fan-outs fuera del
// ciclo petición/respuesta. Cada trabajo corre en `spawn_blocking` porque las
// operaciones del almacén y del ledger son bloqueantes.
use crate::engine::fanout::FanoutReport;
use crate::engine::FanoutCore;
use crate::errors::{PropagationError, Result};
use crate::event::TimelineEvent;
use log::{debug, error, info};
use social_domain::StoreConnector;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use task_ledger::{TaskId, TaskKind};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Job {
    event: TimelineEvent,
    task: TaskId,
    kind: TaskKind,
    reply: oneshot::Sender<Result<FanoutReport>>,
}

/// Señal de finalización de un fan-out encolado.
///
/// Soltar el handle no cancela el trabajo.
#[derive(Debug)]
pub struct FanoutHandle {
    task: TaskId,
    rx: oneshot::Receiver<Result<FanoutReport>>,
}

impl FanoutHandle {
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Espera a que el worker termine el fan-out.
    pub async fn wait(self) -> Result<FanoutReport> {
        match self.rx.await {
            Ok(res) => res,
            Err(_) => Err(PropagationError::Dispatch(format!("el trabajo {} terminó sin respuesta", self.task))),
        }
    }
}

struct Shared<C: StoreConnector> {
    core: Arc<FanoutCore<C>>,
    /// Trabajos encolados o en ejecución.
    pending: AtomicUsize,
    idle: Notify,
}

impl<C: StoreConnector> Shared<C> {
    fn job_finished(&self, task: &TaskId) {
        self.core.finish(task);
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

pub struct Dispatcher<C: StoreConnector> {
    shared: Arc<Shared<C>>,
    tx: mpsc::Sender<Job>,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl<C: StoreConnector> Dispatcher<C> {
    /// Arranca `workers` tareas sobre una cola de `capacity` trabajos. Debe
    /// llamarse dentro de un runtime tokio.
    pub fn start(core: Arc<FanoutCore<C>>, workers: usize, capacity: usize, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(Shared { core, pending: AtomicUsize::new(0), idle: Notify::new() });

        let handles: Vec<JoinHandle<()>> =
            (0..workers.max(1)).map(|n| tokio::spawn(worker_loop(n, shared.clone(), rx.clone(), cancel.clone())))
                               .collect();
        info!("despachador de fan-out iniciado con {} workers", workers.max(1));
        Dispatcher { shared,
                     tx,
                     rx,
                     workers: Mutex::new(handles),
                     cancel }
    }

    pub fn core(&self) -> &Arc<FanoutCore<C>> {
        &self.shared.core
    }

    /// Encola el fan-out de una tarea ya registrada. La tarea queda marcada
    /// como en curso desde este momento hasta que el worker termina.
    pub async fn submit(&self, event: TimelineEvent, task: TaskId) -> Result<FanoutHandle> {
        if self.cancel.is_cancelled() {
            return Err(PropagationError::Dispatch("despachador detenido".into()));
        }
        let kind = event.kind();
        let (reply, rx) = oneshot::channel();
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.core.begin(task);

        if self.tx.send(Job { event, task, kind, reply }).await.is_err() {
            self.shared.job_finished(&task);
            return Err(PropagationError::Dispatch(format!("cola cerrada; {}:{} queda para el Resolver", kind, task)));
        }
        debug!("fan-out {}:{} encolado", kind, task);
        Ok(FanoutHandle { task, rx })
    }

    /// Número de trabajos encolados o en ejecución.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Resuelve cuando no hay trabajos encolados ni en ejecución.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            // Registrarse antes de leer el contador evita perder la señal.
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Detiene los workers, espera a los trabajos en ejecución y descarta
    /// los encolados (sus tareas siguen vivas en el ledger).
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for h in handles {
            if let Err(e) = h.await {
                error!("worker de fan-out terminó con error: {}", e);
            }
        }

        let mut rx = self.rx.lock().await;
        rx.close();
        let mut dropped = 0usize;
        while let Ok(job) = rx.try_recv() {
            self.shared.job_finished(&job.task);
            dropped += 1;
        }
        if dropped > 0 {
            info!("{} fan-outs encolados descartados al detener; quedan para el Resolver", dropped);
        }
        info!("despachador de fan-out detenido");
    }
}

async fn worker_loop<C: StoreConnector>(n: usize,
                                        shared: Arc<Shared<C>>,
                                        rx: Arc<Mutex<mpsc::Receiver<Job>>>,
                                        cancel: CancellationToken) {
    debug!("worker {} iniciado", n);
    loop {
        let job = {
            let mut guard = rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = guard.recv() => job,
            }
        };
        let Some(job) = job else {
            break;
        };
        run_job(&shared, job).await;
    }
    debug!("worker {} detenido", n);
}

async fn run_job<C: StoreConnector>(shared: &Arc<Shared<C>>, job: Job) {
    let Job { event, task, kind, reply } = job;
    let core = shared.core.clone();
    let res = match tokio::task::spawn_blocking(move || core.execute(&event, task, kind)).await {
        Ok(res) => res,
        Err(e) => Err(PropagationError::Dispatch(format!("fan-out {}:{} abortado: {}", kind, task, e))),
    };
    if let Err(e) = &res {
        error!("fan-out {}:{} falló: {}", kind, task, e);
    }
    shared.job_finished(&task);
    // El receptor puede haberse soltado: fire-and-forget.
    let _ = reply.send(res);
}
