use crate::config::PropagatorConfig;
use crate::dispatch::Dispatcher;
use crate::engine::FanoutCore;
use crate::errors::Result;
use crate::propagator::Propagator;
use crate::resolver::Resolver;
use log::info;
use social_domain::StoreConnector;
use std::sync::Arc;
use task_ledger::TaskLedger;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Propagador, despachador y Resolver cableados sobre un mismo almacén y
/// ledger.
pub struct FanoutRuntime<C: StoreConnector> {
    propagator: Propagator<C>,
    resolver: Resolver<C>,
    dispatcher: Arc<Dispatcher<C>>,
    resolver_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl<C: StoreConnector> FanoutRuntime<C> {
    /// Arranca los workers y, salvo en modo depuración, el bucle del
    /// Resolver. Debe llamarse dentro de un runtime tokio.
    pub fn start(connector: C, ledger: Arc<dyn TaskLedger>, config: PropagatorConfig) -> Result<Self> {
        config.validate()?;
        let cancel = CancellationToken::new();
        let core = Arc::new(FanoutCore::new(connector, ledger, config.fanout_timeout));
        let dispatcher = Arc::new(Dispatcher::start(core.clone(),
                                                    config.workers,
                                                    config.queue_capacity,
                                                    cancel.child_token()));
        let propagator = Propagator::new(dispatcher.clone(), config.debug);
        let resolver = Resolver::new(core, config.resolver.clone());
        let resolver_task = if config.debug {
            None
        } else {
            Some(resolver.start(config.resolver.interval, cancel.child_token()))
        };
        info!("runtime de timelines iniciado (debug={}, workers={})", config.debug, config.workers);
        Ok(FanoutRuntime { propagator,
                           resolver,
                           dispatcher,
                           resolver_task,
                           cancel })
    }

    pub fn propagator(&self) -> &Propagator<C> {
        &self.propagator
    }

    pub fn resolver(&self) -> &Resolver<C> {
        &self.resolver
    }

    /// Detiene el Resolver y los workers; espera a los fan-outs en curso.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.resolver_task.take() {
            let _ = task.await;
        }
        self.dispatcher.shutdown().await;
        info!("runtime de timelines detenido");
    }
}
