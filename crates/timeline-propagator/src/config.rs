use crate::errors::{PropagationError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Política de reintentos del Resolver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Cada cuánto se escanea el ledger.
    pub interval: Duration,
    /// Intentos tras los que una operación fallida se abandona.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Antigüedad a partir de la cual una tarea sin fallos registrados se
    /// considera huérfana y se reejecuta completa.
    pub stale_task_after: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig { interval: Duration::from_secs(30),
                         max_attempts: 8,
                         base_backoff: Duration::from_millis(1000),
                         max_backoff: Duration::from_millis(300_000),
                         stale_task_after: Duration::from_secs(600) }
    }
}

impl ResolverConfig {
    /// Espera antes del siguiente intento tras `attempts` fallos:
    /// `base * 2^(attempts-1)`, acotada por `max_backoff`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Configuración del propagador.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropagatorConfig {
    /// Modo depuración: la propagación queda desactivada.
    pub debug: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    /// Plazo de cada fan-out; los destinos no procesados a tiempo se anotan
    /// como fallos.
    pub fanout_timeout: Duration,
    pub resolver: ResolverConfig,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        PropagatorConfig { debug: false,
                           workers: 4,
                           queue_capacity: 1024,
                           fanout_timeout: Duration::from_millis(30_000),
                           resolver: ResolverConfig::default() }
    }
}

impl PropagatorConfig {
    /// Lee la configuración de las variables `TIMELINE_*` (cargando `.env`
    /// si existe). Las variables ausentes toman el valor por defecto.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Igual que `from_env` pero con una función de búsqueda arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
        where F: Fn(&str) -> Option<String>
    {
        let d = PropagatorConfig::default();
        let millis = |key: &str, default: Duration| -> Result<Duration> {
            parse_or(&lookup, key, default.as_millis() as u64).map(Duration::from_millis)
        };
        let secs = |key: &str, default: Duration| -> Result<Duration> {
            parse_or(&lookup, key, default.as_secs()).map(Duration::from_secs)
        };

        let cfg = PropagatorConfig { debug: parse_bool_or(&lookup, "TIMELINE_DEBUG", d.debug)?,
                                     workers: parse_or(&lookup, "TIMELINE_WORKERS", d.workers)?,
                                     queue_capacity: parse_or(&lookup, "TIMELINE_QUEUE_CAPACITY", d.queue_capacity)?,
                                     fanout_timeout: millis("TIMELINE_FANOUT_TIMEOUT_MS", d.fanout_timeout)?,
                                     resolver: ResolverConfig { interval: secs("TIMELINE_RESOLVER_INTERVAL_SECS",
                                                                               d.resolver.interval)?,
                                                                max_attempts: parse_or(&lookup,
                                                                                       "TIMELINE_RESOLVER_MAX_ATTEMPTS",
                                                                                       d.resolver.max_attempts)?,
                                                                base_backoff: millis("TIMELINE_RESOLVER_BASE_BACKOFF_MS",
                                                                                     d.resolver.base_backoff)?,
                                                                max_backoff: millis("TIMELINE_RESOLVER_MAX_BACKOFF_MS",
                                                                                    d.resolver.max_backoff)?,
                                                                stale_task_after: secs("TIMELINE_RESOLVER_STALE_TASK_SECS",
                                                                                       d.resolver.stale_task_after)? } };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PropagationError::Config("TIMELINE_WORKERS debe ser mayor que 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(PropagationError::Config("TIMELINE_QUEUE_CAPACITY debe ser mayor que 0".into()));
        }
        if self.resolver.max_attempts == 0 {
            return Err(PropagationError::Config("TIMELINE_RESOLVER_MAX_ATTEMPTS debe ser mayor que 0".into()));
        }
        if self.resolver.interval.is_zero() {
            return Err(PropagationError::Config("TIMELINE_RESOLVER_INTERVAL_SECS debe ser mayor que 0".into()));
        }
        if self.resolver.base_backoff > self.resolver.max_backoff {
            return Err(PropagationError::Config("el backoff base supera al máximo".into()));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
    where F: Fn(&str) -> Option<String>,
          T: FromStr,
          T::Err: std::fmt::Display
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim()
                        .parse::<T>()
                        .map_err(|e| PropagationError::Config(format!("{}='{}': {}", key, raw, e))),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
    where F: Fn(&str) -> Option<String>
{
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") | Some("TRUE") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("FALSE") | Some("no") | Some("") => Ok(false),
        Some(other) => Err(PropagationError::Config(format!("{}='{}' no es booleano", key, other))),
    }
}
