// Archivo: stubs.rs
// Propósito: backend en memoria para pruebas y wiring rápido. No es
// durable; reproduce la semántica de conjuntos y hashes de un almacén tipo
// Redis (una clave vacía deja de existir).
use crate::errors::{LedgerError, Result};
use crate::ledger::KvTaskLedger;
use crate::repository::LedgerBackend;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

pub struct InMemoryLedgerBackend {
    sets: Mutex<HashMap<String, BTreeSet<String>>>,
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    /// Hace fallar `hset` (pruebas de rollback).
    fail_hashes: AtomicBool,
}

impl InMemoryLedgerBackend {
    /// Crea un backend vacío.
    pub fn new() -> Self {
        Self { sets: Mutex::new(HashMap::new()),
               hashes: Mutex::new(HashMap::new()),
               fail_hashes: AtomicBool::new(false) }
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `LedgerError::Storage`.
    fn lock<'a, T>(&'a self, m: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
        m.lock().map_err(|e| LedgerError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    pub fn fail_hash_writes(&self, fail: bool) {
        self.fail_hashes.store(fail, Ordering::SeqCst);
    }

    /// Número de claves existentes (conjuntos + hashes).
    pub fn key_count(&self) -> usize {
        let sets = self.sets.lock().map(|s| s.len()).unwrap_or(0);
        let hashes = self.hashes.lock().map(|h| h.len()).unwrap_or(0);
        sets + hashes
    }
}

impl Default for InMemoryLedgerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerBackend for InMemoryLedgerBackend {
    fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.lock(&self.sets)?.entry(key.to_string()).or_default().insert(member.to_string()))
    }

    fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let mut sets = self.lock(&self.sets)?;
        let removed = match sets.get_mut(key) {
            Some(set) => set.remove(member),
            None => false,
        };
        if sets.get(key).map(|s| s.is_empty()).unwrap_or(false) {
            sets.remove(key);
        }
        Ok(removed)
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.lock(&self.sets)?.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        if self.fail_hashes.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage(format!("hset {} rechazado", key)));
        }
        let mut hashes = self.lock(&self.hashes)?;
        let h = hashes.entry(key.to_string()).or_default();
        for (f, v) in fields {
            h.insert(f.clone(), v.clone());
        }
        Ok(())
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.lock(&self.hashes)?.get(key).and_then(|h| h.get(field)).cloned())
    }

    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.lock(&self.hashes)?.get(key).cloned().unwrap_or_default())
    }

    fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        let mut hashes = self.lock(&self.hashes)?;
        let removed = match hashes.get_mut(key) {
            Some(h) => h.remove(field).is_some(),
            None => false,
        };
        if hashes.get(key).map(|h| h.is_empty()).unwrap_or(false) {
            hashes.remove(key);
        }
        Ok(removed)
    }

    fn del(&self, key: &str) -> Result<()> {
        self.lock(&self.sets)?.remove(key);
        self.lock(&self.hashes)?.remove(key);
        Ok(())
    }
}

/// Ledger completo en memoria.
pub type InMemoryTaskLedger = KvTaskLedger<InMemoryLedgerBackend>;

impl InMemoryTaskLedger {
    pub fn in_memory() -> Self {
        KvTaskLedger::new(InMemoryLedgerBackend::new())
    }
}
