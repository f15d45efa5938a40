use dashmap::DashMap;
use social_domain::UserId;
use std::sync::{Arc, Mutex};

/// Serializa las escrituras sobre el timeline de un mismo dueño.
///
/// Un candado por dueño, creado bajo demanda y eliminado de la tabla cuando
/// nadie más lo retiene.
#[derive(Default)]
pub struct OwnerLocks {
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ejecuta `f` con el candado de `owner` tomado.
    pub fn with_owner<T, F>(&self, owner: &UserId, f: F) -> T
        where F: FnOnce() -> T
    {
        let lock = self.locks.entry(*owner).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        let out = {
            // El candado no guarda datos: un envenenamiento se ignora.
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };
        drop(lock);
        self.locks.remove_if(owner, |_, l| Arc::strong_count(l) == 1);
        out
    }

    /// Número de candados vivos.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
