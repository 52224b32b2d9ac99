use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Cellule "un écrivain, N lecteurs" : un lecteur obtient toujours une valeur
/// complète, l'ancienne ou la nouvelle, jamais un mélange.
#[derive(Debug, Default)]
pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self { current: RwLock::new(Arc::new(value)) }
    }

    pub fn load(&self) -> Arc<T> {
        self.current.read().clone()
    }

    pub fn publish(&self, value: T) {
        *self.current.write() = Arc::new(value);
    }
}
