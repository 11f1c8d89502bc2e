// shopflow/src/core/context_data.rs
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Shared, lockable state handed to every handler of a pipeline run.
///
/// Cloning is cheap and yields another handle to the same data.
///
/// The guards are blocking `parking_lot` guards: never keep one alive across
/// an `.await`. Copy what you need out of the guard, drop it, then await.
/// State that must be held across awaits (a database transaction, for
/// instance) belongs behind an async mutex stored inside `T`.
#[derive(Debug)]
pub struct ContextData<T: Send + Sync + 'static>(Arc<RwLock<T>>);

impl<T: Send + Sync + 'static> ContextData<T> {
  pub fn new(data: T) -> Self {
    ContextData(Arc::new(RwLock::new(data)))
  }

  pub fn read(&self) -> RwLockReadGuard<'_, T> {
    self.0.read()
  }

  pub fn write(&self) -> RwLockWriteGuard<'_, T> {
    self.0.write()
  }

  /// Runs `f` under a read lock and returns its result; the lock is released
  /// before this returns.
  pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
    f(&self.0.read())
  }

  /// Runs `f` under a write lock and returns its result.
  pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
    f(&mut self.0.write())
  }

  /// True when both handles point at the same underlying data.
  pub fn same_as(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

impl<T: Send + Sync + Clone + 'static> ContextData<T> {
  /// Clones the current value out of the lock.
  pub fn snapshot(&self) -> T {
    self.0.read().clone()
  }
}

impl<T: Send + Sync + 'static> Clone for ContextData<T> {
  fn clone(&self) -> Self {
    ContextData(Arc::clone(&self.0))
  }
}

impl<T: Send + Sync + Default + 'static> Default for ContextData<T> {
  fn default() -> Self {
    Self::new(T::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clones_share_state() {
    let a = ContextData::new(1_i32);
    let b = a.clone();
    b.update(|v| *v += 41);
    assert_eq!(a.snapshot(), 42);
    assert!(a.same_as(&b));
    assert!(!a.same_as(&ContextData::new(42)));
  }

  #[test]
  fn with_returns_projection() {
    let ctx = ContextData::new(vec!["a".to_string(), "b".to_string()]);
    assert_eq!(ctx.with(|v| v.len()), 2);
  }
}
