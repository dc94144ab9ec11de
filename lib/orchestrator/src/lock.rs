//! Per-pod keyed mutex, §5: "Two concurrent operations on the same
//! podId must be serialized... the lock is acquired in the orchestrator
//! before reading the record and released after the final status
//! write." Different pod ids never contend with each other or with the
//! process-wide port allocator.
//!
//! Per the "Concurrency control" design note, entries are held by a
//! weak reference so the map doesn't grow without bound across the
//! lifetime of a long-running core process: once the last guard for a
//! pod id is dropped, its entry is free to be collected.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct PodLocks {
  entries: DashMap<String, Weak<Mutex<()>>>,
}

/// Holds the pod's lock until dropped. Opaque — callers only need its
/// lifetime, never its contents.
pub struct PodLockGuard(#[allow(dead_code)] OwnedMutexGuard<()>);

impl PodLocks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Acquires the lock for `pod_id`, creating its entry if this is the
  /// first caller to ever lock it (or if every previous holder has
  /// already dropped its guard and the entry was collected).
  pub async fn lock(&self, pod_id: &str) -> PodLockGuard {
    let mutex = loop {
      if let Some(existing) = self.entries.get(pod_id).and_then(|w| w.upgrade()) {
        break existing;
      }
      let fresh = Arc::new(Mutex::new(()));
      self.entries.insert(pod_id.to_string(), Arc::downgrade(&fresh));
      break fresh;
    };
    PodLockGuard(mutex.lock_owned().await)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  #[tokio::test]
  async fn serializes_operations_on_the_same_pod_id() {
    let locks = Arc::new(PodLocks::new());
    let counter = Arc::new(AtomicU32::new(0));
    let max_concurrent = Arc::new(AtomicU32::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
      let locks = locks.clone();
      let counter = counter.clone();
      let max_concurrent = max_concurrent.clone();
      tasks.push(tokio::spawn(async move {
        let _guard = locks.lock("pod1").await;
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max_concurrent.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        counter.fetch_sub(1, Ordering::SeqCst);
      }));
    }
    for task in tasks {
      task.await.unwrap();
    }
    assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn different_pod_ids_do_not_contend() {
    let locks = PodLocks::new();
    let _a = locks.lock("pod-a").await;
    // Locking a different pod id must not block even while `pod-a`'s
    // guard is held.
    let fut = locks.lock("pod-b");
    tokio::time::timeout(Duration::from_millis(50), fut)
      .await
      .expect("locking a different pod id should not block");
  }

  #[tokio::test]
  async fn a_dropped_guard_releases_the_lock_for_the_next_caller() {
    let locks = PodLocks::new();
    {
      let _guard = locks.lock("pod1").await;
    }
    let fut = locks.lock("pod1");
    tokio::time::timeout(Duration::from_millis(50), fut)
      .await
      .expect("lock should be free after its guard is dropped");
  }
}
