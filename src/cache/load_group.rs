//! Load Group Module
//!
//! Single-flight coordination: concurrent misses on the same key share one
//! producer call and all of them observe its result.
//!
//! The first caller for a key becomes the leader and runs the producer on
//! its own thread. Later callers find the registered call and wait on it.
//! The registry lock is never held while the producer runs.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{CacheError, Result};

// == Wait Mode ==
/// How a caller behaves when the key is already being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Block until the in-flight load finishes
    Block,
    /// Return [`CacheError::StillLoading`] immediately
    NoWait,
    /// Block until the deadline, then return [`CacheError::Timeout`]
    Until(Instant),
}

impl Wait {
    /// Waits at most `timeout` from now.
    ///
    /// A deadline too far out to represent waits indefinitely.
    pub fn timeout(timeout: Duration) -> Self {
        Instant::now()
            .checked_add(timeout)
            .map_or(Wait::Block, Wait::Until)
    }
}

#[derive(Debug)]
struct CallState<V> {
    result: Option<Result<V>>,
    waiters: usize,
}

#[derive(Debug)]
struct Call<V> {
    state: Mutex<CallState<V>>,
    done: Condvar,
}

impl<V> Call<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState {
                result: None,
                waiters: 0,
            }),
            done: Condvar::new(),
        }
    }
}

enum Role<V> {
    Leader(Arc<Call<V>>),
    Waiter(Arc<Call<V>>),
}

// == Load Group ==
/// Registry of in-flight producer calls keyed by cache key.
#[derive(Debug)]
pub struct LoadGroup<K, V> {
    calls: Mutex<HashMap<K, Arc<Call<V>>>>,
}

impl<K, V> Default for LoadGroup<K, V> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> LoadGroup<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    // == Do ==
    /// Runs `producer` for `key` unless a call is already in flight.
    ///
    /// Returns the value and whether it came from another caller's call.
    /// A panicking producer is reported as [`CacheError::LoaderPanic`] to the
    /// leader and every waiter.
    pub fn run<F>(&self, key: &K, wait: Wait, producer: F) -> Result<(V, bool)>
    where
        F: FnOnce() -> Result<V>,
    {
        match self.claim(key) {
            Role::Leader(call) => self.lead(key, &call, producer).map(|v| (v, false)),
            Role::Waiter(call) => Self::follow(&call, wait).map(|v| (v, true)),
        }
    }

    /// Number of keys with a producer currently running.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of callers currently parked on the call for `key`.
    pub fn waiters(&self, key: &K) -> usize {
        let call = self.calls.lock().get(key).cloned();
        call.map_or(0, |call| call.state.lock().waiters)
    }

    fn claim(&self, key: &K) -> Role<V> {
        let mut calls = self.calls.lock();
        if let Some(existing) = calls.get(key) {
            return Role::Waiter(Arc::clone(existing));
        }
        let call = Arc::new(Call::new());
        calls.insert(key.clone(), Arc::clone(&call));
        Role::Leader(call)
    }

    fn lead<F>(&self, key: &K, call: &Arc<Call<V>>, producer: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        let result = match catch_unwind(AssertUnwindSafe(producer)) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%message, "loader panicked; reporting it as an error");
                Err(CacheError::LoaderPanic(message))
            }
        };

        let waiters = {
            let mut state = call.state.lock();
            state.result = Some(result.clone());
            state.waiters
        };
        call.done.notify_all();
        self.calls.lock().remove(key);

        if waiters > 0 {
            debug!(waiters, "load result shared with waiting callers");
        }
        result
    }

    fn follow(call: &Call<V>, wait: Wait) -> Result<V> {
        let mut state = call.state.lock();
        if let Some(result) = &state.result {
            return result.clone();
        }

        let started = Instant::now();
        match wait {
            Wait::NoWait => return Err(CacheError::StillLoading),
            Wait::Block => {
                state.waiters += 1;
                while state.result.is_none() {
                    call.done.wait(&mut state);
                }
            }
            Wait::Until(deadline) => {
                state.waiters += 1;
                while state.result.is_none() {
                    if call.done.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        state.waiters -= 1;

        match &state.result {
            Some(result) => result.clone(),
            None => Err(CacheError::Timeout(started.elapsed())),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_single_caller_runs_producer() {
        let group: LoadGroup<&str, u32> = LoadGroup::new();
        let (value, shared) = group.run(&"k", Wait::Block, || Ok(7)).unwrap();

        assert_eq!(value, 7);
        assert!(!shared);
        assert_eq!(group.in_flight(), 0);
    }

    #[test]
    fn test_sequential_calls_each_run_producer() {
        let group: LoadGroup<&str, u32> = LoadGroup::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            group
                .run(&"k", Wait::Block, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_concurrent_callers_share_one_call() {
        let group = Arc::new(LoadGroup::<String, u64>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let group = Arc::clone(&group);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    group.run(&"key".to_string(), Wait::Block, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(100));
                        Ok(42)
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| matches!(r, Ok((42, _)))));
        assert_eq!(results.iter().filter(|r| matches!(r, Ok((_, false)))).count(), 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[test]
    fn test_error_is_shared_with_waiters() {
        let group = Arc::new(LoadGroup::<&'static str, u32>::new());
        let (started_tx, started_rx) = std::sync::mpsc::channel();

        let leader = {
            let group = Arc::clone(&group);
            thread::spawn(move || {
                group.run(&"k", Wait::Block, || {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(100));
                    Err(CacheError::loader(anyhow::anyhow!("backend down")))
                })
            })
        };
        started_rx.recv().unwrap();

        let waited = group.run(&"k", Wait::Block, || Ok(0));
        let led = leader.join().unwrap();

        assert!(matches!(waited, Err(CacheError::Loader(_))));
        assert!(matches!(led, Err(CacheError::Loader(_))));
    }

    #[test]
    fn test_panic_becomes_error_and_frees_slot() {
        let group: LoadGroup<&str, u32> = LoadGroup::new();
        let result = group.run(&"k", Wait::Block, || panic!("exploded"));

        match result {
            Err(CacheError::LoaderPanic(message)) => assert!(message.contains("exploded")),
            other => panic!("expected LoaderPanic, got {:?}", other),
        }
        assert_eq!(group.in_flight(), 0);
        assert_eq!(group.run(&"k", Wait::Block, || Ok(3)).unwrap().0, 3);
    }

    #[test]
    fn test_no_wait_reports_still_loading() {
        let group = Arc::new(LoadGroup::<&'static str, u32>::new());
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let leader = {
            let group = Arc::clone(&group);
            thread::spawn(move || {
                group.run(&"k", Wait::Block, move || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(5)
                })
            })
        };
        started_rx.recv().unwrap();

        let result = group.run(&"k", Wait::NoWait, || Ok(0));
        assert!(matches!(result, Err(CacheError::StillLoading)));

        release_tx.send(()).unwrap();
        assert_eq!(leader.join().unwrap().unwrap(), (5, false));
    }

    #[test]
    fn test_unrepresentable_timeout_blocks() {
        assert_eq!(Wait::timeout(Duration::MAX), Wait::Block);
        assert!(matches!(
            Wait::timeout(Duration::from_millis(5)),
            Wait::Until(_)
        ));
    }

    #[test]
    fn test_deadline_times_out_without_cancelling_leader() {
        let group = Arc::new(LoadGroup::<&'static str, u32>::new());
        let (started_tx, started_rx) = std::sync::mpsc::channel();

        let leader = {
            let group = Arc::clone(&group);
            thread::spawn(move || {
                group.run(&"k", Wait::Block, move || {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(200));
                    Ok(9)
                })
            })
        };
        started_rx.recv().unwrap();

        let result = group.run(&"k", Wait::timeout(Duration::from_millis(20)), || Ok(0));
        assert!(matches!(result, Err(CacheError::Timeout(_))));
        assert_eq!(group.waiters(&"k"), 0);

        assert_eq!(leader.join().unwrap().unwrap(), (9, false));
    }
}
