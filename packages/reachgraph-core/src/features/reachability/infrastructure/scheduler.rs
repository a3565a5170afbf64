/*
 * Work scheduler
 *
 * Bounded pool of rayon workers pulling propagation units from a shared
 * Mutex-backed queue, with polling-based termination: a worker exits when
 * the queue is empty and no submitted unit is still executing. Tasks may
 * submit further tasks (fan-out), so the pending counter is decremented
 * only after a unit finishes executing.
 *
 * No ordering is guaranteed between sibling units and none is required;
 * every unit's effect is idempotent and monotonic.
 */

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::error;

use crate::features::reachability::domain::{MethodId, Reason, TypeId};

/// One unit of propagation work
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// A method body became implementation-invoked; fetch and process its summary
    MethodImplementationInvoked(MethodId),
    /// A method became invoked; resolve it against instantiated receivers
    MethodInvoked(MethodId, Arc<Reason>),
    /// A type became instantiated; activate invoked methods along its chain
    TypeInstantiated(TypeId),
}

/// Concurrent task executor for propagation units
pub struct WorkScheduler {
    queue: Mutex<VecDeque<WorkItem>>,
    /// Units submitted but not yet finished executing
    pending: AtomicUsize,
    /// Set when a task requests a fatal stop; halts all workers
    stop: AtomicBool,
    executed_total: AtomicUsize,
    workers: usize,
}

impl WorkScheduler {
    pub fn new(workers: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            pending: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            executed_total: AtomicUsize::new(0),
            workers: workers.max(1),
        }
    }

    /// Enqueue a unit for asynchronous execution.
    pub fn schedule(&self, item: WorkItem) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.queue.lock().push_back(item);
    }

    /// Units submitted but not yet completed.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Units executed over the whole run.
    pub fn executed_total(&self) -> usize {
        self.executed_total.load(Ordering::Acquire)
    }

    /// Prepare for the next drain.
    pub fn reset(&self) {
        self.stop.store(false, Ordering::Release);
    }

    /// Run workers until no unit is pending, then return how many units this
    /// drain executed. `run` returns false to request a fatal stop.
    ///
    /// A panicking unit is caught and logged; the pool keeps draining.
    pub fn drain<F>(&self, run: F) -> usize
    where
        F: Fn(WorkItem) -> bool + Send + Sync,
    {
        self.reset();
        let executed = AtomicUsize::new(0);

        (0..self.workers).into_par_iter().for_each(|_| loop {
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            let item = self.queue.lock().pop_front();
            match item {
                Some(item) => {
                    let keep_going = match catch_unwind(AssertUnwindSafe(|| run(item.clone()))) {
                        Ok(keep_going) => keep_going,
                        Err(_) => {
                            error!(task = ?item, "propagation task panicked; continuing with remaining work");
                            true
                        }
                    };
                    executed.fetch_add(1, Ordering::Relaxed);
                    self.executed_total.fetch_add(1, Ordering::Relaxed);
                    self.pending.fetch_sub(1, Ordering::AcqRel);
                    if !keep_going {
                        self.stop.store(true, Ordering::Release);
                        break;
                    }
                }
                None => {
                    if self.pending.load(Ordering::Acquire) == 0 {
                        break;
                    }
                    // Another worker is still executing a unit that may fan
                    // out; poll until the queue refills or pending hits zero.
                    std::thread::sleep(Duration::from_micros(10));
                }
            }
        });

        executed.load(Ordering::Relaxed)
    }
}
