//! Run closures on one designated thread.
//!
//! Some state may only be touched from a single thread (UI objects,
//! thread-affine OS effect APIs). [`MainExecutor`] lets any thread queue work
//! for that thread. The designated thread calls [`MainExecutor::run_loop`],
//! which blocks on the queue and runs actions lowest priority value first.
//! Actions with equal priority run in submission order.

use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    panic::{self, AssertUnwindSafe},
    result::Result as StdResult,
    sync::Arc,
    thread::{self, ThreadId},
};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, error, trace};

/// Priority for ordinary work.
pub const DEFAULT_PRIORITY: u32 = 10;

/// Priority of the stop request queued by [`MainExecutor::close`]. Work
/// posted at this priority before `close` still runs; work at any other
/// priority is dropped.
pub const SHUTDOWN_PRIORITY: u32 = 0;

/// Executor errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// `run_loop` was called from a thread other than the designated one.
    #[error("executor loop must run on its designated thread")]
    WrongThread,
    /// The executor has been closed.
    #[error("executor is closed")]
    Closed,
}

/// Convenient result type for executor operations.
pub type Result<T> = StdResult<T, Error>;

/// Boxed unit of work.
type Action = Box<dyn FnOnce() + Send + 'static>;

/// A queued action; `None` is the stop marker.
struct Job {
    /// Lower runs first.
    priority: u32,
    /// Submission counter; breaks priority ties.
    seq: u64,
    /// Work to run.
    action: Option<Action>,
}

impl Job {
    /// Ordering key.
    fn key(&self) -> (u32, u64) {
        (self.priority, self.seq)
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Queue state.
#[derive(Default)]
struct Queue {
    /// Pending jobs, smallest key on top.
    heap: BinaryHeap<Reverse<Job>>,
    /// Next submission number.
    next_seq: u64,
    /// No new work is accepted.
    closed: bool,
    /// The stop marker has been consumed.
    stopped: bool,
}

impl Queue {
    /// Push a job with the next sequence number.
    fn push(&mut self, priority: u32, action: Option<Action>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Job {
            priority,
            seq,
            action,
        }));
    }
}

/// Shared executor state.
struct Inner {
    /// Pending work.
    queue: Mutex<Queue>,
    /// Signalled when work is queued.
    ready: Condvar,
    /// The only thread allowed to run actions.
    main_thread: ThreadId,
}

/// Cloneable handle to a single-thread work queue.
#[derive(Clone)]
pub struct MainExecutor {
    /// Shared state.
    inner: Arc<Inner>,
}

impl Default for MainExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MainExecutor {
    /// An executor bound to the calling thread.
    pub fn new() -> Self {
        Self::for_thread(thread::current().id())
    }

    /// An executor bound to `main_thread`.
    pub fn for_thread(main_thread: ThreadId) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(Queue::default()),
                ready: Condvar::new(),
                main_thread,
            }),
        }
    }

    /// True when called from the designated thread.
    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.inner.main_thread
    }

    /// True until [`Self::close`] is called.
    pub fn is_alive(&self) -> bool {
        !self.inner.queue.lock().closed
    }

    /// Queue `action` to run on the designated thread.
    pub fn post<F>(&self, priority: u32, action: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.inner.queue.lock();
        if queue.closed {
            return Err(Error::Closed);
        }
        queue.push(priority, Some(Box::new(action)));
        drop(queue);
        self.inner.ready.notify_one();
        Ok(())
    }

    /// Run `f` now if on the designated thread and return its result.
    /// Otherwise queue it and return `None`; the result is discarded.
    pub fn run_on_main<F, R>(&self, priority: u32, f: F) -> Option<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: 'static,
    {
        if self.is_main_thread() {
            return Some(f());
        }
        if self
            .post(priority, move || {
                let _discarded = f();
            })
            .is_err()
        {
            debug!("executor closed; dropping main-thread call");
        }
        None
    }

    /// Stop accepting work and ask the loop to exit. Work queued at
    /// [`SHUTDOWN_PRIORITY`] before this call still runs; the rest is
    /// dropped. Idempotent.
    pub fn close(&self) {
        let mut queue = self.inner.queue.lock();
        if queue.closed {
            return;
        }
        queue.closed = true;
        queue.push(SHUTDOWN_PRIORITY, None);
        drop(queue);
        self.inner.ready.notify_all();
    }

    /// Block running queued actions until the executor is closed.
    pub fn run_loop(&self) -> Result<()> {
        if !self.is_main_thread() {
            return Err(Error::WrongThread);
        }
        debug!("main executor loop started");
        while let Some(action) = self.next_blocking() {
            run_guarded(action);
        }
        debug!("main executor loop stopped");
        Ok(())
    }

    /// Run everything already queued without blocking. Returns how many
    /// actions ran.
    pub fn run_pending(&self) -> Result<usize> {
        if !self.is_main_thread() {
            return Err(Error::WrongThread);
        }
        let mut ran = 0;
        while let Some(action) = self.next_ready() {
            run_guarded(action);
            ran += 1;
        }
        Ok(ran)
    }

    /// Wait for the next action; `None` once the stop marker is reached.
    fn next_blocking(&self) -> Option<Action> {
        let mut queue = self.inner.queue.lock();
        loop {
            if queue.stopped {
                return None;
            }
            if let Some(Reverse(job)) = queue.heap.pop() {
                return take_action(&mut queue, job);
            }
            self.inner.ready.wait(&mut queue);
        }
    }

    /// Pop the next action if one is queued.
    fn next_ready(&self) -> Option<Action> {
        let mut queue = self.inner.queue.lock();
        if queue.stopped {
            return None;
        }
        let Reverse(job) = queue.heap.pop()?;
        take_action(&mut queue, job)
    }
}

/// Unwrap a popped job, handling the stop marker.
fn take_action(queue: &mut Queue, job: Job) -> Option<Action> {
    if job.action.is_none() {
        queue.stopped = true;
        let dropped = queue.heap.len();
        queue.heap.clear();
        if dropped > 0 {
            debug!(dropped, "discarding work queued behind shutdown");
        }
    } else {
        trace!(priority = job.priority, seq = job.seq, "main-thread action");
    }
    job.action
}

/// Run one action, containing panics so the loop survives.
fn run_guarded(action: Action) {
    if panic::catch_unwind(AssertUnwindSafe(action)).is_err() {
        error!("main-thread action panicked");
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, time::Duration};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Box<dyn FnOnce() + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |n: u32| {
            let sink = sink.clone();
            Box::new(move || sink.lock().push(n)) as Box<dyn FnOnce() + Send>
        };
        (log, make)
    }

    #[test]
    fn lower_priority_first_then_submission_order() {
        let exec = MainExecutor::new();
        let (log, make) = recorder();
        exec.post(DEFAULT_PRIORITY, make(1)).unwrap();
        exec.post(5, make(2)).unwrap();
        exec.post(DEFAULT_PRIORITY, make(3)).unwrap();
        exec.post(5, make(4)).unwrap();
        exec.post(20, make(5)).unwrap();

        assert_eq!(exec.run_pending().unwrap(), 5);
        assert_eq!(*log.lock(), vec![2, 4, 1, 3, 5]);
    }

    #[test]
    fn run_on_main_is_synchronous_on_main_thread() {
        let exec = MainExecutor::new();
        assert_eq!(exec.run_on_main(DEFAULT_PRIORITY, || 41 + 1), Some(42));
    }

    #[test]
    fn run_on_main_from_other_thread_is_fire_and_forget() {
        let exec = MainExecutor::new();
        let (log, make) = recorder();
        let remote = exec.clone();
        let action = make(7);
        let returned = thread::spawn(move || remote.run_on_main(DEFAULT_PRIORITY, action))
            .join()
            .unwrap();
        assert!(returned.is_none());
        assert!(log.lock().is_empty());

        exec.run_pending().unwrap();
        assert_eq!(*log.lock(), vec![7]);
    }

    #[test]
    fn loop_blocks_until_close() {
        let exec = MainExecutor::new();
        let (log, make) = recorder();
        let remote = exec.clone();
        let (first, second) = (make(1), make(2));
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.post(DEFAULT_PRIORITY, first).unwrap();
            thread::sleep(Duration::from_millis(30));
            remote.post(DEFAULT_PRIORITY, second).unwrap();
            thread::sleep(Duration::from_millis(30));
            remote.close();
        });
        exec.run_loop().unwrap();
        producer.join().unwrap();
        assert_eq!(*log.lock(), vec![1, 2]);
        assert!(!exec.is_alive());
    }

    #[test]
    fn close_preempts_queued_work_and_rejects_new_work() {
        let exec = MainExecutor::new();
        let (log, make) = recorder();
        exec.post(DEFAULT_PRIORITY, make(1)).unwrap();
        exec.close();
        exec.close();
        assert_eq!(exec.post(DEFAULT_PRIORITY, make(2)), Err(Error::Closed));

        exec.run_loop().unwrap();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn shutdown_priority_work_posted_before_close_still_runs() {
        let exec = MainExecutor::new();
        let (log, make) = recorder();
        exec.post(DEFAULT_PRIORITY, make(1)).unwrap();
        exec.post(SHUTDOWN_PRIORITY, make(2)).unwrap();
        exec.close();

        exec.run_loop().unwrap();
        assert_eq!(*log.lock(), vec![2]);
    }

    #[test]
    fn loop_refuses_other_threads() {
        let exec = MainExecutor::new();
        let remote = exec.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            tx.send(remote.run_loop()).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(rx.recv().unwrap(), Err(Error::WrongThread));
    }

    #[test]
    fn panicking_action_does_not_stop_the_loop() {
        let exec = MainExecutor::new();
        let (log, make) = recorder();
        exec.post(DEFAULT_PRIORITY, || panic!("boom")).unwrap();
        exec.post(DEFAULT_PRIORITY, make(9)).unwrap();
        assert_eq!(exec.run_pending().unwrap(), 2);
        assert_eq!(*log.lock(), vec![9]);
    }
}
