//! Single-thread async executor. See spec §4.4.
//!
//! One worker thread owns two bounded queues (normal and high priority). It
//! waits on a condition variable until stopped or some queue is non-empty,
//! then drains one task — preferring high priority — and runs it with the
//! queue mutex released, matching the concurrency invariant that the
//! executor mutex is only ever held across admission and signaling, never
//! across user work (spec §4.4, §4 invariants).

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use log::{error, warn};

use super::error::ExecutorError;
use super::task::{AsyncTask, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

struct Queues {
    normal: VecDeque<AsyncTask>,
    high: VecDeque<AsyncTask>,
    stopping: bool,
}

struct Shared {
    queues: Mutex<Queues>,
    cv: Condvar,
    queue_cap: usize,
    drop_tasks_on_stop: bool,
}

impl Shared {
    fn worker_loop(&self) {
        loop {
            let mut queues = self.queues.lock().expect("executor queue mutex poisoned");
            loop {
                if !queues.high.is_empty() || !queues.normal.is_empty() {
                    break;
                }
                if queues.stopping {
                    return;
                }
                queues = self
                    .cv
                    .wait(queues)
                    .expect("executor queue mutex poisoned");
            }
            let task = if !queues.high.is_empty() {
                queues.high.pop_front()
            } else {
                queues.normal.pop_front()
            };
            drop(queues);

            if let Some(task) = task {
                let work = task.work;
                if let Err(panic) = catch_unwind(AssertUnwindSafe(work)) {
                    error!("executor task panicked: {}", panic_message(&panic));
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Construction parameters for a [`SingleThreadExecutor`] (spec §4.4).
pub struct ExecutorConfig {
    pub queue_cap: usize,
    pub affinity_hint: Option<usize>,
    pub drop_tasks_on_stop: bool,
}

pub struct SingleThreadExecutor {
    state: Mutex<State>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    thread_id: Mutex<Option<ThreadId>>,
    affinity_hint: Option<usize>,
}

impl SingleThreadExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            state: Mutex::new(State::Uninitialized),
            shared: Arc::new(Shared {
                queues: Mutex::new(Queues {
                    normal: VecDeque::new(),
                    high: VecDeque::new(),
                    stopping: false,
                }),
                cv: Condvar::new(),
                queue_cap: config.queue_cap,
                drop_tasks_on_stop: config.drop_tasks_on_stop,
            }),
            worker: Mutex::new(None),
            thread_id: Mutex::new(None),
            affinity_hint: config.affinity_hint,
        }
    }

    /// Hint used by [`super::pool::ExecutorPool`] for affinity-based
    /// routing. This crate does not pin the worker thread to a physical CPU
    /// — that needs a platform-specific crate outside the teacher's
    /// dependency stack — so the hint is bookkeeping only.
    pub fn affinity_hint(&self) -> Option<usize> {
        self.affinity_hint
    }

    pub fn init(&self) {
        let mut state = self.state.lock().expect("executor state mutex poisoned");
        if *state == State::Uninitialized {
            *state = State::Initialized;
        }
    }

    pub fn run(&self) {
        let mut state = self.state.lock().expect("executor state mutex poisoned");
        if *state != State::Initialized {
            return;
        }
        let shared = self.shared.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = thread::Builder::new()
            .name("pbs-executor-worker".to_string())
            .spawn(move || {
                let _ = tx.send(thread::current().id());
                shared.worker_loop();
            })
            .expect("failed to spawn executor worker thread");
        let id = rx
            .recv()
            .expect("worker thread exited before reporting its id");
        *self
            .thread_id
            .lock()
            .expect("executor thread-id mutex poisoned") = Some(id);
        *self
            .worker
            .lock()
            .expect("executor worker mutex poisoned") = Some(handle);
        *state = State::Running;
    }

    pub fn get_thread_id(&self) -> Option<ThreadId> {
        *self
            .thread_id
            .lock()
            .expect("executor thread-id mutex poisoned")
    }

    pub fn schedule<F>(&self, work: F, priority: Priority) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let state = self.state.lock().expect("executor state mutex poisoned");
            if *state != State::Running {
                return Err(ExecutorError::NotRunning);
            }
        }
        let task = AsyncTask::new(work, priority);
        let mut queues = self
            .shared
            .queues
            .lock()
            .expect("executor queue mutex poisoned");
        let target = match priority {
            Priority::Normal => &mut queues.normal,
            Priority::High => &mut queues.high,
        };
        if target.len() >= self.shared.queue_cap {
            return Err(ExecutorError::QueueFull);
        }
        target.push_back(task);
        drop(queues);
        self.shared.cv.notify_one();
        Ok(())
    }

    /// Stops the executor. Illegal to call before `run`; waking, draining
    /// (or discarding, if `drop_tasks_on_stop`) and joining the worker all
    /// happen before this call returns.
    pub fn stop(&self) {
        let handle = {
            let mut state = self.state.lock().expect("executor state mutex poisoned");
            if *state != State::Running {
                return;
            }
            *state = State::Stopped;
            self.worker
                .lock()
                .expect("executor worker mutex poisoned")
                .take()
        };

        {
            let mut queues = self
                .shared
                .queues
                .lock()
                .expect("executor queue mutex poisoned");
            if self.shared.drop_tasks_on_stop {
                queues.normal.clear();
                queues.high.clear();
            }
            queues.stopping = true;
        }
        self.shared.cv.notify_all();

        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("executor worker thread panicked while joining during stop");
            }
        }
    }
}
