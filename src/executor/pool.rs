//! Multi-threaded executor, composed of N single-thread executors. See spec
//! §4.4: "A multi-threaded executor is composed of N single-thread
//! executors; `Schedule` picks one by round-robin or by affinity hint."

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::error::ExecutorError;
use super::single_thread::{ExecutorConfig, SingleThreadExecutor};
use super::task::Priority;

pub struct ExecutorPool {
    workers: Vec<Arc<SingleThreadExecutor>>,
    next: AtomicUsize,
}

impl ExecutorPool {
    pub fn new(worker_count: usize, queue_cap: usize, drop_tasks_on_stop: bool) -> Self {
        let workers = (0..worker_count.max(1))
            .map(|i| {
                Arc::new(SingleThreadExecutor::new(ExecutorConfig {
                    queue_cap,
                    affinity_hint: Some(i),
                    drop_tasks_on_stop,
                }))
            })
            .collect();
        Self {
            workers,
            next: AtomicUsize::new(0),
        }
    }

    pub fn init(&self) {
        for w in &self.workers {
            w.init();
        }
    }

    pub fn run(&self) {
        for w in &self.workers {
            w.run();
        }
    }

    pub fn stop(&self) {
        for w in &self.workers {
            w.stop();
        }
    }

    /// Schedules onto the next worker in round-robin order.
    pub fn schedule<F>(&self, work: F, priority: Priority) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[idx].schedule(work, priority)
    }

    /// Schedules onto the worker whose affinity hint matches, falling back
    /// to round-robin if no worker advertises that hint.
    pub fn schedule_with_affinity<F>(
        &self,
        affinity_hint: usize,
        work: F,
        priority: Priority,
    ) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        let target = self
            .workers
            .iter()
            .find(|w| w.affinity_hint() == Some(affinity_hint));
        match target {
            Some(w) => w.schedule(work, priority),
            None => self.schedule(work, priority),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as AU;
    use std::time::Duration;

    #[test]
    fn round_robin_spreads_work_across_workers() {
        let pool = ExecutorPool::new(4, 16, false);
        pool.init();
        pool.run();
        let seen: Arc<Vec<AU>> = Arc::new((0..4).map(|_| AU::new(0)).collect());
        for i in 0..8 {
            let idx = i % 4;
            let seen = seen.clone();
            pool.schedule(move || { seen[idx].fetch_add(1, Ordering::SeqCst); }, Priority::Normal).unwrap();
        }
        std::thread::sleep(Duration::from_millis(100));
        pool.stop();
        for counter in seen.iter() {
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
    }

    #[test]
    fn affinity_routes_to_matching_worker() {
        let pool = ExecutorPool::new(3, 8, false);
        pool.init();
        pool.run();
        let thread_ids: Arc<std::sync::Mutex<Vec<std::thread::ThreadId>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        for _ in 0..4 {
            let thread_ids = thread_ids.clone();
            pool.schedule_with_affinity(
                1,
                move || {
                    thread_ids.lock().unwrap().push(std::thread::current().id());
                },
                Priority::Normal,
            )
            .unwrap();
        }
        std::thread::sleep(Duration::from_millis(100));
        pool.stop();
        let ids = thread_ids.lock().unwrap();
        assert_eq!(ids.len(), 4);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }
}
