//! Worker threads driving a [`Dispatcher`].

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};

use torque_core::Clock;

use super::{Deliverer, DispatchReport, Dispatcher, DispatcherConfig};
use crate::store::TaskStore;

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatcherStats {
    pub polls: u64,
    pub tasks_polled: u64,
    pub completed: u64,
    pub rescheduled: u64,
    pub exhausted: u64,
    pub discarded: u64,
    pub errors: u64,
    pub uptime_secs: u64,
}

impl DispatcherStats {
    fn absorb(&mut self, report: &DispatchReport) {
        self.polls += 1;
        self.tasks_polled += report.polled as u64;
        self.completed += report.completed as u64;
        self.rescheduled += report.rescheduled as u64;
        self.exhausted += report.exhausted as u64;
        self.discarded += report.discarded as u64;
        self.errors += report.errors as u64;
    }
}

fn lock(stats: &Mutex<DispatcherStats>) -> MutexGuard<'_, DispatcherStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to control a running pool.
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: Arc<AtomicBool>,
    workers: Vec<thread::JoinHandle<()>>,
    stats: Arc<Mutex<DispatcherStats>>,
}

impl DispatcherHandle {
    /// Request graceful shutdown and wait for every worker to finish its pass.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        lock(&self.stats).clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl<S, D, C> Dispatcher<S, D, C>
where
    S: TaskStore + 'static,
    D: Deliverer + 'static,
    C: Clock + 'static,
{
    /// Start `config.workers` threads polling this dispatcher.
    pub fn spawn(self: Arc<Self>, config: DispatcherConfig) -> io::Result<DispatcherHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(DispatcherStats::default()));
        let mut workers = Vec::with_capacity(config.workers);

        for index in 0..config.workers {
            let name = format!("{}-{index}", config.name);
            let dispatcher = Arc::clone(&self);
            let worker_config = config.clone();
            let worker_shutdown = Arc::clone(&shutdown);
            let worker_stats = Arc::clone(&stats);

            let thread_name = name.clone();

            let spawned = thread::Builder::new().name(thread_name).spawn(move || {
                worker_loop(&*dispatcher, &name, &worker_config, &worker_shutdown, &worker_stats);
            });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!(worker = index, error = %e, "failed to spawn dispatcher worker");
                    shutdown.store(true, Ordering::SeqCst);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(DispatcherHandle {
            shutdown,
            workers,
            stats,
        })
    }
}

fn worker_loop<S, D, C>(
    dispatcher: &Dispatcher<S, D, C>,
    name: &str,
    config: &DispatcherConfig,
    shutdown: &AtomicBool,
    stats: &Mutex<DispatcherStats>,
) where
    S: TaskStore,
    D: Deliverer,
    C: Clock,
{
    info!(worker = %name, "dispatcher worker started");
    let start_time = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        let idle = match dispatcher.run_once(config.batch_size) {
            Ok(report) => {
                let mut s = lock(stats);
                s.absorb(&report);
                s.uptime_secs = start_time.elapsed().as_secs();
                report.is_idle()
            }
            Err(e) => {
                error!(worker = %name, error = %e, "failed to poll due tasks");
                true
            }
        };

        if idle {
            thread::sleep(config.poll_interval);
        }
    }

    info!(worker = %name, "dispatcher worker stopped");
}
