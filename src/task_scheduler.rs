use std::{
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{PacerError, Result};

/// Work executed on a fixed cadence on its own thread.
pub trait PeriodicTask: Send + 'static {
    fn name(&self) -> &'static str;
    fn interval(&self) -> Duration;
    fn run(&mut self);
}

struct StopSignal {
    stopped: Mutex<bool>,
    cv_wakeup: Condvar,
}

/// Owns the threads of all periodic tasks of one pacer and stops them together.
pub struct TaskScheduler {
    signal: Arc<StopSignal>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self {
            signal: Arc::new(StopSignal {
                stopped: Mutex::new(false),
                cv_wakeup: Condvar::new(),
            }),
            handles: Mutex::new(vec![]),
        }
    }

    /// Starts `task`. The first run happens one interval after spawning.
    pub fn spawn(&self, mut task: impl PeriodicTask) -> Result<()> {
        let name = task.name();
        let signal = self.signal.clone();
        let handle = std::thread::Builder::new()
            .name(format!("pacer-{}", name))
            .spawn(move || {
                let mut guard = signal.stopped.lock();
                let mut next = Instant::now().checked_add(task.interval());
                while !*guard {
                    let deadline = match next {
                        Some(deadline) => deadline,
                        // Interval too large to represent: the task never runs.
                        None => {
                            signal.cv_wakeup.wait(&mut guard);
                            continue;
                        }
                    };
                    signal.cv_wakeup.wait_until(&mut guard, deadline);
                    if *guard {
                        break;
                    }
                    if Instant::now() >= deadline {
                        MutexGuard::unlocked(&mut guard, || task.run());
                        next = Instant::now().checked_add(task.interval());
                    }
                }
            })
            .map_err(|source| PacerError::Spawn { name, source })?;
        self.handles.lock().push(handle);
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        *self.signal.stopped.lock()
    }

    /// Wakes every task thread, tells it to exit and waits for it.
    pub fn shutdown(&self) {
        let mut guard = self.signal.stopped.lock();
        *guard = true;
        self.signal.cv_wakeup.notify_all();
        drop(guard);

        let current = std::thread::current().id();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                log::warn!("pacer background task panicked");
            }
        }
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
