use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

type Task = Box<dyn FnOnce(usize) + Send + 'static>;

/// Fixed set of named threads draining one shared task queue.
///
/// Each task receives the slot index of the worker that runs it, so a pool of
/// N accelerator workers gives N stable slots and at most N concurrent tasks.
/// Dropping the pool closes the queue and joins every worker after the
/// already-queued tasks have run.
pub struct WorkerPool {
    name: String,
    tx: Option<Sender<Task>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(name: &str, workers: usize) -> std::io::Result<Self> {
        let workers = workers.max(1);
        let (tx, rx) = crossbeam_channel::unbounded::<Task>();
        let handles = (0..workers)
            .map(|slot| spawn_worker(name, slot, rx.clone()))
            .collect::<std::io::Result<Vec<_>>>()?;
        log::debug!("Started {name} pool with {workers} worker(s)");
        Ok(Self {
            name: name.to_string(),
            tx: Some(tx),
            handles,
        })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Queue a task. Returns `false` if the pool is shutting down.
    pub fn execute(&self, task: impl FnOnce(usize) + Send + 'static) -> bool {
        match &self.tx {
            Some(tx) => tx.send(Box::new(task)).is_ok(),
            None => false,
        }
    }
}

fn spawn_worker(name: &str, slot: usize, rx: Receiver<Task>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("{name}-{slot}"))
        .spawn(move || {
            for task in rx {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task(slot)));
                if outcome.is_err() {
                    log::error!("Task panicked on worker slot {slot}");
                }
            }
        })
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.tx.take());
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("{} worker exited abnormally", self.name);
            }
        }
    }
}
