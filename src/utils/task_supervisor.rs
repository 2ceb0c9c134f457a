use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use crate::error::{Error, Result};

/// Owns the background workers. Workers loop forever; one that exits has crashed.
#[derive(Default)]
pub struct TaskSupervisor {
    workers: HashMap<String, JoinHandle<()>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, worker: F) -> &mut Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        tracing::info!(worker = %name, "background worker started");
        if let Some(previous) = self.workers.insert(name, tokio::spawn(worker)) {
            previous.abort();
        }
        self
    }

    /// Runs `tick` every `period`. A slow tick delays the next one rather
    /// than bunching them up.
    pub fn spawn_periodic<F, Fut>(&mut self, name: impl Into<String>, period: Duration, mut tick: F) -> &mut Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn(name, async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        })
    }

    /// Drops and reports workers that have exited.
    pub fn check_health(&mut self) -> Result<()> {
        let mut dead: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        if dead.is_empty() {
            return Ok(());
        }

        dead.sort();
        for name in &dead {
            self.workers.remove(name);
            tracing::error!(worker = %name, "background worker exited");
        }
        Err(Error::TaskFailed(dead.join(", ")))
    }

    pub fn active_task_count(&self) -> usize {
        self.workers.len()
    }

    pub fn shutdown_all(&mut self) {
        tracing::info!(workers = self.workers.len(), "stopping background workers");
        for (_, handle) in self.workers.drain() {
            handle.abort();
        }
    }
}
