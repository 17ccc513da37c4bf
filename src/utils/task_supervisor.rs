use tokio::task::JoinHandle;
use std::collections::HashMap;
use crate::error::{Error, Result};
use tracing::{info, error};

/// Task Supervisor - Owns the service's background tasks
///
/// ## Purpose
/// Tracks every spawned loop (keeper, feeds, health reporter) so the binary
/// can notice a task that ended early and shut the rest down together.
///
/// ## Usage
/// ```rust,ignore
/// let mut supervisor = TaskSupervisor::new();
/// supervisor.spawn("keeper", async move { keeper.run().await });
///
/// if let Err(e) = supervisor.check_health().await {
///     error!("Task failure detected: {:?}", e);
/// }
/// ```
pub struct TaskSupervisor {
    tasks: HashMap<String, JoinHandle<Result<()>>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        TaskSupervisor {
            tasks: HashMap::new(),
        }
    }

    /// Spawn a new background task and register it for monitoring
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F) -> &mut Self
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(future);

        info!("Spawned background task: {}", name);
        self.tasks.insert(name, handle);
        self
    }

    /// Returns an error naming every task that has stopped, and stops
    /// tracking them.
    pub async fn check_health(&mut self) -> Result<()> {
        let finished: Vec<String> = self.tasks
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();

        if finished.is_empty() {
            return Ok(());
        }

        let mut reasons = Vec::with_capacity(finished.len());
        for name in finished {
            if let Some(handle) = self.tasks.remove(&name) {
                let reason = match handle.await {
                    Ok(Ok(())) => "exited".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => format!("panicked or was cancelled: {}", e),
                };
                error!(task = %name, "Background task stopped: {}", reason);
                reasons.push(format!("{} ({})", name, reason));
            }
        }

        Err(Error::TaskError(format!("Tasks terminated unexpectedly: {}", reasons.join(", "))))
    }

    /// Get count of active tasks
    pub fn active_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Gracefully shutdown all tasks
    pub async fn shutdown_all(&mut self) {
        info!("Shutting down {} background tasks", self.tasks.len());

        for (name, handle) in self.tasks.drain() {
            handle.abort();
            info!("Aborted task: {}", name);
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
