//! Sequenced steps of concurrent units with a streamed result channel.
//!
//! Steps run strictly one after another; the units of a step fan out as
//! tokio tasks. Every unit yields exactly one [`UnitResult`], including
//! units that panic or are skipped after an abort.

use crate::domain::model::UnitResult;
use crate::domain::ports::Unit;
use crate::utils::error::{GenError, Result};
use crate::utils::monitor::SystemMonitor;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;

pub struct Step {
    name: String,
    no: usize,
    total: usize,
    units: Vec<Arc<dyn Unit>>,
}

impl Step {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn no(&self) -> usize {
        self.no
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn result(&self, unit: String, outcome: std::result::Result<String, Arc<GenError>>) -> UnitResult {
        UnitResult {
            step: self.name.clone(),
            step_no: self.no,
            step_total: self.total,
            unit,
            outcome,
        }
    }

    /// Runs every unit concurrently and forwards each result. Fails when any
    /// unit failed.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        forward: &mpsc::Sender<UnitResult>,
        limit: Option<Arc<Semaphore>>,
    ) -> Result<()> {
        let total = self.units.len();
        if total == 0 {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::channel(total);
        for unit in &self.units {
            let unit = unit.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            let limit = limit.clone();
            let (step, step_no, step_total) = (self.name.clone(), self.no, self.total);
            tokio::spawn(async move {
                let name = unit.name();
                let outcome = run_unit(unit, &cancel, limit).await;
                let result = UnitResult {
                    step,
                    step_no,
                    step_total,
                    unit: name,
                    outcome,
                };
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let mut received = 0;
        let mut failed = 0;
        while let Some(result) = rx.recv().await {
            received += 1;
            match &result.outcome {
                Ok(_) => tracing::debug!("✅ {} / {}", result.step, result.unit),
                Err(err) if err.is_aborted() => {
                    failed += 1;
                    tracing::debug!("⏹️ {} / {} aborted", result.step, result.unit);
                }
                Err(err) => {
                    failed += 1;
                    tracing::error!("❌ {} / {}: {}", result.step, result.unit, err);
                }
            }
            if forward.send(result).await.is_err() {
                tracing::debug!("Result stream closed, draining step {}", self.name);
            }
        }
        // a task torn down by runtime shutdown never reports
        failed += total - received;

        if failed > 0 {
            return Err(GenError::StepFailed {
                step: self.name.clone(),
                failed,
                total,
            });
        }
        Ok(())
    }
}

async fn run_unit(
    unit: Arc<dyn Unit>,
    cancel: &CancellationToken,
    limit: Option<Arc<Semaphore>>,
) -> std::result::Result<String, Arc<GenError>> {
    let _permit = match limit {
        Some(semaphore) => tokio::select! {
            permit = semaphore.acquire_owned() => permit.ok(),
            _ = cancel.cancelled() => return Err(Arc::new(GenError::Aborted)),
        },
        None => None,
    };
    if cancel.is_cancelled() {
        return Err(Arc::new(GenError::Aborted));
    }

    let name = unit.name();
    match AssertUnwindSafe(unit.handle(cancel)).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(GenError::Shared(shared))) => Err(shared),
        Ok(Err(err)) => Err(Arc::new(err)),
        Err(panic) => Err(Arc::new(GenError::UnitPanicked {
            unit: name,
            message: panic_message(panic.as_ref()),
        })),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Append-only list of steps, consumed by [`Process::start`].
#[derive(Default)]
pub struct Process {
    steps: Vec<Step>,
    concurrency: Option<usize>,
    monitor: Option<Arc<SystemMonitor>>,
}

impl Process {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps how many units run at once across a step. `None` is unbounded.
    pub fn with_concurrency(mut self, limit: Option<usize>) -> Self {
        self.concurrency = limit.filter(|limit| *limit > 0);
        self
    }

    /// Logs resource usage at every step boundary.
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(|| Arc::new(SystemMonitor::new(true)));
        self
    }

    pub fn add(&mut self, name: impl Into<String>, units: Vec<Arc<dyn Unit>>) {
        self.steps.push(Step {
            name: name.into(),
            no: 0,
            total: 0,
            units,
        });
        let total = self.steps.len();
        for (index, step) in self.steps.iter_mut().enumerate() {
            step.no = index + 1;
            step.total = total;
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn unit_count(&self) -> usize {
        self.steps.iter().map(Step::len).sum()
    }

    /// Spawns the driver and returns the result stream. Must be called
    /// inside a tokio runtime.
    pub fn start(self, parent: &CancellationToken) -> Running {
        let (tx, rx) = mpsc::channel(self.unit_count() + 1);
        let (closed_tx, closed_rx) = watch::channel(false);
        let cancel = parent.child_token();

        let driver_cancel = cancel.clone();
        tokio::spawn(async move {
            self.drive(&driver_cancel, tx).await;
            let _ = closed_tx.send(true);
        });

        Running {
            results: rx,
            control: ProcessControl {
                cancel,
                closed: closed_rx,
            },
        }
    }

    async fn drive(self, cancel: &CancellationToken, tx: mpsc::Sender<UnitResult>) {
        let limit = self.concurrency.map(|n| Arc::new(Semaphore::new(n)));
        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Process started.");
        }

        for step in &self.steps {
            if cancel.is_cancelled() {
                tracing::info!("⏹️ Process aborted before step {}", step.name);
                let _ = tx
                    .send(step.result(String::new(), Err(Arc::new(GenError::Aborted))))
                    .await;
                break;
            }

            tracing::info!(
                "▶️ Step {}/{}: {} ({} units)",
                step.no,
                step.total,
                step.name,
                step.len()
            );
            let outcome = step.execute(cancel, &tx, limit.clone()).await;
            if let Some(monitor) = &self.monitor {
                monitor.log_stats(&format!("Step {} finished.", step.name));
            }
            if let Err(err) = outcome {
                tracing::warn!("Stopping after step {}: {}", step.name, err);
                break;
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }
    }
}

/// Cancellation handle of a started process.
#[derive(Clone)]
pub struct ProcessControl {
    cancel: CancellationToken,
    closed: watch::Receiver<bool>,
}

impl ProcessControl {
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Waits until the driver has finished.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Cancels the process and waits up to `timeout` for the driver to stop.
    pub async fn abort(&self, timeout: Duration) -> Result<()> {
        self.cancel.cancel();
        match tokio::time::timeout(timeout, self.closed()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(GenError::AbortTimeout(timeout)),
        }
    }
}

/// A started process: the result stream plus its control handle.
pub struct Running {
    results: mpsc::Receiver<UnitResult>,
    control: ProcessControl,
}

impl Running {
    /// Next result; `None` once the process is closed and drained.
    pub async fn recv(&mut self) -> Option<UnitResult> {
        self.results.recv().await
    }

    pub fn control(&self) -> ProcessControl {
        self.control.clone()
    }

    pub async fn abort(&self, timeout: Duration) -> Result<()> {
        self.control.abort(timeout).await
    }
}
