//! The stage abstraction and its run loop.
//!
//! A stage consumes from its input queues, applies a processing operation,
//! and publishes results to all of its output queues. The run loop owns the
//! termination protocol: on a sentinel (or a closed input, or the stop
//! flag) it runs cleanup exactly once and then propagates exactly one
//! sentinel to every output.

use crate::error::Result;
use crate::pipeline::coordination::Coordination;
use crate::pipeline::queue::{QueueReceiver, QueueSender, Received};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long a worker blocks on one input queue before re-checking the stop
/// flag. Cooperative cancellation, not preemption.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Per-item latency above which a synchronous stage logs the item.
const SLOW_ITEM: Duration = Duration::from_millis(250);

/// Execution mode of a stage, selected when the runner is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// `process` emits every output for an item promptly and returns;
    /// per-item latency is measured and slow items are logged.
    Synchronous,
    /// One item streams outputs over an open-ended span of time, so
    /// per-item latency is not meaningful and is not measured.
    Asynchronous,
}

/// A unit of pipeline work with a `setup → process* → cleanup` lifecycle.
#[async_trait]
pub trait Stage: Send + 'static {
    /// Item type consumed from input queues.
    type Input: Send + 'static;
    /// Item type published to output queues.
    type Output: Clone + Send + 'static;

    /// Stable stage name for logs.
    fn name(&self) -> &'static str;

    /// One-time initialization before the first item.
    async fn setup(&mut self, _ctx: &StageContext<Self::Output>) -> Result<()> {
        Ok(())
    }

    /// Handle one input item, publishing zero or more outputs via `ctx`.
    ///
    /// An `Err` is a per-item fault: the runner logs it and drops the item,
    /// and the stage keeps running.
    async fn process(&mut self, input: Self::Input, ctx: &StageContext<Self::Output>)
    -> Result<()>;

    /// One-time teardown, run before sentinel propagation. May still emit.
    async fn cleanup(&mut self, _ctx: &StageContext<Self::Output>) -> Result<()> {
        Ok(())
    }
}

/// Output-push capability plus shared coordination, handed to a stage for
/// each call. Cloneable so callbacks can capture their own handle.
#[derive(Debug)]
pub struct StageContext<Out> {
    outputs: Vec<QueueSender<Out>>,
    coordination: Arc<Coordination>,
}

impl<Out> Clone for StageContext<Out> {
    fn clone(&self) -> Self {
        Self {
            outputs: self.outputs.clone(),
            coordination: Arc::clone(&self.coordination),
        }
    }
}

impl<Out: Clone> StageContext<Out> {
    /// Publish one value to every output queue.
    pub fn emit(&self, value: Out) {
        for output in &self.outputs {
            let _ = output.send(value.clone());
        }
    }
}

impl<Out> StageContext<Out> {
    pub(crate) fn new(outputs: Vec<QueueSender<Out>>, coordination: Arc<Coordination>) -> Self {
        Self {
            outputs,
            coordination,
        }
    }

    /// The coordination state shared across the owning pipeline.
    pub fn coordination(&self) -> &Coordination {
        &self.coordination
    }

    /// Payloads already emitted but not yet taken by downstream consumers.
    pub fn pending(&self) -> usize {
        self.outputs.iter().map(QueueSender::depth).sum()
    }
}

/// Drives one stage on one worker until termination.
pub struct StageRunner<S: Stage> {
    stage: S,
    mode: ExecutionMode,
    coordination: Arc<Coordination>,
    inputs: Vec<QueueReceiver<S::Input>>,
    outputs: Vec<QueueSender<S::Output>>,
}

impl<S: Stage> StageRunner<S> {
    /// Wrap a stage with its execution mode and shared coordination.
    pub fn new(stage: S, mode: ExecutionMode, coordination: Arc<Coordination>) -> Self {
        Self {
            stage,
            mode,
            coordination,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Attach an input queue.
    pub fn with_input(mut self, input: QueueReceiver<S::Input>) -> Self {
        self.inputs.push(input);
        self
    }

    /// Attach an output queue.
    pub fn with_output(mut self, output: QueueSender<S::Output>) -> Self {
        self.outputs.push(output);
        self
    }

    /// Run the stage to completion. Consumes the runner; meant to be the
    /// body of one spawned worker task.
    pub async fn run(mut self) {
        let name = self.stage.name();
        let ctx = StageContext::new(self.outputs.clone(), Arc::clone(&self.coordination));

        info!(stage = name, "starting");
        if let Err(e) = self.stage.setup(&ctx).await {
            error!(stage = name, error = %e, "setup failed");
            // Still propagate sentinels so downstream stages unblock.
            self.finish(&ctx).await;
            return;
        }

        'run: while !self.coordination.stop_requested() {
            if self.inputs.is_empty() {
                // Source stages have nothing to poll; wait for stop.
                tokio::time::sleep(POLL_TIMEOUT).await;
                continue;
            }
            for input in self.inputs.iter_mut() {
                match input.recv_timeout(POLL_TIMEOUT).await {
                    Received::Payload(item) => {
                        let started = Instant::now();
                        if let Err(fault) = self.stage.process(item, &ctx).await {
                            warn!(stage = name, error = %fault, "item dropped after fault");
                        } else if self.mode == ExecutionMode::Synchronous {
                            let elapsed = started.elapsed();
                            if elapsed > SLOW_ITEM {
                                debug!(
                                    stage = name,
                                    elapsed_ms = elapsed.as_millis() as u64,
                                    "slow item"
                                );
                            }
                        }
                    }
                    Received::Sentinel => {
                        info!(stage = name, "sentinel received");
                        break 'run;
                    }
                    Received::Closed => {
                        debug!(stage = name, "input closed without sentinel");
                        break 'run;
                    }
                    Received::Empty => {}
                }
            }
        }

        self.finish(&ctx).await;
    }

    /// Cleanup exactly once, then one sentinel per output.
    async fn finish(&mut self, ctx: &StageContext<S::Output>) {
        let name = self.stage.name();
        if let Err(e) = self.stage.cleanup(ctx).await {
            error!(stage = name, error = %e, "cleanup failed");
        }
        for output in &self.outputs {
            let _ = output.send_sentinel();
        }
        info!(stage = name, "stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::pipeline::queue::{Received, queue};

    /// Doubles numbers; fails on odd input; emits a marker on cleanup.
    struct Doubler {
        cleanup_marker: Option<i64>,
    }

    #[async_trait]
    impl Stage for Doubler {
        type Input = i64;
        type Output = i64;

        fn name(&self) -> &'static str {
            "doubler"
        }

        async fn process(&mut self, input: i64, ctx: &StageContext<i64>) -> Result<()> {
            if input % 2 != 0 {
                return Err(PipelineError::Channel(format!("odd input {input}")));
            }
            ctx.emit(input * 2);
            Ok(())
        }

        async fn cleanup(&mut self, ctx: &StageContext<i64>) -> Result<()> {
            if let Some(marker) = self.cleanup_marker.take() {
                ctx.emit(marker);
            }
            Ok(())
        }
    }

    fn runner(stage: Doubler) -> (StageRunner<Doubler>, Arc<Coordination>) {
        let coordination = Coordination::new();
        let runner = StageRunner::new(
            stage,
            ExecutionMode::Synchronous,
            Arc::clone(&coordination),
        );
        (runner, coordination)
    }

    #[tokio::test]
    async fn processes_until_sentinel_then_propagates_exactly_one() {
        let (in_tx, in_rx) = queue();
        let (out_tx, mut out_rx) = queue();
        let (r, _) = runner(Doubler {
            cleanup_marker: None,
        });
        let worker = tokio::spawn(r.with_input(in_rx).with_output(out_tx).run());

        in_tx.send(2);
        in_tx.send(4);
        in_tx.send_sentinel();
        worker.await.unwrap();

        assert_eq!(out_rx.recv_timeout(POLL_TIMEOUT).await, Received::Payload(4));
        assert_eq!(out_rx.recv_timeout(POLL_TIMEOUT).await, Received::Payload(8));
        assert_eq!(out_rx.recv_timeout(POLL_TIMEOUT).await, Received::Sentinel);
        // Nothing after the sentinel.
        assert_eq!(out_rx.recv_timeout(POLL_TIMEOUT).await, Received::Closed);
    }

    #[tokio::test]
    async fn fault_drops_item_and_continues() {
        let (in_tx, in_rx) = queue();
        let (out_tx, mut out_rx) = queue();
        let (r, _) = runner(Doubler {
            cleanup_marker: None,
        });
        let worker = tokio::spawn(r.with_input(in_rx).with_output(out_tx).run());

        in_tx.send(3); // fault: dropped
        in_tx.send(10);
        in_tx.send_sentinel();
        worker.await.unwrap();

        assert_eq!(
            out_rx.recv_timeout(POLL_TIMEOUT).await,
            Received::Payload(20)
        );
        assert_eq!(out_rx.recv_timeout(POLL_TIMEOUT).await, Received::Sentinel);
    }

    #[tokio::test]
    async fn stop_flag_triggers_cleanup_and_sentinel() {
        let (_in_tx, in_rx) = queue::<i64>();
        let (out_tx, mut out_rx) = queue();
        let (r, coordination) = runner(Doubler {
            cleanup_marker: Some(-1),
        });
        let worker = tokio::spawn(r.with_input(in_rx).with_output(out_tx).run());

        coordination.request_stop();
        worker.await.unwrap();

        // Cleanup ran (marker emitted) before the sentinel.
        assert_eq!(
            out_rx.recv_timeout(POLL_TIMEOUT).await,
            Received::Payload(-1)
        );
        assert_eq!(out_rx.recv_timeout(POLL_TIMEOUT).await, Received::Sentinel);
    }

    #[tokio::test]
    async fn fan_out_reaches_every_output_queue() {
        let (in_tx, in_rx) = queue();
        let (out_a_tx, mut out_a_rx) = queue();
        let (out_b_tx, mut out_b_rx) = queue();
        let (r, _) = runner(Doubler {
            cleanup_marker: None,
        });
        let worker = tokio::spawn(
            r.with_input(in_rx)
                .with_output(out_a_tx)
                .with_output(out_b_tx)
                .run(),
        );

        in_tx.send(6);
        in_tx.send_sentinel();
        worker.await.unwrap();

        assert_eq!(
            out_a_rx.recv_timeout(POLL_TIMEOUT).await,
            Received::Payload(12)
        );
        assert_eq!(out_a_rx.recv_timeout(POLL_TIMEOUT).await, Received::Sentinel);
        assert_eq!(
            out_b_rx.recv_timeout(POLL_TIMEOUT).await,
            Received::Payload(12)
        );
        assert_eq!(out_b_rx.recv_timeout(POLL_TIMEOUT).await, Received::Sentinel);
    }
}
