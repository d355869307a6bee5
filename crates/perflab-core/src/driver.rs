//! Rate-paced load generation.
//!
//! A run is split across workers; each worker self-paces with compute-then-sleep so that
//! the workers together approach the target rate. There is no central rate limiter. Runs
//! stop on wall-clock time, never on a call count.

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};

use crate::aggregator::MetricsAggregator;
use crate::client::{GrpcRequest, RpcClient};
use crate::measurement::Measurement;
use crate::pool::{TokioWorkerPool, WorkerPool, WorkerTask};

/// Target rate over time: a linear ramp from zero, then a hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    /// Requests per second once ramped up
    pub rate: u32,
    pub ramp_up: Duration,
    pub hold: Duration,
}

impl LoadPlan {
    pub fn steady(rate: u32, duration: Duration) -> Self {
        Self {
            rate,
            ramp_up: Duration::ZERO,
            hold: duration,
        }
    }

    pub fn ramped(rate: u32, ramp_up: Duration, hold: Duration) -> Self {
        Self {
            rate,
            ramp_up,
            hold,
        }
    }

    pub fn total(&self) -> Duration {
        self.ramp_up + self.hold
    }

    /// Target rate `elapsed` into the run.
    pub fn rate_at(&self, elapsed: Duration) -> f64 {
        let rate = f64::from(self.rate);
        if elapsed >= self.ramp_up {
            rate
        } else {
            rate * elapsed.as_secs_f64() / self.ramp_up.as_secs_f64()
        }
    }
}

/// Something that can put load on the target and report what it observed.
///
/// Search and reliability logic only talk to this trait, which keeps them testable
/// against scripted capacity models.
#[async_trait]
pub trait LoadProbe: Send {
    /// Run `plan` and measure its hold phase.
    async fn measure(&mut self, plan: LoadPlan) -> Measurement;

    /// Ramp up to `rate`, then hold it for the sum of `windows`, measuring each window.
    async fn measure_windows(
        &mut self,
        rate: u32,
        ramp_up: Duration,
        windows: &[Duration],
    ) -> Vec<Measurement> {
        if !ramp_up.is_zero() {
            self.measure(LoadPlan::ramped(rate, ramp_up, Duration::ZERO))
                .await;
        }

        let mut measurements = Vec::with_capacity(windows.len());
        for &window in windows {
            measurements.push(self.measure(LoadPlan::steady(rate, window)).await);
        }
        measurements
    }
}

/// Issues calls through an [`RpcClient`] and records every outcome.
pub struct LoadDriver {
    client: Arc<dyn RpcClient>,
    request: Arc<GrpcRequest>,
    aggregator: Arc<MetricsAggregator>,
    pool: Arc<dyn WorkerPool>,
    workers: usize,
}

impl LoadDriver {
    pub fn new(
        client: Arc<dyn RpcClient>,
        request: GrpcRequest,
        aggregator: Arc<MetricsAggregator>,
        workers: usize,
    ) -> Self {
        Self {
            client,
            request: Arc::new(request),
            aggregator,
            pool: Arc::new(TokioWorkerPool),
            workers: workers.max(1),
        }
    }

    /// Swap the concurrency primitive the workers run on.
    pub fn with_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }

    /// Workers used for `rate`: never more workers than requests per second.
    pub fn effective_workers(&self, rate: u32) -> usize {
        self.workers.min(rate as usize).max(1)
    }

    /// Issue calls at `rate` for `duration`.
    pub async fn run_for(&self, rate: u32, duration: Duration) {
        self.run(LoadPlan::steady(rate, duration)).await;
    }

    /// Execute `plan`, recording every outcome into the aggregator.
    pub async fn run(&self, plan: LoadPlan) {
        let workers = self.effective_workers(plan.rate);
        if let Some(exporter) = self.aggregator.exporter() {
            exporter.set_target_rate(plan.rate);
        }

        debug!(
            rate = plan.rate,
            workers,
            duration_secs = plan.total().as_secs_f64(),
            "Starting paced load"
        );

        let started = Instant::now();
        let worker = Arc::new(PacedWorker {
            client: Arc::clone(&self.client),
            request: Arc::clone(&self.request),
            aggregator: Arc::clone(&self.aggregator),
            plan,
            workers,
            started,
            deadline: started + plan.total(),
        });

        let task: WorkerTask = Arc::new(move |index: usize| {
            let worker = Arc::clone(&worker);
            async move { worker.drive(index).await }.boxed()
        });

        self.pool.run_concurrently(workers, task).await;
    }

    /// Closed-loop load: `users` workers call back to back, started evenly over `ramp_up`.
    pub async fn run_closed_loop(&self, users: usize, ramp_up: Duration, hold: Duration) {
        let users = users.max(1);
        let started = Instant::now();
        let deadline = started + ramp_up + hold;
        let stagger = ramp_up / users as u32;

        info!(
            users,
            ramp_up_secs = ramp_up.as_secs(),
            hold_secs = hold.as_secs(),
            "Starting closed-loop load"
        );

        let client = Arc::clone(&self.client);
        let request = Arc::clone(&self.request);
        let aggregator = Arc::clone(&self.aggregator);

        let task: WorkerTask = Arc::new(move |worker: usize| {
            let client = Arc::clone(&client);
            let request = Arc::clone(&request);
            let aggregator = Arc::clone(&aggregator);
            async move {
                sleep_until(started + stagger * worker as u32).await;
                while Instant::now() < deadline {
                    let response = client.invoke(&request).await;
                    aggregator.record_status(response.status, response.latency);
                }
            }
            .boxed()
        });

        self.pool.run_concurrently(users, task).await;
    }

    /// Run continuously while cutting a measurement at every window boundary.
    async fn run_windowed(
        &self,
        rate: u32,
        ramp_up: Duration,
        windows: &[Duration],
    ) -> Vec<Measurement> {
        let hold: Duration = windows.iter().sum();
        let plan = LoadPlan::ramped(rate, ramp_up, hold);

        self.aggregator.reset();

        let collector = async {
            sleep(ramp_up).await;
            self.aggregator.reset();

            let mut measurements = Vec::with_capacity(windows.len());
            let mut window_start = Instant::now();
            let mut boundary = window_start;
            for (index, &window) in windows.iter().enumerate() {
                boundary += window;
                sleep_until(boundary).await;

                let now = Instant::now();
                let measurement = self
                    .aggregator
                    .snapshot_and_reset(now.duration_since(window_start));
                debug!(
                    rate,
                    window = index + 1,
                    throughput = measurement.current_throughput,
                    error_rate = measurement.error_rate,
                    p99_ms = measurement.p99_latency_ms,
                    "Measurement window closed"
                );

                window_start = now;
                measurements.push(measurement);
            }
            measurements
        };

        let ((), measurements) = tokio::join!(self.run(plan), collector);
        measurements
    }
}

#[async_trait]
impl LoadProbe for LoadDriver {
    async fn measure(&mut self, plan: LoadPlan) -> Measurement {
        let mut measurements = self.run_windowed(plan.rate, plan.ramp_up, &[plan.hold]).await;
        measurements
            .pop()
            .unwrap_or_else(|| self.aggregator.snapshot(Duration::ZERO))
    }

    async fn measure_windows(
        &mut self,
        rate: u32,
        ramp_up: Duration,
        windows: &[Duration],
    ) -> Vec<Measurement> {
        self.run_windowed(rate, ramp_up, windows).await
    }
}

/// Shared state of the workers of one paced run.
struct PacedWorker {
    client: Arc<dyn RpcClient>,
    request: Arc<GrpcRequest>,
    aggregator: Arc<MetricsAggregator>,
    plan: LoadPlan,
    workers: usize,
    started: Instant,
    deadline: Instant,
}

impl PacedWorker {
    /// Gap between two calls of one worker when a slot falls at `at`.
    fn interval_at(&self, at: Instant) -> Duration {
        let workers = self.workers as f64;
        // Each worker carries at least 1 RPS so ramp intervals stay short
        let rate = self
            .plan
            .rate_at(at.duration_since(self.started))
            .max(workers);
        Duration::from_secs_f64(workers / rate)
    }

    /// Call on an absolute per-worker schedule until the deadline.
    ///
    /// Slots advance by the interval regardless of when the previous call actually
    /// started, so timer overshoot is paid back on the next slot instead of adding up.
    /// A worker that fell behind after a slow call issues its next call right away.
    async fn drive(&self, index: usize) {
        // Stagger first slots across one interval so workers do not fire in lockstep
        let offset = self
            .interval_at(self.started)
            .mul_f64(index as f64 / self.workers as f64);
        let mut next_slot = self.started + offset;

        loop {
            sleep_until(next_slot.min(self.deadline)).await;
            if Instant::now() >= self.deadline {
                break;
            }

            let response = self.client.invoke(&self.request).await;
            self.aggregator
                .record_status(response.status, response.latency);

            next_slot += self.interval_at(next_slot);
        }
    }
}
