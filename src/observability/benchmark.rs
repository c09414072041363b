//! Side-by-side comparison of routing strategies.
//!
//! While a benchmark runs, every proxied request is attributed to the
//! strategy that routed it. Switching strategies pauses the clock of the
//! previous one, so each strategy's duration covers only its own phase.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::load_balancer::StrategyKind;
use crate::registry::instance::unix_millis;

/// Latency samples kept per strategy; counts and averages stay exact beyond it.
pub const MAX_LATENCY_SAMPLES: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BenchmarkError {
    #[error("Benchmark already running")]
    AlreadyRunning,
    #[error("No benchmark currently running")]
    NotRunning,
}

#[derive(Debug)]
struct StrategyRun {
    requests: u64,
    errors: u64,
    total_latency_ms: u64,
    samples: Vec<u64>,
    active_for: Duration,
    resumed_at: Option<Instant>,
}

impl StrategyRun {
    fn new(active: bool) -> Self {
        Self {
            requests: 0,
            errors: 0,
            total_latency_ms: 0,
            samples: Vec::new(),
            active_for: Duration::ZERO,
            resumed_at: active.then(Instant::now),
        }
    }

    fn record(&mut self, latency_ms: u64, is_error: bool) {
        self.requests += 1;
        if is_error {
            self.errors += 1;
        }
        self.total_latency_ms += latency_ms;
        if self.samples.len() < MAX_LATENCY_SAMPLES {
            self.samples.push(latency_ms);
        }
    }

    fn pause(&mut self) {
        if let Some(since) = self.resumed_at.take() {
            self.active_for += since.elapsed();
        }
    }

    fn resume(&mut self) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(Instant::now());
        }
    }

    fn duration(&self) -> Duration {
        self.active_for + self.resumed_at.map_or(Duration::ZERO, |since| since.elapsed())
    }

    fn summary(&self) -> RunSummary {
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let percentile = |p: f64| -> Option<u64> {
            let last = sorted.len().checked_sub(1)?;
            Some(sorted[((sorted.len() as f64 * p) as usize).min(last)])
        };

        let (average, error_rate) = if self.requests == 0 {
            (0.0, 0.0)
        } else {
            (
                self.total_latency_ms as f64 / self.requests as f64,
                self.errors as f64 * 100.0 / self.requests as f64,
            )
        };

        RunSummary {
            request_count: self.requests,
            error_count: self.errors,
            error_rate,
            average_response_time: average,
            duration_ms: self.duration().as_millis() as u64,
            p50_response_time: percentile(0.50),
            p95_response_time: percentile(0.95),
            p99_response_time: percentile(0.99),
            min_response_time: sorted.first().copied(),
            max_response_time: sorted.last().copied(),
        }
    }
}

/// Results of one strategy. Latencies in milliseconds, error rate in percent.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub request_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub average_response_time: f64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p50_response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95_response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p99_response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_time: Option<u64>,
}

/// Winners per metric among strategies that served traffic.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_response_time: Option<StrategyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_throughput: Option<StrategyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lowest_error_rate: Option<StrategyKind>,
    /// `"<a> vs <b>"` → how much lower `a`'s average latency is than `b`'s, in percent.
    pub performance_improvements: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    pub algorithm_results: BTreeMap<StrategyKind, RunSummary>,
    pub duration_minutes: u64,
    pub start_time: Option<u64>,
    pub performance_comparison: Comparison,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkStatus {
    pub benchmark_active: bool,
    pub current_algorithm: Option<StrategyKind>,
    pub current_phase: usize,
    pub total_phases: usize,
    pub test_algorithms: Vec<StrategyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_algorithm_stats: Option<RunSummary>,
}

#[derive(Debug, Default)]
struct BenchmarkState {
    active: bool,
    started: Option<Instant>,
    started_at_ms: Option<u64>,
    duration_minutes: u64,
    current: Option<StrategyKind>,
    runs: BTreeMap<StrategyKind, StrategyRun>,
}

/// Collects per-strategy request outcomes while a benchmark is running.
#[derive(Debug, Default)]
pub struct BenchmarkTracker {
    state: Mutex<BenchmarkState>,
}

impl BenchmarkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BenchmarkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Start a run with `initial` as the first phase. Previous results are discarded.
    pub fn start(&self, initial: StrategyKind, duration_minutes: u64) -> Result<u64, BenchmarkError> {
        let mut state = self.lock();
        if state.active {
            return Err(BenchmarkError::AlreadyRunning);
        }

        let started_at_ms = unix_millis();
        state.active = true;
        state.started = Some(Instant::now());
        state.started_at_ms = Some(started_at_ms);
        state.duration_minutes = duration_minutes;
        state.current = Some(initial);
        state.runs = StrategyKind::ALL
            .iter()
            .map(|kind| (*kind, StrategyRun::new(*kind == initial)))
            .collect();

        tracing::info!(strategy = %initial, duration_minutes, "Benchmark started");
        Ok(started_at_ms)
    }

    /// End the run and return the final report with its total duration.
    pub fn stop(&self) -> Result<(BenchmarkReport, Duration), BenchmarkError> {
        let mut state = self.lock();
        if !state.active {
            return Err(BenchmarkError::NotRunning);
        }

        state.active = false;
        for run in state.runs.values_mut() {
            run.pause();
        }
        let total = state.started.map_or(Duration::ZERO, |s| s.elapsed());
        tracing::info!(total_ms = total.as_millis() as u64, "Benchmark stopped");
        Ok((report(&state), total))
    }

    /// Make `kind` the phase that collects results.
    pub fn switch(&self, kind: StrategyKind) {
        let mut state = self.lock();
        let active = state.active;
        for (k, run) in state.runs.iter_mut() {
            if *k != kind {
                run.pause();
            }
        }
        let run = state
            .runs
            .entry(kind)
            .or_insert_with(|| StrategyRun::new(active));
        if active {
            run.resume();
        }
        state.current = Some(kind);
    }

    /// Discard the results of `kind`, keeping its phase state.
    pub fn reset(&self, kind: StrategyKind) {
        let mut state = self.lock();
        let running = state.active && state.current == Some(kind);
        state.runs.insert(kind, StrategyRun::new(running));
    }

    /// The phase results are currently attributed to.
    pub fn current(&self) -> Option<StrategyKind> {
        self.lock().current
    }

    /// Record one proxied request served under `strategy`.
    ///
    /// Ignored while no benchmark runs, and for health and actuator paths.
    pub fn record(&self, strategy: StrategyKind, path: &str, latency: Duration, status: u16) {
        if path.contains("/actuator/") || path.contains("/health") {
            return;
        }
        let mut state = self.lock();
        if !state.active {
            return;
        }

        let run = state
            .runs
            .entry(strategy)
            .or_insert_with(|| StrategyRun::new(false));
        run.record(latency.as_millis() as u64, !(200..300).contains(&status));
        if run.requests % 100 == 0 {
            let summary = run.summary();
            tracing::info!(
                strategy = %strategy,
                requests = summary.request_count,
                avg_ms = summary.average_response_time,
                error_rate = summary.error_rate,
                "Benchmark progress"
            );
        }
    }

    pub fn status(&self) -> BenchmarkStatus {
        let state = self.lock();
        let test_algorithms = StrategyKind::ALL.to_vec();
        let current_phase = state
            .current
            .and_then(|c| test_algorithms.iter().position(|k| *k == c))
            .map_or(0, |i| i + 1);

        BenchmarkStatus {
            benchmark_active: state.active,
            current_algorithm: state.current,
            current_phase,
            total_phases: test_algorithms.len(),
            test_algorithms,
            elapsed_time_ms: state
                .started
                .filter(|_| state.active)
                .map(|s| s.elapsed().as_millis() as u64),
            current_algorithm_stats: state
                .current
                .and_then(|c| state.runs.get(&c))
                .map(StrategyRun::summary),
        }
    }

    pub fn report(&self) -> BenchmarkReport {
        report(&self.lock())
    }
}

fn report(state: &BenchmarkState) -> BenchmarkReport {
    let algorithm_results: BTreeMap<StrategyKind, RunSummary> = state
        .runs
        .iter()
        .map(|(kind, run)| (*kind, run.summary()))
        .collect();
    let performance_comparison = compare(&algorithm_results);

    BenchmarkReport {
        algorithm_results,
        duration_minutes: state.duration_minutes,
        start_time: state.started_at_ms,
        performance_comparison,
    }
}

fn compare(results: &BTreeMap<StrategyKind, RunSummary>) -> Comparison {
    let served: Vec<(StrategyKind, &RunSummary)> = results
        .iter()
        .filter(|(_, r)| r.request_count > 0)
        .map(|(k, r)| (*k, r))
        .collect();

    if served.len() < 2 {
        return Comparison {
            message: Some("Need at least 2 algorithms to compare"),
            best_response_time: None,
            best_throughput: None,
            lowest_error_rate: None,
            performance_improvements: BTreeMap::new(),
        };
    }

    let best_by = |value: fn(&RunSummary) -> f64, higher_is_better: bool| {
        served
            .iter()
            .max_by(|a, b| {
                let ord = value(a.1).total_cmp(&value(b.1));
                if higher_is_better {
                    ord
                } else {
                    ord.reverse()
                }
            })
            .map(|(k, _)| *k)
    };

    let mut improvements = BTreeMap::new();
    for (i, (a, ra)) in served.iter().enumerate() {
        for (b, rb) in served.iter().skip(i + 1) {
            if rb.average_response_time > 0.0 {
                let gain = (rb.average_response_time - ra.average_response_time)
                    / rb.average_response_time
                    * 100.0;
                improvements.insert(format!("{a} vs {b}"), format!("{gain:.1}%"));
            }
        }
    }

    Comparison {
        message: None,
        best_response_time: best_by(|r| r.average_response_time, false),
        best_throughput: best_by(|r| r.request_count as f64, true),
        lowest_error_rate: best_by(|r| r.error_rate, false),
        performance_improvements: improvements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn idle_tracker_ignores_traffic() {
        let tracker = BenchmarkTracker::new();
        tracker.record(StrategyKind::RoundRobin, "/items", ms(5), 200);
        assert!(tracker.report().algorithm_results.is_empty());
        assert!(matches!(tracker.stop(), Err(BenchmarkError::NotRunning)));
    }

    #[test]
    fn results_are_attributed_per_strategy() {
        let tracker = BenchmarkTracker::new();
        tracker.start(StrategyKind::RoundRobin, 10).unwrap();
        assert_eq!(
            tracker.start(StrategyKind::RlRemote, 10),
            Err(BenchmarkError::AlreadyRunning)
        );

        for latency in [10, 20, 30, 40] {
            tracker.record(StrategyKind::RoundRobin, "/items", ms(latency), 200);
        }
        tracker.record(StrategyKind::RoundRobin, "/items", ms(100), 503);
        tracker.record(StrategyKind::RoundRobin, "/actuator/health", ms(1), 200);

        tracker.switch(StrategyKind::LeastConnections);
        tracker.record(StrategyKind::LeastConnections, "/items", ms(10), 200);
        tracker.record(StrategyKind::LeastConnections, "/items", ms(10), 200);

        let (report, _) = tracker.stop().unwrap();
        let rr = &report.algorithm_results[&StrategyKind::RoundRobin];
        assert_eq!(rr.request_count, 5);
        assert_eq!(rr.error_count, 1);
        assert_eq!(rr.error_rate, 20.0);
        assert_eq!(rr.average_response_time, 40.0);
        assert_eq!(rr.p50_response_time, Some(30));
        assert_eq!(rr.min_response_time, Some(10));
        assert_eq!(rr.max_response_time, Some(100));

        let cmp = &report.performance_comparison;
        assert_eq!(cmp.best_response_time, Some(StrategyKind::LeastConnections));
        assert_eq!(cmp.best_throughput, Some(StrategyKind::RoundRobin));
        assert_eq!(cmp.lowest_error_rate, Some(StrategyKind::LeastConnections));
        assert_eq!(
            cmp.performance_improvements["round-robin vs least-connections"],
            "-300.0%"
        );

        let rl = &report.algorithm_results[&StrategyKind::RlRemote];
        assert_eq!(rl.request_count, 0);
        assert_eq!(rl.p50_response_time, None);
    }

    #[test]
    fn single_strategy_has_nothing_to_compare() {
        let tracker = BenchmarkTracker::new();
        tracker.start(StrategyKind::RoundRobin, 1).unwrap();
        tracker.record(StrategyKind::RoundRobin, "/", ms(3), 200);
        let cmp = tracker.report().performance_comparison;
        assert!(cmp.message.is_some());
        assert!(cmp.best_response_time.is_none());
    }

    #[test]
    fn reset_clears_one_strategy() {
        let tracker = BenchmarkTracker::new();
        tracker.start(StrategyKind::RoundRobin, 1).unwrap();
        tracker.record(StrategyKind::RoundRobin, "/", ms(3), 200);
        tracker.record(StrategyKind::RlStatic, "/", ms(3), 200);

        tracker.reset(StrategyKind::RoundRobin);
        let results = tracker.report().algorithm_results;
        assert_eq!(results[&StrategyKind::RoundRobin].request_count, 0);
        assert_eq!(results[&StrategyKind::RlStatic].request_count, 1);
    }

    #[test]
    fn status_tracks_phase() {
        let tracker = BenchmarkTracker::new();
        tracker.start(StrategyKind::LeastConnections, 5).unwrap();
        let status = tracker.status();
        assert!(status.benchmark_active);
        assert_eq!(status.current_phase, 2);
        assert_eq!(status.total_phases, 4);
        assert!(status.elapsed_time_ms.is_some());
        assert_eq!(
            status.current_algorithm_stats.map(|s| s.request_count),
            Some(0)
        );
    }
}
