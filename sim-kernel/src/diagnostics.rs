// Per-tick and windowed profiling: phase timings, percentiles, slow-tick
// alerts. Observability only; nothing here feeds back into simulation policy.

use std::time::Duration;

use crate::ring::RingBuffer;
use crate::types::Tick;

// === PHASES ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ExternalEvents,
    DemandInjection,
    Matching,
    PriceDiscovery,
    Production,
    CompetitorDecision,
    ExpirySweep,
    SnapshotEmit,
}

impl Phase {
    pub const COUNT: usize = 8;

    pub fn all() -> [Phase; Phase::COUNT] {
        [
            Phase::ExternalEvents,
            Phase::DemandInjection,
            Phase::Matching,
            Phase::PriceDiscovery,
            Phase::Production,
            Phase::CompetitorDecision,
            Phase::ExpirySweep,
            Phase::SnapshotEmit,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::ExternalEvents => "external_events",
            Phase::DemandInjection => "demand_injection",
            Phase::Matching => "matching",
            Phase::PriceDiscovery => "price_discovery",
            Phase::Production => "production",
            Phase::CompetitorDecision => "competitor_decision",
            Phase::ExpirySweep => "expiry_sweep",
            Phase::SnapshotEmit => "snapshot_emit",
        }
    }

    fn index(self) -> usize {
        match self {
            Phase::ExternalEvents => 0,
            Phase::DemandInjection => 1,
            Phase::Matching => 2,
            Phase::PriceDiscovery => 3,
            Phase::Production => 4,
            Phase::CompetitorDecision => 5,
            Phase::ExpirySweep => 6,
            Phase::SnapshotEmit => 7,
        }
    }
}

// === SAMPLES ===

#[derive(Debug, Clone, Copy)]
pub struct TickSample {
    pub tick: Tick,
    pub total_us: u64,
    pub phase_us: [u64; Phase::COUNT],
    pub slow: bool,
}

/// Bounded store of per-tick samples plus the in-progress tick.
#[derive(Debug, Clone)]
pub struct TickProfiler {
    samples: RingBuffer<TickSample>,
    current: Option<TickSample>,
    slow_ticks_total: u64,
}

impl TickProfiler {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: RingBuffer::with_capacity(capacity.max(1))
                .expect("profiler capacity is nonzero"),
            current: None,
            slow_ticks_total: 0,
        }
    }

    pub fn begin_tick(&mut self, tick: Tick) {
        self.current = Some(TickSample {
            tick,
            total_us: 0,
            phase_us: [0; Phase::COUNT],
            slow: false,
        });
    }

    pub fn record_phase(&mut self, phase: Phase, elapsed: Duration) {
        if let Some(sample) = &mut self.current {
            sample.phase_us[phase.index()] += elapsed.as_micros() as u64;
        }
    }

    pub fn end_tick(&mut self, total: Duration, slow: bool) {
        if let Some(mut sample) = self.current.take() {
            sample.total_us = total.as_micros() as u64;
            sample.slow = slow;
            if slow {
                self.slow_ticks_total += 1;

                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "slow_tick",
                    tick = sample.tick,
                    total_us = sample.total_us,
                );
            }
            self.samples.push(sample);
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn slow_ticks_total(&self) -> u64 {
        self.slow_ticks_total
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.current = None;
        self.slow_ticks_total = 0;
    }

    /// Windowed report over the last `window` samples.
    pub fn generate_report(&self, window: usize, warn_p95_us: u64) -> DiagnosticsReport {
        let samples = self.samples.last_n(window);
        if samples.is_empty() {
            return DiagnosticsReport::default();
        }

        let mut totals: Vec<u64> = samples.iter().map(|s| s.total_us).collect();
        totals.sort_unstable();
        let sum: u64 = totals.iter().sum();
        let n = totals.len();
        let avg = sum as f64 / n as f64;
        let variance =
            totals.iter().map(|&t| (t as f64 - avg).powi(2)).sum::<f64>() / n as f64;

        let window_total: u64 = sum.max(1);
        let mut phases = Vec::with_capacity(Phase::COUNT);
        for phase in Phase::all() {
            let times: Vec<u64> = samples.iter().map(|s| s.phase_us[phase.index()]).collect();
            let total: u64 = times.iter().sum();
            let max = times.iter().copied().max().unwrap_or(0);
            phases.push(PhaseStats {
                phase,
                avg_us: total as f64 / n as f64,
                max_us: max,
                total_us: total,
                share: total as f64 / window_total as f64,
            });
        }
        let mut hotspots: Vec<Phase> = Phase::all().to_vec();
        hotspots.sort_by(|a, b| {
            phases[b.index()]
                .total_us
                .cmp(&phases[a.index()].total_us)
        });

        let p95 = percentile(&totals, 95.0);
        let mut warnings = Vec::new();
        if p95 > warn_p95_us {
            warnings.push(format!(
                "p95 tick time {p95}us exceeds the {warn_p95_us}us budget"
            ));
        }
        for stats in &phases {
            if stats.share > 0.40 && stats.total_us > 0 {
                warnings.push(format!(
                    "phase {} consumed {:.0}% of the window",
                    stats.phase.name(),
                    stats.share * 100.0
                ));
            }
        }

        DiagnosticsReport {
            window: n,
            avg_us: avg,
            min_us: totals[0],
            max_us: totals[n - 1],
            std_dev_us: variance.sqrt(),
            p50_us: percentile(&totals, 50.0),
            p95_us: p95,
            p99_us: percentile(&totals, 99.0),
            slow_ticks: samples.iter().filter(|s| s.slow).count(),
            phases,
            hotspots,
            warnings,
        }
    }
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

// === REPORT ===

#[derive(Debug, Clone)]
pub struct PhaseStats {
    pub phase: Phase,
    pub avg_us: f64,
    pub max_us: u64,
    pub total_us: u64,
    pub share: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticsReport {
    pub window: usize,
    pub avg_us: f64,
    pub min_us: u64,
    pub max_us: u64,
    pub std_dev_us: f64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub slow_ticks: usize,
    pub phases: Vec<PhaseStats>,
    /// Phases ranked by total time, heaviest first.
    pub hotspots: Vec<Phase>,
    pub warnings: Vec<String>,
}
