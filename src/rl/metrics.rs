//! Episode statistics for planting runs

use std::collections::VecDeque;
use std::time::Instant;

/// Moving average calculator
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f64>,
    window_size: usize,
    sum: f64,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() >= self.window_size
            && let Some(old) = self.values.pop_front()
        {
            self.sum -= old;
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// How an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeEnd {
    /// Seedling target reached
    Completed,
    /// The simulator could not evaluate a planting
    SimulationFailed,
    /// Failure budget exhausted
    FailureBudget,
    /// Step limit reached
    StepLimit,
}

/// Totals for one finished episode
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub total_reward: f64,
    pub steps: usize,
    pub seedlings: usize,
    pub failed_plantings: usize,
    pub final_carbon: f64,
    pub simulator_runs: usize,
    pub simulation_seconds: f64,
    pub end: EpisodeEnd,
}

/// Rolling statistics over recent episodes
#[derive(Debug)]
pub struct EpisodeMetrics {
    pub rewards: MovingAverage,
    pub lengths: MovingAverage,
    pub carbon: MovingAverage,
    pub failed_plantings: MovingAverage,
    /// Share of episodes that reached the seedling target
    pub completion_rate: MovingAverage,
    /// Mean seconds per simulator run, per episode
    pub simulation_duration: MovingAverage,
    pub episodes: usize,
    pub total_steps: usize,
    simulation_seconds: f64,
    start_time: Instant,
}

impl EpisodeMetrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            rewards: MovingAverage::new(window_size),
            lengths: MovingAverage::new(window_size),
            carbon: MovingAverage::new(window_size),
            failed_plantings: MovingAverage::new(window_size),
            completion_rate: MovingAverage::new(window_size),
            simulation_duration: MovingAverage::new(window_size),
            episodes: 0,
            total_steps: 0,
            simulation_seconds: 0.0,
            start_time: Instant::now(),
        }
    }

    pub fn record(&mut self, summary: &EpisodeSummary) {
        self.rewards.push(summary.total_reward);
        self.lengths.push(summary.steps as f64);
        self.carbon.push(summary.final_carbon);
        self.failed_plantings.push(summary.failed_plantings as f64);
        self.completion_rate.push(if summary.end == EpisodeEnd::Completed { 1.0 } else { 0.0 });
        if summary.simulator_runs > 0 {
            self.simulation_duration
                .push(summary.simulation_seconds / summary.simulator_runs as f64);
        }
        self.episodes += 1;
        self.total_steps += summary.steps;
        self.simulation_seconds += summary.simulation_seconds;
    }

    /// Share of wall time spent waiting for the simulator
    pub fn simulation_share(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.simulation_seconds / elapsed).min(1.0)
        } else {
            0.0
        }
    }

    pub fn steps_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_steps as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn log_to_console(&self) {
        tracing::info!(
            "Episodes {} | Steps {} | SPS {:.2} | sim {:.0}% ({:.2}s/run)",
            self.episodes,
            self.total_steps,
            self.steps_per_second(),
            self.simulation_share() * 100.0,
            self.simulation_duration.average()
        );
        tracing::info!(
            "  Episode: reward={:.2}, length={:.1}, carbon={:.2} kg, failures={:.1}, completion={:.1}%",
            self.rewards.average(),
            self.lengths.average(),
            self.carbon.average(),
            self.failed_plantings.average(),
            self.completion_rate.average() * 100.0
        );
    }
}

impl Default for EpisodeMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}
