//! Tolerance-based timing comparison
//!
//! Wall-clock samples are noisy, so a variant is only a regression when it
//! exceeds the baseline by more than the tolerance factor. Slower-but-within
//! tolerance is reported, never failed.

use std::time::{Duration, Instant};

use crate::config::HarnessConfig;
use crate::errors::{HarnessError, HarnessErrorCode, HarnessResult};
use crate::observability::{format_ms, log_event_at, log_event_with_fields, Event, Severity};

/// Tolerance used when no configuration is supplied
pub const DEFAULT_TOLERANCE_FACTOR: f64 = 1.2;

/// One labelled timing sample
#[derive(Debug, Clone, PartialEq)]
pub struct TimingSample {
    pub label: String,
    pub duration: Duration,
}

impl TimingSample {
    /// Duration in seconds
    pub fn seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Result of a passing tolerance check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToleranceOutcome {
    /// Variant was faster; ratio is variant / baseline
    Improved { ratio: f64 },
    /// Variant took exactly as long as the baseline
    Unchanged,
    /// Variant was slower but within the tolerance factor
    RegressedWithinTolerance { ratio: f64 },
    /// Baseline measured zero and the variant did not
    BaselineUnmeasurable,
}

impl ToleranceOutcome {
    /// Returns true if the variant was slower than the baseline
    pub fn is_slower(&self) -> bool {
        matches!(self, ToleranceOutcome::RegressedWithinTolerance { .. })
    }
}

/// First sample against the mean of the samples after it
#[derive(Debug, Clone, PartialEq)]
pub struct RepetitionSummary {
    pub first: Duration,
    pub average_subsequent: Duration,
    /// Positive when later runs were faster, negative when slower
    pub improvement_percent: f64,
}

impl RepetitionSummary {
    fn from_samples(first: Duration, subsequent: &[Duration]) -> Self {
        if subsequent.is_empty() {
            return Self {
                first,
                average_subsequent: first,
                improvement_percent: 0.0,
            };
        }

        let total: u128 = subsequent.iter().map(Duration::as_nanos).sum();
        let average = total / subsequent.len() as u128;
        let first_nanos = first.as_nanos();
        let improvement_percent = if first_nanos == 0 {
            0.0
        } else {
            (first_nanos as f64 - average as f64) / first_nanos as f64 * 100.0
        };

        Self {
            first,
            average_subsequent: Duration::from_nanos(u64::try_from(average).unwrap_or(u64::MAX)),
            improvement_percent,
        }
    }
}

/// Compare a variant duration against a baseline
pub fn compare_durations(
    baseline: Duration,
    variant: Duration,
    factor: f64,
) -> HarnessResult<ToleranceOutcome> {
    check_factor(factor)?;

    if baseline.is_zero() {
        return Ok(if variant.is_zero() {
            ToleranceOutcome::Unchanged
        } else {
            ToleranceOutcome::BaselineUnmeasurable
        });
    }
    if variant == baseline {
        return Ok(ToleranceOutcome::Unchanged);
    }

    let ratio = variant.as_nanos() as f64 / baseline.as_nanos() as f64;
    if variant < baseline {
        return Ok(ToleranceOutcome::Improved { ratio });
    }
    if variant.as_nanos() as f64 > baseline.as_nanos() as f64 * factor {
        return Err(HarnessError::performance_regression(format!(
            "variant took {}ms against a baseline of {}ms ({:.3}x, tolerance {:.3}x)",
            format_ms(variant),
            format_ms(baseline),
            ratio,
            factor
        )));
    }
    Ok(ToleranceOutcome::RegressedWithinTolerance { ratio })
}

/// Check every later duration against the first
pub fn check_monotonic(samples: &[Duration], factor: f64) -> HarnessResult<RepetitionSummary> {
    check_factor(factor)?;
    let Some((&first, rest)) = samples.split_first() else {
        return Err(HarnessError::assertion_failed(
            "monotonic check needs at least one sample",
        ));
    };

    for (position, &later) in rest.iter().enumerate() {
        compare_durations(first, later, factor).map_err(|e| {
            HarnessError::performance_regression(format!(
                "run {} regressed against run 1: {}",
                position + 2,
                e.message()
            ))
        })?;
    }

    Ok(RepetitionSummary::from_samples(first, rest))
}

fn check_factor(factor: f64) -> HarnessResult<()> {
    if !factor.is_finite() || factor < 1.0 {
        return Err(HarnessError::config_invalid(format!(
            "tolerance factor must be a finite number >= 1.0, got {}",
            factor
        )));
    }
    Ok(())
}

/// Labelled timing samples and the checks run against them
#[derive(Debug, Clone)]
pub struct PerformanceComparator {
    samples: Vec<TimingSample>,
    tolerance_factor: f64,
}

impl Default for PerformanceComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceComparator {
    /// Comparator with the default tolerance
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            tolerance_factor: DEFAULT_TOLERANCE_FACTOR,
        }
    }

    /// Comparator using the configured tolerance
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            samples: Vec::new(),
            tolerance_factor: config.tolerance_factor,
        }
    }

    /// Configured tolerance factor
    pub fn tolerance_factor(&self) -> f64 {
        self.tolerance_factor
    }

    /// Record a sample; a repeated label replaces the earlier sample
    pub fn record(&mut self, label: &str, duration: Duration) {
        let millis = format_ms(duration);
        log_event_with_fields(
            Event::TimingRecorded,
            &[("label", label), ("duration_ms", millis.as_str())],
        );

        match self.samples.iter_mut().find(|s| s.label == label) {
            Some(sample) => sample.duration = duration,
            None => self.samples.push(TimingSample {
                label: label.to_string(),
                duration,
            }),
        }
    }

    /// Run a closure and record how long it took
    pub fn time<T>(&mut self, label: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let value = f();
        self.record(label, start.elapsed());
        value
    }

    /// Recorded sample for a label
    pub fn sample(&self, label: &str) -> Option<&TimingSample> {
        self.samples.iter().find(|s| s.label == label)
    }

    /// All samples in recording order
    pub fn samples(&self) -> &[TimingSample] {
        &self.samples
    }

    fn duration_of(&self, label: &str) -> HarnessResult<Duration> {
        self.sample(label)
            .map(|s| s.duration)
            .ok_or_else(|| HarnessError::assertion_failed(format!("no timing sample for {}", label)))
    }

    /// Fail if the variant exceeds the baseline by more than `factor`
    pub fn assert_within_tolerance(
        &self,
        baseline: &str,
        variant: &str,
        factor: f64,
    ) -> HarnessResult<ToleranceOutcome> {
        let outcome = compare_durations(self.duration_of(baseline)?, self.duration_of(variant)?, factor)
            .map_err(|e| {
                if e.code() == HarnessErrorCode::PerformanceRegression {
                    HarnessError::performance_regression(format!(
                        "{} vs {}: {}",
                        variant,
                        baseline,
                        e.message()
                    ))
                } else {
                    e
                }
            })?;

        if let ToleranceOutcome::RegressedWithinTolerance { ratio } = outcome {
            let ratio = format!("{:.3}", ratio);
            let factor = format!("{:.3}", factor);
            log_event_at(
                Severity::Warn,
                Event::RegressionWithinTolerance,
                &[
                    ("baseline", baseline),
                    ("variant", variant),
                    ("ratio", ratio.as_str()),
                    ("tolerance", factor.as_str()),
                ],
            );
        }
        Ok(outcome)
    }

    /// Check every later labelled sample against the first and log a summary
    pub fn assert_monotonic_non_regression(
        &self,
        labels: &[&str],
        factor: f64,
    ) -> HarnessResult<RepetitionSummary> {
        let durations = labels
            .iter()
            .map(|label| self.duration_of(label))
            .collect::<HarnessResult<Vec<_>>>()?;
        let summary = check_monotonic(&durations, factor)?;

        let first = format_ms(summary.first);
        let average = format_ms(summary.average_subsequent);
        let improvement = format!("{:.1}", summary.improvement_percent);
        let runs = labels.len().to_string();
        log_event_with_fields(
            Event::RepetitionSummary,
            &[
                ("runs", runs.as_str()),
                ("first_ms", first.as_str()),
                ("average_subsequent_ms", average.as_str()),
                ("improvement_percent", improvement.as_str()),
            ],
        );
        Ok(summary)
    }

    /// Discard every sample
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
