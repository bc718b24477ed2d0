//! Simulation reports and their export formats.
//!
//! A [`SimulationReport`] carries, per source, the total, waiting and
//! processing time samples of every disposed entity with a summary of each,
//! and, per resource, the reconstructed queue length series.

use serde::Serialize;
use std::io::Write;

// ============================================================================
// Report Types
// ============================================================================

/// Summary statistics for a set of samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSummary {
    /// Number of samples.
    pub count: u64,
    /// Sum of all samples.
    pub sum: f64,
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
    /// Mean value.
    pub mean: f64,
    /// 50th percentile (median).
    pub p50: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 99th percentile.
    pub p99: f64,
}

impl DistributionSummary {
    /// Summarize a set of samples. An empty set yields all zeros.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return DistributionSummary {
                count: 0,
                sum: 0.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                p50: 0.0,
                p90: 0.0,
                p99: 0.0,
            };
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let sum: f64 = sorted.iter().sum();

        let percentile = |p: f64| -> f64 {
            let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };

        DistributionSummary {
            count: sorted.len() as u64,
            sum,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sum / sorted.len() as f64,
            p50: percentile(50.0),
            p90: percentile(90.0),
            p99: percentile(99.0),
        }
    }
}

/// Samples together with their summary.
#[derive(Debug, Clone, Serialize)]
pub struct SampleSet {
    /// Per-entity values, in entity creation order.
    pub samples: Vec<f64>,
    /// Summary of `samples`.
    pub summary: DistributionSummary,
}

impl SampleSet {
    /// Wrap samples and summarize them.
    pub fn new(samples: Vec<f64>) -> Self {
        let summary = DistributionSummary::from_samples(&samples);
        SampleSet { samples, summary }
    }
}

/// Results for one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    /// Source name.
    pub name: String,
    /// Entities created by the source.
    pub entities_created: u64,
    /// Entities that finished before the end of the run.
    pub entities_disposed: usize,
    /// Creation to disposal.
    pub total_times: SampleSet,
    /// Time spent queued.
    pub waiting_times: SampleSet,
    /// Time spent in service.
    pub processing_times: SampleSet,
}

/// Results for one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    /// Resource name.
    pub name: String,
    /// Number of entities served at once.
    pub capacity: usize,
    /// Number of requests made.
    pub requests: usize,
    /// Largest queue length observed.
    pub max_queue_len: usize,
    /// Queue length at every whole second of the run.
    pub queue_size_over_time: Vec<usize>,
}

/// Counters collected by the event loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationStats {
    /// Total events processed.
    pub total_events: u64,
    /// Entities created across all sources.
    pub entities_created: u64,
    /// Entities disposed across all sources.
    pub entities_disposed: u64,
    /// Final simulation time in seconds.
    pub simulation_time_s: f64,
    /// Wall clock time in milliseconds.
    pub wall_time_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Seed used for the run.
    pub seed: u64,
    /// Configured run length in seconds.
    pub duration_s: f64,
    /// Event loop counters.
    pub stats: SimulationStats,
    /// Per-source results.
    pub sources: Vec<SourceReport>,
    /// Per-resource results.
    pub resources: Vec<ResourceReport>,
}

// ============================================================================
// Export Functions
// ============================================================================

/// Export a report as JSON.
pub fn export_json<W: Write>(report: &SimulationReport, writer: &mut W) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, report)?;
    writeln!(writer)?;
    Ok(())
}

/// Export the per-source summaries as CSV, one row per source and metric.
pub fn export_csv<W: Write>(report: &SimulationReport, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "source,metric,count,sum,min,max,mean,p50,p90,p99")?;
    for source in &report.sources {
        let metrics = [
            ("total_time", &source.total_times.summary),
            ("waiting_time", &source.waiting_times.summary),
            ("processing_time", &source.processing_times.summary),
        ];
        for (metric, s) in metrics {
            writeln!(
                writer,
                "{},{},{},{},{},{},{},{},{},{}",
                escape_csv(&source.name),
                metric,
                s.count,
                s.sum,
                s.min,
                s.max,
                s.mean,
                s.p50,
                s.p90,
                s.p99
            )?;
        }
    }
    Ok(())
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_of_samples() {
        let samples: Vec<f64> = (1..=10).map(f64::from).rev().collect();
        let s = DistributionSummary::from_samples(&samples);
        assert_eq!(s.count, 10);
        assert_eq!(s.sum, 55.0);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 10.0);
        assert_eq!(s.mean, 5.5);
        // round(0.5 * 9) = 5 -> sixth smallest
        assert_eq!(s.p50, 6.0);
        assert_eq!(s.p90, 9.0);
        assert_eq!(s.p99, 10.0);
    }

    #[test]
    fn test_summary_of_nothing() {
        let s = DistributionSummary::from_samples(&[]);
        assert_eq!(s.count, 0);
        assert_eq!(s.mean, 0.0);
    }

    fn report() -> SimulationReport {
        SimulationReport {
            seed: 1,
            duration_s: 10.0,
            stats: SimulationStats::default(),
            sources: vec![SourceReport {
                name: "Walk-ins, east".to_string(),
                entities_created: 2,
                entities_disposed: 2,
                total_times: SampleSet::new(vec![3.0, 5.0]),
                waiting_times: SampleSet::new(vec![0.0, 2.0]),
                processing_times: SampleSet::new(vec![3.0, 3.0]),
            }],
            resources: vec![ResourceReport {
                name: "Counter".to_string(),
                capacity: 1,
                requests: 2,
                max_queue_len: 1,
                queue_size_over_time: vec![0, 1, 0],
            }],
        }
    }

    #[test]
    fn test_export_csv() {
        let mut out = Vec::new();
        export_csv(&report(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "source,metric,count,sum,min,max,mean,p50,p90,p99");
        assert_eq!(lines[2], "\"Walk-ins, east\",waiting_time,2,2,0,2,1,2,2,2");
    }

    #[test]
    fn test_export_json() {
        let mut out = Vec::new();
        export_json(&report(), &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["resources"][0]["queue_size_over_time"], serde_json::json!([0, 1, 0]));
        assert_eq!(value["sources"][0]["total_times"]["summary"]["mean"], 4.0);
    }
}
