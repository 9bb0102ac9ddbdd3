//! Plain-text report tables for benchmark runs.

use std::fmt::Write as _;

use serde::Serialize;

use super::{BatchRunSummary, HybridSummary, LatencyStats, RunSummary};
use crate::router::AggregationMethod;

const WIDE: usize = 100;
const NARROW: usize = 80;

fn rule(out: &mut String, ch: char, width: usize) {
    out.extend(std::iter::repeat(ch).take(width));
    out.push('\n');
}

fn banner(out: &mut String, title: &str, width: usize) {
    rule(out, '=', width);
    let _ = writeln!(out, "{title}");
    rule(out, '=', width);
}

fn accuracy_cell(correct: usize, total: usize, pct: f64) -> String {
    format!("{correct}/{total} ({pct:.1}%)")
}

fn latency_lines(out: &mut String, indent: &str, stats: &LatencyStats) {
    let _ = writeln!(out, "{indent}Average Response Time: {:.3}s", stats.avg);
    let _ = writeln!(out, "{indent}P95 Response Time: {:.3}s", stats.p95);
    let _ = writeln!(out, "{indent}P99 Response Time: {:.3}s", stats.p99);
    let _ = writeln!(out, "{indent}Min Response Time: {:.3}s", stats.min);
    let _ = writeln!(out, "{indent}Max Response Time: {:.3}s", stats.max);
}

/// Thousands separators for token counts.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// =============================================================================
// SYNC BASELINE
// =============================================================================

/// One row per model: accuracy, latency percentiles and cost projection.
pub fn render_comparison_table(summaries: &[RunSummary]) -> String {
    let mut out = String::new();
    banner(&mut out, "MODEL COMPARISON - SUMMARY STATISTICS", WIDE);
    out.push('\n');
    let _ = writeln!(
        out,
        "{:<20} {:<16} {:<12} {:<12} {:<12} {:<15} {:<12}",
        "Model", "Accuracy", "Avg Time", "P95 Time", "P99 Time", "Cost/Article", "Daily Cost"
    );
    rule(&mut out, '-', WIDE);
    for s in summaries {
        let _ = writeln!(
            out,
            "{:<20} {:<16} {:<12} {:<12} {:<12} {:<15} {}",
            s.label,
            accuracy_cell(s.correct, s.total, s.accuracy()),
            format!("{:.3}s", s.latency.avg),
            format!("{:.3}s", s.latency.p95),
            format!("{:.3}s", s.latency.p99),
            format!("${:.6}", s.cost_per_article_usd()),
            format!("${:.2}", s.daily_cost_usd()),
        );
    }
    out
}

pub fn render_detailed_breakdown(summaries: &[RunSummary]) -> String {
    let mut out = String::new();
    out.push_str("DETAILED BREAKDOWN BY MODEL:\n");
    rule(&mut out, '=', WIDE);
    for s in summaries {
        let _ = writeln!(out, "\n{}:", s.label);
        let _ = writeln!(
            out,
            "  Accuracy: {}",
            accuracy_cell(s.correct, s.total, s.accuracy())
        );
        let _ = writeln!(
            out,
            "  Response Times: Avg={:.3}s, Min={:.3}s, Max={:.3}s",
            s.latency.avg, s.latency.min, s.latency.max
        );
        let _ = writeln!(
            out,
            "  Tokens: {} input, {} output",
            group_thousands(s.input_tokens),
            group_thousands(s.output_tokens)
        );
        let _ = writeln!(out, "  Total Cost: ${:.6}", s.total_cost_usd());
    }
    out.push('\n');
    rule(&mut out, '=', WIDE);
    out
}

// =============================================================================
// BATCH
// =============================================================================

pub fn render_batch_table(summaries: &[BatchRunSummary]) -> String {
    let mut out = String::new();
    banner(&mut out, "BATCH API MODEL COMPARISON - SUMMARY STATISTICS", WIDE);
    out.push('\n');
    let _ = writeln!(
        out,
        "{:<20} {:<16} {:<12} {:<12} {:<15} {:<12}",
        "Model", "Accuracy", "Total Time", "Avg Time", "Cost/Article", "Daily Cost"
    );
    rule(&mut out, '-', WIDE);
    for s in summaries {
        let _ = writeln!(
            out,
            "{:<20} {:<16} {:<12} {:<12} {:<15} {}",
            s.model,
            accuracy_cell(s.correct, s.total, s.accuracy()),
            format!("{:.1}s", s.wall_time.as_secs_f64()),
            format!("{:.3}s", s.avg_time_per_article()),
            format!("${:.6}", s.cost_per_article_usd()),
            format!("${:.2}", s.daily_cost_usd()),
        );
    }
    out
}

pub fn render_batch_details(summaries: &[BatchRunSummary]) -> String {
    let mut out = String::new();
    out.push_str("DETAILED BREAKDOWN BY MODEL:\n");
    rule(&mut out, '=', WIDE);
    for s in summaries {
        let _ = writeln!(out, "\n{}:", s.model);
        let _ = writeln!(
            out,
            "  Accuracy: {}",
            accuracy_cell(s.correct, s.total, s.accuracy())
        );
        let _ = writeln!(out, "  Total Time: {:.2}s", s.wall_time.as_secs_f64());
        let _ = writeln!(out, "  Avg Time per Article: {:.3}s", s.avg_time_per_article());
        let _ = writeln!(
            out,
            "  Tokens: {} input, {} output",
            group_thousands(s.input_tokens),
            group_thousands(s.output_tokens)
        );
        let _ = writeln!(
            out,
            "  Total Cost: ${:.6} (with 50% batch discount)",
            s.total_cost_usd()
        );
        let _ = writeln!(out, "  Batch Job ID: {}", s.batch_id);
    }
    out.push('\n');
    rule(&mut out, '=', WIDE);
    out
}

// =============================================================================
// ROUTER / HYBRID
// =============================================================================

pub fn render_router_report(
    summary: &RunSummary,
    threshold: f64,
    aggregation: AggregationMethod,
) -> String {
    let mut out = String::new();
    banner(&mut out, "SUMMARY STATISTICS", NARROW);
    let _ = writeln!(
        out,
        "\nRouting: threshold {threshold}, aggregation {aggregation}"
    );
    let _ = writeln!(
        out,
        "\nAccuracy: {}",
        accuracy_cell(summary.correct, summary.total, summary.accuracy())
    );
    let _ = writeln!(
        out,
        "Unknown Predictions: {}",
        accuracy_cell(summary.unknown, summary.total, summary.unknown_rate())
    );
    out.push_str("\nLatency Statistics:\n");
    latency_lines(&mut out, "  ", &summary.latency);
    out.push('\n');
    rule(&mut out, '=', NARROW);
    out
}

pub fn render_hybrid_report(summary: &HybridSummary) -> String {
    let run = &summary.run;
    let mut out = String::new();
    banner(&mut out, "SUMMARY STATISTICS", NARROW);
    let _ = writeln!(
        out,
        "\nAccuracy: {}",
        accuracy_cell(run.correct, run.total, run.accuracy())
    );

    out.push_str("\nRouting Statistics:\n");
    let _ = writeln!(
        out,
        "  Router Matches: {}",
        accuracy_cell(summary.router_hits, run.total, summary.router_rate())
    );
    let _ = writeln!(
        out,
        "  LLM Fallbacks: {}",
        accuracy_cell(summary.fallbacks, run.total, summary.fallback_rate())
    );
    let _ = writeln!(
        out,
        "  References Added to Router: {}",
        summary.references_added
    );

    out.push_str("\nLatency Statistics (Total):\n");
    latency_lines(&mut out, "  ", &run.latency);

    out.push_str("\nRouter Latency:\n");
    let _ = writeln!(out, "  Average: {:.3}s", summary.router_latency.avg);

    if let Some(llm) = &summary.llm_latency {
        out.push_str("\nLLM Latency (when used):\n");
        let _ = writeln!(out, "  Average: {:.3}s", llm.avg);
        let _ = writeln!(out, "  P95: {:.3}s", llm.p95);
        let _ = writeln!(out, "  P99: {:.3}s", llm.p99);
    }

    out.push_str("\nCost Statistics:\n");
    let _ = writeln!(out, "  Total Cost: ${:.6}", run.total_cost_usd());
    let _ = writeln!(out, "  Cost per Article: ${:.6}", run.cost_per_article_usd());
    let _ = writeln!(out, "  Daily Cost (100K articles): ${:.2}", run.daily_cost_usd());
    let _ = writeln!(
        out,
        "  Total Tokens: {} ({} input, {} output)",
        group_thousands(run.input_tokens + run.output_tokens),
        group_thousands(run.input_tokens),
        group_thousands(run.output_tokens)
    );
    out.push('\n');
    rule(&mut out, '=', NARROW);
    out
}

// =============================================================================
// THRESHOLD SWEEP
// =============================================================================

/// One sweep query evaluated at one threshold.
#[derive(Debug, Clone, Serialize)]
pub struct SweepRow {
    pub threshold: f64,
    pub query: String,
    pub description: String,
    /// Distance to the route when it matched.
    pub matched: Option<f64>,
}

fn preview(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

pub fn render_sweep(rows: &[SweepRow]) -> String {
    let mut out = String::new();
    banner(&mut out, "Distance Threshold Test", NARROW);
    out.push_str("\nLower distance means more similar: 0.0 is identical, 1.0 is unrelated.\n");

    let mut current: Option<f64> = None;
    for row in rows {
        if current != Some(row.threshold) {
            current = Some(row.threshold);
            out.push('\n');
            rule(&mut out, '=', NARROW);
            let _ = writeln!(out, "Testing with distance_threshold = {}", row.threshold);
            rule(&mut out, '=', NARROW);
        }
        match row.matched {
            Some(distance) => {
                let _ = writeln!(
                    out,
                    "  MATCHED: '{}...' ({})",
                    preview(&row.query, 40),
                    row.description
                );
                let _ = writeln!(
                    out,
                    "    Distance: {distance:.4} (below threshold {})",
                    row.threshold
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "  NO MATCH: '{}...' ({})",
                    preview(&row.query, 40),
                    row.description
                );
                let _ = writeln!(out, "    (distance was above threshold {})", row.threshold);
            }
        }
    }
    out.push('\n');
    rule(&mut out, '=', NARROW);
    out.push_str("Lower thresholds are stricter; higher thresholds accept less similar text.\n");
    rule(&mut out, '=', NARROW);
    out
}
