//! Background jobs. All run on tokio intervals, spawned once at handoff.
//! Job failures are logged and never take the daemon down.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::storage::{ReportRow, Storage};
use crate::AppContext;

/// Spawn the daemon's resident jobs: daily feedback analysis and pruning.
pub fn spawn_all(ctx: Arc<AppContext>) {
    let analysis_hours = ctx.config.feedback.analysis_interval_hours.max(1);
    let threshold = ctx.config.feedback.downvote_threshold;
    let retention_days = ctx.config.feedback.retention_days;

    {
        let storage = ctx.storage.clone();
        tokio::spawn(run_feedback_loop(storage, analysis_hours, threshold));
    }
    if retention_days > 0 {
        let storage = ctx.storage.clone();
        tokio::spawn(run_feedback_pruner(storage, retention_days));
    }
}

/// Periodic feedback analysis: aggregate the last 24 h of feedback, flag
/// items with repeated downvotes, and persist a daily report.
pub async fn run_feedback_loop(storage: Arc<Storage>, interval_hours: u64, threshold: u32) {
    let mut ticker = interval(Duration::from_secs(interval_hours * 3600));
    ticker.tick().await; // skip the immediate first tick
    loop {
        ticker.tick().await;
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        match analyze_feedback(&storage, cutoff, threshold).await {
            Ok(report) => {
                let flagged: Vec<String> =
                    serde_json::from_str(&report.flagged).unwrap_or_default();
                if flagged.is_empty() {
                    info!(
                        entries = report.total_entries,
                        negative = report.negative_entries,
                        "feedback analysis complete"
                    );
                } else {
                    warn!(
                        flagged = ?flagged,
                        threshold,
                        report = %report.id,
                        "feedback alert: items with repeated downvotes"
                    );
                }
            }
            Err(e) => warn!(err = %e, "feedback analysis failed"),
        }
    }
}

/// Daily retention pass over the feedback table.
pub async fn run_feedback_pruner(storage: Arc<Storage>, retention_days: u32) {
    let mut ticker = interval(Duration::from_secs(24 * 3600));
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match storage.prune_feedback(retention_days).await {
            Ok(n) if n > 0 => info!(pruned = n, days = retention_days, "pruned old feedback"),
            Ok(_) => {}
            Err(e) => warn!(err = %e, "feedback pruning failed"),
        }
    }
}

/// One analysis pass: count downvotes per related item since `cutoff`,
/// flag those at or above `threshold`, and upsert the day's report row.
pub async fn analyze_feedback(
    storage: &Storage,
    cutoff: DateTime<Utc>,
    threshold: u32,
) -> Result<ReportRow> {
    let entries = storage.feedback_since(cutoff).await?;

    let mut downvotes: HashMap<String, u32> = HashMap::new();
    let mut negative_entries: i64 = 0;
    for entry in &entries {
        if entry.rating < 0 {
            negative_entries += 1;
            if let Some(related) = &entry.related_id {
                *downvotes.entry(related.clone()).or_insert(0) += 1;
            }
        }
    }

    let mut flagged: Vec<String> = downvotes
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(id, _)| id)
        .collect();
    flagged.sort(); // deterministic report contents

    let now = Utc::now();
    let report = ReportRow {
        id: format!("daily_feedback_{}", now.format("%Y%m%d")),
        generated_at: now.to_rfc3339(),
        period_start: cutoff.to_rfc3339(),
        total_entries: entries.len() as i64,
        negative_entries,
        downvote_threshold: i64::from(threshold),
        flagged: serde_json::to_string(&flagged)?,
    };
    storage.upsert_report(&report).await?;
    Ok(report)
}
