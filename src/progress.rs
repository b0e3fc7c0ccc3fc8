//! Progress percentage state machine.
//!
//! Computes a monotonic completion percentage for a document from its
//! status text and chunk-count ratio. The rules are deliberately phrased
//! over the human-readable status label so every pipeline reports progress
//! the same way without extra plumbing.

/// Percentage reserved for the "sending to the extraction service" phase.
const SENDING_PCT: i64 = 5;
/// Width of the chunk-saving band (5..=85).
const SAVING_BAND: i64 = 80;
/// Percentage for the final metadata-extraction phase.
const FINAL_METADATA_PCT: i64 = 95;
/// Cap applied to everything except the terminal "complete" status.
const PRE_COMPLETE_CAP: i64 = 99;

/// Compute the new completion percentage.
///
/// Terminal rules first: a status containing "processing complete" yields
/// 100; "error"/"failed" preserves the previous value (the orchestrator
/// owns the reset when a pipeline aborts). Phase rules are
/// checked in order and the first match wins. The result never regresses
/// below `previous` on a non-error status and is capped at 99 until the
/// terminal status fires.
pub fn percentage(status: &str, current_count: i64, estimated_total: i64, previous: i64) -> i64 {
    let status_lower = status.to_lowercase();

    if status_lower.contains("processing complete") {
        return 100;
    }
    if status_lower.contains("error") || status_lower.contains("failed") {
        return previous;
    }

    let phase = if status_lower.contains("queued") {
        Some(0)
    } else if status_lower.contains("sending") {
        Some(SENDING_PCT)
    } else if (status_lower.contains("saving page") || status_lower.contains("saving chunk"))
        && estimated_total > 0
    {
        let done = current_count.min(estimated_total);
        Some(SENDING_PCT + SAVING_BAND * done / estimated_total)
    } else if status_lower.contains("extracting final metadata") {
        Some(FINAL_METADATA_PCT)
    } else {
        None
    };

    match phase {
        Some(pct) => pct.min(PRE_COMPLETE_CAP).max(previous),
        None => previous,
    }
}
