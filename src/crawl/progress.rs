//! Progress snapshot and clamped progress formulas (spec §4.10, §6).
//!
//! Grounded in `original_source/services/crawl_job_manager.py`'s
//! `get_status`: the same `total_known_ops = max(discovered, completed +
//! queue_size)` formula and the same "never show 100% while queue_size > 0,
//! clamp to 99 and warn" invariant.

use log::warn;
use serde::Serialize;

use super::state_machine::CrawlPhase;

/// Externally observed snapshot (spec §6 JSON shape).
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub phase: String,
    pub monitoring_active: bool,
    pub discovery_progress: u8,
    pub verification_progress: u8,
    pub indexing_progress: u8,
    pub files_discovered: u64,
    pub files_indexed: u64,
    pub files_error: u64,
    pub files_skipped: u64,
    pub files_deleted: u64,
    pub queue_size: usize,
    pub current_file: Option<String>,
}

pub fn phase_label(phase: CrawlPhase) -> &'static str {
    match phase {
        CrawlPhase::Idle => "idle",
        CrawlPhase::Verifying => "verifying",
        CrawlPhase::Discovering => "discovering",
        CrawlPhase::Indexing => "indexing",
        CrawlPhase::Stopping => "stopping",
    }
}

fn clamp_percent(n: i64) -> u8 {
    n.clamp(0, 100) as u8
}

/// `100 * processed / total`, clamped, with `total == 0` read as complete
/// (spec §4.10's discovery/verification progress formulas share this shape).
pub fn ratio_percent(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    clamp_percent((100 * processed as i64) / total as i64)
}

/// `indexing_progress = 100 * completed / max(discovered_so_far, completed +
/// queue_size)`, clamped, with the "never 100% while queue_size > 0"
/// invariant enforced and logged (spec §4.10).
pub fn indexing_percent(discovered_so_far: u64, completed: u64, queue_size: usize) -> u8 {
    let total_known = discovered_so_far.max(completed + queue_size as u64);
    let mut pct = if total_known == 0 {
        0
    } else {
        clamp_percent((100 * completed as i64) / total_known as i64)
    };
    if queue_size > 0 && pct >= 100 {
        warn!("indexing_progress computed 100 with queue_size={queue_size}; clamping to 99");
        pct = 99;
    }
    pct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_percent_of_zero_total_is_complete() {
        assert_eq!(ratio_percent(0, 0), 100);
    }

    #[test]
    fn ratio_percent_is_clamped_and_integer_division() {
        assert_eq!(ratio_percent(1, 3), 33);
        assert_eq!(ratio_percent(3, 3), 100);
    }

    #[test]
    fn indexing_percent_never_reaches_100_while_queue_has_work() {
        // completed == discovered_so_far, but queue still has 5 pending.
        let pct = indexing_percent(10, 10, 5);
        assert_eq!(pct, 99);
    }

    #[test]
    fn indexing_percent_reaches_100_once_queue_and_discovery_are_both_done() {
        assert_eq!(indexing_percent(10, 10, 0), 100);
    }

    #[test]
    fn indexing_percent_accounts_for_queue_size_in_the_denominator() {
        // discovered_so_far understates total work; queue_size corrects it.
        let pct = indexing_percent(5, 5, 5);
        assert_eq!(pct, 50);
    }

    #[test]
    fn indexing_percent_with_no_known_work_is_zero() {
        assert_eq!(indexing_percent(0, 0, 0), 0);
    }
}
