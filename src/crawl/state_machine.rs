//! Crawl state machine (§4.10): `idle → verifying → discovering → indexing
//! → stopping → idle`, with `monitoring` orthogonal to every non-`stopping`
//! state.
//!
//! Grounded in `original_source/services/crawl_job_manager.py`'s
//! `_running`/`_stop_event` pair, re-expressed as an explicit enum instead
//! of an implicit boolean plus task handles.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    Verifying,
    Discovering,
    Indexing,
    Stopping,
}

impl CrawlPhase {
    /// `idle → verifying` on start, or straight to `discovering` when
    /// verification is disabled (spec §4.10).
    pub fn on_start(verify_enabled: bool) -> Self {
        if verify_enabled {
            Self::Verifying
        } else {
            Self::Discovering
        }
    }

    pub fn on_verification_finished(self) -> Self {
        debug_assert_eq!(self, Self::Verifying);
        Self::Discovering
    }

    /// Discovery and indexing run concurrently; this transition marks the
    /// walk itself as done while indexing keeps draining the queue.
    pub fn on_discovery_finished(self) -> Self {
        debug_assert_eq!(self, Self::Discovering);
        Self::Indexing
    }

    pub fn on_stop_requested(self) -> Self {
        Self::Stopping
    }

    pub fn on_stopped(self) -> Self {
        debug_assert_eq!(self, Self::Stopping);
        Self::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_with_verification_goes_through_verifying() {
        assert_eq!(CrawlPhase::on_start(true), CrawlPhase::Verifying);
    }

    #[test]
    fn start_without_verification_skips_straight_to_discovering() {
        assert_eq!(CrawlPhase::on_start(false), CrawlPhase::Discovering);
    }

    #[test]
    fn full_happy_path_sequence() {
        let mut phase = CrawlPhase::on_start(true);
        assert_eq!(phase, CrawlPhase::Verifying);
        phase = phase.on_verification_finished();
        assert_eq!(phase, CrawlPhase::Discovering);
        phase = phase.on_discovery_finished();
        assert_eq!(phase, CrawlPhase::Indexing);
        phase = phase.on_stop_requested();
        assert_eq!(phase, CrawlPhase::Stopping);
        phase = phase.on_stopped();
        assert_eq!(phase, CrawlPhase::Idle);
    }

    #[test]
    fn stop_is_reachable_from_any_active_phase() {
        for phase in [CrawlPhase::Verifying, CrawlPhase::Discovering, CrawlPhase::Indexing] {
            assert_eq!(phase.on_stop_requested(), CrawlPhase::Stopping);
        }
    }
}
