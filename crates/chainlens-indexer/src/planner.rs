//! Block fetch planning.
//!
//! Given the configured depth, the latest persisted level, and the node
//! head, computes the pages to fetch. Pages are ascending and
//! non-overlapping; `total` is the level count used for progress reporting.

use tracing::warn;

use chainlens_core::config::FetchDepth;
use chainlens_rpc::node::{pages, BlockData, LevelRange};

/// The planned fetch: pages in ascending order plus the total level count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub pages: Vec<LevelRange>,
    pub total: u64,
}

impl FetchPlan {
    fn empty() -> Self {
        Self {
            pages: vec![],
            total: 0,
        }
    }

    fn over(from: u64, to: u64, page_size: u64) -> Self {
        if to < from {
            return Self::empty();
        }
        Self {
            pages: pages(from, to, page_size),
            total: to - from + 1,
        }
    }
}

/// Compute the fetch plan for one cycle.
///
/// * `Newest` covers `(l_db, head]`; with no persisted level it bootstraps
///   from `head - bootstrap_window` (from zero when no window is set).
/// * `Everything` covers `[0, head]`.
/// * `Custom(n)` covers the `n` levels up to the head. When a `head_hash`
///   anchor is configured and differs from the head actually used, the
///   divergence is logged — the caller already resolved which head wins.
pub fn plan(
    depth: FetchDepth,
    head: &BlockData,
    l_db: Option<u64>,
    head_hash: Option<&str>,
    bootstrap_window: Option<u64>,
    page_size: u64,
) -> FetchPlan {
    let head_level = head.level();
    match depth {
        FetchDepth::Newest => {
            let from = match l_db {
                Some(db) if db >= head_level => return FetchPlan::empty(),
                Some(db) => db + 1,
                None => match bootstrap_window {
                    Some(window) => head_level.saturating_sub(window),
                    None => 0,
                },
            };
            FetchPlan::over(from, head_level, page_size)
        }
        FetchDepth::Everything => FetchPlan::over(0, head_level, page_size),
        FetchDepth::Custom { n } => {
            if let Some(anchor) = head_hash {
                if anchor != head.hash {
                    warn!(
                        anchor,
                        head = %head.hash,
                        level = head_level,
                        "configured head anchor diverges from the head in use"
                    );
                }
            }
            let from = head_level.saturating_sub(n.saturating_sub(1));
            FetchPlan::over(from, head_level, page_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::block_data;

    #[test]
    fn newest_covers_db_to_head() {
        let head = block_data(103);
        let plan = plan(FetchDepth::Newest, &head, Some(100), None, None, 50);
        assert_eq!(plan.total, 3);
        assert_eq!(plan.pages, vec![LevelRange { start: 101, end: 103 }]);
    }

    #[test]
    fn newest_with_caught_up_db_is_empty() {
        let head = block_data(103);
        let plan = plan(FetchDepth::Newest, &head, Some(103), None, None, 50);
        assert!(plan.pages.is_empty());
        assert_eq!(plan.total, 0);
    }

    #[test]
    fn newest_bootstrap_defaults_to_genesis() {
        let head = block_data(250);
        let plan = plan(FetchDepth::Newest, &head, None, None, None, 100);
        assert_eq!(plan.total, 251);
        assert_eq!(plan.pages.first().unwrap().start, 0);
        assert_eq!(plan.pages.last().unwrap().end, 250);
    }

    #[test]
    fn newest_bootstrap_honours_window() {
        let head = block_data(1_000);
        let plan = plan(FetchDepth::Newest, &head, None, None, Some(100), 50);
        assert_eq!(plan.total, 101);
        assert_eq!(plan.pages.first().unwrap().start, 900);
        assert_eq!(plan.pages.last().unwrap().end, 1_000);
    }

    #[test]
    fn everything_covers_from_genesis() {
        let head = block_data(120);
        let plan = plan(FetchDepth::Everything, &head, Some(100), None, None, 100);
        assert_eq!(plan.total, 121);
        assert_eq!(plan.pages[0], LevelRange { start: 0, end: 99 });
        assert_eq!(plan.pages[1], LevelRange { start: 100, end: 120 });
    }

    #[test]
    fn custom_covers_the_last_n_levels() {
        let head = block_data(500);
        let plan = plan(
            FetchDepth::Custom { n: 10 },
            &head,
            Some(42),
            None,
            None,
            50,
        );
        assert_eq!(plan.total, 10);
        assert_eq!(plan.pages, vec![LevelRange { start: 491, end: 500 }]);
    }

    #[test]
    fn custom_larger_than_chain_starts_at_genesis() {
        let head = block_data(5);
        let plan = plan(FetchDepth::Custom { n: 100 }, &head, None, None, None, 50);
        assert_eq!(plan.pages, vec![LevelRange { start: 0, end: 5 }]);
        assert_eq!(plan.total, 6);
    }

    #[test]
    fn pages_respect_page_size() {
        let head = block_data(130);
        let plan = plan(FetchDepth::Newest, &head, Some(0), None, None, 50);
        assert_eq!(
            plan.pages,
            vec![
                LevelRange { start: 1, end: 50 },
                LevelRange { start: 51, end: 100 },
                LevelRange { start: 101, end: 130 },
            ]
        );
    }
}
