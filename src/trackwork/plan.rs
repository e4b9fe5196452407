//! Pure version-gap planning.
//!
//! Given the remote status set and what is stored locally, decide exactly
//! which `(id, version)` pairs to fetch. No I/O happens here.

use crate::config::GapStrategy;
use crate::model::{LocalVersionRange, RemoteDocumentStatus, VersionedDocumentId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Versions missing strictly between a document's stored min and max.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteriorGap {
    pub id: u64,
    pub missing: Vec<u32>,
}

/// A document whose remote latest version is below what is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionRegression {
    pub id: u64,
    pub remote_latest: u32,
    pub local_max: u32,
}

/// Versions left for later cycles because a document hit the per-cycle cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeferredVersions {
    pub id: u64,
    pub deferred: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    /// Documents with nothing stored that will be created.
    pub new_documents: usize,
    /// Stored documents that have at least one version to fetch.
    pub updated_documents: usize,
    /// Every version to fetch, ordered by id then version.
    pub fetches: Vec<VersionedDocumentId>,
    /// Interior holes left in place by the `bounds` strategy.
    pub interior_gaps: Vec<InteriorGap>,
    pub regressions: Vec<VersionRegression>,
    pub deferred: Vec<DeferredVersions>,
}

impl FetchPlan {
    pub fn is_empty(&self) -> bool {
        self.fetches.is_empty()
    }

    fn defer(&mut self, id: u64, deferred: u64) {
        if deferred > 0 {
            self.deferred.push(DeferredVersions { id, deferred });
        }
    }
}

/// Plan the fetches for one reconciliation cycle.
///
/// Documents only known locally are ignored. A remote document with no
/// published version is not created. Duplicate status entries count once.
/// At most `max_versions_per_document` versions are planned per document,
/// oldest first; the rest is reported in `deferred`.
pub fn plan_fetches(
    statuses: &[RemoteDocumentStatus],
    local: &HashMap<u64, LocalVersionRange>,
    strategy: GapStrategy,
    max_versions_per_document: usize,
) -> FetchPlan {
    let cap = max_versions_per_document.max(1);
    let mut plan = FetchPlan::default();
    let mut seen = HashSet::with_capacity(statuses.len());

    for status in statuses {
        if !seen.insert(status.id) {
            continue;
        }
        let latest = status.latest_version();

        let Some(range) = local.get(&status.id) else {
            if latest > 0 {
                plan.new_documents += 1;
                let versions: Vec<u32> = (1..=latest).take(cap).collect();
                plan.defer(status.id, u64::from(latest) - versions.len() as u64);
                plan.fetches
                    .extend(versions.into_iter().map(|v| VersionedDocumentId::new(status.id, v)));
            }
            continue;
        };

        if latest < range.max_version {
            plan.regressions.push(VersionRegression {
                id: status.id,
                remote_latest: latest,
                local_max: range.max_version,
            });
        }

        let (missing, deferred) = missing_versions(range, latest, strategy, cap);
        plan.defer(status.id, deferred);
        if strategy == GapStrategy::Bounds {
            let interior = range.interior_gaps();
            if !interior.is_empty() {
                plan.interior_gaps.push(InteriorGap {
                    id: status.id,
                    missing: interior,
                });
            }
        }

        if !missing.is_empty() {
            plan.updated_documents += 1;
            plan.fetches
                .extend(missing.into_iter().map(|v| VersionedDocumentId::new(status.id, v)));
        }
    }

    plan.fetches.sort_unstable();
    plan
}

/// Up to `cap` missing versions, oldest first, and how many more are missing.
fn missing_versions(
    range: &LocalVersionRange,
    latest: u32,
    strategy: GapStrategy,
    cap: usize,
) -> (Vec<u32>, u64) {
    let (total, versions): (u64, Vec<u32>) = match strategy {
        GapStrategy::Bounds => {
            let backward = 1..range.min_version;
            let forward = range.max_version.saturating_add(1)..=latest;
            let total = u64::from(range.min_version.saturating_sub(1))
                + u64::from(latest.saturating_sub(range.max_version));
            (total, backward.chain(forward).take(cap).collect())
        }
        GapStrategy::Full => {
            let stored = range
                .versions()
                .iter()
                .filter(|v| (1..=latest).contains(*v))
                .count() as u64;
            let versions = (1..=latest)
                .filter(|v| !range.contains(*v))
                .take(cap)
                .collect();
            (u64::from(latest) - stored, versions)
        }
    };
    let deferred = total.saturating_sub(versions.len() as u64);
    (versions, deferred)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: usize = 100;

    fn status(id: u64, version: Option<u32>) -> RemoteDocumentStatus {
        RemoteDocumentStatus { id, version }
    }

    fn local(entries: &[(u64, &[u32])]) -> HashMap<u64, LocalVersionRange> {
        entries
            .iter()
            .filter_map(|(id, versions)| {
                LocalVersionRange::from_versions(*id, versions.to_vec()).map(|r| (*id, r))
            })
            .collect()
    }

    fn versions_of(plan: &FetchPlan, id: u64) -> Vec<u32> {
        plan.fetches
            .iter()
            .filter(|f| f.id == id)
            .map(|f| f.version)
            .collect()
    }

    #[test]
    fn test_new_document_fetches_all_versions() {
        let plan = plan_fetches(&[status(1, Some(3))], &HashMap::new(), GapStrategy::Bounds, CAP);
        assert_eq!(plan.new_documents, 1);
        assert_eq!(versions_of(&plan, 1), vec![1, 2, 3]);
    }

    #[test]
    fn test_unpublished_new_document_is_not_created() {
        let plan = plan_fetches(
            &[status(1, Some(0)), status(2, None)],
            &HashMap::new(),
            GapStrategy::Bounds,
            CAP,
        );
        assert!(plan.is_empty());
        assert_eq!(plan.new_documents, 0);
    }

    #[test]
    fn test_known_document_fills_backward_and_forward() {
        let plan = plan_fetches(
            &[status(5, Some(4))],
            &local(&[(5, &[2])]),
            GapStrategy::Bounds,
            CAP,
        );
        assert_eq!(versions_of(&plan, 5), vec![1, 3, 4]);
        assert_eq!(plan.updated_documents, 1);
    }

    #[test]
    fn test_up_to_date_document_needs_nothing() {
        let plan = plan_fetches(
            &[status(5, Some(3))],
            &local(&[(5, &[1, 2, 3])]),
            GapStrategy::Bounds,
            CAP,
        );
        assert!(plan.is_empty());
        assert_eq!(plan.updated_documents, 0);
    }

    #[test]
    fn test_local_only_documents_are_ignored() {
        let plan = plan_fetches(&[], &local(&[(9, &[1])]), GapStrategy::Full, CAP);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_regression_is_reported_without_fetching() {
        let plan = plan_fetches(
            &[status(3, Some(2))],
            &local(&[(3, &[1, 2, 3, 4])]),
            GapStrategy::Bounds,
            CAP,
        );
        assert!(plan.is_empty());
        assert_eq!(
            plan.regressions,
            vec![VersionRegression {
                id: 3,
                remote_latest: 2,
                local_max: 4
            }]
        );
    }

    #[test]
    fn test_interior_gap_detected_with_bounds() {
        let plan = plan_fetches(
            &[status(4, Some(5))],
            &local(&[(4, &[1, 2, 4, 5])]),
            GapStrategy::Bounds,
            CAP,
        );
        assert!(plan.is_empty());
        assert_eq!(
            plan.interior_gaps,
            vec![InteriorGap {
                id: 4,
                missing: vec![3]
            }]
        );
    }

    #[test]
    fn test_interior_gap_filled_with_full() {
        let plan = plan_fetches(
            &[status(4, Some(6))],
            &local(&[(4, &[2, 4, 5])]),
            GapStrategy::Full,
            CAP,
        );
        assert_eq!(versions_of(&plan, 4), vec![1, 3, 6]);
        assert!(plan.interior_gaps.is_empty());
    }

    #[test]
    fn test_duplicate_status_entries_count_once() {
        let plan = plan_fetches(
            &[status(1, Some(2)), status(1, Some(2))],
            &HashMap::new(),
            GapStrategy::Bounds,
            CAP,
        );
        assert_eq!(plan.fetches.len(), 2);
    }

    #[test]
    fn test_fetches_are_ordered() {
        let plan = plan_fetches(
            &[status(8, Some(1)), status(7, Some(2))],
            &HashMap::new(),
            GapStrategy::Bounds,
            CAP,
        );
        assert_eq!(
            plan.fetches,
            vec![
                VersionedDocumentId::new(7, 1),
                VersionedDocumentId::new(7, 2),
                VersionedDocumentId::new(8, 1),
            ]
        );
    }

    #[test]
    fn test_new_document_with_huge_latest_is_capped() {
        let plan = plan_fetches(
            &[status(1, Some(4_000_000_000))],
            &HashMap::new(),
            GapStrategy::Bounds,
            3,
        );
        assert_eq!(versions_of(&plan, 1), vec![1, 2, 3]);
        assert_eq!(
            plan.deferred,
            vec![DeferredVersions {
                id: 1,
                deferred: 3_999_999_997
            }]
        );
    }

    #[test]
    fn test_capped_document_continues_next_cycle() {
        let plan = plan_fetches(
            &[status(2, Some(10))],
            &local(&[(2, &[3, 4])]),
            GapStrategy::Bounds,
            4,
        );
        assert_eq!(versions_of(&plan, 2), vec![1, 2, 5, 6]);
        assert_eq!(plan.deferred, vec![DeferredVersions { id: 2, deferred: 4 }]);

        let plan = plan_fetches(
            &[status(2, Some(10))],
            &local(&[(2, &[1, 2, 3, 4, 5, 6])]),
            GapStrategy::Bounds,
            4,
        );
        assert_eq!(versions_of(&plan, 2), vec![7, 8, 9, 10]);
        assert!(plan.deferred.is_empty());
    }

    #[test]
    fn test_full_strategy_is_capped() {
        let plan = plan_fetches(
            &[status(3, Some(u32::MAX))],
            &local(&[(3, &[2])]),
            GapStrategy::Full,
            2,
        );
        assert_eq!(versions_of(&plan, 3), vec![1, 3]);
        assert_eq!(plan.deferred[0].deferred, u64::from(u32::MAX) - 3);
    }
}
