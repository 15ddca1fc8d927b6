use proptest::prelude::*;

use covtree::display::display_percent;
use covtree::metric::{select_percent, MetricMode};
use covtree::model::{CoverageCounts, CoveredCount};

fn covered_count() -> impl Strategy<Value = CoveredCount> {
    (0u64..10_000)
        .prop_flat_map(|total| (0..=total, Just(total)))
        .prop_map(|(covered, total)| CoveredCount::new(covered, total))
}

fn coverage_counts() -> impl Strategy<Value = CoverageCounts> {
    (
        covered_count(),
        proptest::option::of(covered_count()),
        proptest::option::of(covered_count()),
    )
        .prop_map(|(statement, branch, function)| CoverageCounts {
            statement,
            branch,
            function,
        })
}

proptest! {
    #[test]
    fn sum_is_commutative_and_associative(
        a in covered_count(),
        b in covered_count(),
        c in covered_count(),
    ) {
        prop_assert_eq!(a + b, b + a);
        prop_assert_eq!((a + b) + c, a + (b + c));
        prop_assert!((a + b + c).is_valid());
    }

    #[test]
    fn accumulate_preserves_validity(parts in proptest::collection::vec(coverage_counts(), 0..16)) {
        let mut total = CoverageCounts::default();
        for part in &parts {
            total.accumulate(part);
        }
        prop_assert!(total.is_valid());
        prop_assert_eq!(total.branch.is_some(), parts.iter().any(|p| p.branch.is_some()));
        prop_assert_eq!(total.function.is_some(), parts.iter().any(|p| p.function.is_some()));
    }

    #[test]
    fn total_percent_is_a_fraction(counts in coverage_counts()) {
        let tpc = counts.total_percent();
        prop_assert!((0.0..=1.0).contains(&tpc));
        for mode in [MetricMode::Statement, MetricMode::Minimum, MetricMode::TotalCoverage] {
            let p = select_percent(&counts, mode);
            prop_assert!((0.0..=1.0).contains(&p));
        }
        prop_assert!(select_percent(&counts, MetricMode::Minimum) <= counts.statement.percent());
    }

    #[test]
    fn empty_counts_are_fully_covered(has_branch: bool, has_function: bool) {
        let zero = CoveredCount::default();
        let counts = CoverageCounts {
            statement: zero,
            branch: has_branch.then_some(zero),
            function: has_function.then_some(zero),
        };
        prop_assert_eq!(counts.total_percent(), 1.0);
    }

    #[test]
    fn near_complete_never_shows_full(offset in 1e-12f64..=1e-7) {
        let fraction = 1.0 - offset;
        prop_assume!(fraction < 1.0);
        prop_assert_eq!(display_percent(fraction), "99.99%");
    }

    #[test]
    fn incomplete_coverage_never_shows_full(covered in 0u64..1_000_000, extra in 1u64..1_000) {
        let fraction = CoveredCount::new(covered, covered + extra).percent();
        prop_assert_ne!(display_percent(fraction), "100.00%");
    }
}

#[test]
fn complete_coverage_shows_full() {
    assert_eq!(display_percent(1.0), "100.00%");
    assert_eq!(display_percent(CoveredCount::new(7, 7).percent()), "100.00%");
}
