//! Threshold and width selection
//!
//! Inputs arrive in submission order (frontier position, then candidate
//! position). Sorting is stable, so equal scores keep that order and the
//! outcome never depends on call completion order.

use std::cmp::Ordering;

/// Keep items scoring at least `threshold`, best first, at most `width`.
pub fn select_top<T>(items: Vec<T>, score: impl Fn(&T) -> f64, threshold: f64, width: usize) -> Vec<T> {
    let mut kept: Vec<T> = items
        .into_iter()
        .filter(|item| score(item) >= threshold)
        .collect();
    kept.sort_by(|a, b| by_score_desc(score(a), score(b)));
    kept.truncate(width);
    kept
}

/// Descending order for finite scores. Validation upstream rejects NaN.
pub fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn threshold_is_inclusive() {
        let kept = select_top(vec![("a", 0.5), ("b", 0.49)], |x| x.1, 0.5, 5);
        assert_eq!(kept, vec![("a", 0.5)]);
    }

    #[test]
    fn ties_keep_submission_order() {
        let kept = select_top(
            vec![("a", 0.7), ("b", 0.9), ("c", 0.7), ("d", 0.7)],
            |x| x.1,
            0.5,
            3,
        );
        assert_eq!(kept, vec![("b", 0.9), ("a", 0.7), ("c", 0.7)]);
    }

    proptest! {
        #[test]
        fn selection_respects_threshold_and_width(
            scores in proptest::collection::vec(0.0f64..=1.0, 0..40),
            threshold in 0.0f64..=1.0,
            width in 1usize..10,
        ) {
            let items: Vec<(usize, f64)> = scores.iter().copied().enumerate().collect();
            let kept = select_top(items.clone(), |x| x.1, threshold, width);

            prop_assert!(kept.len() <= width);
            prop_assert!(kept.iter().all(|x| x.1 >= threshold));
            prop_assert!(kept.windows(2).all(|w| w[0].1 >= w[1].1));

            // Nothing better than the worst kept item was left out.
            let eligible = items.iter().filter(|x| x.1 >= threshold).count();
            prop_assert_eq!(kept.len(), eligible.min(width));
            if let Some(worst) = kept.last() {
                let kept_ids: Vec<usize> = kept.iter().map(|x| x.0).collect();
                for item in items.iter().filter(|x| !kept_ids.contains(&x.0)) {
                    prop_assert!(item.1 < threshold || item.1 <= worst.1);
                }
            }
        }

        #[test]
        fn selection_is_deterministic(
            scores in proptest::collection::vec(0.0f64..=1.0, 0..40),
            width in 1usize..10,
        ) {
            let items: Vec<(usize, f64)> = scores.into_iter().enumerate().collect();
            let first = select_top(items.clone(), |x| x.1, 0.3, width);
            let second = select_top(items, |x| x.1, 0.3, width);
            prop_assert_eq!(first, second);
        }
    }
}
