use crate::models::metrics::BaselineStats;
use crate::services::stats;
use std::collections::BTreeSet;

/// Baseline over `values` with the `flagged` indices left out, so a spike
/// cannot drag its own notion of "normal" towards itself.
///
/// Exclusion is a single pass over the indices the detector already flagged.
/// When every point was flagged the raw statistics are returned instead, as
/// there is nothing else to describe.
pub fn compute(values: &[f64], flagged: &BTreeSet<usize>) -> Option<BaselineStats> {
    let retained: Vec<f64> = values
        .iter()
        .enumerate()
        .filter(|(i, _)| !flagged.contains(i))
        .map(|(_, v)| *v)
        .collect();

    stats::describe(&retained).or_else(|| stats::describe(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excludes_flagged_points() {
        let values = vec![1.0, 2.0, 3.0, 100.0, 4.0, 5.0, 200.0, 6.0];
        let flagged: BTreeSet<usize> = [3, 6].into_iter().collect();

        let baseline = compute(&values, &flagged).unwrap();
        assert_eq!(baseline.count, 6);
        assert_eq!(baseline.max, 6.0);
        assert!((baseline.mean - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_differs_from_raw_when_anything_flagged() {
        let mut values: Vec<f64> = (0..30).map(|i| 64.0 + (i % 5) as f64 * 0.5).collect();
        values.push(200.0);
        let flagged: BTreeSet<usize> = [30].into_iter().collect();

        let raw = stats::describe(&values).unwrap();
        let baseline = compute(&values, &flagged).unwrap();
        assert_ne!(raw, baseline);
        assert!(baseline.mean < raw.mean);
        assert!((baseline.mean - 65.0).abs() < 1e-9);
    }

    #[test]
    fn test_nothing_flagged_matches_raw() {
        let values = vec![10.0, 12.0, 11.0];
        assert_eq!(
            compute(&values, &BTreeSet::new()),
            stats::describe(&values)
        );
    }

    #[test]
    fn test_all_flagged_falls_back_to_raw() {
        let values = vec![95.0, 96.0];
        let flagged: BTreeSet<usize> = [0, 1].into_iter().collect();
        let baseline = compute(&values, &flagged).unwrap();
        assert_eq!(baseline.count, 2);
    }

    #[test]
    fn test_empty() {
        assert!(compute(&[], &BTreeSet::new()).is_none());
    }
}
