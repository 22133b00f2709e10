//! Built-in example datasets.

use crate::sample::Sample;

/// Extra hours of sleep for ten patients under each of two soporific drugs
/// (Cushny & Peebles, 1905; as analysed by Student, 1908).
///
/// Labels are `"1"` and `"2"`, subjects `"1"` through `"10"`; every subject
/// appears once per drug, so the sample supports the paired design.
pub fn sleep() -> Sample {
    const EXTRA: [f64; 20] = [
        0.7, -1.6, -0.2, -1.2, -0.1, 3.4, 3.7, 0.8, 0.0, 2.0, //
        1.9, 0.8, 1.1, 0.1, -0.1, 4.4, 5.5, 1.6, 4.6, 3.4,
    ];
    let groups = (0..20).map(|i| if i < 10 { "1" } else { "2" });
    let subjects = (0..20).map(|i| (i % 10 + 1).to_string());

    // constant, finite and aligned by construction
    Sample::with_groups(EXTRA.to_vec(), groups)
        .and_then(|s| s.with_subjects(subjects))
        .unwrap_or_else(|e| unreachable!("sleep dataset is well-formed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_shape() {
        let s = sleep();
        assert_eq!(s.len(), 20);
        let groups = s.groups().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "1");
        let (a, b) = s.paired_groups().unwrap();
        assert_eq!(a.len(), 10);
        assert_eq!(a[0], 0.7);
        assert_eq!(b[0], 1.9);
    }
}
