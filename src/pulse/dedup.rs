use std::collections::HashSet;

use super::entities::Pulse;

/// Keeps the first pulse for every hash, preserving order. Only looks inside the batch,
/// duplicates of stored pulses are rejected by the repository.
pub fn filter_unique_by_hash(pulses: impl IntoIterator<Item = Pulse>) -> Vec<Pulse> {
    let mut seen = HashSet::new();
    pulses
        .into_iter()
        .filter(|pulse| seen.insert(pulse.hash.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::pulse::{entities::Pulse, test_data::sample_pulse};

    use super::filter_unique_by_hash;

    fn pulse(entity: &str, hash: &str) -> Pulse {
        Pulse {
            hash: hash.into(),
            ..sample_pulse(entity, Utc.with_ymd_and_hms(2024, 7, 4, 9, 0, 0).unwrap())
        }
    }

    #[test]
    fn test_duplicates_removed_in_order() {
        let batch = vec![
            pulse("first a", "a"),
            pulse("first b", "b"),
            pulse("second a", "a"),
            pulse("first c", "c"),
            pulse("second b", "b"),
            pulse("third a", "a"),
        ];
        let unique = filter_unique_by_hash(batch);
        let entities = unique.iter().map(|v| v.entity.as_str()).collect::<Vec<_>>();
        assert_eq!(entities, vec!["first a", "first b", "first c"]);
    }

    #[test]
    fn test_k_duplicate_pairs() {
        let batch = vec![
            pulse("1", "x"),
            pulse("2", "y"),
            pulse("3", "x"),
            pulse("4", "z"),
            pulse("5", "y"),
        ];
        assert_eq!(filter_unique_by_hash(batch.clone()).len(), batch.len() - 2);
        assert!(filter_unique_by_hash(vec![]).is_empty());
    }
}
