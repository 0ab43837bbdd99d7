//! Removal of already-recorded candidates.

use std::collections::HashSet;

use crate::domain::Candidate;

/// Keep the candidates whose identifier is not yet known, in input order.
pub fn filter_known(known_ids: &HashSet<String>, candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| !known_ids.contains(&c.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candidate(id: &str) -> Candidate {
        Candidate::new(
            id,
            format!("Title {}", id),
            "abstract",
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_known_ids_are_removed_order_preserved() {
        let known: HashSet<String> = ["b", "d"].iter().map(|s| s.to_string()).collect();
        let input = vec![candidate("a"), candidate("b"), candidate("c"), candidate("d"), candidate("e")];

        let output = filter_known(&known, input);
        assert_eq!(ids(&output), vec!["a", "c", "e"]);
    }

    #[test]
    fn test_output_is_subsequence_disjoint_from_known() {
        let known: HashSet<String> = ["x3", "x7", "missing"].iter().map(|s| s.to_string()).collect();
        let input: Vec<Candidate> = (0..10).map(|i| candidate(&format!("x{}", i))).collect();

        let output = filter_known(&known, input.clone());

        assert!(output.iter().all(|c| !known.contains(&c.id)));
        let mut rest = input.iter();
        for kept in &output {
            assert!(rest.any(|c| c == kept), "output is not a subsequence");
        }
        assert_eq!(output.len(), 8);
    }

    #[test]
    fn test_empty_known_set_keeps_everything() {
        let input = vec![candidate("a"), candidate("b")];
        let output = filter_known(&HashSet::new(), input.clone());
        assert_eq!(output, input);
    }
}
