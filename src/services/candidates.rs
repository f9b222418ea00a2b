//! Filtering, ordering and selection of terminology candidates.

use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

use crate::error::{ResolveError, Result};
use crate::models::{Candidate, CodeType};
use crate::traits::RawCandidate;

/// Turn provider rows into usable candidates, best first.
///
/// Rows missing an identifier, name or rank (or a score, for types that need
/// one) are dropped, as are blank identifiers and names. The first row for
/// each identifier wins. The result is sorted by rank ascending, then score
/// descending.
pub fn rank_candidates(raw: Vec<RawCandidate>, code_type: CodeType) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::with_capacity(raw.len());

    for row in raw {
        let (Some(identifier), Some(name), Some(rank)) = (row.identifier, row.name, row.rank) else {
            debug!("Skipping candidate with missing fields");
            continue;
        };
        let score = row.score.filter(|s| s.is_finite());
        if code_type.requires_score() && score.is_none() {
            debug!("Skipping unscored candidate {}", identifier);
            continue;
        }
        let identifier = identifier.trim().to_string();
        let name = name.trim().to_string();
        if identifier.is_empty() || name.is_empty() {
            debug!("Skipping empty candidate");
            continue;
        }
        if !seen.insert(identifier.clone()) {
            debug!("Skipping duplicate identifier: {}", identifier);
            continue;
        }
        candidates.push(Candidate {
            identifier,
            name,
            score,
            rank,
            source: row.source.unwrap_or_else(|| "UNKNOWN".to_string()),
        });
    }

    candidates.sort_by(|a, b| {
        a.rank
            .cmp(&b.rank)
            .then_with(|| compare_scores_desc(a.score, b.score))
    });
    candidates
}

// Higher score first; unscored rows sort after scored ones.
fn compare_scores_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// 1-based listing shown to the arbitrating model.
pub fn format_candidates(candidates: &[Candidate], code_type: CodeType) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| match code_type {
            CodeType::Medication => format!(
                "{}. {} (Score: {:.2}, Rank: {}, Source: {})",
                i + 1,
                c.name,
                c.score.unwrap_or_default(),
                c.rank,
                c.source
            ),
            CodeType::Condition => format!("{}. {} (Code: {})", i + 1, c.name, c.identifier),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Interpret the arbitration answer.
///
/// `Ok(None)` means no candidate was accepted (0 or out of range).
pub fn parse_selection(content: &str, candidate_count: usize) -> Result<Option<usize>> {
    let trimmed = content.trim();
    let selected: i64 = trimmed.parse().map_err(|_| {
        ResolveError::Parse(format!("expected a candidate number, got {:?}", trimmed))
    })?;

    if selected <= 0 || selected as usize > candidate_count {
        return Ok(None);
    }
    Ok(Some(selected as usize - 1))
}

/// Map a provider's 0–100 score onto [0, 1].
pub fn normalize_score(score: f64) -> f64 {
    (score / 100.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::raw_candidate;

    #[test]
    fn test_rank_then_score_ordering() {
        let raw = vec![
            raw_candidate("a", "alpha", 50.0, 2),
            raw_candidate("b", "beta", 80.0, 1),
            raw_candidate("c", "gamma", 90.0, 1),
        ];
        let ranked = rank_candidates(raw, CodeType::Medication);
        let order: Vec<(u32, f64)> = ranked.iter().map(|c| (c.rank, c.score.unwrap())).collect();
        assert_eq!(order, vec![(1, 90.0), (1, 80.0), (2, 50.0)]);
    }

    #[test]
    fn test_filters_and_dedups() {
        let mut missing_score = raw_candidate("d", "delta", 10.0, 1);
        missing_score.score = None;
        let raw = vec![
            raw_candidate("a", "alpha", 70.0, 1),
            raw_candidate("a", "alpha again", 99.0, 1),
            raw_candidate("", "blank id", 90.0, 1),
            raw_candidate("b", "  ", 90.0, 1),
            RawCandidate {
                identifier: Some("c".into()),
                ..RawCandidate::default()
            },
            missing_score,
        ];
        let ranked = rank_candidates(raw, CodeType::Medication);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, "alpha");
    }

    #[test]
    fn test_non_finite_scores_are_dropped() {
        let raw = vec![
            raw_candidate("nan", "not a number", f64::NAN, 1),
            raw_candidate("inf", "infinite", f64::INFINITY, 1),
            raw_candidate("ok", "finite", 70.0, 2),
        ];
        let ids: Vec<String> = rank_candidates(raw.clone(), CodeType::Medication)
            .into_iter()
            .map(|c| c.identifier)
            .collect();
        assert_eq!(ids, vec!["ok"]);

        let conditions = rank_candidates(raw, CodeType::Condition);
        assert_eq!(conditions.len(), 3);
        assert!(conditions.iter().filter(|c| c.rank == 1).all(|c| c.score.is_none()));
    }

    #[test]
    fn test_conditions_accept_unscored_rows() {
        let raw = vec![
            RawCandidate {
                identifier: Some("I10".into()),
                name: Some("Essential (primary) hypertension".into()),
                rank: Some(1),
                ..RawCandidate::default()
            },
        ];
        let ranked = rank_candidates(raw, CodeType::Condition);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, None);
        assert_eq!(ranked[0].source, "UNKNOWN");
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection(" 2\n", 3).unwrap(), Some(1));
        assert_eq!(parse_selection("0", 3).unwrap(), None);
        assert_eq!(parse_selection("4", 3).unwrap(), None);
        assert_eq!(parse_selection("-1", 3).unwrap(), None);
        assert!(parse_selection("the first one", 3).is_err());
        assert!(parse_selection("1.5", 3).is_err());
    }

    #[test]
    fn test_format_candidates() {
        let ranked = rank_candidates(
            vec![raw_candidate("861004", "metformin hydrochloride 500 mg", 95.0, 1)],
            CodeType::Medication,
        );
        assert_eq!(
            format_candidates(&ranked, CodeType::Medication),
            "1. metformin hydrochloride 500 mg (Score: 95.00, Rank: 1, Source: RXNORM)"
        );
        assert_eq!(
            format_candidates(&ranked, CodeType::Condition),
            "1. metformin hydrochloride 500 mg (Code: 861004)"
        );
    }

    #[test]
    fn test_normalize_score() {
        assert_eq!(normalize_score(95.0), 0.95);
        assert_eq!(normalize_score(140.0), 1.0);
        assert_eq!(normalize_score(-3.0), 0.0);
    }
}
