use std::collections::HashMap;

use crate::cleaning::record::normalise_field;
use crate::lookup::vocabulary::{UNKNOWN_REGION, Vocabulary};

/// Maximum edit distance accepted when fuzzy-matching categories.
pub const MAX_EDIT_DISTANCE: usize = 2;

/// Resolves free-text category and region values against the canonical
/// vocabulary. Results are memoized per distinct input string; the caches are
/// valid for the whole run because the vocabulary never changes.
pub struct Resolver {
    vocabulary: Vocabulary,
    category_cache: HashMap<String, Option<String>>,
    region_cache: HashMap<String, Option<String>>,
}

impl Resolver {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self {
            vocabulary,
            category_cache: HashMap::new(),
            region_cache: HashMap::new(),
        }
    }

    /// Map a raw category to its canonical name. Exact case-insensitive
    /// matches win; otherwise the closest canonical category within
    /// `MAX_EDIT_DISTANCE` is returned, ties broken by vocabulary order.
    pub fn resolve_category(&mut self, raw: &str) -> Option<String> {
        if let Some(cached) = self.category_cache.get(raw) {
            return cached.clone();
        }
        let resolved = self.lookup_category(raw);
        self.category_cache.insert(raw.to_string(), resolved.clone());
        resolved
    }

    /// Map a raw region through the alias map: exact key first, then the
    /// case-folded form. No fuzzy fallback; aliases targeting the UNKNOWN
    /// sentinel resolve to no match.
    pub fn resolve_region(&mut self, raw: &str) -> Option<String> {
        if let Some(cached) = self.region_cache.get(raw) {
            return cached.clone();
        }
        let resolved = self.lookup_region(raw);
        self.region_cache.insert(raw.to_string(), resolved.clone());
        resolved
    }

    fn lookup_category(&self, raw: &str) -> Option<String> {
        // Placeholder tokens must collapse to empty before matching, or the
        // fuzzy scan could accept "none" as a nearby canonical name.
        let cleaned = normalise_field(raw);
        if cleaned.is_empty() {
            return None;
        }
        let folded = cleaned.to_lowercase();
        if let Some(exact) = self.vocabulary.category_by_folded(&folded) {
            return Some(exact.clone());
        }

        let mut best: Option<(&String, usize)> = None;
        for candidate in self.vocabulary.categories() {
            let distance =
                bounded_levenshtein(&folded, &candidate.to_lowercase(), MAX_EDIT_DISTANCE);
            if distance > MAX_EDIT_DISTANCE {
                continue;
            }
            // First minimal-distance candidate in vocabulary order wins.
            match best {
                Some((_, best_distance)) if best_distance <= distance => {}
                _ => best = Some((candidate, distance)),
            }
            if distance == 0 {
                break;
            }
        }
        best.map(|(candidate, _)| candidate.clone())
    }

    fn lookup_region(&self, raw: &str) -> Option<String> {
        let cleaned = normalise_field(raw);
        if cleaned.is_empty() {
            return None;
        }
        let target = self.vocabulary.region_alias(&cleaned)?;
        if target == UNKNOWN_REGION {
            None
        } else {
            Some(target.clone())
        }
    }
}

/// Levenshtein distance with unit-cost insert/delete/substitute, capped at
/// `max_distance`. Returns `max_distance + 1` as soon as the bound is proven
/// exceeded, skipping the full table when the length difference alone rules
/// the pair out.
pub fn bounded_levenshtein(left: &str, right: &str, max_distance: usize) -> usize {
    if left == right {
        return 0;
    }
    let left_chars: Vec<char> = left.chars().collect();
    let right_chars: Vec<char> = right.chars().collect();
    if left_chars.is_empty() {
        return right_chars.len();
    }
    if right_chars.is_empty() {
        return left_chars.len();
    }
    if left_chars.len().abs_diff(right_chars.len()) > max_distance {
        return max_distance + 1;
    }

    let mut previous: Vec<usize> = (0..=right_chars.len()).collect();
    for (i, left_char) in left_chars.iter().enumerate() {
        let mut current = Vec::with_capacity(right_chars.len() + 1);
        current.push(i + 1);
        let mut row_min = i + 1;
        for (j, right_char) in right_chars.iter().enumerate() {
            let cost = usize::from(left_char != right_char);
            let insert_cost = current[j] + 1;
            let delete_cost = previous[j + 1] + 1;
            let replace_cost = previous[j] + cost;
            let best = insert_cost.min(delete_cost).min(replace_cost);
            current.push(best);
            row_min = row_min.min(best);
        }
        if row_min > max_distance {
            return max_distance + 1;
        }
        previous = current;
    }
    previous[right_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolver() -> Resolver {
        let vocabulary = Vocabulary::from_parts(
            vec![
                "Electronics".into(),
                "Home Office".into(),
                "Books".into(),
                "Sports".into(),
            ],
            vec!["Mumbai".into(), "Thailand".into()],
            HashMap::from([
                ("Mumbai".to_string(), "Mumbai".to_string()),
                ("Bombay".to_string(), "Mumbai".to_string()),
                ("Mumbay".to_string(), "Mumbai".to_string()),
                ("Thailand".to_string(), "Thailand".to_string()),
                ("Unassigned".to_string(), "UNKNOWN".to_string()),
            ]),
        )
        .unwrap();
        Resolver::new(vocabulary)
    }

    #[test]
    fn test_bounded_levenshtein() {
        assert_eq!(bounded_levenshtein("kitten", "kitten", 2), 0);
        assert_eq!(bounded_levenshtein("home ofice", "home office", 2), 1);
        assert_eq!(bounded_levenshtein("abc", "xyz", 2), 3);
        // Length gap alone exceeds the bound.
        assert_eq!(bounded_levenshtein("a", "abcdef", 2), 3);
        assert_eq!(bounded_levenshtein("", "abc", 2), 3);
    }

    #[test]
    fn test_category_exact_match_is_case_insensitive() {
        let mut resolver = resolver();
        assert_eq!(
            resolver.resolve_category("ELECTRONICS"),
            Some("Electronics".to_string())
        );
        assert_eq!(
            resolver.resolve_category("  books "),
            Some("Books".to_string())
        );
    }

    #[test]
    fn test_category_fuzzy_within_threshold() {
        let mut resolver = resolver();
        assert_eq!(
            resolver.resolve_category("home ofice"),
            Some("Home Office".to_string())
        );
        assert_eq!(
            resolver.resolve_category("electronis"),
            Some("Electronics".to_string())
        );
    }

    #[test]
    fn test_category_beyond_threshold_is_no_match() {
        let mut resolver = resolver();
        assert_eq!(resolver.resolve_category("Groceries"), None);
        assert_eq!(resolver.resolve_category(""), None);
        assert_eq!(resolver.resolve_category("null"), None);
    }

    #[test]
    fn test_nullish_category_never_fuzzy_matches() {
        // "none" is two edits from "Home"; the placeholder must collapse to
        // empty before the fuzzy scan gets a chance to accept it.
        let vocabulary = Vocabulary::from_parts(
            vec!["Home".into()],
            vec!["Mumbai".into()],
            HashMap::from([("Mumbai".to_string(), "Mumbai".to_string())]),
        )
        .unwrap();
        let mut resolver = Resolver::new(vocabulary);
        assert_eq!(resolver.resolve_category("none"), None);
        assert_eq!(resolver.resolve_category(" N/A "), None);
        assert_eq!(resolver.resolve_category("missing"), None);
    }

    #[test]
    fn test_category_tie_breaks_on_vocabulary_order() {
        // "Bars" is one edit from both entries; the earlier one wins.
        let vocabulary = Vocabulary::from_parts(
            vec!["Bats".into(), "Bags".into()],
            vec!["Mumbai".into()],
            HashMap::from([("Mumbai".to_string(), "Mumbai".to_string())]),
        )
        .unwrap();
        let mut resolver = Resolver::new(vocabulary);
        assert_eq!(resolver.resolve_category("Bars"), Some("Bats".to_string()));
    }

    #[test]
    fn test_category_memoization_returns_same_answer() {
        let mut resolver = resolver();
        let first = resolver.resolve_category("home ofice");
        let second = resolver.resolve_category("home ofice");
        assert_eq!(first, second);
        assert_eq!(resolver.category_cache.len(), 1);
    }

    #[test]
    fn test_region_exact_and_casefold() {
        let mut resolver = resolver();
        assert_eq!(resolver.resolve_region("Bombay"), Some("Mumbai".to_string()));
        assert_eq!(resolver.resolve_region("bombay"), Some("Mumbai".to_string()));
        assert_eq!(resolver.resolve_region(" Mumbai "), Some("Mumbai".to_string()));
    }

    #[test]
    fn test_region_has_no_fuzzy_fallback() {
        let mut resolver = resolver();
        // One edit away from a mapped alias, but regions never fuzzy-match.
        assert_eq!(resolver.resolve_region("Mumbei"), None);
        assert_eq!(resolver.resolve_region("Atlantis"), None);
    }

    #[test]
    fn test_region_unknown_sentinel_is_no_match() {
        let mut resolver = resolver();
        assert_eq!(resolver.resolve_region("Unassigned"), None);
    }

    #[test]
    fn test_region_nullish_is_no_match() {
        let mut resolver = resolver();
        assert_eq!(resolver.resolve_region("N/A"), None);
        assert_eq!(resolver.resolve_region("  none "), None);
    }
}
