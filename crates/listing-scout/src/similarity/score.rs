//! Pairwise listing similarity.

use crate::db::listing_repo::ListingFeatures;

pub const TITLE_WEIGHT: f64 = 0.2;
pub const STORAGE_WEIGHT: f64 = 0.3;
pub const PROCESSOR_WEIGHT: f64 = 0.3;
pub const RAM_WEIGHT: f64 = 0.2;

/// Length of the longest common subsequence.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];
    for &lc in long {
        for (j, &sc) in short.iter().enumerate() {
            curr[j + 1] = if lc == sc {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[short.len()]
}

/// Normalized Indel similarity, `(|a| + |b| - d) / (|a| + |b|)` where `d`
/// counts the insertions and deletions turning `a` into `b`. Case is
/// ignored; two empty strings are identical.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    // d = |a| + |b| - 2 * lcs
    (2 * lcs_len(&a, &b)) as f64 / total as f64
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

/// Weighted similarity of two listings, in `[0, 1]`.
pub fn listing_similarity(a: &ListingFeatures, b: &ListingFeatures) -> f64 {
    let score = TITLE_WEIGHT * ratio(&a.title, &b.title)
        + STORAGE_WEIGHT * ratio(field(&a.storage), field(&b.storage))
        + PROCESSOR_WEIGHT * ratio(field(&a.processor), field(&b.processor))
        + RAM_WEIGHT * ratio(field(&a.ram), field(&b.ram));
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(id: i64, title: &str, storage: &str, processor: &str, ram: &str) -> ListingFeatures {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        ListingFeatures {
            id,
            title: title.to_string(),
            storage: opt(storage),
            processor: opt(processor),
            ram: opt(ram),
        }
    }

    #[test]
    fn test_ratio_known_values() {
        assert_eq!(ratio("", ""), 1.0);
        assert_eq!(ratio("abc", ""), 0.0);
        assert_eq!(ratio("abc", "abc"), 1.0);
        assert_eq!(ratio("abc", "xyz"), 0.0);
        // lcs("kitten", "sitting") = 4 ("ittn"), total 13
        assert!((ratio("kitten", "sitting") - 8.0 / 13.0).abs() < 1e-12);
    }

    #[test]
    fn test_ratio_ignores_case_and_is_symmetric() {
        assert_eq!(ratio("ThinkPad", "thinkpad"), 1.0);
        assert_eq!(ratio("16GB DDR4", "8GB"), ratio("8GB", "16GB DDR4"));
    }

    #[test]
    fn test_identical_listings_score_one() {
        let a = features(1, "HP EliteBook 840", "256GB SSD", "i5 8th", "8GB");
        let b = features(2, "HP EliteBook 840", "256GB SSD", "i5 8th", "8GB");
        assert!((listing_similarity(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_fields_on_both_sides_match() {
        let a = features(1, "Surface", "", "", "");
        let b = features(2, "Surface", "", "", "");
        assert!((listing_similarity(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_disjoint_listings_score_near_zero() {
        let a = features(1, "aaaa", "bbbb", "cccc", "dddd");
        let b = features(2, "wxyz", "wxyz", "wxyz", "wxyz");
        assert!(listing_similarity(&a, &b) < 1e-9);
    }

    #[test]
    fn test_dell_latitude_pair_is_between_bounds() {
        let a = features(1, "Dell Latitude 5490", "256GB SSD", "Intel Core i5 8th Gen", "8GB");
        let b = features(2, "Dell Latitude 7490", "512GB SSD", "Intel Core i7 8th Gen", "16GB");
        let score = listing_similarity(&a, &b);
        assert!(score > 0.5, "score {score}");
        assert!(score < 1.0, "score {score}");
    }

    #[test]
    fn test_same_model_with_different_ram_and_storage() {
        let a = features(
            1,
            "Dell Latitude 7490 16GB 512GB SSD",
            "512GB SSD",
            "Intel Core i7 8th Gen",
            "16GB",
        );
        let b = features(
            2,
            "Dell Latitude 7490 8GB 256GB SSD",
            "256GB SSD",
            "Intel Core i7 8th Gen",
            "8GB",
        );

        // lcs: titles 29 of 65 chars, storage "2GB SSD", ram "GB"
        assert!((ratio(&a.title, &b.title) - 58.0 / 65.0).abs() < 1e-12);
        let expected = TITLE_WEIGHT * 58.0 / 65.0
            + STORAGE_WEIGHT * 14.0 / 18.0
            + PROCESSOR_WEIGHT
            + RAM_WEIGHT * 4.0 / 7.0;
        let score = listing_similarity(&a, &b);
        assert!((score - expected).abs() < 1e-12, "score {score}");
        assert!(score > 0.0 && score < 1.0);
        assert_eq!(score, listing_similarity(&b, &a));
    }
}
