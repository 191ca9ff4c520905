//! Aggregation engine — derived, read-only views over stored issues.
//!
//! Everything here is computed fresh from a store snapshot on each
//! request. Result sets are bounded to a few hundred rows, so there is
//! no materialized view or cache to invalidate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::Issue;

/// Category display order: domain-relevant categories first, anything
/// novel afterwards in encountered order.
const CATEGORY_ORDER: &[&str] = &[
    "AI", "Tech", "Finance", "Business", "Politics", "Health", "Science", "Culture", "Sports",
    "Other",
];

/// Number of top tags reported per digest category.
const TOP_TAGS: usize = 5;

/// One category grouping in the digest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestCategory {
    pub name: String,
    pub count: usize,
    /// Average importance score, rounded to the nearest integer.
    pub avg_score: i64,
    /// Top tags by frequency, ties broken by first-seen order.
    pub top_tags: Vec<String>,
    /// Member issues, sorted by importance descending.
    pub issues: Vec<Issue>,
}

/// The full category-grouped digest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Digest {
    pub categories: Vec<DigestCategory>,
    pub total: usize,
    pub generated_at: DateTime<Utc>,
}

/// A tag with its occurrence count across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Grouping key for an issue: the first segment of a compound
/// `"A|B|C"` category label, `"Other"` when empty.
pub fn primary_category(raw: &str) -> String {
    let first = raw.split('|').next().unwrap_or("").trim();
    if first.is_empty() {
        "Other".to_string()
    } else {
        first.to_string()
    }
}

/// Build the digest from a store snapshot.
pub fn build_digest(issues: Vec<Issue>) -> Digest {
    let total = issues.len();

    // Group by primary category, remembering encounter order for
    // categories outside the fixed priority list.
    let mut groups: HashMap<String, Vec<Issue>> = HashMap::new();
    let mut encountered: Vec<String> = Vec::new();
    for issue in issues {
        let cat = primary_category(&issue.category);
        if !groups.contains_key(&cat) {
            encountered.push(cat.clone());
        }
        groups.entry(cat).or_default().push(issue);
    }

    let mut ordered: Vec<String> = CATEGORY_ORDER
        .iter()
        .filter(|c| groups.contains_key(**c))
        .map(|c| c.to_string())
        .collect();
    ordered.extend(
        encountered
            .into_iter()
            .filter(|c| !CATEGORY_ORDER.contains(&c.as_str())),
    );

    let categories = ordered
        .into_iter()
        .map(|name| {
            let mut members = groups.remove(&name).unwrap_or_default();
            let count = members.len();
            let avg_score = if count == 0 {
                0
            } else {
                let sum: f64 = members.iter().map(|i| i.importance_score).sum();
                (sum / count as f64).round() as i64
            };

            let top_tags = tag_index(members.iter())
                .into_iter()
                .take(TOP_TAGS)
                .map(|tc| tc.tag)
                .collect();

            // Stable sort keeps the store's recency tiebreak intact for
            // equal scores.
            members.sort_by(|a, b| {
                b.importance_score
                    .partial_cmp(&a.importance_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            DigestCategory {
                name,
                count,
                avg_score,
                top_tags,
                issues: members,
            }
        })
        .collect();

    Digest {
        categories,
        total,
        generated_at: Utc::now(),
    }
}

/// Count every tag across the given issues, case-sensitively, sorted by
/// count descending with first-seen order breaking ties.
pub fn tag_index<'a>(issues: impl Iterator<Item = &'a Issue>) -> Vec<TagCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for issue in issues {
        for tag in &issue.tags {
            let entry = counts.entry(tag.as_str()).or_insert(0);
            if *entry == 0 {
                order.push(tag.as_str());
            }
            *entry += 1;
        }
    }

    let mut index: Vec<TagCount> = order
        .into_iter()
        .map(|tag| TagCount {
            tag: tag.to_string(),
            count: counts[tag],
        })
        .collect();
    index.sort_by(|a, b| b.count.cmp(&a.count));
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImportanceLevel, SocialScore};

    fn issue(id: &str, category: &str, score: f64, tags: &[&str]) -> Issue {
        Issue {
            id: id.to_string(),
            source_id: "src".to_string(),
            subject: id.to_string(),
            received_at: Utc::now(),
            raw_html: String::new(),
            cleaned_text: String::new(),
            summary: String::new(),
            key_points: vec![],
            why_it_matters: String::new(),
            category: category.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            importance_score: score,
            importance_level: ImportanceLevel::from_score(score),
            social_score: SocialScore::default(),
            is_read: false,
            is_saved: false,
        }
    }

    #[test]
    fn primary_category_takes_first_segment() {
        assert_eq!(primary_category("AI|Policy"), "AI");
        assert_eq!(primary_category("Tech"), "Tech");
        assert_eq!(primary_category(" | x"), "Other");
        assert_eq!(primary_category(""), "Other");
    }

    #[test]
    fn digest_groups_compound_categories() {
        let issues = vec![
            issue("1", "AI|Policy", 80.0, &[]),
            issue("2", "AI", 60.0, &[]),
            issue("3", "Tech", 70.0, &[]),
        ];
        let digest = build_digest(issues);

        assert_eq!(digest.total, 3);
        assert_eq!(digest.categories.len(), 2);
        assert_eq!(digest.categories[0].name, "AI");
        assert_eq!(digest.categories[0].count, 2);
        assert_eq!(digest.categories[1].name, "Tech");
    }

    #[test]
    fn digest_orders_fixed_list_before_novel_categories() {
        let issues = vec![
            issue("1", "Gardening", 50.0, &[]),
            issue("2", "Tech", 50.0, &[]),
            issue("3", "AI", 50.0, &[]),
            issue("4", "Beekeeping", 50.0, &[]),
        ];
        let digest = build_digest(issues);

        let names: Vec<&str> = digest.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["AI", "Tech", "Gardening", "Beekeeping"]);
    }

    #[test]
    fn digest_rounds_average_and_sorts_members() {
        let issues = vec![
            issue("low", "AI", 50.0, &[]),
            issue("high", "AI", 85.0, &[]),
        ];
        let digest = build_digest(issues);

        let ai = &digest.categories[0];
        assert_eq!(ai.avg_score, 68); // (50 + 85) / 2 = 67.5 → 68
        assert_eq!(ai.issues[0].id, "high");
        assert_eq!(ai.issues[1].id, "low");
    }

    #[test]
    fn digest_top_tags_ranked_by_frequency() {
        let issues = vec![
            issue("1", "AI", 50.0, &["llm", "agents"]),
            issue("2", "AI", 50.0, &["llm", "rust"]),
            issue("3", "AI", 50.0, &["llm", "agents", "a", "b", "c", "d"]),
        ];
        let digest = build_digest(issues);

        let tags = &digest.categories[0].top_tags;
        assert_eq!(tags.len(), 5);
        assert_eq!(tags[0], "llm");
        assert_eq!(tags[1], "agents");
    }

    #[test]
    fn tag_index_counts_and_sorts() {
        let issues = vec![
            issue("1", "AI", 50.0, &["a", "b"]),
            issue("2", "AI", 50.0, &["a"]),
            issue("3", "AI", 50.0, &["c"]),
        ];
        let index = tag_index(issues.iter());

        assert_eq!(index[0], TagCount { tag: "a".into(), count: 2 });
        // Equal counts keep first-seen order
        assert_eq!(index[1], TagCount { tag: "b".into(), count: 1 });
        assert_eq!(index[2], TagCount { tag: "c".into(), count: 1 });
    }

    #[test]
    fn tag_index_is_case_sensitive() {
        let issues = vec![issue("1", "AI", 50.0, &["AI", "ai"])];
        let index = tag_index(issues.iter());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn empty_store_yields_empty_digest() {
        let digest = build_digest(vec![]);
        assert_eq!(digest.total, 0);
        assert!(digest.categories.is_empty());
    }
}
