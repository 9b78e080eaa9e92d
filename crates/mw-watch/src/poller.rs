//! Poll planning for the REST fallback.
//!
//! Watched items are grouped by category and split into fixed-size chunks;
//! each chunk becomes one request.

use mw_core::ItemId;
use std::collections::BTreeMap;

/// One poll request: up to `chunk_size` items of a single category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollChunk {
    pub category: String,
    pub ids: Vec<ItemId>,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub chunks: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Quotes applied (changed or not).
    pub quotes: usize,
    /// Set when the cycle was cut short by shutdown.
    pub cancelled: bool,
}

/// Group `(item, category)` pairs by category (unknown goes to
/// `default_category`) and split each group into chunks.
///
/// Categories are visited in lexical order, items keep their input order.
pub fn plan_chunks(
    items: &[(ItemId, Option<String>)],
    default_category: &str,
    chunk_size: usize,
) -> Vec<PollChunk> {
    let mut groups: BTreeMap<&str, Vec<ItemId>> = BTreeMap::new();
    for (id, category) in items {
        let category = category.as_deref().unwrap_or(default_category);
        groups.entry(category).or_default().push(id.clone());
    }

    let chunk_size = chunk_size.max(1);
    groups
        .into_iter()
        .flat_map(|(category, ids)| {
            ids.chunks(chunk_size)
                .map(|chunk| PollChunk {
                    category: category.to_string(),
                    ids: chunk.to_vec(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize, category: Option<&str>) -> Vec<(ItemId, Option<String>)> {
        (0..n)
            .map(|i| (ItemId::new(format!("item-{i}")), category.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_120_items_make_three_chunks() {
        let chunks = plan_chunks(&items(120, None), "default", 50);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.ids.len()).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
        assert!(chunks.iter().all(|c| c.category == "default"));
        assert_eq!(chunks[1].ids[0], ItemId::new("item-50"));
    }

    #[test]
    fn test_groups_by_category() {
        let mut all = items(3, Some("knives"));
        all.extend(items(2, Some("gloves")));
        all.push((ItemId::new("loose"), None));

        let chunks = plan_chunks(&all, "misc", 50);
        let categories: Vec<&str> = chunks.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(categories, vec!["gloves", "knives", "misc"]);
        assert_eq!(chunks[2].ids, vec![ItemId::new("loose")]);
    }

    #[test]
    fn test_empty_and_zero_chunk_size() {
        assert!(plan_chunks(&[], "default", 50).is_empty());
        assert_eq!(plan_chunks(&items(3, None), "default", 0).len(), 3);
    }
}
