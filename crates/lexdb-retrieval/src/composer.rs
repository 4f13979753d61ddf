use lexdb_core::types::ResultDocument;

/// Bounded best-k buffer.
///
/// Holds at most `2k` candidates; once full it is sorted and cut back to
/// `k`. The sort is stable and keyed on score alone, so ties keep arrival
/// order and the outcome equals sorting every candidate at once.
pub struct TopK {
    k: Option<usize>,
    items: Vec<ResultDocument>,
}

impl TopK {
    /// `k == 0` keeps everything.
    pub fn new(k: usize) -> Self {
        let k = (k > 0).then_some(k);
        Self { k, items: Vec::new() }
    }

    pub fn push(&mut self, item: ResultDocument) {
        self.items.push(item);
        if let Some(k) = self.k {
            if self.items.len() >= k.saturating_mul(2) { self.compact(k); }
        }
    }

    fn compact(&mut self, k: usize) {
        self.items.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.items.truncate(k);
    }

    /// Best first.
    pub fn into_sorted(mut self) -> Vec<ResultDocument> {
        let k = self.k.unwrap_or(self.items.len());
        self.compact(k);
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexdb_core::types::Document;

    fn item(id: &str, score: f64) -> ResultDocument { ResultDocument { document: Document::new(id, ""), score } }

    fn ids(items: &[ResultDocument]) -> Vec<&str> { items.iter().map(|r| r.document.id.as_str()).collect() }

    #[test]
    fn keeps_best_k_in_order() {
        let mut top = TopK::new(2);
        for (id, s) in [("a", 0.1), ("b", 0.9), ("c", 0.5), ("d", 0.7), ("e", 0.2)] { top.push(item(id, s)); }
        assert_eq!(ids(&top.into_sorted()), vec!["b", "d"]);
    }

    #[test]
    fn ties_keep_arrival_order_across_compactions() {
        let mut top = TopK::new(3);
        for id in ["a", "b", "c", "d", "e", "f", "g"] { top.push(item(id, 1.0)); }
        assert_eq!(ids(&top.into_sorted()), vec!["a", "b", "c"]);
    }

    #[test]
    fn zero_means_unbounded() {
        let mut top = TopK::new(0);
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() { top.push(item(id, i as f64)); }
        assert_eq!(ids(&top.into_sorted()), vec!["d", "c", "b", "a"]);
    }
}
