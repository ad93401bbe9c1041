/// Relevance scorer, pluggable per request.
pub trait Scorer: Send + Sync {
    /// Score one term occurrence given its frequency in the doc, the term
    /// IDF, and field-length statistics.
    fn score(&self, tf: f32, idf: f32, doc_len: f32, avg_doc_len: f32) -> f32;

    fn name(&self) -> &str;
}

/// BM25, the default.
pub struct BM25Scorer {
    pub k1: f32,
    pub b: f32,
}

impl Default for BM25Scorer {
    fn default() -> Self {
        BM25Scorer { k1: 1.2, b: 0.75 }
    }
}

impl Scorer for BM25Scorer {
    fn score(&self, tf: f32, idf: f32, doc_len: f32, avg_doc_len: f32) -> f32 {
        let avg = if avg_doc_len > 0.0 { avg_doc_len } else { 1.0 };
        let numerator = tf * (self.k1 + 1.0);
        let denominator = tf + self.k1 * (1.0 - self.b + self.b * (doc_len / avg));
        idf * numerator / denominator
    }

    fn name(&self) -> &str {
        "bm25"
    }
}

/// Plain TF-IDF alternative.
pub struct TfIdfScorer {
    pub normalize: bool,
}

impl Scorer for TfIdfScorer {
    fn score(&self, tf: f32, idf: f32, doc_len: f32, _avg_doc_len: f32) -> f32 {
        let tf = if self.normalize && doc_len > 0.0 { tf / doc_len } else { tf };
        tf * idf
    }

    fn name(&self) -> &str {
        "tfidf"
    }
}

/// Inverse document frequency with the usual BM25 smoothing.
pub fn idf(doc_freq: u64, total_docs: u64) -> f32 {
    let df = doc_freq as f32;
    let n = total_docs as f32;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf_decreases_with_frequency() {
        assert!(idf(1, 100) > idf(50, 100));
        assert!(idf(100, 100) > 0.0);
    }

    #[test]
    fn test_bm25_saturates() {
        let scorer = BM25Scorer::default();
        let low = scorer.score(1.0, 1.0, 10.0, 10.0);
        let mid = scorer.score(5.0, 1.0, 10.0, 10.0);
        let high = scorer.score(50.0, 1.0, 10.0, 10.0);
        assert!(low < mid && mid < high);
        // Term-frequency gains flatten out
        assert!(high - mid < mid - low);
    }

    #[test]
    fn test_bm25_length_normalization() {
        let scorer = BM25Scorer::default();
        let short_doc = scorer.score(2.0, 1.0, 5.0, 20.0);
        let long_doc = scorer.score(2.0, 1.0, 80.0, 20.0);
        assert!(short_doc > long_doc);
    }

    #[test]
    fn test_tfidf() {
        let scorer = TfIdfScorer { normalize: true };
        assert_eq!(scorer.score(2.0, 3.0, 4.0, 0.0), 1.5);
        let raw = TfIdfScorer { normalize: false };
        assert_eq!(raw.score(2.0, 3.0, 4.0, 0.0), 6.0);
    }
}
