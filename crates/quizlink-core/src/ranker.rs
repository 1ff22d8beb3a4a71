//! Confusable-concept ranking.
//!
//! Two scoring strategies are available and are never mixed: TF-IDF cosine
//! over term + definition, and Jaccard overlap of definitions plus a bonus
//! for shared words in the terms. Their score scales differ, so each
//! carries its own default cutoff and list length.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{Chapter, Concept};
use crate::text::{content_tokens, word_set, StopWords};

/// Weight of the shared-term-word bonus in the Jaccard strategy.
pub const TERM_BONUS_WEIGHT: f64 = 0.3;

/// Similarity scoring strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Cosine similarity of TF-IDF vectors.
    #[default]
    #[serde(rename = "tfidf")]
    TfIdf,
    /// Jaccard similarity of definitions plus a term-word bonus.
    #[serde(rename = "jaccard")]
    Jaccard,
}

impl Strategy {
    pub fn default_max_confusables(self) -> usize {
        match self {
            Strategy::TfIdf => 4,
            Strategy::Jaccard => 5,
        }
    }

    pub fn default_min_score(self) -> f64 {
        match self {
            Strategy::TfIdf => 0.05,
            Strategy::Jaccard => 0.0,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::TfIdf => write!(f, "tfidf"),
            Strategy::Jaccard => write!(f, "jaccard"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tfidf" | "tf-idf" => Ok(Strategy::TfIdf),
            "jaccard" => Ok(Strategy::Jaccard),
            other => Err(format!("unknown similarity strategy: {other}")),
        }
    }
}

/// Ranking configuration, as read from the `[linking]` config table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankerConfig {
    #[serde(default)]
    pub strategy: Strategy,
    /// Override of the strategy's list length.
    #[serde(default)]
    pub max_confusables: Option<usize>,
    /// Override of the strategy's minimum score.
    #[serde(default)]
    pub min_score: Option<f64>,
    /// Words ignored in addition to the built-in English stop words.
    #[serde(default)]
    pub extra_stop_words: Vec<String>,
}

impl RankerConfig {
    pub fn max_confusables(&self) -> usize {
        self.max_confusables
            .unwrap_or_else(|| self.strategy.default_max_confusables())
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
            .unwrap_or_else(|| self.strategy.default_min_score())
    }

    pub fn stop_words(&self) -> StopWords {
        StopWords::english().with_extra(&self.extra_stop_words)
    }
}

/// Pairwise similarity of the concepts in one chapter.
///
/// Each unordered pair is scored once and mirrored, so
/// `score(i, j) == score(j, i)` holds exactly. The diagonal is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    size: usize,
    scores: Vec<f64>,
}

impl SimilarityMatrix {
    fn build(size: usize, mut pair_score: impl FnMut(usize, usize) -> f64) -> Self {
        let mut scores = vec![0.0; size * size];
        for i in 0..size {
            for j in (i + 1)..size {
                let score = pair_score(i, j);
                scores[i * size + j] = score;
                scores[j * size + i] = score;
            }
        }
        Self { size, scores }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Score of the pair `(i, j)`; zero on the diagonal.
    pub fn score(&self, i: usize, j: usize) -> f64 {
        self.scores[i * self.size + j]
    }
}

/// Scores every concept pair in a chapter.
pub trait SimilarityScorer {
    fn score_matrix(&self, concepts: &[Concept]) -> SimilarityMatrix;
}

/// TF-IDF cosine similarity over `term + " " + definition`.
pub struct TfIdfScorer<'a> {
    stop_words: &'a StopWords,
}

impl<'a> TfIdfScorer<'a> {
    pub fn new(stop_words: &'a StopWords) -> Self {
        Self { stop_words }
    }
}

/// Build TF-IDF weight vectors, one per token list.
///
/// Weight of token `t` in document `d` is
/// `(count(t, d) / len(d)) * (ln((N + 1) / (df(t) + 1)) + 1)`.
fn tfidf_vectors(docs: &[Vec<String>]) -> Vec<BTreeMap<&str, f64>> {
    let mut df: HashMap<&str, usize> = HashMap::new();
    for doc in docs {
        let distinct: BTreeSet<&str> = doc.iter().map(String::as_str).collect();
        for token in distinct {
            *df.entry(token).or_default() += 1;
        }
    }

    let n = docs.len() as f64;
    docs.iter()
        .map(|doc| {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for token in doc {
                *counts.entry(token.as_str()).or_default() += 1;
            }
            let total = doc.len().max(1) as f64;
            counts
                .into_iter()
                .map(|(token, count)| {
                    let doc_freq = df.get(token).copied().unwrap_or(0) as f64;
                    let idf = ((n + 1.0) / (doc_freq + 1.0)).ln() + 1.0;
                    (token, (count as f64 / total) * idf)
                })
                .collect()
        })
        .collect()
}

/// Cosine similarity restricted to shared tokens.
fn cosine(a: &BTreeMap<&str, f64>, b: &BTreeMap<&str, f64>) -> f64 {
    let mut shared = false;
    let mut dot = 0.0;
    for (token, weight) in a {
        if let Some(other) = b.get(token) {
            shared = true;
            dot += weight * other;
        }
    }
    if !shared {
        return 0.0;
    }

    let magnitude = |v: &BTreeMap<&str, f64>| v.values().map(|w| w * w).sum::<f64>().sqrt();
    let (mag_a, mag_b) = (magnitude(a), magnitude(b));
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

impl SimilarityScorer for TfIdfScorer<'_> {
    fn score_matrix(&self, concepts: &[Concept]) -> SimilarityMatrix {
        let docs: Vec<Vec<String>> = concepts
            .iter()
            .map(|c| content_tokens(&format!("{} {}", c.term, c.definition), self.stop_words))
            .collect();
        let vectors = tfidf_vectors(&docs);
        SimilarityMatrix::build(concepts.len(), |i, j| cosine(&vectors[i], &vectors[j]))
    }
}

/// Jaccard overlap of definition words plus a weighted term-word bonus.
pub struct JaccardScorer<'a> {
    stop_words: &'a StopWords,
}

impl<'a> JaccardScorer<'a> {
    pub fn new(stop_words: &'a StopWords) -> Self {
        Self { stop_words }
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn term_bonus(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    TERM_BONUS_WEIGHT * a.intersection(b).count() as f64 / longest as f64
}

impl SimilarityScorer for JaccardScorer<'_> {
    fn score_matrix(&self, concepts: &[Concept]) -> SimilarityMatrix {
        let no_stop_words = StopWords::none();
        let definitions: Vec<BTreeSet<String>> = concepts
            .iter()
            .map(|c| word_set(&c.definition, self.stop_words))
            .collect();
        let terms: Vec<BTreeSet<String>> = concepts
            .iter()
            .map(|c| word_set(&c.term, &no_stop_words))
            .collect();

        SimilarityMatrix::build(concepts.len(), |i, j| {
            jaccard(&definitions[i], &definitions[j]) + term_bonus(&terms[i], &terms[j])
        })
    }
}

/// A ranked similar concept.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    /// Position of the concept in the chapter.
    pub index: usize,
    pub concept_id: String,
    pub score: f64,
}

/// Ranks concepts against each other within one chapter.
#[derive(Debug, Clone)]
pub struct ConfusableRanker {
    strategy: Strategy,
    max_confusables: usize,
    min_score: f64,
    stop_words: StopWords,
}

impl ConfusableRanker {
    pub fn new(config: &RankerConfig) -> Self {
        Self {
            strategy: config.strategy,
            max_confusables: config.max_confusables(),
            min_score: config.min_score(),
            stop_words: config.stop_words(),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    pub fn max_confusables(&self) -> usize {
        self.max_confusables
    }

    /// Pairwise scores under the configured strategy.
    pub fn scores(&self, concepts: &[Concept]) -> SimilarityMatrix {
        match self.strategy {
            Strategy::TfIdf => TfIdfScorer::new(&self.stop_words).score_matrix(concepts),
            Strategy::Jaccard => JaccardScorer::new(&self.stop_words).score_matrix(concepts),
        }
    }

    /// For each concept, the most similar other concepts: positive score at
    /// or above the minimum, best first, ties in input order, at most
    /// `max_confusables`.
    pub fn neighbours(&self, concepts: &[Concept]) -> Vec<Vec<Neighbour>> {
        if concepts.len() < 2 {
            return vec![Vec::new(); concepts.len()];
        }

        let matrix = self.scores(concepts);
        (0..concepts.len())
            .map(|i| {
                let mut ranked: Vec<Neighbour> = (0..concepts.len())
                    .filter(|&j| j != i)
                    .map(|j| Neighbour {
                        index: j,
                        concept_id: concepts[j].id.clone(),
                        score: matrix.score(i, j),
                    })
                    .filter(|n| n.score > 0.0 && n.score >= self.min_score)
                    .collect();
                // Stable: equal scores stay in input order.
                ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
                ranked.truncate(self.max_confusables);
                ranked
            })
            .collect()
    }

    /// Map of concept id to its confusable concept ids.
    pub fn rank(&self, concepts: &[Concept]) -> BTreeMap<String, Vec<String>> {
        concepts
            .iter()
            .zip(self.neighbours(concepts))
            .map(|(concept, ranked)| {
                (
                    concept.id.clone(),
                    ranked.into_iter().map(|n| n.concept_id).collect(),
                )
            })
            .collect()
    }

    /// Replace every concept's `confusable_ids` in the chapter.
    pub fn rank_chapter(&self, chapter: &mut Chapter) {
        let ranked = self.neighbours(&chapter.concepts);
        for (concept, neighbours) in chapter.concepts.iter_mut().zip(ranked) {
            concept.confusable_ids = neighbours.into_iter().map(|n| n.concept_id).collect();
        }
        tracing::debug!(
            chapter = %chapter.id,
            strategy = %self.strategy,
            "ranked confusable concepts"
        );
    }
}
