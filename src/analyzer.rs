use crate::types::{CollectorError, Result, SentimentLabel};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Compound-score thresholds for the three-way classification. These are a
/// fixed contract shared with the stored data; they are not tunable per call.
pub const POSITIVE_THRESHOLD: f64 = 0.05;
pub const NEGATIVE_THRESHOLD: f64 = -0.05;

/// Maps a compound score in [-1.0, 1.0] to its label.
pub fn classify_score(score: f64) -> SentimentLabel {
    if score >= POSITIVE_THRESHOLD {
        SentimentLabel::Positive
    } else if score <= NEGATIVE_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f64,
}

impl Sentiment {
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.0,
        }
    }
}

/// Pluggable scorer producing a compound score in [-1.0, 1.0]. Swapping the
/// model never changes pipeline logic; the label is always derived from the
/// score via `classify_score`.
pub trait SentimentModel: Send + Sync {
    fn score(&self, text: &str) -> Result<f64>;
}

/// Text preprocessing plus classification. Owns its compiled regexes and the
/// model; construct one instance at startup and share it by `Arc`.
pub struct SentimentAnalyzer {
    url_re: Regex,
    mention_re: Regex,
    crossref_re: Regex,
    model: Arc<dyn SentimentModel>,
}

impl SentimentAnalyzer {
    pub fn new(model: Arc<dyn SentimentModel>) -> Self {
        Self {
            url_re: Regex::new(r"(?m)(https?://\S+|www\.\S+)").expect("valid URL regex"),
            mention_re: Regex::new(r"(?m)/u/\w+").expect("valid mention regex"),
            crossref_re: Regex::new(r"(?m)/r/\w+").expect("valid crossref regex"),
            model,
        }
    }

    pub fn with_default_model() -> Self {
        Self::new(Arc::new(LexiconModel::new()))
    }

    /// Strips URLs, /u/ mentions and /r/ cross-references, then collapses
    /// whitespace. Applied identically on every call so scoring stays
    /// deterministic.
    pub fn clean(&self, text: &str) -> String {
        let text = self.url_re.replace_all(text, "");
        let text = self.mention_re.replace_all(&text, "");
        let text = self.crossref_re.replace_all(&text, "");
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Scores one piece of text. Empty or whitespace-only input yields
    /// (neutral, 0.0) without invoking the model at all.
    pub fn analyze(&self, text: &str) -> Result<Sentiment> {
        if text.trim().is_empty() {
            return Ok(Sentiment::neutral());
        }

        let cleaned = self.clean(text);
        if cleaned.is_empty() {
            return Ok(Sentiment::neutral());
        }

        let score = self.model.score(&cleaned)?;
        Ok(Sentiment {
            label: classify_score(score),
            score,
        })
    }
}

// Valence entries on the VADER -4..4 scale; the compound score is the
// normalized sum, so individual weights only matter relative to each other.
const LEXICON: &[(&str, f64)] = &[
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("beautiful", 2.9),
    ("best", 3.2),
    ("better", 1.9),
    ("brilliant", 2.8),
    ("bullish", 2.4),
    ("cool", 1.3),
    ("easy", 1.9),
    ("enjoy", 2.2),
    ("enjoyed", 2.3),
    ("excellent", 2.7),
    ("excited", 2.4),
    ("exciting", 2.2),
    ("fantastic", 2.6),
    ("fun", 2.3),
    ("gain", 1.6),
    ("gains", 1.7),
    ("glad", 2.0),
    ("good", 1.9),
    ("great", 3.1),
    ("happy", 2.7),
    ("helpful", 1.9),
    ("hope", 1.9),
    ("hopeful", 1.9),
    ("impressive", 2.3),
    ("improved", 1.9),
    ("improvement", 1.6),
    ("interesting", 1.7),
    ("like", 1.5),
    ("liked", 1.7),
    ("likes", 1.6),
    ("love", 3.2),
    ("loved", 2.9),
    ("loves", 2.7),
    ("nice", 1.8),
    ("perfect", 2.7),
    ("profit", 2.1),
    ("promising", 1.6),
    ("recommend", 1.6),
    ("recommended", 1.6),
    ("safe", 1.6),
    ("solid", 1.5),
    ("success", 2.7),
    ("successful", 2.6),
    ("thank", 1.7),
    ("thanks", 1.9),
    ("useful", 1.9),
    ("win", 2.8),
    ("winner", 2.8),
    ("wins", 2.7),
    ("won", 2.7),
    ("wonderful", 2.7),
    ("angry", -2.3),
    ("annoying", -1.8),
    ("awful", -2.0),
    ("bad", -2.5),
    ("bearish", -2.1),
    ("broken", -1.6),
    ("bug", -1.3),
    ("bugs", -1.3),
    ("crap", -1.7),
    ("crash", -1.4),
    ("crashing", -1.5),
    ("die", -2.9),
    ("disappointed", -2.2),
    ("disappointing", -2.1),
    ("disaster", -2.1),
    ("doubt", -1.2),
    ("dumb", -2.3),
    ("fail", -2.5),
    ("failed", -2.3),
    ("failure", -2.4),
    ("fear", -2.2),
    ("fraud", -2.8),
    ("garbage", -2.1),
    ("hate", -2.7),
    ("hated", -2.9),
    ("hates", -1.9),
    ("horrible", -2.5),
    ("issue", -0.8),
    ("issues", -0.9),
    ("lose", -1.9),
    ("loses", -1.7),
    ("loss", -1.3),
    ("lost", -1.3),
    ("mess", -1.5),
    ("panic", -2.4),
    ("pathetic", -2.6),
    ("poor", -1.9),
    ("problem", -1.7),
    ("problems", -1.7),
    ("risky", -1.2),
    ("sad", -2.1),
    ("scam", -2.1),
    ("scared", -2.2),
    ("stupid", -2.4),
    ("suck", -1.5),
    ("sucks", -1.5),
    ("terrible", -2.1),
    ("trash", -2.0),
    ("ugly", -2.1),
    ("useless", -1.8),
    ("waste", -1.8),
    ("worried", -1.4),
    ("worry", -1.6),
    ("worse", -2.1),
    ("worst", -3.1),
    ("wrong", -2.1),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "neither", "nor", "cannot", "cant", "can't", "dont", "don't", "doesnt",
    "doesn't", "didnt", "didn't", "isnt", "isn't", "wasnt", "wasn't", "wont", "won't", "wouldnt",
    "wouldn't", "shouldnt", "shouldn't", "couldnt", "couldn't", "aint", "ain't", "nothing",
    "hardly", "barely", "rarely", "without",
];

// Intensity modifiers: positive entries amplify, negative ones dampen.
const BOOSTERS: &[(&str, f64)] = &[
    ("very", 0.293),
    ("really", 0.293),
    ("extremely", 0.293),
    ("absolutely", 0.293),
    ("completely", 0.293),
    ("totally", 0.293),
    ("incredibly", 0.293),
    ("so", 0.293),
    ("super", 0.293),
    ("especially", 0.293),
    ("particularly", 0.293),
    ("remarkably", 0.293),
    ("slightly", -0.293),
    ("somewhat", -0.293),
    ("kinda", -0.293),
    ("marginally", -0.293),
    ("partly", -0.293),
    ("less", -0.293),
];

// Negation flips and dampens rather than inverting outright; a modifier two
// words back counts for slightly less than an adjacent one.
const NEGATION_SCALAR: f64 = -0.74;
const DISTANT_BOOSTER_SCALAR: f64 = 0.95;
const NEGATION_WINDOW: usize = 3;
const NORMALIZATION_ALPHA: f64 = 15.0;

/// Default scorer: a compact embedded valence lexicon with negation and
/// intensity handling, normalized the same way VADER normalizes its compound
/// score. Deterministic by construction.
pub struct LexiconModel {
    lexicon: HashMap<&'static str, f64>,
    negators: HashSet<&'static str>,
    boosters: HashMap<&'static str, f64>,
}

impl LexiconModel {
    pub fn new() -> Self {
        Self {
            lexicon: LEXICON.iter().copied().collect(),
            negators: NEGATORS.iter().copied().collect(),
            boosters: BOOSTERS.iter().copied().collect(),
        }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect()
    }
}

impl Default for LexiconModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentModel for LexiconModel {
    fn score(&self, text: &str) -> Result<f64> {
        let tokens = Self::tokenize(text);
        let mut sum = 0.0;

        for (i, token) in tokens.iter().enumerate() {
            let Some(&base) = self.lexicon.get(token.as_str()) else {
                continue;
            };
            let mut valence = base;

            for back in 1..=2 {
                if i < back {
                    break;
                }
                if let Some(&boost) = self.boosters.get(tokens[i - back].as_str()) {
                    let scaled = if back == 1 {
                        boost
                    } else {
                        boost * DISTANT_BOOSTER_SCALAR
                    };
                    if valence >= 0.0 {
                        valence += scaled;
                    } else {
                        valence -= scaled;
                    }
                }
            }

            let window_start = i.saturating_sub(NEGATION_WINDOW);
            if tokens[window_start..i]
                .iter()
                .any(|w| self.negators.contains(w.as_str()))
            {
                valence *= NEGATION_SCALAR;
            }

            sum += valence;
        }

        let compound = sum / (sum * sum + NORMALIZATION_ALPHA).sqrt();
        Ok(compound.clamp(-1.0, 1.0))
    }
}

/// Test model that returns a fixed score and counts invocations.
pub struct MockModel {
    fixed_score: f64,
    calls: AtomicUsize,
}

impl MockModel {
    pub fn new(fixed_score: f64) -> Self {
        Self {
            fixed_score,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SentimentModel for MockModel {
    fn score(&self, _text: &str) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.fixed_score)
    }
}

/// Test model that always fails, for exercising the degrade-to-neutral path.
pub struct FailingModel;

impl SentimentModel for FailingModel {
    fn score(&self, _text: &str) -> Result<f64> {
        Err(CollectorError::Model("model unavailable".to_string()))
    }
}
