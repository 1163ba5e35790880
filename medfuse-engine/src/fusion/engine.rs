//! Fusion Engine
//!
//! Combines normalized image and text evidence into one ranked candidate list.
//!
//! # Log-odds pool
//! Every condition owns one additive log-odds accumulator `L`:
//! ```text
//! L = Σ w_img · logit(p_i)        (image findings, p clamped to [1e-6, 1-1e-6])
//!   + w_txt · text_strength       (count of text findings for the condition)
//! score = sigmoid(L + bias)
//! ```
//! Ranking is a stable descending sort on score, so ties keep first-seen
//! order: image conditions in input order, then text-only conditions.

use crate::types::{Finding, RankedCandidate, TextFinding};
use medfuse_common::config::FusionConfig;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Probability clamp applied before taking a logit
pub const LOGIT_EPSILON: f64 = 1e-6;

/// `ln(p / (1 - p))` with `p` clamped away from 0 and 1
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(LOGIT_EPSILON, 1.0 - LOGIT_EPSILON);
    (p / (1.0 - p)).ln()
}

/// Logistic function, inverse of [`logit`]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

struct Accumulator {
    condition: String,
    log_odds: f64,
    from_image: bool,
    from_text: bool,
}

impl Accumulator {
    fn rationale(&self) -> &'static str {
        match (self.from_image, self.from_text) {
            (true, true) => "combined image and text evidence",
            (true, false) => "image evidence",
            _ => "text evidence",
        }
    }
}

/// Deterministic log-odds evidence combiner
#[derive(Debug, Clone)]
pub struct FusionEngine {
    w_img: f64,
    w_txt: f64,
    bias: f64,
    topk: usize,
}

impl FusionEngine {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            w_img: config.w_img,
            w_txt: config.w_txt,
            bias: config.bias,
            topk: config.topk,
        }
    }

    /// Fuse normalized findings into at most `topk` ranked candidates
    ///
    /// Entries with a blank label or non-finite score are skipped.
    pub fn fuse(&self, image: &[Finding], text: &[TextFinding]) -> Vec<RankedCandidate> {
        let mut pool: Vec<Accumulator> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        fn slot<'a>(
            pool: &'a mut Vec<Accumulator>,
            index: &mut HashMap<String, usize>,
            condition: &str,
        ) -> &'a mut Accumulator {
            let i = *index.entry(condition.to_string()).or_insert_with(|| {
                pool.push(Accumulator {
                    condition: condition.to_string(),
                    log_odds: 0.0,
                    from_image: false,
                    from_text: false,
                });
                pool.len() - 1
            });
            &mut pool[i]
        }

        // Text strength: one unit per text finding, first-seen order kept
        let mut text_order: Vec<&str> = Vec::new();
        let mut text_strength: HashMap<&str, f64> = HashMap::new();
        for finding in text {
            let label = finding.label.trim();
            if label.is_empty() {
                continue;
            }
            let strength = text_strength.entry(label).or_insert_with(|| {
                text_order.push(label);
                0.0
            });
            *strength += 1.0;
        }

        for finding in image {
            let label = finding.label.trim();
            if label.is_empty() || !finding.score.is_finite() {
                continue;
            }
            let acc = slot(&mut pool, &mut index, label);
            acc.log_odds += self.w_img * logit(finding.score);
            acc.from_image = true;
        }

        for label in text_order {
            let strength = text_strength.get(label).copied().unwrap_or(0.0);
            let acc = slot(&mut pool, &mut index, label);
            acc.log_odds += self.w_txt * strength;
            acc.from_text = true;
        }

        let mut ranked: Vec<RankedCandidate> = pool
            .iter()
            .map(|acc| RankedCandidate {
                condition: acc.condition.clone(),
                score: sigmoid(acc.log_odds + self.bias),
                rationale: acc.rationale().to_string(),
            })
            .collect();

        // Stable: equal scores keep insertion order
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked.truncate(self.topk);

        debug!(
            image_findings = image.len(),
            text_findings = text.len(),
            candidates = ranked.len(),
            "Fusion complete"
        );

        ranked
    }
}
