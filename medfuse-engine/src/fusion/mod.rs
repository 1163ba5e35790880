// Fusion Module - image + text evidence → ranked candidates
//
// Normalizer (one label space) → Text scanner (keyword evidence) → Engine (log-odds pool)

pub mod engine;
pub mod normalizer;
pub mod text_scanner;

pub use engine::{logit, sigmoid, FusionEngine};
pub use normalizer::{canonicalize, EvidenceNormalizer};
pub use text_scanner::TextEvidenceScanner;
