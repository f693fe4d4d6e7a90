/// models.rs - Collaborators feeding the signal engine
///
/// normalize: in-sample split and min-max scaling
/// spread:    x − y spread and in-sample z-score
/// selection: distance / correlation ranking of candidate pairs
pub mod normalize;
pub mod selection;
pub mod spread;

pub use normalize::{normalize, split_train_test, DEFAULT_TRAIN_PCT};
pub use selection::{correlation, euclidean_distance, rank_pairs, PairCandidate};
pub use spread::{spread, zscore, SpreadStats};
