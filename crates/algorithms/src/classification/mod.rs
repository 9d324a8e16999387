//! Unsupervised classification of sample feature vectors
//!
//! - **K-means**: Lloyd iterations with k-means++ seeding and restarts
//! - **Standardize**: optional per-feature z-scores before clustering

mod kmeans;

pub use kmeans::{kmeans, standardize, KmeansParams, KmeansResult};
