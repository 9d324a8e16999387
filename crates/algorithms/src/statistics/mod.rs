//! Descriptive statistics over sample feature matrices
//!
//! - **summary**: column means, overall and grouped by zone label

pub mod summary;

pub use summary::{column_means, grouped_means, GroupMeans};
