//! Aggregate rating derived from a product's comments.

use crate::models::Comment;

/// Rating assigned to a product that has no comments yet.
///
/// This is a policy value, not the mean of an empty set.
pub const INITIAL_RATING: f64 = 1.0;

/// Mean of all comment ratings rounded to one decimal (half away from zero).
///
/// Returns `None` for an empty slice; callers decide what an unrated product shows.
pub fn recompute(comments: &[Comment]) -> Option<f64> {
    if comments.is_empty() {
        return None;
    }
    let total: i64 = comments.iter().map(|c| c.rating).sum();
    let mean = total as f64 / comments.len() as f64;
    Some(round_to_tenth(mean))
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
