// Vector math module
// Pure similarity, distance and ranking helpers shared by the embedding pipeline

#[cfg(test)]
mod tests;

use crate::{MemoryError, Result};

const DEFAULT_SPARSITY_THRESHOLD: f32 = 0.01;

/// A vector offered to [`rank_by_similarity`] together with the value it describes
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a, T> {
    pub vector: &'a [f32],
    pub payload: T,
}

/// A ranked candidate with its cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub score: f32,
    pub payload: T,
}

fn ensure_same_dimension(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() == b.len() {
        Ok(())
    } else {
        Err(MemoryError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        })
    }
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().fold(0.0_f32, |acc, v| v.mul_add(*v, acc)).sqrt()
}

/// Cosine similarity of two vectors of equal dimension.
///
/// Returns `0.0` for empty vectors and whenever either side has a zero norm.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    ensure_same_dimension(a, b)?;

    if a.is_empty() {
        return Ok(0.0);
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / denominator)
}

#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    ensure_same_dimension(a, b)?;

    let sum = a.iter().zip(b).fold(0.0_f32, |acc, (x, y)| {
        let diff = x - y;
        diff.mul_add(diff, acc)
    });

    Ok(sum.sqrt())
}

/// Scale a vector to unit length. A zero vector stays all zeros.
#[inline]
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let length = norm(vector);
    if length == 0.0 {
        return vec![0.0; vector.len()];
    }

    vector.iter().map(|v| v / length).collect()
}

/// Element-wise mean of a set of vectors
#[inline]
pub fn average_vectors(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let Some(first) = vectors.first() else {
        return Ok(Vec::new());
    };

    let mut sum = vec![0.0_f32; first.len()];
    for vector in vectors {
        ensure_same_dimension(first, vector)?;
        for (acc, value) in sum.iter_mut().zip(vector) {
            *acc += value;
        }
    }

    let count = vectors.len() as f32;
    Ok(sum.into_iter().map(|v| v / count).collect())
}

/// Lossy quantization to an 8 or 16 bit grid scaled by the largest magnitude
#[inline]
pub fn quantize_vector(vector: &[f32], bits: u8) -> Result<Vec<f32>> {
    if bits != 8 && bits != 16 {
        return Err(MemoryError::InvalidArgument(format!(
            "unsupported quantization width {} (expected 8 or 16)",
            bits
        )));
    }

    let max = vector.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()));
    if max == 0.0 {
        return Ok(vector.to_vec());
    }

    let levels = f32::from((1_u16 << (bits - 1)) - 1);
    let scale = levels / max;

    Ok(vector
        .iter()
        .map(|v| (v * scale).round() / scale)
        .collect())
}

/// Fraction of components whose magnitude is below `threshold`.
/// An empty vector has a sparsity of `0.0`.
#[inline]
pub fn calculate_sparsity(vector: &[f32], threshold: Option<f32>) -> f32 {
    if vector.is_empty() {
        return 0.0;
    }

    let threshold = threshold.unwrap_or(DEFAULT_SPARSITY_THRESHOLD);
    let near_zero = vector.iter().filter(|v| v.abs() < threshold).count();

    near_zero as f32 / vector.len() as f32
}

/// Score every candidate against `query` and keep the `top_k` best.
///
/// The sort is stable: candidates with equal scores keep their input order.
/// Any dimension mismatch aborts the ranking instead of producing a score.
#[inline]
pub fn rank_by_similarity<T>(
    query: &[f32],
    candidates: Vec<Candidate<'_, T>>,
    top_k: usize,
) -> Result<Vec<Ranked<T>>> {
    let mut scored = candidates
        .into_iter()
        .map(|candidate| {
            Ok(Ranked {
                score: cosine_similarity(query, candidate.vector)?,
                payload: candidate.payload,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);

    Ok(scored)
}
