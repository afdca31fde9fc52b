use super::*;

const EPSILON: f32 = 1e-5;

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < EPSILON,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn cosine_of_vector_with_itself_is_one() {
    let v = [1.0, 2.0, 3.0, 4.0, 5.0];
    let score = cosine_similarity(&v, &v).expect("same dimension");
    assert_close(score, 1.0);
}

#[test]
fn cosine_of_vector_with_negation_is_minus_one() {
    let v = [0.3, -1.2, 4.5];
    let negated: Vec<f32> = v.iter().map(|x| -x).collect();
    let score = cosine_similarity(&v, &negated).expect("same dimension");
    assert_close(score, -1.0);
}

#[test]
fn cosine_with_zero_vector_is_zero() {
    let v = [1.0, 2.0, 3.0];
    let zero = [0.0, 0.0, 0.0];
    assert_eq!(cosine_similarity(&v, &zero).expect("same dimension"), 0.0);
    assert_eq!(cosine_similarity(&zero, &v).expect("same dimension"), 0.0);
    assert_eq!(cosine_similarity(&zero, &zero).expect("same dimension"), 0.0);
}

#[test]
fn cosine_of_empty_vectors_is_zero() {
    assert_eq!(cosine_similarity(&[], &[]).expect("same dimension"), 0.0);
}

#[test]
fn cosine_rejects_dimension_mismatch() {
    let result = cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]);
    assert!(matches!(
        result,
        Err(MemoryError::DimensionMismatch { left: 2, right: 3 })
    ));
}

#[test]
fn euclidean_distance_properties() {
    let a = [1.0, 2.0, 3.0];
    let b = [4.0, 6.0, 3.0];

    assert_eq!(euclidean_distance(&a, &a).expect("same dimension"), 0.0);
    assert_close(euclidean_distance(&a, &b).expect("same dimension"), 5.0);
    assert_close(
        euclidean_distance(&b, &a).expect("same dimension"),
        euclidean_distance(&a, &b).expect("same dimension"),
    );
    assert!(euclidean_distance(&a, &[1.0, 2.0, 3.0001]).expect("same dimension") > 0.0);
}

#[test]
fn euclidean_distance_rejects_dimension_mismatch() {
    assert!(matches!(
        euclidean_distance(&[1.0], &[1.0, 2.0]),
        Err(MemoryError::DimensionMismatch { .. })
    ));
}

#[test]
fn normalize_produces_unit_vector() {
    let normalized = normalize(&[3.0, 4.0]);
    assert_close(normalized[0], 0.6);
    assert_close(normalized[1], 0.8);
}

#[test]
fn normalize_zero_vector_stays_zero() {
    assert_eq!(normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
}

#[test]
fn average_of_vectors() {
    let avg = average_vectors(&[vec![1.0, 2.0], vec![3.0, 6.0]]).expect("same dimension");
    assert_eq!(avg, vec![2.0, 4.0]);

    assert!(average_vectors(&[]).expect("empty input").is_empty());
    assert!(matches!(
        average_vectors(&[vec![1.0], vec![1.0, 2.0]]),
        Err(MemoryError::DimensionMismatch { .. })
    ));
}

#[test]
fn quantize_keeps_values_within_precision() {
    let v = [0.12345, -0.5, 0.99, 0.0];
    let q8 = quantize_vector(&v, 8).expect("8 bits supported");
    let q16 = quantize_vector(&v, 16).expect("16 bits supported");

    for ((original, coarse), fine) in v.iter().zip(&q8).zip(&q16) {
        assert!((original - coarse).abs() <= 0.99 / 127.0);
        assert!((original - fine).abs() <= 0.99 / 32767.0);
    }
}

#[test]
fn quantize_rejects_unsupported_widths() {
    assert!(matches!(
        quantize_vector(&[1.0], 4),
        Err(MemoryError::InvalidArgument(_))
    ));
    assert!(matches!(
        quantize_vector(&[1.0], 32),
        Err(MemoryError::InvalidArgument(_))
    ));
}

#[test]
fn quantize_zero_vector_is_unchanged() {
    let q = quantize_vector(&[0.0, 0.0], 8).expect("8 bits supported");
    assert_eq!(q, vec![0.0, 0.0]);
}

#[test]
fn sparsity_counts_small_components() {
    assert_close(calculate_sparsity(&[0.0, 0.005, 0.5, 1.0], None), 0.5);
    assert_close(calculate_sparsity(&[0.05, 0.2], Some(0.1)), 0.5);
    assert_eq!(calculate_sparsity(&[], None), 0.0);
}

#[test]
fn ranking_orders_by_descending_score() {
    let query = [1.0, 0.0];
    let close = [0.9, 0.1];
    let far = [0.0, 1.0];
    let opposite = [-1.0, 0.0];

    let candidates = vec![
        Candidate { vector: &far, payload: "far" },
        Candidate { vector: &opposite, payload: "opposite" },
        Candidate { vector: &close, payload: "close" },
    ];

    let ranked = rank_by_similarity(&query, candidates, 10).expect("same dimension");
    let order: Vec<&str> = ranked.iter().map(|r| r.payload).collect();
    assert_eq!(order, vec!["close", "far", "opposite"]);
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn ranking_breaks_ties_by_input_order() {
    let query = [1.0, 0.0];
    // A and B score identically, C scores lower
    let a = [0.8, 0.6];
    let b = [0.8, 0.6];
    let c = [0.5, 0.866_025_4];

    let candidates = vec![
        Candidate { vector: &a, payload: "A" },
        Candidate { vector: &b, payload: "B" },
        Candidate { vector: &c, payload: "C" },
    ];

    let ranked = rank_by_similarity(&query, candidates, 2).expect("same dimension");
    let order: Vec<&str> = ranked.iter().map(|r| r.payload).collect();
    assert_eq!(order, vec!["A", "B"]);
    assert_close(ranked[0].score, 0.8);
}

#[test]
fn ranking_returns_at_most_top_k() {
    let query = [1.0, 1.0];
    let vectors: Vec<[f32; 2]> = (0..5).map(|i| [i as f32, 1.0]).collect();
    let candidates: Vec<_> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| Candidate { vector: v, payload: i })
        .collect();

    assert_eq!(
        rank_by_similarity(&query, candidates.clone(), 3)
            .expect("same dimension")
            .len(),
        3
    );
    assert_eq!(
        rank_by_similarity(&query, candidates, 50)
            .expect("same dimension")
            .len(),
        5
    );
}

#[test]
fn ranking_propagates_dimension_mismatch() {
    let query = [1.0, 0.0];
    let good = [1.0, 0.0];
    let bad = [1.0, 0.0, 0.0];
    let candidates = vec![
        Candidate { vector: &good, payload: 0 },
        Candidate { vector: &bad, payload: 1 },
    ];

    assert!(matches!(
        rank_by_similarity(&query, candidates, 5),
        Err(MemoryError::DimensionMismatch { .. })
    ));
}
