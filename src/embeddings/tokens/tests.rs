use super::*;

#[test]
fn estimate_tokens_by_script() {
    assert_eq!(estimate_tokens(""), 0);
    assert_eq!(estimate_tokens("你好"), 2);
    // two words at 1.3 plus one space at 0.5
    assert_eq!(estimate_tokens("hello world"), 4);
    assert_eq!(estimate_tokens("!"), 1);
}

#[test]
fn estimate_tokens_mixed_row_text() {
    // 5 ideographs, 3 words, a digit and a full-width colon
    assert_eq!(estimate_tokens("表格Characters第0行：Name是Alice"), 10);
}

#[test]
fn estimate_tokens_weights_sum_exactly() {
    // ten words would drift above 13.0 with floating point arithmetic
    let text = "a b c d e f g h i j";
    assert_eq!(estimate_tokens(text), 18);
}

#[test]
fn cost_estimate_sums_all_texts() {
    let texts = ["hello world", "你好"];
    let estimate = estimate_cost(&texts, 2.0);

    assert_eq!(estimate.total_texts, 2);
    assert_eq!(estimate.total_tokens, 6);
    assert!((estimate.estimated_cost - 0.000_012).abs() < 1e-12);
    assert_eq!(estimate.currency, "USD");
}

#[test]
fn cost_estimate_of_nothing() {
    let texts: [String; 0] = [];
    let estimate = estimate_cost(&texts, 1.0);
    assert_eq!(estimate.total_tokens, 0);
    assert_eq!(estimate.estimated_cost, 0.0);
}

#[test]
fn words_are_runs_of_ascii_letters() {
    // "don" and "t" at 1.3 each plus the apostrophe at 0.5
    assert_eq!(estimate_tokens("don't"), 4);
    // digits split words too
    assert_eq!(estimate_tokens("x1y"), 4);
    // non-ASCII letters fall in the 0.5 bucket and split the word
    assert_eq!(estimate_tokens("naïve"), 4);
}
