#[cfg(test)]
mod tests;

use serde::Serialize;

// Weights in tenths of a token so the sum stays exact before rounding up
const CJK_WEIGHT: usize = 10;
const WORD_WEIGHT: usize = 13;
const OTHER_WEIGHT: usize = 5;

/// Advisory cost of embedding a set of texts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub total_texts: usize,
    pub total_tokens: usize,
    pub estimated_cost: f64,
    pub currency: &'static str,
}

fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Rough token count: CJK ideographs count 1, Latin words 1.3,
/// everything else 0.5, rounded up.
///
/// A word is a maximal run of ASCII letters, so punctuation and digits split
/// words and are counted on their own: "don't" is two words plus an
/// apostrophe. Whitespace itself counts as 0.5.
#[inline]
pub fn estimate_tokens(text: &str) -> usize {
    let mut cjk = 0;
    let mut words = 0;
    let mut other = 0;
    let mut in_word = false;

    for c in text.chars() {
        if c.is_ascii_alphabetic() {
            if !in_word {
                words += 1;
                in_word = true;
            }
            continue;
        }

        in_word = false;
        if is_cjk_ideograph(c) {
            cjk += 1;
        } else {
            other += 1;
        }
    }

    (cjk * CJK_WEIGHT + words * WORD_WEIGHT + other * OTHER_WEIGHT).div_ceil(10)
}

#[inline]
pub fn estimate_cost<S: AsRef<str>>(texts: &[S], cost_per_million_tokens: f64) -> CostEstimate {
    let total_tokens: usize = texts.iter().map(|t| estimate_tokens(t.as_ref())).sum();

    CostEstimate {
        total_texts: texts.len(),
        total_tokens,
        estimated_cost: total_tokens as f64 / 1_000_000.0 * cost_per_million_tokens,
        currency: "USD",
    }
}
