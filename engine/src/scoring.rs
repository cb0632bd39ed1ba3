//! Turns a recognition result into a graded verdict.
//!
//! Everything here is pure: no I/O, no clocks, no shared state.

use regex::Regex;
use serde::Serialize;

use crate::difficulty::DifficultyProfile;
use crate::recognizer::{RecognitionResult, WordScore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedbackKind {
    None,
    WrongWord,
    UnclearPronunciation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub is_correct: bool,
    pub similarity: f32,
    /// Confidence of the best-matching recognized word, `None` when no words came back.
    pub confidence: Option<f32>,
    pub feedback: FeedbackKind,
}

/// Lowercases, trims and folds "ё" into "е".
pub fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == 'ё' { 'е' } else { c })
        .collect()
}

/// Position-aligned character match ratio over the longer string's length.
pub fn similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let matches = a.chars().zip(b.chars()).filter(|(x, y)| x == y).count();

    matches as f32 / a_len.max(b_len) as f32
}

/// Both arguments must already be normalized.
pub fn is_exact_match(transcript: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    if transcript == expected || transcript.split_whitespace().any(|token| token == expected) {
        return true;
    }

    match Regex::new(&format!(r"\b{}\b", regex::escape(expected))) {
        Ok(re) => re.is_match(transcript),
        Err(e) => {
            log::warn!("Whole-word pattern for '{expected}' did not compile: {e}");
            false
        }
    }
}

/// The recognized word closest to `expected` (already normalized); first wins ties.
pub fn best_matching_word<'a>(words: &'a [WordScore], expected: &str) -> Option<(&'a WordScore, f32)> {
    words
        .iter()
        .map(|w| (w, similarity(&normalize(&w.word), expected)))
        .fold(None, |best, (word, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((word, score)),
        })
}

pub fn evaluate(
    result: &RecognitionResult,
    expected_word: &str,
    profile: &DifficultyProfile,
) -> Verdict {
    let transcript = normalize(&result.text);
    let expected = normalize(expected_word);

    if expected.is_empty() {
        return Verdict {
            is_correct: false,
            similarity: 0.0,
            confidence: None,
            feedback: FeedbackKind::WrongWord,
        };
    }

    let exact = is_exact_match(&transcript, &expected);
    let best = best_matching_word(&result.words, &expected);

    let similarity = best
        .map(|(_, score)| score)
        .unwrap_or(0.0)
        .max(similarity(&transcript, &expected));
    let confidence = best.map(|(word, _)| word.confidence);

    // The similarity boundary is exclusive: "мама" against "папа" matches on
    // exactly half its letters and must not pass at the easiest level.
    let word_ok = exact || similarity > profile.similarity_threshold;
    let clear = confidence.unwrap_or(0.0) >= profile.confidence_threshold;

    let feedback = if !word_ok {
        FeedbackKind::WrongWord
    } else if !clear {
        FeedbackKind::UnclearPronunciation
    } else {
        FeedbackKind::None
    };

    Verdict {
        is_correct: word_ok && clear,
        similarity,
        confidence,
        feedback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::{profile, DifficultyLevel};

    fn result(text: &str, words: &[(&str, f32)]) -> RecognitionResult {
        RecognitionResult {
            text: text.to_string(),
            words: words
                .iter()
                .enumerate()
                .map(|(i, (word, confidence))| WordScore {
                    word: word.to_string(),
                    confidence: *confidence,
                    start_time: i as f32 * 0.5,
                    end_time: i as f32 * 0.5 + 0.4,
                })
                .collect(),
        }
    }

    #[test]
    fn normalize_folds_yo_and_case() {
        assert_eq!(normalize("  Ёжик "), "ежик");
        assert_eq!(normalize("ВЕРТОЛЁТ"), "вертолет");
    }

    #[test]
    fn similarity_identity_and_empty() {
        for s in ["", "а", "котик", "дерево"] {
            assert_eq!(similarity(s, s), 1.0);
        }
        assert_eq!(similarity("котик", ""), 0.0);
        assert_eq!(similarity("", "котик"), 0.0);
    }

    #[test]
    fn similarity_is_positional() {
        assert_eq!(similarity("мама", "папа"), 0.5);
        // shifted by one letter, nothing lines up
        assert_eq!(similarity("акот", "кот"), 0.0);
        assert_eq!(similarity("кот", "котик"), 0.6);
    }

    #[test]
    fn exact_match_accepts_whole_tokens_only() {
        assert!(is_exact_match("это котик", "котик"));
        assert!(is_exact_match("котик.", "котик"));
        assert!(!is_exact_match("котики", "котик"));
        assert!(!is_exact_match("", ""));
    }

    #[test]
    fn best_word_prefers_first_on_tie() {
        let r = result("мама папа", &[("мама", 0.4), ("папа", 0.9), ("папа", 0.2)]);
        let (word, score) = best_matching_word(&r.words, "папа").unwrap();
        assert_eq!(score, 1.0);
        assert_eq!(word.confidence, 0.9);
    }

    #[test]
    fn correct_word_clearly_spoken() {
        let v = evaluate(
            &result("котик", &[("котик", 0.9)]),
            "котик",
            &profile(DifficultyLevel::Medium),
        );
        assert!(v.is_correct);
        assert_eq!(v.feedback, FeedbackKind::None);
        assert_eq!(v.confidence, Some(0.9));
    }

    #[test]
    fn different_word_is_wrong_at_every_level() {
        for level in DifficultyLevel::ALL {
            let v = evaluate(&result("мама", &[("мама", 0.95)]), "папа", &profile(level));
            assert!(!v.is_correct, "{level} accepted мама for папа");
            assert_eq!(v.feedback, FeedbackKind::WrongWord);
            assert!(v.similarity <= 0.5);
        }
    }

    #[test]
    fn right_word_with_low_confidence_is_unclear() {
        let v = evaluate(
            &result("зебра", &[("зебра", 0.5)]),
            "зебра",
            &profile(DifficultyLevel::Hard),
        );
        assert!(!v.is_correct);
        assert_eq!(v.feedback, FeedbackKind::UnclearPronunciation);
    }

    #[test]
    fn yo_spelling_is_equivalent() {
        let v = evaluate(
            &result("ежик", &[("ежик", 0.8)]),
            "ёжик",
            &profile(DifficultyLevel::Easy),
        );
        assert!(v.is_correct);
    }

    #[test]
    fn no_words_means_zero_confidence() {
        let v = evaluate(&result("котик", &[]), "котик", &profile(DifficultyLevel::Easy));
        assert!(!v.is_correct);
        assert_eq!(v.confidence, None);
        assert_eq!(v.feedback, FeedbackKind::UnclearPronunciation);
    }

    #[test]
    fn empty_expected_word_degrades() {
        let v = evaluate(&result("", &[]), "  ", &profile(DifficultyLevel::Easy));
        assert!(!v.is_correct);
        assert_eq!(v.similarity, 0.0);
    }

    #[test]
    fn close_misrecognition_passes_on_similarity() {
        // "котек" shares 4 of 5 positions with "котик"
        let v = evaluate(
            &result("котек", &[("котек", 0.8)]),
            "котик",
            &profile(DifficultyLevel::Hard),
        );
        assert!((v.similarity - 0.8).abs() < 1e-6);
        assert!(!v.is_correct);
        assert_eq!(v.feedback, FeedbackKind::UnclearPronunciation);

        let v = evaluate(
            &result("котек", &[("котек", 0.9)]),
            "котик",
            &profile(DifficultyLevel::Hard),
        );
        assert!(v.is_correct);
    }

    #[test]
    fn similarity_equal_to_threshold_is_not_enough() {
        // "кот" lines up with 3 of the 5 letters of "котик", exactly medium's 0.6
        let r = result("кот", &[("кот", 0.95)]);
        assert_eq!(similarity("кот", "котик"), 0.6);

        let v = evaluate(&r, "котик", &profile(DifficultyLevel::Medium));
        assert!(!v.is_correct);
        assert_eq!(v.feedback, FeedbackKind::WrongWord);

        let v = evaluate(&r, "котик", &profile(DifficultyLevel::Easy));
        assert!(v.is_correct);
        assert_eq!(v.feedback, FeedbackKind::None);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let r = result("это дерево", &[("это", 0.3), ("дерево", 0.77)]);
        let p = profile(DifficultyLevel::Medium);
        assert_eq!(evaluate(&r, "дерево", &p), evaluate(&r, "дерево", &p));
    }
}
