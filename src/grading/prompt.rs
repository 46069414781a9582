// src/grading/prompt.rs

//! Grading instruction construction and tolerant parsing of the oracle's reply.

use std::sync::LazyLock;

use regex::Regex;

use crate::grading::{Grade, GradeRequest, GradeSource, fallback::proportion_of};

/// Confidence substituted when the oracle's numbers fail validation.
pub const FALLBACK_CONFIDENCE: i32 = 50;

const MISSING_FEEDBACK: &str = "The grader did not provide written feedback.";

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s>*#_\-]*(feedback|score|confidence|keywords|suggestions)[\s*_]*[:=][\s*_]*(.*)$")
        .expect("static pattern")
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("static pattern"));

/// Builds the instruction sent to the oracle for one answer.
///
/// The rubric is expressed in points so the oracle answers on the question's own scale.
pub fn build_grading_prompt(req: &GradeRequest<'_>) -> String {
    let max = req.max_points;
    let band = |ratio: f64| proportion_of(max, ratio);

    let comparison = match req.reference {
        Some(reference) if !reference.trim().is_empty() => format!(
            "Compare the student's answer against this reference answer. The student does not need \
             to match its wording, only its meaning.\nReference answer: {}\n",
            reference.trim()
        ),
        _ => "No reference answer is available. Assess whether the student demonstrates a general \
              understanding of the topic the question asks about.\n"
            .to_string(),
    };

    format!(
        "You are grading a student's short answer.\n\n\
         Question: {question}\n\
         Student answer: {answer}\n\n\
         {comparison}\n\
         Scoring rubric (maximum {max} points):\n\
         - {max} points (100%): complete, accurate and well explained.\n\
         - {p80} points (80%): mostly correct with minor gaps.\n\
         - {p60} points (60%): partially correct, key ideas present but incomplete.\n\
         - {p40} points (40%): limited understanding with significant errors.\n\
         - fewer than {p40} points (below 40%): mostly incorrect but with some relevant content.\n\
         - 0 points (0%): blank, irrelevant or entirely incorrect.\n\n\
         Respond using exactly these labeled lines:\n\
         FEEDBACK: <one or two sentences addressed to the student>\n\
         SCORE: <whole number from 0 to {max}>\n\
         CONFIDENCE: <whole number from 0 to 100>\n\
         KEYWORDS: <comma-separated key concepts found in the answer>\n\
         SUGGESTIONS: <semicolon-separated ways to improve>\n",
        question = req.question.trim(),
        answer = req.answer.trim(),
        comparison = comparison,
        max = max,
        p80 = band(0.8),
        p60 = band(0.6),
        p40 = band(0.4),
    )
}

/// Labeled fields recovered from an oracle reply.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedReply {
    pub feedback: Option<String>,
    pub score: Option<f64>,
    pub confidence: Option<f64>,
    pub keywords: Vec<String>,
    pub suggestions: Vec<String>,
}

enum Field {
    Feedback,
    Score,
    Confidence,
    Keywords,
    Suggestions,
}

/// Parses a free-text reply. Returns `None` when no feedback, score or confidence
/// label can be found at all.
pub fn parse_reply(text: &str) -> Option<ParsedReply> {
    let mut feedback: Vec<String> = Vec::new();
    let mut keywords = String::new();
    let mut suggestions = String::new();
    let mut score_text: Option<String> = None;
    let mut confidence_text: Option<String> = None;
    let mut current: Option<Field> = None;
    let mut seen_core = false;

    for line in text.lines() {
        if let Some(caps) = LABEL.captures(line) {
            let value = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
            let field = match caps[1].to_ascii_lowercase().as_str() {
                "feedback" => Field::Feedback,
                "score" => Field::Score,
                "confidence" => Field::Confidence,
                "keywords" => Field::Keywords,
                _ => Field::Suggestions,
            };
            match field {
                Field::Feedback => {
                    seen_core = true;
                    if !value.is_empty() {
                        feedback.push(value);
                    }
                }
                Field::Score => {
                    seen_core = true;
                    score_text.get_or_insert(value);
                }
                Field::Confidence => {
                    seen_core = true;
                    confidence_text.get_or_insert(value);
                }
                Field::Keywords => keywords.push_str(&value),
                Field::Suggestions => suggestions.push_str(&value),
            }
            current = Some(field);
            continue;
        }

        // Continuation lines belong to the last free-text field.
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match current {
            Some(Field::Feedback) => feedback.push(line.to_string()),
            Some(Field::Suggestions) => {
                suggestions.push(';');
                suggestions.push_str(line.trim_start_matches(['-', '*', ' ']));
            }
            _ => {}
        }
    }

    if !seen_core {
        return None;
    }

    Some(ParsedReply {
        feedback: (!feedback.is_empty()).then(|| feedback.join(" ")),
        score: score_text.as_deref().and_then(first_number),
        confidence: confidence_text.as_deref().and_then(first_number),
        keywords: split_list(&keywords, ','),
        suggestions: split_list(&suggestions, ';'),
    })
}

fn first_number(text: &str) -> Option<f64> {
    NUMBER.find(text).and_then(|m| m.as_str().parse().ok())
}

fn split_list(text: &str, sep: char) -> Vec<String> {
    text.split(sep)
        .map(|s| s.trim().trim_end_matches('.').trim())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
        .map(str::to_string)
        .collect()
}

/// Turns a parsed reply into a bounded grade.
///
/// A missing score counts as 0. An out-of-range score is clamped, and any
/// invalid or missing confidence is replaced with [`FALLBACK_CONFIDENCE`].
/// The second value is true when anything had to be corrected.
pub fn finalize(reply: ParsedReply, max_points: i32) -> (Grade, bool) {
    let max = max_points.max(0);
    let mut corrected = false;

    let raw_score = match reply.score {
        Some(score) => score.round(),
        None => {
            corrected = true;
            0.0
        }
    };
    let mut confidence = match reply.confidence {
        Some(c) if (0.0..=100.0).contains(&c) => c.round() as i32,
        _ => {
            corrected = true;
            FALLBACK_CONFIDENCE
        }
    };

    let score = if raw_score < 0.0 || raw_score > max as f64 {
        corrected = true;
        confidence = FALLBACK_CONFIDENCE;
        raw_score.clamp(0.0, max as f64) as i32
    } else {
        raw_score as i32
    };

    let grade = Grade {
        score,
        rationale: reply
            .feedback
            .unwrap_or_else(|| MISSING_FEEDBACK.to_string()),
        confidence,
        keywords: reply.keywords,
        suggestions: reply.suggestions,
        source: GradeSource::Oracle,
    };
    (grade, corrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(reference: Option<&'static str>) -> GradeRequest<'static> {
        GradeRequest {
            question: "What is photosynthesis?",
            answer: "plants make food from sunlight",
            reference,
            max_points: 5,
        }
    }

    #[test]
    fn test_prompt_includes_rubric_bands() {
        let prompt = build_grading_prompt(&request(None));
        assert!(prompt.contains("maximum 5 points"));
        assert!(prompt.contains("- 4 points (80%)"));
        assert!(prompt.contains("- 3 points (60%)"));
        assert!(prompt.contains("- 2 points (40%)"));
        assert!(prompt.contains("general understanding"));
        assert!(!prompt.contains("Reference answer"));
    }

    #[test]
    fn test_prompt_uses_reference_answer() {
        let prompt = build_grading_prompt(&request(Some("conversion of light to chemical energy")));
        assert!(prompt.contains("Reference answer: conversion of light to chemical energy"));
    }

    #[test]
    fn test_parse_well_formed_reply() {
        let reply = "FEEDBACK: Good grasp of the basics.\nSCORE: 3\nCONFIDENCE: 85\nKEYWORDS: sunlight, food\nSUGGESTIONS: mention chlorophyll; mention glucose";
        let parsed = parse_reply(reply).unwrap();
        assert_eq!(parsed.feedback.as_deref(), Some("Good grasp of the basics."));
        assert_eq!(parsed.score, Some(3.0));
        assert_eq!(parsed.confidence, Some(85.0));
        assert_eq!(parsed.keywords, vec!["sunlight", "food"]);
        assert_eq!(parsed.suggestions, vec!["mention chlorophyll", "mention glucose"]);
    }

    #[test]
    fn test_parse_markdown_and_multiline_feedback() {
        let reply = "**Feedback:** The answer is on topic\nbut lacks detail.\n**Score**: 2/5\n**Confidence:** 70%";
        let parsed = parse_reply(reply).unwrap();
        assert_eq!(
            parsed.feedback.as_deref(),
            Some("The answer is on topic but lacks detail.")
        );
        assert_eq!(parsed.score, Some(2.0));
        assert_eq!(parsed.confidence, Some(70.0));
    }

    #[test]
    fn test_parse_without_labels_fails() {
        assert_eq!(parse_reply("I think this deserves three points."), None);
        assert_eq!(parse_reply(""), None);
    }

    #[test]
    fn test_missing_score_defaults_to_zero() {
        let parsed = parse_reply("FEEDBACK: hard to tell\nCONFIDENCE: 60").unwrap();
        let (grade, corrected) = finalize(parsed, 4);
        assert_eq!(grade.score, 0);
        assert_eq!(grade.confidence, 60);
        assert!(corrected);
    }

    #[test]
    fn test_out_of_range_values_are_corrected() {
        let parsed = parse_reply("FEEDBACK: great\nSCORE: 12\nCONFIDENCE: 95").unwrap();
        let (grade, corrected) = finalize(parsed, 4);
        assert_eq!(grade.score, 4);
        assert_eq!(grade.confidence, FALLBACK_CONFIDENCE);
        assert!(corrected);

        let parsed = parse_reply("SCORE: -3\nCONFIDENCE: 250").unwrap();
        let (grade, _) = finalize(parsed, 4);
        assert_eq!(grade.score, 0);
        assert_eq!(grade.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(grade.rationale, MISSING_FEEDBACK);
    }

    #[test]
    fn test_garbled_replies_stay_in_bounds() {
        let garbled = [
            "SCORE: 999999999999",
            "score = -0.5\nconfidence = 101",
            "Feedback: ok\nScore: abc\nConfidence: ?",
            "### SCORE: 3.7\nCONFIDENCE: 99.6",
            "score:\nconfidence:\nfeedback:",
            "SCORE: 1e9",
            "\u{0}\u{1}SCORE:\t7 points",
        ];
        for max in 1..=20 {
            for text in garbled {
                if let Some(parsed) = parse_reply(text) {
                    let (grade, _) = finalize(parsed, max);
                    assert!((0..=max).contains(&grade.score), "{text:?} max {max}");
                    assert!((0..=100).contains(&grade.confidence), "{text:?}");
                }
            }
        }
    }
}
