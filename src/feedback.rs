use std::collections::HashMap;

use once_cell::sync::Lazy;
use strum::{EnumIter, IntoEnumIterator};

use crate::error::FeedbackError;

/// Five-face thumbs scale offered after each answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum FaceScore {
    Delighted,
    Happy,
    Neutral,
    Unhappy,
    Upset,
}

impl FaceScore {
    pub fn symbol(self) -> &'static str {
        match self {
            FaceScore::Delighted => "😀",
            FaceScore::Happy => "🙂",
            FaceScore::Neutral => "😐",
            FaceScore::Unhappy => "🙁",
            FaceScore::Upset => "😞",
        }
    }

    pub fn score(self) -> f64 {
        match self {
            FaceScore::Delighted => 1.0,
            FaceScore::Happy => 0.75,
            FaceScore::Neutral => 0.5,
            FaceScore::Unhappy => 0.25,
            FaceScore::Upset => 0.0,
        }
    }

    /// Label stored alongside the score
    pub fn label(self) -> String {
        format!("FACES: {}", self.symbol())
    }

    /// 1 is the best face, 5 the worst, matching the order they are shown in
    pub fn from_index(index: usize) -> Option<Self> {
        index.checked_sub(1).and_then(|i| FaceScore::iter().nth(i))
    }

    /// Accept either a face symbol or its 1-5 position.
    pub fn parse(input: &str) -> Result<Self, FeedbackError> {
        let input = input.trim();
        if let Ok(index) = input.parse::<usize>() {
            return Self::from_index(index).ok_or_else(|| FeedbackError::UnmappedScore(input.to_string()));
        }
        FACES_BY_SYMBOL
            .get(input)
            .copied()
            .ok_or_else(|| FeedbackError::UnmappedScore(input.to_string()))
    }
}

static FACES_BY_SYMBOL: Lazy<HashMap<&'static str, FaceScore>> =
    Lazy::new(|| FaceScore::iter().map(|face| (face.symbol(), face)).collect());

/// Numeric score for a face symbol
pub fn score_for_symbol(symbol: &str) -> Result<f64, FeedbackError> {
    FACES_BY_SYMBOL
        .get(symbol)
        .map(|face| face.score())
        .ok_or_else(|| FeedbackError::UnmappedScore(symbol.to_string()))
}
