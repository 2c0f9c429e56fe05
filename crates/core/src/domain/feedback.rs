use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::require_non_empty;
use crate::errors::DomainError;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackId(pub i64);

impl fmt::Display for FeedbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Positive,
    Negative,
    Neutral,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            "neutral" => Ok(Self::Neutral),
            other => Err(DomainError::validation(
                "feedback_type",
                format!("`{other}` is not one of positive|negative|neutral"),
            )),
        }
    }
}

/// A reviewer rating, always within `MIN_RATING..=MAX_RATING`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value < i64::from(MIN_RATING) || value > i64::from(MAX_RATING) {
            return Err(DomainError::validation(
                "rating",
                format!("{value} is outside {MIN_RATING}..={MAX_RATING}"),
            ));
        }
        Ok(Self(value as u8))
    }
}

impl TryFrom<i64> for Rating {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for i64 {
    fn from(rating: Rating) -> Self {
        i64::from(rating.0)
    }
}

/// Feedback as submitted, validated but not yet stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFeedback {
    pub student_id: String,
    pub recommendation_id: String,
    pub feedback_type: FeedbackType,
    pub comments: String,
    pub rating: Option<Rating>,
    pub timestamp: DateTime<Utc>,
}

impl NewFeedback {
    pub fn new(
        student_id: &str,
        recommendation_id: &str,
        feedback_type: &str,
        comments: &str,
        rating: Option<i64>,
    ) -> Result<Self, DomainError> {
        let feedback_type = feedback_type.parse::<FeedbackType>()?;
        require_non_empty("student_id", student_id)?;
        require_non_empty("recommendation_id", recommendation_id)?;
        let rating = rating.map(Rating::new).transpose()?;

        Ok(Self {
            student_id: student_id.to_string(),
            recommendation_id: recommendation_id.to_string(),
            feedback_type,
            comments: comments.to_string(),
            rating,
            timestamp: Utc::now(),
        })
    }
}

/// A stored feedback row. `rating` is reported as stored; rows written
/// before ratings were range-checked may hold values outside 1..=5.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: FeedbackId,
    pub student_id: String,
    pub recommendation_id: String,
    pub feedback_type: FeedbackType,
    pub comments: String,
    pub rating: Option<i64>,
    pub timestamp: DateTime<Utc>,
}
