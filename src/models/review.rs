use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const MAX_COMMENT_LEN: usize = 2_000;

/// Reader review of an approved paper, one per (paper, reviewer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub paper_id: String,
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateReviewRequest {
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateReviewRequest {
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ReviewResponse {
    pub id: String,
    pub paper_id: String,
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        ReviewResponse {
            id: review.id.map(|id| id.to_hex()).unwrap_or_default(),
            paper_id: review.paper_id,
            reviewer_id: review.reviewer_id,
            reviewer_name: review.reviewer_name,
            rating: review.rating,
            comment: review.comment,
            created_at: review.created_at,
            updated_at: review.updated_at,
        }
    }
}

pub fn validate_rating(rating: i32) -> Result<(), String> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err(format!("Rating must be between 1 and 5, got {}", rating))
    }
}

pub fn validate_comment(comment: &str) -> Result<(), String> {
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(format!("Comment must be at most {} characters", MAX_COMMENT_LEN));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn test_comment_length_counts_chars() {
        let long_ascii = "a".repeat(MAX_COMMENT_LEN + 1);
        assert!(validate_comment(&long_ascii).is_err());
        // multi-byte chars count once each
        let accented = "é".repeat(MAX_COMMENT_LEN);
        assert!(validate_comment(&accented).is_ok());
    }
}
