use crate::{
    database::{MongoDB, PAPERS, REVIEWS},
    models::{
        validate_comment, validate_rating, CreateReviewRequest, PaperStatus, ResearchPaper, Review,
        UpdateReviewRequest,
    },
    services::{auth_service::Claims, now_ts, parse_object_id, payment_service},
    utils::error::{AppError, AppResult},
};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::ReturnDocument;

/// Applies a change to a paper's rating aggregates
pub async fn adjust_rating(db: &MongoDB, paper_id: &str, sum_delta: i64, count_delta: i64) -> AppResult<()> {
    let object_id = match parse_object_id(paper_id) {
        Ok(id) => id,
        Err(_) => {
            log::warn!("⚠️  Review references invalid paper id {}", paper_id);
            return Ok(());
        }
    };
    db.collection::<Document>(PAPERS)
        .update_one(
            doc! { "_id": object_id },
            doc! { "$inc": { "rating_sum": sum_delta, "rating_count": count_delta } },
        )
        .await?;
    Ok(())
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    e.to_string().contains("E11000")
}

pub async fn add_review(
    db: &MongoDB,
    claims: &Claims,
    paper_id: &str,
    request: CreateReviewRequest,
) -> AppResult<Review> {
    validate_rating(request.rating).map_err(AppError::InvalidRequest)?;
    validate_comment(&request.comment).map_err(AppError::InvalidRequest)?;

    let object_id = parse_object_id(paper_id)?;
    let paper = db
        .collection::<ResearchPaper>(PAPERS)
        .find_one(doc! { "_id": object_id, "status": PaperStatus::Approved.as_str() })
        .await?
        .ok_or_else(|| AppError::NotFound("Paper not found".into()))?;

    if paper.author_id == claims.sub {
        return Err(AppError::Forbidden("Authors cannot review their own papers".into()));
    }
    let paper_hex = paper.id_hex();
    if !paper.is_free() && !payment_service::has_purchased(db, &claims.sub, &paper_hex).await? {
        return Err(AppError::Forbidden("Purchase this paper before reviewing it".into()));
    }

    let now = now_ts();
    let mut review = Review {
        id: None,
        paper_id: paper_hex.clone(),
        reviewer_id: claims.sub.clone(),
        reviewer_name: claims.name.clone(),
        rating: request.rating,
        comment: request.comment.trim().to_string(),
        created_at: now,
        updated_at: now,
    };

    // unique (paper_id, reviewer_id) index enforces one review per reader
    let result = db
        .collection::<Review>(REVIEWS)
        .insert_one(&review)
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::Conflict("You have already reviewed this paper".into())
            } else {
                AppError::from(e)
            }
        })?;
    review.id = result.inserted_id.as_object_id();

    adjust_rating(db, &paper_hex, review.rating as i64, 1).await?;
    log::info!("⭐ {} rated paper {} with {}", claims.sub, paper_hex, review.rating);
    Ok(review)
}

async fn find_review(db: &MongoDB, review_id: &str) -> AppResult<Review> {
    let object_id = parse_object_id(review_id)?;
    db.collection::<Review>(REVIEWS)
        .find_one(doc! { "_id": object_id })
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".into()))
}

fn ensure_owner_or_admin(claims: &Claims, review: &Review) -> AppResult<()> {
    if review.reviewer_id == claims.sub || claims.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("You can only change your own reviews".into()))
    }
}

pub async fn update_review(
    db: &MongoDB,
    claims: &Claims,
    review_id: &str,
    request: UpdateReviewRequest,
) -> AppResult<Review> {
    let review = find_review(db, review_id).await?;
    ensure_owner_or_admin(claims, &review)?;

    let mut set = doc! { "updated_at": now_ts() };
    if let Some(rating) = request.rating {
        validate_rating(rating).map_err(AppError::InvalidRequest)?;
        set.insert("rating", rating);
    }
    if let Some(comment) = &request.comment {
        validate_comment(comment).map_err(AppError::InvalidRequest)?;
        set.insert("comment", comment.trim());
    }

    // matching on the old rating keeps the paper aggregate in step with concurrent edits
    let updated = db
        .collection::<Review>(REVIEWS)
        .find_one_and_update(
            doc! { "_id": review.id, "rating": review.rating },
            doc! { "$set": set },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::Conflict("Review was modified concurrently".into()))?;

    let delta = (updated.rating - review.rating) as i64;
    if delta != 0 {
        adjust_rating(db, &updated.paper_id, delta, 0).await?;
    }
    Ok(updated)
}

pub async fn delete_review(db: &MongoDB, claims: &Claims, review_id: &str) -> AppResult<()> {
    let review = find_review(db, review_id).await?;
    ensure_owner_or_admin(claims, &review)?;

    let deleted = db
        .collection::<Review>(REVIEWS)
        .find_one_and_delete(doc! { "_id": review.id })
        .await?;

    if let Some(deleted) = deleted {
        adjust_rating(db, &deleted.paper_id, -(deleted.rating as i64), -1).await?;
        log::info!("🗑️  Review {} deleted by {}", review_id, claims.sub);
    }
    Ok(())
}

pub async fn list_paper_reviews(db: &MongoDB, paper_id: &str) -> AppResult<Vec<Review>> {
    parse_object_id(paper_id)?;
    let cursor = db
        .collection::<Review>(REVIEWS)
        .find(doc! { "paper_id": paper_id.trim() })
        .sort(doc! { "created_at": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

pub async fn list_user_reviews(db: &MongoDB, user_id: &str) -> AppResult<Vec<Review>> {
    let cursor = db
        .collection::<Review>(REVIEWS)
        .find(doc! { "reviewer_id": user_id })
        .sort(doc! { "created_at": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::auth_service::sample_claims;

    fn review_by(reviewer: &str) -> Review {
        Review {
            id: None,
            paper_id: "p".into(),
            reviewer_id: reviewer.into(),
            reviewer_name: reviewer.into(),
            rating: 4,
            comment: String::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_owner_or_admin_may_change_review() {
        let review = review_by("reader");
        assert!(ensure_owner_or_admin(&sample_claims("reader", Role::User), &review).is_ok());
        assert!(ensure_owner_or_admin(&sample_claims("boss", Role::Admin), &review).is_ok());
        assert!(matches!(
            ensure_owner_or_admin(&sample_claims("other", Role::Researcher), &review),
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    #[ignore] // requires a running MongoDB at DATABASE_URL
    async fn test_review_lifecycle_keeps_aggregates() {
        use crate::models::paper::sample_paper;

        let uri = std::env::var("DATABASE_URL").unwrap_or_else(|_| "mongodb://localhost:27017/ScholarShareTest".into());
        let db = MongoDB::new(&uri).await.unwrap();
        let mut paper = sample_paper();
        paper.id = None;
        paper.status = PaperStatus::Approved;
        let inserted = db.collection::<ResearchPaper>(PAPERS).insert_one(&paper).await.unwrap();
        let paper_oid = inserted.inserted_id.as_object_id().unwrap();
        let paper_id = paper_oid.to_hex();
        let reader = sample_claims(&mongodb::bson::oid::ObjectId::new().to_hex(), Role::User);

        let review = add_review(&db, &reader, &paper_id, CreateReviewRequest { rating: 5, comment: "Great".into() })
            .await
            .unwrap();
        let duplicate = add_review(&db, &reader, &paper_id, CreateReviewRequest { rating: 3, comment: String::new() }).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));

        let review_id = review.id.unwrap().to_hex();
        update_review(&db, &reader, &review_id, UpdateReviewRequest { rating: Some(2), comment: None })
            .await
            .unwrap();
        let stored = db.collection::<ResearchPaper>(PAPERS).find_one(doc! { "_id": paper_oid }).await.unwrap().unwrap();
        assert_eq!((stored.rating_sum, stored.rating_count), (2, 1));

        delete_review(&db, &reader, &review_id).await.unwrap();
        let stored = db.collection::<ResearchPaper>(PAPERS).find_one(doc! { "_id": paper_oid }).await.unwrap().unwrap();
        assert_eq!((stored.rating_sum, stored.rating_count), (0, 0));

        db.collection::<ResearchPaper>(PAPERS).delete_one(doc! { "_id": paper_oid }).await.unwrap();
    }
}
