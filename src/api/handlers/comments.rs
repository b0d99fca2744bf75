use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::PaginationParams;
use crate::auth::{AuthUser, MaybeUser, Viewer};
use crate::db::DbPool;
use crate::error::{ApiError, ApiResult};
use crate::models::comment::{
    build_comment_tree, comment_visible, is_valid_transition, Comment, CommentNode, CommentStatus,
    NewComment,
};
use crate::models::post::Post;
use crate::models::user::{User, UserSummary};
use crate::schema::{comments, posts, users};

/// Flat comment shape for the non-tree listings
#[derive(Debug, Serialize)]
pub struct CommentPayload {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: UserSummary,
}

#[derive(Debug, Deserialize)]
pub struct CreateComment {
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateComment {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ModerateComment {
    pub status: String,
}

/// Top-level comments for a post with their reply subtrees attached,
/// filtered by the caller's visibility.
pub async fn comments_for_post(
    State(db_pool): State<DbPool>,
    caller: MaybeUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<Vec<CommentNode>>> {
    let viewer = caller.viewer();
    let mut conn = db_pool.get().await?;

    let post = posts::table
        .find(post_id)
        .first::<Post>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    // Comments on a hidden post are hidden with it
    let now = Utc::now();
    let post_hidden = match viewer {
        Viewer::Anonymous => !post.is_published(now),
        Viewer::User { is_staff: true, .. } => false,
        Viewer::User { id, .. } => !post.is_published(now) && post.author_id != id,
    };
    if post_hidden {
        return Err(ApiError::not_found("Post not found"));
    }

    let rows: Vec<(Comment, User)> = comments::table
        .inner_join(users::table)
        .filter(comments::post_id.eq(post_id))
        .order(comments::created_at.asc())
        .select((Comment::as_select(), User::as_select()))
        .load(&mut conn)
        .await?;

    let rows = rows
        .into_iter()
        .map(|(comment, author)| (comment, author.summary()))
        .collect();

    Ok(Json(build_comment_tree(rows, &viewer)))
}

/// Direct replies to one comment, filtered by the caller's visibility
pub async fn comment_replies(
    State(db_pool): State<DbPool>,
    caller: MaybeUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<CommentPayload>>> {
    let viewer = caller.viewer();
    let mut conn = db_pool.get().await?;

    let parent_exists: i64 = comments::table
        .filter(comments::id.eq(id))
        .count()
        .get_result(&mut conn)
        .await?;
    if parent_exists == 0 {
        return Err(ApiError::not_found("Comment not found"));
    }

    let rows: Vec<(Comment, User)> = comments::table
        .inner_join(users::table)
        .filter(comments::parent_id.eq(id))
        .order(comments::created_at.asc())
        .select((Comment::as_select(), User::as_select()))
        .load(&mut conn)
        .await?;

    Ok(Json(
        rows.into_iter()
            .filter(|(comment, _)| comment_visible(&viewer, comment))
            .map(|(comment, author)| CommentPayload {
                comment,
                author: author.summary(),
            })
            .collect(),
    ))
}

/// Create a comment or a reply
pub async fn create_comment(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Json(input): Json<CreateComment>,
) -> ApiResult<(StatusCode, Json<CommentPayload>)> {
    if input.content.trim().is_empty() {
        return Err(ApiError::validation("Comment content is required"));
    }

    let mut conn = db_pool.get().await?;

    let post_exists: i64 = posts::table
        .filter(posts::id.eq(input.post_id))
        .count()
        .get_result(&mut conn)
        .await?;
    if post_exists == 0 {
        return Err(ApiError::not_found("Post does not exist"));
    }

    if let Some(parent_id) = input.parent_id {
        let parent = comments::table
            .find(parent_id)
            .first::<Comment>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| ApiError::not_found("Parent comment does not exist"))?;

        if !parent.is_approved() {
            return Err(ApiError::validation("Cannot reply to an unapproved comment"));
        }
        if parent.post_id != input.post_id {
            return Err(ApiError::validation(
                "Parent comment belongs to a different post",
            ));
        }
    }

    let new_comment = NewComment::new(
        input.post_id,
        user.id,
        input.parent_id,
        input.content,
        Utc::now(),
    );

    let comment = diesel::insert_into(comments::table)
        .values(&new_comment)
        .get_result::<Comment>(&mut conn)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommentPayload {
            comment,
            author: user.summary(),
        }),
    ))
}

/// Edit a comment's content; only the author may edit, and any edit
/// marks the comment as edited.
pub async fn update_comment(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateComment>,
) -> ApiResult<Json<CommentPayload>> {
    if input.content.trim().is_empty() {
        return Err(ApiError::validation("Comment content is required"));
    }

    let mut conn = db_pool.get().await?;
    let comment = comments::table
        .find(id)
        .first::<Comment>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;

    if comment.author_id != user.id {
        return Err(ApiError::permission("You can only edit your own comments"));
    }

    let updated = diesel::update(comments::table.find(id))
        .set((
            comments::content.eq(input.content),
            comments::is_edited.eq(true),
            comments::updated_at.eq(Utc::now()),
        ))
        .get_result::<Comment>(&mut conn)
        .await?;

    Ok(Json(CommentPayload {
        comment: updated,
        author: user.summary(),
    }))
}

/// Delete a comment (author or staff); descendants cascade with it
pub async fn delete_comment(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut conn = db_pool.get().await?;
    let comment = comments::table
        .find(id)
        .first::<Comment>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;

    if comment.author_id != user.id && !user.is_staff {
        return Err(ApiError::permission("You can only delete your own comments"));
    }

    diesel::delete(comments::table.find(id))
        .execute(&mut conn)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Comment deleted" })))
}

/// Like a comment
pub async fn like_comment(
    State(db_pool): State<DbPool>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Comment>> {
    let mut conn = db_pool.get().await?;
    let comment = diesel::update(comments::table.find(id))
        .set(comments::likes_count.eq(comments::likes_count + 1))
        .get_result::<Comment>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;

    Ok(Json(comment))
}

/// Unlike a comment; the count never goes below zero
pub async fn unlike_comment(
    State(db_pool): State<DbPool>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Comment>> {
    let mut conn = db_pool.get().await?;

    let decremented = diesel::update(
        comments::table
            .filter(comments::id.eq(id))
            .filter(comments::likes_count.gt(0)),
    )
    .set(comments::likes_count.eq(comments::likes_count - 1))
    .get_result::<Comment>(&mut conn)
    .await
    .optional()?;

    // Either the count was already zero or the comment is missing
    let comment = match decremented {
        Some(comment) => comment,
        None => comments::table
            .find(id)
            .first::<Comment>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| ApiError::not_found("Comment not found"))?,
    };

    Ok(Json(comment))
}

/// Moderate a comment (staff only), enforcing the transition table
pub async fn moderate_comment(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ModerateComment>,
) -> ApiResult<Json<Comment>> {
    if !user.is_staff {
        return Err(ApiError::permission("Only staff can moderate comments"));
    }

    let to = CommentStatus::parse(&input.status)
        .ok_or_else(|| ApiError::validation("Unknown comment status"))?;

    let mut conn = db_pool.get().await?;
    let comment = comments::table
        .find(id)
        .first::<Comment>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;

    let from = CommentStatus::parse(&comment.status)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Corrupt comment status")))?;

    if !is_valid_transition(from, to) {
        return Err(ApiError::validation("Invalid status transition"));
    }

    let moderated = diesel::update(comments::table.find(id))
        .set((
            comments::status.eq(to.as_str()),
            comments::updated_at.eq(Utc::now()),
        ))
        .get_result::<Comment>(&mut conn)
        .await?;

    Ok(Json(moderated))
}

/// The signed-in caller's comments, any status
pub async fn my_comments(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<Vec<CommentPayload>>> {
    let mut conn = db_pool.get().await?;
    let rows: Vec<Comment> = comments::table
        .filter(comments::author_id.eq(user.id))
        .order(comments::created_at.asc())
        .limit(page.limit())
        .offset(page.offset())
        .load(&mut conn)
        .await?;

    let author = user.summary();
    Ok(Json(
        rows.into_iter()
            .map(|comment| CommentPayload {
                comment,
                author: author.clone(),
            })
            .collect(),
    ))
}

/// Moderation queue: pending comments (staff only)
pub async fn pending_comments(
    State(db_pool): State<DbPool>,
    caller: AuthUser,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<Vec<CommentPayload>>> {
    status_queue(db_pool, caller, CommentStatus::Pending, page).await
}

/// Moderation queue: spam comments (staff only)
pub async fn spam_comments(
    State(db_pool): State<DbPool>,
    caller: AuthUser,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<Vec<CommentPayload>>> {
    status_queue(db_pool, caller, CommentStatus::Spam, page).await
}

async fn status_queue(
    db_pool: DbPool,
    AuthUser(user): AuthUser,
    status: CommentStatus,
    page: PaginationParams,
) -> ApiResult<Json<Vec<CommentPayload>>> {
    if !user.is_staff {
        return Err(ApiError::permission("Only staff can view moderation queues"));
    }

    let mut conn = db_pool.get().await?;
    let rows: Vec<(Comment, User)> = comments::table
        .inner_join(users::table)
        .filter(comments::status.eq(status.as_str()))
        .order(comments::created_at.asc())
        .limit(page.limit())
        .offset(page.offset())
        .select((Comment::as_select(), User::as_select()))
        .load(&mut conn)
        .await?;

    Ok(Json(
        rows.into_iter()
            .map(|(comment, author)| CommentPayload {
                comment,
                author: author.summary(),
            })
            .collect(),
    ))
}
