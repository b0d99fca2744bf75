use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthUser, MaybeUser};
use crate::db::{DbConnection, DbPool};
use crate::error::{ApiError, ApiResult};
use crate::models::reaction::{NewReaction, Reaction, ReactionCount, ReactionType};
use crate::schema::{posts, reactions};

#[derive(Debug, Deserialize)]
pub struct ReactionInput {
    pub post_id: Uuid,
    pub reaction_type: String,
}

#[derive(Debug, Deserialize)]
pub struct PopularQuery {
    pub post_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ToggleOutcome {
    pub message: String,
    pub action: &'static str,
    pub reaction_counts: Vec<ReactionCount>,
    pub user_reactions: Vec<String>,
    pub total_reactions: i64,
}

#[derive(Debug, Serialize)]
pub struct ReactionAnalytics {
    pub total_reactions: i64,
    pub recent_reactions: i64,
    pub reactions_by_type: Vec<ReactionCount>,
}

#[derive(Debug, Serialize)]
pub struct PostReactions {
    pub reaction_counts: Vec<ReactionCount>,
    pub user_reactions: Vec<String>,
    pub total_reactions: i64,
}

async fn ensure_post_exists(conn: &mut DbConnection, post_id: Uuid) -> ApiResult<()> {
    let found: i64 = posts::table
        .filter(posts::id.eq(post_id))
        .count()
        .get_result(conn)
        .await?;
    if found == 0 {
        return Err(ApiError::not_found("Post not found"));
    }
    Ok(())
}

/// Per-kind counts for a post, descending by count
async fn reaction_counts(
    conn: &mut DbConnection,
    post_id: Uuid,
    user_kinds: &[String],
) -> ApiResult<Vec<ReactionCount>> {
    let rows: Vec<(String, i64)> = reactions::table
        .filter(reactions::post_id.eq(post_id))
        .group_by(reactions::reaction_type)
        .select((reactions::reaction_type, count_star()))
        .order(count_star().desc())
        .load(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(kind, count)| ReactionCount {
            emoji: ReactionType::parse(&kind).map(|k| k.emoji()).unwrap_or(""),
            user_reacted: user_kinds.contains(&kind),
            reaction_type: kind,
            count,
        })
        .collect())
}

/// Kinds the given user has applied to the given post
async fn user_reaction_kinds(
    conn: &mut DbConnection,
    post_id: Uuid,
    user_id: Uuid,
) -> ApiResult<Vec<String>> {
    Ok(reactions::table
        .filter(reactions::post_id.eq(post_id))
        .filter(reactions::user_id.eq(user_id))
        .select(reactions::reaction_type)
        .load(conn)
        .await?)
}

/// Toggle a reaction: delete it when present, insert it when absent.
/// Toggling twice restores the original ledger state.
pub async fn toggle_reaction(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Json(input): Json<ReactionInput>,
) -> ApiResult<Json<ToggleOutcome>> {
    let kind = ReactionType::parse(&input.reaction_type)
        .ok_or_else(|| ApiError::validation("Unknown reaction type"))?;

    let mut conn = db_pool.get().await?;
    ensure_post_exists(&mut conn, input.post_id).await?;

    let user_id = user.id;
    let post_id = input.post_id;
    let action = conn
        .transaction::<&'static str, ApiError, _>(|conn| {
            async move {
                let deleted = diesel::delete(
                    reactions::table
                        .filter(reactions::post_id.eq(post_id))
                        .filter(reactions::user_id.eq(user_id))
                        .filter(reactions::reaction_type.eq(kind.as_str())),
                )
                .execute(conn)
                .await?;

                if deleted > 0 {
                    return Ok("removed");
                }

                // Lost races against a concurrent identical toggle
                // resolve to the row existing, which is what "added"
                // reports anyway
                diesel::insert_into(reactions::table)
                    .values(&NewReaction::new(post_id, user_id, kind, Utc::now()))
                    .on_conflict_do_nothing()
                    .execute(conn)
                    .await?;

                Ok("added")
            }
            .scope_boxed()
        })
        .await?;

    let user_kinds = user_reaction_kinds(&mut conn, post_id, user_id).await?;
    let reaction_counts = reaction_counts(&mut conn, post_id, &user_kinds).await?;
    let total_reactions = reaction_counts.iter().map(|c| c.count).sum();

    Ok(Json(ToggleOutcome {
        message: format!("Reaction {}", action),
        action,
        reaction_counts,
        user_reactions: user_kinds,
        total_reactions,
    }))
}

/// Directly create a reaction; duplicates are a validation failure
pub async fn create_reaction(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Json(input): Json<ReactionInput>,
) -> ApiResult<(StatusCode, Json<Reaction>)> {
    let kind = ReactionType::parse(&input.reaction_type)
        .ok_or_else(|| ApiError::validation("Unknown reaction type"))?;

    let mut conn = db_pool.get().await?;
    ensure_post_exists(&mut conn, input.post_id).await?;

    let reaction = diesel::insert_into(reactions::table)
        .values(&NewReaction::new(input.post_id, user.id, kind, Utc::now()))
        .get_result::<Reaction>(&mut conn)
        .await
        .map_err(|e| {
            if ApiError::is_unique_violation(&e) {
                ApiError::validation("You have already reacted with that reaction")
            } else {
                ApiError::Database(e)
            }
        })?;

    Ok((StatusCode::CREATED, Json(reaction)))
}

/// Reaction aggregates for a post, with the caller's own kinds marked
pub async fn post_reactions(
    State(db_pool): State<DbPool>,
    caller: MaybeUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<PostReactions>> {
    let mut conn = db_pool.get().await?;
    ensure_post_exists(&mut conn, post_id).await?;

    let user_kinds = match caller.0 {
        Some(user) => user_reaction_kinds(&mut conn, post_id, user.id).await?,
        None => Vec::new(),
    };
    let reaction_counts = reaction_counts(&mut conn, post_id, &user_kinds).await?;
    let total_reactions = reaction_counts.iter().map(|c| c.count).sum();

    Ok(Json(PostReactions {
        reaction_counts,
        user_reactions: user_kinds,
        total_reactions,
    }))
}

/// The signed-in caller's reactions across all posts
pub async fn my_reactions(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<Reaction>>> {
    let mut conn = db_pool.get().await?;
    let rows = reactions::table
        .filter(reactions::user_id.eq(user.id))
        .order(reactions::created_at.desc())
        .load::<Reaction>(&mut conn)
        .await?;

    Ok(Json(rows))
}

/// Ledger-wide reaction analytics (staff only): totals, the trailing
/// 30-day count, and per-kind counts.
pub async fn reaction_analytics(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<ReactionAnalytics>> {
    if !user.is_staff {
        return Err(ApiError::permission("Only staff can view reaction analytics"));
    }

    let mut conn = db_pool.get().await?;
    let now = Utc::now();

    let total_reactions: i64 = reactions::table.count().get_result(&mut conn).await?;

    let recent_reactions: i64 = reactions::table
        .filter(reactions::created_at.ge(now - Duration::days(30)))
        .count()
        .get_result(&mut conn)
        .await?;

    let rows: Vec<(String, i64)> = reactions::table
        .group_by(reactions::reaction_type)
        .select((reactions::reaction_type, count_star()))
        .order(count_star().desc())
        .load(&mut conn)
        .await?;

    let reactions_by_type = rows
        .into_iter()
        .map(|(kind, count)| ReactionCount {
            emoji: ReactionType::parse(&kind).map(|k| k.emoji()).unwrap_or(""),
            user_reacted: false,
            reaction_type: kind,
            count,
        })
        .collect();

    Ok(Json(ReactionAnalytics {
        total_reactions,
        recent_reactions,
        reactions_by_type,
    }))
}

/// Most popular reaction kinds, per post or across all posts
pub async fn popular_reactions(
    State(db_pool): State<DbPool>,
    Query(query): Query<PopularQuery>,
) -> ApiResult<Json<Vec<ReactionCount>>> {
    let limit = query.limit.unwrap_or(5).clamp(1, 20);
    let mut conn = db_pool.get().await?;

    let rows: Vec<(String, i64)> = match query.post_id {
        Some(post_id) => {
            ensure_post_exists(&mut conn, post_id).await?;
            reactions::table
                .filter(reactions::post_id.eq(post_id))
                .group_by(reactions::reaction_type)
                .select((reactions::reaction_type, count_star()))
                .order(count_star().desc())
                .limit(limit)
                .load(&mut conn)
                .await?
        }
        None => {
            reactions::table
                .group_by(reactions::reaction_type)
                .select((reactions::reaction_type, count_star()))
                .order(count_star().desc())
                .limit(limit)
                .load(&mut conn)
                .await?
        }
    };

    Ok(Json(
        rows.into_iter()
            .map(|(kind, count)| ReactionCount {
                emoji: ReactionType::parse(&kind).map(|k| k.emoji()).unwrap_or(""),
                user_reacted: false,
                reaction_type: kind,
                count,
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analytics_payload_reports_kind_breakdown() {
        let analytics = ReactionAnalytics {
            total_reactions: 12,
            recent_reactions: 4,
            reactions_by_type: vec![ReactionCount {
                reaction_type: "fire".to_string(),
                emoji: ReactionType::Fire.emoji(),
                count: 7,
                user_reacted: false,
            }],
        };

        let json = serde_json::to_value(&analytics).unwrap();
        assert_eq!(json["total_reactions"], 12);
        assert_eq!(json["recent_reactions"], 4);
        assert_eq!(json["reactions_by_type"][0]["reaction_type"], "fire");
        assert_eq!(json["reactions_by_type"][0]["count"], 7);
    }
}
