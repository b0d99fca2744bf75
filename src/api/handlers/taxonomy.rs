use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::posts::{load_payloads, PostPayload, PostRow};
use crate::api::PaginationParams;
use crate::auth::AuthUser;
use crate::db::DbPool;
use crate::error::{ApiError, ApiResult};
use crate::models::post::{Post, PostStatus};
use crate::models::taxonomy::{slugify, Category, NewCategory, NewTag, Tag};
use crate::models::user::User;
use crate::schema::{categories, post_tags, posts, tags, users};

#[derive(Debug, Serialize)]
pub struct CategoryPayload {
    #[serde(flatten)]
    pub category: Category,
    pub post_count: i64,
}

#[derive(Debug, Serialize)]
pub struct TagPayload {
    #[serde(flatten)]
    pub tag: Tag,
    pub post_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategory {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTag {
    pub name: String,
    pub slug: Option<String>,
}

/// All categories with their published-post counts, by name
pub async fn list_categories(
    State(db_pool): State<DbPool>,
) -> ApiResult<Json<Vec<CategoryPayload>>> {
    let mut conn = db_pool.get().await?;

    let all: Vec<Category> = categories::table
        .order(categories::name.asc())
        .load(&mut conn)
        .await?;

    let counts: Vec<(Option<Uuid>, i64)> = posts::table
        .filter(posts::status.eq(PostStatus::Published.as_str()))
        .group_by(posts::category_id)
        .select((posts::category_id, count_star()))
        .load(&mut conn)
        .await?;
    let counts: HashMap<Uuid, i64> = counts
        .into_iter()
        .filter_map(|(id, count)| id.map(|id| (id, count)))
        .collect();

    Ok(Json(
        all.into_iter()
            .map(|category| CategoryPayload {
                post_count: counts.get(&category.id).copied().unwrap_or(0),
                category,
            })
            .collect(),
    ))
}

/// Create a category (staff only)
pub async fn create_category(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Json(input): Json<CreateCategory>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    if !user.is_staff {
        return Err(ApiError::permission("Only staff can create categories"));
    }
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("Category name is required"));
    }

    let slug = match input.slug {
        Some(s) if !s.is_empty() => s,
        _ => slugify(&input.name),
    };
    let new_category = NewCategory {
        id: Uuid::new_v4(),
        name: input.name,
        slug,
        description: input.description,
        created_at: Utc::now(),
    };

    let mut conn = db_pool.get().await?;
    let category = diesel::insert_into(categories::table)
        .values(&new_category)
        .get_result::<Category>(&mut conn)
        .await
        .map_err(|e| {
            if ApiError::is_unique_violation(&e) {
                ApiError::validation("A category with that name or slug already exists")
            } else {
                ApiError::Database(e)
            }
        })?;

    Ok((StatusCode::CREATED, Json(category)))
}

/// Published posts in a category
pub async fn category_posts(
    State(db_pool): State<DbPool>,
    Path(slug): Path<String>,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<Vec<PostPayload>>> {
    let mut conn = db_pool.get().await?;

    let category = categories::table
        .filter(categories::slug.eq(&slug))
        .first::<Category>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;

    let now = Utc::now();
    let rows: Vec<PostRow> = posts::table
        .inner_join(users::table)
        .left_join(categories::table)
        .filter(posts::category_id.eq(category.id))
        .filter(posts::status.eq(PostStatus::Published.as_str()))
        .filter(posts::published_at.le(Some(now)))
        .order(posts::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .select((Post::as_select(), User::as_select(), Option::<Category>::as_select()))
        .load(&mut conn)
        .await?;

    Ok(Json(load_payloads(&mut conn, rows).await?))
}

/// All tags with their published-post counts, by name
pub async fn list_tags(State(db_pool): State<DbPool>) -> ApiResult<Json<Vec<TagPayload>>> {
    let mut conn = db_pool.get().await?;

    let all: Vec<Tag> = tags::table.order(tags::name.asc()).load(&mut conn).await?;

    let counts: Vec<(Uuid, i64)> = post_tags::table
        .inner_join(posts::table)
        .filter(posts::status.eq(PostStatus::Published.as_str()))
        .group_by(post_tags::tag_id)
        .select((post_tags::tag_id, count_star()))
        .load(&mut conn)
        .await?;
    let counts: HashMap<Uuid, i64> = counts.into_iter().collect();

    Ok(Json(
        all.into_iter()
            .map(|tag| TagPayload {
                post_count: counts.get(&tag.id).copied().unwrap_or(0),
                tag,
            })
            .collect(),
    ))
}

/// Create a tag (staff only)
pub async fn create_tag(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Json(input): Json<CreateTag>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    if !user.is_staff {
        return Err(ApiError::permission("Only staff can create tags"));
    }
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("Tag name is required"));
    }

    let slug = match input.slug {
        Some(s) if !s.is_empty() => s,
        _ => slugify(&input.name),
    };
    let new_tag = NewTag {
        id: Uuid::new_v4(),
        name: input.name,
        slug,
        created_at: Utc::now(),
    };

    let mut conn = db_pool.get().await?;
    let tag = diesel::insert_into(tags::table)
        .values(&new_tag)
        .get_result::<Tag>(&mut conn)
        .await
        .map_err(|e| {
            if ApiError::is_unique_violation(&e) {
                ApiError::validation("A tag with that name or slug already exists")
            } else {
                ApiError::Database(e)
            }
        })?;

    Ok((StatusCode::CREATED, Json(tag)))
}

/// Published posts carrying a tag
pub async fn tag_posts(
    State(db_pool): State<DbPool>,
    Path(slug): Path<String>,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<Vec<PostPayload>>> {
    let mut conn = db_pool.get().await?;

    let tag = tags::table
        .filter(tags::slug.eq(&slug))
        .first::<Tag>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Tag not found"))?;

    let tagged: Vec<Uuid> = post_tags::table
        .filter(post_tags::tag_id.eq(tag.id))
        .select(post_tags::post_id)
        .load(&mut conn)
        .await?;

    let now = Utc::now();
    let rows: Vec<PostRow> = posts::table
        .inner_join(users::table)
        .left_join(categories::table)
        .filter(posts::id.eq_any(tagged))
        .filter(posts::status.eq(PostStatus::Published.as_str()))
        .filter(posts::published_at.le(Some(now)))
        .order(posts::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .select((Post::as_select(), User::as_select(), Option::<Category>::as_select()))
        .load(&mut conn)
        .await?;

    Ok(Json(load_payloads(&mut conn, rows).await?))
}
