use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use crate::api::PaginationParams;
use crate::auth::{viewer_context, AuthUser, MaybeUser, Viewer};
use crate::db::{DbConnection, DbPool};
use crate::error::{ApiError, ApiResult};
use crate::models::post::{
    character_count, reading_time, word_count, CreatePost, NewPost, Post, PostStatus, UpdatePost,
};
use crate::models::post_view::{bucket_views_by_day, DailyViewCount, NewPostView, ViewerContext};
use crate::models::taxonomy::{Category, Tag};
use crate::models::user::{User, UserSummary};
use crate::schema::{categories, post_tags, post_views, posts, tags, users};

/// Post as served to API consumers: the row plus its relations and
/// content-derived metrics
#[derive(Debug, Serialize)]
pub struct PostPayload {
    #[serde(flatten)]
    pub post: Post,
    pub author: UserSummary,
    pub category: Option<Category>,
    pub tags: Vec<Tag>,
    pub reading_time: i64,
    pub word_count: usize,
    pub is_published: bool,
}

#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    pub status: Option<String>,
    pub author: Option<Uuid>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub is_featured: Option<bool>,
    pub search: Option<String>,
}

/// Editable columns plus the tag set, which lives in its own table
#[derive(Debug, Deserialize)]
pub struct UpdatePostInput {
    #[serde(flatten)]
    pub changes: UpdatePost,
    pub tag_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct PostAnalytics {
    pub total_views: i32,
    pub unique_views: i64,
    pub recent_views: i64,
    pub reading_time: i64,
    pub word_count: usize,
    pub character_count: usize,
    pub daily_views: Vec<DailyViewCount>,
}

/// Post visibility: anonymous callers see published posts, owners see
/// their own in any state, staff see everything.
fn post_visible(viewer: &Viewer, post: &Post, now: DateTime<Utc>) -> bool {
    match viewer {
        Viewer::Anonymous => post.is_published(now),
        Viewer::User { is_staff: true, .. } => true,
        Viewer::User { id, .. } => post.is_published(now) || post.author_id == *id,
    }
}

pub(crate) type PostRow = (Post, User, Option<Category>);

pub(crate) async fn load_payloads(
    conn: &mut DbConnection,
    rows: Vec<PostRow>,
) -> ApiResult<Vec<PostPayload>> {
    let post_ids: Vec<Uuid> = rows.iter().map(|(post, _, _)| post.id).collect();

    let mut tags_by_post: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    if !post_ids.is_empty() {
        let tag_rows: Vec<(Uuid, Tag)> = post_tags::table
            .inner_join(tags::table)
            .filter(post_tags::post_id.eq_any(&post_ids))
            .select((post_tags::post_id, Tag::as_select()))
            .load(conn)
            .await?;
        for (post_id, tag) in tag_rows {
            tags_by_post.entry(post_id).or_default().push(tag);
        }
    }

    let now = Utc::now();
    Ok(rows
        .into_iter()
        .map(|(post, author, category)| {
            let tags = tags_by_post.remove(&post.id).unwrap_or_default();
            let is_published = post.is_published(now);
            let reading_time = post.reading_time();
            let word_count = post.word_count();
            PostPayload {
                author: author.summary(),
                category,
                tags,
                reading_time,
                word_count,
                is_published,
                post,
            }
        })
        .collect())
}

pub async fn list_posts(
    State(db_pool): State<DbPool>,
    caller: MaybeUser,
    Query(query): Query<PostListQuery>,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<Vec<PostPayload>>> {
    let viewer = caller.viewer();
    let now = Utc::now();
    let mut conn = db_pool.get().await?;

    let mut q = posts::table
        .inner_join(users::table)
        .left_join(categories::table)
        .select((Post::as_select(), User::as_select(), Option::<Category>::as_select()))
        .into_boxed();

    // Visibility first, filters after
    match viewer {
        Viewer::Anonymous => {
            q = q.filter(
                posts::status
                    .eq(PostStatus::Published.as_str())
                    .and(posts::published_at.le(Some(now))),
            );
        }
        Viewer::User { is_staff: true, .. } => {}
        Viewer::User { id, .. } => {
            q = q.filter(
                posts::status
                    .eq(PostStatus::Published.as_str())
                    .and(posts::published_at.le(Some(now)))
                    .or(posts::author_id.eq(id)),
            );
        }
    }

    if let Some(status) = &query.status {
        let status = PostStatus::parse(status)
            .ok_or_else(|| ApiError::validation("Unknown post status"))?;
        q = q.filter(posts::status.eq(status.as_str()));
    }
    if let Some(author) = query.author {
        q = q.filter(posts::author_id.eq(author));
    }
    if let Some(category_slug) = &query.category {
        let category_id = categories::table
            .filter(categories::slug.eq(category_slug))
            .select(categories::id)
            .first::<Uuid>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| ApiError::not_found("Category not found"))?;
        q = q.filter(posts::category_id.eq(category_id));
    }
    if let Some(tag_slug) = &query.tag {
        let tag_id = tags::table
            .filter(tags::slug.eq(tag_slug))
            .select(tags::id)
            .first::<Uuid>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| ApiError::not_found("Tag not found"))?;
        let tagged: Vec<Uuid> = post_tags::table
            .filter(post_tags::tag_id.eq(tag_id))
            .select(post_tags::post_id)
            .load(&mut conn)
            .await?;
        q = q.filter(posts::id.eq_any(tagged));
    }
    if let Some(featured) = query.is_featured {
        q = q.filter(posts::is_featured.eq(featured));
    }
    if let Some(search) = &query.search {
        let pattern = format!("%{}%", search);
        q = q.filter(
            posts::title
                .ilike(pattern.clone())
                .or(posts::content.ilike(pattern)),
        );
    }

    let rows: Vec<PostRow> = q
        .order(posts::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .load(&mut conn)
        .await?;

    Ok(Json(load_payloads(&mut conn, rows).await?))
}

/// Published posts flagged as featured
pub async fn featured_posts(
    State(db_pool): State<DbPool>,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<Vec<PostPayload>>> {
    let now = Utc::now();
    let mut conn = db_pool.get().await?;

    let rows: Vec<PostRow> = posts::table
        .inner_join(users::table)
        .left_join(categories::table)
        .filter(posts::is_featured.eq(true))
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

/// The signed-in caller's posts, any status
pub async fn my_posts(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<Vec<PostPayload>>> {
    let mut conn = db_pool.get().await?;
    let rows: Vec<PostRow> = posts::table
        .inner_join(users::table)
        .left_join(categories::table)
        .filter(posts::author_id.eq(user.id))
        .order(posts::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .select((Post::as_select(), User::as_select(), Option::<Category>::as_select()))
        .load(&mut conn)
        .await?;

    Ok(Json(load_payloads(&mut conn, rows).await?))
}

/// The signed-in caller's drafts
pub async fn my_drafts(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<Vec<PostPayload>>> {
    let mut conn = db_pool.get().await?;
    let rows: Vec<PostRow> = posts::table
        .inner_join(users::table)
        .left_join(categories::table)
        .filter(posts::author_id.eq(user.id))
        .filter(posts::status.eq(PostStatus::Draft.as_str()))
        .order(posts::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .select((Post::as_select(), User::as_select(), Option::<Category>::as_select()))
        .load(&mut conn)
        .await?;

    Ok(Json(load_payloads(&mut conn, rows).await?))
}

/// Retrieve a post by slug; a successful retrieval records a view
/// from the caller's viewer context.
pub async fn get_post(
    State(db_pool): State<DbPool>,
    caller: MaybeUser,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<PostPayload>> {
    let viewer = caller.viewer();
    let now = Utc::now();
    let mut conn = db_pool.get().await?;

    let row: Option<PostRow> = posts::table
        .inner_join(users::table)
        .left_join(categories::table)
        .filter(posts::slug.eq(&slug))
        .select((Post::as_select(), User::as_select(), Option::<Category>::as_select()))
        .first(&mut conn)
        .await
        .optional()?;

    let (mut post, author, category) = row.ok_or_else(|| ApiError::not_found("Post not found"))?;
    if !post_visible(&viewer, &post, now) {
        // Hidden posts are indistinguishable from missing ones
        return Err(ApiError::not_found("Post not found"));
    }

    let ctx = viewer_context(&headers, viewer.user_id());
    match record_view(&mut conn, post.id, &ctx, now).await {
        Ok(counted) => {
            if counted {
                post.view_count += 1;
            }
        }
        // View recording never breaks retrieval
        Err(e) => warn!("Failed to record view for post {}: {}", post.id, e),
    }

    let mut payloads = load_payloads(&mut conn, vec![(post, author, category)]).await?;
    Ok(Json(payloads.remove(0)))
}

/// Record a deduplicated view. Insert-and-catch-conflict against the
/// (post, session) and (post, user) keys; the counter moves only when
/// the ledger row landed. Returns whether the view was counted.
async fn record_view(
    conn: &mut DbConnection,
    post_id: Uuid,
    ctx: &ViewerContext,
    now: DateTime<Utc>,
) -> Result<bool, diesel::result::Error> {
    if ctx.session_key.is_empty() && ctx.user_id.is_none() {
        // No dedupe key to hold the view against
        return Ok(false);
    }

    let view = NewPostView::from_viewer(post_id, ctx, now);
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        async move {
            let inserted = diesel::insert_into(post_views::table)
                .values(&view)
                .on_conflict_do_nothing()
                .execute(conn)
                .await?;

            if inserted > 0 {
                diesel::update(posts::table.find(post_id))
                    .set(posts::view_count.eq(posts::view_count + 1))
                    .execute(conn)
                    .await?;
            }

            Ok(inserted > 0)
        }
        .scope_boxed()
    })
    .await
}

/// Create a post; slug, excerpt and SEO fields derive from the input
pub async fn create_post(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Json(input): Json<CreatePost>,
) -> ApiResult<(StatusCode, Json<PostPayload>)> {
    if input.title.trim().is_empty() {
        return Err(ApiError::validation("Title is required"));
    }
    if input.content.trim().is_empty() {
        return Err(ApiError::validation("Content is required"));
    }
    if let Some(status) = input.status {
        if status == PostStatus::Archived {
            return Err(ApiError::validation("Posts cannot be created as archived"));
        }
    }

    let mut conn = db_pool.get().await?;

    if let Some(category_id) = input.category_id {
        let exists: i64 = categories::table
            .filter(categories::id.eq(category_id))
            .count()
            .get_result(&mut conn)
            .await?;
        if exists == 0 {
            return Err(ApiError::not_found("Category not found"));
        }
    }
    if !input.tag_ids.is_empty() {
        let found: i64 = tags::table
            .filter(tags::id.eq_any(&input.tag_ids))
            .count()
            .get_result(&mut conn)
            .await?;
        if found != input.tag_ids.len() as i64 {
            return Err(ApiError::not_found("Tag not found"));
        }
    }

    let tag_ids = input.tag_ids.clone();
    let new_post = NewPost::from_input(user.id, input, Utc::now());

    let post = conn
        .transaction::<Post, ApiError, _>(|conn| {
            async move {
                let post = diesel::insert_into(posts::table)
                    .values(&new_post)
                    .get_result::<Post>(conn)
                    .await
                    .map_err(|e| {
                        if ApiError::is_unique_violation(&e) {
                            ApiError::validation("A post with that slug already exists")
                        } else {
                            ApiError::Database(e)
                        }
                    })?;

                if !tag_ids.is_empty() {
                    let links: Vec<_> = tag_ids
                        .iter()
                        .map(|tag_id| {
                            (post_tags::post_id.eq(post.id), post_tags::tag_id.eq(*tag_id))
                        })
                        .collect();
                    diesel::insert_into(post_tags::table)
                        .values(&links)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;
                }

                Ok(post)
            }
            .scope_boxed()
        })
        .await?;

    let rows = vec![(post, user, None)];
    let mut payloads = load_payloads(&mut conn, rows).await?;
    // Category was validated above; reload it for the payload
    if let Some(category_id) = payloads[0].post.category_id {
        payloads[0].category = categories::table
            .find(category_id)
            .first::<Category>(&mut conn)
            .await
            .optional()?;
    }

    Ok((StatusCode::CREATED, Json(payloads.remove(0))))
}

/// Update a post's editable fields, status and tag set (author or staff)
pub async fn update_post(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePostInput>,
) -> ApiResult<Json<PostPayload>> {
    let mut conn = db_pool.get().await?;

    let post = posts::table
        .find(id)
        .first::<Post>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    if post.author_id != user.id && !user.is_staff {
        return Err(ApiError::permission("You can only edit your own posts"));
    }

    let new_status = match &input.changes.status {
        Some(raw) => {
            Some(PostStatus::parse(raw).ok_or_else(|| ApiError::validation("Unknown post status"))?)
        }
        None => None,
    };

    if let Some(category_id) = input.changes.category_id {
        let exists: i64 = categories::table
            .filter(categories::id.eq(category_id))
            .count()
            .get_result(&mut conn)
            .await?;
        if exists == 0 {
            return Err(ApiError::not_found("Category not found"));
        }
    }
    if let Some(tag_ids) = &input.tag_ids {
        if !tag_ids.is_empty() {
            let found: i64 = tags::table
                .filter(tags::id.eq_any(tag_ids))
                .count()
                .get_result(&mut conn)
                .await?;
            if found != tag_ids.len() as i64 {
                return Err(ApiError::not_found("Tag not found"));
            }
        }
    }

    let changes = input.changes;
    let tag_ids = input.tag_ids;
    let now = Utc::now();
    // A first-time move into published stamps the publication time
    let stamp_published = matches!(new_status, Some(PostStatus::Published)) && post.published_at.is_none();

    let updated = conn
        .transaction::<Post, ApiError, _>(|conn| {
            async move {
                let updated = if stamp_published {
                    diesel::update(posts::table.find(id))
                        .set((
                            &changes,
                            posts::published_at.eq(Some(now)),
                            posts::updated_at.eq(now),
                        ))
                        .get_result::<Post>(conn)
                        .await?
                } else {
                    diesel::update(posts::table.find(id))
                        .set((&changes, posts::updated_at.eq(now)))
                        .get_result::<Post>(conn)
                        .await?
                };

                // Replace the tag set when one is supplied
                if let Some(tag_ids) = tag_ids {
                    diesel::delete(post_tags::table.filter(post_tags::post_id.eq(id)))
                        .execute(conn)
                        .await?;
                    if !tag_ids.is_empty() {
                        let links: Vec<_> = tag_ids
                            .iter()
                            .map(|tag_id| {
                                (post_tags::post_id.eq(id), post_tags::tag_id.eq(*tag_id))
                            })
                            .collect();
                        diesel::insert_into(post_tags::table)
                            .values(&links)
                            .on_conflict_do_nothing()
                            .execute(conn)
                            .await?;
                    }
                }

                Ok(updated)
            }
            .scope_boxed()
        })
        .await?;

    let author = users::table
        .find(updated.author_id)
        .first::<User>(&mut conn)
        .await?;
    let category = match updated.category_id {
        Some(category_id) => {
            categories::table
                .find(category_id)
                .first::<Category>(&mut conn)
                .await
                .optional()?
        }
        None => None,
    };

    let mut payloads = load_payloads(&mut conn, vec![(updated, author, category)]).await?;
    Ok(Json(payloads.remove(0)))
}

/// Publish a draft (author or staff); idempotent calls fail
pub async fn publish_post(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Post>> {
    let mut conn = db_pool.get().await?;

    let post = posts::table
        .find(id)
        .first::<Post>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    if post.author_id != user.id && !user.is_staff {
        return Err(ApiError::permission("You can only publish your own posts"));
    }
    if post.status == PostStatus::Published.as_str() {
        return Err(ApiError::validation("Post is already published"));
    }

    let now = Utc::now();
    let published = diesel::update(posts::table.find(id))
        .set((
            posts::status.eq(PostStatus::Published.as_str()),
            posts::published_at.eq(Some(now)),
            posts::updated_at.eq(now),
        ))
        .get_result::<Post>(&mut conn)
        .await?;

    Ok(Json(published))
}

/// View analytics for a post (author or staff only)
pub async fn post_analytics(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PostAnalytics>> {
    let mut conn = db_pool.get().await?;

    let post = posts::table
        .find(id)
        .first::<Post>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    if post.author_id != user.id && !user.is_staff {
        return Err(ApiError::permission(
            "Only the author or staff can view post analytics",
        ));
    }

    let now = Utc::now();

    let unique_views: i64 = post_views::table
        .filter(post_views::post_id.eq(post.id))
        .count()
        .get_result(&mut conn)
        .await?;

    let recent_views: i64 = post_views::table
        .filter(post_views::post_id.eq(post.id))
        .filter(post_views::viewed_at.ge(now - Duration::days(7)))
        .count()
        .get_result(&mut conn)
        .await?;

    let window: Vec<DateTime<Utc>> = post_views::table
        .filter(post_views::post_id.eq(post.id))
        .filter(post_views::viewed_at.ge(now - Duration::days(30)))
        .select(post_views::viewed_at)
        .order(post_views::viewed_at.asc())
        .load(&mut conn)
        .await?;

    Ok(Json(PostAnalytics {
        total_views: post.view_count,
        unique_views,
        recent_views,
        reading_time: reading_time(&post.content),
        word_count: word_count(&post.content),
        character_count: character_count(&post.content),
        daily_views: bucket_views_by_day(&window),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_input_carries_status_and_tag_set() {
        let tag = Uuid::new_v4();
        let input: UpdatePostInput = serde_json::from_value(serde_json::json!({
            "title": "Renamed",
            "status": "archived",
            "tag_ids": [tag],
        }))
        .unwrap();

        assert_eq!(input.changes.title.as_deref(), Some("Renamed"));
        assert_eq!(input.changes.status.as_deref(), Some("archived"));
        assert_eq!(input.tag_ids, Some(vec![tag]));
        assert_eq!(
            PostStatus::parse(input.changes.status.as_deref().unwrap()),
            Some(PostStatus::Archived)
        );
        assert_eq!(PostStatus::parse("retracted"), None);
    }

    #[test]
    fn update_input_leaves_omitted_fields_alone() {
        let input: UpdatePostInput =
            serde_json::from_value(serde_json::json!({ "content": "New body" })).unwrap();

        assert_eq!(input.changes.content.as_deref(), Some("New body"));
        assert!(input.changes.status.is_none());
        assert!(input.tag_ids.is_none());
    }

    #[test]
    fn hidden_posts_are_visible_to_author_and_staff_only() {
        let author = Uuid::new_v4();
        let now = Utc::now();
        let draft = Post {
            id: Uuid::new_v4(),
            title: String::new(),
            slug: String::new(),
            content: String::new(),
            excerpt: String::new(),
            author_id: author,
            status: "draft".to_string(),
            category_id: None,
            featured_image: None,
            meta_title: String::new(),
            meta_description: String::new(),
            published_at: None,
            scheduled_at: None,
            created_at: now,
            updated_at: now,
            view_count: 0,
            is_featured: false,
        };

        assert!(!post_visible(&Viewer::Anonymous, &draft, now));
        assert!(post_visible(
            &Viewer::User {
                id: author,
                is_staff: false
            },
            &draft,
            now
        ));
        assert!(!post_visible(
            &Viewer::User {
                id: Uuid::new_v4(),
                is_staff: false
            },
            &draft,
            now
        ));
        assert!(post_visible(
            &Viewer::User {
                id: Uuid::new_v4(),
                is_staff: true
            },
            &draft,
            now
        ));
    }
}
