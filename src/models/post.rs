use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::taxonomy::slugify;
use crate::schema::posts;

/// Words-per-minute figure used for reading time estimates
const READING_WORDS_PER_MINUTE: f64 = 225.0;

/// Auto-generated excerpts are cut at this many characters
const EXCERPT_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(PostStatus::Draft),
            "published" => Some(PostStatus::Published),
            "archived" => Some(PostStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = posts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub author_id: Uuid,
    pub status: String,
    pub category_id: Option<Uuid>,
    pub featured_image: Option<String>,
    pub meta_title: String,
    pub meta_description: String,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub view_count: i32,
    pub is_featured: bool,
}

impl Post {
    /// Published iff status is published and published_at is set and not in the future
    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        self.status == PostStatus::Published.as_str()
            && self.published_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn reading_time(&self) -> i64 {
        reading_time(&self.content)
    }

    pub fn word_count(&self) -> usize {
        word_count(&self.content)
    }

    pub fn character_count(&self) -> usize {
        character_count(&self.content)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = posts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewPost {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub author_id: Uuid,
    pub status: String,
    pub category_id: Option<Uuid>,
    pub featured_image: Option<String>,
    pub meta_title: String,
    pub meta_description: String,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub view_count: i32,
    pub is_featured: bool,
}

/// Caller-supplied fields for post creation; everything derivable is optional
#[derive(Debug, Deserialize)]
pub struct CreatePost {
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub status: Option<PostStatus>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    pub featured_image: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewPost {
    /// Build an insertable post, deriving slug, excerpt and SEO fields
    /// from the title/content when the caller left them out.
    pub fn from_input(author_id: Uuid, input: CreatePost, now: DateTime<Utc>) -> Self {
        let slug = slugify(&input.title);
        let excerpt = match input.excerpt {
            Some(e) if !e.is_empty() => e,
            _ => derive_excerpt(&input.content),
        };
        let meta_title = match input.meta_title {
            Some(t) if !t.is_empty() => t,
            _ => input.title.clone(),
        };
        let meta_description = match input.meta_description {
            Some(d) if !d.is_empty() => d,
            _ => excerpt.clone(),
        };
        let status = input.status.unwrap_or(PostStatus::Draft);
        // A post created directly as published gets its timestamp now
        let published_at = match status {
            PostStatus::Published => Some(now),
            _ => None,
        };

        NewPost {
            id: Uuid::new_v4(),
            title: input.title,
            slug,
            content: input.content,
            excerpt,
            author_id,
            status: status.as_str().to_string(),
            category_id: input.category_id,
            featured_image: input.featured_image,
            meta_title,
            meta_description,
            published_at,
            scheduled_at: input.scheduled_at,
            created_at: now,
            updated_at: now,
            view_count: 0,
            is_featured: false,
        }
    }
}

#[derive(Debug, Default, AsChangeset, Deserialize)]
#[diesel(table_name = posts)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub status: Option<String>,
    pub category_id: Option<Uuid>,
    pub featured_image: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub is_featured: Option<bool>,
}

/// Drop `<...>` markup tags, keeping the text between them
pub fn strip_markup(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_tag = false;
    for c in content.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

pub fn word_count(content: &str) -> usize {
    strip_markup(content).split_whitespace().count()
}

pub fn character_count(content: &str) -> usize {
    strip_markup(content).chars().count()
}

/// Estimated reading time in minutes: word count at 225 wpm, floor of 1
pub fn reading_time(content: &str) -> i64 {
    let minutes = (word_count(content) as f64 / READING_WORDS_PER_MINUTE).round() as i64;
    minutes.max(1)
}

/// First 200 characters of the content, with an ellipsis when truncated
pub fn derive_excerpt(content: &str) -> String {
    if content.chars().count() > EXCERPT_MAX_CHARS {
        let cut: String = content.chars().take(EXCERPT_MAX_CHARS).collect();
        format!("{}...", cut)
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_markup_removes_tags() {
        assert_eq!(strip_markup("<p>Hello <b>world</b></p>"), "Hello world");
    }

    #[test]
    fn word_count_ignores_markup() {
        assert_eq!(word_count("<h1>Title</h1> <p>two words</p>"), 3);
    }

    #[test]
    fn reading_time_rounds_at_reading_speed() {
        let content = (0..450).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        assert_eq!(reading_time(&content), 2);
    }

    #[test]
    fn reading_time_has_floor_of_one_minute() {
        assert_eq!(reading_time("just a handful of words here, ten in all total"), 1);
    }

    #[test]
    fn excerpt_truncates_long_content() {
        let content = "x".repeat(300);
        let excerpt = derive_excerpt(&content);
        assert_eq!(excerpt.len(), 203);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn excerpt_keeps_short_content() {
        assert_eq!(derive_excerpt("short"), "short");
    }

    #[test]
    fn derivation_fills_slug_and_seo_fields() {
        let input = CreatePost {
            title: "My First Post".to_string(),
            content: "Body text".to_string(),
            excerpt: None,
            status: None,
            category_id: None,
            tag_ids: vec![],
            featured_image: None,
            meta_title: None,
            meta_description: None,
            scheduled_at: None,
        };
        let post = NewPost::from_input(Uuid::new_v4(), input, Utc::now());
        assert_eq!(post.slug, "my-first-post");
        assert_eq!(post.excerpt, "Body text");
        assert_eq!(post.meta_title, "My First Post");
        assert_eq!(post.meta_description, "Body text");
        assert_eq!(post.status, "draft");
        assert!(post.published_at.is_none());
    }

    #[test]
    fn publish_state_needs_timestamp_in_the_past() {
        let now = Utc::now();
        let mut post = Post {
            id: Uuid::new_v4(),
            title: String::new(),
            slug: String::new(),
            content: String::new(),
            excerpt: String::new(),
            author_id: Uuid::new_v4(),
            status: "published".to_string(),
            category_id: None,
            featured_image: None,
            meta_title: String::new(),
            meta_description: String::new(),
            published_at: Some(now - chrono::Duration::hours(1)),
            scheduled_at: None,
            created_at: now,
            updated_at: now,
            view_count: 0,
            is_featured: false,
        };
        assert!(post.is_published(now));

        post.published_at = Some(now + chrono::Duration::hours(1));
        assert!(!post.is_published(now));

        post.published_at = None;
        assert!(!post.is_published(now));

        post.status = "draft".to_string();
        post.published_at = Some(now);
        assert!(!post.is_published(now));
    }
}
