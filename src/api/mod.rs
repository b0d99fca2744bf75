mod handlers;
mod routes;

pub use routes::PaginationParams;

use crate::config::Config;
use crate::db::Database;
use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Start the API server
pub async fn start_api_server(db: Arc<Database>) -> Result<()> {
    let config = Config::get();

    // Set up CORS
    let cors = if config.server.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::permissive()
    };

    // Create router with all routes
    let app = Router::new()
        // General routes
        .route("/health", get(handlers::health::health_check))
        // User routes
        .route("/api/users/register", post(handlers::users::register))
        .route("/api/users/me", get(handlers::users::me).put(handlers::users::update_me))
        .route("/api/users/:username", get(handlers::users::get_user))
        // Post routes
        .route("/api/posts", get(handlers::posts::list_posts).post(handlers::posts::create_post))
        .route("/api/posts/featured", get(handlers::posts::featured_posts))
        .route("/api/posts/mine", get(handlers::posts::my_posts))
        .route("/api/posts/drafts", get(handlers::posts::my_drafts))
        // Retrieval is addressed by slug; mutation by id. Same segment,
        // so the handlers share the route parameter.
        .route("/api/posts/:id", get(handlers::posts::get_post).put(handlers::posts::update_post))
        .route("/api/posts/:id/publish", post(handlers::posts::publish_post))
        .route("/api/posts/:id/analytics", get(handlers::posts::post_analytics))
        .route("/api/posts/:id/comments", get(handlers::comments::comments_for_post))
        .route("/api/posts/:id/reactions", get(handlers::reactions::post_reactions))
        // Taxonomy routes
        .route(
            "/api/categories",
            get(handlers::taxonomy::list_categories).post(handlers::taxonomy::create_category),
        )
        .route("/api/categories/:slug/posts", get(handlers::taxonomy::category_posts))
        .route("/api/tags", get(handlers::taxonomy::list_tags).post(handlers::taxonomy::create_tag))
        .route("/api/tags/:slug/posts", get(handlers::taxonomy::tag_posts))
        // Comment routes
        .route("/api/comments", post(handlers::comments::create_comment))
        .route("/api/comments/mine", get(handlers::comments::my_comments))
        .route("/api/comments/pending", get(handlers::comments::pending_comments))
        .route("/api/comments/spam", get(handlers::comments::spam_comments))
        .route(
            "/api/comments/:id",
            put(handlers::comments::update_comment).delete(handlers::comments::delete_comment),
        )
        .route("/api/comments/:id/replies", get(handlers::comments::comment_replies))
        .route("/api/comments/:id/like", post(handlers::comments::like_comment))
        .route("/api/comments/:id/unlike", post(handlers::comments::unlike_comment))
        .route("/api/comments/:id/moderate", post(handlers::comments::moderate_comment))
        // Reaction routes
        .route("/api/reactions", post(handlers::reactions::create_reaction))
        .route("/api/reactions/toggle", post(handlers::reactions::toggle_reaction))
        .route("/api/reactions/mine", get(handlers::reactions::my_reactions))
        .route("/api/reactions/popular", get(handlers::reactions::popular_reactions))
        .route("/api/reactions/analytics", get(handlers::reactions::reaction_analytics))
        // Add state and middleware
        .with_state(db.get_pool().clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Get bind address
    let addr = format!("{}:{}", config.server.host, config.server.port).parse::<SocketAddr>()?;

    // Start server
    info!("Starting API server on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
