use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::DbPool;
use crate::error::{ApiError, ApiResult};
use crate::models::user::{NewUser, UpdateUserProfile, User};
use crate::schema::users;

#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub bio: String,
    pub avatar: Option<String>,
    #[serde(default)]
    pub location: String,
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub website: String,
}

/// Register a new account in the user directory
pub async fn register(
    State(db_pool): State<DbPool>,
    Json(input): Json<RegisterUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    if input.username.trim().is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if input.email.trim().is_empty() || !input.email.contains('@') {
        return Err(ApiError::validation("A valid email address is required"));
    }
    if input.password != input.password2 {
        return Err(ApiError::validation("Password fields didn't match"));
    }
    if input.password.len() < 8 {
        return Err(ApiError::validation("Password must be at least 8 characters"));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(input.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))?
        .to_string();

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: input.username,
        email: input.email,
        password_hash,
        first_name: input.first_name,
        last_name: input.last_name,
        bio: input.bio,
        avatar: input.avatar,
        location: input.location,
        date_of_birth: input.date_of_birth,
        website: input.website,
        is_verified: false,
        is_staff: false,
        is_active: true,
        date_joined: Utc::now(),
    };

    let mut conn = db_pool.get().await?;
    let user = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result::<User>(&mut conn)
        .await
        .map_err(|e| {
            if ApiError::is_unique_violation(&e) {
                ApiError::validation("A user with that username or email already exists")
            } else {
                ApiError::Database(e)
            }
        })?;

    info!("Registered user {} ({})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// Get the signed-in caller's own record
pub async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

/// Update the signed-in caller's profile fields
pub async fn update_me(
    State(db_pool): State<DbPool>,
    AuthUser(user): AuthUser,
    Json(changes): Json<UpdateUserProfile>,
) -> ApiResult<Json<User>> {
    let mut conn = db_pool.get().await?;
    let updated = diesel::update(users::table.find(user.id))
        .set(&changes)
        .get_result::<User>(&mut conn)
        .await
        .map_err(|e| match e {
            // An all-None changeset builds an empty SET clause
            diesel::result::Error::QueryBuilderError(_) => {
                ApiError::validation("No profile fields to update")
            }
            other => ApiError::Database(other),
        })?;

    Ok(Json(updated))
}

/// Get a public profile by username
pub async fn get_user(
    State(db_pool): State<DbPool>,
    Path(username): Path<String>,
) -> ApiResult<Json<User>> {
    let mut conn = db_pool.get().await?;
    let user = users::table
        .filter(users::username.eq(&username))
        .filter(users::is_active.eq(true))
        .first::<User>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(user))
}
