// Import diesel table macros
use diesel::{allow_tables_to_appear_in_same_query, joinable, table};

// Define user directory table
table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        email -> Varchar,
        password_hash -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        bio -> Text,
        avatar -> Nullable<Varchar>,
        location -> Varchar,
        date_of_birth -> Nullable<Date>,
        website -> Varchar,
        is_verified -> Bool,
        is_staff -> Bool,
        is_active -> Bool,
        date_joined -> Timestamptz,
    }
}

// Define taxonomy tables
table! {
    categories (id) {
        id -> Uuid,
        name -> Varchar,
        slug -> Varchar,
        description -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    tags (id) {
        id -> Uuid,
        name -> Varchar,
        slug -> Varchar,
        created_at -> Timestamptz,
    }
}

// Define post store table
table! {
    posts (id) {
        id -> Uuid,
        title -> Varchar,
        slug -> Varchar,
        content -> Text,
        excerpt -> Text,
        author_id -> Uuid,
        status -> Varchar,
        category_id -> Nullable<Uuid>,
        featured_image -> Nullable<Varchar>,
        meta_title -> Varchar,
        meta_description -> Text,
        published_at -> Nullable<Timestamptz>,
        scheduled_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        view_count -> Integer,
        is_featured -> Bool,
    }
}

table! {
    post_tags (post_id, tag_id) {
        post_id -> Uuid,
        tag_id -> Uuid,
    }
}

// Define view ledger table
table! {
    post_views (id) {
        id -> Uuid,
        post_id -> Uuid,
        user_id -> Nullable<Uuid>,
        session_key -> Varchar,
        ip_address -> Nullable<Varchar>,
        user_agent -> Text,
        viewed_at -> Timestamptz,
    }
}

// Define comment tree table
table! {
    comments (id) {
        id -> Uuid,
        content -> Text,
        post_id -> Uuid,
        author_id -> Uuid,
        parent_id -> Nullable<Uuid>,
        status -> Varchar,
        is_edited -> Bool,
        likes_count -> Integer,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

// Define reaction ledger table
table! {
    reactions (id) {
        id -> Uuid,
        post_id -> Uuid,
        user_id -> Uuid,
        reaction_type -> Varchar,
        created_at -> Timestamptz,
    }
}

joinable!(posts -> users (author_id));
joinable!(posts -> categories (category_id));
joinable!(post_tags -> posts (post_id));
joinable!(post_tags -> tags (tag_id));
joinable!(post_views -> posts (post_id));
joinable!(comments -> posts (post_id));
joinable!(comments -> users (author_id));
joinable!(reactions -> posts (post_id));
joinable!(reactions -> users (user_id));

// Allow joining the tables if needed
allow_tables_to_appear_in_same_query!(
    users,
    categories,
    tags,
    posts,
    post_tags,
    post_views,
    comments,
    reactions,
);
