pub mod comment;
pub mod post;
pub mod post_view;
pub mod reaction;
pub mod taxonomy;
pub mod user;
