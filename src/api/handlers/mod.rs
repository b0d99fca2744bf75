pub mod comments;
pub mod health;
pub mod posts;
pub mod reactions;
pub mod taxonomy;
pub mod users;
