pub mod admin;
pub mod ai;
pub mod auth;
pub mod community;
pub mod conversations;
pub mod discover;
pub mod goals;
pub mod health;
pub mod notifications;
pub mod requests;
pub mod resources;
pub mod reviews;
pub mod sessions;
pub mod users;
