pub mod admin;
pub mod ai;
pub mod community;
pub mod conversations;
pub mod error;
pub mod gamification;
pub mod goals;
pub mod notifications;
pub mod recommend;
pub mod requests;
pub mod resources;
pub mod reviews;
pub mod sessions;
pub mod users;

#[cfg(test)]
pub mod test_utils;

pub use error::*;
