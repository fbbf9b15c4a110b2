pub mod admin;
pub mod auth;
pub mod cars;
pub mod carpooling;
pub mod me;
pub mod reviews;
