pub mod brand;
pub mod car;
pub mod carpooling;
pub mod participation;
pub mod review;
pub mod user;
