pub mod auth;
pub mod error;
pub mod listings;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod storage;
pub mod upload;
