pub mod postgres_repository;
pub mod refresh_token;
pub mod user;
