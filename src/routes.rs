pub mod cron;
pub mod error;
pub mod health;
pub mod session;
pub mod user;
