pub mod health;
pub mod reports;
pub mod sse;
