pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod earnings;
pub mod health;
pub mod metrics;
pub mod papers;
pub mod payments;
pub mod reviews;
pub mod swagger;
