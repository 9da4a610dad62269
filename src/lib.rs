//! Jobboard - job board backend
//!
//! Job seekers apply to jobs posted by employers; admins run the back-office
//! (users, articles, subscriptions, analytics).

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
