// Ranked cricket matchmaking: ratings, trust, anti-cheat, queue and challenges.

pub mod admin;
pub mod challenge;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod lobby;
pub mod metrics;
pub mod notify;
pub mod patterns;
pub mod queue;
pub mod rating;
pub mod retry;
pub mod server;
pub mod tier;
pub mod trust;
