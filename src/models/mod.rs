pub mod analytics;
pub mod chat;
pub mod integration;
pub mod lead;
