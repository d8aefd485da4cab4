//! ghbranch - browse, merge and delete branches across your GitHub repositories.

pub mod app;
pub mod auth;
pub mod commands;
pub mod config;
pub mod github;
pub mod session;
pub mod store;
pub mod sync;
pub mod ui;
