//! Feedmux - a syndication feed aggregator
//!
//! This crate fetches many RSS/Atom feeds concurrently, normalizes their
//! entries into a single model, and serves a cached, filterable, paginated
//! view of the combined content over HTTP.

pub mod cache;
pub mod config;
pub mod favicon;
pub mod models;
pub mod parser;
pub mod routes;
pub mod source;
pub mod view;
