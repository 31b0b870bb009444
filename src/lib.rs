//! Mirror a user's original posts from Twitter/X to Bluesky: incremental
//! fetch from a persisted cursor, text cleanup, media re-upload, and
//! in-order publishing with at-least-once delivery.
pub mod bluesky;
pub mod config;
pub mod cursor;
pub mod media;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod twitter;
