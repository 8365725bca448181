pub mod config;
pub mod geometry;
pub mod hand;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod tracker;
pub mod worker;
