pub mod config;
pub mod epg;
pub mod errors;
pub mod models;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod selection;
pub mod sources;
