pub mod chunks;
pub mod messages;
pub mod meta;
pub mod project_stats;
pub mod replace;
pub mod search_log;
pub mod sessions;
pub mod summaries;
