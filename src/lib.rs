pub mod address;
pub mod analyzer;
pub mod api;
pub mod chains;
pub mod config;
pub mod export;
pub mod insights;
pub mod prices;
pub mod providers;
pub mod report;
pub mod scan;
