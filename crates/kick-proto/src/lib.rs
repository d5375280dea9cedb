pub mod config;
pub mod dashboard;
pub mod fetcher;
pub mod layout;
pub mod model;
pub mod notify;
pub mod persist;
pub mod platform;
pub mod prefs;
pub mod roster;
pub mod schedule;
pub mod store;
pub mod timefmt;
pub mod views;
