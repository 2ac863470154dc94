pub mod api;
pub mod app;
pub mod attendance;
pub mod config;
pub mod db;
pub mod error;
pub mod global;
pub mod meeting;
pub mod recording;
pub mod scheduler;
pub mod storage;
pub mod timewindow;
pub mod transcription;
