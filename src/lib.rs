pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod feed;
pub mod infra;
pub mod presentation;
pub mod translate;
