//! Batch Photo Ingestion Service
//!
//! This library provides the core functionality of the photo-ingest system:
//! batch upload job management, an in-process bounded recognition queue with
//! per-submitter fairness, and an adaptive client-side upload scheduler.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod uploader;
