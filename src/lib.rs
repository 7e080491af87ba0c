//! Viral Ideas Analysis Queue
//!
//! This library provides the core functionality for the viral-ideas-queue
//! system: a durable, pollable job queue that tracks multi-step content
//! analyses of a primary profile and its competitors, from submission
//! through worker processing, progress polling, and scheduled reruns.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
