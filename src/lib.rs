//! Mailrelay Server Library
//!
//! This module exposes the server components for testing purposes.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pagination;
pub mod queue;
pub mod repository;
pub mod routes;
pub mod services;
pub mod worker;
