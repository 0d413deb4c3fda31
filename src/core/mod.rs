//! Core domain: configuration, persistence, identity, diagrams and live collaboration

pub mod auth;
pub mod collab;
pub mod config;
pub mod db;
pub mod diagrams;
