//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate engine checks and record store writes into use-case APIs.
//! - Keep callers decoupled from storage details.

pub mod unit_service;
