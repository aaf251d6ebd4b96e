//! Referral Rewards Library
//!
//! Referral codes and QR images for paying customers, sponsor/referred
//! tracking from paid orders, staff reward actions and the referral email
//! sweep, exposed over HTTP.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod task_runner;
