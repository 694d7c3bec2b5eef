//! GSP Host - operator tooling for the GameStream pairing service.
//!
//! This crate provides configuration loading and the commands behind the
//! `gsp-host` binary.

pub mod commands;
pub mod config;
