//! Quillhub - A social blogging service
//!
//! Posts with privacy levels, comments, reactions, follows and
//! notifications, a project and tutorial showcase, and password login with
//! an optional emailed verification code.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
