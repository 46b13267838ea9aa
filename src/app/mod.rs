//! Core application modules for cloudtree.
//!
//! - [`config`] - Explorer configuration loaded from the platform config dir
//! - [`resource_explorer`] - Lazy inventory tree, loaders, pre-loading and search

pub mod config;
pub mod resource_explorer;
