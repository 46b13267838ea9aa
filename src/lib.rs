//! cloudtree - lazily loaded cloud inventory tree
//!
//! Browses a hierarchy of accounts, subscriptions, resource groups and resources
//! that is only fetched when a node is expanded. Remote access goes through the
//! provider traits in [`app::resource_explorer::provider`].
//!
//! # Architecture Overview
//!
//! - **Nodes** ([`app::resource_explorer::node`]): shared `Arc` nodes with an atomic
//!   `NotLoaded -> Loading -> Loaded` state machine and observable child sequences
//! - **Loading** ([`app::resource_explorer::loader`]): the category loader shared by
//!   every "list resources of kind K in scope S" node
//! - **Pre-loading** ([`app::resource_explorer::preload`]): concurrent fan-out over a
//!   resource group's categories
//! - **Search** ([`app::resource_explorer::search`]): incremental account/subscription
//!   grouping of streamed matches
//! - **Configuration** ([`app::config`]): TOML settings under the platform config dir
//!
//! The `cloudtree` binary browses and searches a JSON inventory snapshot.

#![warn(clippy::all, rust_2018_idioms)]

// Include logging macros first
#[macro_use]
pub mod logging_macros;

pub mod app;

pub use app::config::ExplorerConfig;
pub use app::resource_explorer::ResourceExplorer;
