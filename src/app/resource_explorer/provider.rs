//! Collaborator seams: resource listing, search streaming and the context object
//! that carries them into loaders.
//!
//! The tree never talks to a cloud API directly. Everything remote goes through
//! [`ResourceProvider`] and [`SearchProvider`], bundled with the node factory and
//! configuration in an [`ExplorerContext`] that is passed explicitly to every
//! load. Tests swap in scripted providers; the CLI uses the JSON snapshot provider.

use super::errors::ProviderError;
use super::factory::NodeFactory;
use super::node::Node;
use crate::app::config::ExplorerConfig;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Addressing tuple that bounds a provider query
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    /// Set when listing sub-resources of a concrete resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_resource_id: Option<String>,
}

impl Scope {
    pub fn account(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_subscription(mut self, subscription_id: &str) -> Self {
        self.subscription_id = Some(subscription_id.to_string());
        self
    }

    pub fn with_resource_group(mut self, resource_group: &str) -> Self {
        self.resource_group = Some(resource_group.to_string());
        self
    }

    pub fn with_parent_resource(mut self, resource_id: &str) -> Self {
        self.parent_resource_id = Some(resource_id.to_string());
        self
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.account_id)?;
        if let Some(subscription) = &self.subscription_id {
            write!(f, "/{}", subscription)?;
        }
        if let Some(group) = &self.resource_group {
            write!(f, "/{}", group)?;
        }
        if let Some(parent) = &self.parent_resource_id {
            write!(f, " under {}", parent)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Fully qualified resource id (subscription id for subscriptions)
    pub id: String,
    pub name: String,
    /// Resource type, e.g. `Microsoft.Compute/virtualMachines`
    pub kind: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            state: String::new(),
            properties: serde_json::Value::Null,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }
}

/// One cross-scope search hit
#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub account_id: String,
    pub account_label: String,
    pub subscription_id: String,
    pub subscription_label: String,
    pub resource_name: String,
    pub resource_type: String,
    pub resource_id: String,
    /// Matching node of the browse tree, when the caller can resolve one
    pub actual_node: Option<Node>,
}

pub type DescriptorStream = BoxStream<'static, Result<ResourceDescriptor, ProviderError>>;
pub type SearchStream = BoxStream<'static, Result<SearchMatch, ProviderError>>;

/// "List resources of type T in scope S"
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Open a listing. Items may arrive incrementally; any item may be an error.
    /// Implementations should return [`ProviderError::Cancelled`] once `cancel` fires.
    async fn list_resources(
        &self,
        scope: &Scope,
        resource_type: &str,
        cancel: CancellationToken,
    ) -> Result<DescriptorStream, ProviderError>;
}

/// "Stream search matches"
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<SearchStream, ProviderError>;
}

/// Everything a load needs from the outside world, passed explicitly.
#[derive(Clone)]
pub struct ExplorerContext {
    pub resources: Arc<dyn ResourceProvider>,
    pub search: Arc<dyn SearchProvider>,
    pub factory: Arc<dyn NodeFactory>,
    pub config: Arc<ExplorerConfig>,
}

impl ExplorerContext {
    pub fn new(
        resources: Arc<dyn ResourceProvider>,
        search: Arc<dyn SearchProvider>,
        factory: Arc<dyn NodeFactory>,
        config: ExplorerConfig,
    ) -> Self {
        Self {
            resources,
            search,
            factory,
            config: Arc::new(config),
        }
    }
}
