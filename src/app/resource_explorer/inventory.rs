//! JSON inventory snapshot served through the provider traits.
//!
//! Lets the CLI browse and search an exported inventory offline, and gives tests a
//! deterministic provider. Optional per-call latency and per-type injected failures
//! make the loading paths observable.
//!
//! ```json
//! {
//!   "accounts": [{
//!     "id": "contoso", "label": "Contoso",
//!     "subscriptions": [{
//!       "id": "sub-1", "label": "Production",
//!       "resource_groups": [{
//!         "name": "rg-web",
//!         "resources": [
//!           { "name": "sql-main", "type": "Microsoft.Sql/servers",
//!             "children": [{ "name": "orders", "type": "Microsoft.Sql/servers/databases" }] }
//!         ]
//!       }]
//!     }]
//!   }]
//! }
//! ```

use super::errors::ProviderError;
use super::factory::{RESOURCE_GROUPS_TYPE, SUBSCRIPTIONS_TYPE};
use super::provider::{
    DescriptorStream, ResourceDescriptor, ResourceProvider, Scope, SearchMatch, SearchProvider,
    SearchStream,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub accounts: Vec<AccountRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub resource_groups: Vec<ResourceGroupRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceGroupRecord {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub resources: Vec<ResourceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<ResourceRecord>,
}

impl ResourceRecord {
    fn descriptor(&self, id: String) -> ResourceDescriptor {
        ResourceDescriptor {
            id,
            name: self.name.clone(),
            kind: self.resource_type.clone(),
            state: self.state.clone(),
            properties: self.properties.clone(),
            tags: self.tags.clone(),
        }
    }
}

fn resource_group_id(subscription_id: &str, group: &str) -> String {
    format!("/subscriptions/{}/resourceGroups/{}", subscription_id, group)
}

fn resource_id(group_id: &str, record: &ResourceRecord) -> String {
    format!("{}/providers/{}/{}", group_id, record.resource_type, record.name)
}

/// Child ids append the last segment of the child type, e.g. `.../databases/orders`.
fn child_id(parent_id: &str, record: &ResourceRecord) -> String {
    let segment = record
        .resource_type
        .rsplit('/')
        .next()
        .unwrap_or(&record.resource_type);
    format!("{}/{}/{}", parent_id, segment, record.name)
}

impl InventorySnapshot {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory {}", path.display()))?;
        let snapshot: InventorySnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse inventory {}", path.display()))?;
        log_debug!(
            "Parsed inventory {}: {} accounts",
            path.display(),
            snapshot.accounts.len()
        );
        Ok(snapshot)
    }

    fn account(&self, account_id: &str) -> Result<&AccountRecord> {
        self.accounts
            .iter()
            .find(|account| account.id == account_id)
            .ok_or_else(|| anyhow!("Account '{}' not found", account_id))
    }

    fn subscription(&self, scope: &Scope) -> Result<&SubscriptionRecord> {
        let subscription_id = scope
            .subscription_id
            .as_deref()
            .ok_or_else(|| anyhow!("Scope {} has no subscription", scope))?;
        self.account(&scope.account_id)?
            .subscriptions
            .iter()
            .find(|subscription| subscription.id == subscription_id)
            .ok_or_else(|| anyhow!("Subscription '{}' not found", subscription_id))
    }

    fn resource_group(&self, scope: &Scope) -> Result<(&SubscriptionRecord, &ResourceGroupRecord)> {
        let subscription = self.subscription(scope)?;
        let group_name = scope
            .resource_group
            .as_deref()
            .ok_or_else(|| anyhow!("Scope {} has no resource group", scope))?;
        let group = subscription
            .resource_groups
            .iter()
            .find(|group| group.name.eq_ignore_ascii_case(group_name))
            .ok_or_else(|| anyhow!("Resource group '{}' not found", group_name))?;
        Ok((subscription, group))
    }

    /// Descriptors of `resource_type` directly inside `scope`
    pub fn list(&self, scope: &Scope, resource_type: &str) -> Result<Vec<ResourceDescriptor>> {
        if resource_type.eq_ignore_ascii_case(SUBSCRIPTIONS_TYPE) {
            let account = self.account(&scope.account_id)?;
            return Ok(account
                .subscriptions
                .iter()
                .map(|subscription| {
                    ResourceDescriptor::new(
                        &subscription.id,
                        &subscription.label,
                        SUBSCRIPTIONS_TYPE,
                    )
                    .with_state(subscription.state.clone())
                })
                .collect());
        }

        if resource_type.eq_ignore_ascii_case(RESOURCE_GROUPS_TYPE) {
            let subscription = self.subscription(scope)?;
            return Ok(subscription
                .resource_groups
                .iter()
                .map(|group| {
                    ResourceDescriptor::new(
                        resource_group_id(&subscription.id, &group.name),
                        &group.name,
                        RESOURCE_GROUPS_TYPE,
                    )
                    .with_state(group.location.clone())
                })
                .collect());
        }

        let (subscription, group) = self.resource_group(scope)?;
        let group_id = resource_group_id(&subscription.id, &group.name);
        let matches_type = |record: &ResourceRecord| {
            record.resource_type.eq_ignore_ascii_case(resource_type)
        };

        match &scope.parent_resource_id {
            None => Ok(group
                .resources
                .iter()
                .filter(|record| matches_type(record))
                .map(|record| record.descriptor(resource_id(&group_id, record)))
                .collect()),
            Some(parent_id) => {
                let parent = group
                    .resources
                    .iter()
                    .find(|record| &resource_id(&group_id, record) == parent_id)
                    .ok_or_else(|| anyhow!("Resource '{}' not found", parent_id))?;
                Ok(parent
                    .children
                    .iter()
                    .filter(|record| matches_type(record))
                    .map(|record| record.descriptor(child_id(parent_id, record)))
                    .collect())
            }
        }
    }

    /// Case-insensitive substring search over resource and sub-resource names
    pub fn search(&self, query: &str) -> Vec<SearchMatch> {
        let needle = query.to_lowercase();
        let mut matches = Vec::new();
        for account in &self.accounts {
            for subscription in &account.subscriptions {
                for group in &subscription.resource_groups {
                    let group_id = resource_group_id(&subscription.id, &group.name);
                    for record in &group.resources {
                        let id = resource_id(&group_id, record);
                        let mut candidates = vec![(record, id.clone())];
                        candidates.extend(
                            record
                                .children
                                .iter()
                                .map(|child| (child, child_id(&id, child))),
                        );
                        for (candidate, candidate_id) in candidates {
                            if candidate.name.to_lowercase().contains(&needle) {
                                matches.push(SearchMatch {
                                    account_id: account.id.clone(),
                                    account_label: account.label.clone(),
                                    subscription_id: subscription.id.clone(),
                                    subscription_label: subscription.label.clone(),
                                    resource_name: candidate.name.clone(),
                                    resource_type: candidate.resource_type.clone(),
                                    resource_id: candidate_id,
                                    actual_node: None,
                                });
                            }
                        }
                    }
                }
            }
        }
        matches
    }
}

/// Serves an [`InventorySnapshot`] as both resource and search provider.
#[derive(Debug, Default)]
pub struct SnapshotProvider {
    snapshot: InventorySnapshot,
    latency: Option<Duration>,
    /// Lower-cased resource type -> failure message
    failures: HashMap<String, String>,
}

impl SnapshotProvider {
    pub fn new(snapshot: InventorySnapshot) -> Self {
        Self {
            snapshot,
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every listing of `resource_type` fail with `message`
    pub fn with_failure(mut self, resource_type: &str, message: &str) -> Self {
        self.failures
            .insert(resource_type.to_lowercase(), message.to_string());
        self
    }

    pub fn snapshot(&self) -> &InventorySnapshot {
        &self.snapshot
    }

    pub fn account_labels(&self) -> Vec<(String, String)> {
        self.snapshot
            .accounts
            .iter()
            .map(|account| (account.id.clone(), account.label.clone()))
            .collect()
    }

    async fn simulate_latency(&self, cancel: &CancellationToken) -> Result<(), ProviderError> {
        if let Some(latency) = self.latency {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for SnapshotProvider {
    async fn list_resources(
        &self,
        scope: &Scope,
        resource_type: &str,
        cancel: CancellationToken,
    ) -> Result<DescriptorStream, ProviderError> {
        self.simulate_latency(&cancel).await?;
        if let Some(message) = self.failures.get(&resource_type.to_lowercase()) {
            return Err(ProviderError::failed(message));
        }
        let descriptors = self
            .snapshot
            .list(scope, resource_type)
            .with_context(|| format!("Listing {} in {}", resource_type, scope))?;
        debug!(
            "Snapshot returned {} {} in {}",
            descriptors.len(),
            resource_type,
            scope
        );
        Ok(futures::stream::iter(descriptors.into_iter().map(Ok)).boxed())
    }
}

#[async_trait]
impl SearchProvider for SnapshotProvider {
    async fn search(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<SearchStream, ProviderError> {
        self.simulate_latency(&cancel).await?;
        let matches = self.snapshot.search(query);
        Ok(futures::stream::iter(matches.into_iter().map(Ok)).boxed())
    }
}
