//! Shared fixtures for the integration tests.
//!
//! [`ScriptedProvider`] answers each resource type from a script, counts calls and
//! tracks how many listings are open at once, so tests can observe exactly how the
//! tree drives its provider.

#![allow(dead_code)]

use async_trait::async_trait;
use cloudtree::app::config::{CategoryConfig, ExplorerConfig};
use cloudtree::app::resource_explorer::provider::DescriptorStream;
use cloudtree::app::resource_explorer::{
    DefaultNodeFactory, ExplorerContext, ProviderError, ResourceDescriptor, ResourceProvider,
    Scope, SnapshotProvider,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

pub const VM_TYPE: &str = "Microsoft.Compute/virtualMachines";
pub const VAULT_TYPE: &str = "Microsoft.KeyVault/vaults";
pub const SQL_TYPE: &str = "Microsoft.Sql/servers";

pub enum Script {
    /// Yield these names, then end
    Items(Vec<String>),
    /// Yield these names, then fail with the message
    FailAfter(Vec<String>, String),
    /// Fail before yielding anything
    Fail(String),
    /// Wait for the gate, then yield these names
    Gated(Vec<String>, Arc<Notify>),
    /// Sleep, then yield these names
    Delayed(Vec<String>, Duration),
    /// Forward whatever the test sends until the sender is dropped
    Channel(mpsc::UnboundedReceiver<Result<String, String>>),
    /// Never answer until cancelled
    Hang,
    /// Panic inside the listing call
    Panic,
}

#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

pub fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn descriptor(name: &str, resource_type: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(format!("/test/{}/{}", resource_type, name), name, resource_type)
}

/// Decrements the in-flight counter when the listing future finishes or is dropped
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, resource_type: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(resource_type.to_lowercase(), script);
        self
    }

    pub fn calls(&self, resource_type: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&resource_type.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_script(&self, resource_type: &str) -> Option<Script> {
        let mut scripts = self.scripts.lock().unwrap();
        let key = resource_type.to_lowercase();
        // Channels can only be consumed once; everything else is replayable.
        if matches!(scripts.get(&key)?, Script::Channel(_)) {
            return scripts.remove(&key);
        }
        match scripts.get(&key)? {
            Script::Channel(_) => None,
            Script::Items(items) => Some(Script::Items(items.clone())),
            Script::FailAfter(items, message) => {
                Some(Script::FailAfter(items.clone(), message.clone()))
            }
            Script::Fail(message) => Some(Script::Fail(message.clone())),
            Script::Gated(items, gate) => Some(Script::Gated(items.clone(), gate.clone())),
            Script::Delayed(items, delay) => Some(Script::Delayed(items.clone(), *delay)),
            Script::Hang => Some(Script::Hang),
            Script::Panic => Some(Script::Panic),
        }
    }
}

fn ok_stream(items: Vec<String>, resource_type: &str) -> DescriptorStream {
    let resource_type = resource_type.to_string();
    futures::stream::iter(
        items
            .into_iter()
            .map(move |name| Ok(descriptor(&name, &resource_type))),
    )
    .boxed()
}

#[async_trait]
impl ResourceProvider for ScriptedProvider {
    async fn list_resources(
        &self,
        _scope: &Scope,
        resource_type: &str,
        cancel: CancellationToken,
    ) -> Result<DescriptorStream, ProviderError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(resource_type.to_lowercase())
            .or_insert(0) += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(self.in_flight.clone());

        let Some(script) = self.take_script(resource_type) else {
            return Ok(futures::stream::empty().boxed());
        };
        match script {
            Script::Items(items) => Ok(ok_stream(items, resource_type)),
            Script::FailAfter(items, message) => {
                let failure =
                    futures::stream::once(async move { Err(ProviderError::failed(message)) });
                Ok(ok_stream(items, resource_type).chain(failure).boxed())
            }
            Script::Fail(message) => Err(ProviderError::failed(message)),
            Script::Gated(items, gate) => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    _ = gate.notified() => {}
                }
                Ok(ok_stream(items, resource_type))
            }
            Script::Delayed(items, delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                Ok(ok_stream(items, resource_type))
            }
            Script::Channel(rx) => {
                let resource_type = resource_type.to_string();
                Ok(futures::stream::unfold(rx, move |mut rx| {
                    let resource_type = resource_type.clone();
                    async move {
                        let item = rx.recv().await?;
                        let item = item
                            .map(|name| descriptor(&name, &resource_type))
                            .map_err(ProviderError::failed);
                        Some((item, rx))
                    }
                })
                .boxed())
            }
            Script::Hang => {
                cancel.cancelled().await;
                Err(ProviderError::Cancelled)
            }
            Script::Panic => panic!("scripted provider panic for {}", resource_type),
        }
    }
}

pub fn config(categories: &[(&str, &str)]) -> ExplorerConfig {
    ExplorerConfig {
        categories: categories
            .iter()
            .map(|(label, resource_type)| CategoryConfig::new(label, resource_type))
            .collect(),
        ..Default::default()
    }
}

pub fn context(provider: Arc<ScriptedProvider>, config: ExplorerConfig) -> ExplorerContext {
    ExplorerContext::new(
        provider,
        Arc::new(SnapshotProvider::default()),
        Arc::new(DefaultNodeFactory),
        config,
    )
}

/// Inventory used by the snapshot-backed tests
pub const INVENTORY_JSON: &str = r#"{
  "accounts": [
    {
      "id": "contoso",
      "label": "Contoso",
      "subscriptions": [
        {
          "id": "sub-prod",
          "label": "Production",
          "state": "Enabled",
          "resource_groups": [
            {
              "name": "rg-web",
              "location": "westeurope",
              "resources": [
                { "name": "web-frontend", "type": "Microsoft.Web/sites", "state": "Running",
                  "children": [{ "name": "staging", "type": "Microsoft.Web/sites/slots" }] },
                { "name": "kv-orders", "type": "Microsoft.KeyVault/vaults" },
                { "name": "sql-main", "type": "Microsoft.Sql/servers", "state": "Ready",
                  "children": [
                    { "name": "orders", "type": "Microsoft.Sql/servers/databases" },
                    { "name": "Billing", "type": "Microsoft.Sql/servers/databases" }
                  ] },
                { "name": "cdn-edge", "type": "Microsoft.Cdn/profiles" }
              ]
            }
          ]
        }
      ]
    },
    {
      "id": "fabrikam",
      "label": "Fabrikam",
      "subscriptions": [
        {
          "id": "sub-dev",
          "label": "Dev",
          "resource_groups": [
            { "name": "rg-data", "resources": [
                { "name": "vault-orders-dev", "type": "Microsoft.KeyVault/vaults" }
            ] }
          ]
        }
      ]
    }
  ]
}"#;

/// Write the test inventory to a temp dir and return both (the dir must outlive the file)
pub fn inventory_file() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inventory.json");
    std::fs::write(&path, INVENTORY_JSON).unwrap();
    (dir, path)
}
