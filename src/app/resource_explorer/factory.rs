use super::node::{Node, TreeNode};
use super::provider::{ResourceDescriptor, Scope};

/// Pseudo resource type listed under an account node
pub const SUBSCRIPTIONS_TYPE: &str = "Microsoft.Resources/subscriptions";
/// Pseudo resource type listed under a subscription node
pub const RESOURCE_GROUPS_TYPE: &str = "Microsoft.Resources/resourceGroups";

/// Closed set of resource kinds the tree knows how to show.
///
/// Commands and icons switch on this tag instead of testing node types one by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Subscription,
    ResourceGroup,
    VirtualMachine,
    StorageAccount,
    BlobContainer,
    WebApp,
    DeploymentSlot,
    KeyVault,
    SqlServer,
    SqlDatabase,
    VirtualNetwork,
    Subnet,
}

impl ResourceKind {
    pub fn all() -> &'static [ResourceKind] {
        &[
            ResourceKind::Subscription,
            ResourceKind::ResourceGroup,
            ResourceKind::VirtualMachine,
            ResourceKind::StorageAccount,
            ResourceKind::BlobContainer,
            ResourceKind::WebApp,
            ResourceKind::DeploymentSlot,
            ResourceKind::KeyVault,
            ResourceKind::SqlServer,
            ResourceKind::SqlDatabase,
            ResourceKind::VirtualNetwork,
            ResourceKind::Subnet,
        ]
    }

    pub fn resource_type(self) -> &'static str {
        match self {
            ResourceKind::Subscription => SUBSCRIPTIONS_TYPE,
            ResourceKind::ResourceGroup => RESOURCE_GROUPS_TYPE,
            ResourceKind::VirtualMachine => "Microsoft.Compute/virtualMachines",
            ResourceKind::StorageAccount => "Microsoft.Storage/storageAccounts",
            ResourceKind::BlobContainer => {
                "Microsoft.Storage/storageAccounts/blobServices/containers"
            }
            ResourceKind::WebApp => "Microsoft.Web/sites",
            ResourceKind::DeploymentSlot => "Microsoft.Web/sites/slots",
            ResourceKind::KeyVault => "Microsoft.KeyVault/vaults",
            ResourceKind::SqlServer => "Microsoft.Sql/servers",
            ResourceKind::SqlDatabase => "Microsoft.Sql/servers/databases",
            ResourceKind::VirtualNetwork => "Microsoft.Network/virtualNetworks",
            ResourceKind::Subnet => "Microsoft.Network/virtualNetworks/subnets",
        }
    }

    /// Resource types are compared case-insensitively, as the management API does.
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.resource_type().eq_ignore_ascii_case(resource_type))
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ResourceKind::Subscription => "Subscription",
            ResourceKind::ResourceGroup => "Resource Group",
            ResourceKind::VirtualMachine => "Virtual Machine",
            ResourceKind::StorageAccount => "Storage Account",
            ResourceKind::BlobContainer => "Blob Container",
            ResourceKind::WebApp => "Web App",
            ResourceKind::DeploymentSlot => "Deployment Slot",
            ResourceKind::KeyVault => "Key Vault",
            ResourceKind::SqlServer => "SQL Server",
            ResourceKind::SqlDatabase => "SQL Database",
            ResourceKind::VirtualNetwork => "Virtual Network",
            ResourceKind::Subnet => "Subnet",
        }
    }

    /// Type listed when a node of this kind is expanded.
    ///
    /// Resource groups are special: they synthesize category nodes instead.
    pub fn child_resource_type(self) -> Option<&'static str> {
        match self {
            ResourceKind::Subscription => Some(RESOURCE_GROUPS_TYPE),
            ResourceKind::StorageAccount => Some(ResourceKind::BlobContainer.resource_type()),
            ResourceKind::WebApp => Some(ResourceKind::DeploymentSlot.resource_type()),
            ResourceKind::SqlServer => Some(ResourceKind::SqlDatabase.resource_type()),
            ResourceKind::VirtualNetwork => Some(ResourceKind::Subnet.resource_type()),
            _ => None,
        }
    }

    pub fn has_children(self) -> bool {
        self == ResourceKind::ResourceGroup || self.child_resource_type().is_some()
    }

    pub fn icon_key(self) -> &'static str {
        match self {
            ResourceKind::Subscription => "subscription",
            ResourceKind::ResourceGroup => "resource-group",
            ResourceKind::VirtualMachine => "virtual-machine",
            ResourceKind::StorageAccount => "storage-account",
            ResourceKind::BlobContainer => "blob-container",
            ResourceKind::WebApp => "web-app",
            ResourceKind::DeploymentSlot => "deployment-slot",
            ResourceKind::KeyVault => "key-vault",
            ResourceKind::SqlServer => "sql-server",
            ResourceKind::SqlDatabase => "sql-database",
            ResourceKind::VirtualNetwork => "virtual-network",
            ResourceKind::Subnet => "subnet",
        }
    }

    pub fn context_menu_id(self) -> u32 {
        match self {
            ResourceKind::Subscription => 10,
            ResourceKind::ResourceGroup => 11,
            ResourceKind::VirtualMachine => 20,
            ResourceKind::StorageAccount => 21,
            ResourceKind::BlobContainer => 22,
            ResourceKind::WebApp => 23,
            ResourceKind::DeploymentSlot => 24,
            ResourceKind::KeyVault => 25,
            ResourceKind::SqlServer => 26,
            ResourceKind::SqlDatabase => 27,
            ResourceKind::VirtualNetwork => 28,
            ResourceKind::Subnet => 29,
        }
    }

    /// Scope in which children of a node for `descriptor` are listed
    pub fn child_scope(self, parent_scope: &Scope, descriptor: &ResourceDescriptor) -> Scope {
        match self {
            ResourceKind::Subscription => parent_scope.clone().with_subscription(&descriptor.id),
            ResourceKind::ResourceGroup => {
                parent_scope.clone().with_resource_group(&descriptor.name)
            }
            _ => parent_scope.clone().with_parent_resource(&descriptor.id),
        }
    }
}

/// Turns provider descriptors into tree nodes.
///
/// `None` means the descriptor's type is not shown by this tree; loaders drop
/// it silently.
pub trait NodeFactory: Send + Sync {
    fn create_node(&self, descriptor: &ResourceDescriptor, scope: &Scope) -> Option<Node>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNodeFactory;

impl NodeFactory for DefaultNodeFactory {
    fn create_node(&self, descriptor: &ResourceDescriptor, scope: &Scope) -> Option<Node> {
        let kind = ResourceKind::from_resource_type(&descriptor.kind)?;
        let child_scope = kind.child_scope(scope, descriptor);
        Some(TreeNode::resource(descriptor.clone(), kind, child_scope))
    }
}
