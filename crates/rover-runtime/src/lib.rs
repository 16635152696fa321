//! Rover runtime — the resource manager layer.
//!
//! This crate turns declarative configuration into a live, connected
//! graph of running resources and keeps the two consistent as the
//! configuration is edited and as remote robots come and go.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  External collaborators                      │
//! │  config parser / diff producer · RPC transports · module    │
//! │  manager · concrete drivers                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓ traits
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 rover-runtime (THIS CRATE)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  manager   : ResourceManager — diff application, the        │
//! │              complete-config pass, remote reconciliation,   │
//! │              queries, teardown                              │
//! │  process   : ProcessManager — OS child processes, noop in   │
//! │              untrusted environments                         │
//! │  dial      : dial policy as data + the RemoteDialer seam    │
//! │  registry  : native constructors and RPC API descriptors    │
//! │  module    : ModuleManager seam for out-of-process drivers  │
//! │  trigger   : single-slot reconfigure wake channel           │
//! │  appimage  : one-shot AppImage environment scrub            │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! │  rover-resource : Resource, Graph, GraphNode, RemoteRobot   │
//! │  rover-types    : Api, ResourceName, Model, ErrorCode       │
//! ```
//!
//! # Typical wiring
//!
//! Startup code calls [`appimage::init`] once, builds a
//! [`ResourceRegistry`] of drivers, constructs the
//! [`ResourceManager`], and spawns one task draining the trigger
//! stream:
//!
//! ```ignore
//! appimage::init();
//! let manager = Arc::new(ResourceManager::new(opts, registry, None, dialer));
//! let mut wakes = manager.take_trigger_stream().expect("first take");
//! tokio::spawn({
//!     let manager = Arc::clone(&manager);
//!     async move {
//!         while wakes.triggered().await {
//!             manager.complete_config(&cancel).await;
//!         }
//!     }
//! });
//! ```

pub mod appimage;
pub mod config;
pub mod dial;
pub mod errors;
pub mod manager;
pub mod module;
pub mod process;
pub mod registry;
pub mod trigger;

pub use config::{Config, ConfigDiff, Credentials, ProcessConfig, RemoteAuth, RemoteConfig};
pub use dial::{
    remote_dial_options, DialError, DialOptions, EntityCredentials, ExternalAuthOptions,
    RemoteDialer, TlsConfig, WebRtcOptions,
};
pub use errors::ManagerError;
pub use manager::{
    remote_node_name, web_internal_name, MarkedRemoval, ResourceManager, ResourceManagerOptions,
};
pub use module::ModuleManager;
pub use process::{
    HostProcessManager, ManagedProcess, NoopProcessManager, ProcessError, ProcessManager,
    ShellProcess,
};
pub use registry::{ResourceConstructor, ResourceRegistry};
pub use trigger::{config_trigger, ConfigTrigger, ConfigTriggerStream};

// The resource and identity layers are part of this crate's public
// API surface.
pub use rover_resource::{
    CloseOnlyResource, Dependencies, Graph, GraphNode, ParentNotifier, RemoteRobot, Resource,
    ResourceConfig, ResourceError, RpcApi, RpcServiceDescriptor,
};
pub use rover_types::{Api, ApiKind, ApiNamespace, ErrorCode, Model, ResourceName};
