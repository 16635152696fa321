//! Resource contract, configuration, and dependency graph.
//!
//! This crate defines what a resource *is* and how resources relate,
//! independent of the manager that drives them:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     rover-runtime                            │
//! │  ResourceManager · process sub-manager · dial policy        │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 rover-resource (THIS CRATE)                  │
//! │  Resource trait   : one live driver                          │
//! │  ResourceConfig   : declarative description of one resource  │
//! │  GraphNode        : per-resource lifecycle state machine     │
//! │  Graph            : the typed acyclic dependency graph       │
//! │  RemoteRobot      : contract of a federated remote robot     │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       rover-types                            │
//! │  Api · ResourceName · Model · ErrorCode                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The graph owns structure only. Drivers are reached through
//! [`Resource`] trait objects; nodes are shared `Arc`s with interior
//! state, so handles stay valid while the graph mutates around them.

pub mod config;
pub mod errors;
pub mod graph;
pub mod node;
pub mod remote;
pub mod resource;

pub use config::ResourceConfig;
pub use errors::ResourceError;
pub use graph::Graph;
pub use node::{CloseOnlyResource, GraphNode};
pub use remote::{ParentNotifier, RemoteRobot, RpcApi, RpcServiceDescriptor};
pub use resource::{Dependencies, Resource};
