//! # rustible-vmss - Declarative Azure Orchestrated Scale Sets
//!
//! rustible-vmss manages Azure Orchestrated (Flexible) Virtual Machine Scale
//! Sets through the Compute management API, exposed both as a library and as
//! a Rustible-style module.
//!
//! ## Core Concepts
//!
//! - **Schema**: typed attribute definitions with defaults, validators and
//!   diff suppression
//! - **Resource**: create, read, update, delete and import of one scale set
//! - **Module**: idempotent `present`/`absent` wrapper with check mode
//! - **Client**: async management API client that follows long-running
//!   operations to completion
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           CLI Interface                              │
//! │                    (clap-based command parsing)                      │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                  Module Registry / azure_orchestrated_vmss           │
//! │                 (present/absent, check mode, diffs)                  │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    OrchestratedVmssResource                          │
//! │          (schema validation, expand/flatten, CRUD + import)          │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │              VirtualMachineScaleSetsClient (reqwest)                 │
//! │                  (Azure-AsyncOperation polling)                      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rustible_vmss::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let client = RestScaleSetClient::builder()
//!         .subscription_id("00000000-0000-0000-0000-000000000000")
//!         .access_token(std::env::var("AZURE_ACCESS_TOKEN")?)
//!         .build()?;
//!
//!     let resource = OrchestratedVmssResource::new(
//!         Arc::new(client),
//!         ResourceSettings::from_config(&config),
//!     );
//!     let d = resource.import("/subscriptions/.../virtualMachineScaleSets/web").await?;
//!     println!("{:#?}", d.attributes());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Error handling
    pub use crate::error::{Error, ErrorContext, Result};

    // Configuration
    pub use crate::config::{Config, TimeoutsConfig};

    // Module system
    pub use crate::modules::{
        Module, ModuleContext, ModuleOutput, ModuleParams, ModuleRegistry, ModuleResult,
    };

    // Azure scale sets
    pub use crate::modules::cloud::azure::client::{
        RestScaleSetClient, VirtualMachineScaleSetsClient,
    };
    pub use crate::modules::cloud::azure::parse::{
        SharedGalleryImageVersionId, VirtualMachineScaleSetId,
    };
    pub use crate::modules::cloud::azure::schema::{ResourceData, ResourceDiff};
    pub use crate::modules::cloud::azure::vmss::{
        AzureOrchestratedVmssModule, OrchestratedVmssResource, ResourceSettings, VmssError,
    };
}

/// Error types and result aliases.
///
/// The crate-level [`Error`](error::Error) wraps the layered errors of the
/// resource, the API client and the module framework.
pub mod error;

/// Configuration loading from files and the environment.
pub mod config;

/// Module system and the Azure scale set module.
///
/// Modules are the units of work: each takes a parameter map and reports
/// whether anything changed.
pub mod modules;

/// Crate version, taken from Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
