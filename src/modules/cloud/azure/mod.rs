//! Azure cloud modules for infrastructure management.
//!
//! This module provides native Rust implementations for managing Azure resources
//! through the Compute management REST API.
//!
//! ## Available Modules
//!
//! - [`AzureOrchestratedVmssModule`](vmss::AzureOrchestratedVmssModule): Orchestrated
//!   (Flexible) Virtual Machine Scale Set lifecycle management
//!
//! ## Layout
//!
//! - [`schema`]: attribute schema, flat resource data and plan diffs
//! - [`parse`] / [`validate`]: resource ID parsing and attribute validators
//! - [`models`]: Compute API wire types
//! - [`client`]: management API client with long-running operation polling
//! - [`vmss`]: the scale set resource and its module wrapper
//!
//! ## Authentication
//!
//! Requests carry a bearer token taken from `AZURE_ACCESS_TOKEN` (or the
//! `azure.access_token` config key). The subscription comes from
//! `AZURE_SUBSCRIPTION_ID` or `azure.subscription_id`.
//!
//! ## Example
//!
//! ```yaml
//! - name: Create a flexible scale set
//!   azure_orchestrated_vmss:
//!     name: web-vmss
//!     resource_group_name: my-rg
//!     location: westeurope
//!     sku_name: Standard_D2s_v3_2
//!     platform_fault_domain_count: 2
//!     os_profile:
//!       - linux_configuration:
//!           - admin_username: azureuser
//!             admin_ssh_key:
//!               - username: azureuser
//!                 public_key: ssh-rsa AAAAB3...
//!     source_image_reference:
//!       - publisher: Canonical
//!         offer: 0001-com-ubuntu-server-focal
//!         sku: 20_04-lts
//!         version: latest
//!     os_disk:
//!       - caching: ReadWrite
//!         storage_account_type: Standard_LRS
//!     state: present
//! ```

pub mod client;
pub mod helpers;
pub mod models;
pub mod parse;
pub mod schema;
pub mod validate;
pub mod vmss;

pub use vmss::{AzureOrchestratedVmssModule, OrchestratedVmssResource};

/// Compute API version every request is pinned to
pub const API_VERSION: &str = "2021-07-01";

/// Network API version sent in scale set network profiles
pub const NETWORK_API_VERSION: &str = "2020-11-01";
