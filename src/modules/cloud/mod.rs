//! Cloud provider modules for infrastructure provisioning.
//!
//! - **Azure**: Orchestrated (Flexible) Virtual Machine Scale Sets
//!
//! ## Example
//!
//! ```yaml
//! - name: Create a flexible scale set
//!   azure_orchestrated_vmss:
//!     name: web-vmss
//!     resource_group_name: my-rg
//!     location: West Europe
//!     platform_fault_domain_count: 2
//!     state: present
//! ```

pub mod azure;

pub use azure::AzureOrchestratedVmssModule;
