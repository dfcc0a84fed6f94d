//! Shared test utilities and fixtures for the rustible-vmss test suite.
//!
//! This module provides:
//! - An in-memory [`FakeScaleSetClient`] implementing the management API trait
//! - Configuration fixtures for scale sets
//! - Helpers to build resources and module parameters
//!
//! # Usage
//!
//! Include this module in your integration tests:
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use rustible_vmss::config::TimeoutsConfig;
use rustible_vmss::modules::cloud::azure::client::{
    AzureError, AzureResult, PendingOperation, VirtualMachineScaleSetsClient,
};
use rustible_vmss::modules::cloud::azure::models::{
    ExpandTypes, OrchestrationMode, VirtualMachineScaleSet, VirtualMachineScaleSetUpdate,
};
use rustible_vmss::modules::cloud::azure::parse::VirtualMachineScaleSetId;
use rustible_vmss::modules::cloud::azure::vmss::{OrchestratedVmssResource, ResourceSettings};
use rustible_vmss::modules::ModuleParams;

pub const SUBSCRIPTION_ID: &str = "00000000-0000-0000-0000-000000000000";
pub const RESOURCE_GROUP: &str = "acctestRG-vmss";
pub const NAME: &str = "acctestvmss";

/// The ID the fake assigns to `NAME` in `RESOURCE_GROUP`
pub fn scale_set_id() -> String {
    VirtualMachineScaleSetId::new(SUBSCRIPTION_ID, RESOURCE_GROUP, NAME).id()
}

// ============================================================================
// Fake management API
// ============================================================================

/// A request the fake client received
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get {
        name: String,
    },
    CreateOrUpdate {
        name: String,
        body: VirtualMachineScaleSet,
    },
    Update {
        name: String,
        body: VirtualMachineScaleSetUpdate,
    },
    Delete {
        name: String,
        force_deletion: Option<bool>,
    },
    Wait,
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::CreateOrUpdate { .. } | Call::Update { .. } | Call::Delete { .. }
        )
    }
}

/// In-memory stand-in for the Compute API.
///
/// PUT stores the body as the scale set, PATCH merges the fields the resource
/// sends, and write-only values are dropped the way the real API drops them.
pub struct FakeScaleSetClient {
    subscription_id: String,
    scale_sets: Mutex<HashMap<(String, String), VirtualMachineScaleSet>>,
    calls: Mutex<Vec<Call>>,
    fail_waits: AtomicBool,
    fail_gets: AtomicBool,
}

impl FakeScaleSetClient {
    /// Create a new empty fake
    pub fn new() -> Self {
        Self {
            subscription_id: SUBSCRIPTION_ID.to_string(),
            scale_sets: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_waits: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
        }
    }

    /// Store a scale set as though it had been created out of band
    pub fn insert(&self, resource_group: &str, name: &str, mut scale_set: VirtualMachineScaleSet) {
        scale_set.id = Some(VirtualMachineScaleSetId::new(&self.subscription_id, resource_group, name).id());
        scale_set.name = Some(name.to_string());
        self.scale_sets
            .lock()
            .unwrap()
            .insert((resource_group.to_string(), name.to_string()), scale_set);
    }

    pub fn scale_set(&self, resource_group: &str, name: &str) -> Option<VirtualMachineScaleSet> {
        self.scale_sets
            .lock()
            .unwrap()
            .get(&(resource_group.to_string(), name.to_string()))
            .cloned()
    }

    pub fn remove(&self, resource_group: &str, name: &str) {
        self.scale_sets
            .lock()
            .unwrap()
            .remove(&(resource_group.to_string(), name.to_string()));
    }

    /// Make every long-running operation end in `Failed`
    pub fn set_fail_waits(&self, fail: bool) {
        self.fail_waits.store(fail, Ordering::SeqCst);
    }

    /// Make every GET answer 500
    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn updates(&self) -> Vec<VirtualMachineScaleSetUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Update { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn not_found(name: &str) -> AzureError {
        AzureError::Api {
            status: 404,
            code: "ResourceNotFound".to_string(),
            message: format!("The Resource '{}' was not found.", name),
        }
    }
}

impl Default for FakeScaleSetClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop the values the API never returns
fn strip_write_only(scale_set: &mut VirtualMachineScaleSet) {
    let profile = scale_set
        .properties
        .as_mut()
        .and_then(|p| p.virtual_machine_profile.as_mut());

    if let Some(profile) = profile {
        if let Some(os) = profile.os_profile.as_mut() {
            os.admin_password = None;
            os.custom_data = None;
        }
        if let Some(extensions) = profile
            .extension_profile
            .as_mut()
            .and_then(|e| e.extensions.as_mut())
        {
            for ext in extensions {
                if let Some(props) = ext.properties.as_mut() {
                    props.protected_settings = None;
                }
            }
        }
    }
}

fn merge_update(existing: &mut VirtualMachineScaleSet, update: &VirtualMachineScaleSetUpdate) {
    if let Some(sku) = &update.sku {
        existing.sku = Some(sku.clone());
    }
    if let Some(tags) = &update.tags {
        existing.tags = Some(tags.clone());
    }
    if let Some(identity) = &update.identity {
        existing.identity = Some(identity.clone());
    }
    if let Some(plan) = &update.plan {
        existing.plan = Some(plan.clone());
    }

    let (Some(props), Some(update_props)) = (existing.properties.as_mut(), update.properties.as_ref())
    else {
        return;
    };

    if let Some(repairs) = &update_props.automatic_repairs_policy {
        props.automatic_repairs_policy = Some(repairs.clone());
    }
    if let Some(ppg) = &update_props.proximity_placement_group {
        props.proximity_placement_group = Some(ppg.clone());
    }

    let (Some(profile), Some(update_profile)) = (
        props.virtual_machine_profile.as_mut(),
        update_props.virtual_machine_profile.as_ref(),
    ) else {
        return;
    };

    if let Some(license) = &update_profile.license_type {
        profile.license_type = Some(license.clone());
    }
    if let Some(billing) = &update_profile.billing_profile {
        profile.billing_profile = Some(billing.clone());
    }
    if let Some(diagnostics) = &update_profile.diagnostics_profile {
        profile.diagnostics_profile = Some(diagnostics.clone());
    }
    if let Some(security) = &update_profile.security_profile {
        profile.security_profile = Some(security.clone());
    }
    if let Some(scheduled) = &update_profile.scheduled_events_profile {
        profile.scheduled_events_profile = Some(scheduled.clone());
    }
    if let Some(extensions) = &update_profile.extension_profile {
        profile.extension_profile = Some(extensions.clone());
    }
    if let Some(network) = &update_profile.network_profile {
        profile.network_profile = Some(network.clone());
    }
    if let Some(storage) = &update_profile.storage_profile {
        let existing_storage = profile.storage_profile.get_or_insert_with(Default::default);
        if let Some(image) = &storage.image_reference {
            existing_storage.image_reference = Some(image.clone());
        }
        if let Some(disks) = &storage.data_disks {
            existing_storage.data_disks = Some(disks.clone());
        }
    }
}

#[async_trait]
impl VirtualMachineScaleSetsClient for FakeScaleSetClient {
    fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    async fn get(
        &self,
        resource_group: &str,
        name: &str,
        _expand: Option<ExpandTypes>,
    ) -> AzureResult<VirtualMachineScaleSet> {
        self.record(Call::Get {
            name: name.to_string(),
        });

        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(AzureError::Api {
                status: 500,
                code: "InternalServerError".to_string(),
                message: "boom".to_string(),
            });
        }

        self.scale_set(resource_group, name)
            .ok_or_else(|| Self::not_found(name))
    }

    async fn create_or_update(
        &self,
        resource_group: &str,
        name: &str,
        parameters: &VirtualMachineScaleSet,
    ) -> AzureResult<PendingOperation> {
        self.record(Call::CreateOrUpdate {
            name: name.to_string(),
            body: parameters.clone(),
        });

        let mut stored = parameters.clone();
        stored.resource_type = Some("Microsoft.Compute/virtualMachineScaleSets".to_string());
        if let Some(props) = stored.properties.as_mut() {
            props.unique_id = Some(format!("uid-{}", name));
            props.provisioning_state = Some("Succeeded".to_string());
        }
        strip_write_only(&mut stored);
        self.insert(resource_group, name, stored);

        Ok(PendingOperation::AsyncOperation {
            url: format!("https://management.azure.com/operations/{}", name),
            retry_after: None,
        })
    }

    async fn update(
        &self,
        resource_group: &str,
        name: &str,
        parameters: &VirtualMachineScaleSetUpdate,
    ) -> AzureResult<PendingOperation> {
        self.record(Call::Update {
            name: name.to_string(),
            body: parameters.clone(),
        });

        let mut sets = self.scale_sets.lock().unwrap();
        let existing = sets
            .get_mut(&(resource_group.to_string(), name.to_string()))
            .ok_or_else(|| Self::not_found(name))?;
        merge_update(existing, parameters);
        strip_write_only(existing);

        Ok(PendingOperation::Completed)
    }

    async fn delete(
        &self,
        resource_group: &str,
        name: &str,
        force_deletion: Option<bool>,
    ) -> AzureResult<PendingOperation> {
        self.record(Call::Delete {
            name: name.to_string(),
            force_deletion,
        });
        self.remove(resource_group, name);
        Ok(PendingOperation::Completed)
    }

    async fn wait_for_completion(&self, _operation: PendingOperation) -> AzureResult<()> {
        self.record(Call::Wait);

        if self.fail_waits.load(Ordering::SeqCst) {
            return Err(AzureError::OperationFailed {
                status: "Failed".to_string(),
                code: "AllocationFailed".to_string(),
                message: "Allocation failed.".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A minimal Linux scale set with one instance
pub fn linux_config() -> Map<String, Value> {
    object(json!({
        "name": NAME,
        "resource_group_name": RESOURCE_GROUP,
        "location": "West Europe",
        "platform_fault_domain_count": 2,
        "sku_name": "Standard_F2_1",
        "os_profile": [{
            "linux_configuration": [{
                "admin_username": "adminuser",
                "admin_password": "P@ssw0rd1234!",
                "disable_password_authentication": false,
            }],
        }],
        "source_image_reference": [{
            "publisher": "Canonical",
            "offer": "UbuntuServer",
            "sku": "18.04-LTS",
            "version": "latest",
        }],
        "os_disk": [{
            "caching": "ReadWrite",
            "storage_account_type": "Standard_LRS",
        }],
        "network_interface": [{
            "name": "nic",
            "primary": true,
            "ip_configuration": [{
                "name": "internal",
                "primary": true,
                "subnet_id": "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/acctestRG-vmss/providers/Microsoft.Network/virtualNetworks/vnet/subnets/internal",
            }],
        }],
        "tags": {"env": "test"},
    }))
}

/// A scale set without `sku_name`, which the API treats as an empty shell
pub fn legacy_config() -> Map<String, Value> {
    object(json!({
        "name": NAME,
        "resource_group_name": RESOURCE_GROUP,
        "location": "West Europe",
        "platform_fault_domain_count": 1,
    }))
}

/// A Uniform scale set as it would come back from the API
pub fn uniform_scale_set() -> VirtualMachineScaleSet {
    serde_json::from_value(json!({
        "location": "westeurope",
        "sku": {"name": "Standard_F2", "capacity": 2},
        "properties": {
            "orchestrationMode": "Uniform",
            "platformFaultDomainCount": 5,
        },
    }))
    .unwrap()
}

pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("fixture must be an object")
}

pub fn with(mut config: Map<String, Value>, key: &str, value: Value) -> Map<String, Value> {
    config.insert(key.to_string(), value);
    config
}

pub fn params(config: Map<String, Value>) -> ModuleParams {
    config.into_iter().collect()
}

/// Short timeouts so a hung operation fails the test quickly
pub fn test_settings() -> ResourceSettings {
    ResourceSettings {
        timeouts: TimeoutsConfig {
            create: std::time::Duration::from_secs(10),
            read: std::time::Duration::from_secs(10),
            update: std::time::Duration::from_secs(10),
            delete: std::time::Duration::from_secs(10),
        },
        scale_to_zero_before_deletion: true,
    }
}

pub fn fake_resource() -> (Arc<FakeScaleSetClient>, OrchestratedVmssResource) {
    let client = Arc::new(FakeScaleSetClient::new());
    let resource = OrchestratedVmssResource::new(client.clone(), test_settings());
    (client, resource)
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert that no PUT, PATCH or DELETE was sent
pub fn assert_no_mutations(client: &FakeScaleSetClient) {
    let mutations = client.mutations();
    assert!(
        mutations.is_empty(),
        "expected no mutating calls, got {:?}",
        mutations
    );
}
