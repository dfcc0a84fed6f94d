//! Lifecycle of an Orchestrated Virtual Machine Scale Set.
//!
//! [`OrchestratedVmssResource`] maps a [`ResourceData`] onto Compute API
//! calls. Every operation runs under its configured timeout and finishes by
//! reading the scale set back, so the data always reflects what Azure holds.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use super::super::client::VirtualMachineScaleSetsClient;
use super::super::helpers::{
    expand_orchestrated_sku, expand_tags, expand_zones, flatten_orchestrated_sku, flatten_tags,
    flatten_zones, normalize_location,
};
use super::super::models::{
    BillingProfile, EvictionPolicy, ExpandTypes, NetworkProfile, OrchestrationMode, Priority,
    Properties, SecurityProfile, StorageProfile, SubResource, UpdateOsProfile, UpdateProperties,
    UpdateStorageProfile, UpdateVmProfile, VirtualMachineScaleSet, VirtualMachineScaleSetUpdate,
    VmProfile, LinuxConfiguration, WindowsConfiguration,
};
use super::super::parse::VirtualMachineScaleSetId;
use super::super::schema::{first_block, BlockExt, ResourceData, ResourceSchema};
use super::super::NETWORK_API_VERSION;
use super::extensions::{expand_extensions, flatten_extensions};
use super::network::{expand_network_interfaces, flatten_network_interfaces};
use super::os_profile::{
    expand_os_profile, expand_ssh_keys, expand_windows_secrets, expand_winrm_listeners,
    flatten_os_profile,
};
use super::profile::{
    expand_automatic_repairs_policy, expand_boot_diagnostics, expand_identity, expand_plan,
    expand_terminate_notification, flatten_automatic_repairs_policy, flatten_boot_diagnostics,
    flatten_identity, flatten_plan, flatten_terminate_notification,
};
use super::schema::{resource_schema, DEFAULT_EXTENSIONS_TIME_BUDGET};
use super::storage::{
    expand_data_disks, expand_os_disk, expand_os_disk_update, expand_source_image_reference,
    flatten_data_disks, flatten_os_disk, flatten_source_image_reference,
    os_disk_update_from_existing,
};
use super::{ResourceSettings, VmssError, VmssResult};

fn describe(name: &str, resource_group: &str) -> String {
    format!(
        "Orchestrated Virtual Machine Scale Set {:?} (Resource Group {:?})",
        name, resource_group
    )
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

async fn with_timeout<T, F>(operation: &'static str, after: Duration, fut: F) -> VmssResult<T>
where
    F: Future<Output = VmssResult<T>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| VmssError::Timeout { operation, after })?
}

/// Manages orchestrated scale sets through a [`VirtualMachineScaleSetsClient`]
#[derive(Clone)]
pub struct OrchestratedVmssResource {
    client: Arc<dyn VirtualMachineScaleSetsClient>,
    settings: ResourceSettings,
    schema: Arc<ResourceSchema>,
}

impl OrchestratedVmssResource {
    pub fn new(client: Arc<dyn VirtualMachineScaleSetsClient>, settings: ResourceSettings) -> Self {
        let schema = Arc::new(resource_schema().with_timeouts(settings.timeouts));
        Self {
            client,
            settings,
            schema,
        }
    }

    pub fn schema(&self) -> Arc<ResourceSchema> {
        Arc::clone(&self.schema)
    }

    pub fn settings(&self) -> &ResourceSettings {
        &self.settings
    }

    pub fn subscription_id(&self) -> &str {
        self.client.subscription_id()
    }

    /// Data for a scale set that does not exist yet
    pub fn new_data(&self, config: Map<String, Value>) -> ResourceData {
        ResourceData::new(self.schema(), config)
    }

    /// Data for an existing scale set identified by `id`
    pub fn existing_data(&self, id: impl Into<String>, state: Map<String, Value>) -> ResourceData {
        ResourceData::from_state(self.schema(), id, state)
    }

    /// Validate a configuration against the schema
    pub fn validate(&self, config: &Map<String, Value>) -> VmssResult<()> {
        let diags = self.schema.validate(config);
        for warning in &diags.warnings {
            tracing::warn!("{}", warning);
        }
        if diags.has_errors() {
            return Err(VmssError::Validation {
                errors: diags.errors,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Create
    // ========================================================================

    #[instrument(skip(self, d), fields(name = %d.get_str("name")))]
    pub async fn create(&self, d: &mut ResourceData) -> VmssResult<()> {
        with_timeout("create", self.settings.timeouts.create, self.create_inner(d)).await
    }

    async fn create_inner(&self, d: &mut ResourceData) -> VmssResult<()> {
        let name = d.get_str("name");
        let resource_group = d.get_str("resource_group_name");
        let context = describe(&name, &resource_group);

        // Every guard runs before the first API call
        let parameters = expand_create_parameters(d)?;

        if d.is_new_resource() {
            match self
                .client
                .get(&resource_group, &name, Some(ExpandTypes::UserData))
                .await
            {
                Ok(existing) => {
                    if let Some(id) = existing.id.filter(|id| !id.is_empty()) {
                        return Err(VmssError::AlreadyExists { id });
                    }
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(VmssError::api(
                        format!("checking for existing {}", context),
                        e,
                    ))
                }
            }
        }

        debug!("Creating {}..", context);
        let operation = self
            .client
            .create_or_update(&resource_group, &name, &parameters)
            .await
            .map_err(|e| VmssError::api(format!("creating {}", context), e))?;

        debug!("Waiting for {} to be created..", context);
        self.client
            .wait_for_completion(operation)
            .await
            .map_err(|e| VmssError::api(format!("waiting for creation of {}", context), e))?;
        info!("{} was created", context);

        debug!("Retrieving {}..", context);
        let created = self
            .client
            .get(&resource_group, &name, Some(ExpandTypes::UserData))
            .await
            .map_err(|e| VmssError::api(format!("retrieving {}", context), e))?;

        let id = created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| VmssError::missing(format!("retrieving {}", context), "id"))?;
        d.set_id(id);

        self.read_inner(d).await
    }

    // ========================================================================
    // Read
    // ========================================================================

    #[instrument(skip(self, d), fields(id = %d.id()))]
    pub async fn read(&self, d: &mut ResourceData) -> VmssResult<()> {
        with_timeout("read", self.settings.timeouts.read, self.read_inner(d)).await
    }

    async fn read_inner(&self, d: &mut ResourceData) -> VmssResult<()> {
        let id = VirtualMachineScaleSetId::parse(d.id())?;

        let resp = match self
            .client
            .get(&id.resource_group, &id.name, Some(ExpandTypes::UserData))
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                debug!(
                    "Orchestrated Virtual Machine Scale Set {:?} was not found in Resource Group \
                     {:?} - removing from state!",
                    id.name, id.resource_group
                );
                d.set_id("");
                return Ok(());
            }
            Err(e) => {
                return Err(VmssError::api(
                    format!("retrieving {}", describe(&id.name, &id.resource_group)),
                    e,
                ))
            }
        };

        flatten_scale_set(d, &id, &resp)
    }

    // ========================================================================
    // Update
    // ========================================================================

    #[instrument(skip(self, d), fields(id = %d.id()))]
    pub async fn update(&self, d: &mut ResourceData) -> VmssResult<()> {
        with_timeout("update", self.settings.timeouts.update, self.update_inner(d)).await
    }

    async fn update_inner(&self, d: &mut ResourceData) -> VmssResult<()> {
        let id = VirtualMachineScaleSetId::parse(d.id())?;
        let context = describe(&id.name, &id.resource_group);

        let existing = self
            .client
            .get(&id.resource_group, &id.name, Some(ExpandTypes::UserData))
            .await
            .map_err(|e| VmssError::api(format!("retrieving {}", context), e))?;

        let update = expand_update_parameters(d, &existing, &context)?;

        debug!("Updating {}..", context);
        let operation = self
            .client
            .update(&id.resource_group, &id.name, &update)
            .await
            .map_err(|e| VmssError::api(format!("updating {}", context), e))?;

        debug!("Waiting for {} to be updated..", context);
        self.client
            .wait_for_completion(operation)
            .await
            .map_err(|e| VmssError::api(format!("waiting for update of {}", context), e))?;
        info!("{} was updated", context);

        self.read_inner(d).await
    }

    // ========================================================================
    // Delete
    // ========================================================================

    #[instrument(skip(self, d), fields(id = %d.id()))]
    pub async fn delete(&self, d: &mut ResourceData) -> VmssResult<()> {
        with_timeout("delete", self.settings.timeouts.delete, self.delete_inner(d)).await
    }

    async fn delete_inner(&self, d: &mut ResourceData) -> VmssResult<()> {
        let id = VirtualMachineScaleSetId::parse(d.id())?;
        let context = describe(&id.name, &id.resource_group);

        let resp = match self
            .client
            .get(&id.resource_group, &id.name, Some(ExpandTypes::UserData))
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                d.set_id("");
                return Ok(());
            }
            Err(e) => return Err(VmssError::api(format!("retrieving {}", context), e)),
        };

        // Scaling to zero first releases the network interfaces, otherwise
        // subnets can stay "in use" after the delete returns
        match resp.sku {
            Some(mut sku) if self.settings.scale_to_zero_before_deletion => {
                sku.capacity = Some(0);

                debug!("Scaling instances to 0 prior to deletion - this helps avoids networking issues within Azure");
                let update = VirtualMachineScaleSetUpdate {
                    sku: Some(sku),
                    ..Default::default()
                };
                let operation = self
                    .client
                    .update(&id.resource_group, &id.name, &update)
                    .await
                    .map_err(|e| {
                        VmssError::api(
                            format!("updating number of instances in {} to scale to 0", context),
                            e,
                        )
                    })?;

                debug!("Waiting for scaling of instances to 0 prior to deletion - this helps avoids networking issues within Azure");
                self.client
                    .wait_for_completion(operation)
                    .await
                    .map_err(|e| {
                        VmssError::api(
                            format!(
                                "waiting for number of instances in {} to scale to 0",
                                context
                            ),
                            e,
                        )
                    })?;
                debug!("Scaled instances to 0 prior to deletion - this helps avoids networking issues within Azure");
            }
            Some(_) => {
                debug!("Scaling instances to 0 before deletion is disabled - deleting {}", context);
            }
            None => {
                debug!("Unable to scale instances to `0` since the `sku` block is nil - trying to delete anyway");
            }
        }

        debug!("Deleting {}..", context);
        let operation = self
            .client
            .delete(&id.resource_group, &id.name, None)
            .await
            .map_err(|e| VmssError::api(format!("deleting {}", context), e))?;

        debug!("Waiting for deletion of {}..", context);
        self.client
            .wait_for_completion(operation)
            .await
            .map_err(|e| VmssError::api(format!("waiting for deletion of {}", context), e))?;
        info!("Deleted {}.", context);

        d.set_id("");
        Ok(())
    }

    // ========================================================================
    // Import
    // ========================================================================

    /// Adopt an existing Flexible scale set by its resource ID
    #[instrument(skip(self))]
    pub async fn import(&self, id: &str) -> VmssResult<ResourceData> {
        with_timeout("import", self.settings.timeouts.read, self.import_inner(id)).await
    }

    async fn import_inner(&self, id: &str) -> VmssResult<ResourceData> {
        let parsed = VirtualMachineScaleSetId::parse(id)?;
        let context = describe(&parsed.name, &parsed.resource_group);

        let resp = self
            .client
            .get(&parsed.resource_group, &parsed.name, Some(ExpandTypes::UserData))
            .await
            .map_err(|e| VmssError::api(format!("retrieving {}", context), e))?;

        let props = resp
            .properties
            .as_ref()
            .ok_or_else(|| VmssError::missing(format!("retrieving {}", context), "properties"))?;

        if props.orchestration_mode != Some(OrchestrationMode::Flexible) {
            return Err(VmssError::NotFlexible { id: parsed.id() });
        }

        let mut d = self.existing_data(parsed.id(), Map::new());
        self.read_inner(&mut d).await?;
        Ok(d)
    }
}

// ============================================================================
// Request bodies
// ============================================================================

/// Build the PUT body for a new scale set, enforcing every cross-field rule
pub fn expand_create_parameters(d: &ResourceData) -> VmssResult<VirtualMachineScaleSet> {
    let name = d.get_str("name");
    let zones = expand_zones(&d.get_list("zones"));

    let mut props = Properties {
        platform_fault_domain_count: Some(VmssError::int32(
            "platform_fault_domain_count",
            d.get_i64("platform_fault_domain_count"),
        )?),
        single_placement_group: Some(false),
        orchestration_mode: Some(OrchestrationMode::Flexible),
        proximity_placement_group: non_empty(d.get_str("proximity_placement_group_id"))
            .map(SubResource::new),
        ..Default::default()
    };

    let sku_name = d.get_str("sku_name");
    let legacy = sku_name.is_empty();
    let sku = if legacy {
        None
    } else {
        Some(expand_orchestrated_sku(&sku_name).map_err(|e| VmssError::expand("sku_name", e))?)
    };

    let mut profile = VmProfile {
        storage_profile: Some(StorageProfile::default()),
        ..Default::default()
    };

    let (os_profile, os_type) = expand_os_profile(&name, &d.get_list("os_profile"))?;
    profile.os_profile = os_profile;

    let boot_diagnostics = d.get_list("boot_diagnostics");
    if !boot_diagnostics.is_empty() {
        profile.diagnostics_profile = Some(expand_boot_diagnostics(&boot_diagnostics));
    }

    let priority = match d.get_str("priority").as_str() {
        "" => None,
        raw => Some(
            raw.parse::<Priority>()
                .map_err(|e| VmssError::expand("priority", e))?,
        ),
    };
    profile.priority = priority;
    let is_spot = priority == Some(Priority::Spot);

    let storage = profile.storage_profile.get_or_insert_with(Default::default);
    storage.os_disk = expand_os_disk(&d.get_list("os_disk"), os_type)?;

    let image_reference = d.get_list("source_image_reference");
    let image_id = d.get_str("source_image_id");
    if !image_reference.is_empty() || !image_id.is_empty() {
        storage.image_reference = Some(expand_source_image_reference(&image_reference, &image_id)?);
    }

    let data_disks = d.get_list("data_disk");
    if !data_disks.is_empty() {
        storage.data_disks = Some(expand_data_disks(&data_disks, false)?);
    }

    let network_interfaces = d.get_list("network_interface");
    if !network_interfaces.is_empty() {
        profile.network_profile = Some(NetworkProfile {
            network_interface_configurations: Some(expand_network_interfaces(
                &network_interfaces,
            )?),
            network_api_version: Some(NETWORK_API_VERSION.to_string()),
        });
    }

    let extensions = d.get_list("extension");
    if !extensions.is_empty() {
        profile.extension_profile = Some(expand_extensions(&extensions)?);
    }

    if let Some(budget) = non_empty(d.get_str("extensions_time_budget")) {
        profile
            .extension_profile
            .get_or_insert_with(Default::default)
            .extensions_time_budget = Some(budget);
    }

    let max_bid_price = d.get_f64("max_bid_price");
    if max_bid_price > 0.0 {
        if !is_spot {
            return Err(VmssError::InvalidConfig(
                "`max_bid_price` can only be configured when `priority` is set to `Spot`"
                    .to_string(),
            ));
        }
        profile.billing_profile = Some(BillingProfile {
            max_price: Some(max_bid_price),
        });
    }

    if d.get_bool("encryption_at_host_enabled") {
        profile.security_profile = Some(SecurityProfile {
            encryption_at_host: Some(true),
        });
    }

    match non_empty(d.get_str("eviction_policy")) {
        Some(policy) => {
            if !is_spot {
                return Err(VmssError::InvalidConfig(
                    "an `eviction_policy` can only be specified when `priority` is set to `Spot`"
                        .to_string(),
                ));
            }
            profile.eviction_policy = Some(
                policy
                    .parse::<EvictionPolicy>()
                    .map_err(|e| VmssError::expand("eviction_policy", e))?,
            );
        }
        None if is_spot => {
            return Err(VmssError::InvalidConfig(
                "an `eviction_policy` must be specified when `priority` is set to `Spot`"
                    .to_string(),
            ));
        }
        None => {}
    }

    profile.license_type = non_empty(d.get_str("license_type"));
    profile.scheduled_events_profile =
        expand_terminate_notification(&d.get_list("terminate_notification"));

    let mut plan = None;
    let mut identity = None;
    if !legacy {
        plan = expand_plan(&d.get_list("plan"));

        let identity_raw = d.get_list("identity");
        if !identity_raw.is_empty() {
            identity = Some(expand_identity(&identity_raw)?);
        }

        let repairs = d.get_list("automatic_instance_repair");
        if !repairs.is_empty() {
            props.automatic_repairs_policy = Some(expand_automatic_repairs_policy(&repairs));
        }

        if d.get_bool("zone_balance") {
            if zones.is_none() {
                return Err(VmssError::InvalidConfig(
                    "`zone_balance` can only be set to `true` when zones are specified"
                        .to_string(),
                ));
            }
            props.zone_balance = Some(true);
        }

        props.virtual_machine_profile = Some(profile);
    }

    Ok(VirtualMachineScaleSet {
        location: Some(normalize_location(&d.get_str("location"))),
        tags: Some(expand_tags(&d.get_map("tags"))),
        sku,
        plan,
        identity,
        zones,
        properties: Some(props),
        ..Default::default()
    })
}

/// Build the PATCH body from the attributes that changed.
///
/// Instances are never rolled to the new model, so the "update instances"
/// result is only logged.
pub fn expand_update_parameters(
    d: &ResourceData,
    existing: &VirtualMachineScaleSet,
    context: &str,
) -> VmssResult<VirtualMachineScaleSetUpdate> {
    let legacy = existing.sku.is_none();
    let existing_props = existing
        .properties
        .as_ref()
        .ok_or_else(|| VmssError::missing(format!("retrieving {}", context), "properties"))?;

    let mut update = VirtualMachineScaleSetUpdate::default();
    let mut update_props = UpdateProperties::default();
    let mut update_instances = false;

    if !legacy {
        let existing_profile = existing_props.virtual_machine_profile.as_ref().ok_or_else(|| {
            VmssError::missing(
                format!("retrieving {}", context),
                "properties.virtualMachineProfile",
            )
        })?;
        let existing_storage = existing_profile.storage_profile.as_ref().ok_or_else(|| {
            VmssError::missing(
                format!("retrieving {}", context),
                "properties.virtualMachineProfile.storageProfile",
            )
        })?;

        // The API rejects updates without the image reference, so carry it forward
        let mut vm_profile = UpdateVmProfile {
            storage_profile: Some(UpdateStorageProfile {
                image_reference: existing_storage.image_reference.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };

        if d.has_change("max_bid_price") {
            if d.get_str("priority") != Priority::Spot.as_str() {
                return Err(VmssError::InvalidConfig(
                    "`max_bid_price` can only be configured when `priority` is set to `Spot`"
                        .to_string(),
                ));
            }
            vm_profile.billing_profile = Some(BillingProfile {
                max_price: Some(d.get_f64("max_bid_price")),
            });
        }

        if let Some(os_profile) = expand_os_profile_update(d, &mut update_instances) {
            vm_profile.os_profile = Some(os_profile);
        }

        if d.has_changes(&["data_disk", "os_disk", "source_image_id", "source_image_reference"]) {
            update_instances = true;
            let storage = vm_profile
                .storage_profile
                .get_or_insert_with(Default::default);

            if d.has_change("data_disk") {
                storage.data_disks = Some(expand_data_disks(&d.get_list("data_disk"), false)?);
            }

            if d.has_change("os_disk") {
                storage.os_disk = expand_os_disk_update(&d.get_list("os_disk"))?;
            }

            if d.has_changes(&["source_image_id", "source_image_reference"]) {
                let image = expand_source_image_reference(
                    &d.get_list("source_image_reference"),
                    &d.get_str("source_image_id"),
                )?;

                // Changing the image needs the whole storage profile
                storage.data_disks = existing_storage.data_disks.clone();
                storage.image_reference = Some(image);
                storage.os_disk = existing_storage
                    .os_disk
                    .as_ref()
                    .map(os_disk_update_from_existing);
            }
        }

        if d.has_change("network_interface") {
            vm_profile.network_profile = Some(NetworkProfile {
                network_interface_configurations: Some(expand_network_interfaces(
                    &d.get_list("network_interface"),
                )?),
                network_api_version: Some(NETWORK_API_VERSION.to_string()),
            });
        }

        if d.has_change("boot_diagnostics") {
            update_instances = true;
            vm_profile.diagnostics_profile =
                Some(expand_boot_diagnostics(&d.get_list("boot_diagnostics")));
        }

        if d.has_change("terminate_notification") {
            vm_profile.scheduled_events_profile =
                expand_terminate_notification(&d.get_list("terminate_notification"));
        }

        if d.has_change("encryption_at_host_enabled") {
            vm_profile.security_profile = Some(SecurityProfile {
                encryption_at_host: Some(d.get_bool("encryption_at_host_enabled")),
            });
        }

        if d.has_change("license_type") {
            // An empty license is only valid on create; updates must say `None`
            let license = non_empty(d.get_str("license_type")).unwrap_or_else(|| "None".to_string());
            vm_profile.license_type = Some(license);
        }

        if d.has_change("automatic_instance_repair") {
            update_props.automatic_repairs_policy = Some(expand_automatic_repairs_policy(
                &d.get_list("automatic_instance_repair"),
            ));
        }

        if d.has_change("identity") {
            update.identity = Some(expand_identity(&d.get_list("identity"))?);
        }

        if d.has_change("plan") {
            update.plan = expand_plan(&d.get_list("plan"));
        }

        if d.has_change("sku_name") {
            update_instances = true;
            update.sku = Some(
                expand_orchestrated_sku(&d.get_str("sku_name"))
                    .map_err(|e| VmssError::expand("sku_name", e))?,
            );
        }

        if d.has_changes(&["extension", "extensions_time_budget"]) {
            update_instances = true;
            let mut extension_profile = expand_extensions(&d.get_list("extension"))?;
            extension_profile.extensions_time_budget =
                Some(d.get_str("extensions_time_budget"));
            vm_profile.extension_profile = Some(extension_profile);
        }

        update_props.virtual_machine_profile = Some(vm_profile);
    }

    if d.has_change("proximity_placement_group_id") {
        if let Some(ppg) = non_empty(d.get_str("proximity_placement_group_id")) {
            update_instances = true;
            update_props.proximity_placement_group = Some(SubResource::new(ppg));
        }
    }

    if d.has_change("tags") {
        update.tags = Some(expand_tags(&d.get_map("tags")));
    }

    update.properties = Some(update_props);

    if update_instances {
        debug!("{} - updateInstances is true", context);
    }

    Ok(update)
}

/// Changed OS profile fields, or `None` when no OS profile is configured
fn expand_os_profile_update(d: &ResourceData, update_instances: &mut bool) -> Option<UpdateOsProfile> {
    let os_profile_raw = d.get_list("os_profile");
    let os_profile = first_block(&os_profile_raw)?;
    let mut update = UpdateOsProfile::default();

    if d.has_change("os_profile.0.custom_data") {
        *update_instances = true;
        // custom_data cannot be removed without replacing the scale set
        update.custom_data = Some(os_profile.get_str("custom_data"));
    }

    if let Some(windows) = first_block(&os_profile.get_list("windows_configuration")) {
        let path = |field: &str| format!("os_profile.0.windows_configuration.0.{}", field);
        let changed = |field: &str| d.has_change(&path(field));

        if ["enable_automatic_updates", "provision_vm_agent", "timezone", "secret", "winrm_listener"]
            .iter()
            .any(|f| changed(f))
        {
            *update_instances = true;
        }

        let mut config = WindowsConfiguration::default();
        if changed("enable_automatic_updates") {
            config.enable_automatic_updates = Some(windows.get_bool("enable_automatic_updates"));
        }
        if changed("provision_vm_agent") {
            config.provision_vm_agent = Some(windows.get_bool("provision_vm_agent"));
        }
        if changed("timezone") {
            config.time_zone = Some(windows.get_str("timezone"));
        }
        if changed("secret") {
            update.secrets = Some(expand_windows_secrets(&windows.get_list("secret")));
        }
        if changed("winrm_listener") {
            config.win_rm = Some(expand_winrm_listeners(&windows.get_list("winrm_listener")));
        }

        update.windows_configuration = Some(config);
    }

    if let Some(linux) = first_block(&os_profile.get_list("linux_configuration")) {
        let path = |field: &str| format!("os_profile.0.linux_configuration.0.{}", field);
        let changed = |field: &str| d.has_change(&path(field));

        if ["provision_vm_agent", "disable_password_authentication", "admin_ssh_key"]
            .iter()
            .any(|f| changed(f))
        {
            *update_instances = true;
        }

        let mut config = LinuxConfiguration::default();
        if changed("provision_vm_agent") {
            config.provision_vm_agent = Some(linux.get_bool("provision_vm_agent"));
        }
        if changed("disable_password_authentication") {
            config.disable_password_authentication =
                Some(linux.get_bool("disable_password_authentication"));
        }
        if changed("admin_ssh_key") {
            config
                .ssh
                .get_or_insert_with(Default::default)
                .public_keys = Some(expand_ssh_keys(&linux.get_list("admin_ssh_key")));
        }

        update.linux_configuration = Some(config);
    }

    Some(update)
}

// ============================================================================
// Read back
// ============================================================================

/// Record everything the API returned for `id` on `d`
fn flatten_scale_set(
    d: &mut ResourceData,
    id: &VirtualMachineScaleSetId,
    resp: &VirtualMachineScaleSet,
) -> VmssResult<()> {
    d.set("name", id.name.clone());
    d.set("resource_group_name", id.resource_group.clone());
    d.set(
        "location",
        resp.location
            .as_deref()
            .map(normalize_location)
            .unwrap_or_default(),
    );

    if let Some(sku) = &resp.sku {
        let sku_name = flatten_orchestrated_sku(sku)
            .map_err(|e| VmssError::InvalidConfig(format!("setting `sku_name`: {}", e)))?;
        d.set("sku_name", sku_name);
    }

    d.set("identity", flatten_identity(resp.identity.as_ref()));
    d.set("plan", flatten_plan(resp.plan.as_ref()));

    let props = resp.properties.as_ref().ok_or_else(|| {
        VmssError::missing(
            format!("retrieving {}", describe(&id.name, &id.resource_group)),
            "properties",
        )
    })?;

    d.set(
        "automatic_instance_repair",
        flatten_automatic_repairs_policy(props.automatic_repairs_policy.as_ref()),
    );
    d.set("platform_fault_domain_count", json!(props.platform_fault_domain_count));
    d.set(
        "proximity_placement_group_id",
        props
            .proximity_placement_group
            .as_ref()
            .and_then(|p| p.id.clone())
            .unwrap_or_default(),
    );
    d.set("unique_id", props.unique_id.clone().unwrap_or_default());
    d.set("zone_balance", props.zone_balance.unwrap_or(false));

    if let Some(profile) = &props.virtual_machine_profile {
        flatten_vm_profile(d, profile)?;
    }

    d.set("zones", flatten_zones(resp.zones.as_ref()));
    d.set("tags", flatten_tags(resp.tags.as_ref()));
    Ok(())
}

fn flatten_vm_profile(d: &mut ResourceData, profile: &VmProfile) -> VmssResult<()> {
    d.set(
        "boot_diagnostics",
        flatten_boot_diagnostics(profile.diagnostics_profile.as_ref()),
    );

    // No billing profile is returned when the price is unset
    let max_bid_price = profile
        .billing_profile
        .as_ref()
        .and_then(|b| b.max_price)
        .unwrap_or(-1.0);
    d.set("max_bid_price", max_bid_price);

    d.set(
        "eviction_policy",
        profile
            .eviction_policy
            .map(|p| p.as_str())
            .unwrap_or_default(),
    );
    d.set("license_type", profile.license_type.clone().unwrap_or_default());

    // An unassigned priority comes back empty
    d.set(
        "priority",
        profile.priority.unwrap_or(Priority::Regular).as_str(),
    );

    if let Some(storage) = &profile.storage_profile {
        d.set("os_disk", flatten_os_disk(storage.os_disk.as_ref()));
        d.set("data_disk", flatten_data_disks(storage.data_disks.as_ref()));
        d.set(
            "source_image_reference",
            flatten_source_image_reference(storage.image_reference.as_ref()),
        );
        d.set(
            "source_image_id",
            storage
                .image_reference
                .as_ref()
                .and_then(|r| r.id.clone())
                .unwrap_or_default(),
        );
    }

    if let Some(os_profile) = &profile.os_profile {
        let flattened = flatten_os_profile(os_profile, d);
        d.set("os_profile", flattened);
    }

    if let Some(network) = &profile.network_profile {
        d.set(
            "network_interface",
            flatten_network_interfaces(network.network_interface_configurations.as_ref()),
        );
    }

    if let Some(scheduled) = &profile.scheduled_events_profile {
        d.set(
            "terminate_notification",
            flatten_terminate_notification(Some(scheduled)),
        );
    }

    let extensions = flatten_extensions(profile.extension_profile.as_ref(), d)?;
    d.set("extension", extensions);

    d.set(
        "extensions_time_budget",
        profile
            .extension_profile
            .as_ref()
            .and_then(|e| e.extensions_time_budget.clone())
            .unwrap_or_else(|| DEFAULT_EXTENSIONS_TIME_BUDGET.to_string()),
    );

    d.set(
        "encryption_at_host_enabled",
        profile
            .security_profile
            .as_ref()
            .and_then(|s| s.encryption_at_host)
            .unwrap_or(false),
    );

    Ok(())
}
