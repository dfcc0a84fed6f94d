//! Attribute schema of the orchestrated scale set resource.

use serde_json::Value;

use super::super::schema::{
    block, suppress_case_difference, suppress_location_difference, Attributes, ResourceSchema,
    Schema,
};
use super::super::validate::{self, int_between, iso8601_duration_between, string_in_slice};

/// Resource type name used in messages and the module registry
pub const RESOURCE_TYPE: &str = "azure_orchestrated_vmss";

/// Default `extensions_time_budget`
pub const DEFAULT_EXTENSIONS_TIME_BUDGET: &str = "PT1H30M";

const CACHING_TYPES: &[&str] = &["None", "ReadOnly", "ReadWrite"];

const OS_DISK_STORAGE_TYPES: &[&str] = &[
    "Premium_LRS",
    "Standard_LRS",
    "StandardSSD_LRS",
    "Premium_ZRS",
    "StandardSSD_ZRS",
];

const DATA_DISK_STORAGE_TYPES: &[&str] = &[
    "Premium_LRS",
    "Standard_LRS",
    "StandardSSD_LRS",
    "Premium_ZRS",
    "StandardSSD_ZRS",
    "UltraSSD_LRS",
];

const IDENTITY_TYPES: &[&str] = &["SystemAssigned", "UserAssigned", "SystemAssigned, UserAssigned"];

/// Build the full resource schema
pub fn resource_schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .attribute(
            "name",
            Schema::string()
                .required()
                .force_new()
                .validate(validate::virtual_machine_name),
        )
        .attribute(
            "resource_group_name",
            Schema::string()
                .required()
                .force_new()
                .validate(validate::resource_group_name),
        )
        .attribute(
            "location",
            Schema::string()
                .required()
                .force_new()
                .validate(validate::string_is_not_empty)
                .diff_suppress(suppress_location_difference),
        )
        .attribute("network_interface", network_interface_schema())
        .attribute("os_disk", os_disk_schema())
        .attribute(
            "sku_name",
            Schema::string().optional().validate(validate::orchestrated_sku),
        )
        .attribute("os_profile", os_profile_schema())
        .attribute("automatic_instance_repair", automatic_repairs_schema())
        .attribute("boot_diagnostics", boot_diagnostics_schema())
        .attribute("data_disk", data_disk_schema())
        .attribute("encryption_at_host_enabled", Schema::bool().optional())
        .attribute(
            "eviction_policy",
            Schema::string()
                .optional()
                .force_new()
                .with_validator(string_in_slice(&["Deallocate", "Delete"], false)),
        )
        .attribute("extension", extension_schema())
        .attribute(
            "extensions_time_budget",
            Schema::string()
                .optional()
                .default_value(DEFAULT_EXTENSIONS_TIME_BUDGET)
                .with_validator(iso8601_duration_between("PT15M", "PT2H")),
        )
        .attribute("identity", identity_schema())
        .attribute(
            "license_type",
            Schema::string()
                .optional()
                .with_validator(string_in_slice(
                    &["None", "Windows_Client", "Windows_Server"],
                    false,
                ))
                .diff_suppress(suppress_license_none),
        )
        .attribute(
            "max_bid_price",
            Schema::float()
                .optional()
                .default_value(-1.0)
                .validate(validate::spot_max_price),
        )
        .attribute("plan", plan_schema())
        .attribute(
            "platform_fault_domain_count",
            Schema::int()
                .required()
                .force_new()
                .with_validator(int_between(1, 5)),
        )
        .attribute(
            "priority",
            Schema::string()
                .optional()
                .force_new()
                .default_value("Regular")
                .with_validator(string_in_slice(&["Regular", "Spot"], false)),
        )
        .attribute(
            "proximity_placement_group_id",
            Schema::string()
                .optional()
                .force_new()
                .validate(validate::resource_id)
                .diff_suppress(suppress_case_difference),
        )
        .attribute(
            "source_image_id",
            Schema::string().optional().validate(validate::resource_id),
        )
        .attribute("source_image_reference", source_image_reference_schema())
        .attribute(
            "zone_balance",
            Schema::bool().optional().force_new().default_value(false),
        )
        .attribute("terminate_notification", terminate_notification_schema())
        .attribute(
            "zones",
            Schema::list_of(Schema::string()).optional().force_new(),
        )
        .attribute("tags", Schema::string_map().optional().validate(validate::tags))
        .attribute("unique_id", Schema::string().computed())
}

/// `None` and an unset license are the same thing
fn suppress_license_none(_key: &str, old: &Value, new: &Value) -> bool {
    let old = old.as_str().unwrap_or_default();
    let new = new.as_str().unwrap_or_default();
    matches!((old, new), ("None", "") | ("", "None"))
}

/// Settings are compared as JSON documents rather than strings
fn suppress_json_diff(_key: &str, old: &Value, new: &Value) -> bool {
    let parse = |v: &Value| {
        v.as_str()
            .filter(|s| !s.is_empty())
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
    };
    match (parse(old), parse(new)) {
        (Some(old), Some(new)) => old == new,
        _ => false,
    }
}

fn id_set() -> Schema {
    Schema::set_of(Schema::string().validate(validate::resource_id)).optional()
}

fn network_interface_schema() -> Schema {
    Schema::block_list(block([
        (
            "name",
            Schema::string()
                .required()
                .force_new()
                .validate(validate::string_is_not_empty),
        ),
        ("ip_configuration", ip_configuration_schema()),
        (
            "dns_servers",
            Schema::list_of(Schema::string().validate(validate::string_is_not_empty)).optional(),
        ),
        (
            "enable_accelerated_networking",
            Schema::bool().optional().default_value(false),
        ),
        (
            "enable_ip_forwarding",
            Schema::bool().optional().default_value(false),
        ),
        (
            "network_security_group_id",
            Schema::string().optional().validate(validate::resource_id),
        ),
        ("primary", Schema::bool().optional().default_value(false)),
    ]))
    .optional()
}

fn ip_configuration_schema() -> Schema {
    Schema::block_list(block([
        (
            "name",
            Schema::string()
                .required()
                .validate(validate::string_is_not_empty),
        ),
        ("application_gateway_backend_address_pool_ids", id_set()),
        ("application_security_group_ids", id_set().max_items(20)),
        ("load_balancer_backend_address_pool_ids", id_set()),
        ("primary", Schema::bool().optional().default_value(false)),
        ("public_ip_address", public_ip_address_schema()),
        (
            "subnet_id",
            Schema::string().optional().validate(validate::resource_id),
        ),
        (
            "version",
            Schema::string()
                .optional()
                .default_value("IPv4")
                .with_validator(string_in_slice(&["IPv4", "IPv6"], false)),
        ),
    ]))
    .required()
    .min_items(1)
}

fn public_ip_address_schema() -> Schema {
    Schema::block_list(block([
        (
            "name",
            Schema::string()
                .required()
                .validate(validate::string_is_not_empty),
        ),
        (
            "domain_name_label",
            Schema::string()
                .optional()
                .validate(validate::string_is_not_empty),
        ),
        (
            "idle_timeout_in_minutes",
            Schema::int()
                .optional()
                .computed()
                .with_validator(int_between(4, 32)),
        ),
        (
            "ip_tag",
            Schema::block_list(block([
                (
                    "tag",
                    Schema::string()
                        .required()
                        .force_new()
                        .validate(validate::string_is_not_empty),
                ),
                (
                    "type",
                    Schema::string()
                        .required()
                        .force_new()
                        .validate(validate::string_is_not_empty),
                ),
            ]))
            .optional(),
        ),
        (
            "public_ip_prefix_id",
            Schema::string()
                .optional()
                .force_new()
                .validate(validate::resource_id),
        ),
        (
            "version",
            Schema::string()
                .optional()
                .force_new()
                .default_value("IPv4")
                .with_validator(string_in_slice(&["IPv4", "IPv6"], false)),
        ),
    ]))
    .optional()
}

fn os_disk_schema() -> Schema {
    Schema::block_list(block([
        (
            "caching",
            Schema::string()
                .required()
                .with_validator(string_in_slice(CACHING_TYPES, false)),
        ),
        (
            "storage_account_type",
            Schema::string()
                .required()
                .force_new()
                .with_validator(string_in_slice(OS_DISK_STORAGE_TYPES, false)),
        ),
        (
            "diff_disk_settings",
            Schema::block_list(block([(
                "option",
                Schema::string()
                    .required()
                    .force_new()
                    .with_validator(string_in_slice(&["Local"], false)),
            )]))
            .optional()
            .force_new()
            .max_items(1),
        ),
        (
            "disk_encryption_set_id",
            Schema::string()
                .optional()
                .force_new()
                .validate(validate::resource_id),
        ),
        (
            "disk_size_gb",
            Schema::int()
                .optional()
                .computed()
                .with_validator(int_between(0, 4095)),
        ),
        (
            "write_accelerator_enabled",
            Schema::bool().optional().default_value(false),
        ),
    ]))
    .optional()
    .max_items(1)
}

fn data_disk_schema() -> Schema {
    Schema::block_list(block([
        (
            "caching",
            Schema::string()
                .required()
                .with_validator(string_in_slice(CACHING_TYPES, false)),
        ),
        (
            "create_option",
            Schema::string()
                .optional()
                .default_value("Empty")
                .with_validator(string_in_slice(&["Empty", "FromImage"], false)),
        ),
        (
            "disk_encryption_set_id",
            Schema::string().optional().validate(validate::resource_id),
        ),
        (
            "disk_size_gb",
            Schema::int().required().with_validator(int_between(1, 32767)),
        ),
        ("lun", Schema::int().required().with_validator(int_between(0, 2000))),
        (
            "storage_account_type",
            Schema::string()
                .required()
                .with_validator(string_in_slice(DATA_DISK_STORAGE_TYPES, false)),
        ),
        (
            "ultra_ssd_disk_iops_read_write",
            Schema::int().optional().computed(),
        ),
        (
            "ultra_ssd_disk_mbps_read_write",
            Schema::int().optional().computed(),
        ),
        (
            "write_accelerator_enabled",
            Schema::bool().optional().default_value(false),
        ),
    ]))
    .optional()
}

fn source_image_reference_schema() -> Schema {
    Schema::block_list(block([
        ("publisher", Schema::string().required()),
        ("offer", Schema::string().required()),
        ("sku", Schema::string().required()),
        ("version", Schema::string().required()),
    ]))
    .optional()
    .max_items(1)
}

fn windows_secret_schema() -> Schema {
    Schema::block_list(block([
        (
            "key_vault_id",
            Schema::string().required().validate(validate::resource_id),
        ),
        (
            "certificate",
            Schema::block_set(block([
                ("store", Schema::string().required()),
                ("url", Schema::string().required()),
            ]))
            .required()
            .min_items(1),
        ),
    ]))
    .optional()
}

fn linux_secret_schema() -> Schema {
    Schema::block_list(block([
        (
            "key_vault_id",
            Schema::string().required().validate(validate::resource_id),
        ),
        (
            "certificate",
            Schema::block_set(block([("url", Schema::string().required())]))
                .required()
                .min_items(1),
        ),
    ]))
    .optional()
}

fn windows_configuration_attributes() -> Attributes {
    block([
        (
            "admin_username",
            Schema::string()
                .required()
                .force_new()
                .validate(validate::string_is_not_empty),
        ),
        (
            "admin_password",
            Schema::string()
                .required()
                .force_new()
                .sensitive()
                .validate(validate::string_is_not_empty),
        ),
        (
            "computer_name_prefix",
            Schema::string()
                .optional()
                .computed()
                .force_new()
                .validate(validate::windows_computer_name_prefix),
        ),
        (
            "enable_automatic_updates",
            Schema::bool().optional().default_value(true),
        ),
        (
            "hotpatching_enabled",
            Schema::bool().optional().force_new().default_value(false),
        ),
        (
            "patch_mode",
            Schema::string()
                .optional()
                .default_value("AutomaticByOS")
                .with_validator(string_in_slice(
                    &["Manual", "AutomaticByOS", "AutomaticByPlatform"],
                    false,
                )),
        ),
        (
            "provision_vm_agent",
            Schema::bool().optional().force_new().default_value(true),
        ),
        ("secret", windows_secret_schema()),
        ("timezone", Schema::string().optional()),
        (
            "winrm_listener",
            Schema::block_set(block([
                ("certificate_url", Schema::string().optional().force_new()),
                (
                    "protocol",
                    Schema::string()
                        .required()
                        .force_new()
                        .with_validator(string_in_slice(&["Http", "Https"], false)),
                ),
            ]))
            .optional()
            .force_new(),
        ),
    ])
}

fn linux_configuration_attributes() -> Attributes {
    block([
        (
            "admin_username",
            Schema::string()
                .required()
                .force_new()
                .validate(validate::string_is_not_empty),
        ),
        (
            "admin_password",
            Schema::string()
                .optional()
                .force_new()
                .sensitive()
                .validate(validate::string_is_not_empty),
        ),
        (
            "admin_ssh_key",
            Schema::block_set(block([
                ("public_key", Schema::string().required()),
                ("username", Schema::string().required()),
            ]))
            .optional(),
        ),
        (
            "computer_name_prefix",
            Schema::string()
                .optional()
                .computed()
                .force_new()
                .validate(validate::linux_computer_name_prefix),
        ),
        (
            "disable_password_authentication",
            Schema::bool().optional().default_value(true),
        ),
        (
            "patch_mode",
            Schema::string()
                .optional()
                .default_value("ImageDefault")
                .with_validator(string_in_slice(
                    &["ImageDefault", "AutomaticByPlatform"],
                    false,
                )),
        ),
        (
            "provision_vm_agent",
            Schema::bool().optional().force_new().default_value(true),
        ),
        ("secret", linux_secret_schema()),
    ])
}

fn os_profile_schema() -> Schema {
    Schema::block_list(block([
        (
            "custom_data",
            Schema::string()
                .optional()
                .sensitive()
                .validate(validate::string_is_base64),
        ),
        (
            "windows_configuration",
            Schema::block_list(windows_configuration_attributes())
                .optional()
                .max_items(1)
                .conflicts_with(&["linux_configuration"]),
        ),
        (
            "linux_configuration",
            Schema::block_list(linux_configuration_attributes())
                .optional()
                .max_items(1)
                .conflicts_with(&["windows_configuration"]),
        ),
    ]))
    .optional()
    .max_items(1)
}

fn extension_schema() -> Schema {
    Schema::block_set(block([
        (
            "name",
            Schema::string()
                .required()
                .validate(validate::string_is_not_empty),
        ),
        (
            "publisher",
            Schema::string()
                .required()
                .validate(validate::string_is_not_empty),
        ),
        (
            "type",
            Schema::string()
                .required()
                .validate(validate::string_is_not_empty),
        ),
        (
            "type_handler_version",
            Schema::string()
                .required()
                .validate(validate::string_is_not_empty),
        ),
        (
            "auto_upgrade_minor_version_enabled",
            Schema::bool().optional().default_value(true),
        ),
        (
            "force_extension_execution_on_change",
            Schema::string().optional(),
        ),
        (
            "protected_settings",
            Schema::string()
                .optional()
                .sensitive()
                .validate(validate::string_is_json),
        ),
        (
            "extensions_to_provision_after_vm_creation",
            Schema::list_of(Schema::string()).optional(),
        ),
        (
            "settings",
            Schema::string()
                .optional()
                .validate(validate::string_is_json)
                .diff_suppress(suppress_json_diff),
        ),
    ]))
    .optional()
}

fn identity_schema() -> Schema {
    Schema::block_list(block([
        (
            "type",
            Schema::string()
                .required()
                .with_validator(string_in_slice(IDENTITY_TYPES, false)),
        ),
        ("identity_ids", id_set()),
    ]))
    .optional()
    .max_items(1)
}

fn plan_schema() -> Schema {
    Schema::block_list(block([
        ("name", Schema::string().required().force_new()),
        ("product", Schema::string().required().force_new()),
        ("publisher", Schema::string().required().force_new()),
    ]))
    .optional()
    .force_new()
    .max_items(1)
}

fn boot_diagnostics_schema() -> Schema {
    Schema::block_list(block([(
        "storage_account_uri",
        Schema::string().optional(),
    )]))
    .optional()
    .max_items(1)
}

fn automatic_repairs_schema() -> Schema {
    Schema::block_list(block([
        ("enabled", Schema::bool().required()),
        (
            "grace_period",
            Schema::string()
                .optional()
                .default_value("PT30M")
                .with_validator(iso8601_duration_between("PT30M", "PT90M")),
        ),
    ]))
    .optional()
    .max_items(1)
}

fn terminate_notification_schema() -> Schema {
    Schema::block_list(block([
        ("enabled", Schema::bool().required()),
        (
            "timeout",
            Schema::string()
                .optional()
                .default_value("PT5M")
                .with_validator(iso8601_duration_between("PT5M", "PT15M")),
        ),
    ]))
    .optional()
    .max_items(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_minimal_config_is_valid() {
        let schema = resource_schema();
        let diags = schema.validate(&config(json!({
            "name": "vmss1",
            "resource_group_name": "rg",
            "location": "westeurope",
            "platform_fault_domain_count": 2
        })));
        assert!(diags.is_ok(), "{:?}", diags.errors);
    }

    #[test]
    fn test_fault_domain_count_is_bounded() {
        let schema = resource_schema();
        for count in [0, 6, 4_294_967_298_i64] {
            let diags = schema.validate(&config(json!({
                "name": "vmss1",
                "resource_group_name": "rg",
                "location": "westeurope",
                "platform_fault_domain_count": count
            })));
            assert!(
                diags
                    .errors
                    .iter()
                    .any(|e| e.contains("platform_fault_domain_count")),
                "{} should be rejected: {:?}",
                count,
                diags.errors
            );
        }
    }

    #[test]
    fn test_conflicting_os_configurations() {
        let schema = resource_schema();
        let diags = schema.validate(&config(json!({
            "name": "vmss1",
            "resource_group_name": "rg",
            "location": "westeurope",
            "platform_fault_domain_count": 2,
            "os_profile": [{
                "windows_configuration": [{"admin_username": "a", "admin_password": "p"}],
                "linux_configuration": [{"admin_username": "a"}]
            }]
        })));
        assert!(diags
            .errors
            .iter()
            .any(|e| e.contains("conflicts with linux_configuration")));
    }

    #[test]
    fn test_defaults_are_applied() {
        let schema = resource_schema();
        let mut cfg = config(json!({"name": "vmss1"}));
        schema.apply_defaults(&mut cfg);
        assert_eq!(cfg["priority"], json!("Regular"));
        assert_eq!(cfg["max_bid_price"], json!(-1.0));
        assert_eq!(cfg["extensions_time_budget"], json!("PT1H30M"));
        assert_eq!(cfg["zone_balance"], json!(false));
    }

    #[test]
    fn test_license_suppression() {
        assert!(suppress_license_none("license_type", &json!("None"), &Value::Null));
        assert!(!suppress_license_none(
            "license_type",
            &json!("Windows_Server"),
            &Value::Null
        ));
    }

    #[test]
    fn test_settings_json_suppression() {
        assert!(suppress_json_diff(
            "settings",
            &json!(r#"{"a": 1, "b": 2}"#),
            &json!(r#"{"b":2,"a":1}"#)
        ));
        assert!(!suppress_json_diff("settings", &json!(r#"{"a":1}"#), &json!(r#"{"a":2}"#)));
    }

    #[test]
    fn test_force_new_attributes() {
        let schema = resource_schema();
        for path in [
            "name",
            "location",
            "priority",
            "zones",
            "os_profile.0.linux_configuration.0.admin_username",
            "os_disk.0.storage_account_type",
        ] {
            assert!(schema.attribute_at(path).unwrap().force_new, "{}", path);
        }
        assert!(!schema.attribute_at("sku_name").unwrap().force_new);
    }
}
