//! VM extensions installed on every instance.

use serde_json::{json, Map, Value};

use super::super::models::{Extension, ExtensionProfile, ExtensionProperties};
use super::super::schema::{BlockExt, ResourceData};
use super::{VmssError, VmssResult};

fn parse_json_setting(raw: &str, attribute: &str) -> VmssResult<Option<Value>> {
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw).map(Some).map_err(|e| {
        VmssError::expand(
            "extension",
            format!("failed to parse JSON from `{}`: {}", attribute, e),
        )
    })
}

/// Expand the `extension` set into an extension profile
pub fn expand_extensions(extensions: &[Value]) -> VmssResult<ExtensionProfile> {
    let extensions = extensions
        .iter()
        .filter_map(Value::as_object)
        .map(expand_extension)
        .collect::<VmssResult<Vec<_>>>()?;

    Ok(ExtensionProfile {
        extensions: Some(extensions),
        extensions_time_budget: None,
    })
}

fn expand_extension(block: &Map<String, Value>) -> VmssResult<Extension> {
    let force_update_tag = Some(block.get_str("force_extension_execution_on_change"))
        .filter(|tag| !tag.is_empty());

    let provision_after = block.get_string_list("extensions_to_provision_after_vm_creation");

    Ok(Extension {
        name: Some(block.get_str("name")),
        properties: Some(ExtensionProperties {
            publisher: Some(block.get_str("publisher")),
            extension_type: Some(block.get_str("type")),
            type_handler_version: Some(block.get_str("type_handler_version")),
            auto_upgrade_minor_version: Some(block.get_bool("auto_upgrade_minor_version_enabled")),
            force_update_tag,
            provision_after_extensions: if provision_after.is_empty() {
                None
            } else {
                Some(provision_after)
            },
            settings: parse_json_setting(&block.get_str("settings"), "settings")?,
            protected_settings: parse_json_setting(
                &block.get_str("protected_settings"),
                "protected_settings",
            )?,
        }),
    })
}

/// Protected settings are never returned, so they are looked up by
/// extension name in what was configured
fn configured_protected_settings(d: &ResourceData, name: &str) -> String {
    d.get_list("extension")
        .iter()
        .filter_map(Value::as_object)
        .find(|ext| ext.get_str("name") == name)
        .map(|ext| ext.get_str("protected_settings"))
        .unwrap_or_default()
}

pub fn flatten_extensions(
    profile: Option<&ExtensionProfile>,
    d: &ResourceData,
) -> VmssResult<Vec<Value>> {
    let extensions = match profile.and_then(|p| p.extensions.as_ref()) {
        Some(e) => e,
        None => return Ok(Vec::new()),
    };

    extensions
        .iter()
        .map(|extension| {
            let name = extension.name.clone().unwrap_or_default();
            let default_props = ExtensionProperties::default();
            let props = extension.properties.as_ref().unwrap_or(&default_props);

            let settings = match &props.settings {
                Some(Value::Null) | None => String::new(),
                Some(settings) => serde_json::to_string(settings).map_err(|e| {
                    VmssError::expand("extension", format!("serializing `settings`: {}", e))
                })?,
            };

            Ok(json!({
                "name": name,
                "auto_upgrade_minor_version_enabled": props.auto_upgrade_minor_version.unwrap_or(false),
                "extensions_to_provision_after_vm_creation":
                    props.provision_after_extensions.clone().unwrap_or_default(),
                "force_extension_execution_on_change": props.force_update_tag.clone().unwrap_or_default(),
                "protected_settings": configured_protected_settings(d, &name),
                "publisher": props.publisher.clone().unwrap_or_default(),
                "settings": settings,
                "type": props.extension_type.clone().unwrap_or_default(),
                "type_handler_version": props.type_handler_version.clone().unwrap_or_default(),
            }))
        })
        .collect()
}
