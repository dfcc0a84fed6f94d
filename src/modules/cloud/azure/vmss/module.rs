//! Declarative module for Orchestrated Virtual Machine Scale Sets.
//!
//! ## Parameters
//!
//! Every attribute of the resource schema is accepted as a parameter. The
//! following control parameters are also understood:
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `state` | No | `present` (default) or `absent` |
//! | `allow_replace` | No | Delete and recreate when an attribute that cannot be updated changes (default: false) |
//! | `timeouts` | No | Per-operation overrides, e.g. `{create: 90m, delete: 30m}` |
//!
//! The module is idempotent: a scale set that already matches the parameters
//! is reported as `ok` and no mutating request is sent.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use similar::{ChangeTag, TextDiff};
use tracing::{debug, info};

use super::super::client::VirtualMachineScaleSetsClient;
use super::super::parse::VirtualMachineScaleSetId;
use super::super::schema::{Attributes, Elem, ResourceDiff};
use super::resource::OrchestratedVmssResource;
use super::schema::RESOURCE_TYPE;
use super::ResourceSettings;
use crate::config::TimeoutsConfig;
use crate::modules::{
    Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};

/// Keys that steer the module rather than describe the scale set
const CONTROL_PARAMS: &[&str] = &["state", "allow_replace", "timeouts"];

const SENSITIVE_PLACEHOLDER: &str = "(sensitive value)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DesiredState {
    #[default]
    Present,
    Absent,
}

impl FromStr for DesiredState {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "present" => Ok(DesiredState::Present),
            "absent" => Ok(DesiredState::Absent),
            _ => Err(ModuleError::InvalidParameter(format!(
                "Invalid state '{}'. Valid states: present, absent",
                s
            ))),
        }
    }
}

/// Parameters split into control keys and the resource configuration
#[derive(Debug, Clone)]
struct VmssRequest {
    state: DesiredState,
    allow_replace: bool,
    timeouts: Option<TimeoutsConfig>,
    config: Map<String, Value>,
}

impl VmssRequest {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let state = match params.get_string("state")? {
            Some(s) => s.parse()?,
            None => DesiredState::default(),
        };

        let timeouts = params
            .get("timeouts")
            .map(|v| {
                serde_json::from_value::<TimeoutsConfig>(v.clone()).map_err(|e| {
                    ModuleError::InvalidParameter(format!("Invalid timeouts: {}", e))
                })
            })
            .transpose()?;

        // Sorted so rendered plans are stable
        let keys: BTreeSet<&String> = params.keys().collect();
        let config = keys
            .into_iter()
            .filter(|k| !CONTROL_PARAMS.contains(&k.as_str()))
            .filter_map(|k| params.get(k).map(|v| (k.clone(), v.clone())))
            .collect();

        Ok(Self {
            state,
            allow_replace: params.get_bool_or("allow_replace", false),
            timeouts,
            config,
        })
    }

    fn name(&self) -> &str {
        self.config
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn resource_group(&self) -> &str {
        self.config
            .get("resource_group_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Module managing Orchestrated (Flexible) Virtual Machine Scale Sets
pub struct AzureOrchestratedVmssModule {
    client: Arc<dyn VirtualMachineScaleSetsClient>,
    settings: ResourceSettings,
}

impl AzureOrchestratedVmssModule {
    pub fn new(client: Arc<dyn VirtualMachineScaleSetsClient>, settings: ResourceSettings) -> Self {
        Self { client, settings }
    }

    /// The resource with any per-invocation timeout overrides applied
    fn resource(&self, request: &VmssRequest) -> OrchestratedVmssResource {
        let mut settings = self.settings;
        if let Some(timeouts) = request.timeouts {
            settings.timeouts = timeouts;
        }
        OrchestratedVmssResource::new(Arc::clone(&self.client), settings)
    }

    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let request = VmssRequest::from_params(params)?;
        let resource = self.resource(&request);

        if request.state == DesiredState::Present {
            resource.validate(&request.config)?;
        }

        let id = VirtualMachineScaleSetId::new(
            resource.subscription_id(),
            request.resource_group(),
            request.name(),
        );

        // Write-only attributes are never returned, so the read keeps the
        // configured values for them
        let mut current = resource
            .existing_data(id.id(), Map::new())
            .with_config(request.config.clone());
        resource.read(&mut current).await?;
        let exists = !current.id().is_empty();
        let state = current.into_state();

        match request.state {
            DesiredState::Absent => self.ensure_absent(&resource, &id, state, exists, context).await,
            DesiredState::Present if !exists => {
                self.create(&resource, &id, &request, context).await
            }
            DesiredState::Present => {
                self.reconcile(&resource, &id, &request, state, context)
                    .await
            }
        }
    }

    async fn ensure_absent(
        &self,
        resource: &OrchestratedVmssResource,
        id: &VirtualMachineScaleSetId,
        state: Map<String, Value>,
        exists: bool,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        if !exists {
            return Ok(ModuleOutput::ok(format!(
                "Scale set '{}' does not exist in resource group '{}'",
                id.name, id.resource_group
            )));
        }

        let attributes = &resource.schema().attributes;
        let diff = render_diff(&redact(attributes, &state), &Map::new());

        if context.check_mode {
            return Ok(ModuleOutput::changed(format!(
                "Would delete scale set '{}' in resource group '{}'",
                id.name, id.resource_group
            ))
            .with_diff(diff)
            .with_data("action", json!("delete"))
            .with_data("id", json!(id.id())));
        }

        let mut d = resource.existing_data(id.id(), state);
        resource.delete(&mut d).await?;
        info!("Deleted scale set {}", id);

        Ok(ModuleOutput::changed(format!(
            "Deleted scale set '{}' in resource group '{}'",
            id.name, id.resource_group
        ))
        .with_diff(diff)
        .with_data("action", json!("delete"))
        .with_data("id", json!(id.id())))
    }

    async fn create(
        &self,
        resource: &OrchestratedVmssResource,
        id: &VirtualMachineScaleSetId,
        request: &VmssRequest,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let mut d = resource.new_data(request.config.clone());
        let attributes = &resource.schema().attributes;
        let diff = render_diff(&Map::new(), &redact(attributes, &d.attributes()));

        if context.check_mode {
            return Ok(ModuleOutput::changed(format!(
                "Would create scale set '{}' in resource group '{}'",
                id.name, id.resource_group
            ))
            .with_diff(diff)
            .with_data("action", json!("create")));
        }

        resource.create(&mut d).await?;
        let created_id = d.id().to_string();
        let state = d.into_state();
        info!("Created scale set {}", created_id);

        Ok(ModuleOutput::changed(format!(
            "Created scale set '{}' in resource group '{}'",
            id.name, id.resource_group
        ))
        .with_diff(diff)
        .with_data("action", json!("create"))
        .with_data("id", json!(created_id))
        .with_data("resource", Value::Object(redact(attributes, &state))))
    }

    async fn reconcile(
        &self,
        resource: &OrchestratedVmssResource,
        id: &VirtualMachineScaleSetId,
        request: &VmssRequest,
        state: Map<String, Value>,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let schema = resource.schema();
        let desired = resource.new_data(request.config.clone()).attributes();
        let changes = schema.diff(&state, &desired);

        if changes.is_empty() {
            return Ok(ModuleOutput::ok(format!(
                "Scale set '{}' is up to date",
                id.name
            ))
            .with_data("id", json!(id.id())));
        }

        let replace = changes.requires_replace();
        if replace && !request.allow_replace {
            return Err(ModuleError::ExecutionFailed(format!(
                "Changing {} requires replacing scale set '{}'; set allow_replace: true to \
                 delete and recreate it",
                changes.replace_paths().join(", "),
                id.name
            )));
        }

        let action = if replace { "replace" } else { "update" };
        let diff = render_diff(
            &redact(&schema.attributes, &state),
            &redact(&schema.attributes, &desired),
        );
        let summary = summarize(&changes);
        debug!("Planned {} of {}:\n{}", action, id, changes);

        if context.check_mode {
            return Ok(ModuleOutput::changed(format!(
                "Would {} scale set '{}': {}",
                action, id.name, summary
            ))
            .with_diff(diff)
            .with_data("action", json!(action))
            .with_data("changes", json!(changes.paths())));
        }

        let state = if replace {
            let mut old = resource.existing_data(id.id(), state);
            resource.delete(&mut old).await?;

            let mut new = resource.new_data(request.config.clone());
            resource.create(&mut new).await?;
            new.into_state()
        } else {
            let mut d = resource
                .existing_data(id.id(), state)
                .with_config(request.config.clone());
            resource.update(&mut d).await?;
            d.into_state()
        };

        let verb = if replace { "Replaced" } else { "Updated" };
        info!("{} scale set {}", verb, id);

        Ok(ModuleOutput::changed(format!(
            "{} scale set '{}': {}",
            verb, id.name, summary
        ))
        .with_diff(diff)
        .with_data("action", json!(action))
        .with_data("id", json!(id.id()))
        .with_data("changes", json!(changes.paths()))
        .with_data("resource", Value::Object(redact(&schema.attributes, &state))))
    }
}

fn summarize(changes: &ResourceDiff) -> String {
    let mut top_level: Vec<&str> = changes
        .paths()
        .into_iter()
        .map(|p| p.split('.').next().unwrap_or(p))
        .collect();
    top_level.dedup();
    format!("changed {}", top_level.join(", "))
}

/// Replace sensitive values, including those nested in blocks
pub fn redact(attributes: &Attributes, values: &Map<String, Value>) -> Map<String, Value> {
    values
        .iter()
        .map(|(key, value)| {
            let redacted = match attributes.get(key) {
                Some(schema) if schema.sensitive && !value.is_null() => {
                    Value::String(SENSITIVE_PLACEHOLDER.to_string())
                }
                Some(schema) => match (&schema.elem, value) {
                    (Some(Elem::Block(nested)), Value::Array(items)) => Value::Array(
                        items
                            .iter()
                            .map(|item| match item {
                                Value::Object(map) => Value::Object(redact(nested, map)),
                                other => other.clone(),
                            })
                            .collect(),
                    ),
                    _ => value.clone(),
                },
                None => value.clone(),
            };
            (key.clone(), redacted)
        })
        .collect()
}

/// Unified line diff of two attribute snapshots
pub fn render_diff(before: &Map<String, Value>, after: &Map<String, Value>) -> Diff {
    let render = |m: &Map<String, Value>| {
        if m.is_empty() {
            String::new()
        } else {
            serde_yaml::to_string(m).unwrap_or_default()
        }
    };
    let (before, after) = (render(before), render(after));
    let text_diff = TextDiff::from_lines(&before, &after);

    let mut details = String::new();
    let mut additions = 0;
    let mut deletions = 0;

    for change in text_diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => {
                deletions += 1;
                "-"
            }
            ChangeTag::Insert => {
                additions += 1;
                "+"
            }
            ChangeTag::Equal => " ",
        };
        details.push_str(&format!("{}{}", sign, change));
    }

    Diff::new(
        format!("{} lines", before.lines().count()),
        format!(
            "{} lines ({} additions, {} deletions)",
            after.lines().count(),
            additions,
            deletions
        ),
    )
    .with_details(details)
}

impl Module for AzureOrchestratedVmssModule {
    fn name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn description(&self) -> &'static str {
        "Create, update, replace and delete Azure Orchestrated (Flexible) Virtual Machine Scale Sets"
    }

    fn required_params(&self) -> &[&'static str] {
        &["name", "resource_group_name"]
    }

    fn execute(&self, params: &ModuleParams, context: &ModuleContext) -> ModuleResult<ModuleOutput> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| ModuleError::ExecutionFailed("No tokio runtime available".to_string()))?;

        let params = params.clone();
        let context = context.clone();
        let module = self;

        std::thread::scope(|s| {
            s.spawn(|| handle.block_on(module.execute_async(&params, &context)))
                .join()
                .map_err(|_| {
                    ModuleError::ExecutionFailed(format!("{} worker thread panicked", RESOURCE_TYPE))
                })?
        })
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        if params.get_string("name")?.is_none() {
            return Err(ModuleError::MissingParameter("name".to_string()));
        }

        if params.get_string("resource_group_name")?.is_none() {
            return Err(ModuleError::MissingParameter(
                "resource_group_name".to_string(),
            ));
        }

        if let Some(state) = params.get_string("state")? {
            DesiredState::from_str(&state)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use super::super::schema::resource_schema;

    fn params(value: Value) -> ModuleParams {
        value
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[test]
    fn test_request_strips_control_params() {
        let request = VmssRequest::from_params(&params(json!({
            "name": "vmss1",
            "resource_group_name": "rg",
            "state": "absent",
            "allow_replace": true,
            "timeouts": {"create": "90m"},
        })))
        .unwrap();

        assert_eq!(request.state, DesiredState::Absent);
        assert!(request.allow_replace);
        assert_eq!(
            request.timeouts.map(|t| t.create),
            Some(std::time::Duration::from_secs(90 * 60))
        );
        assert_eq!(
            request.config.keys().collect::<Vec<_>>(),
            vec!["name", "resource_group_name"]
        );
    }

    #[test]
    fn test_invalid_state() {
        let err = VmssRequest::from_params(&params(json!({"state": "running"}))).unwrap_err();
        assert!(matches!(err, ModuleError::InvalidParameter(_)));
    }

    #[test]
    fn test_redact_nested_sensitive_values() {
        let schema = resource_schema();
        let values = json!({
            "name": "vmss1",
            "os_profile": [{
                "custom_data": "Zm9v",
                "linux_configuration": [{"admin_username": "u", "admin_password": "hunter2"}],
            }],
        });
        let redacted = redact(&schema.attributes, values.as_object().unwrap());

        assert_eq!(redacted["name"], json!("vmss1"));
        assert_eq!(redacted["os_profile"][0]["custom_data"], json!(SENSITIVE_PLACEHOLDER));
        assert_eq!(
            redacted["os_profile"][0]["linux_configuration"][0]["admin_password"],
            json!(SENSITIVE_PLACEHOLDER)
        );
    }

    #[test]
    fn test_render_diff_counts_lines() {
        let before = json!({"sku_name": "Standard_F2_1"});
        let after = json!({"sku_name": "Standard_F2_3"});
        let diff = render_diff(before.as_object().unwrap(), after.as_object().unwrap());

        let details = diff.details.unwrap();
        assert!(details.contains("-sku_name: Standard_F2_1"));
        assert!(details.contains("+sku_name: Standard_F2_3"));
        assert_eq!(diff.after, "1 lines (1 additions, 1 deletions)");
    }
}
