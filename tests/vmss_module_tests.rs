//! Integration tests for the `azure_orchestrated_vmss` module
//!
//! The module is synchronous and bridges onto the ambient tokio runtime, so
//! these tests enter a runtime instead of using `#[tokio::test]`.

mod common;

use std::sync::Arc;

use common::*;
use serde_json::json;

use rustible_vmss::modules::cloud::azure::vmss::{AzureOrchestratedVmssModule, RESOURCE_TYPE};
use rustible_vmss::modules::{
    Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleRegistry, ModuleResult,
    ModuleStatus,
};

struct Harness {
    runtime: tokio::runtime::Runtime,
    client: Arc<FakeScaleSetClient>,
    module: AzureOrchestratedVmssModule,
}

impl Harness {
    fn new() -> Self {
        let client = Arc::new(FakeScaleSetClient::new());
        let module = AzureOrchestratedVmssModule::new(client.clone(), test_settings());
        Self {
            runtime: tokio::runtime::Runtime::new().unwrap(),
            client,
            module,
        }
    }

    fn run(&self, params: &ModuleParams, context: &ModuleContext) -> ModuleResult<ModuleOutput> {
        let _guard = self.runtime.enter();
        self.module.execute(params, context)
    }

    fn apply(&self, params: &ModuleParams) -> ModuleResult<ModuleOutput> {
        self.run(params, &ModuleContext::new())
    }

    fn check(&self, params: &ModuleParams) -> ModuleResult<ModuleOutput> {
        let _guard = self.runtime.enter();
        self.module.check(params, &ModuleContext::new())
    }
}

// ============================================================================
// Present
// ============================================================================

#[test]
fn test_apply_creates_scale_set() {
    let h = Harness::new();
    let output = h.apply(&params(linux_config())).unwrap();

    assert!(output.changed);
    assert_eq!(output.status, ModuleStatus::Changed);
    assert_eq!(output.data["action"], json!("create"));
    assert_eq!(output.data["id"], json!(scale_set_id()));
    assert!(h.client.scale_set(RESOURCE_GROUP, NAME).is_some());

    // Passwords never leave the module in clear text
    let resource = &output.data["resource"];
    assert_eq!(
        resource["os_profile"][0]["linux_configuration"][0]["admin_password"],
        json!("(sensitive value)")
    );
    let details = output.diff.and_then(|d| d.details).unwrap();
    assert!(!details.contains("P@ssw0rd1234!"));
}

#[test]
fn test_apply_is_idempotent() {
    let h = Harness::new();
    h.apply(&params(linux_config())).unwrap();
    h.client.clear_calls();

    let output = h.apply(&params(linux_config())).unwrap();

    assert!(!output.changed);
    assert_eq!(output.status, ModuleStatus::Ok);
    assert!(output.msg.contains("up to date"));
    assert_no_mutations(&h.client);
}

#[test]
fn test_apply_updates_in_place() {
    let h = Harness::new();
    h.apply(&params(linux_config())).unwrap();
    h.client.clear_calls();

    let config = with(linux_config(), "sku_name", json!("Standard_F2_4"));
    let output = h.apply(&params(config)).unwrap();

    assert!(output.changed);
    assert_eq!(output.data["action"], json!("update"));
    assert_eq!(output.data["changes"], json!(["sku_name"]));
    assert!(output.msg.contains("changed sku_name"));
    assert_eq!(h.client.updates().len(), 1);

    let stored = h.client.scale_set(RESOURCE_GROUP, NAME).unwrap();
    assert_eq!(stored.sku.and_then(|s| s.capacity), Some(4));
}

#[test]
fn test_force_new_change_requires_allow_replace() {
    let h = Harness::new();
    h.apply(&params(linux_config())).unwrap();
    h.client.clear_calls();

    let config = with(linux_config(), "platform_fault_domain_count", json!(3));
    let err = h.apply(&params(config)).unwrap_err();

    match err {
        ModuleError::ExecutionFailed(msg) => {
            assert!(msg.contains("platform_fault_domain_count"));
            assert!(msg.contains("allow_replace"));
        }
        other => panic!("expected ExecutionFailed, got {:?}", other),
    }
    assert_no_mutations(&h.client);
}

#[test]
fn test_allow_replace_recreates() {
    let h = Harness::new();
    h.apply(&params(linux_config())).unwrap();
    h.client.clear_calls();

    let mut config = with(linux_config(), "platform_fault_domain_count", json!(3));
    config.insert("allow_replace".to_string(), json!(true));
    let output = h.apply(&params(config)).unwrap();

    assert_eq!(output.data["action"], json!("replace"));

    let mutations = h.client.mutations();
    let delete_at = mutations
        .iter()
        .position(|c| matches!(c, Call::Delete { .. }))
        .unwrap();
    let create_at = mutations
        .iter()
        .position(|c| matches!(c, Call::CreateOrUpdate { .. }))
        .unwrap();
    assert!(delete_at < create_at);

    let stored = h.client.scale_set(RESOURCE_GROUP, NAME).unwrap();
    assert_eq!(
        stored.properties.and_then(|p| p.platform_fault_domain_count),
        Some(3)
    );
}

#[test]
fn test_invalid_configuration_fails_before_any_request() {
    let h = Harness::new();
    let config = with(linux_config(), "extensions_time_budget", json!("PT5H"));

    let err = h.apply(&params(config)).unwrap_err();
    assert!(matches!(err, ModuleError::InvalidParameter(_)));
    assert!(h.client.calls().is_empty());
}

// ============================================================================
// Check mode
// ============================================================================

#[test]
fn test_check_mode_create_makes_no_changes() {
    let h = Harness::new();
    let output = h.check(&params(linux_config())).unwrap();

    assert!(output.changed);
    assert!(output.msg.starts_with("Would create"));
    assert!(output.diff.is_some());
    assert_no_mutations(&h.client);
    assert!(h.client.scale_set(RESOURCE_GROUP, NAME).is_none());
}

#[test]
fn test_check_mode_update_reports_changes() {
    let h = Harness::new();
    h.apply(&params(linux_config())).unwrap();
    h.client.clear_calls();

    let config = with(linux_config(), "tags", json!({"env": "prod"}));
    let output = h.check(&params(config)).unwrap();

    assert!(output.msg.starts_with("Would update"));
    assert_eq!(output.data["changes"], json!(["tags"]));
    let details = output.diff.and_then(|d| d.details).unwrap();
    assert!(details.contains("+  env: prod"));
    assert_no_mutations(&h.client);
}

// ============================================================================
// Absent
// ============================================================================

#[test]
fn test_absent_deletes() {
    let h = Harness::new();
    h.apply(&params(linux_config())).unwrap();

    let config = with(linux_config(), "state", json!("absent"));
    let output = h.apply(&params(config)).unwrap();

    assert!(output.changed);
    assert_eq!(output.data["action"], json!("delete"));
    assert!(h.client.scale_set(RESOURCE_GROUP, NAME).is_none());
}

#[test]
fn test_absent_when_missing_is_ok() {
    let h = Harness::new();
    let absent = params(object(json!({
        "name": NAME,
        "resource_group_name": RESOURCE_GROUP,
        "state": "absent",
    })));

    let output = h.apply(&absent).unwrap();

    assert!(!output.changed);
    assert!(output.msg.contains("does not exist"));
    assert_no_mutations(&h.client);
}

#[test]
fn test_check_mode_absent_keeps_scale_set() {
    let h = Harness::new();
    h.apply(&params(linux_config())).unwrap();

    let output = h
        .check(&params(with(linux_config(), "state", json!("absent"))))
        .unwrap();

    assert!(output.msg.starts_with("Would delete"));
    assert!(h.client.scale_set(RESOURCE_GROUP, NAME).is_some());
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_registry_checks_required_params() {
    let client = Arc::new(FakeScaleSetClient::new());
    let registry = ModuleRegistry::with_azure(client.clone(), test_settings());
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();

    let mut missing = params(linux_config());
    missing.remove("resource_group_name");

    let err = registry
        .execute(RESOURCE_TYPE, &missing, &ModuleContext::new())
        .unwrap_err();
    assert!(matches!(err, ModuleError::MissingParameter(ref p) if p == "resource_group_name"));
    assert!(client.calls().is_empty());
}

#[test]
fn test_registry_rejects_unknown_state() {
    let client = Arc::new(FakeScaleSetClient::new());
    let registry = ModuleRegistry::with_azure(client, test_settings());

    let bad = params(with(linux_config(), "state", json!("stopped")));
    let err = registry
        .execute(RESOURCE_TYPE, &bad, &ModuleContext::new())
        .unwrap_err();
    assert!(matches!(err, ModuleError::InvalidParameter(_)));
}
