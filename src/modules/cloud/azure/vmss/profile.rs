//! Smaller top-level blocks: identity, plan, boot diagnostics, automatic
//! repairs and the terminate notification.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::super::models::{
    AutomaticRepairsPolicy, BootDiagnostics, DiagnosticsProfile, Identity, Plan,
    ResourceIdentityType, ScheduledEventsProfile, TerminateNotificationProfile,
    UserAssignedIdentityValue,
};
use super::super::schema::{first_block, BlockExt};
use super::{VmssError, VmssResult};

/// An absent `identity` block explicitly turns identities off
pub fn expand_identity(identity: &[Value]) -> VmssResult<Identity> {
    let block = match first_block(identity) {
        Some(b) => b,
        None => {
            return Ok(Identity {
                identity_type: ResourceIdentityType::None,
                principal_id: None,
                tenant_id: None,
                user_assigned_identities: None,
            })
        }
    };

    let identity_type: ResourceIdentityType = block
        .get_str("type")
        .parse()
        .map_err(|e: String| VmssError::expand("identity", e))?;

    let identity_ids = block.get_string_list("identity_ids");
    if !identity_ids.is_empty() && !identity_type.includes_user_assigned() {
        return Err(VmssError::expand(
            "identity",
            "`identity_ids` can only be specified when `type` includes `UserAssigned`",
        ));
    }

    let user_assigned_identities = if identity_ids.is_empty() {
        None
    } else {
        Some(
            identity_ids
                .into_iter()
                .map(|id| (id, UserAssignedIdentityValue::default()))
                .collect::<BTreeMap<_, _>>(),
        )
    };

    Ok(Identity {
        identity_type,
        principal_id: None,
        tenant_id: None,
        user_assigned_identities,
    })
}

pub fn flatten_identity(identity: Option<&Identity>) -> Vec<Value> {
    let identity = match identity {
        Some(i) if i.identity_type != ResourceIdentityType::None => i,
        _ => return Vec::new(),
    };

    let identity_ids: Vec<&String> = identity
        .user_assigned_identities
        .iter()
        .flat_map(|ids| ids.keys())
        .collect();

    vec![json!({
        "type": identity.identity_type.as_str(),
        "identity_ids": identity_ids,
    })]
}

pub fn expand_plan(plan: &[Value]) -> Option<Plan> {
    first_block(plan).map(|block| Plan {
        name: Some(block.get_str("name")),
        publisher: Some(block.get_str("publisher")),
        product: Some(block.get_str("product")),
        promotion_code: None,
    })
}

pub fn flatten_plan(plan: Option<&Plan>) -> Vec<Value> {
    plan.map(|plan| {
        vec![json!({
            "name": plan.name.clone().unwrap_or_default(),
            "product": plan.product.clone().unwrap_or_default(),
            "publisher": plan.publisher.clone().unwrap_or_default(),
        })]
    })
    .unwrap_or_default()
}

/// An empty `storage_account_uri` selects a managed storage account
pub fn expand_boot_diagnostics(boot_diagnostics: &[Value]) -> DiagnosticsProfile {
    let diagnostics = match first_block(boot_diagnostics) {
        Some(block) => BootDiagnostics {
            enabled: Some(true),
            storage_uri: Some(block.get_str("storage_account_uri")).filter(|u| !u.is_empty()),
        },
        None => BootDiagnostics {
            enabled: Some(false),
            storage_uri: None,
        },
    };

    DiagnosticsProfile {
        boot_diagnostics: Some(diagnostics),
    }
}

pub fn flatten_boot_diagnostics(profile: Option<&DiagnosticsProfile>) -> Vec<Value> {
    match profile.and_then(|p| p.boot_diagnostics.as_ref()) {
        Some(diag) if diag.enabled.unwrap_or(false) => vec![json!({
            "storage_account_uri": diag.storage_uri.clone().unwrap_or_default(),
        })],
        _ => Vec::new(),
    }
}

pub fn expand_automatic_repairs_policy(policy: &[Value]) -> AutomaticRepairsPolicy {
    match first_block(policy) {
        Some(block) => AutomaticRepairsPolicy {
            enabled: Some(block.get_bool("enabled")),
            grace_period: Some(block.get_str("grace_period")).filter(|p| !p.is_empty()),
        },
        None => AutomaticRepairsPolicy {
            enabled: Some(false),
            grace_period: None,
        },
    }
}

pub fn flatten_automatic_repairs_policy(policy: Option<&AutomaticRepairsPolicy>) -> Vec<Value> {
    policy
        .map(|policy| {
            vec![json!({
                "enabled": policy.enabled.unwrap_or(false),
                "grace_period": policy.grace_period.clone().unwrap_or_default(),
            })]
        })
        .unwrap_or_default()
}

pub fn expand_terminate_notification(notification: &[Value]) -> Option<ScheduledEventsProfile> {
    first_block(notification).map(|block| ScheduledEventsProfile {
        terminate_notification_profile: Some(TerminateNotificationProfile {
            enable: Some(block.get_bool("enabled")),
            not_before_timeout: Some(block.get_str("timeout")).filter(|t| !t.is_empty()),
        }),
    })
}

pub fn flatten_terminate_notification(profile: Option<&ScheduledEventsProfile>) -> Vec<Value> {
    match profile.and_then(|p| p.terminate_notification_profile.as_ref()) {
        Some(notification) => vec![json!({
            "enabled": notification.enable.unwrap_or(false),
            "timeout": notification.not_before_timeout.clone().unwrap_or_default(),
        })],
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const IDENTITY: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.ManagedIdentity/userAssignedIdentities/id1";

    #[test]
    fn test_identity() {
        let none = expand_identity(&[]).unwrap();
        assert_eq!(none.identity_type, ResourceIdentityType::None);
        assert!(flatten_identity(Some(&none)).is_empty());

        let err = expand_identity(&[json!({"type": "SystemAssigned", "identity_ids": [IDENTITY]})])
            .unwrap_err();
        assert!(err.to_string().contains("`identity_ids` can only be specified"));

        let user = expand_identity(&[json!({"type": "UserAssigned", "identity_ids": [IDENTITY]})])
            .unwrap();
        assert_eq!(
            flatten_identity(Some(&user)),
            vec![json!({"type": "UserAssigned", "identity_ids": [IDENTITY]})]
        );
    }

    #[test]
    fn test_boot_diagnostics() {
        let disabled = expand_boot_diagnostics(&[]);
        assert_eq!(
            disabled.boot_diagnostics.as_ref().and_then(|b| b.enabled),
            Some(false)
        );
        assert!(flatten_boot_diagnostics(Some(&disabled)).is_empty());

        let managed = expand_boot_diagnostics(&[json!({"storage_account_uri": ""})]);
        assert_eq!(
            flatten_boot_diagnostics(Some(&managed)),
            vec![json!({"storage_account_uri": ""})]
        );
    }

    #[test]
    fn test_repairs_and_notifications() {
        let repairs = expand_automatic_repairs_policy(&[]);
        assert_eq!(repairs.enabled, Some(false));

        assert!(expand_terminate_notification(&[]).is_none());
        let notification =
            expand_terminate_notification(&[json!({"enabled": true, "timeout": "PT5M"})]);
        assert_eq!(
            flatten_terminate_notification(notification.as_ref()),
            vec![json!({"enabled": true, "timeout": "PT5M"})]
        );
    }

    #[test]
    fn test_plan() {
        assert!(expand_plan(&[]).is_none());
        let plan = expand_plan(&[json!({"name": "n", "product": "p", "publisher": "pub"})]);
        assert_eq!(flatten_plan(plan.as_ref())[0]["publisher"], json!("pub"));
    }
}
