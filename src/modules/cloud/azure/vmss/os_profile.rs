//! OS profile blocks: Windows and Linux configurations, secrets, WinRM
//! listeners and SSH keys.

use serde_json::{json, Map, Value};

use super::super::models::{
    LinuxConfiguration, LinuxPatchSettings, OperatingSystemType, OsProfile, PatchSettings,
    SshConfiguration, SshPublicKey, SubResource, VaultCertificate, VaultSecretGroup,
    WinRmConfiguration, WinRmListener, WindowsConfiguration,
};
use super::super::schema::{first_block, BlockExt, ResourceData};
use super::super::validate::{self, Diagnostics};
use super::{VmssError, VmssResult};

/// Expand the `os_profile` block.
///
/// Returns the profile (if any) together with the OS type the disks should
/// use; the OS type stays Windows unless a Linux configuration is present.
pub fn expand_os_profile(
    name: &str,
    os_profile: &[Value],
) -> VmssResult<(Option<OsProfile>, OperatingSystemType)> {
    let os_profile = match first_block(os_profile) {
        Some(p) => p,
        None => return Ok((None, OperatingSystemType::Windows)),
    };

    let custom_data = os_profile.get_str("custom_data");
    let mut os_type = OperatingSystemType::Windows;
    let mut profile = None;

    if let Some(windows) = first_block(&os_profile.get_list("windows_configuration")) {
        let mut expanded = expand_windows_configuration(windows, &custom_data);
        default_computer_name_prefix(
            &mut expanded,
            name,
            validate::windows_computer_name_prefix(&json!(name), "computer_name_prefix"),
        )?;
        profile = Some(expanded);
    }

    if let Some(linux) = first_block(&os_profile.get_list("linux_configuration")) {
        os_type = OperatingSystemType::Linux;
        let mut expanded = expand_linux_configuration(linux, &custom_data)?;
        default_computer_name_prefix(
            &mut expanded,
            name,
            validate::linux_computer_name_prefix(&json!(name), "computer_name_prefix"),
        )?;
        profile = Some(expanded);
    }

    Ok((profile, os_type))
}

/// Fall back to the resource name when no prefix was configured
fn default_computer_name_prefix(
    profile: &mut OsProfile,
    name: &str,
    name_check: Diagnostics,
) -> VmssResult<()> {
    if profile
        .computer_name_prefix
        .as_deref()
        .map_or(false, |p| !p.is_empty())
    {
        return Ok(());
    }

    if let Some(first) = name_check.errors.first() {
        return Err(VmssError::InvalidConfig(format!(
            "unable to assume default computer name prefix {}. Please adjust the \"name\", or \
             specify an explicit \"computer_name_prefix\"",
            first
        )));
    }

    profile.computer_name_prefix = Some(name.to_string());
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

pub fn expand_windows_configuration(config: &Map<String, Value>, custom_data: &str) -> OsProfile {
    let winrm = config.get_list("winrm_listener");

    OsProfile {
        computer_name_prefix: non_empty(config.get_str("computer_name_prefix")),
        admin_username: Some(config.get_str("admin_username")),
        admin_password: Some(config.get_str("admin_password")),
        custom_data: non_empty(custom_data.to_string()),
        secrets: Some(expand_windows_secrets(&config.get_list("secret"))),
        windows_configuration: Some(WindowsConfiguration {
            provision_vm_agent: Some(config.get_bool("provision_vm_agent")),
            enable_automatic_updates: Some(config.get_bool("enable_automatic_updates")),
            time_zone: non_empty(config.get_str("timezone")),
            win_rm: if winrm.is_empty() {
                None
            } else {
                Some(expand_winrm_listeners(&winrm))
            },
            patch_settings: Some(PatchSettings {
                patch_mode: non_empty(config.get_str("patch_mode")),
                enable_hotpatching: Some(config.get_bool("hotpatching_enabled")),
            }),
        }),
        linux_configuration: None,
    }
}

pub fn expand_linux_configuration(
    config: &Map<String, Value>,
    custom_data: &str,
) -> VmssResult<OsProfile> {
    let admin_password = config.get_str("admin_password");
    let disable_password_authentication = config.get_bool("disable_password_authentication");
    let ssh_keys = expand_ssh_keys(&config.get_list("admin_ssh_key"));

    if !disable_password_authentication && admin_password.is_empty() {
        return Err(VmssError::expand(
            "os_profile",
            "an `admin_password` must be specified if `disable_password_authentication` is set \
             to `false`",
        ));
    }
    if disable_password_authentication && ssh_keys.is_empty() {
        return Err(VmssError::expand(
            "os_profile",
            "at least one `admin_ssh_key` must be specified when \
             `disable_password_authentication` is set to `true`",
        ));
    }

    Ok(OsProfile {
        computer_name_prefix: non_empty(config.get_str("computer_name_prefix")),
        admin_username: Some(config.get_str("admin_username")),
        admin_password: non_empty(admin_password),
        custom_data: non_empty(custom_data.to_string()),
        secrets: Some(expand_linux_secrets(&config.get_list("secret"))),
        windows_configuration: None,
        linux_configuration: Some(LinuxConfiguration {
            disable_password_authentication: Some(disable_password_authentication),
            ssh: Some(SshConfiguration {
                public_keys: Some(ssh_keys),
            }),
            provision_vm_agent: Some(config.get_bool("provision_vm_agent")),
            patch_settings: Some(LinuxPatchSettings {
                patch_mode: non_empty(config.get_str("patch_mode")),
            }),
        }),
    })
}

/// Keys are installed for `username` at the default authorized_keys path
pub fn expand_ssh_keys(keys: &[Value]) -> Vec<SshPublicKey> {
    keys.iter()
        .filter_map(Value::as_object)
        .map(|key| SshPublicKey {
            path: Some(format!(
                "/home/{}/.ssh/authorized_keys",
                key.get_str("username")
            )),
            key_data: Some(key.get_str("public_key")),
        })
        .collect()
}

fn flatten_ssh_keys(keys: Option<&Vec<SshPublicKey>>) -> Vec<Value> {
    keys.into_iter()
        .flatten()
        .filter_map(|key| {
            let path = key.path.as_deref()?;
            let username = path
                .strip_prefix("/home/")
                .and_then(|rest| rest.strip_suffix("/.ssh/authorized_keys"))?;
            Some(json!({
                "username": username,
                "public_key": key.key_data.clone().unwrap_or_default(),
            }))
        })
        .collect()
}

pub fn expand_winrm_listeners(listeners: &[Value]) -> WinRmConfiguration {
    let listeners = listeners
        .iter()
        .filter_map(Value::as_object)
        .map(|listener| WinRmListener {
            protocol: Some(listener.get_str("protocol")),
            certificate_url: non_empty(listener.get_str("certificate_url")),
        })
        .collect();

    WinRmConfiguration {
        listeners: Some(listeners),
    }
}

fn flatten_winrm_listeners(winrm: Option<&WinRmConfiguration>) -> Vec<Value> {
    winrm
        .and_then(|w| w.listeners.as_ref())
        .into_iter()
        .flatten()
        .map(|listener| {
            json!({
                "protocol": listener.protocol.clone().unwrap_or_default(),
                "certificate_url": listener.certificate_url.clone().unwrap_or_default(),
            })
        })
        .collect()
}

/// Windows certificates carry a store as well as a URL
pub fn expand_windows_secrets(secrets: &[Value]) -> Vec<VaultSecretGroup> {
    expand_secrets(secrets, |cert| VaultCertificate {
        certificate_url: Some(cert.get_str("url")),
        certificate_store: Some(cert.get_str("store")),
    })
}

pub fn expand_linux_secrets(secrets: &[Value]) -> Vec<VaultSecretGroup> {
    expand_secrets(secrets, |cert| VaultCertificate {
        certificate_url: Some(cert.get_str("url")),
        certificate_store: None,
    })
}

fn expand_secrets<F>(secrets: &[Value], certificate: F) -> Vec<VaultSecretGroup>
where
    F: Fn(&Map<String, Value>) -> VaultCertificate,
{
    secrets
        .iter()
        .filter_map(Value::as_object)
        .map(|secret| VaultSecretGroup {
            source_vault: Some(SubResource::new(secret.get_str("key_vault_id"))),
            vault_certificates: Some(
                secret
                    .get_list("certificate")
                    .iter()
                    .filter_map(Value::as_object)
                    .map(&certificate)
                    .collect(),
            ),
        })
        .collect()
}

fn flatten_secrets(secrets: Option<&Vec<VaultSecretGroup>>, with_store: bool) -> Vec<Value> {
    secrets
        .into_iter()
        .flatten()
        .map(|group| {
            let key_vault_id = group
                .source_vault
                .as_ref()
                .and_then(|v| v.id.clone())
                .unwrap_or_default();

            let certificates: Vec<Value> = group
                .vault_certificates
                .iter()
                .flatten()
                .map(|cert| {
                    let mut out = Map::new();
                    out.insert(
                        "url".to_string(),
                        json!(cert.certificate_url.clone().unwrap_or_default()),
                    );
                    if with_store {
                        out.insert(
                            "store".to_string(),
                            json!(cert.certificate_store.clone().unwrap_or_default()),
                        );
                    }
                    Value::Object(out)
                })
                .collect();

            json!({
                "key_vault_id": key_vault_id,
                "certificate": certificates,
            })
        })
        .collect()
}

/// Flatten the OS profile. The API never returns passwords or custom data,
/// so those are carried over from what was configured.
pub fn flatten_os_profile(profile: &OsProfile, d: &ResourceData) -> Vec<Value> {
    let mut out = Map::new();
    out.insert(
        "custom_data".to_string(),
        json!(d.get_str("os_profile.0.custom_data")),
    );

    let computer_name_prefix = profile.computer_name_prefix.clone().unwrap_or_default();
    let admin_username = profile.admin_username.clone().unwrap_or_default();

    if let Some(windows) = &profile.windows_configuration {
        let patch = windows.patch_settings.as_ref();
        out.insert(
            "windows_configuration".to_string(),
            json!([{
                "admin_username": admin_username,
                "admin_password": d.get_str("os_profile.0.windows_configuration.0.admin_password"),
                "computer_name_prefix": computer_name_prefix,
                "enable_automatic_updates": windows.enable_automatic_updates.unwrap_or(false),
                "hotpatching_enabled": patch.and_then(|p| p.enable_hotpatching).unwrap_or(false),
                "patch_mode": patch.and_then(|p| p.patch_mode.clone()).unwrap_or_default(),
                "provision_vm_agent": windows.provision_vm_agent.unwrap_or(false),
                "secret": flatten_secrets(profile.secrets.as_ref(), true),
                "timezone": windows.time_zone.clone().unwrap_or_default(),
                "winrm_listener": flatten_winrm_listeners(windows.win_rm.as_ref()),
            }]),
        );
    }

    if let Some(linux) = &profile.linux_configuration {
        out.insert(
            "linux_configuration".to_string(),
            json!([{
                "admin_username": admin_username,
                "admin_password": d.get_str("os_profile.0.linux_configuration.0.admin_password"),
                "admin_ssh_key": flatten_ssh_keys(linux.ssh.as_ref().and_then(|s| s.public_keys.as_ref())),
                "computer_name_prefix": computer_name_prefix,
                "disable_password_authentication": linux.disable_password_authentication.unwrap_or(false),
                "patch_mode": linux
                    .patch_settings
                    .as_ref()
                    .and_then(|p| p.patch_mode.clone())
                    .unwrap_or_default(),
                "provision_vm_agent": linux.provision_vm_agent.unwrap_or(false),
                "secret": flatten_secrets(profile.secrets.as_ref(), false),
            }]),
        );
    }

    vec![Value::Object(out)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    use super::super::schema::resource_schema;

    fn linux_profile(config: Value) -> Vec<Value> {
        vec![json!({ "linux_configuration": [config] })]
    }

    #[test]
    fn test_linux_profile_defaults_computer_name_prefix() {
        let (profile, os_type) = expand_os_profile(
            "web",
            &linux_profile(json!({
                "admin_username": "azureuser",
                "disable_password_authentication": true,
                "admin_ssh_key": [{"username": "azureuser", "public_key": "ssh-rsa AAA"}],
            })),
        )
        .unwrap();

        let profile = profile.unwrap();
        assert_eq!(os_type, OperatingSystemType::Linux);
        assert_eq!(profile.computer_name_prefix.as_deref(), Some("web"));

        let keys = profile
            .linux_configuration
            .unwrap()
            .ssh
            .unwrap()
            .public_keys
            .unwrap();
        assert_eq!(
            keys[0].path.as_deref(),
            Some("/home/azureuser/.ssh/authorized_keys")
        );
    }

    #[test]
    fn test_linux_password_rules() {
        let err = expand_os_profile(
            "web",
            &linux_profile(json!({
                "admin_username": "azureuser",
                "disable_password_authentication": false,
            })),
        )
        .unwrap_err();
        assert!(err.to_string().contains("`admin_password` must be specified"));

        let err = expand_os_profile(
            "web",
            &linux_profile(json!({
                "admin_username": "azureuser",
                "disable_password_authentication": true,
            })),
        )
        .unwrap_err();
        assert!(err.to_string().contains("admin_ssh_key"));
    }

    #[test]
    fn test_windows_prefix_falls_back_to_invalid_name() {
        let err = expand_os_profile(
            "name-too-long-for-windows",
            &[json!({
                "windows_configuration": [{
                    "admin_username": "adminuser",
                    "admin_password": "P@ssw0rd1234!",
                }]
            })],
        )
        .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("unable to assume default computer name prefix"));
    }

    #[test]
    fn test_windows_secrets_and_winrm() {
        let profile = expand_windows_configuration(
            json!({
                "admin_username": "adminuser",
                "admin_password": "secret",
                "computer_name_prefix": "win",
                "secret": [{
                    "key_vault_id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.KeyVault/vaults/kv",
                    "certificate": [{"store": "My", "url": "https://kv/cert"}],
                }],
                "winrm_listener": [{"protocol": "Http"}],
            })
            .as_object()
            .unwrap(),
            "",
        );

        let secrets = profile.secrets.unwrap();
        let cert = &secrets[0].vault_certificates.as_ref().unwrap()[0];
        assert_eq!(cert.certificate_store.as_deref(), Some("My"));
        assert!(profile.custom_data.is_none());

        let listeners = profile
            .windows_configuration
            .unwrap()
            .win_rm
            .unwrap()
            .listeners
            .unwrap();
        assert_eq!(listeners[0].protocol.as_deref(), Some("Http"));
        assert_eq!(listeners[0].certificate_url, None);
    }

    #[test]
    fn test_flatten_carries_write_only_values() {
        let config = json!({
            "os_profile": [{
                "custom_data": "Y3VzdG9t",
                "linux_configuration": [{
                    "admin_username": "azureuser",
                    "admin_password": "hunter2",
                    "disable_password_authentication": false,
                }]
            }]
        });
        let d = ResourceData::new(
            Arc::new(resource_schema()),
            config.as_object().cloned().unwrap(),
        );

        let profile = OsProfile {
            computer_name_prefix: Some("web".to_string()),
            admin_username: Some("azureuser".to_string()),
            linux_configuration: Some(LinuxConfiguration {
                disable_password_authentication: Some(false),
                ssh: Some(SshConfiguration {
                    public_keys: Some(vec![SshPublicKey {
                        path: Some("/home/azureuser/.ssh/authorized_keys".to_string()),
                        key_data: Some("ssh-rsa AAA".to_string()),
                    }]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let flattened = flatten_os_profile(&profile, &d);
        assert_eq!(flattened[0]["custom_data"], json!("Y3VzdG9t"));
        let linux = &flattened[0]["linux_configuration"][0];
        assert_eq!(linux["admin_password"], json!("hunter2"));
        assert_eq!(linux["admin_ssh_key"][0]["username"], json!("azureuser"));
    }
}
