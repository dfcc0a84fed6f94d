//! Network interface blocks with their IP configurations and public IPs.

use serde_json::{json, Map, Value};

use super::super::models::{
    IpConfiguration, IpConfigurationProperties, IpTag, IpVersion, NetworkInterfaceConfiguration,
    NetworkInterfaceConfigurationProperties, NetworkInterfaceDnsSettings,
    PublicIpAddressConfiguration, PublicIpAddressConfigurationProperties, PublicIpDnsSettings,
    SubResource,
};
use super::super::schema::{first_block, BlockExt};
use super::{VmssError, VmssResult};

fn sub_resources(ids: Vec<String>) -> Vec<SubResource> {
    ids.into_iter().map(SubResource::new).collect()
}

fn sub_resource_ids(resources: Option<&Vec<SubResource>>) -> Vec<Value> {
    resources
        .into_iter()
        .flatten()
        .filter_map(|r| r.id.clone())
        .map(Value::String)
        .collect()
}

fn ip_version(raw: &str) -> VmssResult<IpVersion> {
    if raw.is_empty() {
        return Ok(IpVersion::IPv4);
    }
    raw.parse()
        .map_err(|e: String| VmssError::expand("network_interface", e))
}

/// Expand every `network_interface` block
pub fn expand_network_interfaces(
    interfaces: &[Value],
) -> VmssResult<Vec<NetworkInterfaceConfiguration>> {
    interfaces
        .iter()
        .filter_map(Value::as_object)
        .map(expand_network_interface)
        .collect()
}

fn expand_network_interface(nic: &Map<String, Value>) -> VmssResult<NetworkInterfaceConfiguration> {
    let ip_configurations = nic
        .get_list("ip_configuration")
        .iter()
        .filter_map(Value::as_object)
        .map(expand_ip_configuration)
        .collect::<VmssResult<Vec<_>>>()?;

    let network_security_group = Some(nic.get_str("network_security_group_id"))
        .filter(|id| !id.is_empty())
        .map(SubResource::new);

    Ok(NetworkInterfaceConfiguration {
        name: Some(nic.get_str("name")),
        properties: Some(NetworkInterfaceConfigurationProperties {
            primary: Some(nic.get_bool("primary")),
            enable_accelerated_networking: Some(nic.get_bool("enable_accelerated_networking")),
            enable_ip_forwarding: Some(nic.get_bool("enable_ip_forwarding")),
            network_security_group,
            dns_settings: Some(NetworkInterfaceDnsSettings {
                dns_servers: Some(nic.get_string_list("dns_servers")),
            }),
            ip_configurations: Some(ip_configurations),
        }),
    })
}

fn expand_ip_configuration(config: &Map<String, Value>) -> VmssResult<IpConfiguration> {
    let primary = config.get_bool("primary");
    let version = ip_version(&config.get_str("version"))?;

    if primary && version == IpVersion::IPv6 {
        return Err(VmssError::expand(
            "network_interface",
            "An IPv6 Primary IP Configuration is unsupported - instead add a IPv4 IP \
             Configuration as the Primary and use a secondary IP Configuration for IPv6",
        ));
    }

    let subnet = Some(config.get_str("subnet_id"))
        .filter(|id| !id.is_empty())
        .map(SubResource::new);

    let public_ip_address_configuration = first_block(&config.get_list("public_ip_address"))
        .map(expand_public_ip_address)
        .transpose()?;

    Ok(IpConfiguration {
        name: Some(config.get_str("name")),
        properties: Some(IpConfigurationProperties {
            subnet,
            primary: Some(primary),
            public_ip_address_configuration,
            private_ip_address_version: Some(version),
            application_gateway_backend_address_pools: Some(sub_resources(
                config.get_string_list("application_gateway_backend_address_pool_ids"),
            )),
            application_security_groups: Some(sub_resources(
                config.get_string_list("application_security_group_ids"),
            )),
            load_balancer_backend_address_pools: Some(sub_resources(
                config.get_string_list("load_balancer_backend_address_pool_ids"),
            )),
        }),
    })
}

fn expand_public_ip_address(
    config: &Map<String, Value>,
) -> VmssResult<PublicIpAddressConfiguration> {
    let ip_tags = config
        .get_list("ip_tag")
        .iter()
        .filter_map(Value::as_object)
        .map(|tag| IpTag {
            ip_tag_type: Some(tag.get_str("type")),
            tag: Some(tag.get_str("tag")),
        })
        .collect();

    let dns_settings = Some(config.get_str("domain_name_label"))
        .filter(|label| !label.is_empty())
        .map(|label| PublicIpDnsSettings {
            domain_name_label: Some(label),
        });

    let idle_timeout_in_minutes = match config.get_i64("idle_timeout_in_minutes") {
        0 => None,
        minutes => Some(VmssError::int32(
            "network_interface.ip_configuration.public_ip_address.idle_timeout_in_minutes",
            minutes,
        )?),
    };

    let public_ip_prefix = Some(config.get_str("public_ip_prefix_id"))
        .filter(|id| !id.is_empty())
        .map(SubResource::new);

    Ok(PublicIpAddressConfiguration {
        name: Some(config.get_str("name")),
        properties: Some(PublicIpAddressConfigurationProperties {
            idle_timeout_in_minutes,
            dns_settings,
            ip_tags: Some(ip_tags),
            public_ip_prefix,
            public_ip_address_version: Some(ip_version(&config.get_str("version"))?),
        }),
    })
}

pub fn flatten_network_interfaces(
    interfaces: Option<&Vec<NetworkInterfaceConfiguration>>,
) -> Vec<Value> {
    interfaces
        .into_iter()
        .flatten()
        .map(flatten_network_interface)
        .collect()
}

fn flatten_network_interface(nic: &NetworkInterfaceConfiguration) -> Value {
    let default_props = NetworkInterfaceConfigurationProperties::default();
    let props = nic.properties.as_ref().unwrap_or(&default_props);

    let dns_servers: Vec<Value> = props
        .dns_settings
        .as_ref()
        .and_then(|d| d.dns_servers.as_ref())
        .into_iter()
        .flatten()
        .cloned()
        .map(Value::String)
        .collect();

    let ip_configurations: Vec<Value> = props
        .ip_configurations
        .iter()
        .flatten()
        .map(flatten_ip_configuration)
        .collect();

    json!({
        "name": nic.name.clone().unwrap_or_default(),
        "dns_servers": dns_servers,
        "enable_accelerated_networking": props.enable_accelerated_networking.unwrap_or(false),
        "enable_ip_forwarding": props.enable_ip_forwarding.unwrap_or(false),
        "ip_configuration": ip_configurations,
        "network_security_group_id": props
            .network_security_group
            .as_ref()
            .and_then(|n| n.id.clone())
            .unwrap_or_default(),
        "primary": props.primary.unwrap_or(false),
    })
}

fn flatten_ip_configuration(config: &IpConfiguration) -> Value {
    let default_props = IpConfigurationProperties::default();
    let props = config.properties.as_ref().unwrap_or(&default_props);

    let public_ip_address: Vec<Value> = props
        .public_ip_address_configuration
        .iter()
        .map(flatten_public_ip_address)
        .collect();

    json!({
        "name": config.name.clone().unwrap_or_default(),
        "application_gateway_backend_address_pool_ids":
            sub_resource_ids(props.application_gateway_backend_address_pools.as_ref()),
        "application_security_group_ids":
            sub_resource_ids(props.application_security_groups.as_ref()),
        "load_balancer_backend_address_pool_ids":
            sub_resource_ids(props.load_balancer_backend_address_pools.as_ref()),
        "primary": props.primary.unwrap_or(false),
        "public_ip_address": public_ip_address,
        "subnet_id": props.subnet.as_ref().and_then(|s| s.id.clone()).unwrap_or_default(),
        "version": props.private_ip_address_version.unwrap_or(IpVersion::IPv4).as_str(),
    })
}

fn flatten_public_ip_address(config: &PublicIpAddressConfiguration) -> Value {
    let default_props = PublicIpAddressConfigurationProperties::default();
    let props = config.properties.as_ref().unwrap_or(&default_props);

    let ip_tags: Vec<Value> = props
        .ip_tags
        .iter()
        .flatten()
        .map(|tag| {
            json!({
                "tag": tag.tag.clone().unwrap_or_default(),
                "type": tag.ip_tag_type.clone().unwrap_or_default(),
            })
        })
        .collect();

    json!({
        "name": config.name.clone().unwrap_or_default(),
        "domain_name_label": props
            .dns_settings
            .as_ref()
            .and_then(|d| d.domain_name_label.clone())
            .unwrap_or_default(),
        "idle_timeout_in_minutes": props.idle_timeout_in_minutes.unwrap_or(0),
        "ip_tag": ip_tags,
        "public_ip_prefix_id": props
            .public_ip_prefix
            .as_ref()
            .and_then(|p| p.id.clone())
            .unwrap_or_default(),
        "version": props.public_ip_address_version.unwrap_or(IpVersion::IPv4).as_str(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SUBNET: &str = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vn/subnets/internal";

    fn nic(ip_configuration: Value) -> Vec<Value> {
        vec![json!({
            "name": "nic",
            "primary": true,
            "ip_configuration": [ip_configuration],
        })]
    }

    #[test]
    fn test_expand_network_interface() {
        let nics = expand_network_interfaces(&nic(json!({
            "name": "internal",
            "primary": true,
            "subnet_id": SUBNET,
            "version": "IPv4",
            "public_ip_address": [{"name": "pip", "domain_name_label": "web", "idle_timeout_in_minutes": 4}],
        })))
        .unwrap();

        let props = nics[0].properties.as_ref().unwrap();
        assert_eq!(props.primary, Some(true));
        assert!(props.network_security_group.is_none());

        let ip = &props.ip_configurations.as_ref().unwrap()[0];
        let ip_props = ip.properties.as_ref().unwrap();
        assert_eq!(ip_props.subnet, Some(SubResource::new(SUBNET)));

        let pip = ip_props.public_ip_address_configuration.as_ref().unwrap();
        let pip_props = pip.properties.as_ref().unwrap();
        assert_eq!(pip_props.idle_timeout_in_minutes, Some(4));
        assert_eq!(pip_props.public_ip_address_version, Some(IpVersion::IPv4));
    }

    #[test]
    fn test_primary_ipv6_is_rejected() {
        let err = expand_network_interfaces(&nic(json!({
            "name": "internal",
            "primary": true,
            "version": "IPv6",
        })))
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("An IPv6 Primary IP Configuration is unsupported"));
    }

    #[test]
    fn test_flatten_network_interface() {
        let nics = expand_network_interfaces(&nic(json!({
            "name": "internal",
            "primary": true,
            "subnet_id": SUBNET,
            "load_balancer_backend_address_pool_ids": ["/pool/1"],
        })))
        .unwrap();

        let flattened = flatten_network_interfaces(Some(&nics));
        assert_eq!(flattened[0]["name"], json!("nic"));
        let ip = &flattened[0]["ip_configuration"][0];
        assert_eq!(ip["subnet_id"], json!(SUBNET));
        assert_eq!(ip["load_balancer_backend_address_pool_ids"], json!(["/pool/1"]));
        assert_eq!(ip["version"], json!("IPv4"));
        assert_eq!(ip["public_ip_address"], json!([]));
    }
}
