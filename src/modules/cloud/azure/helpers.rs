//! Conversions shared by every Azure resource: locations, tags, zones and
//! the orchestrated `sku_name` format.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::models::Sku;

/// Lower-case a location and strip its spaces, so `West Europe` becomes `westeurope`
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}

/// Convert a configured tag map into the API representation
pub fn expand_tags(tags: &Map<String, Value>) -> BTreeMap<String, String> {
    tags.iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

pub fn flatten_tags(tags: Option<&BTreeMap<String, String>>) -> Map<String, Value> {
    tags.map(|tags| {
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    })
    .unwrap_or_default()
}

/// Zones are sent as-is; an empty list is omitted
pub fn expand_zones(zones: &[Value]) -> Option<Vec<String>> {
    let zones: Vec<String> = zones
        .iter()
        .filter_map(|z| z.as_str().map(str::to_string))
        .collect();

    if zones.is_empty() {
        None
    } else {
        Some(zones)
    }
}

pub fn flatten_zones(zones: Option<&Vec<String>>) -> Vec<Value> {
    zones
        .map(|z| z.iter().cloned().map(Value::String).collect())
        .unwrap_or_default()
}

/// Split `{vm size}_{capacity}` into a [`Sku`]; every exposed tier is `Standard`
pub fn expand_orchestrated_sku(input: &str) -> Result<Sku, String> {
    let parts: Vec<&str> = input.split('_').collect();

    let (capacity, name) = match parts.split_last() {
        Some((capacity, name)) if parts.len() >= 2 && !name.iter().any(|p| p.is_empty()) => {
            (capacity, name.join("_"))
        }
        _ => return Err(format!("'sku_name'({:?}) is not formatted properly.", input)),
    };

    let capacity: i64 = capacity.parse().map_err(|e| {
        format!(
            "'sku_name'({:?}) is not formatted properly, capacity {:?} is not an integer: {}",
            input, capacity, e
        )
    })?;

    Ok(Sku {
        name: Some(name),
        tier: Some("Standard".to_string()),
        capacity: Some(capacity),
    })
}

/// Join a [`Sku`] back into `{vm size}_{capacity}`
pub fn flatten_orchestrated_sku(sku: &Sku) -> Result<String, String> {
    let name = sku
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "sku name was nil".to_string())?;
    let capacity = sku
        .capacity
        .ok_or_else(|| "sku capacity was nil".to_string())?;

    Ok(format!("{}_{}", name, capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_normalize_location() {
        assert_eq!(normalize_location("West Europe"), "westeurope");
        assert_eq!(normalize_location("eastus2"), "eastus2");
    }

    #[test]
    fn test_expand_orchestrated_sku() {
        let sku = expand_orchestrated_sku("Standard_D2s_v3_2").unwrap();
        assert_eq!(sku.name.as_deref(), Some("Standard_D2s_v3"));
        assert_eq!(sku.capacity, Some(2));
        assert_eq!(sku.tier.as_deref(), Some("Standard"));

        assert!(expand_orchestrated_sku("Standard").is_err());
        assert!(expand_orchestrated_sku("Standard_D2s_x").is_err());
    }

    #[test]
    fn test_flatten_orchestrated_sku() {
        let sku = Sku {
            name: Some("Standard_F2".to_string()),
            tier: Some("Standard".to_string()),
            capacity: Some(0),
        };
        assert_eq!(flatten_orchestrated_sku(&sku).unwrap(), "Standard_F2_0");

        let missing = Sku {
            capacity: None,
            ..sku
        };
        assert!(flatten_orchestrated_sku(&missing).is_err());
    }

    #[test]
    fn test_tags_and_zones() {
        let tags = json!({"env": "prod", "tier": 1});
        let expanded = expand_tags(tags.as_object().unwrap());
        assert_eq!(expanded.get("tier").map(String::as_str), Some("1"));

        assert_eq!(expand_zones(&[]), None);
        assert_eq!(
            expand_zones(&[json!("1"), json!("2")]),
            Some(vec!["1".to_string(), "2".to_string()])
        );
    }
}
