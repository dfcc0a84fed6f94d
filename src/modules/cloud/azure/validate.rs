//! Attribute validators.
//!
//! Every validator takes the raw configuration value and the attribute key it
//! was found under, and returns [`Diagnostics`]. Validators never panic on
//! unexpected input: a value of the wrong JSON type is reported as an error.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::parse::{ResourceId, SharedGalleryImageVersionId, VirtualMachineScaleSetId};

/// Warnings and errors produced by validating one value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            warnings: Vec::new(),
            errors: vec![message.into()],
        }
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn push_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A reusable validation function
pub type ValidateFn = Arc<dyn Fn(&Value, &str) -> Diagnostics + Send + Sync>;

fn expect_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, Diagnostics> {
    input
        .as_str()
        .ok_or_else(|| Diagnostics::error(format!("expected {:?} to be a string", key)))
}

/// Validates a Shared Image Gallery image version resource ID
pub fn shared_gallery_image_version_id(input: &Value, key: &str) -> Diagnostics {
    let v = match expect_str(input, key) {
        Ok(v) => v,
        Err(diags) => return diags,
    };

    match SharedGalleryImageVersionId::parse(v) {
        Ok(_) => Diagnostics::new(),
        Err(e) => Diagnostics::error(e.to_string()),
    }
}

/// Validates a Virtual Machine Scale Set resource ID
pub fn virtual_machine_scale_set_id(input: &Value, key: &str) -> Diagnostics {
    let v = match expect_str(input, key) {
        Ok(v) => v,
        Err(diags) => return diags,
    };

    match VirtualMachineScaleSetId::parse(v) {
        Ok(_) => Diagnostics::new(),
        Err(e) => Diagnostics::error(e.to_string()),
    }
}

/// Validates any ARM resource ID
pub fn resource_id(input: &Value, key: &str) -> Diagnostics {
    let v = match expect_str(input, key) {
        Ok(v) => v,
        Err(diags) => return diags,
    };

    if v.is_empty() {
        return Diagnostics::error(format!("{:?} cannot be an empty string", key));
    }

    match ResourceId::parse(v) {
        Ok(_) => Diagnostics::new(),
        Err(e) => Diagnostics::error(format!("{:?}: {}", key, e)),
    }
}

static RESOURCE_GROUP_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-\w._()]+$").expect("resource group regex is valid")
});

/// Validates a resource group name: 1 to 90 word characters, `-`, `.`, `(` or `)`,
/// not ending in a period
pub fn resource_group_name(input: &Value, key: &str) -> Diagnostics {
    let v = match expect_str(input, key) {
        Ok(v) => v,
        Err(diags) => return diags,
    };

    if v.is_empty() {
        return Diagnostics::error(format!("{:?} cannot be blank", key));
    }

    let mut diags = Diagnostics::new();
    if v.chars().count() > 90 {
        diags.push_error(format!("{:?} may not exceed 90 characters in length", key));
    }
    if v.ends_with('.') {
        diags.push_error(format!("{:?} may not end with a period", key));
    }
    if !RESOURCE_GROUP_NAME.is_match(v) {
        diags.push_error(format!(
            "{:?} may only contain alphanumeric characters, dash, underscores, parentheses and periods",
            key
        ));
    }
    diags
}

static VM_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("vm name regex is valid"));

static COMPUTER_NAME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9.-]+$").expect("computer name prefix regex is valid"));

/// Shared rules for VM names and computer name prefixes
fn validate_name(v: &str, key: &str, max_length: usize, allow_underscore: bool) -> Diagnostics {
    let mut diags = Diagnostics::new();

    if v.is_empty() {
        diags.push_error(format!("{:?} cannot be an empty string: {:?}", key, v));
        return diags;
    }

    let length = v.chars().count();
    if length > max_length {
        diags.push_error(format!(
            "{:?} can be at most {} characters, got {}",
            key, max_length, length
        ));
    }

    if v.starts_with('_') {
        diags.push_error(format!("{:?} cannot begin with an underscore", key));
    }

    if v.ends_with('.') || v.ends_with('-') {
        diags.push_error(format!("{:?} cannot end with a period or a hyphen", key));
    }

    let allowed = if allow_underscore {
        &*VM_NAME
    } else {
        &*COMPUTER_NAME_PREFIX
    };
    if !allowed.is_match(v) {
        let charset = if allow_underscore {
            "letters, digits, periods, underscores and hyphens"
        } else {
            "letters, digits, periods and hyphens"
        };
        diags.push_error(format!("{:?} may only contain {}, got {:?}", key, charset, v));
    }

    diags
}

/// Validates a scale set name: 1 to 64 characters
pub fn virtual_machine_name(input: &Value, key: &str) -> Diagnostics {
    match expect_str(input, key) {
        Ok(v) => validate_name(v, key, 64, true),
        Err(diags) => diags,
    }
}

/// Validates a Windows computer name prefix: at most 9 characters, not only digits
pub fn windows_computer_name_prefix(input: &Value, key: &str) -> Diagnostics {
    let v = match expect_str(input, key) {
        Ok(v) => v,
        Err(diags) => return diags,
    };

    let mut diags = validate_name(v, key, 9, false);
    if !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()) {
        diags.push_error(format!("{:?} cannot contain only numbers", key));
    }
    diags
}

/// Validates a Linux computer name prefix: at most 58 characters
pub fn linux_computer_name_prefix(input: &Value, key: &str) -> Diagnostics {
    match expect_str(input, key) {
        Ok(v) => validate_name(v, key, 58, false),
        Err(diags) => diags,
    }
}

/// Validates `sku_name`, formatted as `{vm size}_{capacity}` e.g. `Standard_D2s_v3_2`
pub fn orchestrated_sku(input: &Value, key: &str) -> Diagnostics {
    let v = match expect_str(input, key) {
        Ok(v) => v,
        Err(diags) => return diags,
    };

    let parts: Vec<&str> = v.split('_').collect();
    if parts.len() < 3 || v.contains("__") || v.contains(' ') {
        return Diagnostics::error(format!("{:?} is not formatted properly, got {:?}", key, v));
    }

    let capacity = parts[parts.len() - 1];
    if capacity.parse::<i64>().is_err() {
        return Diagnostics::error(format!(
            "{:?} is not formatted properly, the last part of the sku_name must be an integer, got {:?}",
            key, v
        ));
    }

    Diagnostics::new()
}

/// Validates a Spot max price: `-1` (pay up to the on-demand price) or at least `0.00001`
pub fn spot_max_price(input: &Value, key: &str) -> Diagnostics {
    let v = match input.as_f64() {
        Some(v) => v,
        None => return Diagnostics::error(format!("expected {:?} to be a float", key)),
    };

    if v == -1.0 {
        return Diagnostics::new();
    }

    if v < 0.00001 {
        return Diagnostics::error(format!(
            "expected {:?} to be > 0.00001 but got {:.5}",
            key, v
        ));
    }

    Diagnostics::new()
}

static ISO8601_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("ISO8601 duration regex is valid")
});

/// Parse an ISO8601 duration such as `PT1H30M` into a [`Duration`].
///
/// Years count as 365 days and months as 30 days.
pub fn parse_iso8601_duration(input: &str) -> Result<Duration, String> {
    let caps = ISO8601_DURATION
        .captures(input)
        .ok_or_else(|| format!("{:?} is not a valid ISO8601 duration", input))?;

    if input == "P" || input.ends_with('T') {
        return Err(format!("{:?} is not a valid ISO8601 duration", input));
    }

    const UNITS: [f64; 7] = [
        365.0 * 86_400.0,
        30.0 * 86_400.0,
        7.0 * 86_400.0,
        86_400.0,
        3_600.0,
        60.0,
        1.0,
    ];

    let mut seconds = 0.0;
    for (idx, unit) in UNITS.iter().enumerate() {
        if let Some(m) = caps.get(idx + 1) {
            let n: f64 = m
                .as_str()
                .parse()
                .map_err(|_| format!("{:?} is not a valid ISO8601 duration", input))?;
            seconds += n * unit;
        }
    }

    Duration::try_from_secs_f64(seconds)
        .map_err(|_| format!("{:?} is out of range for a duration", input))
}

/// Validates that a value is an ISO8601 duration
pub fn iso8601_duration(input: &Value, key: &str) -> Diagnostics {
    let v = match input.as_str() {
        Some(v) => v,
        None => return Diagnostics::error(format!("expected type of {:?} to be string", key)),
    };

    match parse_iso8601_duration(v) {
        Ok(_) => Diagnostics::new(),
        Err(e) => Diagnostics::error(e),
    }
}

/// Validates an ISO8601 duration within the inclusive range `min..=max`
pub fn iso8601_duration_between(min: &'static str, max: &'static str) -> ValidateFn {
    Arc::new(move |input: &Value, key: &str| {
        let v = match input.as_str() {
            Some(v) => v,
            None => {
                return Diagnostics::error(format!("expected type of {:?} to be string", key))
            }
        };

        let duration = match parse_iso8601_duration(v) {
            Ok(d) => d,
            Err(e) => return Diagnostics::error(e),
        };

        let (lower, upper) = match (parse_iso8601_duration(min), parse_iso8601_duration(max)) {
            (Ok(lower), Ok(upper)) => (lower, upper),
            _ => return Diagnostics::error(format!("invalid duration bounds {} - {}", min, max)),
        };

        if duration < lower || duration > upper {
            return Diagnostics::error(format!(
                "expected {} to be in the range ({} - {}), got {}",
                key, min, max, v
            ));
        }

        Diagnostics::new()
    })
}

/// Validates that a string is one of `values`
pub fn string_in_slice(values: &'static [&'static str], ignore_case: bool) -> ValidateFn {
    Arc::new(move |input: &Value, key: &str| {
        let v = match input.as_str() {
            Some(v) => v,
            None => {
                return Diagnostics::error(format!("expected type of {} to be string", key))
            }
        };

        let found = values.iter().any(|candidate| {
            if ignore_case {
                candidate.eq_ignore_ascii_case(v)
            } else {
                *candidate == v
            }
        });

        if found {
            Diagnostics::new()
        } else {
            Diagnostics::error(format!(
                "expected {} to be one of [{}], got {}",
                key,
                values.join(" "),
                v
            ))
        }
    })
}

/// Validates that an integer lies within the inclusive range `min..=max`
pub fn int_between(min: i64, max: i64) -> ValidateFn {
    Arc::new(move |input: &Value, key: &str| {
        let v = match input.as_i64() {
            Some(v) => v,
            None => return Diagnostics::error(format!("expected type of {} to be integer", key)),
        };

        if v < min || v > max {
            return Diagnostics::error(format!(
                "expected {} to be in the range ({} - {}), got {}",
                key, min, max, v
            ));
        }

        Diagnostics::new()
    })
}

pub fn string_is_not_empty(input: &Value, key: &str) -> Diagnostics {
    match expect_str(input, key) {
        Ok(v) if v.trim().is_empty() => Diagnostics::error(format!(
            "expected {:?} to not be an empty string, got {:?}",
            key, v
        )),
        Ok(_) => Diagnostics::new(),
        Err(diags) => diags,
    }
}

pub fn string_is_base64(input: &Value, key: &str) -> Diagnostics {
    let v = match expect_str(input, key) {
        Ok(v) => v,
        Err(diags) => return diags,
    };

    match base64::engine::general_purpose::STANDARD.decode(v) {
        Ok(_) => Diagnostics::new(),
        Err(_) => Diagnostics::error(format!("expected {:?} to be a base64 string, got {}", key, v)),
    }
}

pub fn string_is_json(input: &Value, key: &str) -> Diagnostics {
    let v = match expect_str(input, key) {
        Ok(v) => v,
        Err(diags) => return diags,
    };

    if v.is_empty() {
        return Diagnostics::error(format!("expected {:?} to contain JSON, got an empty string", key));
    }

    match serde_json::from_str::<Value>(v) {
        Ok(_) => Diagnostics::new(),
        Err(e) => Diagnostics::error(format!("{:?} contains an invalid JSON: {}", key, e)),
    }
}

/// Validates a tag map: at most 50 tags, keys up to 512 and values up to 256 characters
pub fn tags(input: &Value, key: &str) -> Diagnostics {
    let map = match input.as_object() {
        Some(map) => map,
        None => return Diagnostics::error(format!("expected {:?} to be a map", key)),
    };

    let mut diags = Diagnostics::new();
    if map.len() > 50 {
        diags.push_error("a maximum of 50 tags can be applied to each ARM resource");
    }

    for (k, v) in map {
        if k.chars().count() > 512 {
            diags.push_error(format!(
                "the maximum length for a tag key is 512 characters: {:?} is {} characters",
                k,
                k.chars().count()
            ));
        }

        let value = match v {
            Value::String(s) => s.clone(),
            Value::Number(_) | Value::Bool(_) => v.to_string(),
            _ => {
                diags.push_error(format!("the value for tag {:?} must be a string", k));
                continue;
            }
        };

        if value.chars().count() > 256 {
            diags.push_error(format!(
                "the maximum length for a tag value is 256 characters: the value for {:?} is {} characters",
                k,
                value.chars().count()
            ));
        }
    }

    diags
}
