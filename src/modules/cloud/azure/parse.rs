//! Azure resource ID parsing.
//!
//! Resource IDs are `/`-separated key/value pairs:
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}[/...]`.
//! [`ResourceId`] splits any such ID; the typed IDs pop the segments they
//! need and reject anything left over.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing a resource ID
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("cannot parse Azure ID {0:?}: the ID must be an absolute path")]
    NotAbsolute(String),

    #[error("the number of path segments is not divisible by 2 in {0:?}")]
    OddSegmentCount(String),

    #[error("key/value cannot be empty strings. Key: '{key}', Value: '{value}'")]
    EmptySegment { key: String, value: String },

    #[error("no subscription ID found in: {0:?}")]
    MissingSubscription(String),

    #[error("ID was missing the `{0}` element")]
    MissingSegment(String),

    #[error("ID contained more segments than required: {id:?}, {remaining}")]
    UnexpectedSegments { id: String, remaining: String },
}

/// A generic, partially consumed Azure resource ID
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider: String,
    /// Remaining key/value segments not yet popped
    pub path: HashMap<String, String>,
}

impl ResourceId {
    /// Split an ID into its key/value segments.
    ///
    /// The first `subscriptions` and first `providers` keys are captured
    /// separately so nested resources reusing those keys do not clobber them.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if !input.starts_with('/') {
            return Err(ParseError::NotAbsolute(input.to_string()));
        }

        // Query strings and fragments are not part of the ID.
        let path = input
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_start_matches('/')
            .trim_end_matches('/');

        let components: Vec<&str> = path.split('/').collect();
        if components.len() % 2 != 0 {
            return Err(ParseError::OddSegmentCount(path.to_string()));
        }

        let mut subscription_id = String::new();
        let mut provider = String::new();
        let mut map = HashMap::with_capacity(components.len() / 2);

        for pair in components.chunks_exact(2) {
            let (key, value) = (pair[0], pair[1]);
            if key.is_empty() || value.is_empty() {
                return Err(ParseError::EmptySegment {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }

            match key {
                "subscriptions" if subscription_id.is_empty() => {
                    subscription_id = value.to_string()
                }
                "providers" if provider.is_empty() => provider = value.to_string(),
                _ => {
                    map.insert(key.to_string(), value.to_string());
                }
            }
        }

        if subscription_id.is_empty() {
            return Err(ParseError::MissingSubscription(path.to_string()));
        }

        let resource_group = map
            .remove("resourceGroups")
            .or_else(|| map.remove("resourcegroups"))
            .unwrap_or_default();

        Ok(Self {
            subscription_id,
            resource_group,
            provider,
            path: map,
        })
    }

    /// Remove `name` from the remaining segments and return its value
    pub fn pop_segment(&mut self, name: &str) -> Result<String, ParseError> {
        self.path
            .remove(name)
            .ok_or_else(|| ParseError::MissingSegment(name.to_string()))
    }

    /// Fail if any segment has not been consumed
    pub fn validate_no_empty_segments(&self, source: &str) -> Result<(), ParseError> {
        if self.path.is_empty() {
            return Ok(());
        }

        let mut remaining: Vec<String> = self
            .path
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect();
        remaining.sort();

        Err(ParseError::UnexpectedSegments {
            id: source.to_string(),
            remaining: format!("map[{}]", remaining.join(" ")),
        })
    }

    fn require_scope(&self) -> Result<(), ParseError> {
        if self.subscription_id.is_empty() {
            return Err(ParseError::MissingSegment("subscriptions".to_string()));
        }
        if self.resource_group.is_empty() {
            return Err(ParseError::MissingSegment("resourceGroups".to_string()));
        }
        Ok(())
    }
}

/// ID of a Virtual Machine Scale Set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualMachineScaleSetId {
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
}

impl VirtualMachineScaleSetId {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut id = ResourceId::parse(input)?;
        id.require_scope()?;

        let name = id.pop_segment("virtualMachineScaleSets")?;
        id.validate_no_empty_segments(input)?;

        Ok(Self {
            subscription_id: id.subscription_id,
            resource_group: id.resource_group,
            name,
        })
    }

    /// The canonical string form of this ID
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VirtualMachineScaleSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachineScaleSets/{}",
            self.subscription_id, self.resource_group, self.name
        )
    }
}

impl FromStr for VirtualMachineScaleSetId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// ID of an image version published in a Shared Image Gallery
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SharedGalleryImageVersionId {
    pub subscription_id: String,
    pub resource_group: String,
    pub gallery_name: String,
    pub image_name: String,
    pub version_name: String,
}

impl SharedGalleryImageVersionId {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        gallery_name: impl Into<String>,
        image_name: impl Into<String>,
        version_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            gallery_name: gallery_name.into(),
            image_name: image_name.into(),
            version_name: version_name.into(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut id = ResourceId::parse(input)?;
        id.require_scope()?;

        let gallery_name = id.pop_segment("galleries")?;
        let image_name = id.pop_segment("images")?;
        let version_name = id.pop_segment("versions")?;
        id.validate_no_empty_segments(input)?;

        Ok(Self {
            subscription_id: id.subscription_id,
            resource_group: id.resource_group,
            gallery_name,
            image_name,
            version_name,
        })
    }

    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SharedGalleryImageVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/galleries/{}/images/{}/versions/{}",
            self.subscription_id,
            self.resource_group,
            self.gallery_name,
            self.image_name,
            self.version_name
        )
    }
}

impl FromStr for SharedGalleryImageVersionId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
