//! Validate-id command
//!
//! Checks Shared Image Gallery image version IDs offline, without credentials.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use rustible_vmss::modules::cloud::azure::parse::SharedGalleryImageVersionId;
use rustible_vmss::modules::cloud::azure::validate::shared_gallery_image_version_id;
use serde::Serialize;
use serde_json::Value;

/// Arguments for the validate-id command
#[derive(Parser, Debug, Clone)]
pub struct ValidateIdArgs {
    /// IDs to validate
    #[arg(required = true)]
    pub ids: Vec<String>,
}

/// Validation outcome for one ID
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IdReport {
    pub id: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gallery: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl IdReport {
    fn check(id: &str) -> Self {
        let diags = shared_gallery_image_version_id(&Value::String(id.to_string()), "id");
        let parsed = if diags.is_ok() {
            SharedGalleryImageVersionId::parse(id).ok()
        } else {
            None
        };

        Self {
            id: id.to_string(),
            valid: diags.is_ok(),
            errors: diags.errors,
            gallery: parsed.as_ref().map(|p| p.gallery_name.clone()),
            image: parsed.as_ref().map(|p| p.image_name.clone()),
            version: parsed.map(|p| p.version_name),
        }
    }
}

impl ValidateIdArgs {
    /// Execute the validate-id command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let reports: Vec<IdReport> = self.ids.iter().map(|id| IdReport::check(id)).collect();
        let invalid = reports.iter().filter(|r| !r.valid).count();

        if ctx.output_is_structured() {
            ctx.output.document(&reports);
        } else {
            for report in &reports {
                if report.valid {
                    println!(
                        "valid: {} (gallery {}, image {}, version {})",
                        report.id,
                        report.gallery.as_deref().unwrap_or_default(),
                        report.image.as_deref().unwrap_or_default(),
                        report.version.as_deref().unwrap_or_default()
                    );
                } else {
                    ctx.output.error(&format!(
                        "invalid: {}: {}",
                        report.id,
                        report.errors.join("; ")
                    ));
                }
            }
        }

        Ok(if invalid == 0 { 0 } else { 4 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.Compute/galleries/gallery1/images/image1/versions/1.0.0";

    #[test]
    fn test_report_for_valid_id() {
        let report = IdReport::check(VALID);
        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert_eq!(report.gallery.as_deref(), Some("gallery1"));
        assert_eq!(report.version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_report_for_invalid_id() {
        let report = IdReport::check("/subscriptions/x/resourceGroups/rg");
        assert!(!report.valid);
        assert!(!report.errors.is_empty());
        assert!(report.gallery.is_none());
    }
}
