//! Property-based tests for resource ID parsing and attribute validators.
//!
//! Validators run on untrusted configuration, so beyond the fixed cases the
//! properties here check that arbitrary input is reported, never panics.

use proptest::prelude::*;
use serde_json::{json, Value};

use rustible_vmss::modules::cloud::azure::parse::{
    SharedGalleryImageVersionId, VirtualMachineScaleSetId,
};
use rustible_vmss::modules::cloud::azure::validate::{
    orchestrated_sku, parse_iso8601_duration, resource_group_name,
    shared_gallery_image_version_id, spot_max_price, virtual_machine_scale_set_id,
};

const VERSION_ID: &str = "/subscriptions/12345678-1234-9876-4563-123456789012/resourceGroups/group1/providers/Microsoft.Compute/galleries/gallery1/images/image1/versions/1.0.0";

// ============================================================================
// Strategies
// ============================================================================

/// A single path segment as ARM would accept it
fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9._-]{0,30}"
}

fn version() -> impl Strategy<Value = String> {
    (0u32..100, 0u32..100, 0u32..1000).prop_map(|(a, b, c)| format!("{}.{}.{}", a, b, c))
}

// ============================================================================
// Shared Image Gallery image version IDs
// ============================================================================

#[test]
fn test_valid_image_version_id() {
    let diags = shared_gallery_image_version_id(&json!(VERSION_ID), "id");
    assert!(diags.is_ok(), "unexpected errors: {:?}", diags.errors);
    assert!(diags.warnings.is_empty());
}

#[test]
fn test_image_version_id_rejections() {
    let cases = [
        // Not a string
        json!(42),
        json!(null),
        // Image definition rather than version
        json!("/subscriptions/sub/resourceGroups/group1/providers/Microsoft.Compute/galleries/gallery1/images/image1"),
        // No resource group
        json!("/subscriptions/sub/providers/Microsoft.Compute/galleries/g/images/i/versions/1"),
        // Relative
        json!("subscriptions/sub/resourceGroups/group1"),
        // Trailing segments
        json!(format!("{}/extra/value", VERSION_ID)),
        json!(""),
    ];

    for case in cases {
        let diags = shared_gallery_image_version_id(&case, "source_image_id");
        assert!(diags.has_errors(), "expected {} to be rejected", case);
    }
}

#[test]
fn test_non_string_error_names_key() {
    let diags = shared_gallery_image_version_id(&json!(true), "source_image_id");
    assert_eq!(diags.errors, vec!["expected \"source_image_id\" to be a string"]);
}

#[test]
fn test_scale_set_id_validator() {
    let id = VirtualMachineScaleSetId::new("sub", "rg", "vmss1").id();
    assert!(virtual_machine_scale_set_id(&json!(id), "id").is_ok());
    assert!(virtual_machine_scale_set_id(&json!(VERSION_ID), "id").has_errors());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Property: well-formed version IDs are accepted and parse back to their parts
    #[test]
    fn generated_version_ids_parse(
        sub in segment(),
        rg in segment(),
        gallery in segment(),
        image in segment(),
        version in version(),
    ) {
        let id = SharedGalleryImageVersionId::new(&sub, &rg, &gallery, &image, &version);
        let rendered = id.to_string();

        prop_assert!(shared_gallery_image_version_id(&Value::String(rendered.clone()), "id").is_ok());

        let parsed = SharedGalleryImageVersionId::parse(&rendered).unwrap();
        prop_assert_eq!(parsed, id);
    }

    /// Property: the validator never panics on arbitrary strings
    #[test]
    fn arbitrary_strings_never_panic(input in "\\PC{0,200}") {
        let _ = shared_gallery_image_version_id(&Value::String(input.clone()), "id");
        let _ = virtual_machine_scale_set_id(&Value::String(input), "id");
    }

    /// Property: path-shaped junk is either a valid ID or reported as an error
    #[test]
    fn path_shaped_input_is_classified(parts in prop::collection::vec("[a-zA-Z]{0,8}", 0..14)) {
        let input = format!("/{}", parts.join("/"));
        let diags = shared_gallery_image_version_id(&Value::String(input.clone()), "id");
        prop_assert_eq!(diags.is_ok(), SharedGalleryImageVersionId::parse(&input).is_ok());
    }
}

// ============================================================================
// Other validators
// ============================================================================

#[test]
fn test_orchestrated_sku() {
    assert!(orchestrated_sku(&json!("Standard_D2s_v3_2"), "sku_name").is_ok());
    assert!(orchestrated_sku(&json!("Standard_F2_0"), "sku_name").is_ok());

    assert!(orchestrated_sku(&json!("Standard_F2"), "sku_name").has_errors());
    assert!(orchestrated_sku(&json!("Standard__F2_1"), "sku_name").has_errors());
    assert!(orchestrated_sku(&json!("Standard_F2_two"), "sku_name").has_errors());
}

#[test]
fn test_resource_group_name() {
    assert!(resource_group_name(&json!("acctestRG-vmss_(1).x"), "resource_group_name").is_ok());
    assert!(resource_group_name(&json!(""), "resource_group_name").has_errors());
    assert!(resource_group_name(&json!("trailing."), "resource_group_name").has_errors());
    assert!(resource_group_name(&json!("a".repeat(91)), "resource_group_name").has_errors());
    assert!(resource_group_name(&json!("no/slashes"), "resource_group_name").has_errors());
}

#[test]
fn test_spot_max_price() {
    assert!(spot_max_price(&json!(-1.0), "max_bid_price").is_ok());
    assert!(spot_max_price(&json!(0.5), "max_bid_price").is_ok());
    assert!(spot_max_price(&json!(0.0), "max_bid_price").has_errors());
    assert!(spot_max_price(&json!(-0.5), "max_bid_price").has_errors());
    assert!(spot_max_price(&json!("cheap"), "max_bid_price").has_errors());
}

#[test]
fn test_iso8601_durations() {
    assert_eq!(parse_iso8601_duration("PT1H30M").unwrap().as_secs(), 5400);
    assert_eq!(parse_iso8601_duration("PT15M").unwrap().as_secs(), 900);
    assert_eq!(parse_iso8601_duration("P1D").unwrap().as_secs(), 86_400);

    assert!(parse_iso8601_duration("P").is_err());
    assert!(parse_iso8601_duration("PT").is_err());
    assert!(parse_iso8601_duration("90m").is_err());
    assert!(parse_iso8601_duration("P99999999999999999999999Y").is_err());
}

proptest! {
    /// Property: parsing arbitrary duration-like strings never panics
    #[test]
    fn duration_parsing_never_panics(input in "P(T?[0-9]{0,25}[YMWDHS]){0,4}") {
        let _ = parse_iso8601_duration(&input);
    }

    /// Property: minute durations convert exactly
    #[test]
    fn minutes_round_trip(minutes in 0u64..10_000) {
        let parsed = parse_iso8601_duration(&format!("PT{}M", minutes)).unwrap();
        prop_assert_eq!(parsed.as_secs(), minutes * 60);
    }
}
