//! OS disk, data disks and the source image.

use serde_json::{json, Map, Value};

use super::super::models::{
    DataDisk, DiffDiskSettings, ImageReference, ManagedDiskParameters, OperatingSystemType,
    OsDisk, SubResource, UpdateOsDisk,
};
use super::super::schema::{first_block, BlockExt};
use super::{VmssError, VmssResult};

fn managed_disk(block: &Map<String, Value>) -> ManagedDiskParameters {
    let disk_encryption_set = Some(block.get_str("disk_encryption_set_id"))
        .filter(|id| !id.is_empty())
        .map(SubResource::new);

    ManagedDiskParameters {
        storage_account_type: Some(block.get_str("storage_account_type")),
        disk_encryption_set,
    }
}

fn disk_size(block: &Map<String, Value>) -> VmssResult<Option<i32>> {
    match block.get_i64("disk_size_gb") {
        0 => Ok(None),
        size => VmssError::int32("os_disk.disk_size_gb", size).map(Some),
    }
}

/// Expand `os_disk` for a create request; disks are always created from the image
pub fn expand_os_disk(
    os_disk: &[Value],
    os_type: OperatingSystemType,
) -> VmssResult<Option<OsDisk>> {
    let block = match first_block(os_disk) {
        Some(b) => b,
        None => return Ok(None),
    };

    let diff_disk_settings = first_block(&block.get_list("diff_disk_settings")).map(|d| {
        DiffDiskSettings {
            option: Some(d.get_str("option")),
        }
    });

    Ok(Some(OsDisk {
        caching: Some(block.get_str("caching")),
        write_accelerator_enabled: Some(block.get_bool("write_accelerator_enabled")),
        create_option: Some("FromImage".to_string()),
        diff_disk_settings,
        disk_size_gb: disk_size(block)?,
        os_type: Some(os_type),
        managed_disk: Some(managed_disk(block)),
        ..Default::default()
    }))
}

/// Expand `os_disk` for a PATCH request, which only accepts a subset of fields
pub fn expand_os_disk_update(os_disk: &[Value]) -> VmssResult<Option<UpdateOsDisk>> {
    let block = match first_block(os_disk) {
        Some(b) => b,
        None => return Ok(None),
    };

    Ok(Some(UpdateOsDisk {
        caching: Some(block.get_str("caching")),
        write_accelerator_enabled: Some(block.get_bool("write_accelerator_enabled")),
        disk_size_gb: disk_size(block)?,
        managed_disk: Some(managed_disk(block)),
        ..Default::default()
    }))
}

/// Copy every updatable field of an existing OS disk
pub fn os_disk_update_from_existing(existing: &OsDisk) -> UpdateOsDisk {
    UpdateOsDisk {
        caching: existing.caching.clone(),
        write_accelerator_enabled: existing.write_accelerator_enabled,
        disk_size_gb: existing.disk_size_gb,
        image: existing.image.clone(),
        vhd_containers: existing.vhd_containers.clone(),
        managed_disk: existing.managed_disk.clone(),
    }
}

pub fn flatten_os_disk(os_disk: Option<&OsDisk>) -> Vec<Value> {
    let os_disk = match os_disk {
        Some(d) => d,
        None => return Vec::new(),
    };

    let managed = os_disk.managed_disk.as_ref();
    let diff_disk_settings: Vec<Value> = os_disk
        .diff_disk_settings
        .iter()
        .filter_map(|d| d.option.clone())
        .map(|option| json!({ "option": option }))
        .collect();

    vec![json!({
        "caching": os_disk.caching.clone().unwrap_or_default(),
        "diff_disk_settings": diff_disk_settings,
        "disk_encryption_set_id": managed
            .and_then(|m| m.disk_encryption_set.as_ref())
            .and_then(|d| d.id.clone())
            .unwrap_or_default(),
        "disk_size_gb": os_disk.disk_size_gb.unwrap_or(0),
        "storage_account_type": managed
            .and_then(|m| m.storage_account_type.clone())
            .unwrap_or_default(),
        "write_accelerator_enabled": os_disk.write_accelerator_enabled.unwrap_or(false),
    })]
}

/// Expand `data_disk` blocks. Ultra SSD performance settings need
/// `ultra_ssd_enabled`, which orchestrated scale sets do not expose.
pub fn expand_data_disks(data_disks: &[Value], ultra_ssd_enabled: bool) -> VmssResult<Vec<DataDisk>> {
    data_disks
        .iter()
        .filter_map(Value::as_object)
        .map(|block| {
            let iops = block.get_i64("ultra_ssd_disk_iops_read_write");
            let mbps = block.get_i64("ultra_ssd_disk_mbps_read_write");

            if !ultra_ssd_enabled && (iops > 0 || mbps > 0) {
                return Err(VmssError::expand(
                    "data_disk",
                    "`ultra_ssd_disk_iops_read_write` and `ultra_ssd_disk_mbps_read_write` are \
                     not supported on an Orchestrated Virtual Machine Scale Set",
                ));
            }

            Ok(DataDisk {
                lun: Some(VmssError::int32("data_disk.lun", block.get_i64("lun"))?),
                caching: Some(block.get_str("caching")),
                write_accelerator_enabled: Some(block.get_bool("write_accelerator_enabled")),
                create_option: Some(block.get_str("create_option")),
                disk_size_gb: Some(VmssError::int32(
                    "data_disk.disk_size_gb",
                    block.get_i64("disk_size_gb"),
                )?),
                managed_disk: Some(managed_disk(block)),
                disk_iops_read_write: (iops > 0).then_some(iops),
                disk_mbps_read_write: (mbps > 0).then_some(mbps),
                ..Default::default()
            })
        })
        .collect()
}

pub fn flatten_data_disks(data_disks: Option<&Vec<DataDisk>>) -> Vec<Value> {
    data_disks
        .into_iter()
        .flatten()
        .map(|disk| {
            let managed = disk.managed_disk.as_ref();
            json!({
                "caching": disk.caching.clone().unwrap_or_default(),
                "create_option": disk.create_option.clone().unwrap_or_default(),
                "disk_encryption_set_id": managed
                    .and_then(|m| m.disk_encryption_set.as_ref())
                    .and_then(|d| d.id.clone())
                    .unwrap_or_default(),
                "disk_size_gb": disk.disk_size_gb.unwrap_or(0),
                "lun": disk.lun.unwrap_or(0),
                "storage_account_type": managed
                    .and_then(|m| m.storage_account_type.clone())
                    .unwrap_or_default(),
                "ultra_ssd_disk_iops_read_write": disk.disk_iops_read_write.unwrap_or(0),
                "ultra_ssd_disk_mbps_read_write": disk.disk_mbps_read_write.unwrap_or(0),
                "write_accelerator_enabled": disk.write_accelerator_enabled.unwrap_or(false),
            })
        })
        .collect()
}

/// Build the image reference from either `source_image_id` or a
/// `source_image_reference` block
pub fn expand_source_image_reference(
    reference: &[Value],
    image_id: &str,
) -> VmssResult<ImageReference> {
    if !image_id.is_empty() {
        return Ok(ImageReference {
            id: Some(image_id.to_string()),
            ..Default::default()
        });
    }

    let block = first_block(reference).ok_or_else(|| {
        VmssError::InvalidConfig(
            "Either a `source_image_id` or a `source_image_reference` block must be specified!"
                .to_string(),
        )
    })?;

    Ok(ImageReference {
        id: None,
        publisher: Some(block.get_str("publisher")),
        offer: Some(block.get_str("offer")),
        sku: Some(block.get_str("sku")),
        version: Some(block.get_str("version")),
    })
}

/// Images referenced by ID have no publisher and flatten to nothing
pub fn flatten_source_image_reference(reference: Option<&ImageReference>) -> Vec<Value> {
    match reference {
        Some(r) if r.publisher.is_some() => vec![json!({
            "publisher": r.publisher.clone().unwrap_or_default(),
            "offer": r.offer.clone().unwrap_or_default(),
            "sku": r.sku.clone().unwrap_or_default(),
            "version": r.version.clone().unwrap_or_default(),
        })],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expand_os_disk() {
        let disk = expand_os_disk(
            &[json!({
                "caching": "ReadWrite",
                "storage_account_type": "Premium_LRS",
                "diff_disk_settings": [{"option": "Local"}],
            })],
            OperatingSystemType::Linux,
        )
        .unwrap()
        .unwrap();

        assert_eq!(disk.create_option.as_deref(), Some("FromImage"));
        assert_eq!(disk.os_type, Some(OperatingSystemType::Linux));
        assert_eq!(disk.disk_size_gb, None);
        assert_eq!(
            disk.diff_disk_settings.and_then(|d| d.option).as_deref(),
            Some("Local")
        );
        assert!(expand_os_disk(&[], OperatingSystemType::Windows)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_out_of_range_sizes_rejected() {
        let err = expand_data_disks(
            &[json!({
                "caching": "None",
                "disk_size_gb": 10,
                "lun": i64::from(i32::MAX) + 1,
                "storage_account_type": "Standard_LRS",
            })],
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("data_disk.lun"));

        let err = expand_os_disk_update(&[json!({"caching": "None", "disk_size_gb": i64::MAX})])
            .unwrap_err();
        assert!(err.to_string().contains("32-bit"));
    }

    #[test]
    fn test_ultra_ssd_settings_rejected() {
        let err = expand_data_disks(
            &[json!({
                "caching": "None",
                "disk_size_gb": 10,
                "lun": 0,
                "storage_account_type": "UltraSSD_LRS",
                "ultra_ssd_disk_iops_read_write": 100,
            })],
            false,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("expanding `data_disk`"));
    }

    #[test]
    fn test_data_disk_round_trip_fields() {
        let disks = expand_data_disks(
            &[json!({
                "caching": "ReadOnly",
                "create_option": "Empty",
                "disk_size_gb": 64,
                "lun": 3,
                "storage_account_type": "Standard_LRS",
            })],
            false,
        )
        .unwrap();
        assert_eq!(disks[0].lun, Some(3));
        assert_eq!(disks[0].disk_iops_read_write, None);

        let flattened = flatten_data_disks(Some(&disks));
        assert_eq!(flattened[0]["disk_size_gb"], json!(64));
        assert_eq!(flattened[0]["storage_account_type"], json!("Standard_LRS"));
    }

    #[test]
    fn test_source_image() {
        let by_id = expand_source_image_reference(&[], "/images/custom").unwrap();
        assert_eq!(by_id.id.as_deref(), Some("/images/custom"));
        assert!(flatten_source_image_reference(Some(&by_id)).is_empty());

        let err = expand_source_image_reference(&[], "").unwrap_err();
        assert!(err.to_string().contains("Either a `source_image_id`"));

        let reference = expand_source_image_reference(
            &[json!({"publisher": "Canonical", "offer": "UbuntuServer", "sku": "18.04-LTS", "version": "latest"})],
            "",
        )
        .unwrap();
        assert_eq!(
            flatten_source_image_reference(Some(&reference))[0]["offer"],
            json!("UbuntuServer")
        );
    }

    #[test]
    fn test_os_disk_copy_from_existing() {
        let existing = OsDisk {
            caching: Some("ReadWrite".to_string()),
            disk_size_gb: Some(30),
            managed_disk: Some(ManagedDiskParameters {
                storage_account_type: Some("Standard_LRS".to_string()),
                disk_encryption_set: None,
            }),
            ..Default::default()
        };
        let update = os_disk_update_from_existing(&existing);
        assert_eq!(update.disk_size_gb, Some(30));
        assert_eq!(update.caching.as_deref(), Some("ReadWrite"));
    }
}
