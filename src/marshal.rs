//! Data marshaling across the host/guest boundary.
//!
//! Host data crosses into guest scripts through a full serialize /
//! deserialize round trip (`serde` → `serde_json::Value` → `rhai::Dynamic`)
//! so guests only ever see plain arrays and maps: no live host references,
//! no callable host methods beyond the capability. Guest return values come
//! back out field-by-field by name; the only host value type extracted is
//! the string. A missing or mistyped field is a marshaling error, which is
//! deliberately distinct from a guest execution error.

use rhai::{Array, Dynamic, Map};
use serde::Serialize;

use crate::error::{HostError, Result};

/// Convert host data into a guest-visible value.
pub fn to_guest<T: Serialize>(value: &T) -> Result<Dynamic> {
    let json = serde_json::to_value(value)
        .map_err(|e| HostError::Marshaling(format!("failed to serialize host data: {e}")))?;
    rhai::serde::to_dynamic(&json)
        .map_err(|e| HostError::Marshaling(format!("failed to convert host data: {e}")))
}

/// A detected installation of an extension. Derived per call, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Installation {
    pub extension_id: String,
    pub name: String,
    pub version: String,
}

/// An instance created by an extension, e.g. a virtual schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
}

/// Versions reported by a module's upgrade entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeResult {
    pub previous_version: String,
    pub new_version: String,
}

pub(crate) fn expect_map(value: Dynamic, what: &str) -> Result<Map> {
    value
        .try_cast::<Map>()
        .ok_or_else(|| HostError::Marshaling(format!("{what}: expected an object")))
}

pub(crate) fn expect_array(value: Dynamic, what: &str) -> Result<Array> {
    value
        .try_cast::<Array>()
        .ok_or_else(|| HostError::Marshaling(format!("{what}: expected an array")))
}

pub(crate) fn string_field(map: &Map, what: &str, field: &str) -> Result<String> {
    let value = map
        .get(field)
        .ok_or_else(|| HostError::Marshaling(format!("{what}: missing field {field:?}")))?;
    value
        .clone()
        .into_string()
        .map_err(|actual| {
            HostError::Marshaling(format!(
                "{what}: field {field:?} must be a string, found {actual}"
            ))
        })
}

pub(crate) fn installations_from(value: Dynamic, extension_id: &str) -> Result<Vec<Installation>> {
    let what = "find_installations result";
    let mut installations = Vec::new();
    for entry in expect_array(value, what)? {
        let map = expect_map(entry, what)?;
        installations.push(Installation {
            extension_id: extension_id.to_owned(),
            name: string_field(&map, what, "name")?,
            version: string_field(&map, what, "version")?,
        });
    }
    Ok(installations)
}

pub(crate) fn instance_from(value: Dynamic) -> Result<Instance> {
    let what = "create_instance result";
    let map = expect_map(value, what)?;
    Ok(Instance {
        id: string_field(&map, what, "id")?,
        name: string_field(&map, what, "name")?,
    })
}

pub(crate) fn instances_from(value: Dynamic) -> Result<Vec<Instance>> {
    let what = "list_instances result";
    let mut instances = Vec::new();
    for entry in expect_array(value, what)? {
        let map = expect_map(entry, what)?;
        instances.push(Instance {
            id: string_field(&map, what, "id")?,
            name: string_field(&map, what, "name")?,
        });
    }
    Ok(instances)
}

pub(crate) fn upgrade_result_from(value: Dynamic) -> Result<UpgradeResult> {
    let what = "upgrade result";
    let map = expect_map(value, what)?;
    Ok(UpgradeResult {
        previous_version: string_field(&map, what, "previous_version")?,
        new_version: string_field(&map, what, "new_version")?,
    })
}
