// serialctl - interactive serial number lookup against the ConfigMgr AdminService
// Copyright (C) 2025
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::client::{AdminClient, QueryError, Row};
use serde_json::Value;
use thiserror::Error;

/// Shown in place of a serial when the device has no hardware-inventory
/// BIOS record or the record carries no serial.
pub const SERIAL_FALLBACK: &str = "N/A (Not in Hardware Inventory)";

// Relationship field names vary across service versions and join paths;
// first present alias wins, independently per attribute.
const NAME_ALIASES: &[&str] = &[
    "ResourceName",
    "MachineName",
    "MachineResourceName",
    "ComputerName",
    "Name",
];
const ID_ALIASES: &[&str] = &[
    "ResourceId",
    "ResourceID",
    "MachineResourceId",
    "MachineResourceID",
];
const PRIMARY_ALIASES: &[&str] = &["IsPrimary", "isPrimary"];

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("search text must not be empty")]
    Validation,
    #[error(transparent)]
    Query(#[from] QueryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub name: String,
    pub resource_id: Option<i64>,
}

impl DeviceCandidate {
    pub fn label(&self) -> String {
        match self.resource_id {
            Some(id) => format!("{} (ResourceId {id})", self.name),
            None => self.name.clone(),
        }
    }
}

/// OData string-literal escaping: embedded single quotes are doubled before
/// interpolation into a filter expression. Applied exactly once, to raw user
/// input, never by the query client itself.
pub fn escape_literal(text: &str) -> String {
    text.replace('\'', "''")
}

/// Search discovered devices by hostname fragment. Zero matches is an empty
/// list, not an error.
pub fn find_by_hostname(
    client: &AdminClient,
    fragment: &str,
) -> Result<Vec<DeviceCandidate>, LookupError> {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return Err(LookupError::Validation);
    }

    let filter = format!("contains(Name,'{}')", escape_literal(fragment));
    let rows = client.query("SMS_R_System", Some(&filter), Some(&["Name", "ResourceId"]))?;

    let mut candidates: Vec<DeviceCandidate> = rows
        .iter()
        .filter_map(|row| {
            let name = row.get("Name").and_then(string_value)?;
            Some(DeviceCandidate {
                name,
                resource_id: row.get("ResourceId").and_then(id_value),
            })
        })
        .collect();
    dedupe_and_sort(&mut candidates);
    Ok(candidates)
}

/// Search devices by primary-user identifier via the user-to-machine
/// relationship class. No field projection: relationship field names vary,
/// so rows come back whole and are normalized through the alias lists.
pub fn find_by_username(
    client: &AdminClient,
    username: &str,
) -> Result<Vec<DeviceCandidate>, LookupError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(LookupError::Validation);
    }

    let filter = format!("contains(UniqueUserName,'{}')", escape_literal(username));
    let rows = client.query("SMS_UserMachineRelationship", Some(&filter), None)?;

    // Filter to primary relationships only when the flag exists in the row
    // shape at all; an empty primary set falls back to every relationship so
    // a user without a designated primary device still gets candidates.
    let flag_present = rows
        .iter()
        .any(|row| first_present(row, PRIMARY_ALIASES).is_some());
    let eligible: Vec<&Row> = if flag_present {
        let primary: Vec<&Row> = rows.iter().filter(|row| is_primary(row)).collect();
        if primary.is_empty() {
            rows.iter().collect()
        } else {
            primary
        }
    } else {
        rows.iter().collect()
    };

    let mut candidates: Vec<DeviceCandidate> = eligible
        .into_iter()
        .filter_map(candidate_from_relationship)
        .collect();
    dedupe_and_sort(&mut candidates);
    Ok(candidates)
}

/// Look up the BIOS serial for a device. The BIOS table joins by resource id
/// and a device has at most one record; if duplicates exist the first row is
/// authoritative. Absence maps to the sentinel, never to an error or null.
pub fn resolve_serial(
    client: &AdminClient,
    resource_id: Option<i64>,
) -> Result<String, LookupError> {
    let Some(id) = resource_id else {
        return Ok(SERIAL_FALLBACK.to_string());
    };

    let filter = format!("ResourceId eq {id}");
    let rows = client.query(
        "SMS_G_System_PC_BIOS",
        Some(&filter),
        Some(&["SerialNumber"]),
    )?;

    let serial = rows
        .first()
        .and_then(|row| row.get("SerialNumber"))
        .and_then(string_value);
    Ok(serial.unwrap_or_else(|| SERIAL_FALLBACK.to_string()))
}

/// A relationship resolving neither a name nor a resource id is dropped.
fn candidate_from_relationship(row: &Row) -> Option<DeviceCandidate> {
    let name = first_present(row, NAME_ALIASES).and_then(string_value);
    let resource_id = first_present(row, ID_ALIASES).and_then(id_value);
    if name.is_none() && resource_id.is_none() {
        return None;
    }
    Some(DeviceCandidate {
        name: name.unwrap_or_default(),
        resource_id,
    })
}

fn first_present<'a>(row: &'a Row, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|key| row.get(*key))
        .filter(|value| !value.is_null())
}

fn is_primary(row: &Row) -> bool {
    match first_present(row, PRIMARY_ALIASES) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true") || s == "1",
        _ => false,
    }
}

fn string_value(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn id_value(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Menu ordering must be stable across runs: ascending by
/// (resource id, name), candidates without a resource id first, then
/// collapse identical (resource id, name) pairs.
fn dedupe_and_sort(candidates: &mut Vec<DeviceCandidate>) {
    candidates.sort_by(|a, b| {
        (a.resource_id, &a.name).cmp(&(b.resource_id, &b.name))
    });
    candidates.dedup_by(|a, b| a.resource_id == b.resource_id && a.name == b.name);
}
