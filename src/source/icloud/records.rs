//! CloudKit request bodies and record decoding for the photo library.

use std::collections::{BTreeMap, HashMap};

use base64::Engine;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::source::SourceItem;

/// Record type that lists every non-hidden, non-deleted asset by date.
pub(crate) const ALL_PHOTOS_LIST_TYPE: &str = "CPLAssetAndMasterByAssetDateWithoutHiddenOrDeleted";

/// Fields needed to build a [`SourceItem`].
const DESIRED_KEYS: &[&str] = &[
    "recordName",
    "recordType",
    "masterRef",
    "assetDate",
    "addedDate",
    "filenameEnc",
    "resOriginalRes",
    "resOriginalFileType",
    "itemType",
];

/// Response from `/records/query`.
#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub records: Vec<Record>,
}

/// A CloudKit record. Fields stay dynamic since Apple's schema varies by
/// record type.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Record {
    #[serde(default)]
    pub record_name: String,
    #[serde(default)]
    pub record_type: String,
    #[serde(default)]
    pub fields: Value,
}

/// Query-string encode the service parameters. Sorted so URLs are stable.
pub(crate) fn encode_params(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub(crate) fn primary_zone() -> Value {
    json!({"zoneName": "PrimarySync"})
}

pub(crate) fn indexing_state_query(zone_id: &Value) -> Value {
    json!({
        "query": {"recordType": "CheckIndexingState"},
        "zoneID": zone_id,
    })
}

/// Body for one page of the all-photos listing starting at `offset`.
pub(crate) fn list_query(offset: u64, page_size: u64, zone_id: &Value) -> Value {
    json!({
        "query": {
            "filterBy": [
                {
                    "fieldName": "startRank",
                    "fieldValue": {"type": "INT64", "value": offset},
                    "comparator": "EQUALS",
                },
                {
                    "fieldName": "direction",
                    "fieldValue": {"type": "STRING", "value": "ASCENDING"},
                    "comparator": "EQUALS",
                },
            ],
            "recordType": ALL_PHOTOS_LIST_TYPE,
        },
        // Each asset comes back as a CPLAsset + CPLMaster pair
        "resultsLimit": page_size * 2,
        "desiredKeys": DESIRED_KEYS,
        "zoneID": zone_id,
    })
}

/// Body for `/records/lookup` of a single master record.
pub(crate) fn lookup_query(record_name: &str, zone_id: &Value) -> Value {
    json!({
        "records": [{"recordName": record_name}],
        "desiredKeys": DESIRED_KEYS,
        "zoneID": zone_id,
    })
}

/// The original-resolution download URL of master `record_name`, as
/// returned by a lookup. `None` when Apple no longer has the record.
pub(crate) fn original_download_url(
    response: &QueryResponse,
    record_name: &str,
) -> Option<String> {
    response
        .records
        .iter()
        .find(|r| r.record_name == record_name)
        .and_then(|r| original_resource(&r.fields)["downloadURL"].as_str())
        .map(str::to_string)
}

fn original_resource(fields: &Value) -> &Value {
    &fields["resOriginalRes"]["value"]
}

/// The indexing state reported by a `CheckIndexingState` query.
pub(crate) fn indexing_state(response: &QueryResponse) -> &str {
    response
        .records
        .first()
        .and_then(|r| r.fields["state"]["value"].as_str())
        .unwrap_or("")
}

/// Decode `filenameEnc`, which is either a plain string or base64 bytes.
fn decode_filename(fields: &Value) -> Option<String> {
    let enc = &fields["filenameEnc"];
    let value = enc["value"].as_str()?;
    match enc["type"].as_str().unwrap_or("STRING") {
        "STRING" => Some(value.to_string()),
        "ENCRYPTED_BYTES" => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(value)
                .ok()?;
            String::from_utf8(decoded).ok()
        }
        other => {
            tracing::warn!("Unsupported filenameEnc type: {}", other);
            None
        }
    }
}

fn to_source_item(master: &Record, asset: &Record) -> SourceItem {
    let mut item = SourceItem::new(master.record_name.clone());
    if let Some(name) = decode_filename(&master.fields) {
        item = item.with_filename(name);
    }
    if let Some(created) = asset.fields["assetDate"]["value"]
        .as_f64()
        .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single())
    {
        item = item.with_created(created);
    }
    let original = original_resource(&master.fields);
    if let Some(url) = original["downloadURL"].as_str() {
        item = item.with_locator(url);
    }
    item.size = original["size"].as_u64();
    item
}

/// Pair each CPLMaster with the CPLAsset that references it.
///
/// Returns the items in page order plus the number of masters seen, which
/// advances the paging offset whether or not a master had its asset.
pub(crate) fn pair_records(records: Vec<Record>) -> (Vec<SourceItem>, u64) {
    let mut assets_by_master: HashMap<String, Record> = HashMap::new();
    let mut masters: Vec<Record> = Vec::new();

    for rec in records {
        match rec.record_type.as_str() {
            "CPLAsset" => {
                let master_id = rec.fields["masterRef"]["value"]["recordName"]
                    .as_str()
                    .map(str::to_string);
                if let Some(master_id) = master_id {
                    assets_by_master.insert(master_id, rec);
                }
            }
            "CPLMaster" => masters.push(rec),
            _ => {}
        }
    }

    let seen = masters.len() as u64;
    let items = masters
        .iter()
        .filter_map(|master| {
            let asset = assets_by_master.get(&master.record_name);
            if asset.is_none() {
                tracing::debug!("Master {} has no asset record, skipping", master.record_name);
            }
            asset.map(|a| to_source_item(master, a))
        })
        .collect();
    (items, seen)
}
