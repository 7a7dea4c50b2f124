//! Layer metadata handling: merging the `config` subtree across a layer
//! chain and rewriting the result for a squashed image.

use crate::error::{Result, SquashError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Fields that link a layer to its parent; a squashed image has none.
pub const PARENT_LINK_FIELDS: &[&str] = &["parent", "parent_id", "layer_id"];

/// Fields every layer metadata document must carry.
pub const REQUIRED_FIELDS: &[&str] = &["id", "created"];

/// Parse a layer's raw `json` record into a metadata document.
pub fn parse_metadata(data: &[u8], layer_id: &str) -> Result<Value> {
    serde_json::from_slice(data).map_err(|e| {
        SquashError::Format(format!("failed to parse JSON metadata of layer {}: {}", layer_id, e))
    })
}

/// Merge the `config` field of two metadata documents.
///
/// The result is `new` with its `config` replaced by the merge of
/// `old.config` (destination) and `new.config` (source). Every other
/// top-level field comes from `new`.
pub fn merge(old: Value, new: Value) -> Result<Value> {
    let mut old = into_object(old, "old")?;
    let mut new = into_object(new, "new")?;

    let mut config = take_config(&mut old, "old")?;
    let source = take_config(&mut new, "new")?;

    merge_objects(&mut config, source, "")?;

    new.insert("config".to_string(), Value::Object(config));
    Ok(Value::Object(new))
}

fn into_object(doc: Value, side: &str) -> Result<Map<String, Value>> {
    match doc {
        Value::Object(map) => Ok(map),
        _ => Err(SquashError::Format(format!("{} JSON metadata is not an object", side))),
    }
}

fn take_config(doc: &mut Map<String, Value>, side: &str) -> Result<Map<String, Value>> {
    match doc.remove("config") {
        Some(Value::Object(config)) => Ok(config),
        _ => Err(SquashError::Format(format!("no 'config' field in {} JSON metadata", side))),
    }
}

fn merge_objects(dest: &mut Map<String, Value>, mut source: Map<String, Value>, prefix: &str) -> Result<()> {
    for (field, dest_value) in dest.iter_mut() {
        let Some(source_value) = source.remove(field) else {
            continue;
        };

        if dest_value.is_null() {
            *dest_value = source_value;
            continue;
        }

        match source_value {
            Value::Object(source_map) => match dest_value {
                Value::Object(dest_map) => {
                    merge_objects(dest_map, source_map, &field_path(prefix, field))?;
                }
                _ => {
                    return Err(SquashError::MergeConflict {
                        field: field_path(prefix, field),
                    });
                }
            },
            Value::Null => {}
            _ if dest_value.is_object() => {
                return Err(SquashError::MergeConflict {
                    field: field_path(prefix, field),
                });
            }
            other => *dest_value = other,
        }
    }

    // Whatever is left in source was absent from dest.
    dest.extend(source);
    Ok(())
}

fn field_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

/// Rewrite merged metadata for a freshly minted squashed image.
pub fn rewrite_metadata(metadata: Value, id: &str, size: u64, created: DateTime<Utc>) -> Result<Vec<u8>> {
    let mut meta = into_object(metadata, "merged")?;

    for field in REQUIRED_FIELDS {
        if !meta.contains_key(*field) {
            return Err(SquashError::Format(format!(
                "json metadata does not have a '{}' field",
                field
            )));
        }
    }

    meta.insert("Size".to_string(), Value::from(size));
    meta.insert("id".to_string(), Value::from(id));
    meta.insert("created".to_string(), Value::from(format_timestamp(created)));

    for field in PARENT_LINK_FIELDS {
        meta.remove(*field);
    }

    serde_json::to_vec(&Value::Object(meta))
        .map_err(|e| SquashError::Format(format!("failed to encode JSON metadata: {}", e)))
}

/// RFC 3339 timestamp as Docker writes it into layer metadata.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
