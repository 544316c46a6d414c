//! JSON Schema documents for each dataset, embedded so the archive is
//! self-describing without a separate schema repository.

use serde_json::{json, Value};

pub fn pages_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "pages.v1",
        "type": "object",
        "required": ["page_id", "url", "normalized_url", "depth", "captured_at"],
        "properties": {
            "page_id": {"type": "string"},
            "url": {"type": "string"},
            "normalized_url": {"type": "string"},
            "final_url": {"type": "string"},
            "status_code": {"type": ["integer", "null"]},
            "depth": {"type": "integer", "minimum": 0},
            "captured_at": {"type": "string"}
        }
    })
}

pub fn edges_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "edges.v1",
        "type": "object",
        "required": ["source_page_id", "target_url", "sequence"],
        "properties": {
            "source_page_id": {"type": "string"},
            "target_url": {"type": "string"},
            "internal": {"type": "boolean"},
            "sequence": {"type": "integer", "minimum": 0}
        }
    })
}

pub fn assets_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "assets.v1",
        "type": "object",
        "required": ["page_id", "asset_url", "asset_type"],
        "properties": {
            "page_id": {"type": "string"},
            "asset_url": {"type": "string"},
            "asset_type": {"type": "string"}
        }
    })
}

pub fn errors_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "errors.v1",
        "type": "object",
        "required": ["url", "timestamp", "phase", "kind", "message"],
        "properties": {
            "url": {"type": "string"},
            "timestamp": {"type": "string"},
            "phase": {"type": "string"},
            "kind": {"type": "string"},
            "message": {"type": "string"},
            "retry_count": {"type": "integer", "minimum": 0}
        }
    })
}

pub fn events_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "events.v1",
        "type": "object",
        "required": ["timestamp", "event_code", "crawl_id", "sequence"],
        "properties": {
            "timestamp": {"type": "string"},
            "level": {"type": "string"},
            "event_code": {"type": "string"},
            "crawl_id": {"type": "string"},
            "sequence": {"type": "integer", "minimum": 0}
        }
    })
}
