//! JSON Schema Generation
//!
//! Generates JSON Schema for pasteclean configuration files.
//! Based on draft-07 of the JSON Schema specification.

use serde_json::json;
use serde_json::Value;

use crate::filter::whitelist::DEFAULT_ALLOWED_TAGS;
use crate::media::fetch::{
    DEFAULT_CHUNK_SIZE, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_MAX_SIZE, DEFAULT_RETRIES,
    MAX_CHUNK_SIZE, MAX_FETCH_TIMEOUT_MS, MAX_RETRIES, MIN_CHUNK_SIZE,
};
use crate::media::DEFAULT_JPEG_QUALITY;

/// Generate the complete JSON schema for pasteclean configuration
pub fn generate_config_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "pasteclean Configuration",
        "description": "Configuration schema for the pasteclean markup sanitizer",
        "type": "object",
        "properties": {
            "media": generate_media_schema(),
            "whitelist": generate_whitelist_schema(),
            "logging": generate_logging_schema(),
        },
        "additionalProperties": false
    })
}

fn name_list(description: &str) -> Value {
    json!({
        "type": "array",
        "description": description,
        "items": { "type": "string", "pattern": "^[a-z][a-z0-9-]*$" },
        "default": []
    })
}

fn generate_media_schema() -> Value {
    json!({
        "type": "object",
        "description": "Image localization",
        "properties": {
            "enabled": {
                "type": "boolean",
                "description": "Localize referenced images",
                "default": true
            },
            "format": {
                "type": "string",
                "enum": ["png", "jpeg"],
                "description": "Encoding of stored images",
                "default": "jpeg"
            },
            "jpegQuality": {
                "type": "integer",
                "minimum": 1,
                "maximum": 100,
                "default": DEFAULT_JPEG_QUALITY
            },
            "chunkSize": {
                "type": "integer",
                "description": "Download chunk size in bytes",
                "minimum": MIN_CHUNK_SIZE,
                "maximum": MAX_CHUNK_SIZE,
                "default": DEFAULT_CHUNK_SIZE
            },
            "allowLocalFiles": {
                "type": "boolean",
                "description": "Read images referenced by local path or file URL",
                "default": true
            },
            "fetchTimeoutMs": {
                "type": "integer",
                "minimum": 1,
                "maximum": MAX_FETCH_TIMEOUT_MS,
                "default": DEFAULT_FETCH_TIMEOUT_MS
            },
            "fetchRetries": {
                "type": "integer",
                "minimum": 0,
                "maximum": MAX_RETRIES,
                "default": DEFAULT_RETRIES
            },
            "maxDownloadBytes": {
                "type": "integer",
                "minimum": 1,
                "default": DEFAULT_MAX_SIZE
            },
            "storeInlineData": {
                "type": "boolean",
                "description": "Decode and store data: URIs instead of keeping them inline",
                "default": false
            },
            "mediaDir": {
                "type": "string",
                "description": "Directory stored images are written to"
            }
        },
        "additionalProperties": false
    })
}

fn generate_whitelist_schema() -> Value {
    json!({
        "type": "object",
        "description": format!(
            "Extensions to the stock vocabulary ({} tags)",
            DEFAULT_ALLOWED_TAGS.len()
        ),
        "properties": {
            "extraTags": name_list("Additional allowed tags"),
            "removeTags": name_list("Stock tags to disallow"),
            "extraIgnoredTags": name_list("Tags unwrapped to their content"),
            "extraAttributes": name_list("Additional allowed attributes"),
            "extraStyles": name_list("Additional allowed CSS properties"),
            "styleOverrides": {
                "type": "object",
                "description": "Tag name to CSS declarations forced onto that tag",
                "additionalProperties": { "type": "string" }
            },
            "removeStyleOverrides": name_list("Tags whose stock overrides are dropped")
        },
        "additionalProperties": false
    })
}

fn generate_logging_schema() -> Value {
    json!({
        "type": "object",
        "description": "Logging configuration",
        "properties": {
            "level": {
                "type": "string",
                "description": "Level or filter directive",
                "default": "info"
            },
            "format": {
                "type": "string",
                "enum": ["text", "json"],
                "default": "text"
            }
        },
        "additionalProperties": false
    })
}
