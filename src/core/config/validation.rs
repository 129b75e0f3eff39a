use serde_json::{Map, Value};
use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(document) = expect_optional_object(root, "document")? {
        validate_optional_string_field(document, "document.path", "path")?;
        validate_optional_string_field(document, "document.title", "title")?;
    }

    if let Some(index) = expect_optional_object(root, "index")? {
        validate_optional_string_field(index, "index.path", "path")?;
    }

    if let Some(chunking) = expect_optional_object(root, "chunking")? {
        validate_u64_field(chunking, "chunking.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(
            chunking,
            "chunking.chunk_overlap",
            "chunk_overlap",
            0,
            999_999,
        )?;

        let size = chunking
            .get("chunk_size")
            .and_then(Value::as_u64)
            .unwrap_or(super::defaults::DEFAULT_CHUNK_SIZE as u64);
        let overlap = chunking
            .get("chunk_overlap")
            .and_then(Value::as_u64)
            .unwrap_or(super::defaults::DEFAULT_CHUNK_OVERLAP as u64);
        if overlap >= size {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at 'chunking.chunk_overlap': must be smaller than chunk_size ({})",
                size
            )));
        }
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 100)?;
        validate_u64_field(retrieval, "retrieval.sources_k", "sources_k", 1, 100)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_provider_section(embedding, "embedding")?;
        validate_u64_field(embedding, "embedding.batch_size", "batch_size", 1, 1_000)?;
    }

    if let Some(generation) = expect_optional_object(root, "generation")? {
        validate_provider_section(generation, "generation")?;
        validate_f64_field(generation, "generation.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(
            generation,
            "generation.max_output_tokens",
            "max_output_tokens",
            1,
            1_000_000,
        )?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    Ok(())
}

fn validate_provider_section(section: &Map<String, Value>, name: &str) -> Result<(), ApiError> {
    if let Some(provider) = section.get("provider") {
        let path = format!("{}.provider", name);
        let Some(kind) = provider.as_str() else {
            return Err(config_type_error(&path, "string"));
        };
        if !matches!(kind, "gemini" | "openai" | "openai_compatible") {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}': unknown provider '{}'",
                path, kind
            )));
        }
    }
    validate_optional_string_field(section, &format!("{}.model", name), "model")?;
    validate_optional_string_field(section, &format!("{}.base_url", name), "base_url")?;
    validate_optional_string_field(section, &format!("{}.api_key", name), "api_key")?;
    validate_u64_field(
        section,
        &format!("{}.timeout_secs", name),
        "timeout_secs",
        1,
        86_400,
    )
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() {
        return Ok(());
    }
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_and_typical_configs() {
        assert!(validate_config(&json!({})).is_ok());
        assert!(validate_config(&json!({
            "chunking": { "chunk_size": 500, "chunk_overlap": 50 },
            "retrieval": { "top_k": 5 },
            "generation": { "provider": "gemini", "temperature": 0.3 },
            "server": { "port": 5000, "cors_allowed_origins": ["http://localhost:5000"] }
        }))
        .is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let err = validate_config(&json!({
            "chunking": { "chunk_size": 200, "chunk_overlap": 200 }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));

        // Overlap alone is checked against the default size.
        assert!(validate_config(&json!({ "chunking": { "chunk_overlap": 1000 } })).is_err());
    }

    #[test]
    fn rejects_out_of_range_and_mistyped_values() {
        assert!(validate_config(&json!({ "retrieval": { "top_k": 0 } })).is_err());
        assert!(validate_config(&json!({ "generation": { "temperature": 3.5 } })).is_err());
        assert!(validate_config(&json!({ "generation": { "provider": "bard" } })).is_err());
        assert!(validate_config(&json!({ "server": { "cors_allowed_origins": "*" } })).is_err());
        assert!(validate_config(&json!({ "index": [] })).is_err());
    }
}
