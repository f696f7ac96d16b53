//! Canonical content hashing used as the deduplication key

use sha2::{Digest, Sha256};

use super::ContentType;

/// SHA-256 hex digest of raw bytes
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash of a text-like payload (Text, URL, Color, JSON)
pub fn text_hash(content: &str) -> String {
    digest(content.as_bytes())
}

/// Hash of a normalized image byte stream; empty when there is no image
pub fn image_hash(png: &[u8]) -> String {
    if png.is_empty() {
        return String::new();
    }
    digest(png)
}

/// Hash of a JSON path list, independent of the order the OS reported it in
///
/// The list is sorted and re-serialized before hashing. Input that does not
/// parse as a JSON string array is hashed verbatim.
pub fn file_list_hash(paths_json: &str) -> String {
    if paths_json.is_empty() {
        return String::new();
    }

    let mut paths: Vec<String> = match serde_json::from_str(paths_json) {
        Ok(paths) => paths,
        Err(_) => return digest(paths_json.as_bytes()),
    };
    paths.sort();

    match serde_json::to_string(&paths) {
        Ok(canonical) => digest(canonical.as_bytes()),
        Err(_) => digest(paths_json.as_bytes()),
    }
}

/// Hash a stored payload according to its content type
pub fn content_hash(
    content_type: ContentType,
    content: &str,
    image_data: Option<&[u8]>,
    file_paths: Option<&str>,
) -> String {
    match content_type {
        ContentType::Image => image_hash(image_data.unwrap_or_default()),
        ContentType::File => file_list_hash(file_paths.unwrap_or_default()),
        ContentType::Text | ContentType::Url | ContentType::Color | ContentType::Json => {
            text_hash(content)
        }
    }
}
