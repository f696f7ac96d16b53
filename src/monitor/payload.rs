//! Turning raw clipboard payloads into record material

use std::io::Cursor;
use std::path::Path;

use image::{ImageError, ImageFormat};

use crate::history::FileInfo;

/// Image re-encoded as PNG, plus what is needed to describe it
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Source encoding, e.g. `tiff`
    pub format: String,
}

impl NormalizedImage {
    pub fn description(&self) -> String {
        format!("Image {}x{} ({})", self.width, self.height, self.format)
    }
}

/// Decode any supported encoding and re-encode as PNG
///
/// Identical pixels copied as TIFF by one app and PNG by another hash the same
/// once normalized.
pub fn normalize_image(raw: &[u8]) -> Result<NormalizedImage, ImageError> {
    let format = image::guess_format(raw)?;
    let decoded = image::load_from_memory_with_format(raw, format)?;

    let mut png = Vec::new();
    decoded.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(NormalizedImage {
        png,
        width: decoded.width(),
        height: decoded.height(),
        format: format_name(format),
    })
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "png".to_string(),
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

/// Metadata for one path; missing paths are reported, not rejected
pub fn file_info(path: &str) -> FileInfo {
    let p = Path::new(path);
    let name = p
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    let extension = p
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    match std::fs::metadata(p) {
        Ok(metadata) => {
            let is_dir = metadata.is_dir();
            FileInfo {
                name,
                path: path.to_string(),
                size: metadata.len(),
                is_dir,
                exists: true,
                extension: if is_dir {
                    String::new()
                } else {
                    extension.to_lowercase()
                },
            }
        }
        Err(_) => FileInfo {
            name,
            path: path.to_string(),
            size: 0,
            is_dir: false,
            exists: false,
            extension,
        },
    }
}

pub fn collect_file_info(paths: &[String]) -> Vec<FileInfo> {
    paths.iter().map(|path| file_info(path)).collect()
}

/// Human summary stored as the record content
pub fn describe_files(infos: &[FileInfo]) -> String {
    match infos {
        [single] if single.is_dir => format!("Folder: {}", single.name),
        [single] => format!("File: {} ({})", single.name, format_file_size(single.size)),
        many => {
            let total: u64 = many.iter().map(|info| info.size).sum();
            format!("{} items ({})", many.len(), format_file_size(total))
        }
    }
}

/// Binary-prefixed size with one decimal, e.g. `1.2 KB`
pub fn format_file_size(size: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

    if size < UNIT {
        return format!("{} B", size);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = size / UNIT;
    while n >= UNIT && exp < PREFIXES.len() - 1 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    format!("{:.1} {}B", size as f64 / div as f64, PREFIXES[exp])
}
