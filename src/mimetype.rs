use std::path::Path;

pub const TEXT_PLAIN: &str = "text/plain";
pub const IMAGE_PNG: &str = "image/png";
pub const IMAGE_JPEG: &str = "image/jpeg";
pub const IMAGE_GIF: &str = "image/gif";

/// Raster formats the OCR tool is asked to read.
pub const OCR_SOURCE_MIMETYPES: &[&str] = &[IMAGE_PNG, IMAGE_JPEG, IMAGE_GIF];

/// Maps mimetypes to filename extensions (without the leading dot).
pub trait MimetypeService: Send + Sync {
    fn extension(&self, mimetype: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticMimetypes;

// First entry for a mimetype is its canonical extension.
const TABLE: &[(&str, &str)] = &[
    (IMAGE_PNG, "png"),
    (IMAGE_JPEG, "jpg"),
    (IMAGE_JPEG, "jpeg"),
    (IMAGE_GIF, "gif"),
    ("image/tiff", "tiff"),
    ("image/tiff", "tif"),
    ("image/bmp", "bmp"),
    (TEXT_PLAIN, "txt"),
    ("application/pdf", "pdf"),
];

impl StaticMimetypes {
    /// Reverse lookup by file extension, case-insensitive.
    pub fn mimetype_for_path(&self, path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        TABLE
            .iter()
            .find(|(_, e)| *e == ext)
            .map(|(mime, _)| *mime)
    }
}

impl MimetypeService for StaticMimetypes {
    fn extension(&self, mimetype: &str) -> Option<String> {
        TABLE
            .iter()
            .find(|(m, _)| *m == mimetype)
            .map(|(_, ext)| ext.to_string())
    }
}
