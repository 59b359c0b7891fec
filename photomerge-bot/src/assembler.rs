//! Merge raster images into one multi-page PDF.
//!
//! Every source image becomes one page at its native pixel size, converted to
//! points at the configured resolution. Images are never cropped, scaled to
//! fit or rotated. Pages are embedded as baseline JPEG (`DCTDecode`) so any
//! decodable input format ends up in the same page representation.

use image::codecs::jpeg::JpegEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use photomerge_common::config::DocumentConfig;
use std::sync::Arc;

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("No images to assemble")]
    Empty,

    #[error("Image {index} could not be decoded: {source}")]
    Decode {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("Page {index} could not be encoded: {source}")]
    Encode {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write document: {0}")]
    Pdf(String),
}

/// An immutable assembled document.
///
/// Cheap to clone; the bytes are shared between the direct-return and mail
/// deliveries.
#[derive(Clone, PartialEq, Eq)]
pub struct AssembledDocument {
    bytes: Arc<[u8]>,
    page_count: usize,
}

impl AssembledDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl std::fmt::Debug for AssembledDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssembledDocument")
            .field("bytes", &self.bytes.len())
            .field("page_count", &self.page_count)
            .finish()
    }
}

/// Stateless image-to-PDF assembler.
#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    resolution_dpi: f32,
    jpeg_quality: u8,
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::from_config(&DocumentConfig::default())
    }
}

impl DocumentAssembler {
    pub fn new(resolution_dpi: f32, jpeg_quality: u8) -> Self {
        Self {
            resolution_dpi,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &DocumentConfig) -> Self {
        Self::new(config.resolution_dpi, config.jpeg_quality)
    }

    /// Build one PDF with a page per image, in input order.
    ///
    /// CPU bound; call from a blocking context.
    pub fn assemble(&self, images: &[Vec<u8>]) -> Result<AssembledDocument, AssemblyError> {
        if images.is_empty() {
            return Err(AssemblyError::Empty);
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::with_capacity(images.len());

        for (index, raw) in images.iter().enumerate() {
            let page = self.encode_page(index, raw)?;
            let (width_pt, height_pt) = self.page_size(page.width, page.height);

            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => i64::from(page.width),
                    "Height" => i64::from(page.height),
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                page.jpeg,
            )
            .with_compression(false));

            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            Object::Real(width_pt),
                            0.into(),
                            0.into(),
                            Object::Real(height_pt),
                            0.into(),
                            0.into(),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content_bytes = content
                .encode()
                .map_err(|e| AssemblyError::Pdf(e.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    Object::Real(width_pt),
                    Object::Real(height_pt),
                ],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im0" => image_id },
                },
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let page_count = kids.len();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| AssemblyError::Pdf(e.to_string()))?;

        tracing::debug!(pages = page_count, bytes = out.len(), "Document assembled");

        Ok(AssembledDocument {
            bytes: out.into(),
            page_count,
        })
    }

    fn encode_page(&self, index: usize, raw: &[u8]) -> Result<EncodedPage, AssemblyError> {
        let decoded = image::load_from_memory(raw)
            .map_err(|source| AssemblyError::Decode { index, source })?;
        let rgb = decoded.to_rgb8();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality)
            .encode_image(&rgb)
            .map_err(|source| AssemblyError::Encode { index, source })?;

        Ok(EncodedPage {
            width: rgb.width(),
            height: rgb.height(),
            jpeg,
        })
    }

    fn page_size(&self, width_px: u32, height_px: u32) -> (f32, f32) {
        let scale = POINTS_PER_INCH / self.resolution_dpi;
        (width_px as f32 * scale, height_px as f32 * scale)
    }
}

struct EncodedPage {
    width: u32,
    height: u32,
    jpeg: Vec<u8>,
}
