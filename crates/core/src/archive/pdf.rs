//! PDF adapter. A PDF is always exactly one chapter; each page is exposed
//! as a synthetic `page-NNNN.png` entry whose bytes are the page's
//! embedded raster image, upscaled 2x and re-encoded as PNG on first
//! access (the extraction cache keeps the result).

use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::archive::{ArchiveEntry, ArchiveReader};
use crate::error::ArchiveError;

/// Fixed upscaling factor applied to extracted page images.
const UPSCALE: u32 = 2;

pub struct PdfReader {
    doc: Document,
    page_ids: Vec<ObjectId>,
}

fn malformed(detail: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::Malformed {
        format: "PDF".into(),
        detail: detail.to_string(),
    }
}

/// Synthetic entry name for one page (zero-based index).
pub fn page_name(index: usize) -> String {
    format!("page-{:04}.png", index + 1)
}

fn page_index(name: &str) -> Option<usize> {
    let number = name.strip_prefix("page-")?.strip_suffix(".png")?;
    number.parse::<usize>().ok()?.checked_sub(1)
}

impl PdfReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let doc = Document::load(path).map_err(malformed)?;
        if doc.is_encrypted() {
            return Err(malformed("encrypted document"));
        }
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(malformed("no pages"));
        }
        Ok(Self { doc, page_ids })
    }

    /// Page count straight from the page tree; no chapter detection.
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Extract, upscale, and PNG-encode the raster image of one page.
    pub fn render_page(&self, index: usize) -> Result<Vec<u8>, ArchiveError> {
        let page_id = *self
            .page_ids
            .get(index)
            .ok_or_else(|| ArchiveError::MissingEntry(page_name(index)))?;
        let image = self
            .largest_page_image(page_id)?
            .ok_or_else(|| malformed(format!("page {} has no raster image", index + 1)))?;

        let scaled = image.resize_exact(
            image.width() * UPSCALE,
            image.height() * UPSCALE,
            image::imageops::FilterType::CatmullRom,
        );
        let mut out = Vec::new();
        scaled
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .map_err(malformed)?;
        Ok(out)
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            other => other,
        }
    }

    /// Walk the page's XObject resources and decode the largest image.
    fn largest_page_image(
        &self,
        page_id: ObjectId,
    ) -> Result<Option<image::DynamicImage>, ArchiveError> {
        let (direct, resource_ids) = self.doc.get_page_resources(page_id).map_err(malformed)?;
        let mut dicts: Vec<&Dictionary> = Vec::new();
        if let Some(d) = direct {
            dicts.push(d);
        }
        for id in resource_ids {
            if let Ok(Object::Dictionary(d)) = self.doc.get_object(id) {
                dicts.push(d);
            }
        }

        let mut best: Option<(u64, image::DynamicImage)> = None;
        for resources in dicts {
            let Ok(xobjects) = resources.get(b"XObject") else { continue };
            let Object::Dictionary(xobjects) = self.resolve(xobjects) else { continue };
            for (_, value) in xobjects.iter() {
                let Object::Stream(stream) = self.resolve(value) else { continue };
                let subtype = stream.dict.get(b"Subtype").and_then(Object::as_name);
                if subtype.ok() != Some(b"Image".as_slice()) {
                    continue;
                }
                match decode_image_stream(stream) {
                    Ok(img) => {
                        let area = img.width() as u64 * img.height() as u64;
                        if best.as_ref().map(|(a, _)| area > *a).unwrap_or(true) {
                            best = Some((area, img));
                        }
                    }
                    Err(e) => {
                        tracing::debug!("undecodable page image: {e}");
                    }
                }
            }
        }
        Ok(best.map(|(_, img)| img))
    }
}

fn stream_filters(stream: &lopdf::Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode one image XObject stream. DCT streams are JPEG bytes as-is;
/// flate streams are rebuilt from raw samples using the declared
/// width/height/bit depth.
fn decode_image_stream(stream: &lopdf::Stream) -> Result<image::DynamicImage, ArchiveError> {
    let filters = stream_filters(stream);
    if filters.iter().any(|f| f == b"DCTDecode" || f == b"JPXDecode") {
        return image::load_from_memory(&stream.content).map_err(malformed);
    }

    let data = stream.decompressed_content().map_err(malformed)?;
    let width = stream
        .dict
        .get(b"Width")
        .and_then(Object::as_i64)
        .map_err(malformed)? as u32;
    let height = stream
        .dict
        .get(b"Height")
        .and_then(Object::as_i64)
        .map_err(malformed)? as u32;
    let pixels = width as usize * height as usize;
    if pixels == 0 {
        return Err(malformed("image with zero dimension"));
    }

    if data.len() >= pixels * 3 {
        let buf = data[..pixels * 3].to_vec();
        let img = image::RgbImage::from_raw(width, height, buf)
            .ok_or_else(|| malformed("bad RGB sample buffer"))?;
        Ok(image::DynamicImage::ImageRgb8(img))
    } else if data.len() >= pixels {
        let buf = data[..pixels].to_vec();
        let img = image::GrayImage::from_raw(width, height, buf)
            .ok_or_else(|| malformed("bad gray sample buffer"))?;
        Ok(image::DynamicImage::ImageLuma8(img))
    } else {
        Err(malformed("unsupported image sample layout"))
    }
}

impl ArchiveReader for PdfReader {
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        Ok((0..self.page_count())
            .map(|i| ArchiveEntry {
                path: page_name(i),
                is_dir: false,
                size: 0,
            })
            .collect())
    }

    fn read_entry(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError> {
        let index =
            page_index(path).ok_or_else(|| ArchiveError::MissingEntry(path.to_string()))?;
        self.render_page(index)
    }
}
