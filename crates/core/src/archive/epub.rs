//! EPUB adapter: container rootfile → OPF package (manifest + spine +
//! cover metadata) → ordered chapter list. Chapter titles come from the
//! navigation map (EPUB2 NCX or EPUB3 NAV document) keyed by document
//! href, with an ordinal fallback. Chapter documents are rendered lazily:
//! image references are rewritten to cache-extracted copies only when a
//! chapter is actually requested.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;

use crate::cache::ExtractionCache;
use crate::error::{ArchiveError, CacheError};

/// One spine chapter: display title plus href relative to the OPF
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubChapter {
    pub title: String,
    pub href: String,
}

pub struct EpubBook {
    archive: zip::ZipArchive<BufReader<File>>,
    source_id: String,
    opf_dir: String,
    chapters: Vec<EpubChapter>,
    cover_href: Option<String>,
}

fn malformed(detail: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::Malformed {
        format: "EPUB".into(),
        detail: detail.to_string(),
    }
}

#[derive(Debug, Default)]
struct OpfData {
    /// id → (href, media_type, properties)
    manifest: HashMap<String, (String, String, Option<String>)>,
    spine: Vec<String>,
    toc_id: Option<String>,
    nav_href: Option<String>,
    cover_id: Option<String>,
}

impl EpubBook {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let mut archive =
            zip::ZipArchive::new(BufReader::new(file)).map_err(malformed)?;

        let container = read_entry_string(&mut archive, "META-INF/container.xml")?;
        let opf_path = find_opf_path(&container)?;
        let opf_dir = opf_path
            .rfind('/')
            .map(|i| opf_path[..i + 1].to_string())
            .unwrap_or_default();

        let opf_content = read_entry_string(&mut archive, &opf_path)?;
        let opf = parse_opf(&opf_content)?;

        let titles = chapter_titles(&mut archive, &opf, &opf_dir);
        let mut chapters = Vec::new();
        for (i, idref) in opf.spine.iter().enumerate() {
            let Some((href, _, _)) = opf.manifest.get(idref) else {
                tracing::warn!("spine idref '{idref}' missing from manifest");
                continue;
            };
            let title = titles
                .get(&resolve_href(&opf_dir, href))
                .cloned()
                .unwrap_or_else(|| format!("Chapter {}", i + 1));
            chapters.push(EpubChapter { title, href: href.clone() });
        }

        let cover_href = opf
            .cover_id
            .as_ref()
            .and_then(|id| opf.manifest.get(id))
            .map(|(href, _, _)| href.clone())
            .or_else(|| {
                // EPUB3 style: manifest item flagged cover-image.
                opf.manifest.values().find_map(|(href, _, props)| {
                    props
                        .as_deref()
                        .filter(|p| p.contains("cover-image"))
                        .map(|_| href.clone())
                })
            });

        Ok(Self {
            archive,
            source_id: path.to_string_lossy().into_owned(),
            opf_dir,
            chapters,
            cover_href,
        })
    }

    /// Ordered spine chapters.
    pub fn chapters(&self) -> &[EpubChapter] {
        &self.chapters
    }

    /// Declared cover image href, if the package names one.
    pub fn cover_href(&self) -> Option<&str> {
        self.cover_href.as_deref()
    }

    /// Read a resource by href relative to the OPF directory.
    pub fn read_resource(&mut self, href: &str) -> Result<Vec<u8>, ArchiveError> {
        let full = resolve_href(&self.opf_dir, href);
        read_entry_bytes(&mut self.archive, &full)
    }

    /// Load one chapter document and rewrite its image references to
    /// cache-extracted copies. Only the referenced images of this one
    /// chapter are extracted; nothing is done eagerly for the rest of the
    /// book.
    pub fn render_chapter(
        &mut self,
        href: &str,
        cache: &ExtractionCache,
    ) -> Result<String, CacheError> {
        let bytes = self.read_resource(href)?;
        let mut html = String::from_utf8_lossy(&bytes).into_owned();

        let chapter_dir = match strip_fragment(href).rfind('/') {
            Some(i) => format!("{}{}", self.opf_dir, &href[..i + 1]),
            None => self.opf_dir.clone(),
        };

        for src in collect_image_refs(&html) {
            let resolved = resolve_href(&chapter_dir, &src);
            let data = match read_entry_bytes(&mut self.archive, &resolved) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("chapter image '{src}' unreadable: {e}");
                    continue;
                }
            };
            let cached = cache.store_resource(&self.source_id, &resolved, &data)?;
            html = html.replace(&src, &cached.display().to_string());
        }
        Ok(html)
    }
}

fn strip_fragment(href: &str) -> &str {
    href.split('#').next().unwrap_or(href)
}

/// Resolve a relative href against a base directory, folding `..`.
fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = strip_fragment(href);
    let mut parts: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for seg in href.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Image references in a chapter document: `img src` and SVG `image href`.
fn collect_image_refs(html: &str) -> Vec<String> {
    let doc = scraper::Html::parse_document(html);
    let mut refs = Vec::new();
    if let Ok(selector) = scraper::Selector::parse("img[src], image") {
        for el in doc.select(&selector) {
            let value = el
                .value()
                .attr("src")
                .or_else(|| el.value().attr("xlink:href"))
                .or_else(|| el.value().attr("href"));
            if let Some(v) = value {
                if !v.is_empty() && !refs.iter().any(|r| r == v) {
                    refs.push(v.to_string());
                }
            }
        }
    }
    refs
}

// --- container / OPF parsing ---

fn find_opf_path(container: &str) -> Result<String, ArchiveError> {
    let mut reader = XmlReader::from_str(container);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"rootfile" =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() == b"full-path" {
                        return Ok(String::from_utf8_lossy(&attr.value).to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(format!("container.xml: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Err(malformed("no rootfile in container.xml"))
}

fn parse_opf(content: &str) -> Result<OpfData, ArchiveError> {
    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();
    let mut opf = OpfData::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.local_name().as_ref() {
                    b"item" => {
                        let mut id = String::new();
                        let mut href = String::new();
                        let mut media_type = String::new();
                        let mut properties = None;
                        for attr in e.attributes().flatten() {
                            let val = String::from_utf8_lossy(&attr.value).to_string();
                            match attr.key.local_name().as_ref() {
                                b"id" => id = val,
                                b"href" => href = val,
                                b"media-type" => media_type = val,
                                b"properties" => properties = Some(val),
                                _ => {}
                            }
                        }
                        if properties.as_deref().is_some_and(|p| p.contains("nav")) {
                            opf.nav_href = Some(href.clone());
                        }
                        opf.manifest.insert(id, (href, media_type, properties));
                    }
                    b"itemref" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"idref" {
                                opf.spine
                                    .push(String::from_utf8_lossy(&attr.value).to_string());
                            }
                        }
                    }
                    b"spine" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"toc" {
                                opf.toc_id =
                                    Some(String::from_utf8_lossy(&attr.value).to_string());
                            }
                        }
                    }
                    b"meta" => {
                        // EPUB2 cover declaration: <meta name="cover" content="id"/>
                        let mut is_cover = false;
                        let mut content_attr = None;
                        for attr in e.attributes().flatten() {
                            let val = String::from_utf8_lossy(&attr.value).to_string();
                            match attr.key.local_name().as_ref() {
                                b"name" if val == "cover" => is_cover = true,
                                b"content" => content_attr = Some(val),
                                _ => {}
                            }
                        }
                        if is_cover {
                            opf.cover_id = content_attr;
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(format!("OPF: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    if opf.spine.is_empty() {
        return Err(malformed("empty spine"));
    }
    Ok(opf)
}

// --- navigation map ---

/// Build href → title, preferring the EPUB3 NAV document, falling back to
/// the EPUB2 NCX. Failures degrade to an empty map (ordinal titles).
fn chapter_titles<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    opf: &OpfData,
    opf_dir: &str,
) -> HashMap<String, String> {
    if let Some(nav_href) = &opf.nav_href {
        let full = resolve_href(opf_dir, nav_href);
        if let Ok(content) = read_entry_string(archive, &full) {
            let titles = rebase_titles(parse_nav_titles(&content), &full);
            if !titles.is_empty() {
                return titles;
            }
        }
    }
    if let Some(toc_id) = &opf.toc_id {
        if let Some((href, _, _)) = opf.manifest.get(toc_id) {
            let full = resolve_href(opf_dir, href);
            if let Ok(content) = read_entry_string(archive, &full) {
                return rebase_titles(parse_ncx_titles(&content), &full);
            }
        }
    }
    HashMap::new()
}

/// NAV anchors and NCX content srcs are relative to the navigation document
/// itself, not the OPF; rebase the title keys onto full archive paths so
/// they line up with resolved spine hrefs.
fn rebase_titles(
    titles: HashMap<String, String>,
    nav_path: &str,
) -> HashMap<String, String> {
    let nav_dir = match nav_path.rfind('/') {
        Some(i) => &nav_path[..i + 1],
        None => "",
    };
    titles
        .into_iter()
        .map(|(href, title)| (resolve_href(nav_dir, &href), title))
        .collect()
}

/// EPUB3 NAV document: anchors inside the toc nav.
fn parse_nav_titles(content: &str) -> HashMap<String, String> {
    let mut titles = HashMap::new();
    let doc = scraper::Html::parse_document(content);
    let Ok(selector) = scraper::Selector::parse("nav a[href]") else {
        return titles;
    };
    for a in doc.select(&selector) {
        let title = a.text().collect::<String>().trim().to_string();
        if let Some(href) = a.value().attr("href") {
            if !title.is_empty() {
                titles
                    .entry(strip_fragment(href).to_string())
                    .or_insert(title);
            }
        }
    }
    titles
}

/// EPUB2 NCX: navPoint text labels keyed by content src.
fn parse_ncx_titles(content: &str) -> HashMap<String, String> {
    let mut titles = HashMap::new();
    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();
    let mut current_title = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.local_name().as_ref() {
                    b"navPoint" => current_title.clear(),
                    b"text" => in_text = true,
                    b"content" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"src" {
                                let src = String::from_utf8_lossy(&attr.value).to_string();
                                let title = current_title.trim().to_string();
                                if !title.is_empty() {
                                    titles
                                        .entry(strip_fragment(&src).to_string())
                                        .or_insert(title);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_text {
                    current_title.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"text" => in_text = false,
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    titles
}

// --- archive helpers ---

fn read_entry_bytes<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>, ArchiveError> {
    let mut entry = archive
        .by_name(path)
        .map_err(|_| ArchiveError::MissingEntry(path.to_string()))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf).map_err(ArchiveError::from)?;
    Ok(buf)
}

fn read_entry_string<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    path: &str,
) -> Result<String, ArchiveError> {
    let bytes = read_entry_bytes(archive, path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Sample</dc:title>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-img" href="images/cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="c2"/>
    <itemref idref="c1"/>
  </spine>
</package>"#;

    const NCX: &str = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="n1" playOrder="1">
      <navLabel><text>The Beginning</text></navLabel>
      <content src="ch1.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

    fn write_epub(path: &Path) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let opts = SimpleFileOptions::default();
        for (name, data) in [
            ("mimetype", b"application/epub+zip".as_slice()),
            ("META-INF/container.xml", CONTAINER.as_bytes()),
            ("OEBPS/content.opf", OPF.as_bytes()),
            ("OEBPS/toc.ncx", NCX.as_bytes()),
            (
                "OEBPS/ch1.xhtml",
                br#"<html><body><p>one</p><img src="images/cover.jpg"/></body></html>"#,
            ),
            ("OEBPS/ch2.xhtml", b"<html><body><p>two</p></body></html>"),
            ("OEBPS/images/cover.jpg", b"jpegbytes"),
        ] {
            writer.start_file(name.to_string(), opts).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn spine_order_and_titles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        write_epub(&path);

        let book = EpubBook::open(&path).unwrap();
        let chapters = book.chapters();
        assert_eq!(chapters.len(), 2);
        // The spine lists c2 before c1; manifest order must not leak in.
        assert_eq!(chapters[0].href, "ch2.xhtml");
        // ch2 is absent from the NCX: ordinal fallback by spine position.
        assert_eq!(chapters[0].title, "Chapter 1");
        assert_eq!(chapters[1].href, "ch1.xhtml");
        assert_eq!(chapters[1].title, "The Beginning");
        assert_eq!(book.cover_href(), Some("images/cover.jpg"));
    }

    #[test]
    fn reads_declared_cover_resource() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        write_epub(&path);

        let mut book = EpubBook::open(&path).unwrap();
        let href = book.cover_href().unwrap().to_string();
        assert_eq!(book.read_resource(&href).unwrap(), b"jpegbytes");
    }

    #[test]
    fn render_chapter_rewrites_images_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        write_epub(&path);
        let cache = ExtractionCache::open(dir.path().join("cache")).unwrap();

        let mut book = EpubBook::open(&path).unwrap();
        let html = book.render_chapter("ch1.xhtml", &cache).unwrap();
        assert!(!html.contains(r#"src="images/cover.jpg""#));
        assert!(html.contains("0001.jpg"));

        // Chapter 2 references no images; rendering it extracts nothing new.
        let html2 = book.render_chapter("ch2.xhtml", &cache).unwrap();
        assert!(html2.contains("two"));
    }

    #[test]
    fn titles_resolve_relative_to_nav_document() {
        // NCX lives in a subdirectory, so its content srcs climb back up
        // to reach the spine documents.
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <manifest>
    <item id="ncx" href="nav/toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="c1"/>
  </spine>
</package>"#;
        let ncx = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="n1" playOrder="1">
      <navLabel><text>The Beginning</text></navLabel>
      <content src="../ch1.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested.epub");
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let opts = SimpleFileOptions::default();
        for (name, data) in [
            ("META-INF/container.xml", CONTAINER.as_bytes()),
            ("OEBPS/content.opf", opf.as_bytes()),
            ("OEBPS/nav/toc.ncx", ncx.as_bytes()),
            ("OEBPS/ch1.xhtml", b"<html><body><p>one</p></body></html>".as_slice()),
        ] {
            writer.start_file(name.to_string(), opts).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();

        let book = EpubBook::open(&path).unwrap();
        assert_eq!(book.chapters().len(), 1);
        assert_eq!(book.chapters()[0].title, "The Beginning");
    }

    #[test]
    fn resolve_href_folds_parent_segments() {
        assert_eq!(resolve_href("OEBPS/text/", "../images/p.png"), "OEBPS/images/p.png");
        assert_eq!(resolve_href("OEBPS/", "ch1.xhtml#frag"), "OEBPS/ch1.xhtml");
        assert_eq!(resolve_href("", "ch1.xhtml"), "ch1.xhtml");
    }

    #[test]
    fn missing_container_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.epub");
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("whatever.txt".to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"x").unwrap();
        writer.finish().unwrap();
        assert!(EpubBook::open(&path).is_err());
    }
}
