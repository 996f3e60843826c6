//! Chapter boundary detection.
//!
//! Image archives use the leaf-directory algorithm: the deepest
//! image-bearing directories become chapters, which handles
//! "volume/chapter/page.jpg" layouts without configuration. Plain-text
//! novels use heading patterns. EPUB chapters come from the package spine
//! (see `archive::epub`).

use regex::Regex;

use crate::archive::ArchiveEntry;
use crate::catalog::TextSpan;
use crate::detect::is_image_entry;
use crate::natsort;

/// Directory part of an entry path, without trailing slash; "" for root.
fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

fn final_segment(dir: &str) -> &str {
    dir.rsplit('/').next().unwrap_or(dir)
}

/// Find leaf chapter directories in an image archive's entry listing.
///
/// Collects every directory that directly contains at least one image
/// entry. An empty set, or root only, means the whole archive is one
/// chapter and the result is empty. Otherwise a directory is a leaf
/// chapter iff no other image-bearing directory extends it. Results carry
/// a trailing `/` so they can be used directly as internal-path prefixes,
/// sorted by natural order of the final path segment.
pub fn leaf_chapter_dirs(entries: &[ArchiveEntry]) -> Vec<String> {
    let mut dirs: Vec<&str> = entries
        .iter()
        .filter(|e| !e.is_dir && is_image_entry(&e.path))
        .map(|e| parent_dir(&e.path))
        .collect();
    dirs.sort_unstable();
    dirs.dedup();

    if dirs.is_empty() || dirs == [""] {
        return Vec::new();
    }

    let mut leaves: Vec<String> = dirs
        .iter()
        .filter(|dir| {
            !dirs.iter().any(|other| {
                other.len() > dir.len()
                    && other.starts_with(*dir)
                    && (dir.is_empty() || other.as_bytes()[dir.len()] == b'/')
            })
        })
        .map(|dir| format!("{dir}/"))
        .collect();

    leaves.sort_by(|a, b| {
        natsort::compare(
            final_segment(a.trim_end_matches('/')),
            final_segment(b.trim_end_matches('/')),
        )
    });
    leaves
}

/// A detected novel chapter: title plus byte span into the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChapter {
    pub title: String,
    pub span: TextSpan,
}

/// Heading-pattern chapter detector for plain-text novels. Patterns are
/// compiled once per detector instance; construct one per scan session.
pub struct HeadingDetector {
    patterns: Vec<Regex>,
}

impl Default for HeadingDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadingDetector {
    pub fn new() -> Self {
        let patterns = [
            // CJK ordinal headings: 第12章 / 第一百零三节 / 第3回 …
            r"^第[0-9０-９零〇一二三四五六七八九十百千两]+[章节卷回部集篇话]",
            // Western ordinal headings.
            r"(?i)^chapter\s+[0-9]+",
            // Standalone section words.
            r"^(序章|序言|楔子|引子|前言|后记|尾声|终章|番外|Prologue|Epilogue|Preface|Foreword)$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("heading pattern"))
        .collect();
        Self { patterns }
    }

    fn is_heading(&self, line: &str) -> bool {
        let trimmed = line.trim();
        !trimmed.is_empty() && self.patterns.iter().any(|p| p.is_match(trimmed))
    }

    /// Scan text line by line and split on heading lines.
    ///
    /// Each chapter's span points into the original text (end exclusive,
    /// running to the next heading or EOF). Content before the first
    /// heading becomes its own leading chapter when non-blank. Zero
    /// headings yields a single chapter spanning the whole text.
    pub fn detect(&self, text: &str) -> Vec<TextChapter> {
        let mut headings: Vec<(usize, String)> = Vec::new();
        let mut offset = 0usize;
        for line in text.split_inclusive('\n') {
            let content = line.trim_end_matches(['\n', '\r']);
            if self.is_heading(content) {
                headings.push((offset, content.trim().to_string()));
            }
            offset += line.len();
        }

        if headings.is_empty() {
            return vec![TextChapter {
                title: first_line_title(text),
                span: TextSpan { start: 0, end: text.len() as u64 },
            }];
        }

        let mut chapters = Vec::with_capacity(headings.len() + 1);
        if headings[0].0 > 0 && !text[..headings[0].0].trim().is_empty() {
            chapters.push(TextChapter {
                title: first_line_title(&text[..headings[0].0]),
                span: TextSpan { start: 0, end: headings[0].0 as u64 },
            });
        }
        for (i, (start, title)) in headings.iter().enumerate() {
            let end = headings
                .get(i + 1)
                .map(|(next, _)| *next)
                .unwrap_or(text.len());
            chapters.push(TextChapter {
                title: title.clone(),
                span: TextSpan { start: *start as u64, end: end as u64 },
            });
        }
        chapters
    }
}

fn first_line_title(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file(path: &str) -> ArchiveEntry {
        ArchiveEntry { path: path.to_string(), is_dir: false, size: 1 }
    }

    #[test]
    fn nested_leaf_directories() {
        let entries = vec![
            file("v1/ch1/p1.jpg"),
            file("v1/ch1/p2.jpg"),
            file("v1/ch2/p1.jpg"),
        ];
        assert_eq!(leaf_chapter_dirs(&entries), vec!["v1/ch1/", "v1/ch2/"]);
    }

    #[test]
    fn root_only_images_mean_single_chapter() {
        let entries = vec![file("p1.jpg"), file("p2.jpg")];
        assert_eq!(leaf_chapter_dirs(&entries), Vec::<String>::new());
    }

    #[test]
    fn no_images_mean_single_chapter() {
        let entries = vec![file("readme.txt")];
        assert_eq!(leaf_chapter_dirs(&entries), Vec::<String>::new());
    }

    #[test]
    fn intermediate_dirs_with_images_are_not_leaves() {
        // v1 itself holds an image but has image-bearing descendants,
        // so only the deepest dirs become chapters.
        let entries = vec![
            file("v1/cover.jpg"),
            file("v1/ch1/p1.jpg"),
            file("v1/ch2/p1.jpg"),
        ];
        assert_eq!(leaf_chapter_dirs(&entries), vec!["v1/ch1/", "v1/ch2/"]);
    }

    #[test]
    fn sibling_prefix_names_are_not_descendants() {
        // "ch1" is not a prefix-parent of "ch10"; both are leaves.
        let entries = vec![file("ch1/p1.jpg"), file("ch10/p1.jpg")];
        assert_eq!(leaf_chapter_dirs(&entries), vec!["ch1/", "ch10/"]);
    }

    #[test]
    fn leaves_sorted_by_natural_order_of_final_segment() {
        let entries = vec![
            file("b/ch10/p1.jpg"),
            file("a/ch2/p1.jpg"),
            file("c/ch1/p1.jpg"),
        ];
        assert_eq!(
            leaf_chapter_dirs(&entries),
            vec!["c/ch1/", "a/ch2/", "b/ch10/"]
        );
    }

    #[test]
    fn cjk_headings_split_with_correct_spans() {
        let text = "第一章 初见\n正文甲。\n第二章 重逢\n正文乙。\n";
        let detector = HeadingDetector::new();
        let chapters = detector.detect(text);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "第一章 初见");
        assert_eq!(chapters[0].span.start, 0);
        assert_eq!(chapters[1].span.end, text.len() as u64);
        // Spans index the original text, so slicing reproduces it.
        let a = &text[chapters[0].span.start as usize..chapters[0].span.end as usize];
        let b = &text[chapters[1].span.start as usize..chapters[1].span.end as usize];
        assert_eq!(format!("{a}{b}"), text);
    }

    #[test]
    fn western_headings_and_preamble() {
        let text = "An introduction.\n\nChapter 1\nbody one\nCHAPTER 2\nbody two";
        let detector = HeadingDetector::new();
        let chapters = detector.detect(text);
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, "An introduction.");
        assert_eq!(chapters[1].title, "Chapter 1");
        assert_eq!(chapters[2].title, "CHAPTER 2");
        assert_eq!(chapters[2].span.end, text.len() as u64);
    }

    #[test]
    fn standalone_section_words() {
        let text = "楔子\n很久以前。\n第一章 开端\n正文。\n番外\n彩蛋。\n";
        let detector = HeadingDetector::new();
        let chapters = detector.detect(text);
        let titles: Vec<_> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["楔子", "第一章 开端", "番外"]);
    }

    #[test]
    fn no_headings_whole_text_is_one_chapter() {
        let text = "just prose\nwith lines\n";
        let detector = HeadingDetector::new();
        let chapters = detector.detect(text);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].span, TextSpan { start: 0, end: text.len() as u64 });
        assert_eq!(chapters[0].title, "just prose");
    }
}
