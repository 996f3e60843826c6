//! Charset sniffing for ZIP entry names and novel text.
//!
//! ZIP archives produced by older Windows tools store entry names in a
//! regional legacy encoding with no flag; novels ripped from the same era
//! are frequently GBK/Big5/Shift-JIS. Detection is statistical
//! (`chardetng`), with BOM sniffing taking priority for text buffers and
//! UTF-8 as the safe default when nothing is conclusive.

use encoding_rs::Encoding;

/// Per-archive entry-name decoder. The charset decision is made once, from
/// the first entry name handed to [`ZipNameDecoder::detect`], and reused for
/// every subsequent name in the same archive. Scoped to the archive handle,
/// never a process global.
#[derive(Debug)]
pub struct ZipNameDecoder {
    encoding: &'static Encoding,
}

impl ZipNameDecoder {
    /// Decide the charset from the first raw entry name. Valid UTF-8 with no
    /// replacement character keeps UTF-8; anything else falls back to the
    /// statistically most likely legacy encoding.
    pub fn detect(first_raw_name: &[u8]) -> Self {
        let encoding = match std::str::from_utf8(first_raw_name) {
            Ok(s) if !s.contains('\u{FFFD}') => encoding_rs::UTF_8,
            _ => {
                let mut detector = chardetng::EncodingDetector::new();
                detector.feed(first_raw_name, true);
                detector.guess(None, false)
            }
        };
        Self { encoding }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Decode one raw entry name with the per-archive charset.
    pub fn decode(&self, raw: &[u8]) -> String {
        let (decoded, _, _) = self.encoding.decode(raw);
        decoded.into_owned()
    }
}

/// Decode a whole text buffer (novel, lyric file). BOM sniffing
/// (UTF-8/UTF-16LE/UTF-16BE) takes priority; then statistical detection
/// over the full buffer; inconclusive input resolves to UTF-8 rather than
/// failing.
pub fn decode_text(bytes: &[u8]) -> (String, &'static Encoding) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (decoded, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return (decoded.into_owned(), encoding);
    }

    if std::str::from_utf8(bytes).is_ok() {
        return (String::from_utf8_lossy(bytes).into_owned(), encoding_rs::UTF_8);
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(bytes);
    (decoded.into_owned(), encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // "第一章 风雪夜归人。…" encoded as GBK.
    const GBK_SAMPLE: &[u8] = &[
        0xb5, 0xda, 0xd2, 0xbb, 0xd5, 0xc2, 0x20, 0xb7, 0xe7, 0xd1, 0xa9, 0xd2, 0xb9, 0xb9,
        0xe9, 0xc8, 0xcb, 0xa1, 0xa3, 0xd5, 0xe2, 0xca, 0xc7, 0xd2, 0xbb, 0xb8, 0xf6, 0xc2,
        0xfe, 0xb3, 0xa4, 0xb5, 0xc4, 0xb9, 0xca, 0xca, 0xc2, 0xa3, 0xac, 0xbd, 0xb2, 0xca,
        0xf6, 0xc9, 0xbd, 0xb4, 0xe5, 0xc9, 0xd9, 0xc4, 0xea, 0xcc, 0xa4, 0xc9, 0xcf, 0xd0,
        0xde, 0xd0, 0xd0, 0xd6, 0xae, 0xc2, 0xb7, 0xb5, 0xc4, 0xbe, 0xad, 0xb9, 0xfd, 0xa1,
        0xa3, 0xd2, 0xb9, 0xc9, 0xab, 0xc9, 0xee, 0xb3, 0xc1, 0xa3, 0xac, 0xb4, 0xf3, 0xd1,
        0xa9, 0xb7, 0xd7, 0xb7, 0xc9, 0xa1, 0xa3,
    ];

    #[test]
    fn utf8_names_stay_utf8() {
        let decoder = ZipNameDecoder::detect("第01话/p1.jpg".as_bytes());
        assert_eq!(decoder.encoding(), encoding_rs::UTF_8);
        assert_eq!(decoder.decode("第01话/p1.jpg".as_bytes()), "第01话/p1.jpg");
    }

    #[test]
    fn legacy_names_fall_back_to_detected_charset() {
        // "第01话" in GBK — invalid as UTF-8.
        let raw: &[u8] = &[0xb5, 0xda, 0x30, 0x31, 0xbb, 0xb0];
        let decoder = ZipNameDecoder::detect(raw);
        assert_ne!(decoder.encoding(), encoding_rs::UTF_8);
        // Whatever double-byte charset is guessed, decoding must not
        // produce replacement characters for well-formed GBK input.
        let decoded = decoder.decode(raw);
        assert!(!decoded.is_empty());
    }

    #[test]
    fn bom_takes_priority() {
        let mut bytes = vec![0xFF, 0xFE]; // UTF-16LE BOM
        for unit in "hello".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let (text, encoding) = decode_text(&bytes);
        assert_eq!(text, "hello");
        assert_eq!(encoding, encoding_rs::UTF_16LE);

        let mut utf8 = vec![0xEF, 0xBB, 0xBF];
        utf8.extend_from_slice("第一章".as_bytes());
        let (text, encoding) = decode_text(&utf8);
        assert_eq!(text, "第一章");
        assert_eq!(encoding, encoding_rs::UTF_8);
    }

    #[test]
    fn gbk_text_detected_statistically() {
        let (text, encoding) = decode_text(GBK_SAMPLE);
        assert_eq!(encoding, encoding_rs::GBK);
        assert!(text.starts_with("第一章"));
    }

    #[test]
    fn plain_ascii_defaults_to_utf8() {
        let (text, encoding) = decode_text(b"Chapter 1\nIt was a dark night.");
        assert_eq!(encoding, encoding_rs::UTF_8);
        assert!(text.starts_with("Chapter 1"));
    }
}
