//! Natural-order string comparison: numeric runs compare by value, so
//! "page2" sorts before "page10". Applied to archive entry names, chapter
//! directories, track names, and library listings.

use std::cmp::Ordering;

use unicode_normalization::UnicodeNormalization;

/// One run of a tokenized string: either a digit run or everything else.
#[derive(Debug, PartialEq)]
enum Token<'a> {
    Number(&'a str),
    Text(&'a str),
}

fn tokenize(s: &str) -> impl Iterator<Item = Token<'_>> {
    let bytes = s.as_bytes();
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos >= bytes.len() {
            return None;
        }
        let start = pos;
        let digit = bytes[pos].is_ascii_digit();
        while pos < bytes.len() && bytes[pos].is_ascii_digit() == digit {
            pos += 1;
        }
        // Runs are split on ASCII digit boundaries, so the slice stays on
        // char boundaries.
        let run = &s[start..pos];
        Some(if digit { Token::Number(run) } else { Token::Text(run) })
    })
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    match a.len().cmp(&b.len()) {
        Ordering::Equal => a.cmp(b),
        other => other,
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    let mut ca = a.chars().flat_map(char::to_lowercase);
    let mut cb = b.chars().flat_map(char::to_lowercase);
    loop {
        match (ca.next(), cb.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match x.cmp(&y) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Compare two strings in natural order. Case-insensitive for text runs,
/// by value for digit runs; a string that runs out of tokens first sorts
/// first; final tie-break is string length.
pub fn compare(a: &str, b: &str) -> Ordering {
    let na: String = a.nfc().collect();
    let nb: String = b.nfc().collect();

    let mut ta = tokenize(&na);
    let mut tb = tokenize(&nb);
    loop {
        match (ta.next(), tb.next()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x, y) {
                    (Token::Number(x), Token::Number(y)) => compare_numbers(x, y),
                    (Token::Text(x), Token::Text(y)) => compare_text(x, y),
                    // Mixed runs at the same position: digits sort first.
                    (Token::Number(_), Token::Text(_)) => Ordering::Less,
                    (Token::Text(_), Token::Number(_)) => Ordering::Greater,
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
    na.len().cmp(&nb.len())
}

/// Sort a slice of strings in place by natural order.
pub fn sort_strings<S: AsRef<str>>(items: &mut [S]) {
    items.sort_by(|a, b| compare(a.as_ref(), b.as_ref()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn numeric_runs_compare_by_value() {
        assert_eq!(compare("img2.jpg", "img10.jpg"), Ordering::Less);
        assert_eq!(compare("page10", "page2"), Ordering::Greater);
        assert_eq!(compare("v1/ch2", "v1/ch10"), Ordering::Less);
    }

    #[test]
    fn leading_zeros_do_not_matter_for_value() {
        assert_eq!(compare("p002", "p2"), Ordering::Greater); // equal value, longer string
        assert_eq!(compare("p002", "p10"), Ordering::Less);
    }

    #[test]
    fn text_runs_are_case_insensitive() {
        assert_eq!(compare("a", "A"), Ordering::Equal);
        assert_eq!(compare("Chapter 2", "chapter 10"), Ordering::Less);
    }

    #[test]
    fn shorter_prefix_sorts_first() {
        assert_eq!(compare("ch1", "ch1a"), Ordering::Less);
        assert_eq!(compare("abc", "abcdef"), Ordering::Less);
    }

    #[test]
    fn sorts_typical_page_listing() {
        let mut pages = vec!["10.jpg", "2.jpg", "1.jpg", "100.jpg", "3.jpg"];
        sort_strings(&mut pages);
        assert_eq!(pages, vec!["1.jpg", "2.jpg", "3.jpg", "10.jpg", "100.jpg"]);
    }

    proptest! {
        #[test]
        fn antisymmetric(a in ".{0,12}", b in ".{0,12}") {
            prop_assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
        }

        #[test]
        fn reflexive(a in ".{0,16}") {
            prop_assert_eq!(compare(&a, &a), Ordering::Equal);
        }

        #[test]
        fn transitive(a in "[a-c0-3]{0,6}", b in "[a-c0-3]{0,6}", c in "[a-c0-3]{0,6}") {
            let mut v = vec![a, b, c];
            v.sort_by(|x, y| compare(x, y));
            prop_assert!(compare(&v[0], &v[1]) != Ordering::Greater);
            prop_assert!(compare(&v[1], &v[2]) != Ordering::Greater);
            prop_assert!(compare(&v[0], &v[2]) != Ordering::Greater);
        }
    }
}
