//! Text encoding of postings lists.
//!
//! A blob is `"<term> "` followed by one group per document,
//! `"<docID>:<p0>,<p1>,...,<pk>"`, groups joined by `.`. Groups are always
//! written in ascending docID order; query intersection and segment merge
//! depend on that without re-sorting.

use crate::error::{IndexError, Result};
use crate::index::types::{DocId, Position, PostingsEntry, PostingsList};
use memchr::memchr;
use std::cmp::Ordering;
use std::fmt::Write;

const TERM_SEPARATOR: u8 = b' ';
const GROUP_SEPARATOR: char = '.';
const DOC_SEPARATOR: char = ':';
const POSITION_SEPARATOR: char = ',';

/// Terms must not be empty and must not contain the header separator or
/// other whitespace
pub fn is_valid_term(term: &str) -> bool {
    !term.is_empty() && !term.chars().any(char::is_whitespace)
}

/// Encode a term's postings list
pub fn encode(term: &str, postings: &PostingsList) -> String {
    let mut out = String::with_capacity(term.len() + 1 + postings.len() * 8);
    out.push_str(term);
    out.push(TERM_SEPARATOR as char);

    for (i, entry) in postings.iter().enumerate() {
        if i > 0 {
            out.push(GROUP_SEPARATOR);
        }
        // Writing into a String cannot fail
        let _ = write!(out, "{}{}", entry.doc_id, DOC_SEPARATOR);
        for (j, position) in entry.positions.iter().enumerate() {
            if j > 0 {
                out.push(POSITION_SEPARATOR);
            }
            let _ = write!(out, "{}", position);
        }
    }

    out
}

/// Decode a blob produced by [`encode`].
///
/// A trailing group separator is accepted. Groups out of docID order are
/// rejected.
pub fn decode(text: &str) -> Result<(String, PostingsList)> {
    let (term, body) = text
        .split_once(TERM_SEPARATOR as char)
        .ok_or_else(|| IndexError::corrupt_postings("missing term header"))?;
    if term.is_empty() {
        return Err(IndexError::corrupt_postings("empty term"));
    }

    let body = body.strip_suffix(GROUP_SEPARATOR).unwrap_or(body);
    if body.is_empty() {
        return Ok((term.to_string(), PostingsList::new()));
    }

    let mut entries = Vec::new();
    for group in body.split(GROUP_SEPARATOR) {
        let (doc, positions) = group.split_once(DOC_SEPARATOR).ok_or_else(|| {
            IndexError::corrupt_postings(format!("group {:?} has no docID", group))
        })?;
        let doc_id: DocId = parse_number(doc)?;
        let positions = positions
            .split(POSITION_SEPARATOR)
            .map(parse_number::<Position>)
            .collect::<Result<Vec<_>>>()?;
        entries.push(PostingsEntry::new(doc_id, positions));
    }

    let postings = PostingsList::from_sorted(entries).ok_or_else(|| {
        IndexError::corrupt_postings(format!("docIDs of {:?} are not ascending", term))
    })?;
    Ok((term.to_string(), postings))
}

/// Decode a raw blob read from a data store
pub fn decode_bytes(blob: &[u8]) -> Result<(String, PostingsList)> {
    let text = std::str::from_utf8(blob)
        .map_err(|e| IndexError::corrupt_postings(format!("invalid UTF-8: {}", e)))?;
    decode(text)
}

/// The term a blob belongs to, without decoding the postings
pub fn leading_term(blob: &[u8]) -> Option<&[u8]> {
    memchr(TERM_SEPARATOR, blob)
        .filter(|&end| end > 0)
        .map(|end| &blob[..end])
}

/// Canonical decimal only: no sign, no leading zeros
fn parse_number<T: std::str::FromStr>(s: &str) -> Result<T> {
    let not_a_number = || IndexError::corrupt_postings(format!("{:?} is not a number", s));
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) || (s.len() > 1 && s.starts_with('0'))
    {
        return Err(not_a_number());
    }
    s.parse().map_err(|_| not_a_number())
}

/// Merge the postings of an older segment with those of a newer one.
///
/// Both inputs are ascending; the result is ascending with one entry per
/// docID. A document present in both (one that was open across a flush)
/// keeps the older positions first.
pub fn merge(older: PostingsList, newer: PostingsList) -> PostingsList {
    let mut merged = Vec::with_capacity(older.len() + newer.len());
    let mut left = older.into_entries().into_iter().peekable();
    let mut right = newer.into_entries().into_iter().peekable();

    loop {
        let order = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.doc_id.cmp(&r.doc_id),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match order {
            Ordering::Less => merged.extend(left.next()),
            Ordering::Greater => merged.extend(right.next()),
            Ordering::Equal => {
                if let (Some(mut l), Some(r)) = (left.next(), right.next()) {
                    l.positions.extend(r.positions);
                    merged.push(l);
                }
            }
        }
    }

    PostingsList::from_sorted_unchecked(merged)
}
