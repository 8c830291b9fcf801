#![no_main]

use arbitrary::Arbitrary;
use hashdex::index::postings;
use hashdex::index::types::{DocId, Position, PostingsList};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct CodecInput<'a> {
    raw: &'a [u8],
    term: String,
    postings: Vec<(DocId, Position)>,
}

fuzz_target!(|input: CodecInput<'_>| {
    let _ = postings::leading_term(input.raw);

    // Anything that decodes is canonical, up to a trailing group separator
    if let Ok((term, list)) = postings::decode_bytes(input.raw) {
        let text = postings::encode(&term, &list);
        let raw = input.raw.strip_suffix(b".").unwrap_or(input.raw);
        assert_eq!(text.as_bytes(), raw);
    }

    if postings::is_valid_term(&input.term) {
        let mut list = PostingsList::new();
        for &(doc_id, position) in input.postings.iter().take(256) {
            list.add_posting(doc_id, position);
        }
        let text = postings::encode(&input.term, &list);
        let (term, decoded) = postings::decode(&text).expect("re-decode");
        assert_eq!(term, input.term);
        assert_eq!(decoded, list);
    }
});
