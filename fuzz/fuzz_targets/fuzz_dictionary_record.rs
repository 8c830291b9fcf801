#![no_main]

use hashdex::index::dictionary::{DictEntry, RECORD_LEN, home_slot};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(entry) = DictEntry::decode(data) {
        assert_eq!(&entry.encode()[..], &data[..RECORD_LEN as usize]);
    }

    if let Ok(term) = std::str::from_utf8(data) {
        assert!(home_slot(term, 3_500_017) < 3_500_017);
    }
});
