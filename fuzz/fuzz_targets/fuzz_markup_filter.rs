#![no_main]

use libfuzzer_sys::fuzz_target;

use pasteclean::filter::tokenizer::{tokenize, Token};
use pasteclean::{MarkupFilter, Whitelist};

fuzz_target!(|data: &str| {
    // Arbitrary pasted markup must never panic the filter, and whatever it
    // emits must stay inside the whitelist and be stable under re-filtering.
    let whitelist = Whitelist::default();
    let filter = MarkupFilter::new(&whitelist);

    let once = filter.filter(data).html;
    for token in tokenize(&once) {
        if let Token::StartTag(tag) = token {
            assert!(whitelist.is_allowed(&tag.name), "leaked <{}>", tag.name);
            for attr in &tag.attributes {
                assert!(whitelist.is_attribute_allowed(&attr.name));
            }
        }
    }

    let mut hook = |src: &str| Some(format!("stored-{}", src.len()));
    let _ = filter.filter_with(data, &mut hook);
});
