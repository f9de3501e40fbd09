#![no_main]

use libfuzzer_sys::fuzz_target;

use pasteclean::filter::style::{is_safe_value, parse_style_declarations, StyleDeclarations};

fuzz_target!(|data: &str| {
    // Untrusted `style` text: parsing never fails, and every kept
    // declaration has a non-empty, trimmed property and value.
    let mut declarations = StyleDeclarations::new();
    for (property, value) in parse_style_declarations(data) {
        assert!(!property.is_empty() && !value.is_empty());
        assert_eq!(property.trim(), property);
        if is_safe_value(&value) {
            declarations.set(&property, &value);
        }
    }
    let _ = declarations.serialize();
});
