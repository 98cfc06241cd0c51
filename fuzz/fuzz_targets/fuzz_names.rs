// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use seqrename::naming::{format_name, validate_prefix, SequencePattern};

#[derive(Debug, Arbitrary)]
struct Input {
    prefix: String,
    file_name: String,
    suffix: u32,
}

fuzz_target!(|input: Input| {
    let Ok(prefix) = validate_prefix(&input.prefix) else {
        return;
    };
    let Ok(pattern) = SequencePattern::new(&prefix, &["png".to_string()]) else {
        return;
    };

    // Arbitrary names must never panic the parser
    if pattern.is_canonical(&input.file_name) {
        assert!(pattern.parse_suffix(&input.file_name).is_some());
    }

    // Every generated name reads back as the suffix it was built from
    let name = format_name(&prefix, input.suffix, "png");
    assert_eq!(pattern.parse_suffix(&name), Some(input.suffix));
    assert!(pattern.is_canonical(&name));
});
