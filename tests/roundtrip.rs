// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! End-to-end decode/encode scenarios over hand-assembled modules.

use lamina::types::{ElementInit, SectionId, TypeDef, ValType};
use lamina::{
    Global, ModuleError, ParseOptions, decode, encode_module, parse_module, validate,
    validate_module,
};

const ENVELOPE: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

const NO_VALIDATE: ParseOptions = ParseOptions { validate: false };

fn section(id: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![id, payload.len() as u8];
    bytes.extend_from_slice(payload);
    bytes
}

fn module_bytes(sections: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = ENVELOPE.to_vec();
    for section in sections {
        bytes.extend_from_slice(section);
    }
    bytes
}

// A module exporting the identity function: one type (i32) -> i32, one
// function, one export, one body `local.get 0; end`.
fn identity_module_sections() -> Vec<Vec<u8>> {
    vec![
        section(1, &[0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f]),
        section(3, &[0x01, 0x00]),
        section(7, &[0x01, 0x02, 0x69, 0x64, 0x00, 0x00]),
        section(10, &[0x01, 0x04, 0x00, 0x20, 0x00, 0x0b]),
    ]
}

// A module exercising every section: imports of all five kinds' worth of
// index spaces, both table forms, globals, tags, both element payload
// kinds, and an active data segment.
fn kitchen_sink_sections() -> Vec<Vec<u8>> {
    vec![
        // () -> () and (i32) -> i32.
        section(
            1,
            &[0x02, 0x60, 0x00, 0x00, 0x60, 0x01, 0x7f, 0x01, 0x7f],
        ),
        // "env"."f" func 0; "env"."g" global (mut i64); "env"."t" tag 0.
        section(
            2,
            &[
                0x03, //
                0x03, 0x65, 0x6e, 0x76, 0x01, 0x66, 0x00, 0x00, //
                0x03, 0x65, 0x6e, 0x76, 0x01, 0x67, 0x03, 0x7e, 0x00, //
                0x03, 0x65, 0x6e, 0x76, 0x01, 0x74, 0x04, 0x00, 0x00,
            ],
        ),
        section(3, &[0x01, 0x00]),
        // A plain funcref table and an externref table with an init
        // expression (the 0x40 0x00 form).
        section(
            4,
            &[
                0x02, //
                0x70, 0x00, 0x01, //
                0x40, 0x00, 0x6f, 0x01, 0x01, 0x02, 0xd0, 0x6f, 0x0b,
            ],
        ),
        section(5, &[0x01, 0x00, 0x01]),
        section(13, &[0x01, 0x00, 0x00]),
        // global (mut i32) = 42.
        section(6, &[0x01, 0x7f, 0x01, 0x41, 0x2a, 0x0b]),
        // exports "run" (func 0) and "mem" (memory 0).
        section(
            7,
            &[
                0x02, //
                0x03, 0x72, 0x75, 0x6e, 0x00, 0x00, //
                0x03, 0x6d, 0x65, 0x6d, 0x02, 0x00,
            ],
        ),
        section(8, &[0x00]),
        // An active funcidx segment and a passive expression segment.
        section(
            9,
            &[
                0x02, //
                0x00, 0x41, 0x00, 0x0b, 0x01, 0x01, //
                0x05, 0x70, 0x01, 0xd0, 0x70, 0x0b,
            ],
        ),
        section(12, &[0x01]),
        section(10, &[0x01, 0x02, 0x00, 0x0b]),
        // Active data segment "hi" at offset 0.
        section(
            11,
            &[0x01, 0x00, 0x41, 0x00, 0x0b, 0x02, 0x68, 0x69],
        ),
    ]
}

#[test]
fn empty_module_round_trips_to_eight_bytes() {
    let module = parse_module(ENVELOPE, &ParseOptions::default()).unwrap();
    assert!(module.types.is_empty());
    assert!(module.imports.is_empty());
    assert!(module.funcs.is_empty());
    assert!(module.exports.is_empty());
    assert!(module.custom_sections.is_empty());
    assert_eq!(module.start, None);

    let bytes = encode_module(&module).unwrap();
    assert_eq!(bytes.as_slice(), &ENVELOPE);
}

#[test]
fn identity_function_round_trips_byte_identically() {
    let bytes = module_bytes(&identity_module_sections());
    let module = parse_module(&bytes, &ParseOptions::default()).unwrap();
    assert_eq!(module.types.len(), 1);
    assert_eq!(module.types[0].parameters.as_slice(), &[ValType::I32]);
    assert_eq!(module.types[0].results.as_slice(), &[ValType::I32]);
    assert_eq!(module.exports.len(), 1);
    assert_eq!(module.exports[0].field.as_str(), "id");
    assert_eq!(module.code.len(), 1);
    assert_eq!(module.code[0].code.bytes(), &[0x20, 0x00, 0x0b]);

    let rebuilt = encode_module(&module).unwrap();
    assert_eq!(rebuilt.as_slice(), bytes.as_slice());
}

#[test]
fn kitchen_sink_round_trips_byte_identically() {
    let bytes = module_bytes(&kitchen_sink_sections());
    let module = parse_module(&bytes, &ParseOptions::default()).unwrap();
    assert_eq!(module.imports.len(), 3);
    assert_eq!(module.tables.len(), 2);
    assert!(module.tables[1].init.is_some());
    assert_eq!(module.tags.len(), 1);
    assert_eq!(module.elements.len(), 2);
    assert!(matches!(module.elements[0].init, ElementInit::Functions(_)));
    assert!(matches!(
        module.elements[1].init,
        ElementInit::Expressions(_)
    ));
    assert_eq!(module.data.len(), 1);
    assert_eq!(module.data[0].init.as_slice(), &[0x68, 0x69]);

    let rebuilt = encode_module(&module).unwrap();
    assert_eq!(rebuilt.as_slice(), bytes.as_slice());
}

#[test]
fn gc_rec_group_round_trips_byte_identically() {
    // rec { struct { (mut i32) }, func () -> (ref any) }
    let bytes = module_bytes(&[section(
        1,
        &[
            0x01, 0x4e, 0x02, //
            0x5f, 0x01, 0x7f, 0x01, //
            0x60, 0x00, 0x01, 0x64, 0x6e,
        ],
    )]);
    let module = parse_module(&bytes, &ParseOptions::default()).unwrap();
    assert_eq!(module.type_defs.len(), 1);
    assert!(matches!(&module.type_defs[0], TypeDef::Rec(subs) if subs.len() == 2));
    // The function member is mirrored into the flat sequence.
    assert_eq!(module.types.len(), 1);
    assert_eq!(module.types[0].results.len(), 1);

    let rebuilt = encode_module(&module).unwrap();
    assert_eq!(rebuilt.as_slice(), bytes.as_slice());
}

#[test]
fn custom_sections_are_preserved() {
    let mut bytes = ENVELOPE.to_vec();
    // Custom "meta" [1, 2, 3] before the type section; custom "" [] after.
    bytes.extend_from_slice(&section(
        0,
        &[0x04, 0x6d, 0x65, 0x74, 0x61, 0x01, 0x02, 0x03],
    ));
    bytes.extend_from_slice(&section(1, &[0x01, 0x60, 0x00, 0x00]));
    bytes.extend_from_slice(&section(0, &[0x00]));

    let module = parse_module(&bytes, &ParseOptions::default()).unwrap();
    assert_eq!(module.custom_sections.len(), 2);
    assert_eq!(module.custom_sections[0].name.as_str(), "meta");
    assert_eq!(&*module.custom_sections[0].bytes, &[0x01, 0x02, 0x03]);
    assert_eq!(module.custom_sections[1].name.as_str(), "");

    // Custom sections re-emit after the known sections; a second decode
    // sees the same contents.
    let rebuilt = encode_module(&module).unwrap();
    let again = parse_module(rebuilt.as_slice(), &ParseOptions::default()).unwrap();
    assert_eq!(again.custom_sections.len(), 2);
    assert_eq!(again.custom_sections[0].name.as_str(), "meta");
    assert_eq!(again.types.len(), 1);
}

#[test]
fn out_of_order_sections_fail() {
    let bytes = module_bytes(&[
        section(5, &[0x01, 0x00, 0x01]),
        section(3, &[0x01, 0x00]),
    ]);
    let err = parse_module(&bytes, &NO_VALIDATE).unwrap_err();
    assert!(matches!(
        err,
        ModuleError::Parse(ref with_context)
            if matches!(
                with_context.error,
                decode::Error::OutOfOrderSection {
                    before: SectionId::Memory,
                    after: SectionId::Function,
                }
            )
    ));
}

#[test]
fn tag_section_is_ordered_between_memory_and_global() {
    // Wire ID 13 sorts canonically at position 6: global (ID 6) may follow
    // it, but memory (ID 5) may not.
    let ok = module_bytes(&[
        section(13, &[0x00]),
        section(6, &[0x00]),
    ]);
    assert!(parse_module(&ok, &NO_VALIDATE).is_ok());

    let bad = module_bytes(&[
        section(13, &[0x00]),
        section(5, &[0x00]),
    ]);
    assert!(matches!(
        parse_module(&bad, &NO_VALIDATE).unwrap_err(),
        ModuleError::Parse(ref with_context)
            if matches!(with_context.error, decode::Error::OutOfOrderSection { .. })
    ));
}

#[test]
fn duplicate_sections_fail() {
    let bytes = module_bytes(&[
        section(3, &[0x01, 0x00]),
        section(3, &[0x01, 0x00]),
    ]);
    assert!(matches!(
        parse_module(&bytes, &NO_VALIDATE).unwrap_err(),
        ModuleError::Parse(ref with_context)
            if matches!(
                with_context.error,
                decode::Error::DuplicateSection(SectionId::Function)
            )
    ));
}

#[test]
fn data_count_mismatch_is_a_validation_error() {
    let bytes = module_bytes(&[
        section(12, &[0x02]),
        section(11, &[0x01, 0x01, 0x00]),
    ]);
    // Decoding alone succeeds.
    let module = parse_module(&bytes, &NO_VALIDATE).unwrap();
    assert_eq!(module.data_count, Some(2));
    assert_eq!(module.data.len(), 1);

    let err = validate_module(&module).unwrap_err();
    assert!(matches!(
        err,
        validate::Error::DataCountMismatch {
            declared: 2,
            actual: 1,
        }
    ));
    assert_eq!(
        format!("{err:?}"),
        "data count section declares 2 segments, but data section has 1"
    );
}

#[test]
fn shared_memory_without_max_is_a_validation_error() {
    let bytes = module_bytes(&[section(5, &[0x01, 0x02, 0x01])]);
    let module = parse_module(&bytes, &NO_VALIDATE).unwrap();
    let err = validate_module(&module).unwrap_err();
    assert_eq!(format!("{err:?}"), "shared memory must have maximum limit");
}

#[test]
fn bad_magic_and_version_fail() {
    let err = parse_module([0x00u8, 0x61, 0x73, 0x6e], &NO_VALIDATE).unwrap_err();
    assert!(matches!(
        err,
        ModuleError::Parse(ref with_context)
            if matches!(with_context.error, decode::Error::InvalidMagic(_))
    ));

    let err =
        parse_module([0x00u8, 0x61, 0x73, 0x6d, 0x02, 0x00, 0x00, 0x00], &NO_VALIDATE)
            .unwrap_err();
    assert!(matches!(
        err,
        ModuleError::Parse(ref with_context)
            if matches!(with_context.error, decode::Error::UnknownVersion(2))
    ));
}

#[test]
fn unknown_section_ids_fail() {
    let bytes = module_bytes(&[section(14, &[0x00])]);
    assert!(matches!(
        parse_module(&bytes, &NO_VALIDATE).unwrap_err(),
        ModuleError::Parse(ref with_context)
            if matches!(with_context.error, decode::Error::UnknownSection(14))
    ));
}

#[test]
fn truncation_never_panics_and_fails_inside_sections() {
    let sections = kitchen_sink_sections();
    let bytes = module_bytes(&sections);

    // Offsets at which a truncated prefix is still a whole number of
    // sections (and so decodes successfully).
    let mut boundaries = vec![ENVELOPE.len()];
    let mut offset = ENVELOPE.len();
    for section in &sections {
        offset += section.len();
        boundaries.push(offset);
    }

    for cut in 0..bytes.len() {
        let result = parse_module(&bytes[..cut], &NO_VALIDATE);
        if boundaries.contains(&cut) {
            assert!(result.is_ok(), "cut at section boundary {cut}");
        } else {
            assert!(result.is_err(), "cut at offset {cut}");
        }
    }
}

#[test]
fn decoded_expressions_can_be_re_read_as_instructions() {
    let bytes = module_bytes(&kitchen_sink_sections());
    let module = parse_module(&bytes, &ParseOptions::default()).unwrap();

    // The preserved global initializer is `i32.const 42; end`.
    let init = module.globals[0].init.bytes();
    let instructions = decode::decode_expression(init, Global).unwrap();
    assert_eq!(instructions.len(), 2);
    assert!(matches!(
        instructions[0].operands,
        lamina::types::Operands::I32(42)
    ));

    let rebuilt = lamina::encode_instructions(&instructions, Global).unwrap();
    assert_eq!(rebuilt.as_slice(), init);
}
