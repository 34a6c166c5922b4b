mod fixtures;

use fixtures::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

use evtx_map::{EvtxChunkData, EvtxParser, ParserSettings};

fn parse_chunk(chunk: Vec<u8>) -> evtx_map::EvtxChunk {
    EvtxChunkData::new(chunk, false)
        .unwrap()
        .parse(Arc::new(ParserSettings::new()))
        .unwrap()
}

#[test]
fn test_event_map_structure_and_xmlns_pruning() {
    let (record, _) = template_event_record(
        1,
        FIRST_RECORD_OFFSET,
        |w| {
            w.open_element_with_text_attribute(
                "Event",
                "xmlns",
                "http://schemas.microsoft.com/win/2004/08/events/event",
                true,
            );
            w.open_element("System", true);
            w.open_element("EventID", true);
            w.value_text("4624");
            w.end_element();
            w.open_element("Channel", true);
            w.value_text("Security");
            w.end_element();
            w.end_element();
            w.end_element();
        },
        &[],
    );
    let chunk = parse_chunk(build_chunk(&[record], 1));

    let records: Vec<_> = chunk.iter_events().map(Result::unwrap).collect();
    assert_eq!(records.len(), 1);

    let map = &records[0].data;
    assert_eq!(map.get_path("Event/xmlns"), None);
    assert_eq!(
        map.clone().into_value(),
        json!({
            "Event": {
                "System": {
                    "EventID": "4624",
                    "Channel": "Security"
                }
            }
        })
    );
}

#[test]
fn test_substitutions_resolve_against_the_value_array() {
    let (record, _) = template_event_record(
        1,
        FIRST_RECORD_OFFSET,
        |w| {
            w.open_element("Event", true);
            w.open_element("System", true);
            w.open_element("EventID", true);
            w.normal_substitution(0, 0x06);
            w.end_element();
            w.end_element();
            w.end_element();
        },
        &[(0x06, 4624_u16.to_le_bytes().to_vec())],
    );
    let chunk = parse_chunk(build_chunk(&[record], 1));

    let records: Vec<_> = chunk.iter_events().map(Result::unwrap).collect();
    assert_eq!(
        records[0].data.get_path("Event/System/EventID"),
        Some(&json!(4624))
    );
}

#[test]
fn test_shared_template_is_parsed_once() {
    let (first, template_offset) = template_event_record(
        1,
        FIRST_RECORD_OFFSET,
        |w| {
            w.open_element("Event", true);
            w.open_element("System", true);
            w.open_element("EventID", true);
            w.normal_substitution(0, 0x06);
            w.end_element();
            w.end_element();
            w.end_element();
        },
        &[(0x06, 4624_u16.to_le_bytes().to_vec())],
    );

    let second_offset = FIRST_RECORD_OFFSET + first.len() as u32;
    let second = template_ref_event_record(
        2,
        second_offset,
        template_offset,
        &[(0x06, 4625_u16.to_le_bytes().to_vec())],
    );

    let chunk = parse_chunk(build_chunk(&[first, second], 1));
    let records: Vec<_> = chunk.iter_events().map(Result::unwrap).collect();

    assert_eq!(records.len(), 2);
    // The definition was interned by the first record and reused.
    assert_eq!(chunk.template_table.len(), 1);

    let keys = |index: usize| {
        records[index]
            .data
            .get_path("Event/System")
            .and_then(|v| v.as_object())
            .map(|m| m.keys().cloned().collect::<Vec<_>>())
            .unwrap()
    };
    assert_eq!(keys(0), keys(1));

    assert_eq!(
        records[0].data.get_path("Event/System/EventID"),
        Some(&json!(4624))
    );
    assert_eq!(
        records[1].data.get_path("Event/System/EventID"),
        Some(&json!(4625))
    );
}

#[test]
fn test_entity_references_expand() {
    let (record, _) = template_event_record(
        1,
        FIRST_RECORD_OFFSET,
        |w| {
            w.open_element("Event", true);
            w.open_element("Data", true);
            w.entity_ref("amp");
            w.entity_ref("lt");
            w.entity_ref("gt");
            w.end_element();
            w.end_element();
        },
        &[],
    );
    let chunk = parse_chunk(build_chunk(&[record], 1));

    let records: Vec<_> = chunk.iter_events().map(Result::unwrap).collect();
    assert_eq!(records[0].data.get_path("Event/Data"), Some(&json!("&<>")));
}

#[test]
fn test_unknown_token_drops_the_event_but_not_its_neighbors() {
    let broken = broken_token_record(1, FIRST_RECORD_OFFSET);
    let second_offset = FIRST_RECORD_OFFSET + broken.len() as u32;
    let healthy = simple_event_record(2, second_offset, "4688");

    let chunk = parse_chunk(build_chunk(&[broken, healthy], 1));
    let results: Vec<_> = chunk.iter_events().collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_err());

    let healthy_map = results[1].as_ref().unwrap();
    assert_eq!(healthy_map.event_record_id, 2);
    assert_eq!(
        healthy_map.data.get_path("Event/System/EventID"),
        Some(&json!("4688"))
    );
}

#[test]
fn test_normal_substitution_over_a_null_slot_yields_null() {
    let (record, _) = template_event_record(
        1,
        FIRST_RECORD_OFFSET,
        |w| {
            w.open_element("Event", true);
            w.open_element("Data", true);
            w.normal_substitution(0, 0x00);
            w.end_element();
            w.end_element();
        },
        // The null slot still declares (and skips) four bytes.
        &[(0x00, vec![0, 0, 0, 0])],
    );
    let chunk = parse_chunk(build_chunk(&[record], 1));

    let records: Vec<_> = chunk.iter_events().map(Result::unwrap).collect();
    assert_eq!(
        records[0].data.get_path("Event/Data"),
        Some(&json!(null))
    );
}

#[test]
fn test_optional_substitution_over_a_null_slot_is_absent() {
    let (record, _) = template_event_record(
        1,
        FIRST_RECORD_OFFSET,
        |w| {
            w.open_element("Event", true);
            w.empty_element_with_substitution_attribute(
                "Correlation",
                "ActivityID",
                0x0e,
                0,
                0x0f,
                true,
            );
            w.end_element();
        },
        &[(0x00, Vec::new())],
    );
    let chunk = parse_chunk(build_chunk(&[record], 1));

    let records: Vec<_> = chunk.iter_events().map(Result::unwrap).collect();
    assert_eq!(
        records[0].data.clone().into_value(),
        json!({"Event": {"Correlation": {}}})
    );
}

#[test]
fn test_event_offsets_are_validated_and_bounded() {
    let first = simple_event_record(1, FIRST_RECORD_OFFSET, "1");
    let second_offset = FIRST_RECORD_OFFSET + first.len() as u32;
    let second = simple_event_record(2, second_offset, "2");

    let chunk = parse_chunk(build_chunk(&[first, second], 1));

    assert_eq!(
        chunk.event_offsets,
        vec![FIRST_RECORD_OFFSET, second_offset]
    );
    for &offset in &chunk.event_offsets {
        assert!(offset >= chunk.header.header_size);
        assert!(offset <= chunk.header.last_record_offset);
    }
}

#[test]
fn test_chunk_with_a_corrupt_record_header_is_skipped_but_others_flow() {
    // Chunk A has a record whose header magic is torn; offset discovery
    // fails and the whole chunk errors out. Chunk B is unaffected.
    let mut bad_chunk = single_event_chunk("1");
    bad_chunk[FIRST_RECORD_OFFSET as usize] = 0xff;
    let good_chunk = single_event_chunk("2");

    let file = build_file(&[bad_chunk, good_chunk], 2, 0);
    let parser = EvtxParser::from_read_seek(Cursor::new(file)).unwrap();

    let results: Vec<_> = parser.events().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_err());
    assert_eq!(
        results[1].as_ref().unwrap().data.get_path("Event/System/EventID"),
        Some(&json!("2"))
    );
}
