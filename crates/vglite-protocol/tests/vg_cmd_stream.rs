use pretty_assertions::assert_eq;
use vglite_protocol::cmd::{decode_stream, state_word};
use vglite_protocol::{regs, VgCmdDecodeError, VgCmdRecord, VgCmdStreamIter, VgCmdWriter, EVENT_END};

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[test]
fn iterates_writer_output_record_by_record() {
    let mut w = VgCmdWriter::new();
    w.state(regs::COLOR, 0xFF00_00FF)
        .states(regs::CLUT, &[1, 2, 3, 4])
        .rectangle(16, 16, 32, 32)
        .stall(7)
        .call(0x1000, 24)
        .end(EVENT_END);
    let bytes = w.finish();

    let records = decode_stream(&bytes).unwrap();
    assert_eq!(records.len(), 7);
    assert_eq!(
        records[0].register_writes().collect::<Vec<_>>(),
        vec![(regs::COLOR, 0xFF00_00FF)]
    );
    assert_eq!(
        records[1].register_writes().collect::<Vec<_>>(),
        vec![(0x0B00, 1), (0x0B01, 2), (0x0B02, 3), (0x0B03, 4)]
    );
    match records[2] {
        VgCmdRecord::Data { payload } => {
            assert_eq!(payload, &[16, 0, 16, 0, 32, 0, 32, 0]);
        }
        other => panic!("expected rectangle data, got {other:?}"),
    }
    assert_eq!(records[3], VgCmdRecord::Semaphore { module: 7 });
    assert_eq!(records[4], VgCmdRecord::Stall { module: 7 });
    assert_eq!(
        records[5],
        VgCmdRecord::Call {
            words: 3,
            address: 0x1000
        }
    );
    assert_eq!(records[6], VgCmdRecord::End { event: EVENT_END });
}

#[test]
fn rejects_stream_that_is_not_record_aligned() {
    let bytes = vec![0u8; 12];
    assert_eq!(
        VgCmdStreamIter::new(&bytes).err(),
        Some(VgCmdDecodeError::MisalignedStream { len: 12 })
    );
}

#[test]
fn rejects_unknown_opcode_and_stops() {
    let mut bytes = Vec::new();
    push_u32(&mut bytes, 0x5000_0000);
    push_u32(&mut bytes, 0);
    push_u32(&mut bytes, state_word(regs::COLOR));
    push_u32(&mut bytes, 0);

    let mut iter = VgCmdStreamIter::new(&bytes).unwrap();
    assert_eq!(
        iter.next(),
        Some(Err(VgCmdDecodeError::UnknownOpcode {
            offset: 0,
            word: 0x5000_0000
        }))
    );
    assert_eq!(iter.next(), None);
}

#[test]
fn data_record_overrunning_stream_is_an_error() {
    let mut bytes = Vec::new();
    push_u32(&mut bytes, 0x4000_0004); // DATA claiming 4 words
    push_u32(&mut bytes, 0);
    push_u32(&mut bytes, 0);
    push_u32(&mut bytes, 0);

    let err = decode_stream(&bytes).unwrap_err();
    assert_eq!(
        err,
        VgCmdDecodeError::RecordOverrunsStream {
            offset: 0,
            record_bytes: 40,
            stream_bytes: 16
        }
    );
}

#[test]
fn states_record_with_zero_count_still_occupies_one_slot() {
    let mut w = VgCmdWriter::new();
    w.states(regs::CLUT, &[]).nop();
    let bytes = w.finish();
    assert_eq!(bytes.len(), 16);

    let records = decode_stream(&bytes).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].register_writes().count(), 0);
    assert_eq!(records[1], VgCmdRecord::Nop);
}
