//! Module for parsing ISO Base Media Format aka video/mp4 streams.
//! Internal unit tests.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::registry::BoxRegistry;
use crate::{
    read_annexb, read_box_header, read_length_prefixed_nal_units, read_mp4, read_nal_unit,
    AvcDecoderConfigurationRecord, BoxHeader, BoxIter, BoxType, Error, FourCC, Mp4File, NalUnit,
    NalUnitType, OffsetReader, ParseOptions, SampleTableBox, Severity, TrackRunBox,
};
use fallible_collections::TryRead as _;
use std::convert::TryInto as _;
use std::io::Read as _;
use test_assembler::*;

fn make_box<F>(name: &[u8; 4], func: F) -> Vec<u8>
where
    F: Fn(Section) -> Section,
{
    let content = func(Section::new()).get_contents().unwrap();
    let size: u32 = (content.len() + 8).try_into().unwrap();
    Section::new()
        .B32(size)
        .append_bytes(name)
        .append_bytes(&content)
        .get_contents()
        .unwrap()
}

fn make_fullbox<F>(name: &[u8; 4], version: u8, flags: u32, func: F) -> Vec<u8>
where
    F: Fn(Section) -> Section,
{
    make_box(name, |s| {
        func(s.B8(version).B8((flags >> 16) as u8).B16(flags as u16))
    })
}

/// Nest `inner` in boxes of the given types, outermost first.
fn wrap(names: &[&[u8; 4]], inner: Vec<u8>) -> Vec<u8> {
    names
        .iter()
        .rev()
        .fold(inner, |content, name| make_box(name, |s| s.append_bytes(&content)))
}

fn in_sample_table(children: &[u8]) -> Vec<u8> {
    wrap(&[b"moov", b"trak", b"mdia", b"minf", b"stbl"], children.to_vec())
}

fn sample_table(file: &Mp4File) -> &SampleTableBox {
    let moov = file.boxes.moov.as_ref().expect("moov");
    let mdia = moov.tracks[0].mdia.as_ref().expect("mdia");
    let minf = mdia.minf.as_ref().expect("minf");
    minf.stbl.as_ref().expect("stbl")
}

fn parse(bytes: &[u8]) -> crate::Result<Mp4File> {
    read_mp4(&mut &bytes[..], &ParseOptions::default())
}

fn parse_lenient(bytes: &[u8]) -> crate::Result<Mp4File> {
    read_mp4(&mut &bytes[..], &ParseOptions::lenient())
}

fn warning_count(file: &Mp4File) -> usize {
    file.diagnostics.warnings().count()
}

/// Baseline profile record: one 4-byte SPS, one 2-byte PPS, 4-byte NAL lengths.
const AVCC_BASELINE: [u8; 17] = [
    0x01, 0x42, 0xc0, 0x1e, 0xff, 0xe1, // prologue
    0x00, 0x04, 0x67, 0x42, 0xc0, 0x1e, // SPS
    0x01, 0x00, 0x02, 0x68, 0xce, // PPS
];

fn avc1_entry(avcc: &[u8]) -> Vec<u8> {
    make_box(b"avc1", |s| {
        s.append_repeated(0, 6)
            .B16(1) // data_reference_index
            .append_repeated(0, 16)
            .B16(320)
            .B16(240)
            .B32(0x0048_0000)
            .B32(0x0048_0000)
            .B32(0)
            .B16(1) // frame_count
            .B8(4)
            .append_bytes(b"test")
            .append_repeated(0, 27)
            .B16(0x18)
            .B16(0xffff)
            .append_bytes(avcc)
    })
}

#[test]
fn read_to_end_() {
    let mut src = b"1234567890".take(5);
    let buf = src.read_into_try_vec().unwrap();
    assert_eq!(buf.len(), 5);
    assert_eq!(buf, b"12345".as_ref());
}

#[test]
fn read_to_end_oom() {
    let mut src = b"1234567890".take(std::usize::MAX.try_into().expect("usize < u64"));
    assert!(src.read_into_try_vec().is_err());
}

#[test]
fn read_box_header_short() {
    let bytes = make_box(b"test", |s| s.append_repeated(0, 4));
    let header = read_box_header(&mut &bytes[..]).unwrap();
    assert_eq!(header.name, BoxType::UnknownBox(0x7465_7374));
    assert_eq!(header.size, 12);
    assert_eq!(header.offset, 8);
    assert_eq!(header.payload_size(), Some(4));
    assert!(header.uuid.is_none());
}

#[test]
fn read_box_header_long() {
    let bytes = Section::new()
        .B32(1)
        .append_bytes(b"free")
        .B64(24)
        .append_repeated(0, 8)
        .get_contents()
        .unwrap();
    let header = read_box_header(&mut &bytes[..]).unwrap();
    assert_eq!(header.name, BoxType::FreeSpaceBox);
    assert_eq!(header.size, 24);
    assert_eq!(header.offset, 16);
    assert_eq!(header.payload_size(), Some(8));
}

#[test]
fn read_box_header_uuid() {
    let bytes = Section::new()
        .B32(28)
        .append_bytes(b"uuid")
        .append_repeated(0xaa, 16)
        .B32(0)
        .get_contents()
        .unwrap();
    let header = read_box_header(&mut &bytes[..]).unwrap();
    assert_eq!(header.name, BoxType::UuidBox);
    assert_eq!(header.offset, 24);
    assert_eq!(header.uuid, Some([0xaa; 16]));
    assert_eq!(header.payload_size(), Some(4));
}

#[test]
fn read_box_header_too_small() {
    let bytes = Section::new().B32(4).append_bytes(b"free").get_contents().unwrap();
    assert!(matches!(read_box_header(&mut &bytes[..]), Err(Error::MalformedHeader(_))));

    let bytes = Section::new()
        .B32(1)
        .append_bytes(b"free")
        .B64(12)
        .get_contents()
        .unwrap();
    assert!(matches!(read_box_header(&mut &bytes[..]), Err(Error::MalformedHeader(_))));

    let bytes = Section::new()
        .B32(20)
        .append_bytes(b"uuid")
        .append_repeated(0, 16)
        .get_contents()
        .unwrap();
    assert!(matches!(read_box_header(&mut &bytes[..]), Err(Error::MalformedHeader(_))));
}

#[test]
fn read_box_header_unknown_size() {
    let bytes = Section::new().B32(0).append_bytes(b"mdat").get_contents().unwrap();
    let header = read_box_header(&mut &bytes[..]).unwrap();
    assert!(header.extends_to_end());
    assert_eq!(header.payload_size(), None);

    // Containers may run to the end of the input too.
    let bytes = Section::new().B32(0).append_bytes(b"moov").get_contents().unwrap();
    let header = read_box_header(&mut &bytes[..]).unwrap();
    assert_eq!(header.name, BoxType::MovieBox);
    assert!(header.extends_to_end());
}

#[test]
fn box_header_bytes_rebuilt() {
    let bytes = make_box(b"free", |s| s.append_bytes(b"12345678"));
    let header = read_box_header(&mut &bytes[..]).unwrap();
    assert_eq!(header.size, 16);
    assert_eq!(header.offset, 8);

    let size: u32 = header.size.try_into().unwrap();
    let mut rebuilt = size.to_be_bytes().to_vec();
    rebuilt.extend_from_slice(&FourCC::from(header.name).value);
    assert_eq!(rebuilt, &bytes[..8]);
}

#[test]
fn moov_extends_to_end() {
    let mut bytes = make_box(b"ftyp", |s| s.append_bytes(b"isom").B32(0));
    bytes.extend(Section::new().B32(0).append_bytes(b"moov").get_contents().unwrap());
    bytes.extend(make_fullbox(b"mvhd", 0, 0, |s| {
        s.B32(0)
            .B32(0)
            .B32(600)
            .B32(1200)
            .B32(0x0001_0000)
            .B16(0x0100)
            .append_repeated(0, 70)
            .B32(2)
    }));
    let file = parse(&bytes).unwrap();
    assert_eq!(file.boxes.ftyp.as_ref().unwrap().major_brand, b"isom");
    let moov = file.boxes.moov.as_ref().expect("moov");
    assert!(moov.header.extends_to_end());
    assert_eq!(moov.mvhd.as_ref().expect("mvhd").timescale, 600);
    assert!(file.diagnostics.is_empty());
}

#[test]
fn box_iter_stops_at_boundary() {
    let mut bytes = make_box(b"free", |s| s.B32(1));
    bytes.extend(make_box(b"skip", |s| s));
    let mut src = &bytes[..];
    let mut src = OffsetReader::new(&mut src);
    let mut iter = BoxIter::new(&mut src);

    let mut first = iter.next_box().unwrap().expect("first box");
    assert_eq!(first.head.name, BoxType::FreeSpaceBox);
    assert_eq!(first.head.position, 0);
    crate::skip(&mut first, 4).unwrap();
    drop(first);

    let second = iter.next_box().unwrap().expect("second box");
    assert_eq!(second.head.name, BoxType::SkipBox);
    assert_eq!(second.head.position, 12);
    drop(second);

    assert!(iter.next_box().unwrap().is_none());
}

#[test]
fn box_iter_truncated_header() {
    let bytes = [0u8, 0, 0, 8, b'f'];
    let mut src = &bytes[..];
    let mut src = OffsetReader::new(&mut src);
    let mut iter = BoxIter::new(&mut src);
    assert!(matches!(iter.next_box(), Err(Error::TruncatedInput)));
}

#[test]
fn registry_rejects_unknown_types() {
    let registry = BoxRegistry::new().unwrap();
    let header = BoxHeader {
        name: BoxType::from(0x7a7a_7a7a_u32),
        size: 8,
        offset: 8,
        uuid: None,
        position: 0,
    };
    assert!(matches!(registry.create(&header), Err(Error::UnknownBoxType(_))));

    let header = BoxHeader {
        name: BoxType::MovieBox,
        ..header
    };
    assert!(registry.create(&header).is_ok());
}

#[test]
fn empty_input() {
    let file = parse(&[]).unwrap();
    assert!(file.boxes.ftyp.is_none());
    assert!(file.boxes.moov.is_none());
    assert!(file.boxes.free.is_empty());
    assert!(file.boxes.moof_mdat.is_empty());
    assert!(file.diagnostics.is_empty());
}

#[test]
fn truncated_input() {
    let bytes = make_box(b"free", |s| s.append_repeated(0, 8));
    assert!(matches!(parse(&bytes[..12]), Err(Error::TruncatedInput)));
    assert!(matches!(parse(&bytes[..5]), Err(Error::TruncatedInput)));
    assert!(matches!(parse_lenient(&bytes[..12]), Err(Error::TruncatedInput)));
}

#[test]
fn container_cut_short() {
    // Nothing follows the header of a 100-byte moov.
    let bytes = Section::new().B32(100).append_bytes(b"moov").get_contents().unwrap();
    assert!(matches!(parse(&bytes), Err(Error::TruncatedInput)));
    assert!(matches!(parse_lenient(&bytes), Err(Error::TruncatedInput)));

    // The input ends right after a complete child.
    let mvhd = make_fullbox(b"mvhd", 0, 0, |s| {
        s.B32(0)
            .B32(0)
            .B32(1000)
            .B32(0)
            .B32(0x0001_0000)
            .B16(0x0100)
            .append_repeated(0, 70)
            .B32(2)
    });
    let mut bytes = Section::new().B32(200).append_bytes(b"moov").get_contents().unwrap();
    bytes.extend(mvhd);
    assert!(matches!(parse(&bytes), Err(Error::TruncatedInput)));
    assert!(matches!(parse_lenient(&bytes), Err(Error::TruncatedInput)));
}

#[test]
fn empty_free_box() {
    let bytes = [0x00, 0x00, 0x00, 0x08, 0x66, 0x72, 0x65, 0x65];
    let file = parse(&bytes).unwrap();
    assert_eq!(file.boxes.free.len(), 1);
    let free = &file.boxes.free[0];
    assert_eq!(free.header.payload_size(), Some(0));
    assert!(free.data.is_empty());
    assert_eq!(warning_count(&file), 0);
}

#[test]
fn free_boxes_accumulate() {
    let mut bytes = make_box(b"free", |s| s.append_bytes(b"abc"));
    bytes.extend(make_box(b"skip", |s| s.append_bytes(b"de")));
    bytes.extend(make_box(b"free", |s| s));
    let file = parse(&bytes).unwrap();
    assert_eq!(file.boxes.free.len(), 3);
    assert_eq!(file.boxes.free[0].data, b"abc".as_ref());
    assert_eq!(file.boxes.free[1].header.name, BoxType::SkipBox);
    assert_eq!(file.boxes.free[1].data, b"de".as_ref());
    assert!(file.boxes.free[2].data.is_empty());
}

#[test]
fn free_and_skip_list() {
    let mut bytes = make_box(b"free", |s| s.append_bytes(b"abcde"));
    bytes.extend(make_box(b"skip", |s| s.append_bytes(b"xyz")));
    bytes.extend(make_box(b"free", |s| s.append_bytes(b"q")));
    let file = parse(&bytes).unwrap();
    let free = &file.boxes.free;
    assert_eq!(free.len(), 3);
    assert_eq!(free[0].header.name, BoxType::FreeSpaceBox);
    assert_eq!(free[0].data, b"abcde".as_ref());
    assert_eq!(free[1].header.name, BoxType::SkipBox);
    assert_eq!(free[1].header.position, 13);
    assert_eq!(free[1].data, b"xyz".as_ref());
    assert_eq!(free[2].header.position, 24);
    assert_eq!(free[2].data, b"q".as_ref());
    assert!(file.diagnostics.is_empty());
}

#[test]
fn unknown_box_between_known_boxes() {
    let mut bytes = make_box(b"free", |s| s.append_bytes(b"12345"));
    bytes.extend(make_box(b"zzzz", |s| s.append_bytes(b"unknown")));
    bytes.extend(make_box(b"skip", |s| s.append_bytes(b"abc")));
    assert_eq!(bytes.len(), 13 + 15 + 11);

    let file = parse(&bytes).unwrap();
    let free = &file.boxes.free;
    assert_eq!(free.len(), 2);
    assert_eq!(free[0].data, b"12345".as_ref());
    assert_eq!(free[1].header.name, BoxType::SkipBox);
    assert_eq!(free[1].header.position, 28);
    assert_eq!(free[1].data, b"abc".as_ref());

    let notes: std::vec::Vec<_> = file.diagnostics.iter().collect();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].severity, Severity::Info);
    assert_eq!(notes[0].offset, 13);
}

#[test]
fn empty_ftyp() {
    let mut bytes = make_box(b"ftyp", |s| s);
    bytes.extend(make_box(b"free", |s| s));
    let file = parse(&bytes).unwrap();
    let ftyp = file.boxes.ftyp.as_ref().expect("ftyp");
    assert_eq!(ftyp.minor_version, 0);
    assert!(ftyp.compatible_brands.is_empty());
    assert_eq!(file.boxes.free.len(), 1);
    assert_eq!(warning_count(&file), 1);
}

#[test]
fn empty_movie_header() {
    let mut children = make_box(b"mvhd", |s| s);
    children.extend(wrap(&[b"trak"], make_box(b"tkhd", |s| s)));
    let bytes = wrap(&[b"moov"], children);
    let file = parse(&bytes).unwrap();
    let moov = file.boxes.moov.as_ref().unwrap();
    let mvhd = moov.mvhd.as_ref().expect("mvhd");
    assert_eq!(mvhd.timescale, 0);
    assert_eq!(mvhd.next_track_id, 0);
    assert!(moov.tracks[0].tkhd.is_some());
    assert_eq!(warning_count(&file), 2);
}

#[test]
fn unknown_box_skipped() {
    let mut bytes = make_box(b"zzzz", |s| s.append_repeated(0xff, 13));
    bytes.extend(make_box(b"ftyp", |s| {
        s.append_bytes(b"isom").B32(0x200).append_bytes(b"isomavc1")
    }));
    let file = parse(&bytes).unwrap();
    let ftyp = file.boxes.ftyp.as_ref().expect("ftyp");
    assert_eq!(ftyp.major_brand, b"isom");
    assert_eq!(ftyp.minor_version, 0x200);
    assert_eq!(ftyp.compatible_brands.len(), 2);
    assert_eq!(ftyp.compatible_brands[1], b"avc1");

    let notes: std::vec::Vec<_> = file.diagnostics.iter().collect();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].severity, Severity::Info);
    assert_eq!(notes[0].box_type, Some(BoxType::UnknownBox(0x7a7a_7a7a)));
    assert_eq!(notes[0].offset, 0);
}

#[test]
fn unknown_box_in_container_skipped() {
    let bytes = wrap(&[b"moov"], {
        let mut children = make_box(b"udta", |s| s.append_repeated(1, 20));
        children.extend(make_fullbox(b"mvhd", 0, 0, |s| {
            s.B32(1)
                .B32(2)
                .B32(1000)
                .B32(5000)
                .B32(0x0001_0000)
                .B16(0x0100)
                .append_repeated(0, 70)
                .B32(2)
        }));
        children
    });
    let file = parse(&bytes).unwrap();
    let mvhd = file.boxes.moov.as_ref().unwrap().mvhd.as_ref().expect("mvhd");
    assert_eq!(mvhd.timescale, 1000);
    assert_eq!(mvhd.duration, 5000);
    assert_eq!(mvhd.rate, 0x0001_0000);
    assert_eq!(mvhd.next_track_id, 2);
}

#[test]
fn duplicate_ftyp_last_wins() {
    let mut bytes = make_box(b"ftyp", |s| s.append_bytes(b"isom").B32(0));
    bytes.extend(make_box(b"ftyp", |s| s.append_bytes(b"mp42").B32(1)));
    let file = parse(&bytes).unwrap();
    assert_eq!(file.boxes.ftyp.as_ref().unwrap().major_brand, b"mp42");
    assert_eq!(warning_count(&file), 1);
}

#[test]
fn moof_mdat_pairing() {
    let moof = || wrap(&[b"moof"], make_fullbox(b"mfhd", 0, 0, |s| s.B32(1)));
    let mut bytes = moof();
    bytes.extend(make_box(b"mdat", |s| s.append_bytes(b"first")));
    bytes.extend(moof());
    bytes.extend(make_box(b"mdat", |s| s.append_bytes(b"second")));
    let file = parse(&bytes).unwrap();
    assert_eq!(file.boxes.moof_mdat.len(), 2);
    for pair in file.boxes.moof_mdat.iter() {
        assert!(pair.moof.is_some());
        assert!(pair.mdat.is_some());
    }
    assert_eq!(
        file.boxes.moof_mdat[1].mdat.as_ref().unwrap().data,
        b"second".as_ref()
    );
    assert_eq!(warning_count(&file), 0);
}

#[test]
fn spurious_mdat_opens_new_pair() {
    let mut bytes = wrap(&[b"moof"], make_fullbox(b"mfhd", 0, 0, |s| s.B32(1)));
    bytes.extend(make_box(b"mdat", |s| s.append_bytes(b"first")));
    bytes.extend(make_box(b"mdat", |s| s.append_bytes(b"extra")));
    let file = parse(&bytes).unwrap();
    assert_eq!(file.boxes.moof_mdat.len(), 2);
    let first = &file.boxes.moof_mdat[0];
    assert_eq!(first.mdat.as_ref().unwrap().data, b"first".as_ref());
    let second = &file.boxes.moof_mdat[1];
    assert!(second.moof.is_none());
    assert_eq!(second.mdat.as_ref().unwrap().data, b"extra".as_ref());
    assert_eq!(warning_count(&file), 1);
}

#[test]
fn empty_mdat_replaced() {
    let mut bytes = make_box(b"mdat", |s| s);
    bytes.extend(make_box(b"mdat", |s| s.append_bytes(b"data")));
    let file = parse(&bytes).unwrap();
    assert_eq!(file.boxes.moof_mdat.len(), 1);
    let mdat = file.boxes.moof_mdat[0].mdat.as_ref().unwrap();
    assert_eq!(mdat.data, b"data".as_ref());
    assert_eq!(mdat.offset, 16);
    assert_eq!(mdat.len, 4);
}

#[test]
fn mdat_extends_to_end() {
    let mut bytes = make_box(b"ftyp", |s| s.append_bytes(b"isom").B32(0));
    bytes.extend(Section::new().B32(0).append_bytes(b"mdat").get_contents().unwrap());
    bytes.extend(std::iter::repeat(0x42).take(20_000));
    let file = parse(&bytes).unwrap();
    let mdat = file.boxes.moof_mdat[0].mdat.as_ref().unwrap();
    assert!(mdat.header.extends_to_end());
    assert_eq!(mdat.len, 20_000);
    assert_eq!(mdat.data.len(), 20_000);
    assert_eq!(mdat.offset, 24);
}

#[test]
fn mdat_without_data() {
    let bytes = make_box(b"mdat", |s| s.append_repeated(7, 100));
    let options = ParseOptions {
        keep_media_data: false,
        ..ParseOptions::default()
    };
    let file = read_mp4(&mut &bytes[..], &options).unwrap();
    let mdat = file.boxes.moof_mdat[0].mdat.as_ref().unwrap();
    assert_eq!(mdat.len, 100);
    assert_eq!(mdat.offset, 8);
    assert!(mdat.data.is_empty());
    assert!(mdat.is_valid());
}

#[test]
fn empty_stsz_tolerated() {
    let bytes = in_sample_table(&make_box(b"stsz", |s| s));
    let file = parse(&bytes).unwrap();
    let stsz = sample_table(&file).stsz.as_ref().expect("stsz");
    assert_eq!(stsz.sample_count, 0);
    assert!(stsz.entry_sizes.is_empty());
    let note = file.diagnostics.warnings().next().expect("warning");
    assert_eq!(note.box_type, Some(BoxType::SampleSizeBox));
}

#[test]
fn stsz_uniform_and_table() {
    let uniform = in_sample_table(&make_fullbox(b"stsz", 0, 0, |s| s.B32(512).B32(3)));
    let file = parse(&uniform).unwrap();
    let stsz = sample_table(&file).stsz.as_ref().unwrap();
    assert_eq!(stsz.sample_size, 512);
    assert!(stsz.entry_sizes.is_empty());
    assert_eq!(stsz.size_of(3), Some(512));
    assert_eq!(stsz.size_of(4), None);

    let table = in_sample_table(&make_fullbox(b"stsz", 0, 0, |s| {
        s.B32(0).B32(3).B32(10).B32(20).B32(30)
    }));
    let file = parse(&table).unwrap();
    let stsz = sample_table(&file).stsz.as_ref().unwrap();
    assert_eq!(stsz.entry_sizes, [10, 20, 30].as_ref());
    assert_eq!(stsz.size_of(2), Some(20));
}

#[test]
fn chunk_offsets() {
    let bytes = in_sample_table(&make_fullbox(b"stco", 0, 0, |s| s.B32(2).B32(48).B32(1000)));
    let file = parse(&bytes).unwrap();
    let stco = sample_table(&file).stco.as_ref().unwrap();
    assert_eq!(stco.chunk_offsets, [48, 1000].as_ref());

    let bytes = in_sample_table(&make_fullbox(b"co64", 0, 0, |s| s.B32(1).B64(1u64 << 33)));
    let file = parse(&bytes).unwrap();
    let co64 = sample_table(&file).stco.as_ref().unwrap();
    assert_eq!(co64.header.base.name, BoxType::ChunkLargeOffsetBox);
    assert_eq!(co64.chunk_offsets, [1u64 << 33].as_ref());
}

#[test]
fn sample_tables() {
    let mut children = make_fullbox(b"stts", 0, 0, |s| s.B32(1).B32(10).B32(3000));
    children.extend(make_fullbox(b"stss", 0, 0, |s| s.B32(2).B32(1).B32(6)));
    children.extend(make_fullbox(b"stsc", 0, 0, |s| s.B32(1).B32(1).B32(5).B32(1)));
    let file = parse(&in_sample_table(&children)).unwrap();
    let stbl = sample_table(&file);

    let stts = &stbl.stts.as_ref().unwrap().entries;
    assert_eq!(stts.len(), 1);
    assert_eq!(stts[0].sample_count, 10);
    assert_eq!(stts[0].sample_delta, 3000);
    assert_eq!(stbl.stss.as_ref().unwrap().sample_numbers, [1, 6].as_ref());
    let stsc = &stbl.stsc.as_ref().unwrap().entries;
    assert_eq!(stsc[0].samples_per_chunk, 5);
    assert_eq!(stsc[0].sample_description_index, 1);
}

#[test]
fn table_count_exceeds_payload() {
    let bytes = in_sample_table(&make_fullbox(b"stco", 0, 0, |s| s.B32(5).B32(48).B32(1000)));
    match parse(&bytes) {
        Err(Error::SizeMismatch { box_type, .. }) => {
            assert_eq!(box_type, BoxType::ChunkOffsetBox)
        }
        other => panic!("expected SizeMismatch, got {:?}", other),
    }

    let file = parse_lenient(&bytes).unwrap();
    let stco = sample_table(&file).stco.as_ref().unwrap();
    assert_eq!(stco.chunk_offsets, [48, 1000].as_ref());
    assert_eq!(warning_count(&file), 1);
}

#[test]
fn unconsumed_bytes() {
    let mut bytes = wrap(&[b"moof"], make_fullbox(b"mfhd", 0, 0, |s| s.B32(9).B16(0)));
    bytes.extend(make_box(b"free", |s| s));
    match parse(&bytes) {
        Err(Error::SizeMismatch {
            box_type,
            offset,
            declared,
            consumed,
        }) => {
            assert_eq!(box_type, BoxType::MovieFragmentHeaderBox);
            assert_eq!(offset, 8);
            assert_eq!(declared, 10);
            assert_eq!(consumed, 8);
        }
        other => panic!("expected SizeMismatch, got {:?}", other),
    }

    let file = parse_lenient(&bytes).unwrap();
    let moof = file.boxes.moof_mdat[0].moof.as_ref().unwrap();
    assert_eq!(moof.mfhd.as_ref().unwrap().sequence_number, 9);
    assert_eq!(file.boxes.free.len(), 1);
    assert_eq!(warning_count(&file), 1);
}

#[test]
fn payload_shorter_than_fields() {
    let bytes = wrap(&[b"moof"], make_box(b"mfhd", |s| s.B16(0)));
    assert!(matches!(
        parse(&bytes),
        Err(Error::SizeMismatch {
            box_type: BoxType::MovieFragmentHeaderBox,
            declared: 2,
            consumed: 3,
            ..
        })
    ));

    let file = parse_lenient(&bytes).unwrap();
    let moof = file.boxes.moof_mdat[0].moof.as_ref().unwrap();
    assert!(moof.mfhd.is_some());
    assert_eq!(warning_count(&file), 1);
}

#[test]
fn track_and_media_headers() {
    let mut mdia = make_fullbox(b"mdhd", 0, 0, |s| {
        s.B32(0).B32(0).B32(90000).B32(9000).B16(0x55c4).B16(0)
    });
    mdia.extend(make_fullbox(b"hdlr", 0, 0, |s| {
        s.B32(0)
            .append_bytes(b"vide")
            .append_repeated(0, 12)
            .append_bytes(b"VideoHandler\0")
    }));
    let mut trak = make_fullbox(b"tkhd", 0, 0x7, |s| {
        s.B32(0)
            .B32(0)
            .B32(1)
            .B32(0)
            .B32(9000)
            .append_repeated(0, 52)
            .B32(320 << 16)
            .B32(240 << 16)
    });
    trak.extend(wrap(&[b"mdia"], mdia));
    let bytes = wrap(&[b"moov", b"trak"], trak);

    let file = parse(&bytes).unwrap();
    let track = &file.boxes.moov.as_ref().unwrap().tracks[0];
    let tkhd = track.tkhd.as_ref().unwrap();
    assert_eq!(tkhd.track_id, 1);
    assert!(!tkhd.disabled);
    assert_eq!(tkhd.duration, 9000);
    assert_eq!(tkhd.width >> 16, 320);
    assert_eq!(tkhd.height >> 16, 240);

    let mdia = track.mdia.as_ref().unwrap();
    let mdhd = mdia.mdhd.as_ref().unwrap();
    assert_eq!(mdhd.timescale, 90000);
    assert_eq!(&mdhd.language, b"und");
    let hdlr = mdia.hdlr.as_ref().unwrap();
    assert_eq!(hdlr.handler_type, b"vide");
    assert_eq!(hdlr.name, b"VideoHandler".as_ref());
}

#[test]
fn media_information_children() {
    let ctts = make_fullbox(b"ctts", 1, 0, |s| {
        s.B32(2).B32(1).B32(1024).B32(1).B32(-512i32 as u32)
    });
    let url = make_fullbox(b"url ", 0, 1, |s| s);
    let dref = make_fullbox(b"dref", 0, 0, |s| s.B32(1).append_bytes(&url));
    let mut minf = make_fullbox(b"vmhd", 0, 1, |s| s.B16(0).B16(1).B16(2).B16(3));
    minf.extend(wrap(&[b"dinf"], dref));
    minf.extend(wrap(&[b"stbl"], ctts));
    let bytes = wrap(&[b"moov", b"trak", b"mdia", b"minf"], minf);

    let file = parse(&bytes).unwrap();
    assert!(file.diagnostics.is_empty());
    let mdia = file.boxes.moov.as_ref().unwrap().tracks[0].mdia.as_ref().unwrap();
    let minf = mdia.minf.as_ref().unwrap();
    let vmhd = minf.vmhd.as_ref().expect("vmhd");
    assert_eq!(vmhd.header.flags, 1);
    assert_eq!(vmhd.opcolor, [1, 2, 3]);
    assert!(minf.smhd.is_none());

    let dref = minf.dinf.as_ref().and_then(|dinf| dinf.dref.as_ref()).expect("dref");
    assert_eq!(dref.entry_count, 1);
    assert!(dref.urls[0].is_self_contained());
    assert!(dref.urls[0].location.is_empty());

    let ctts = sample_table(&file).ctts.as_ref().expect("ctts");
    assert_eq!(ctts.entries.len(), 2);
    assert_eq!(ctts.entries[0].sample_offset, 1024);
    assert_eq!(ctts.entries[1].sample_offset, -512);
}

#[test]
fn sound_header_and_external_data() {
    let url = make_fullbox(b"url ", 0, 0, |s| s.append_bytes(b"media.mp4\0"));
    let mut entries = url;
    entries.extend(make_fullbox(b"urn ", 0, 0, |s| s.append_bytes(b"x\0")));
    let dref = make_fullbox(b"dref", 0, 0, |s| s.B32(2).append_bytes(&entries));
    let mut minf = make_fullbox(b"smhd", 0, 0, |s| s.B16(0xff00).B16(0));
    minf.extend(wrap(&[b"dinf"], dref));
    let bytes = wrap(&[b"moov", b"trak", b"mdia", b"minf"], minf);

    let file = parse(&bytes).unwrap();
    let mdia = file.boxes.moov.as_ref().unwrap().tracks[0].mdia.as_ref().unwrap();
    let minf = mdia.minf.as_ref().unwrap();
    assert_eq!(minf.smhd.as_ref().expect("smhd").balance, -256);
    let dref = minf.dinf.as_ref().and_then(|dinf| dinf.dref.as_ref()).expect("dref");
    assert_eq!(dref.urls.len(), 1);
    assert!(!dref.urls[0].is_self_contained());
    assert_eq!(dref.urls[0].location, b"media.mp4".as_ref());
    // 'urn ' is skipped.
    assert_eq!(file.diagnostics.len(), 1);
    assert_eq!(warning_count(&file), 0);
}

#[test]
fn movie_header_version_1() {
    let bytes = wrap(&[b"moov"], make_fullbox(b"mvhd", 1, 0, |s| {
        s.B64(1)
            .B64(2)
            .B32(1000)
            .B64(1 << 40)
            .B32(0x0001_0000)
            .B16(0x0100)
            .append_repeated(0, 70)
            .B32(3)
    }));
    let file = parse(&bytes).unwrap();
    let mvhd = file.boxes.moov.as_ref().unwrap().mvhd.as_ref().unwrap();
    assert_eq!(mvhd.header.version, 1);
    assert_eq!(mvhd.duration, 1 << 40);
    assert_eq!(mvhd.next_track_id, 3);
}

#[test]
fn avcc_record() {
    let (record, consumed) = AvcDecoderConfigurationRecord::parse(&AVCC_BASELINE).unwrap();
    assert_eq!(consumed, 17);
    assert_eq!(record.configuration_version, 1);
    assert_eq!(record.avc_profile_indication, 0x42);
    assert_eq!(record.avc_level_indication, 0x1e);
    assert_eq!(record.length_size(), 4);
    assert_eq!(record.sequence_parameter_sets.len(), 1);
    let sps = &record.sequence_parameter_sets[0];
    assert_eq!(sps.length, 4);
    assert_eq!(sps.nal_unit.nal_unit_type, NalUnitType::SequenceParameterSet);
    assert_eq!(sps.nal_unit.nal_ref_idc, 3);
    assert_eq!(sps.nal_unit.payload, [0x42, 0xc0, 0x1e].as_ref());
    assert_eq!(record.picture_parameter_sets.len(), 1);
    let pps = &record.picture_parameter_sets[0];
    assert_eq!(pps.nal_unit.nal_unit_type, NalUnitType::PictureParameterSet);
    assert_eq!(pps.nal_unit.payload.len(), usize::from(pps.length) - 1);
    assert!(record.profile_extension.is_none());
    assert_eq!(record.parameter_sets().count(), 2);
}

#[test]
fn avcc_high_profile() {
    let mut data = AVCC_BASELINE.to_vec();
    data[1] = 100;
    // Without the trailing fields the record still parses.
    let (record, consumed) = AvcDecoderConfigurationRecord::parse(&data).unwrap();
    assert_eq!(consumed, 17);
    assert!(record.profile_extension.is_none());

    data.extend_from_slice(&[0xfd, 0xf8, 0xf9, 0x01, 0x00, 0x02, 0x6d, 0x01]);
    let (record, consumed) = AvcDecoderConfigurationRecord::parse(&data).unwrap();
    assert_eq!(consumed, 25);
    let ext = record.profile_extension.as_ref().expect("high profile fields");
    assert_eq!(ext.chroma_format, 1);
    assert_eq!(ext.bit_depth_luma_minus8, 0);
    assert_eq!(ext.bit_depth_chroma_minus8, 1);
    assert_eq!(ext.sequence_parameter_set_exts.len(), 1);
    assert_eq!(
        ext.sequence_parameter_set_exts[0].nal_unit.nal_unit_type,
        NalUnitType::SequenceParameterSetExtension
    );
    assert_eq!(record.parameter_sets().count(), 3);
}

#[test]
fn avcc_longer_parameter_sets() {
    let data = [
        0x01, 0x42, 0xc0, 0x1e, 0xff, 0xe1, // prologue
        0x00, 0x07, 0x67, 0x42, 0xc0, 0x1e, 0xaa, 0xbb, 0xcc, // SPS
        0x01, 0x00, 0x04, 0x68, 0xce, 0x3c, 0x80, // PPS
    ];
    let (record, consumed) = AvcDecoderConfigurationRecord::parse(&data).unwrap();
    assert_eq!(consumed, 22);
    let sps = &record.sequence_parameter_sets[0];
    assert_eq!(sps.length, 7);
    assert_eq!(sps.nal_unit.payload, [0x42, 0xc0, 0x1e, 0xaa, 0xbb, 0xcc].as_ref());
    let pps = &record.picture_parameter_sets[0];
    assert_eq!(pps.length, 4);
    assert_eq!(pps.nal_unit.nal_unit_type, NalUnitType::PictureParameterSet);
    assert_eq!(pps.nal_unit.payload, [0xce, 0x3c, 0x80].as_ref());
}

#[test]
fn avcc_high_profile_cut_short() {
    let mut data = AVCC_BASELINE.to_vec();
    data[1] = 100;
    // Only two of the four fixed extension bytes.
    data.extend_from_slice(&[0xfd, 0xf8]);
    let (record, consumed) = AvcDecoderConfigurationRecord::parse(&data).unwrap();
    assert_eq!(consumed, 17);
    assert!(record.profile_extension.is_none());
    assert_eq!(record.sequence_parameter_sets.len(), 1);

    // The SPS extension is a byte short.
    data.extend_from_slice(&[0xf9, 0x01, 0x00, 0x02, 0x6d]);
    let (record, consumed) = AvcDecoderConfigurationRecord::parse(&data).unwrap();
    assert_eq!(consumed, 17);
    assert!(record.profile_extension.is_none());

    let avcc = make_box(b"avcC", |s| s.append_bytes(&data));
    let stsd = make_fullbox(b"stsd", 0, 0, |s| s.B32(1).append_bytes(&avc1_entry(&avcc)));
    let bytes = in_sample_table(&stsd);
    assert!(matches!(
        parse(&bytes),
        Err(Error::SizeMismatch {
            box_type: BoxType::AVCConfigurationBox,
            declared: 24,
            consumed: 17,
            ..
        })
    ));
    let file = parse_lenient(&bytes).unwrap();
    let config = file.boxes.avc_configs().next().expect("avcC kept");
    assert_eq!(config.sequence_parameter_sets.len(), 1);
    assert_eq!(config.picture_parameter_sets.len(), 1);
    assert!(config.profile_extension.is_none());
    assert_eq!(warning_count(&file), 1);
}

#[test]
fn avcc_truncated_parameter_set() {
    assert!(matches!(
        AvcDecoderConfigurationRecord::parse(&AVCC_BASELINE[..10]),
        Err(Error::TruncatedInput)
    ));
    let mut data = AVCC_BASELINE;
    data[7] = 0; // zero-length SPS
    assert!(matches!(
        AvcDecoderConfigurationRecord::parse(&data),
        Err(Error::InvalidData(_))
    ));
}

#[test]
fn avc_sample_entry() {
    let avcc = make_box(b"avcC", |s| s.append_bytes(&AVCC_BASELINE));
    let stsd = make_fullbox(b"stsd", 0, 0, |s| s.B32(1).append_bytes(&avc1_entry(&avcc)));
    let file = parse(&in_sample_table(&stsd)).unwrap();
    let stsd = sample_table(&file).stsd.as_ref().unwrap();
    assert_eq!(stsd.entry_count, 1);
    let entry = &stsd.avc_entries[0];
    assert_eq!(entry.data_reference_index, 1);
    assert_eq!(entry.width, 320);
    assert_eq!(entry.height, 240);
    assert_eq!(&entry.compressor_name[..], b"test");
    assert_eq!(entry.depth, 0x18);

    let configs: std::vec::Vec<_> = file.boxes.avc_configs().collect();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].length_size(), 4);
    assert_eq!(file.diagnostics.len(), 0);
}

#[test]
fn avcc_trailing_bytes() {
    let avcc = make_box(b"avcC", |s| s.append_bytes(&AVCC_BASELINE).B16(0));
    let stsd = make_fullbox(b"stsd", 0, 0, |s| s.B32(1).append_bytes(&avc1_entry(&avcc)));
    let bytes = in_sample_table(&stsd);
    assert!(matches!(
        parse(&bytes),
        Err(Error::SizeMismatch {
            box_type: BoxType::AVCConfigurationBox,
            declared: 19,
            consumed: 17,
            ..
        })
    ));
    let file = parse_lenient(&bytes).unwrap();
    assert_eq!(file.boxes.avc_configs().count(), 1);
    assert_eq!(warning_count(&file), 1);
}

#[test]
fn avcc_forbidden_bit() {
    let mut record = AVCC_BASELINE;
    record[8] |= 0x80;
    let avcc = make_box(b"avcC", |s| s.append_bytes(&record));
    let stsd = make_fullbox(b"stsd", 0, 0, |s| s.B32(1).append_bytes(&avc1_entry(&avcc)));
    let bytes = in_sample_table(&stsd);
    assert!(matches!(parse(&bytes), Err(Error::InvalidData(_))));

    let file = parse_lenient(&bytes).unwrap();
    let config = file.boxes.avc_configs().next().expect("avcC kept");
    assert!(config.sequence_parameter_sets[0].nal_unit.forbidden_zero_bit);
    assert_eq!(warning_count(&file), 1);
}

#[test]
fn fragment_fields() {
    let flags = TrackRunBox::DATA_OFFSET_PRESENT
        | TrackRunBox::SAMPLE_DURATION_PRESENT
        | TrackRunBox::SAMPLE_SIZE_PRESENT
        | TrackRunBox::SAMPLE_COMPOSITION_TIME_OFFSETS_PRESENT;
    let mut traf = make_fullbox(b"tfhd", 0, 0x02_0028, |s| s.B32(1).B32(1000).B32(0x0101_0000));
    traf.extend(make_fullbox(b"tfdt", 1, 0, |s| s.B64(900_000)));
    traf.extend(make_fullbox(b"trun", 1, flags, |s| {
        s.B32(2)
            .B32(112)
            .B32(1000)
            .B32(500)
            .B32(-100i32 as u32)
            .B32(1000)
            .B32(300)
            .B32(200)
    }));
    let mut moof = make_fullbox(b"mfhd", 0, 0, |s| s.B32(7));
    moof.extend(wrap(&[b"traf"], traf));
    let bytes = wrap(&[b"moof"], moof);

    let file = parse(&bytes).unwrap();
    let moof = file.boxes.moof_mdat[0].moof.as_ref().unwrap();
    assert_eq!(moof.mfhd.as_ref().unwrap().sequence_number, 7);
    let traf = &moof.track_fragments[0];

    let tfhd = traf.tfhd.as_ref().unwrap();
    assert_eq!(tfhd.track_id, 1);
    assert!(tfhd.default_base_is_moof());
    assert_eq!(tfhd.base_data_offset, None);
    assert_eq!(tfhd.default_sample_duration, Some(1000));
    assert_eq!(tfhd.default_sample_size, None);
    assert_eq!(tfhd.default_sample_flags, Some(0x0101_0000));

    assert_eq!(traf.tfdt.as_ref().unwrap().base_media_decode_time, 900_000);

    let trun = &traf.track_runs[0];
    assert_eq!(trun.sample_count, 2);
    assert_eq!(trun.data_offset, Some(112));
    assert_eq!(trun.first_sample_flags, None);
    assert_eq!(trun.samples.len(), 2);
    assert_eq!(trun.samples[0].size, Some(500));
    assert_eq!(trun.samples[0].flags, None);
    assert_eq!(trun.samples[0].composition_time_offset, Some(-100));
    assert_eq!(trun.samples[1].composition_time_offset, Some(200));
}

#[test]
fn nal_unit_header() {
    let (unit, consumed) = read_nal_unit(&mut &[0x65u8, 0x88, 0x84, 0x21][..], 4).unwrap();
    assert_eq!(consumed, 4);
    assert!(!unit.forbidden_zero_bit);
    assert_eq!(unit.nal_ref_idc, 3);
    assert_eq!(unit.nal_unit_type, NalUnitType::IdrSlice);
    assert!(unit.nal_unit_type.is_vcl());
    assert_eq!(unit.payload, [0x88, 0x84, 0x21].as_ref());

    let unit = NalUnit::parse(&[0x86]).unwrap();
    assert!(unit.forbidden_zero_bit);
    assert_eq!(unit.nal_ref_idc, 0);
    assert_eq!(unit.nal_unit_type, NalUnitType::SupplementalEnhancementInformation);
    assert!(unit.payload.is_empty());
}

#[test]
fn nal_unit_bad_length() {
    assert!(matches!(NalUnit::parse(&[]), Err(Error::InvalidData(_))));
    assert!(matches!(
        read_nal_unit(&mut &[0x67u8, 0x42][..], 4),
        Err(Error::TruncatedInput)
    ));
}

#[test]
fn nal_unit_types() {
    for t in 0..32u8 {
        assert_eq!(u8::from(NalUnitType::from(t)), t);
    }
    assert_eq!(NalUnitType::from(0u8), NalUnitType::Unspecified(0));
    assert_eq!(NalUnitType::from(18u8), NalUnitType::Reserved(18));
    assert_eq!(NalUnitType::from(30u8), NalUnitType::Unspecified(30));
    assert!(NalUnitType::PictureParameterSet.is_parameter_set());
    assert!(!NalUnitType::AccessUnitDelimiter.is_vcl());
    assert_eq!(
        NalUnitType::SequenceParameterSet.to_string(),
        "7 (sequence parameter set)"
    );
}

#[test]
fn length_prefixed_units() {
    let data = [0, 0, 0, 2, 0x09, 0xf0, 0, 0, 0, 3, 0x65, 0x88, 0x80];
    let units = read_length_prefixed_nal_units(&data, 4).unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].nal_unit_type, NalUnitType::AccessUnitDelimiter);
    assert_eq!(units[1].payload, [0x88, 0x80].as_ref());

    let data = [1, 0x68, 2, 0x65, 0x88];
    let units = read_length_prefixed_nal_units(&data, 1).unwrap();
    assert_eq!(units.len(), 2);

    assert!(matches!(
        read_length_prefixed_nal_units(&data, 3),
        Err(Error::InvalidData(_))
    ));
    assert!(matches!(
        read_length_prefixed_nal_units(&[0, 9, 0x65], 2),
        Err(Error::TruncatedInput)
    ));
}

#[test]
fn mdat_nal_units() {
    let bytes = make_box(b"mdat", |s| s.B16(2).B8(0x09).B8(0xf0).B16(1).B8(0x0c));
    let file = parse(&bytes).unwrap();
    let mdat = file.boxes.moof_mdat[0].mdat.as_ref().unwrap();
    let units = mdat.nal_units(2).unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[1].nal_unit_type, NalUnitType::FillerData);
}

#[test]
fn annexb_start_codes() {
    let data = [
        0, 0, 0, 1, 0x67, 0x42, // SPS, four byte start code
        0, 0, 0, 1, 0x68, 0xce, // PPS
        0, 0, 1, 0x65, 0x88, 0x84, 0, 0, // IDR, three byte start code and trailing zeros
    ];
    let stream = read_annexb(&mut &data[..], &ParseOptions::default()).unwrap();
    let types: std::vec::Vec<_> = stream.nal_units.iter().map(|u| u.nal_unit_type).collect();
    assert_eq!(
        types,
        [
            NalUnitType::SequenceParameterSet,
            NalUnitType::PictureParameterSet,
            NalUnitType::IdrSlice
        ]
    );
    assert_eq!(stream.nal_units[0].payload, [0x42].as_ref());
    assert_eq!(stream.nal_units[2].payload, [0x88, 0x84].as_ref());
    assert!(stream.diagnostics.is_empty());
}

#[test]
fn annexb_leading_garbage() {
    let data = [0xff, 0xfe, 0, 0, 1, 0x09, 0xf0, 0, 0, 1, 0, 0, 1, 0x0c, 0xff];
    let stream = read_annexb(&mut &data[..], &ParseOptions::default()).unwrap();
    assert_eq!(stream.nal_units.len(), 2);
    assert_eq!(stream.diagnostics.warnings().count(), 2);

    let stream = read_annexb(&mut &b""[..], &ParseOptions::default()).unwrap();
    assert!(stream.nal_units.is_empty());
    assert!(stream.diagnostics.is_empty());
}

#[test]
fn annexb_forbidden_bit() {
    let data = [0, 0, 1, 0xe7, 0x01];
    assert!(matches!(
        read_annexb(&mut &data[..], &ParseOptions::default()),
        Err(Error::InvalidData(_))
    ));

    let stream = read_annexb(&mut &data[..], &ParseOptions::lenient()).unwrap();
    assert_eq!(stream.nal_units.len(), 1);
    assert!(stream.nal_units[0].forbidden_zero_bit);
    let note = stream.diagnostics.iter().next().unwrap();
    assert_eq!(note.severity, Severity::Warning);
    assert_eq!(note.offset, 3);
    assert!(note.box_type.is_none());
}
