// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::avc::AvcSampleEntry;
use crate::registry::Mp4Box;
use crate::{
    be_i16, be_i32, be_u16, be_u32, be_u64, empty_payload, foreign_slot, occupied, place_nth,
    place_single, read_payload, read_sub_boxes, skip, slot_at, table_len, BMFFBox, BoxContainer,
    BoxHeader, BoxSlot, BoxType, Error, FourCC, FullBoxHeader, Offset, ParseBox, ParseContext,
    Result, ToUsize, TryVec,
};
use bitreader::BitReader;
use std::io::Read;

/// Movie box 'moov'.
/// See ISO 14496-12:2015 § 8.2.1
#[derive(Debug)]
pub struct MovieBox {
    pub header: BoxHeader,
    pub mvhd: Option<MovieHeaderBox>,
    pub tracks: TryVec<TrackBox>,
}

impl ParseBox for MovieBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            mvhd: None,
            tracks: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        read_sub_boxes(src, self, ctx)
    }
}

impl BoxContainer for MovieBox {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::MovieHeader(mvhd) => place_single(&mut self.mvhd, mvhd, header, ctx),
            Mp4Box::Track(trak) => place_nth(&mut self.tracks, trak, header),
            _ => Err(Error::UnknownBoxType(header.name)),
        }
    }

    fn parse_sub_box<T: Read + Offset>(
        &mut self,
        slot: BoxSlot,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        match slot.name {
            BoxType::MovieHeaderBox => occupied(&mut self.mvhd)?.parse_payload(src, ctx),
            BoxType::TrackBox => slot_at(&mut self.tracks, slot.index)?.parse_payload(src, ctx),
            _ => Err(foreign_slot()),
        }
    }
}

/// Movie header box 'mvhd'.
/// See ISO 14496-12:2015 § 8.2.2
#[derive(Debug)]
pub struct MovieHeaderBox {
    pub header: FullBoxHeader,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// Fixed point 16.16
    pub rate: u32,
    /// Fixed point 8.8
    pub volume: u16,
    pub next_track_id: u32,
}

impl ParseBox for MovieHeaderBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            creation_time: 0,
            modification_time: 0,
            timescale: 0,
            duration: 0,
            rate: 0,
            volume: 0,
            next_track_id: 0,
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        match self.header.version {
            1 => {
                self.creation_time = be_u64(src)?;
                self.modification_time = be_u64(src)?;
                self.timescale = be_u32(src)?;
                self.duration = be_u64(src)?;
            }
            0 => {
                self.creation_time = u64::from(be_u32(src)?);
                self.modification_time = u64::from(be_u32(src)?);
                self.timescale = be_u32(src)?;
                self.duration = u64::from(be_u32(src)?);
            }
            _ => return Err(Error::Unsupported("unhandled mvhd version")),
        }
        self.rate = be_u32(src)?;
        self.volume = be_u16(src)?;
        // Skip reserved, matrix and pre_defined fields.
        skip(src, 70)?;
        self.next_track_id = be_u32(src)?;
        Ok(())
    }
}

/// Track box 'trak'.
/// See ISO 14496-12:2015 § 8.3.1
#[derive(Debug)]
pub struct TrackBox {
    pub header: BoxHeader,
    pub tkhd: Option<TrackHeaderBox>,
    pub mdia: Option<MediaBox>,
}

impl ParseBox for TrackBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            tkhd: None,
            mdia: None,
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        read_sub_boxes(src, self, ctx)
    }
}

impl BoxContainer for TrackBox {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::TrackHeader(tkhd) => place_single(&mut self.tkhd, tkhd, header, ctx),
            Mp4Box::Media(mdia) => place_single(&mut self.mdia, mdia, header, ctx),
            _ => Err(Error::UnknownBoxType(header.name)),
        }
    }

    fn parse_sub_box<T: Read + Offset>(
        &mut self,
        slot: BoxSlot,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        match slot.name {
            BoxType::TrackHeaderBox => occupied(&mut self.tkhd)?.parse_payload(src, ctx),
            BoxType::MediaBox => occupied(&mut self.mdia)?.parse_payload(src, ctx),
            _ => Err(foreign_slot()),
        }
    }
}

/// Track header box 'tkhd'
/// See ISO 14496-12:2015 § 8.3.2
#[derive(Debug)]
pub struct TrackHeaderBox {
    pub header: FullBoxHeader,
    pub track_id: u32,
    pub disabled: bool,
    pub duration: u64,
    /// Fixed point 16.16
    pub width: u32,
    /// Fixed point 16.16
    pub height: u32,
}

impl ParseBox for TrackHeaderBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            track_id: 0,
            disabled: false,
            duration: 0,
            width: 0,
            height: 0,
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        self.disabled = self.header.flags & 0x1 == 0;
        match self.header.version {
            1 => {
                // Skip creation_time and modification_time.
                skip(src, 16)?;
                self.track_id = be_u32(src)?;
                skip(src, 4)?;
                self.duration = be_u64(src)?;
            }
            0 => {
                skip(src, 8)?;
                self.track_id = be_u32(src)?;
                skip(src, 4)?;
                self.duration = u64::from(be_u32(src)?);
            }
            _ => return Err(Error::Unsupported("unhandled tkhd version")),
        }
        // Skip uninteresting fields.
        skip(src, 52)?;
        self.width = be_u32(src)?;
        self.height = be_u32(src)?;
        Ok(())
    }
}

/// Media box 'mdia'.
/// See ISO 14496-12:2015 § 8.4.1
#[derive(Debug)]
pub struct MediaBox {
    pub header: BoxHeader,
    pub mdhd: Option<MediaHeaderBox>,
    pub hdlr: Option<HandlerBox>,
    pub minf: Option<MediaInformationBox>,
}

impl ParseBox for MediaBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            mdhd: None,
            hdlr: None,
            minf: None,
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        read_sub_boxes(src, self, ctx)
    }
}

impl BoxContainer for MediaBox {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::MediaHeader(mdhd) => place_single(&mut self.mdhd, mdhd, header, ctx),
            Mp4Box::Handler(hdlr) => place_single(&mut self.hdlr, hdlr, header, ctx),
            Mp4Box::MediaInformation(minf) => place_single(&mut self.minf, minf, header, ctx),
            _ => Err(Error::UnknownBoxType(header.name)),
        }
    }

    fn parse_sub_box<T: Read + Offset>(
        &mut self,
        slot: BoxSlot,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        match slot.name {
            BoxType::MediaHeaderBox => occupied(&mut self.mdhd)?.parse_payload(src, ctx),
            BoxType::HandlerBox => occupied(&mut self.hdlr)?.parse_payload(src, ctx),
            BoxType::MediaInformationBox => occupied(&mut self.minf)?.parse_payload(src, ctx),
            _ => Err(foreign_slot()),
        }
    }
}

/// Media header box 'mdhd'.
/// See ISO 14496-12:2015 § 8.4.2
#[derive(Debug)]
pub struct MediaHeaderBox {
    pub header: FullBoxHeader,
    pub timescale: u32,
    pub duration: u64,
    /// ISO 639-2/T language code.
    pub language: [u8; 3],
}

impl ParseBox for MediaHeaderBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            timescale: 0,
            duration: 0,
            language: [0; 3],
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        match self.header.version {
            1 => {
                skip(src, 16)?;
                self.timescale = be_u32(src)?;
                self.duration = be_u64(src)?;
            }
            0 => {
                skip(src, 8)?;
                self.timescale = be_u32(src)?;
                self.duration = u64::from(be_u32(src)?);
            }
            _ => return Err(Error::Unsupported("unhandled mdhd version")),
        }
        let packed = be_u16(src)?.to_be_bytes();
        let mut bits = BitReader::new(&packed);
        let _pad = bits.read_u8(1)?;
        for letter in &mut self.language {
            *letter = bits.read_u8(5)? + 0x60;
        }
        // pre_defined
        skip(src, 2)?;
        Ok(())
    }
}

/// Handler reference box 'hdlr'.
/// See ISO 14496-12:2015 § 8.4.3
#[derive(Debug)]
pub struct HandlerBox {
    pub header: FullBoxHeader,
    pub handler_type: FourCC,
    /// Human-readable track type, without the terminating zero.
    pub name: TryVec<u8>,
}

impl ParseBox for HandlerBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            handler_type: FourCC::default(),
            name: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        // Skip pre_defined.
        skip(src, 4)?;
        self.handler_type = From::from(be_u32(src)?);
        // Skip reserved.
        skip(src, 12)?;
        let raw = read_payload(src)?;
        // Some writers omit the terminator, some pad with several.
        let end = raw[..].iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
        let mut name = TryVec::with_capacity(end)?;
        name.extend_from_slice(&raw[..end])?;
        self.name = name;
        Ok(())
    }
}

/// Media information box 'minf'.
/// See ISO 14496-12:2015 § 8.4.4
#[derive(Debug)]
pub struct MediaInformationBox {
    pub header: BoxHeader,
    pub vmhd: Option<VideoMediaHeaderBox>,
    pub smhd: Option<SoundMediaHeaderBox>,
    pub dinf: Option<DataInformationBox>,
    pub stbl: Option<SampleTableBox>,
}

impl ParseBox for MediaInformationBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            vmhd: None,
            smhd: None,
            dinf: None,
            stbl: None,
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        read_sub_boxes(src, self, ctx)
    }
}

impl BoxContainer for MediaInformationBox {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::VideoMediaHeader(vmhd) => place_single(&mut self.vmhd, vmhd, header, ctx),
            Mp4Box::SoundMediaHeader(smhd) => place_single(&mut self.smhd, smhd, header, ctx),
            Mp4Box::DataInformation(dinf) => place_single(&mut self.dinf, dinf, header, ctx),
            Mp4Box::SampleTable(stbl) => place_single(&mut self.stbl, stbl, header, ctx),
            _ => Err(Error::UnknownBoxType(header.name)),
        }
    }

    fn parse_sub_box<T: Read + Offset>(
        &mut self,
        slot: BoxSlot,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        match slot.name {
            BoxType::VideoMediaHeaderBox => occupied(&mut self.vmhd)?.parse_payload(src, ctx),
            BoxType::SoundMediaHeaderBox => occupied(&mut self.smhd)?.parse_payload(src, ctx),
            BoxType::DataInformationBox => occupied(&mut self.dinf)?.parse_payload(src, ctx),
            BoxType::SampleTableBox => occupied(&mut self.stbl)?.parse_payload(src, ctx),
            _ => Err(foreign_slot()),
        }
    }
}

/// Video media header box 'vmhd'.
/// See ISO 14496-12:2015 § 12.1.2
#[derive(Debug)]
pub struct VideoMediaHeaderBox {
    pub header: FullBoxHeader,
    pub graphics_mode: u16,
    /// Red, green and blue.
    pub opcolor: [u16; 3],
}

impl ParseBox for VideoMediaHeaderBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            graphics_mode: 0,
            opcolor: [0; 3],
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        self.graphics_mode = be_u16(src)?;
        for component in &mut self.opcolor {
            *component = be_u16(src)?;
        }
        Ok(())
    }
}

/// Sound media header box 'smhd'.
/// See ISO 14496-12:2015 § 12.2.2
#[derive(Debug)]
pub struct SoundMediaHeaderBox {
    pub header: FullBoxHeader,
    /// Fixed point 8.8, zero is centre.
    pub balance: i16,
}

impl ParseBox for SoundMediaHeaderBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            balance: 0,
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        self.balance = be_i16(src)?;
        // reserved
        skip(src, 2)?;
        Ok(())
    }
}

/// Data information box 'dinf'.
/// See ISO 14496-12:2015 § 8.7.1
#[derive(Debug)]
pub struct DataInformationBox {
    pub header: BoxHeader,
    pub dref: Option<DataReferenceBox>,
}

impl ParseBox for DataInformationBox {
    fn new(header: BoxHeader) -> Self {
        Self { header, dref: None }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        read_sub_boxes(src, self, ctx)
    }
}

impl BoxContainer for DataInformationBox {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::DataReference(dref) => place_single(&mut self.dref, dref, header, ctx),
            _ => Err(Error::UnknownBoxType(header.name)),
        }
    }

    fn parse_sub_box<T: Read + Offset>(
        &mut self,
        slot: BoxSlot,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        match slot.name {
            BoxType::DataReferenceBox => occupied(&mut self.dref)?.parse_payload(src, ctx),
            _ => Err(foreign_slot()),
        }
    }
}

/// Data reference box 'dref'. Only 'url ' entries are kept; 'urn ' entries are skipped.
/// See ISO 14496-12:2015 § 8.7.2
#[derive(Debug)]
pub struct DataReferenceBox {
    pub header: FullBoxHeader,
    pub entry_count: u32,
    pub urls: TryVec<DataEntryUrlBox>,
}

impl ParseBox for DataReferenceBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            entry_count: 0,
            urls: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        self.header.read_version_flags(src)?;
        self.entry_count = be_u32(src)?;
        read_sub_boxes(src, self, ctx)
    }
}

impl BoxContainer for DataReferenceBox {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::DataEntryUrl(url) => place_nth(&mut self.urls, url, header),
            _ => Err(Error::UnknownBoxType(header.name)),
        }
    }

    fn parse_sub_box<T: Read + Offset>(
        &mut self,
        slot: BoxSlot,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        match slot.name {
            BoxType::DataEntryUrlBox => {
                slot_at(&mut self.urls, slot.index)?.parse_payload(src, ctx)
            }
            _ => Err(foreign_slot()),
        }
    }
}

/// Data entry box 'url '.
/// See ISO 14496-12:2015 § 8.7.2
#[derive(Debug)]
pub struct DataEntryUrlBox {
    pub header: FullBoxHeader,
    /// Where the media lives, without the terminating zero. Empty for self-contained media.
    pub location: TryVec<u8>,
}

impl DataEntryUrlBox {
    const SELF_CONTAINED: u32 = 0x1;

    /// The media data is in the same file as this box.
    pub fn is_self_contained(&self) -> bool {
        self.header.flags & Self::SELF_CONTAINED != 0
    }
}

impl ParseBox for DataEntryUrlBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            location: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        let raw = read_payload(src)?;
        let end = raw[..].iter().position(|&b| b == 0).unwrap_or(raw.len());
        let mut location = TryVec::with_capacity(end)?;
        location.extend_from_slice(&raw[..end])?;
        self.location = location;
        Ok(())
    }
}

/// Sample table box 'stbl'.
/// See ISO 14496-12:2015 § 8.5.1
#[derive(Debug)]
pub struct SampleTableBox {
    pub header: BoxHeader,
    pub stsd: Option<SampleDescriptionBox>,
    pub stts: Option<TimeToSampleBox>,
    pub ctts: Option<CompositionOffsetBox>,
    pub stss: Option<SyncSampleBox>,
    pub stsc: Option<SampleToChunkBox>,
    pub stsz: Option<SampleSizeBox>,
    /// Either 'stco' or 'co64'.
    pub stco: Option<ChunkOffsetBox>,
}

impl ParseBox for SampleTableBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            stsd: None,
            stts: None,
            ctts: None,
            stss: None,
            stsc: None,
            stsz: None,
            stco: None,
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        read_sub_boxes(src, self, ctx)
    }
}

impl BoxContainer for SampleTableBox {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::SampleDescription(stsd) => place_single(&mut self.stsd, stsd, header, ctx),
            Mp4Box::TimeToSample(stts) => place_single(&mut self.stts, stts, header, ctx),
            Mp4Box::CompositionOffset(ctts) => place_single(&mut self.ctts, ctts, header, ctx),
            Mp4Box::SyncSample(stss) => place_single(&mut self.stss, stss, header, ctx),
            Mp4Box::SampleToChunk(stsc) => place_single(&mut self.stsc, stsc, header, ctx),
            Mp4Box::SampleSize(stsz) => place_single(&mut self.stsz, stsz, header, ctx),
            Mp4Box::ChunkOffset(stco) => place_single(&mut self.stco, stco, header, ctx),
            _ => Err(Error::UnknownBoxType(header.name)),
        }
    }

    fn parse_sub_box<T: Read + Offset>(
        &mut self,
        slot: BoxSlot,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        match slot.name {
            BoxType::SampleDescriptionBox => occupied(&mut self.stsd)?.parse_payload(src, ctx),
            BoxType::TimeToSampleBox => occupied(&mut self.stts)?.parse_payload(src, ctx),
            BoxType::CompositionOffsetBox => occupied(&mut self.ctts)?.parse_payload(src, ctx),
            BoxType::SyncSampleBox => occupied(&mut self.stss)?.parse_payload(src, ctx),
            BoxType::SampleToChunkBox => occupied(&mut self.stsc)?.parse_payload(src, ctx),
            BoxType::SampleSizeBox => occupied(&mut self.stsz)?.parse_payload(src, ctx),
            BoxType::ChunkOffsetBox | BoxType::ChunkLargeOffsetBox => {
                occupied(&mut self.stco)?.parse_payload(src, ctx)
            }
            _ => Err(foreign_slot()),
        }
    }
}

/// Sample description box 'stsd'. Only AVC sample entries are kept.
/// See ISO 14496-12:2015 § 8.5.2
#[derive(Debug)]
pub struct SampleDescriptionBox {
    pub header: FullBoxHeader,
    pub entry_count: u32,
    pub avc_entries: TryVec<AvcSampleEntry>,
}

impl ParseBox for SampleDescriptionBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            entry_count: 0,
            avc_entries: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        self.header.read_version_flags(src)?;
        self.entry_count = be_u32(src)?;
        read_sub_boxes(src, self, ctx)
    }
}

impl BoxContainer for SampleDescriptionBox {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::AvcSampleEntry(entry) => place_nth(&mut self.avc_entries, entry, header),
            _ => Err(Error::UnknownBoxType(header.name)),
        }
    }

    fn parse_sub_box<T: Read + Offset>(
        &mut self,
        slot: BoxSlot,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        match slot.name {
            BoxType::AVCSampleEntry | BoxType::AVC3SampleEntry => {
                slot_at(&mut self.avc_entries, slot.index)?.parse_payload(src, ctx)
            }
            _ => Err(foreign_slot()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeToSampleEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Decoding time to sample box 'stts'.
/// See ISO 14496-12:2015 § 8.6.1.2
#[derive(Debug)]
pub struct TimeToSampleBox {
    pub header: FullBoxHeader,
    pub entries: TryVec<TimeToSampleEntry>,
}

impl ParseBox for TimeToSampleBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            entries: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        let entry_count = be_u32(src)?;
        let count = table_len(src, entry_count, 8, ctx)?;
        let mut entries = TryVec::with_capacity(count.to_usize())?;
        for _ in 0..count {
            entries.push(TimeToSampleEntry {
                sample_count: be_u32(src)?,
                sample_delta: be_u32(src)?,
            })?;
        }
        self.entries = entries;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositionOffsetEntry {
    pub sample_count: u32,
    /// Signed in version 1 boxes.
    pub sample_offset: i64,
}

/// Composition time to sample box 'ctts'.
/// See ISO 14496-12:2015 § 8.6.1.3
#[derive(Debug)]
pub struct CompositionOffsetBox {
    pub header: FullBoxHeader,
    pub entries: TryVec<CompositionOffsetEntry>,
}

impl ParseBox for CompositionOffsetBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            entries: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        let signed = match self.header.version {
            0 => false,
            1 => true,
            _ => return Err(Error::Unsupported("unhandled ctts version")),
        };
        let entry_count = be_u32(src)?;
        let count = table_len(src, entry_count, 8, ctx)?;
        let mut entries = TryVec::with_capacity(count.to_usize())?;
        for _ in 0..count {
            let sample_count = be_u32(src)?;
            let sample_offset = if signed {
                i64::from(be_i32(src)?)
            } else {
                i64::from(be_u32(src)?)
            };
            entries.push(CompositionOffsetEntry {
                sample_count,
                sample_offset,
            })?;
        }
        self.entries = entries;
        Ok(())
    }
}

/// Sync sample box 'stss'. Lists the 1-based numbers of random access samples.
/// See ISO 14496-12:2015 § 8.6.2
#[derive(Debug)]
pub struct SyncSampleBox {
    pub header: FullBoxHeader,
    pub sample_numbers: TryVec<u32>,
}

impl ParseBox for SyncSampleBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            sample_numbers: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        let entry_count = be_u32(src)?;
        let count = table_len(src, entry_count, 4, ctx)?;
        let mut sample_numbers = TryVec::with_capacity(count.to_usize())?;
        for _ in 0..count {
            sample_numbers.push(be_u32(src)?)?;
        }
        self.sample_numbers = sample_numbers;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleToChunkEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Sample to chunk box 'stsc'.
/// See ISO 14496-12:2015 § 8.7.4
#[derive(Debug)]
pub struct SampleToChunkBox {
    pub header: FullBoxHeader,
    pub entries: TryVec<SampleToChunkEntry>,
}

impl ParseBox for SampleToChunkBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            entries: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        let entry_count = be_u32(src)?;
        let count = table_len(src, entry_count, 12, ctx)?;
        let mut entries = TryVec::with_capacity(count.to_usize())?;
        for _ in 0..count {
            entries.push(SampleToChunkEntry {
                first_chunk: be_u32(src)?,
                samples_per_chunk: be_u32(src)?,
                sample_description_index: be_u32(src)?,
            })?;
        }
        self.entries = entries;
        Ok(())
    }
}

/// Sample size box 'stsz'.
/// See ISO 14496-12:2015 § 8.7.3.2
#[derive(Debug)]
pub struct SampleSizeBox {
    pub header: FullBoxHeader,
    /// Size shared by every sample, or zero when `entry_sizes` lists them.
    pub sample_size: u32,
    pub sample_count: u32,
    pub entry_sizes: TryVec<u32>,
}

impl SampleSizeBox {
    /// Size of the 1-based sample `number`, if the table covers it.
    pub fn size_of(&self, number: u32) -> Option<u32> {
        if number == 0 || number > self.sample_count {
            return None;
        }
        if self.sample_size != 0 {
            return Some(self.sample_size);
        }
        self.entry_sizes.get((number - 1).to_usize()).copied()
    }
}

impl ParseBox for SampleSizeBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            sample_size: 0,
            sample_count: 0,
            entry_sizes: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        self.sample_size = be_u32(src)?;
        self.sample_count = be_u32(src)?;
        if self.sample_size == 0 {
            let count = table_len(src, self.sample_count, 4, ctx)?;
            let mut entry_sizes = TryVec::with_capacity(count.to_usize())?;
            for _ in 0..count {
                entry_sizes.push(be_u32(src)?)?;
            }
            self.entry_sizes = entry_sizes;
        }
        Ok(())
    }
}

/// Chunk offset box 'stco', or its 64-bit variant 'co64'.
/// See ISO 14496-12:2015 § 8.7.5
#[derive(Debug)]
pub struct ChunkOffsetBox {
    pub header: FullBoxHeader,
    pub chunk_offsets: TryVec<u64>,
}

impl ParseBox for ChunkOffsetBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            chunk_offsets: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if empty_payload(src, ctx)? {
            return Ok(());
        }
        self.header.read_version_flags(src)?;
        let large = self.header.base.name == BoxType::ChunkLargeOffsetBox;
        let entry_count = be_u32(src)?;
        let count = table_len(src, entry_count, if large { 8 } else { 4 }, ctx)?;
        let mut chunk_offsets = TryVec::with_capacity(count.to_usize())?;
        for _ in 0..count {
            let offset = if large {
                be_u64(src)?
            } else {
                u64::from(be_u32(src)?)
            };
            chunk_offsets.push(offset)?;
        }
        self.chunk_offsets = chunk_offsets;
        Ok(())
    }
}
