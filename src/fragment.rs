// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::registry::Mp4Box;
use crate::{
    be_i32, be_u32, be_u64, empty_payload, foreign_slot, occupied, place_nth, place_single,
    read_sub_boxes, slot_at, table_len, BMFFBox, BoxContainer, BoxHeader, BoxSlot, BoxType, Error,
    FullBoxHeader, Offset, ParseBox, ParseContext, Result, ToU64, ToUsize, TryVec,
};
use std::io::Read;

/// Movie fragment box 'moof'.
/// See ISO 14496-12:2015 § 8.8.4
#[derive(Debug)]
pub struct MovieFragmentBox {
    pub header: BoxHeader,
    pub mfhd: Option<MovieFragmentHeaderBox>,
    pub track_fragments: TryVec<TrackFragmentBox>,
}

impl ParseBox for MovieFragmentBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            mfhd: None,
            track_fragments: TryVec::new(),
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

impl BoxContainer for MovieFragmentBox {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::MovieFragmentHeader(mfhd) => place_single(&mut self.mfhd, mfhd, header, ctx),
            Mp4Box::TrackFragment(traf) => place_nth(&mut self.track_fragments, traf, header),
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
            BoxType::MovieFragmentHeaderBox => occupied(&mut self.mfhd)?.parse_payload(src, ctx),
            BoxType::TrackFragmentBox => {
                slot_at(&mut self.track_fragments, slot.index)?.parse_payload(src, ctx)
            }
            _ => Err(foreign_slot()),
        }
    }
}

/// Movie fragment header box 'mfhd'.
/// See ISO 14496-12:2015 § 8.8.5
#[derive(Debug)]
pub struct MovieFragmentHeaderBox {
    pub header: FullBoxHeader,
    pub sequence_number: u32,
}

impl ParseBox for MovieFragmentHeaderBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            sequence_number: 0,
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
        self.sequence_number = be_u32(src)?;
        Ok(())
    }
}

/// Track fragment box 'traf'.
/// See ISO 14496-12:2015 § 8.8.6
#[derive(Debug)]
pub struct TrackFragmentBox {
    pub header: BoxHeader,
    pub tfhd: Option<TrackFragmentHeaderBox>,
    pub tfdt: Option<TrackFragmentDecodeTimeBox>,
    pub track_runs: TryVec<TrackRunBox>,
}

impl ParseBox for TrackFragmentBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            tfhd: None,
            tfdt: None,
            track_runs: TryVec::new(),
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

impl BoxContainer for TrackFragmentBox {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::TrackFragmentHeader(tfhd) => place_single(&mut self.tfhd, tfhd, header, ctx),
            Mp4Box::TrackFragmentDecodeTime(tfdt) => {
                place_single(&mut self.tfdt, tfdt, header, ctx)
            }
            Mp4Box::TrackRun(trun) => place_nth(&mut self.track_runs, trun, header),
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
            BoxType::TrackFragmentHeaderBox => occupied(&mut self.tfhd)?.parse_payload(src, ctx),
            BoxType::TrackFragmentBaseMediaDecodeTimeBox => {
                occupied(&mut self.tfdt)?.parse_payload(src, ctx)
            }
            BoxType::TrackRunBox => {
                slot_at(&mut self.track_runs, slot.index)?.parse_payload(src, ctx)
            }
            _ => Err(foreign_slot()),
        }
    }
}

/// Track fragment header box 'tfhd'. Absent optional fields are `None`.
/// See ISO 14496-12:2015 § 8.8.7
#[derive(Debug)]
pub struct TrackFragmentHeaderBox {
    pub header: FullBoxHeader,
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
}

impl TrackFragmentHeaderBox {
    pub const BASE_DATA_OFFSET_PRESENT: u32 = 0x00_0001;
    pub const SAMPLE_DESCRIPTION_INDEX_PRESENT: u32 = 0x00_0002;
    pub const DEFAULT_SAMPLE_DURATION_PRESENT: u32 = 0x00_0008;
    pub const DEFAULT_SAMPLE_SIZE_PRESENT: u32 = 0x00_0010;
    pub const DEFAULT_SAMPLE_FLAGS_PRESENT: u32 = 0x00_0020;
    pub const DURATION_IS_EMPTY: u32 = 0x01_0000;
    pub const DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;

    pub fn duration_is_empty(&self) -> bool {
        self.header.flags & Self::DURATION_IS_EMPTY != 0
    }

    pub fn default_base_is_moof(&self) -> bool {
        self.header.flags & Self::DEFAULT_BASE_IS_MOOF != 0
    }
}

impl ParseBox for TrackFragmentHeaderBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            track_id: 0,
            base_data_offset: None,
            sample_description_index: None,
            default_sample_duration: None,
            default_sample_size: None,
            default_sample_flags: None,
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
        let flags = self.header.flags;
        self.track_id = be_u32(src)?;
        if flags & Self::BASE_DATA_OFFSET_PRESENT != 0 {
            self.base_data_offset = Some(be_u64(src)?);
        }
        if flags & Self::SAMPLE_DESCRIPTION_INDEX_PRESENT != 0 {
            self.sample_description_index = Some(be_u32(src)?);
        }
        if flags & Self::DEFAULT_SAMPLE_DURATION_PRESENT != 0 {
            self.default_sample_duration = Some(be_u32(src)?);
        }
        if flags & Self::DEFAULT_SAMPLE_SIZE_PRESENT != 0 {
            self.default_sample_size = Some(be_u32(src)?);
        }
        if flags & Self::DEFAULT_SAMPLE_FLAGS_PRESENT != 0 {
            self.default_sample_flags = Some(be_u32(src)?);
        }
        Ok(())
    }
}

/// Track fragment decode time box 'tfdt'.
/// See ISO 14496-12:2015 § 8.8.12
#[derive(Debug)]
pub struct TrackFragmentDecodeTimeBox {
    pub header: FullBoxHeader,
    pub base_media_decode_time: u64,
}

impl ParseBox for TrackFragmentDecodeTimeBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            base_media_decode_time: 0,
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
        self.base_media_decode_time = match self.header.version {
            1 => be_u64(src)?,
            0 => u64::from(be_u32(src)?),
            _ => return Err(Error::Unsupported("unhandled tfdt version")),
        };
        Ok(())
    }
}

/// One row of a track run. Fields not flagged in the run header are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackRunSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    /// Signed in version 1 runs.
    pub composition_time_offset: Option<i64>,
}

/// Track fragment run box 'trun'.
/// See ISO 14496-12:2015 § 8.8.8
#[derive(Debug)]
pub struct TrackRunBox {
    pub header: FullBoxHeader,
    pub sample_count: u32,
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: TryVec<TrackRunSample>,
}

impl TrackRunBox {
    pub const DATA_OFFSET_PRESENT: u32 = 0x00_0001;
    pub const FIRST_SAMPLE_FLAGS_PRESENT: u32 = 0x00_0004;
    pub const SAMPLE_DURATION_PRESENT: u32 = 0x00_0100;
    pub const SAMPLE_SIZE_PRESENT: u32 = 0x00_0200;
    pub const SAMPLE_FLAGS_PRESENT: u32 = 0x00_0400;
    pub const SAMPLE_COMPOSITION_TIME_OFFSETS_PRESENT: u32 = 0x00_0800;

    /// Bytes each sample row takes for the given flags.
    fn sample_row_size(flags: u32) -> u64 {
        let fields = [
            Self::SAMPLE_DURATION_PRESENT,
            Self::SAMPLE_SIZE_PRESENT,
            Self::SAMPLE_FLAGS_PRESENT,
            Self::SAMPLE_COMPOSITION_TIME_OFFSETS_PRESENT,
        ]
        .iter()
        .filter(|&&flag| flags & flag != 0)
        .count();
        fields.to_u64() * 4
    }
}

impl ParseBox for TrackRunBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header: FullBoxHeader::new(header),
            sample_count: 0,
            data_offset: None,
            first_sample_flags: None,
            samples: TryVec::new(),
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
        let flags = self.header.flags;
        self.sample_count = be_u32(src)?;
        if flags & Self::DATA_OFFSET_PRESENT != 0 {
            self.data_offset = Some(be_i32(src)?);
        }
        if flags & Self::FIRST_SAMPLE_FLAGS_PRESENT != 0 {
            self.first_sample_flags = Some(be_u32(src)?);
        }
        let row_size = Self::sample_row_size(flags);
        if row_size == 0 {
            // All samples use the defaults from tfhd.
            return Ok(());
        }
        let count = table_len(src, self.sample_count, row_size, ctx)?;
        let mut samples = TryVec::with_capacity(count.to_usize())?;
        for _ in 0..count {
            let mut sample = TrackRunSample::default();
            if flags & Self::SAMPLE_DURATION_PRESENT != 0 {
                sample.duration = Some(be_u32(src)?);
            }
            if flags & Self::SAMPLE_SIZE_PRESENT != 0 {
                sample.size = Some(be_u32(src)?);
            }
            if flags & Self::SAMPLE_FLAGS_PRESENT != 0 {
                sample.flags = Some(be_u32(src)?);
            }
            if flags & Self::SAMPLE_COMPOSITION_TIME_OFFSETS_PRESENT != 0 {
                sample.composition_time_offset = Some(if self.header.version == 0 {
                    i64::from(be_u32(src)?)
                } else {
                    i64::from(be_i32(src)?)
                });
            }
            samples.push(sample)?;
        }
        self.samples = samples;
        Ok(())
    }
}
