// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::nal::{read_nal_unit, NalUnit};
use crate::registry::Mp4Box;
use crate::{
    be_u16, be_u32, empty_payload, foreign_slot, occupied, place_single, read_payload,
    read_sub_boxes, skip, BMFFBox, BoxContainer, BoxHeader, BoxSlot, BoxType, Error, Offset,
    ParseBox, ParseContext, Result, ToU64, ToUsize, TryVec,
};
use arrayvec::ArrayVec;
use bitreader::BitReader;
use byteorder::ReadBytesExt;
use std::io::Read;

/// The SPS count is a 5-bit field.
const MAX_SEQUENCE_PARAMETER_SETS: usize = 31;

/// A parameter set NAL unit as stored in the decoder configuration record,
/// behind a 16-bit length.
#[derive(Debug)]
pub struct LengthPrefixedNalUnit {
    pub length: u16,
    pub nal_unit: NalUnit,
}

fn read_length_prefixed(src: &mut &[u8]) -> Result<LengthPrefixedNalUnit> {
    let length = be_u16(src)?;
    let (nal_unit, _) = read_nal_unit(src, length.to_usize())?;
    Ok(LengthPrefixedNalUnit { length, nal_unit })
}

/// Fields present only for the high profiles.
#[derive(Debug)]
pub struct AvcProfileExtension {
    pub chroma_format: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub sequence_parameter_set_exts: TryVec<LengthPrefixedNalUnit>,
}

/// AVCDecoderConfigurationRecord
/// See ISO 14496-15:2014 § 5.3.3.1
#[derive(Debug)]
pub struct AvcDecoderConfigurationRecord {
    pub configuration_version: u8,
    pub avc_profile_indication: u8,
    pub profile_compatibility: u8,
    pub avc_level_indication: u8,
    pub length_size_minus_one: u8,
    pub sequence_parameter_sets: ArrayVec<LengthPrefixedNalUnit, MAX_SEQUENCE_PARAMETER_SETS>,
    pub picture_parameter_sets: TryVec<LengthPrefixedNalUnit>,
    pub profile_extension: Option<AvcProfileExtension>,
}

impl AvcDecoderConfigurationRecord {
    /// Parse a record from the start of `data`, returning it with the number of bytes it used.
    pub fn parse(data: &[u8]) -> Result<(Self, u64)> {
        let mut src = data;

        let mut prologue = [0u8; 6];
        src.read_exact(&mut prologue)?;
        let mut bits = BitReader::new(&prologue);
        let configuration_version = bits.read_u8(8)?;
        let avc_profile_indication = bits.read_u8(8)?;
        let profile_compatibility = bits.read_u8(8)?;
        let avc_level_indication = bits.read_u8(8)?;
        bits.skip(6)?; // reserved
        let length_size_minus_one = bits.read_u8(2)?;
        bits.skip(3)?; // reserved
        let num_of_sequence_parameter_sets = bits.read_u8(5)?;

        let mut sequence_parameter_sets = ArrayVec::new();
        for _ in 0..num_of_sequence_parameter_sets {
            sequence_parameter_sets.push(read_length_prefixed(&mut src)?);
        }

        let num_of_picture_parameter_sets = src.read_u8()?;
        let mut picture_parameter_sets =
            TryVec::with_capacity(num_of_picture_parameter_sets.to_usize())?;
        for _ in 0..num_of_picture_parameter_sets {
            picture_parameter_sets.push(read_length_prefixed(&mut src)?)?;
        }

        // Older writers leave the high profile fields out entirely, some cut them short.
        // A partial extension is dropped and its bytes count as unconsumed.
        let mut profile_extension = None;
        if has_profile_extension(avc_profile_indication) && !src.is_empty() {
            let mut rest = src;
            match read_profile_extension(&mut rest) {
                Ok(extension) => {
                    profile_extension = Some(extension);
                    src = rest;
                }
                Err(Error::TruncatedInput) => {
                    debug!("truncated high profile fields in avcC ({} bytes)", src.len());
                }
                Err(e) => return Err(e),
            }
        }

        let consumed = (data.len() - src.len()).to_u64();
        Ok((
            Self {
                configuration_version,
                avc_profile_indication,
                profile_compatibility,
                avc_level_indication,
                length_size_minus_one,
                sequence_parameter_sets,
                picture_parameter_sets,
                profile_extension,
            },
            consumed,
        ))
    }

    /// Size in bytes of the length field in front of each NAL unit in the samples.
    pub fn length_size(&self) -> u32 {
        u32::from(self.length_size_minus_one) + 1
    }

    /// Every parameter set the record carries, SPS first.
    pub fn parameter_sets(&self) -> impl Iterator<Item = &LengthPrefixedNalUnit> {
        let exts = self
            .profile_extension
            .iter()
            .flat_map(|ext| ext.sequence_parameter_set_exts.iter());
        self.sequence_parameter_sets
            .iter()
            .chain(self.picture_parameter_sets.iter())
            .chain(exts)
    }
}

fn has_profile_extension(profile: u8) -> bool {
    matches!(profile, 100 | 110 | 122 | 144)
}

fn read_profile_extension(src: &mut &[u8]) -> Result<AvcProfileExtension> {
    let mut fields = [0u8; 4];
    src.read_exact(&mut fields)?;
    let mut bits = BitReader::new(&fields);
    bits.skip(6)?;
    let chroma_format = bits.read_u8(2)?;
    bits.skip(5)?;
    let bit_depth_luma_minus8 = bits.read_u8(3)?;
    bits.skip(5)?;
    let bit_depth_chroma_minus8 = bits.read_u8(3)?;
    let num_of_sequence_parameter_set_ext = bits.read_u8(8)?;
    let mut sequence_parameter_set_exts =
        TryVec::with_capacity(num_of_sequence_parameter_set_ext.to_usize())?;
    for _ in 0..num_of_sequence_parameter_set_ext {
        sequence_parameter_set_exts.push(read_length_prefixed(src)?)?;
    }
    Ok(AvcProfileExtension {
        chroma_format,
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        sequence_parameter_set_exts,
    })
}

/// AVC configuration box 'avcC'.
#[derive(Debug)]
pub struct AvcConfigurationBox {
    pub header: BoxHeader,
    pub record: AvcDecoderConfigurationRecord,
}

impl ParseBox for AvcConfigurationBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            record: AvcDecoderConfigurationRecord {
                configuration_version: 0,
                avc_profile_indication: 0,
                profile_compatibility: 0,
                avc_level_indication: 0,
                length_size_minus_one: 0,
                sequence_parameter_sets: ArrayVec::new(),
                picture_parameter_sets: TryVec::new(),
                profile_extension: None,
            },
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
        let data = read_payload(src)?;
        let (record, consumed) = AvcDecoderConfigurationRecord::parse(&data)?;
        if consumed != data.len().to_u64() {
            if ctx.is_strict() {
                return Err(Error::SizeMismatch {
                    box_type: src.head.name,
                    offset: src.head.position,
                    declared: data.len().to_u64(),
                    consumed,
                });
            }
            ctx.warn(&src.head, "unconsumed bytes after the decoder configuration record")?;
        }
        for unit in record.parameter_sets() {
            if unit.nal_unit.forbidden_zero_bit {
                if ctx.is_strict() {
                    return Err(Error::InvalidData("NAL unit forbidden_zero_bit is set"));
                }
                ctx.warn(&src.head, "parameter set with forbidden_zero_bit set")?;
            }
        }
        self.record = record;
        Ok(())
    }
}

/// AVC visual sample entry, 'avc1' or 'avc3'.
/// See ISO 14496-12:2015 § 12.1.3 and ISO 14496-15:2014 § 5.4.2.1
#[derive(Debug)]
pub struct AvcSampleEntry {
    pub header: BoxHeader,
    pub data_reference_index: u16,
    pub width: u16,
    pub height: u16,
    /// Fixed point 16.16
    pub horizontal_resolution: u32,
    /// Fixed point 16.16
    pub vertical_resolution: u32,
    pub frame_count: u16,
    pub compressor_name: ArrayVec<u8, 31>,
    pub depth: u16,
    pub avcc: Option<AvcConfigurationBox>,
}

impl ParseBox for AvcSampleEntry {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            data_reference_index: 0,
            width: 0,
            height: 0,
            horizontal_resolution: 0,
            vertical_resolution: 0,
            frame_count: 0,
            compressor_name: ArrayVec::new(),
            depth: 0,
            avcc: None,
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
        // Skip reserved bytes of SampleEntry.
        skip(src, 6)?;
        self.data_reference_index = be_u16(src)?;
        // Skip pre_defined and reserved.
        skip(src, 16)?;
        self.width = be_u16(src)?;
        self.height = be_u16(src)?;
        self.horizontal_resolution = be_u32(src)?;
        self.vertical_resolution = be_u32(src)?;
        // reserved
        skip(src, 4)?;
        self.frame_count = be_u16(src)?;

        // Pascal string padded to 32 bytes.
        let mut compressor_name = [0u8; 32];
        src.read_exact(&mut compressor_name)?;
        let len = usize::from(compressor_name[0]).min(31);
        self.compressor_name.clear();
        self.compressor_name
            .try_extend_from_slice(&compressor_name[1..=len])
            .map_err(|_| Error::InvalidData("compressor name too long"))?;

        self.depth = be_u16(src)?;
        // pre_defined
        skip(src, 2)?;

        read_sub_boxes(src, self, ctx)
    }
}

impl BoxContainer for AvcSampleEntry {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::AvcConfiguration(avcc) => place_single(&mut self.avcc, avcc, header, ctx),
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
            BoxType::AVCConfigurationBox => occupied(&mut self.avcc)?.parse_payload(src, ctx),
            _ => Err(foreign_slot()),
        }
    }
}
