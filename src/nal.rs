//! H.264 network abstraction layer units.
//!
//! See ITU-T H.264 § 7.3.1 and Annex B.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{
    read_to_end, Diagnostics, Error, ParseOptions, ParsePolicy, Result, Severity, ToU64,
    TryVec,
};
use byteorder::{BigEndian, ReadBytesExt};
use std::convert::TryInto as _;
use std::fmt;
use std::io::Read;

/// `nal_unit_type`, Table 7-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture
    NonIdrSlice,
    SliceDataPartitionA,
    SliceDataPartitionB,
    SliceDataPartitionC,
    /// Coded slice of an IDR picture
    IdrSlice,
    SupplementalEnhancementInformation,
    SequenceParameterSet,
    PictureParameterSet,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    FillerData,
    SequenceParameterSetExtension,
    PrefixNalUnit,
    SubsetSequenceParameterSet,
    DepthParameterSet,
    /// Coded slice of an auxiliary coded picture without partitioning
    AuxiliarySlice,
    /// Coded slice extension (SVC/MVC)
    SliceExtension,
    /// Coded slice extension for a depth view component (3D-AVC)
    DepthSliceExtension,
    /// 17, 18, 22 and 23
    Reserved(u8),
    /// 0 and 24..=31
    Unspecified(u8),
}

impl From<u8> for NalUnitType {
    fn from(t: u8) -> Self {
        use self::NalUnitType::*;
        match t & 0x1f {
            1 => NonIdrSlice,
            2 => SliceDataPartitionA,
            3 => SliceDataPartitionB,
            4 => SliceDataPartitionC,
            5 => IdrSlice,
            6 => SupplementalEnhancementInformation,
            7 => SequenceParameterSet,
            8 => PictureParameterSet,
            9 => AccessUnitDelimiter,
            10 => EndOfSequence,
            11 => EndOfStream,
            12 => FillerData,
            13 => SequenceParameterSetExtension,
            14 => PrefixNalUnit,
            15 => SubsetSequenceParameterSet,
            16 => DepthParameterSet,
            19 => AuxiliarySlice,
            20 => SliceExtension,
            21 => DepthSliceExtension,
            t @ (17 | 18 | 22 | 23) => Reserved(t),
            t => Unspecified(t),
        }
    }
}

impl From<NalUnitType> for u8 {
    fn from(t: NalUnitType) -> u8 {
        use self::NalUnitType::*;
        match t {
            NonIdrSlice => 1,
            SliceDataPartitionA => 2,
            SliceDataPartitionB => 3,
            SliceDataPartitionC => 4,
            IdrSlice => 5,
            SupplementalEnhancementInformation => 6,
            SequenceParameterSet => 7,
            PictureParameterSet => 8,
            AccessUnitDelimiter => 9,
            EndOfSequence => 10,
            EndOfStream => 11,
            FillerData => 12,
            SequenceParameterSetExtension => 13,
            PrefixNalUnit => 14,
            SubsetSequenceParameterSet => 15,
            DepthParameterSet => 16,
            AuxiliarySlice => 19,
            SliceExtension => 20,
            DepthSliceExtension => 21,
            Reserved(t) | Unspecified(t) => t,
        }
    }
}

impl NalUnitType {
    /// Video coding layer units carry slice data.
    pub fn is_vcl(self) -> bool {
        matches!(u8::from(self), 1..=5)
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(
            self,
            NalUnitType::SequenceParameterSet
                | NalUnitType::PictureParameterSet
                | NalUnitType::SequenceParameterSetExtension
                | NalUnitType::SubsetSequenceParameterSet
        )
    }

    pub fn name(self) -> &'static str {
        use self::NalUnitType::*;
        match self {
            NonIdrSlice => "coded slice of a non-IDR picture",
            SliceDataPartitionA => "coded slice data partition A",
            SliceDataPartitionB => "coded slice data partition B",
            SliceDataPartitionC => "coded slice data partition C",
            IdrSlice => "coded slice of an IDR picture",
            SupplementalEnhancementInformation => "supplemental enhancement information",
            SequenceParameterSet => "sequence parameter set",
            PictureParameterSet => "picture parameter set",
            AccessUnitDelimiter => "access unit delimiter",
            EndOfSequence => "end of sequence",
            EndOfStream => "end of stream",
            FillerData => "filler data",
            SequenceParameterSetExtension => "sequence parameter set extension",
            PrefixNalUnit => "prefix NAL unit",
            SubsetSequenceParameterSet => "subset sequence parameter set",
            DepthParameterSet => "depth parameter set",
            AuxiliarySlice => "coded slice of an auxiliary coded picture",
            SliceExtension => "coded slice extension",
            DepthSliceExtension => "coded slice extension for a depth view component",
            Reserved(_) => "reserved",
            Unspecified(_) => "unspecified",
        }
    }
}

impl fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", u8::from(*self), self.name())
    }
}

/// A NAL unit: the one-byte header decoded, the rest kept verbatim.
#[derive(Debug)]
pub struct NalUnit {
    /// Must be zero in a conforming stream.
    pub forbidden_zero_bit: bool,
    pub nal_ref_idc: u8,
    pub nal_unit_type: NalUnitType,
    /// Still contains emulation prevention bytes.
    pub payload: TryVec<u8>,
}

impl NalUnit {
    /// Parse a unit that occupies all of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut src = data;
        read_nal_unit(&mut src, data.len()).map(|(unit, _)| unit)
    }
}

/// Read one NAL unit of exactly `length` bytes, returning it with the bytes consumed.
pub fn read_nal_unit<T: Read>(src: &mut T, length: usize) -> Result<(NalUnit, usize)> {
    if length == 0 {
        return Err(Error::InvalidData("zero-length NAL unit"));
    }
    let header = src.read_u8()?;
    let payload_len = length - 1;
    let mut payload = TryVec::new();
    let read = fallible_collections::try_read_up_to(src, payload_len.to_u64(), &mut payload)?;
    if read != payload_len {
        return Err(Error::TruncatedInput);
    }
    let unit = NalUnit {
        forbidden_zero_bit: header & 0x80 != 0,
        nal_ref_idc: (header >> 5) & 0b11,
        nal_unit_type: NalUnitType::from(header & 0x1f),
        payload,
    };
    Ok((unit, length))
}

/// Split sample data made of NAL units behind `length_size`-byte big-endian lengths.
pub fn read_length_prefixed_nal_units(data: &[u8], length_size: u32) -> Result<TryVec<NalUnit>> {
    if !matches!(length_size, 1 | 2 | 4) {
        return Err(Error::InvalidData("NAL length size must be 1, 2 or 4"));
    }
    let mut src = data;
    let mut units = TryVec::new();
    while !src.is_empty() {
        let length: usize = src.read_uint::<BigEndian>(length_size.try_into()?)?.try_into()?;
        if length > src.len() {
            return Err(Error::TruncatedInput);
        }
        let (unit, _) = read_nal_unit(&mut src, length)?;
        units.push(unit)?;
    }
    Ok(units)
}

/// A raw H.264 byte stream split into its NAL units.
#[derive(Debug, Default)]
pub struct ElementaryStream {
    pub nal_units: TryVec<NalUnit>,
    pub diagnostics: Diagnostics,
}

/// Position just past the next `00 00 01` at or after `from`.
fn next_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let found = data.get(from..)?.windows(3).position(|w| w == [0, 0, 1])?;
    let start = from + found;
    Some((start, start + 3))
}

fn trim_trailing_zeros(unit: &[u8]) -> &[u8] {
    let end = unit.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
    &unit[..end]
}

/// Read a byte stream in the Annex B format, where NAL units are separated by
/// `00 00 01` or `00 00 00 01` start codes.
pub fn read_annexb<T: Read>(f: &mut T, options: &ParseOptions) -> Result<ElementaryStream> {
    let data = read_to_end(f)?;
    let mut stream = ElementaryStream::default();

    let mut next = next_start_code(&data, 0);
    match next {
        None if !data.is_empty() => {
            stream
                .diagnostics
                .record(Severity::Warning, None, 0, "no start code in stream")?;
        }
        Some((start, _)) if data[..start].iter().any(|&b| b != 0) => {
            stream.diagnostics.record(
                Severity::Warning,
                None,
                0,
                "data before the first start code skipped",
            )?;
        }
        _ => {}
    }

    while let Some((_, begin)) = next {
        next = next_start_code(&data, begin);
        let end = next.map_or(data.len(), |(start, _)| start);
        // Trailing zeros belong to the next start code or are stuffing.
        let unit = trim_trailing_zeros(&data[begin..end]);
        let position = begin.to_u64();
        if unit.is_empty() {
            stream
                .diagnostics
                .record(Severity::Warning, None, position, "empty NAL unit skipped")?;
            continue;
        }
        let nal_unit = NalUnit::parse(unit)?;
        if nal_unit.forbidden_zero_bit {
            if options.policy == ParsePolicy::Strict {
                return Err(Error::InvalidData("NAL unit forbidden_zero_bit is set"));
            }
            stream.diagnostics.record(
                Severity::Warning,
                None,
                position,
                "NAL unit with forbidden_zero_bit set",
            )?;
        }
        trace!("{} at {}, {} bytes", nal_unit.nal_unit_type, position, unit.len());
        stream.nal_units.push(nal_unit)?;
    }
    Ok(stream)
}
