//! Module for parsing ISO Base Media Format aka video/mp4 streams,
//! and the H.264 (AVC) NAL units carried inside them or in raw Annex B streams.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[macro_use]
extern crate log;

use byteorder::ReadBytesExt;
use fallible_collections::TryRead;
use std::convert::TryInto as _;

use std::io::{Read, Take};

mod boxes;
pub use crate::boxes::{BoxType, FourCC};

mod registry;
use crate::registry::{BoxRegistry, Mp4Box};

mod avc;
pub use crate::avc::{
    AvcConfigurationBox, AvcDecoderConfigurationRecord, AvcProfileExtension, AvcSampleEntry,
    LengthPrefixedNalUnit,
};

mod fragment;
pub use crate::fragment::{
    MovieFragmentBox, MovieFragmentHeaderBox, TrackFragmentBox, TrackFragmentDecodeTimeBox,
    TrackFragmentHeaderBox, TrackRunBox, TrackRunSample,
};

mod movie;
pub use crate::movie::{
    ChunkOffsetBox, CompositionOffsetBox, CompositionOffsetEntry, DataEntryUrlBox,
    DataInformationBox, DataReferenceBox, HandlerBox, MediaBox, MediaHeaderBox,
    MediaInformationBox, MovieBox, MovieHeaderBox, SampleDescriptionBox, SampleSizeBox,
    SampleTableBox, SampleToChunkBox, SampleToChunkEntry, SoundMediaHeaderBox, SyncSampleBox,
    TimeToSampleBox, TimeToSampleEntry, TrackBox, TrackHeaderBox, VideoMediaHeaderBox,
};

mod nal;
pub use crate::nal::{
    read_annexb, read_length_prefixed_nal_units, read_nal_unit, ElementaryStream, NalUnit,
    NalUnitType,
};

// Unit tests.
#[cfg(test)]
mod tests;

/// A trait to indicate a type can be infallibly converted to `u64`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
trait ToU64 {
    fn to_u64(self) -> u64;
}

/// Statically verify that the platform `usize` can fit within a `u64`.
/// If the size won't fit on the given platform, this will fail at compile time, but if a type
/// which can fail TryInto<usize> is used, it may panic.
impl ToU64 for usize {
    fn to_u64(self) -> u64 {
        static_assertions::const_assert!(
            std::mem::size_of::<usize>() <= std::mem::size_of::<u64>()
        );
        self.try_into().expect("usize -> u64 conversion failed")
    }
}

/// A trait to indicate a type can be infallibly converted to `usize`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToUsize {
    fn to_usize(self) -> usize;
}

/// Statically verify that the given type can fit within a `usize`.
/// If the size won't fit on the given platform, this will fail at compile time, but if a type
/// which can fail TryInto<usize> is used, it may panic.
macro_rules! impl_to_usize_from {
    ( $from_type:ty ) => {
        impl ToUsize for $from_type {
            fn to_usize(self) -> usize {
                static_assertions::const_assert!(
                    std::mem::size_of::<$from_type>() <= std::mem::size_of::<usize>()
                );
                self.try_into().expect(concat!(
                    stringify!($from_type),
                    " -> usize conversion failed"
                ))
            }
        }
    };
}

impl_to_usize_from!(u8);
impl_to_usize_from!(u16);
impl_to_usize_from!(u32);

/// Indicate the current offset (i.e., bytes already read) in a reader
pub(crate) trait Offset {
    fn offset(&self) -> u64;
}

/// Wraps a reader to track the current offset
pub(crate) struct OffsetReader<'a, T> {
    reader: &'a mut T,
    offset: u64,
}

impl<'a, T> OffsetReader<'a, T> {
    pub(crate) fn new(reader: &'a mut T) -> Self {
        Self { reader, offset: 0 }
    }
}

impl<'a, T> Offset for OffsetReader<'a, T> {
    fn offset(&self) -> u64 {
        self.offset
    }
}

impl<'a, T: Read> Read for OffsetReader<'a, T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes_read = self.reader.read(buf)?;
        self.offset = self
            .offset
            .checked_add(bytes_read.to_u64())
            .expect("total bytes read too large for offset type");
        Ok(bytes_read)
    }
}

pub type TryVec<T> = fallible_collections::TryVec<T>;
pub type TryHashMap<K, V> = fallible_collections::TryHashMap<K, V>;

// To ensure we don't use stdlib allocating types by accident
#[allow(dead_code)]
struct Vec;
#[allow(dead_code)]
struct Box;
#[allow(dead_code)]
struct HashMap;
#[allow(dead_code)]
struct String;

/// Describes parser failures.
///
/// This enum wraps the standard `io::Error` type, unified with
/// our own parser error states and those of crates we use.
#[derive(Debug)]
pub enum Error {
    /// Parse error caused by corrupt or malformed data.
    InvalidData(&'static str),
    /// Parse error caused by limited parser support rather than invalid data.
    Unsupported(&'static str),
    /// The input ended before a header or payload was complete.
    TruncatedInput,
    /// Box size fields contradict each other or the header itself.
    MalformedHeader(&'static str),
    /// A box consumed a different number of bytes than its header declared.
    SizeMismatch {
        box_type: BoxType,
        /// Position of the box header in the input.
        offset: u64,
        declared: u64,
        consumed: u64,
    },
    /// No parser is registered for this box type. The tree parser skips such boxes.
    UnknownBoxType(BoxType),
    /// Propagate underlying errors from `std::io`.
    Io(std::io::Error),
    /// Out of memory
    OutOfMemory,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<bitreader::BitReaderError> for Error {
    fn from(_: bitreader::BitReaderError) -> Error {
        Error::InvalidData("invalid data")
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::TruncatedInput,
            _ => Error::Io(err),
        }
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(_: std::num::TryFromIntError) -> Error {
        Error::Unsupported("integer conversion failed")
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::InvalidData(_) | Error::MalformedHeader(_) | Error::SizeMismatch { .. } => {
                std::io::ErrorKind::InvalidData
            }
            Error::TruncatedInput => std::io::ErrorKind::UnexpectedEof,
            Error::Io(io_err) => return io_err,
            _ => std::io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

impl From<fallible_collections::TryReserveError> for Error {
    fn from(_: fallible_collections::TryReserveError) -> Error {
        Error::OutOfMemory
    }
}

/// Result shorthand using our Error enum.
pub(crate) type Result<T> = std::result::Result<T, Error>;

/// How much a diagnostic matters to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Expected oddities, such as skipped unknown boxes or empty padding.
    Info,
    /// Data that was tolerated but does not match what the format requires.
    Warning,
}

/// A note produced while parsing, kept alongside the parsed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// The box the note is about, if it concerns a box rather than a raw NAL stream.
    pub box_type: Option<BoxType>,
    /// Position in the input the note refers to.
    pub offset: u64,
    pub message: &'static str,
}

/// Diagnostics collected by one parse, in the order they were produced.
#[derive(Debug, Default)]
pub struct Diagnostics {
    records: TryVec<Diagnostic>,
}

impl Diagnostics {
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Diagnostics at `Severity::Warning` and above.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.iter().filter(|d| d.severity >= Severity::Warning)
    }

    /// Log the note and keep it.
    pub(crate) fn record(
        &mut self,
        severity: Severity,
        box_type: Option<BoxType>,
        offset: u64,
        message: &'static str,
    ) -> Result<()> {
        match (severity, box_type) {
            (Severity::Info, Some(name)) => debug!("{:?} at {}: {}", name, offset, message),
            (Severity::Info, None) => debug!("at {}: {}", offset, message),
            (Severity::Warning, Some(name)) => warn!("{:?} at {}: {}", name, offset, message),
            (Severity::Warning, None) => warn!("at {}: {}", offset, message),
        }
        self.records.push(Diagnostic {
            severity,
            box_type,
            offset,
            message,
        })?;
        Ok(())
    }
}

/// Whether recoverable data problems abort the parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePolicy {
    /// Size mismatches and malformed NAL headers are errors.
    Strict,
    /// Size mismatches and malformed NAL headers become warnings, and as much data as
    /// possible is kept.
    Lenient,
}

/// Parser configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub policy: ParsePolicy,
    /// Keep the payload of `mdat` boxes in memory. When false only their position and
    /// length are recorded.
    pub keep_media_data: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            policy: ParsePolicy::Strict,
            keep_media_data: true,
        }
    }
}

impl ParseOptions {
    pub fn lenient() -> Self {
        Self {
            policy: ParsePolicy::Lenient,
            ..Self::default()
        }
    }
}

/// State owned by a single parse: options, the box registry and collected diagnostics.
pub(crate) struct ParseContext {
    pub(crate) options: ParseOptions,
    pub(crate) registry: BoxRegistry,
    pub(crate) diagnostics: Diagnostics,
}

impl ParseContext {
    pub(crate) fn new(options: &ParseOptions) -> Result<Self> {
        Ok(Self {
            options: *options,
            registry: BoxRegistry::new()?,
            diagnostics: Diagnostics::default(),
        })
    }

    pub(crate) fn is_strict(&self) -> bool {
        self.options.policy == ParsePolicy::Strict
    }

    pub(crate) fn info(&mut self, header: &BoxHeader, message: &'static str) -> Result<()> {
        self.diagnostics
            .record(Severity::Info, Some(header.name), header.position, message)
    }

    pub(crate) fn warn(&mut self, header: &BoxHeader, message: &'static str) -> Result<()> {
        self.diagnostics
            .record(Severity::Warning, Some(header.name), header.position, message)
    }
}

/// Basic ISO box structure.
///
/// mp4 files are a sequence of possibly-nested 'box' structures.  Each box
/// begins with a header describing the length of the box's data and a
/// four-byte box type which identifies the type of the box. Together these
/// are enough to interpret the contents of that section of the file.
///
/// See ISO 14496-12:2015 § 4.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Box type.
    pub name: BoxType,
    /// Size of the box in bytes, as declared. Zero means the box runs to the end of the input.
    pub size: u64,
    /// Offset to the start of the contained data (or header size).
    pub offset: u64,
    /// Uuid for extended type.
    pub uuid: Option<[u8; 16]>,
    /// Position of the first header byte in the input.
    pub position: u64,
}

impl BoxHeader {
    const MIN_SIZE: u64 = 8; // 4-byte size + 4-byte type
    const MIN_LARGE_SIZE: u64 = 16; // 4-byte size + 4-byte type + 8-byte size

    /// Declared size minus the header bytes. `None` for a box that runs to the end of the input.
    pub fn payload_size(&self) -> Option<u64> {
        if self.extends_to_end() {
            None
        } else {
            self.size.checked_sub(self.offset)
        }
    }

    pub fn extends_to_end(&self) -> bool {
        self.size == 0
    }
}

/// A box header followed by the version and flags prologue of a full box.
///
/// See ISO 14496-12:2015 § 4.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullBoxHeader {
    pub base: BoxHeader,
    pub version: u8,
    /// Only the low 24 bits are used.
    pub flags: u32,
}

impl FullBoxHeader {
    pub(crate) fn new(base: BoxHeader) -> Self {
        Self {
            base,
            version: 0,
            flags: 0,
        }
    }

    pub(crate) fn read_version_flags<T: ReadBytesExt>(&mut self, src: &mut T) -> Result<()> {
        let (version, flags) = read_fullbox_extra(src)?;
        self.version = version;
        self.flags = flags;
        Ok(())
    }
}

/// See ISO 14496-12:2015 § 4.2
pub(crate) struct BMFFBox<'a, T> {
    pub(crate) head: BoxHeader,
    pub(crate) content: Take<&'a mut T>,
}

pub(crate) struct BoxIter<'a, T> {
    src: &'a mut T,
}

impl<'a, T: Read + Offset> BoxIter<'a, T> {
    pub(crate) fn new(src: &mut T) -> BoxIter<'_, T> {
        BoxIter { src }
    }

    /// `None` when the source ends exactly at a box boundary.
    pub(crate) fn next_box(&mut self) -> Result<Option<BMFFBox<'_, T>>> {
        let position = self.src.offset();
        let mut size = [0u8; 4];
        match read_up_to(self.src, &mut size)? {
            0 => return Ok(None),
            4 => (),
            _ => return Err(Error::TruncatedInput),
        }
        let head = read_box_header_rest(self.src, u32::from_be_bytes(size), position)?;
        let limit = head.payload_size().unwrap_or(u64::MAX);
        Ok(Some(BMFFBox {
            head,
            content: self.src.take(limit),
        }))
    }
}

impl<'a, T: Read> Read for BMFFBox<'a, T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.content.read(buf)
    }
}

impl<'a, T: Read> TryRead for BMFFBox<'a, T> {
    fn try_read_to_end(&mut self, buf: &mut TryVec<u8>) -> std::io::Result<usize> {
        fallible_collections::try_read_up_to(self, self.bytes_left(), buf)
    }
}

impl<'a, T: Offset> Offset for BMFFBox<'a, T> {
    fn offset(&self) -> u64 {
        self.content.get_ref().offset()
    }
}

impl<'a, T: Read> BMFFBox<'a, T> {
    pub(crate) fn bytes_left(&self) -> u64 {
        self.content.limit()
    }

    /// Payload bytes read so far.
    pub(crate) fn consumed(&self) -> u64 {
        self.head.payload_size().unwrap_or(u64::MAX) - self.content.limit()
    }

    /// True once a sized box has handed out its whole payload.
    pub(crate) fn is_exhausted(&self) -> bool {
        !self.head.extends_to_end() && self.content.limit() == 0
    }

    pub(crate) fn get_header(&self) -> &BoxHeader {
        &self.head
    }
}

impl<'a, T> Drop for BMFFBox<'a, T> {
    fn drop(&mut self) {
        if !self.head.extends_to_end() && self.content.limit() > 0 {
            let name: FourCC = From::from(self.head.name);
            debug!("Dropping {} bytes in '{}'", self.content.limit(), name);
        }
    }
}

/// Read and parse a box header.
///
/// Call this first to determine the type of a particular mp4 box
/// and its length. The number of bytes consumed is `offset` of the
/// returned header. `position` is zero since the reader's own position
/// is unknown here.
///
/// See ISO 14496-12:2015 § 4.2
pub fn read_box_header<T: Read>(src: &mut T) -> Result<BoxHeader> {
    let size32 = be_u32(src)?;
    read_box_header_rest(src, size32, 0)
}

/// Parse the remainder of a box header once its 32-bit size has been read.
fn read_box_header_rest<T: ReadBytesExt>(
    src: &mut T,
    size32: u32,
    position: u64,
) -> Result<BoxHeader> {
    let name = BoxType::from(be_u32(src)?);
    let size = match size32 {
        // The box runs to the end of the input. Usually mdat, but any type may do this.
        0 => 0,
        1 => {
            let size64 = be_u64(src)?;
            if size64 < BoxHeader::MIN_LARGE_SIZE {
                return Err(Error::MalformedHeader("malformed wide size"));
            }
            size64
        }
        _ => {
            if u64::from(size32) < BoxHeader::MIN_SIZE {
                return Err(Error::MalformedHeader("malformed size"));
            }
            u64::from(size32)
        }
    };
    let mut offset = match size32 {
        1 => BoxHeader::MIN_LARGE_SIZE,
        _ => BoxHeader::MIN_SIZE,
    };
    let uuid = if name == BoxType::UuidBox {
        let mut buffer = [0u8; 16];
        src.read_exact(&mut buffer)?;
        offset += 16;
        Some(buffer)
    } else {
        None
    };
    if size != 0 && size < offset {
        return Err(Error::MalformedHeader("box size smaller than its header"));
    }
    Ok(BoxHeader {
        name,
        size,
        offset,
        uuid,
        position,
    })
}

/// Parse the extra header fields for a full box.
fn read_fullbox_extra<T: ReadBytesExt>(src: &mut T) -> Result<(u8, u32)> {
    let version = src.read_u8()?;
    let flags_a = src.read_u8()?;
    let flags_b = src.read_u8()?;
    let flags_c = src.read_u8()?;
    Ok((
        version,
        u32::from(flags_a) << 16 | u32::from(flags_b) << 8 | u32::from(flags_c),
    ))
}

/// Where a freshly created child box was stored inside its container.
///
/// `index` addresses list storage and is zero for singleton children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BoxSlot {
    pub(crate) name: BoxType,
    pub(crate) index: usize,
}

impl BoxSlot {
    pub(crate) fn single(name: BoxType) -> Self {
        Self { name, index: 0 }
    }

    pub(crate) fn nth(name: BoxType, index: usize) -> Self {
        Self { name, index }
    }
}

/// Implemented by every concrete box kind.
pub(crate) trait ParseBox: Sized {
    /// An empty box, to be filled by `parse_payload`.
    fn new(header: BoxHeader) -> Self;

    /// Read this box's payload from `src`, which is limited to that payload.
    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()>;
}

/// Implemented by anything that holds child boxes, including the file itself.
pub(crate) trait BoxContainer {
    /// Instantiate the child described by `header` and store it, returning where it went.
    ///
    /// Answers `Error::UnknownBoxType` for children this container does not keep.
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot>;

    /// Parse the payload of the child previously stored at `slot`, in place.
    fn parse_sub_box<T: Read + Offset>(
        &mut self,
        slot: BoxSlot,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()>;
}

/// Parse every box in `src` into `container`, until `src` ends at a box boundary.
///
/// Each iteration consumes exactly one header and the payload it declares.
pub(crate) fn read_sub_boxes<T, C>(
    src: &mut T,
    container: &mut C,
    ctx: &mut ParseContext,
) -> Result<()>
where
    T: Read + Offset,
    C: BoxContainer,
{
    let mut iter = BoxIter::new(src);
    while let Some(mut b) = iter.next_box()? {
        let parsed = match container.create_sub_box(&b.head, ctx) {
            Ok(slot) => container.parse_sub_box(slot, &mut b, ctx),
            Err(Error::UnknownBoxType(_)) => {
                ctx.info(&b.head, "unknown box skipped")?;
                skip_box_content(&mut b)
            }
            Err(e) => Err(e),
        };
        match parsed {
            Ok(()) => finish_box(&mut b, ctx)?,
            // The payload ran out before the fields did.
            Err(Error::TruncatedInput) if b.is_exhausted() => report_overrun(&b, ctx)?,
            Err(Error::SizeMismatch { .. }) if !ctx.is_strict() => {
                ctx.warn(&b.head, "box size mismatch")?;
                skip_box_remain(&mut b)?;
            }
            Err(e) => {
                debug!(
                    "failed to parse {:?} at offset {} (size {}): {}",
                    b.head.name, b.head.position, b.head.size, e
                );
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Check that a parsed box consumed exactly its declared payload.
///
/// Trailing bytes are read off before the sizes are compared, so input that ends
/// inside the box is reported as truncated rather than as a size mismatch.
fn finish_box<T: Read>(src: &mut BMFFBox<'_, T>, ctx: &mut ParseContext) -> Result<()> {
    let consumed = src.consumed();
    let trailing = if src.head.extends_to_end() {
        skip_to_end(src)?
    } else {
        let left = src.bytes_left();
        skip(src, left)?;
        left
    };
    if trailing == 0 {
        return Ok(());
    }
    let declared = consumed + trailing;
    debug!(
        "box {:?} parsed bytes != payload size: {} != {}",
        src.head.name, consumed, declared
    );
    if ctx.is_strict() {
        return Err(Error::SizeMismatch {
            box_type: src.head.name,
            offset: src.head.position,
            declared,
            consumed,
        });
    }
    ctx.warn(&src.head, "unconsumed bytes at the end of the box")
}

fn report_overrun<T: Read>(src: &BMFFBox<'_, T>, ctx: &mut ParseContext) -> Result<()> {
    let declared = src.consumed();
    if ctx.is_strict() {
        return Err(Error::SizeMismatch {
            box_type: src.head.name,
            offset: src.head.position,
            declared,
            // The fields wanted at least one byte more than the payload held.
            consumed: declared + 1,
        });
    }
    ctx.warn(&src.head, "box payload too short for its fields")
}

/// Some writers emit boxes with no payload at all. Those are kept as empty boxes.
pub(crate) fn empty_payload<T: Read>(
    src: &BMFFBox<'_, T>,
    ctx: &mut ParseContext,
) -> Result<bool> {
    if src.head.payload_size() != Some(0) {
        return Ok(false);
    }
    ctx.warn(&src.head, "box is empty")?;
    Ok(true)
}

/// Number of `entry_size`-byte table entries that can be read for a declared `count`.
pub(crate) fn table_len<T: Read>(
    src: &BMFFBox<'_, T>,
    count: u32,
    entry_size: u64,
    ctx: &mut ParseContext,
) -> Result<u32> {
    let needed = u64::from(count) * entry_size;
    let left = src.bytes_left();
    if needed <= left {
        return Ok(count);
    }
    if ctx.is_strict() {
        return Err(Error::SizeMismatch {
            box_type: src.head.name,
            offset: src.head.position,
            declared: src.consumed() + left,
            consumed: src.consumed() + needed,
        });
    }
    ctx.warn(&src.head, "table entry count exceeds box payload")?;
    Ok((left / entry_size).try_into()?)
}

/// Store a singleton child. A later duplicate replaces the earlier one.
pub(crate) fn place_single<B>(
    slot: &mut Option<B>,
    created: B,
    header: &BoxHeader,
    ctx: &mut ParseContext,
) -> Result<BoxSlot> {
    if slot.is_some() {
        ctx.warn(header, "duplicate box replaces an earlier one")?;
    }
    *slot = Some(created);
    Ok(BoxSlot::single(header.name))
}

/// Append a child to a list and address it by index.
pub(crate) fn place_nth<B>(list: &mut TryVec<B>, created: B, header: &BoxHeader) -> Result<BoxSlot> {
    list.push(created)?;
    Ok(BoxSlot::nth(header.name, list.len() - 1))
}

pub(crate) fn occupied<B>(slot: &mut Option<B>) -> Result<&mut B> {
    slot.as_mut().ok_or(Error::InvalidData("empty box slot"))
}

pub(crate) fn slot_at<B>(list: &mut TryVec<B>, index: usize) -> Result<&mut B> {
    list.get_mut(index).ok_or(Error::InvalidData("box slot out of range"))
}

pub(crate) fn foreign_slot() -> Error {
    Error::InvalidData("box slot not owned by this container")
}

/// Skip over the entire contents of a box.
fn skip_box_content<T: Read>(src: &mut BMFFBox<'_, T>) -> Result<()> {
    // Skip the contents of unknown chunks.
    debug!("{:?} (skipped)", src.get_header());
    match src.head.payload_size() {
        Some(to_skip) => {
            debug_assert_eq!(to_skip, src.bytes_left());
            skip(src, to_skip)
        }
        None => skip_to_end(src).map(drop),
    }
}

/// Skip over the remain data of a box.
fn skip_box_remain<T: Read>(src: &mut BMFFBox<'_, T>) -> Result<()> {
    if src.head.extends_to_end() {
        return skip_to_end(src).map(drop);
    }
    let remain = {
        let header = src.get_header();
        let len = src.bytes_left();
        debug!("remain {} (skipped) in {:?}", len, header);
        len
    };
    skip(src, remain)
}

/// Skip a number of bytes that we don't care to parse.
pub(crate) fn skip<T: Read>(src: &mut T, bytes: u64) -> Result<()> {
    let skipped = std::io::copy(&mut src.take(bytes), &mut std::io::sink())?;
    if skipped != bytes {
        return Err(Error::TruncatedInput);
    }
    Ok(())
}

/// Discard everything left in `src`, returning how much that was.
fn skip_to_end<T: Read>(src: &mut T) -> Result<u64> {
    Ok(std::io::copy(src, &mut std::io::sink())?)
}

/// Fill as much of `buf` as the source allows. Only a short count at end of input is not an error.
fn read_up_to<T: Read>(src: &mut T, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Read a whole source of unknown length into memory.
pub(crate) fn read_to_end<T: Read>(src: &mut T) -> Result<TryVec<u8>> {
    let mut data = TryVec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = read_up_to(src, &mut chunk)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n])?;
    }
    Ok(data)
}

/// Read the remaining payload of a box, which must be all there.
pub(crate) fn read_payload<T: Read>(src: &mut BMFFBox<'_, T>) -> Result<TryVec<u8>> {
    if src.head.extends_to_end() {
        return read_to_end(src);
    }
    let data = src.read_into_try_vec()?;
    if src.bytes_left() != 0 {
        return Err(Error::TruncatedInput);
    }
    Ok(data)
}

/// File type box 'ftyp'.
/// See ISO 14496-12:2015 § 4.3
#[derive(Debug)]
pub struct FileTypeBox {
    pub header: BoxHeader,
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: TryVec<FourCC>,
}

impl ParseBox for FileTypeBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            major_brand: FourCC::default(),
            minor_version: 0,
            compatible_brands: TryVec::new(),
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
        self.major_brand = From::from(be_u32(src)?);
        self.minor_version = be_u32(src)?;
        let bytes_left = src.bytes_left();
        if bytes_left % 4 != 0 {
            return Err(Error::InvalidData("invalid ftyp size"));
        }
        // Is a brand_count of zero valid?
        let brand_count = bytes_left / 4;
        let mut brands = TryVec::with_capacity(brand_count.try_into()?)?;
        for _ in 0..brand_count {
            brands.push(be_u32(src)?.into())?;
        }
        self.compatible_brands = brands;
        Ok(())
    }
}

/// Free space box, 'free' or 'skip'. The payload is kept as it was found.
/// See ISO 14496-12:2015 § 8.1.2
#[derive(Debug)]
pub struct FreeSpaceBox {
    pub header: BoxHeader,
    pub data: TryVec<u8>,
}

impl ParseBox for FreeSpaceBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            data: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        if src.head.payload_size() == Some(0) {
            return ctx.info(&src.head, "box is empty");
        }
        self.data = read_payload(src)?;
        Ok(())
    }
}

/// A Media Data Box
/// See ISO 14496-12:2015 § 8.1.1
#[derive(Debug)]
pub struct MediaDataBox {
    pub header: BoxHeader,
    /// Offset of the payload from the beginning of the file.
    pub offset: u64,
    /// Payload length, known even when `data` was not kept.
    pub len: u64,
    /// Empty unless `ParseOptions::keep_media_data` is set.
    pub data: TryVec<u8>,
}

impl MediaDataBox {
    /// An `mdat` counts as holding data once it was parsed with a non-empty payload.
    pub fn is_valid(&self) -> bool {
        self.len > 0
    }

    /// Split the kept payload into NAL units prefixed by `length_size`-byte lengths,
    /// as configured by the track's `avcC` record.
    pub fn nal_units(&self, length_size: u32) -> Result<TryVec<NalUnit>> {
        read_length_prefixed_nal_units(&self.data, length_size)
    }
}

impl ParseBox for MediaDataBox {
    fn new(header: BoxHeader) -> Self {
        Self {
            header,
            offset: 0,
            len: 0,
            data: TryVec::new(),
        }
    }

    fn parse_payload<T: Read + Offset>(
        &mut self,
        src: &mut BMFFBox<'_, T>,
        ctx: &mut ParseContext,
    ) -> Result<()> {
        self.offset = src.offset();
        if src.head.payload_size() == Some(0) {
            return ctx.info(&src.head, "box is empty");
        }
        if ctx.options.keep_media_data {
            self.data = read_payload(src)?;
        } else {
            skip_box_content(src)?;
        }
        self.len = src.consumed();
        Ok(())
    }
}

/// One movie fragment and the media data that follows it.
///
/// Fragmented files interleave `moof` and `mdat` at the top level, so they are
/// paired by arrival order. Either side may be missing.
#[derive(Debug, Default)]
pub struct MoofMdat {
    pub moof: Option<MovieFragmentBox>,
    pub mdat: Option<MediaDataBox>,
}

/// Top-level boxes of an mp4 file.
#[derive(Debug, Default)]
pub struct Boxes {
    pub ftyp: Option<FileTypeBox>,
    /// Both 'free' and 'skip' boxes, in file order.
    pub free: TryVec<FreeSpaceBox>,
    pub moov: Option<MovieBox>,
    pub moof_mdat: TryVec<MoofMdat>,
}

impl Boxes {
    /// Every AVC decoder configuration found in the movie's sample descriptions.
    pub fn avc_configs(&self) -> impl Iterator<Item = &AvcDecoderConfigurationRecord> {
        self.moov
            .iter()
            .flat_map(|moov| moov.tracks.iter())
            .filter_map(|trak| trak.mdia.as_ref())
            .filter_map(|mdia| mdia.minf.as_ref())
            .filter_map(|minf| minf.stbl.as_ref())
            .filter_map(|stbl| stbl.stsd.as_ref())
            .flat_map(|stsd| stsd.avc_entries.iter())
            .filter_map(|entry| entry.avcc.as_ref())
            .map(|avcc| &avcc.record)
    }
}

impl BoxContainer for Boxes {
    fn create_sub_box(&mut self, header: &BoxHeader, ctx: &mut ParseContext) -> Result<BoxSlot> {
        match ctx.registry.create(header)? {
            Mp4Box::FileType(ftyp) => place_single(&mut self.ftyp, ftyp, header, ctx),
            Mp4Box::FreeSpace(free) => place_nth(&mut self.free, free, header),
            Mp4Box::Movie(moov) => place_single(&mut self.moov, moov, header, ctx),
            Mp4Box::MovieFragment(moof) => {
                // moof always precedes its mdat, so it always opens a new pair.
                self.moof_mdat.push(MoofMdat {
                    moof: Some(moof),
                    mdat: None,
                })?;
                Ok(BoxSlot::nth(header.name, self.moof_mdat.len() - 1))
            }
            Mp4Box::MediaData(mdat) => {
                let open_pair = match self.moof_mdat.last() {
                    None => true,
                    Some(MoofMdat {
                        mdat: Some(previous),
                        ..
                    }) => {
                        if previous.is_valid() {
                            ctx.warn(header, "mdat without a preceding moof")?;
                            true
                        } else {
                            ctx.warn(header, "empty mdat replaced by the next one")?;
                            false
                        }
                    }
                    Some(_) => false,
                };
                if open_pair {
                    self.moof_mdat.push(MoofMdat::default())?;
                }
                let index = self.moof_mdat.len() - 1;
                let pair = slot_at(&mut self.moof_mdat, index)?;
                pair.mdat = Some(mdat);
                Ok(BoxSlot::nth(header.name, index))
            }
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
            BoxType::FileTypeBox => occupied(&mut self.ftyp)?.parse_payload(src, ctx),
            BoxType::FreeSpaceBox | BoxType::SkipBox => {
                slot_at(&mut self.free, slot.index)?.parse_payload(src, ctx)
            }
            BoxType::MovieBox => occupied(&mut self.moov)?.parse_payload(src, ctx),
            BoxType::MovieFragmentBox => {
                let pair = slot_at(&mut self.moof_mdat, slot.index)?;
                occupied(&mut pair.moof)?.parse_payload(src, ctx)
            }
            BoxType::MediaDataBox => {
                let pair = slot_at(&mut self.moof_mdat, slot.index)?;
                occupied(&mut pair.mdat)?.parse_payload(src, ctx)
            }
            _ => Err(foreign_slot()),
        }
    }
}

/// A parsed mp4 file together with the diagnostics its parse produced.
#[derive(Debug)]
pub struct Mp4File {
    pub boxes: Boxes,
    pub diagnostics: Diagnostics,
}

impl Mp4File {
    /// Parse with the default (strict) options.
    pub fn from_reader<T: Read>(f: &mut T) -> Result<Self> {
        read_mp4(f, &ParseOptions::default())
    }
}

/// Read the box tree of an mp4 file.
///
/// Boxes of unknown type are skipped. The parse ends successfully when the
/// input ends at a box boundary.
pub fn read_mp4<T: Read>(f: &mut T, options: &ParseOptions) -> Result<Mp4File> {
    let mut f = OffsetReader::new(f);
    let mut ctx = ParseContext::new(options)?;
    let mut boxes = Boxes::default();

    read_sub_boxes(&mut f, &mut boxes, &mut ctx)?;

    Ok(Mp4File {
        boxes,
        diagnostics: ctx.diagnostics,
    })
}

pub(crate) fn be_u16<T: ReadBytesExt>(src: &mut T) -> Result<u16> {
    src.read_u16::<byteorder::BigEndian>().map_err(From::from)
}

pub(crate) fn be_i16<T: ReadBytesExt>(src: &mut T) -> Result<i16> {
    src.read_i16::<byteorder::BigEndian>().map_err(From::from)
}

pub(crate) fn be_i32<T: ReadBytesExt>(src: &mut T) -> Result<i32> {
    src.read_i32::<byteorder::BigEndian>().map_err(From::from)
}

pub(crate) fn be_u32<T: ReadBytesExt>(src: &mut T) -> Result<u32> {
    src.read_u32::<byteorder::BigEndian>().map_err(From::from)
}

pub(crate) fn be_u64<T: ReadBytesExt>(src: &mut T) -> Result<u64> {
    src.read_u64::<byteorder::BigEndian>().map_err(From::from)
}
