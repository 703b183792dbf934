// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::avc::{AvcConfigurationBox, AvcSampleEntry};
use crate::fragment::{
    MovieFragmentBox, MovieFragmentHeaderBox, TrackFragmentBox, TrackFragmentDecodeTimeBox,
    TrackFragmentHeaderBox, TrackRunBox,
};
use crate::movie::{
    ChunkOffsetBox, CompositionOffsetBox, DataEntryUrlBox, DataInformationBox, DataReferenceBox,
    HandlerBox, MediaBox, MediaHeaderBox, MediaInformationBox, MovieBox, MovieHeaderBox,
    SampleDescriptionBox, SampleSizeBox, SampleTableBox, SampleToChunkBox, SoundMediaHeaderBox,
    SyncSampleBox, TimeToSampleBox, TrackBox, TrackHeaderBox, VideoMediaHeaderBox,
};
use crate::{
    BoxHeader, BoxType, Error, FileTypeBox, FreeSpaceBox, MediaDataBox, ParseBox, Result,
    TryHashMap,
};

/// A freshly constructed, not yet parsed box of any known kind.
#[derive(Debug)]
pub(crate) enum Mp4Box {
    FileType(FileTypeBox),
    FreeSpace(FreeSpaceBox),
    MediaData(MediaDataBox),
    Movie(MovieBox),
    MovieHeader(MovieHeaderBox),
    Track(TrackBox),
    TrackHeader(TrackHeaderBox),
    Media(MediaBox),
    MediaHeader(MediaHeaderBox),
    Handler(HandlerBox),
    MediaInformation(MediaInformationBox),
    VideoMediaHeader(VideoMediaHeaderBox),
    SoundMediaHeader(SoundMediaHeaderBox),
    DataInformation(DataInformationBox),
    DataReference(DataReferenceBox),
    DataEntryUrl(DataEntryUrlBox),
    SampleTable(SampleTableBox),
    SampleDescription(SampleDescriptionBox),
    TimeToSample(TimeToSampleBox),
    CompositionOffset(CompositionOffsetBox),
    SyncSample(SyncSampleBox),
    SampleToChunk(SampleToChunkBox),
    SampleSize(SampleSizeBox),
    ChunkOffset(ChunkOffsetBox),
    AvcSampleEntry(AvcSampleEntry),
    AvcConfiguration(AvcConfigurationBox),
    MovieFragment(MovieFragmentBox),
    MovieFragmentHeader(MovieFragmentHeaderBox),
    TrackFragment(TrackFragmentBox),
    TrackFragmentHeader(TrackFragmentHeaderBox),
    TrackFragmentDecodeTime(TrackFragmentDecodeTimeBox),
    TrackRun(TrackRunBox),
}

type Constructor = fn(BoxHeader) -> Mp4Box;

/// Maps box types to constructors. Built once per parse and only read afterwards.
pub(crate) struct BoxRegistry {
    constructors: TryHashMap<BoxType, Constructor>,
}

impl BoxRegistry {
    pub(crate) fn new() -> Result<Self> {
        let known: &[(BoxType, Constructor)] = &[
            (BoxType::FileTypeBox, |h| Mp4Box::FileType(FileTypeBox::new(h))),
            (BoxType::FreeSpaceBox, |h| Mp4Box::FreeSpace(FreeSpaceBox::new(h))),
            (BoxType::SkipBox, |h| Mp4Box::FreeSpace(FreeSpaceBox::new(h))),
            (BoxType::MediaDataBox, |h| Mp4Box::MediaData(MediaDataBox::new(h))),
            (BoxType::MovieBox, |h| Mp4Box::Movie(MovieBox::new(h))),
            (BoxType::MovieHeaderBox, |h| Mp4Box::MovieHeader(MovieHeaderBox::new(h))),
            (BoxType::TrackBox, |h| Mp4Box::Track(TrackBox::new(h))),
            (BoxType::TrackHeaderBox, |h| Mp4Box::TrackHeader(TrackHeaderBox::new(h))),
            (BoxType::MediaBox, |h| Mp4Box::Media(MediaBox::new(h))),
            (BoxType::MediaHeaderBox, |h| Mp4Box::MediaHeader(MediaHeaderBox::new(h))),
            (BoxType::HandlerBox, |h| Mp4Box::Handler(HandlerBox::new(h))),
            (BoxType::MediaInformationBox, |h| {
                Mp4Box::MediaInformation(MediaInformationBox::new(h))
            }),
            (BoxType::VideoMediaHeaderBox, |h| {
                Mp4Box::VideoMediaHeader(VideoMediaHeaderBox::new(h))
            }),
            (BoxType::SoundMediaHeaderBox, |h| {
                Mp4Box::SoundMediaHeader(SoundMediaHeaderBox::new(h))
            }),
            (BoxType::DataInformationBox, |h| {
                Mp4Box::DataInformation(DataInformationBox::new(h))
            }),
            (BoxType::DataReferenceBox, |h| Mp4Box::DataReference(DataReferenceBox::new(h))),
            (BoxType::DataEntryUrlBox, |h| Mp4Box::DataEntryUrl(DataEntryUrlBox::new(h))),
            (BoxType::SampleTableBox, |h| Mp4Box::SampleTable(SampleTableBox::new(h))),
            (BoxType::SampleDescriptionBox, |h| {
                Mp4Box::SampleDescription(SampleDescriptionBox::new(h))
            }),
            (BoxType::TimeToSampleBox, |h| Mp4Box::TimeToSample(TimeToSampleBox::new(h))),
            (BoxType::CompositionOffsetBox, |h| {
                Mp4Box::CompositionOffset(CompositionOffsetBox::new(h))
            }),
            (BoxType::SyncSampleBox, |h| Mp4Box::SyncSample(SyncSampleBox::new(h))),
            (BoxType::SampleToChunkBox, |h| Mp4Box::SampleToChunk(SampleToChunkBox::new(h))),
            (BoxType::SampleSizeBox, |h| Mp4Box::SampleSize(SampleSizeBox::new(h))),
            (BoxType::ChunkOffsetBox, |h| Mp4Box::ChunkOffset(ChunkOffsetBox::new(h))),
            (BoxType::ChunkLargeOffsetBox, |h| Mp4Box::ChunkOffset(ChunkOffsetBox::new(h))),
            (BoxType::AVCSampleEntry, |h| Mp4Box::AvcSampleEntry(AvcSampleEntry::new(h))),
            (BoxType::AVC3SampleEntry, |h| Mp4Box::AvcSampleEntry(AvcSampleEntry::new(h))),
            (BoxType::AVCConfigurationBox, |h| {
                Mp4Box::AvcConfiguration(AvcConfigurationBox::new(h))
            }),
            (BoxType::MovieFragmentBox, |h| Mp4Box::MovieFragment(MovieFragmentBox::new(h))),
            (BoxType::MovieFragmentHeaderBox, |h| {
                Mp4Box::MovieFragmentHeader(MovieFragmentHeaderBox::new(h))
            }),
            (BoxType::TrackFragmentBox, |h| Mp4Box::TrackFragment(TrackFragmentBox::new(h))),
            (BoxType::TrackFragmentHeaderBox, |h| {
                Mp4Box::TrackFragmentHeader(TrackFragmentHeaderBox::new(h))
            }),
            (BoxType::TrackFragmentBaseMediaDecodeTimeBox, |h| {
                Mp4Box::TrackFragmentDecodeTime(TrackFragmentDecodeTimeBox::new(h))
            }),
            (BoxType::TrackRunBox, |h| Mp4Box::TrackRun(TrackRunBox::new(h))),
        ];
        let mut constructors = TryHashMap::with_capacity(known.len())?;
        for &(name, constructor) in known {
            constructors.insert(name, constructor)?;
        }
        Ok(Self { constructors })
    }

    /// Instantiate an empty box for `header`, or `Error::UnknownBoxType`.
    pub(crate) fn create(&self, header: &BoxHeader) -> Result<Mp4Box> {
        match self.constructors.get(&header.name) {
            Some(constructor) => Ok(constructor(*header)),
            None => Err(Error::UnknownBoxType(header.name)),
        }
    }
}
