//! Per-codec elementary stream parsers.
//!
//! Each codec gets its own small struct implementing [`CodecParser`]; the
//! scan loop that turns a byte stream into discrete access units is shared
//! (`Scanner`), and each parser owns its [`FrameRing`] by composition rather
//! than by inheriting a shared base buffer.

mod aac_adts;
mod aac_latm;
mod ac3;
mod h264;
mod h265;
mod mpeg2video;
mod mpegaudio;
mod subtitle;

pub use aac_adts::AacAdtsParser;
pub use aac_latm::AacLatmParser;
pub use ac3::Ac3Parser;
pub use h264::H264Parser;
pub use h265::H265Parser;
pub use mpeg2video::Mpeg2VideoParser;
pub use mpegaudio::MpegAudioParser;
pub use subtitle::{SubtitleParser, TeletextParser};

use crate::ring::FrameRing;
use crate::stream_info::{FrameType, StreamInfo, StreamType};

/// One fully assembled access unit ready to hand to the demuxer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub frame_type: FrameType,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
}

/// Per-codec header recognition and payload extraction.
///
/// Implementors never see ring-buffer mechanics: `Scanner` hands them a
/// candidate slice already known to be exactly one frame long.
pub trait CodecParser {
    /// Minimum bytes needed before `frame_len` can make a determination.
    fn min_probe_len(&self) -> usize;

    /// Given at least `min_probe_len` bytes at the front of the buffer,
    /// returns the total length of the frame starting there if the header
    /// is valid, or `None` if it is not a valid start (caller resyncs by
    /// one byte and retries).
    fn frame_len(&self, buf: &[u8]) -> Option<usize>;

    /// Extracts decoder metadata and the sendable payload(s) from one
    /// complete frame. Fills in content-specific fields on `info` and
    /// marks `info.parsed` once enough has been seen.
    ///
    /// Usually returns zero or one frame; MPEG-2 video can return more than
    /// one when a single PES payload carries several pictures. Returns
    /// nothing while a frame is buffered internally awaiting its pair
    /// (H.264/H.265 top-field-first interlace handling).
    fn extract(&mut self, frame: &[u8], info: &mut StreamInfo, pts: Option<i64>, dts: Option<i64>) -> Vec<Frame>;
}

/// Ring-buffer-driven scan loop shared by every codec.
///
/// Mirrors the source parser's `putData`/`parse` cycle: PES payloads are
/// appended to an internal ring, then scanned repeatedly for a valid frame
/// header; a byte that doesn't start a valid frame is skipped one at a time
/// to resynchronize.
pub struct Scanner<P: CodecParser> {
    ring: FrameRing,
    parser: P,
}

/// Ring sized to comfortably hold the largest single elementary-stream PES
/// payload plus enough slack for one full frame scan.
const RING_CAPACITY: usize = 512 * 1024;
const RING_MARGIN: usize = 16 * 1024;

impl<P: CodecParser> Scanner<P> {
    pub fn new(parser: P) -> Self {
        Scanner {
            ring: FrameRing::new(RING_CAPACITY, RING_MARGIN),
            parser,
        }
    }

    /// Appends newly received PES payload bytes. A short store (ring full)
    /// forces a hard resync: the ring is cleared and the new data becomes
    /// the sole contents, matching the source's overflow handling.
    pub fn put_data(&mut self, data: &[u8]) {
        let stored = self.ring.put(data);
        if stored < data.len() {
            self.ring.clear();
            self.ring.put(data);
        }
    }

    /// Scans the buffered bytes, extracting every complete frame currently
    /// available and appending emitted ones to `out`.
    pub fn parse(&mut self, info: &mut StreamInfo, pts: Option<i64>, dts: Option<i64>, out: &mut Vec<Frame>) {
        loop {
            let buf = self.ring.get();
            if buf.len() < self.parser.min_probe_len() {
                break;
            }

            match self.parser.frame_len(buf) {
                Some(size) if size <= buf.len() => {
                    let frame_bytes = buf[..size].to_vec();
                    out.extend(self.parser.extract(&frame_bytes, info, pts, dts));
                    self.ring.del(size);
                }
                Some(_) => break, // valid header, frame not fully buffered yet
                None => self.ring.del(1),
            }
        }
    }
}

/// Enum-dispatch family covering every supported elementary stream codec.
///
/// Chosen over a trait-object/virtual-dispatch hierarchy: the set of codecs
/// is closed and known at compile time, so a match arm is both cheaper and
/// easier to exhaustively test than a vtable.
pub enum Parser {
    H264(Scanner<H264Parser>),
    H265(Scanner<H265Parser>),
    Mpeg2Video(Scanner<Mpeg2VideoParser>),
    MpegAudio(Scanner<MpegAudioParser>),
    AacAdts(Scanner<AacAdtsParser>),
    AacLatm(Scanner<AacLatmParser>),
    Ac3(Scanner<Ac3Parser>),
    Subtitle(Scanner<SubtitleParser>),
    Teletext(Scanner<TeletextParser>),
}

impl Parser {
    /// Builds the parser appropriate for `stream_type`, or `None` for
    /// codecs this crate doesn't carry a parser for.
    pub fn for_stream_type(stream_type: StreamType) -> Option<Self> {
        Some(match stream_type {
            StreamType::H264 => Parser::H264(Scanner::new(H264Parser::new())),
            StreamType::H265 => Parser::H265(Scanner::new(H265Parser::new())),
            StreamType::Mpeg2Video => Parser::Mpeg2Video(Scanner::new(Mpeg2VideoParser::new())),
            StreamType::Mpeg2Audio => Parser::MpegAudio(Scanner::new(MpegAudioParser::new())),
            StreamType::Aac => Parser::AacAdts(Scanner::new(AacAdtsParser::new())),
            StreamType::Latm => Parser::AacLatm(Scanner::new(AacLatmParser::new())),
            StreamType::Ac3 | StreamType::Eac3 => Parser::Ac3(Scanner::new(Ac3Parser::new())),
            StreamType::DvbSub => Parser::Subtitle(Scanner::new(SubtitleParser::new())),
            StreamType::Teletext => Parser::Teletext(Scanner::new(TeletextParser::new())),
            StreamType::None => return None,
        })
    }

    pub fn put_data(&mut self, data: &[u8]) {
        match self {
            Parser::H264(s) => s.put_data(data),
            Parser::H265(s) => s.put_data(data),
            Parser::Mpeg2Video(s) => s.put_data(data),
            Parser::MpegAudio(s) => s.put_data(data),
            Parser::AacAdts(s) => s.put_data(data),
            Parser::AacLatm(s) => s.put_data(data),
            Parser::Ac3(s) => s.put_data(data),
            Parser::Subtitle(s) => s.put_data(data),
            Parser::Teletext(s) => s.put_data(data),
        }
    }

    pub fn parse(&mut self, info: &mut StreamInfo, pts: Option<i64>, dts: Option<i64>, out: &mut Vec<Frame>) {
        match self {
            Parser::H264(s) => s.parse(info, pts, dts, out),
            Parser::H265(s) => s.parse(info, pts, dts, out),
            Parser::Mpeg2Video(s) => s.parse(info, pts, dts, out),
            Parser::MpegAudio(s) => s.parse(info, pts, dts, out),
            Parser::AacAdts(s) => s.parse(info, pts, dts, out),
            Parser::AacLatm(s) => s.parse(info, pts, dts, out),
            Parser::Ac3(s) => s.parse(info, pts, dts, out),
            Parser::Subtitle(s) => s.parse(info, pts, dts, out),
            Parser::Teletext(s) => s.parse(info, pts, dts, out),
        }
    }
}

/// NAL-unit emulation prevention removal: `00 00 03` → `00 00`, shared by
/// H.264 and H.265.
pub(crate) fn unescape_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if i >= 2 && i < data.len() - 1 && out.len() >= 2 && data[i] == 0x03 && data[i - 2] == 0x00 && data[i - 1] == 0x00 {
            i += 1;
            continue;
        }
        out.push(data[i]);
        i += 1;
    }
    out
}

/// Scans for a `00 00 01` start code, returning the offset of the byte
/// following the prefix (i.e. where the NAL/start-code-specific header
/// begins), or `None` if not found.
pub(crate) fn find_start_code(data: &[u8]) -> Option<usize> {
    if data.len() < 3 {
        return None;
    }
    data.windows(3).position(|w| w == [0x00, 0x00, 0x01]).map(|pos| pos + 3)
}
