//! Feeds raw TS packets through PAT/PMT tracking and per-PID demuxing,
//! producing the ordered sequence of wire messages a client session sends
//! downstream: one `STREAM_CHANGE` whenever the stream layout becomes
//! known or changes, then a `STREAM_MUXPKT` per access unit.

use bytes::Bytes;

use crate::parsers::Frame;
use crate::stream_info::{Content, FrameType, StreamBundle, StreamInfo, StreamType};

/// Default codec preference for the stream-reorder tiebreak (spec §4.5 bit
/// 20) until a client requests otherwise.
const DEFAULT_PREFERRED_STREAM_TYPE: StreamType = StreamType::Ac3;
use crate::ts::{DemuxerBundle, PatPmtParser, PmtStreamEntry, TsHeader, PID_PAT};
use crate::wire::{self, OutboundMessage};

const PRE_QUEUE_LIMIT: usize = 200;

/// One framed outbound message paired with the metadata the timeshift ring
/// needs for keyframe indexing (`STREAM_CHANGE` carries neutral metadata;
/// it is never itself a keyframe).
#[derive(Clone)]
pub struct QueuedOutbound {
    pub bytes: Bytes,
    pub content: Content,
    pub frame_type: FrameType,
    pub pts: i64,
}

fn stream_type_for_entry(entry: &PmtStreamEntry) -> StreamType {
    if let Some(tag) = entry.descriptor_tag {
        return match tag {
            0x6A => StreamType::Ac3,
            0x7A => StreamType::Eac3,
            0x56 => StreamType::Teletext,
            _ => StreamType::None,
        };
    }
    match entry.stream_type {
        0x01 | 0x02 => StreamType::Mpeg2Video,
        0x03 | 0x04 => StreamType::Mpeg2Audio,
        0x0F => StreamType::Aac,
        0x11 => StreamType::Latm,
        0x1B => StreamType::H264,
        0x24 => StreamType::H265,
        0x06 if entry.composition_page_id != 0 || entry.ancillary_page_id != 0 => StreamType::DvbSub,
        _ => StreamType::None,
    }
}

fn build_stream_bundle(patpmt: &PatPmtParser) -> StreamBundle {
    let mut bundle = StreamBundle::new();
    for entry in &patpmt.streams {
        let stream_type = stream_type_for_entry(entry);
        if stream_type == StreamType::None {
            continue;
        }
        bundle.add_stream(StreamInfo::new(entry.pid, stream_type, entry.language.clone()));
    }
    bundle
}

fn frame_type_code(ft: FrameType) -> u8 {
    match ft {
        FrameType::Unknown => 0,
        FrameType::I => 1,
        FrameType::P => 2,
        FrameType::B => 3,
        FrameType::D => 4,
    }
}

pub struct StreamPacketProcessor {
    patpmt: PatPmtParser,
    demuxers: DemuxerBundle,
    applied_pmt_version: Option<u8>,
    request_stream_change: bool,
    pre_queue: Vec<QueuedOutbound>,
    channel: u16,
    uid: u32,
    preferred_language: String,
    preferred_audio_type: u8,
    preferred_stream_type: StreamType,
}

impl StreamPacketProcessor {
    pub fn new(channel: u16, uid: u32, preferred_language: impl Into<String>) -> Self {
        StreamPacketProcessor {
            patpmt: PatPmtParser::new(),
            demuxers: DemuxerBundle::new(),
            applied_pmt_version: None,
            request_stream_change: true,
            pre_queue: Vec::new(),
            channel,
            uid,
            preferred_language: preferred_language.into(),
            preferred_audio_type: 0,
            preferred_stream_type: DEFAULT_PREFERRED_STREAM_TYPE,
        }
    }

    pub fn reset(&mut self) {
        self.patpmt = PatPmtParser::new();
        self.demuxers.clear();
        self.applied_pmt_version = None;
        self.request_stream_change = true;
        self.pre_queue.clear();
    }

    /// Pre-creates demuxers from a previously cached stream bundle, so PES
    /// payloads arriving before this channel's own PMT has been parsed
    /// still route to a demuxer instead of being dropped. Superseded by
    /// the real bundle once this channel's PMT resolves.
    pub fn seed(&mut self, bundle: &StreamBundle) {
        self.demuxers.update_from(bundle);
    }

    /// True once every demuxer has parsed enough to describe its stream,
    /// i.e. the layout this channel's next `ChannelMetadataCache` entry
    /// should reflect.
    pub fn is_ready(&self) -> bool {
        self.demuxers.is_ready()
    }

    /// Snapshot of the currently active stream layout, suitable for
    /// seeding a future switch back to this channel.
    pub fn current_bundle(&self) -> StreamBundle {
        let mut bundle = StreamBundle::new();
        for info in self.demuxers.stream_infos() {
            bundle.add_stream(info.clone());
        }
        bundle
    }

    /// Feeds one TS packet, returning every wire message produced as a
    /// result, in send order, paired with ring-indexing metadata.
    pub fn put_ts_packet(&mut self, packet: &[u8]) -> Vec<QueuedOutbound> {
        let Ok(header) = TsHeader::parse(packet) else {
            return Vec::new();
        };

        if header.pid == PID_PAT {
            let _ = self.patpmt.feed_pat(&packet[header.payload_offset(packet)..]);
        } else if Some(header.pid) == self.patpmt.pmt_pid {
            let _ = self.patpmt.feed_pmt(&packet[header.payload_offset(packet)..]);
        }

        if let (Some(_), Some(pmt_version)) = (self.patpmt.pat_version, self.patpmt.pmt_version) {
            if self.applied_pmt_version != Some(pmt_version) {
                log::info!("PMT version changed to {pmt_version}, rebuilding demuxers");
                self.pre_queue.clear();
                self.applied_pmt_version = Some(pmt_version);
                self.request_stream_change = true;
                let bundle = build_stream_bundle(&self.patpmt);
                self.demuxers.update_from(&bundle);
            }
        }

        let frames = self.demuxers.process_ts_packet(&header, packet);
        let content = self.demuxers.content_of(header.pid).unwrap_or(Content::None);

        let mut out = Vec::new();
        for frame in frames {
            let muxpkt = QueuedOutbound {
                bytes: self.build_muxpkt(header.pid, &frame),
                content,
                frame_type: frame.frame_type,
                pts: frame.pts.unwrap_or(0),
            };

            if self.demuxers.is_ready() {
                if self.request_stream_change {
                    out.push(QueuedOutbound {
                        bytes: self.build_stream_change(),
                        content: Content::None,
                        frame_type: FrameType::Unknown,
                        pts: 0,
                    });
                    self.request_stream_change = false;
                    out.extend(self.pre_queue.drain(..));
                }
                out.push(muxpkt);
            } else if self.pre_queue.len() >= PRE_QUEUE_LIMIT {
                log::warn!("pre-queue full ({PRE_QUEUE_LIMIT}), dropping muxpkt for pid {}", header.pid);
            } else {
                self.pre_queue.push(muxpkt);
            }
        }

        out
    }

    /// Updates the preferred-language tiebreak used when ordering streams
    /// in the next `STREAM_CHANGE`.
    pub fn set_preferred_language(&mut self, language: impl Into<String>) {
        self.preferred_language = language.into();
    }

    /// Updates the preferred audio-stream-type tiebreak (main vs. a
    /// descriptive/visually-impaired/etc. audio track) used when ordering
    /// streams in the next `STREAM_CHANGE`.
    pub fn set_preferred_audio_type(&mut self, audio_type: u8) {
        self.preferred_audio_type = audio_type;
    }

    /// Updates the preferred audio codec tiebreak (e.g. AC3 over EAC3) used
    /// when ordering streams in the next `STREAM_CHANGE`.
    pub fn set_preferred_stream_type(&mut self, stream_type: StreamType) {
        self.preferred_stream_type = stream_type;
    }

    fn build_muxpkt(&self, pid: u16, frame: &Frame) -> Bytes {
        let mut msg = OutboundMessage::new(wire::stream_msg::MUXPKT, self.channel, self.uid);
        msg.put_u16(pid);
        msg.put_i64(frame.pts.unwrap_or(0));
        msg.put_i64(frame.dts.unwrap_or(frame.pts.unwrap_or(0)));
        msg.put_u32(0); // duration: left to the client's own pacing on the live path
        msg.put_u8(frame_type_code(frame.frame_type));
        msg.put_u32(frame.data.len() as u32);
        msg.put_bytes(&frame.data);
        msg.finish()
    }

    fn build_stream_change(&self) -> Bytes {
        let mut msg = OutboundMessage::new(wire::stream_msg::CHANGE, self.channel, self.uid);
        let infos = self.demuxers.reordered_stream_infos(
            &self.preferred_language,
            self.preferred_audio_type,
            self.preferred_stream_type,
        );
        msg.put_u8(infos.len() as u8);

        for info in infos {
            msg.put_u32(info.pid as u32);
            match info.content() {
                Content::Audio => {
                    msg.put_string(info.stream_type.type_name());
                    msg.put_string(&info.language);
                    msg.put_u32(info.audio.channels as u32);
                    msg.put_u32(info.audio.sample_rate);
                    msg.put_u32(0);
                    msg.put_u32(info.audio.bit_rate);
                    msg.put_u32(0);
                }
                Content::Video => {
                    msg.put_string(info.stream_type.type_name());
                    msg.put_u32(info.video.fps_scale);
                    msg.put_u32(info.video.fps_rate);
                    msg.put_u32(info.video.height as u32);
                    msg.put_u32(info.video.width as u32);
                    msg.put_i64(info.video.aspect);
                    msg.put_blob_u8(&info.decoder.sps);
                    msg.put_blob_u8(&info.decoder.pps);
                    if !info.decoder.vps.is_empty() {
                        msg.put_blob_u8(&info.decoder.vps);
                    } else {
                        msg.put_u8(0);
                    }
                }
                Content::Subtitle => {
                    msg.put_string(info.stream_type.type_name());
                    msg.put_string(&info.language);
                    msg.put_u32(info.subtitle.composition_page_id);
                    msg.put_u32(info.subtitle.ancillary_page_id);
                }
                Content::Teletext => {
                    msg.put_string(info.stream_type.type_name());
                }
                Content::None => {}
            }
        }

        msg.finish()
    }
}
