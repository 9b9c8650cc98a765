//! Per-channel stream-bundle cache used to seed demuxers before a fresh
//! PMT arrives.
//!
//! The source keeps this behind a module-wide singleton alongside the
//! SQLite-backed channel/EPG/timer storage. The live-streaming core only
//! ever needs the narrow lookup-by-channel-UID interface, so that's all
//! this crate carries: a small explicit value constructed at startup and
//! passed by reference, not a global.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::stream_info::StreamBundle;

/// Anything that can answer "what did we last see on this channel" and
/// record a fresh answer once one is known. `LivePipeline::switch_channel`
/// seeds its demuxer bundle from `lookup` before the first PMT of the new
/// channel has arrived, so streams already parse from the first TS packet,
/// and calls `put` once that channel's own PMT has been fully parsed.
pub trait ChannelLookup {
    fn lookup(&self, channel_uid: u32) -> Option<StreamBundle>;
    fn put(&self, channel_uid: u32, bundle: StreamBundle);
}

/// In-memory channel metadata cache, keyed by channel UID.
///
/// Guarded by a single short-held mutex; callers needing to persist a
/// freshly observed bundle to slower storage (the source's SQLite table)
/// should do that work on a detached task, not while holding this lock.
#[derive(Default)]
pub struct ChannelMetadataCache {
    entries: Mutex<HashMap<u32, StreamBundle>>,
}

impl ChannelMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current bundle for `channel_uid`, overwriting any prior
    /// entry.
    pub fn put(&self, channel_uid: u32, bundle: StreamBundle) {
        self.entries.lock().insert(channel_uid, bundle);
    }

    /// Drops any cached bundle for `channel_uid`.
    pub fn remove(&self, channel_uid: u32) {
        self.entries.lock().remove(&channel_uid);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ChannelLookup for ChannelMetadataCache {
    fn lookup(&self, channel_uid: u32) -> Option<StreamBundle> {
        self.entries.lock().get(&channel_uid).cloned()
    }

    fn put(&self, channel_uid: u32, bundle: StreamBundle) {
        ChannelMetadataCache::put(self, channel_uid, bundle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_info::{StreamInfo, StreamType};

    #[test]
    fn lookup_returns_none_for_unknown_channel() {
        let cache = ChannelMetadataCache::new();
        assert!(cache.lookup(7).is_none());
    }

    #[test]
    fn put_then_lookup_round_trips() {
        let cache = ChannelMetadataCache::new();
        let mut bundle = StreamBundle::new();
        bundle.add_stream(StreamInfo::new(0x100, StreamType::H264, ""));

        cache.put(7, bundle);
        let found = cache.lookup(7).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn remove_clears_entry() {
        let cache = ChannelMetadataCache::new();
        cache.put(7, StreamBundle::new());
        cache.remove(7);
        assert!(cache.lookup(7).is_none());
    }
}
