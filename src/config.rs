// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Engine configuration.

Every field has a default; a few can be overridden from the environment, which is handy when
chasing latency or pipelining bugs without rebuilding:

| variable                              | field                             |
|---------------------------------------|-----------------------------------|
| `FIF_FRAME_COUNT`                     | [EngineConfig::frames_in_flight]  |
| `FIF_BUFFER_COUNT`                    | [EngineConfig::swap_chain_buffer_count] |
| `FIF_WAITABLE_SWAP_CHAIN_MAX_LATENCY` | [EngineConfig::waitable_swap_chain_max_latency] |
| `FIF_DUMP_READBACK`                   | [EngineConfig::dump_readbacks]    |
*/
use std::str::FromStr;

pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;
pub const DEFAULT_SWAP_CHAIN_BUFFER_COUNT: u32 = 3;
pub const MAX_SWAP_CHAIN_BUFFER_COUNT: u32 = 4;
pub const MAX_SWAP_CHAIN_LATENCY: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Frames whose GPU work may be outstanding at once, `1..=4`.
    pub frames_in_flight: usize,
    /// Back buffers of the default render target, `2..=4`.
    pub swap_chain_buffer_count: u32,
    /// When nonzero, `begin_frame` first waits until no more than this many presented frames are
    /// still executing.
    pub waitable_swap_chain_max_latency: u32,
    /// Draws recorded into one command list before it is submitted and a new one begun.
    pub max_draw_calls_per_list: u32,
    pub max_cached_pipelines: usize,
    pub max_cached_root_signatures: usize,
    /// Initial descriptor capacity of each frame slot's GPU-visible heap.
    pub gpu_descriptor_heap_size: u32,
    /// Buffer backing objects are rounded up to a multiple of this.
    pub buffer_alignment: u64,
    /// Write every readback to `readback_<frame>_<id>.png` in the working directory.
    pub dump_readbacks: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            swap_chain_buffer_count: DEFAULT_SWAP_CHAIN_BUFFER_COUNT,
            waitable_swap_chain_max_latency: 0,
            max_draw_calls_per_list: 4096,
            max_cached_pipelines: 64,
            max_cached_root_signatures: 16,
            gpu_descriptor_heap_size: 512,
            buffer_alignment: 4096,
            dump_readbacks: false,
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Option<T> {
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            logwise::warn_sync!(
                "Ignoring unparsable {key}={value}",
                key = key,
                value = logwise::privacy::LogIt(&value)
            );
            None
        }
    }
}

impl EngineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(frames) = parse::<usize>(&lookup, "FIF_FRAME_COUNT") {
            self.frames_in_flight = frames;
        }
        if let Some(buffers) = parse::<u32>(&lookup, "FIF_BUFFER_COUNT") {
            self.swap_chain_buffer_count = buffers;
        }
        if let Some(latency) = parse::<u32>(&lookup, "FIF_WAITABLE_SWAP_CHAIN_MAX_LATENCY") {
            self.waitable_swap_chain_max_latency = latency;
        }
        if lookup("FIF_DUMP_READBACK").is_some() {
            self.dump_readbacks = true;
        }
        self.sanitized()
    }

    /// Out-of-range counts fall back to their defaults (or are clamped to the maximum).
    pub(crate) fn sanitized(mut self) -> Self {
        if self.frames_in_flight < 1 {
            self.frames_in_flight = DEFAULT_FRAMES_IN_FLIGHT;
        }
        self.frames_in_flight = self.frames_in_flight.min(MAX_FRAMES_IN_FLIGHT);
        if self.swap_chain_buffer_count < 2 {
            self.swap_chain_buffer_count = DEFAULT_SWAP_CHAIN_BUFFER_COUNT;
        }
        self.swap_chain_buffer_count = self
            .swap_chain_buffer_count
            .min(MAX_SWAP_CHAIN_BUFFER_COUNT);
        self.waitable_swap_chain_max_latency = self
            .waitable_swap_chain_max_latency
            .min(MAX_SWAP_CHAIN_LATENCY);
        self.max_draw_calls_per_list = self.max_draw_calls_per_list.max(1);
        self.max_cached_pipelines = self.max_cached_pipelines.max(1);
        self.max_cached_root_signatures = self.max_cached_root_signatures.max(1);
        self.gpu_descriptor_heap_size = self.gpu_descriptor_heap_size.max(1);
        self.buffer_alignment = self.buffer_alignment.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn overrides() {
        let c = EngineConfig::default().with_overrides(env(&[
            ("FIF_FRAME_COUNT", "3"),
            ("FIF_BUFFER_COUNT", "4"),
            ("FIF_WAITABLE_SWAP_CHAIN_MAX_LATENCY", "40"),
            ("FIF_DUMP_READBACK", ""),
        ]));
        assert_eq!(c.frames_in_flight, 3);
        assert_eq!(c.swap_chain_buffer_count, 4);
        assert_eq!(c.waitable_swap_chain_max_latency, MAX_SWAP_CHAIN_LATENCY);
        assert!(c.dump_readbacks);
    }

    #[test]
    fn bad_values() {
        let c = EngineConfig::default().with_overrides(env(&[
            ("FIF_FRAME_COUNT", "0"),
            ("FIF_BUFFER_COUNT", "lots"),
        ]));
        assert_eq!(c.frames_in_flight, DEFAULT_FRAMES_IN_FLIGHT);
        assert_eq!(c.swap_chain_buffer_count, DEFAULT_SWAP_CHAIN_BUFFER_COUNT);
        let c = EngineConfig::default().with_overrides(env(&[("FIF_FRAME_COUNT", "9")]));
        assert_eq!(c.frames_in_flight, MAX_FRAMES_IN_FLIGHT);
        assert!(!c.dump_readbacks);
    }
}
