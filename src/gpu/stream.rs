//! Line framing and parsing for the GPU helper stream
//!
//! The helper's stdout is a raw byte stream: a single read may deliver a
//! partial line, several lines, or split one line across two reads.
//! `LineBuffer` accumulates chunks and hands out only complete lines,
//! retaining the trailing partial across calls. `parse_gpu_line` turns
//! one complete line into a typed record.

use crate::error::ProfileError;

/// Accumulates raw chunks and emits complete `\n`-terminated lines.
#[derive(Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every line completed by it, in order and
    /// without the terminating newline. Anything after the last newline
    /// stays buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop(); // trailing '\n'
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

/// One parsed record of the helper stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuLine {
    pub device_index: usize,
    pub usage_percent: f32,
    pub used_mem_kib: u64,
    pub total_mem_kib: u64,
}

/// Parse one `index, usage %, used MiB, total MiB` helper line.
///
/// The helper emits comma-separated values, so a line without any comma
/// means the stream is garbled and the watch must be torn down; commas
/// are stripped (not split on) and the remainder must hold exactly four
/// whitespace-separated tokens. Memory values are converted from MiB to
/// KiB.
pub fn parse_gpu_line(line: &str) -> Result<GpuLine, ProfileError> {
    let malformed = || ProfileError::MalformedStream(line.to_string());

    if !line.contains(',') {
        return Err(malformed());
    }

    let cleaned = line.replace(',', "");
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() != 4 {
        return Err(malformed());
    }

    let device_index = tokens[0].parse::<usize>().map_err(|_| malformed())?;
    let usage_percent = tokens[1].parse::<f32>().map_err(|_| malformed())?;
    let used_mib = tokens[2].parse::<u64>().map_err(|_| malformed())?;
    let total_mib = tokens[3].parse::<u64>().map_err(|_| malformed())?;

    Ok(GpuLine {
        device_index,
        usage_percent,
        used_mem_kib: used_mib * 1024,
        total_mem_kib: total_mib * 1024,
    })
}
