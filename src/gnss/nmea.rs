//! Minimal NMEA 0183 support: GGA fixes only.

use log::debug;

/// Longest sentence kept while waiting for its line ending
pub const MAX_SENTENCE_LEN: usize = 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct GgaFix {
    /// `hhmmss.ss` as sent by the receiver
    pub utc_time: String,
    /// Signed decimal degrees, 0.0 when the field is empty
    pub latitude: f64,
    pub longitude: f64,
    /// 0 = no fix
    pub quality: u8,
    pub satellites: u32,
    /// Metres above mean sea level
    pub altitude: f64,
}

impl GgaFix {
    pub fn has_fix(&self) -> bool {
        self.quality > 0
    }
}

/// Verify `*hh` when present; sentences without a checksum pass
pub fn checksum_ok(sentence: &str) -> bool {
    let body = sentence.strip_prefix('$').unwrap_or(sentence);
    let Some((payload, checksum)) = body.split_once('*') else {
        return true;
    };
    let Ok(expected) = u8::from_str_radix(checksum.trim(), 16) else {
        return false;
    };
    payload.bytes().fold(0u8, |acc, b| acc ^ b) == expected
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere to signed degrees
pub fn parse_coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    if value.is_empty() {
        return None;
    }
    let raw: f64 = value.parse().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

/// Parse a `$GPGGA`/`$GNGGA` sentence; anything else, or a bad checksum,
/// yields `None`.
pub fn parse_gga(sentence: &str) -> Option<GgaFix> {
    let sentence = sentence.trim();
    if !(sentence.starts_with("$GPGGA") || sentence.starts_with("$GNGGA")) {
        return None;
    }
    if !checksum_ok(sentence) {
        debug!("Dropping GGA with bad checksum: {}", sentence);
        return None;
    }

    let data = sentence.split('*').next().unwrap_or(sentence);
    let fields: Vec<&str> = data.split(',').collect();
    if fields.len() < 10 {
        return None;
    }

    Some(GgaFix {
        utc_time: fields[1].to_string(),
        latitude: parse_coordinate(fields[2], fields[3]).unwrap_or(0.0),
        longitude: parse_coordinate(fields[4], fields[5]).unwrap_or(0.0),
        quality: fields[6].parse().unwrap_or(0),
        satellites: fields[7].parse().unwrap_or(0),
        altitude: fields[9].parse().unwrap_or(0.0),
    })
}

/// Reassembles serial chunks into complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            match b {
                b'\n' | b'\r' => {
                    if !self.pending.is_empty() {
                        lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                        self.pending.clear();
                    }
                }
                _ => {
                    if self.pending.len() >= MAX_SENTENCE_LEN {
                        // Runaway line with no terminator
                        self.pending.clear();
                    }
                    self.pending.push(b);
                }
            }
        }
        lines
    }
}
