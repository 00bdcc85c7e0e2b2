//! GNSS receiver: NMEA GGA parsing and the JSON record collector.

pub mod collector;
pub mod nmea;

pub use collector::{GnssCollector, GnssRecord, NmeaPort, SerialNmeaPort};
pub use nmea::{parse_gga, GgaFix};
