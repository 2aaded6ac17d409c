use std::fmt;
use std::io::Write;
use std::time::Duration;

use nfassign_core::Nanosecs;
use pcap_file::pcap::{PcapHeader, PcapPacket};
use pcap_file::{DataLink, Endianness};

use crate::decode::LinkType;
use crate::{Error, Resolution};

/// Writes little-endian classic pcap files.
pub struct PcapWriter<W: Write> {
    inner: pcap_file::pcap::PcapWriter<W>,
}

impl<W: Write> PcapWriter<W> {
    /// Writes the file header and returns a writer for the records.
    pub fn new(inner: W, link_type: LinkType, resolution: Resolution) -> Result<Self, Error> {
        let header = PcapHeader {
            datalink: DataLink::from(link_type.into_u32()),
            ts_resolution: resolution.into(),
            endianness: Endianness::Little,
            ..Default::default()
        };
        let inner = pcap_file::pcap::PcapWriter::with_header(inner, header)?;
        Ok(Self { inner })
    }

    /// Writes a record whose captured bytes are the whole frame.
    pub fn write_frame(&mut self, timestamp: Nanosecs, frame: &[u8]) -> Result<(), Error> {
        self.write_record(timestamp, frame, frame.len() as u32)
    }

    /// Writes a record of `orig_len` wire bytes of which `data` were captured. Timestamps are
    /// truncated to the file's resolution.
    pub fn write_record(
        &mut self,
        timestamp: Nanosecs,
        data: &[u8],
        orig_len: u32,
    ) -> Result<(), Error> {
        let ts = Duration::from_nanos(timestamp.into_u64());
        self.inner.write_packet(&PcapPacket::new(ts, orig_len, data))?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn finish(self) -> Result<W, Error> {
        let mut inner = self.inner.into_writer();
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> fmt::Debug for PcapWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcapWriter").finish_non_exhaustive()
    }
}
