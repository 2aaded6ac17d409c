//! A [`PacketSource`] over classic pcap files.
//!
//! Files are memory-mapped and decoded lazily, so every pass over a trace re-reads the mapping
//! instead of holding decoded packets in memory. Both timestamp resolutions and byte orders are
//! supported, as are raw-IP and Ethernet captures.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

use std::fmt;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;
use nfassign_core::{Nanosecs, Packet, PacketSource};
use pcap_file::pcap::{PcapHeader, PcapParser};
use pcap_file::{PcapError, TsResolution};

mod decode;
pub mod frames;
mod writer;

pub use decode::{decode, DecodeError, LinkType};
pub use writer::PcapWriter;

/// Timestamp resolution of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Microsecond timestamps.
    Micros,
    /// Nanosecond timestamps.
    Nanos,
}

impl From<TsResolution> for Resolution {
    fn from(ts: TsResolution) -> Self {
        match ts {
            TsResolution::MicroSecond => Self::Micros,
            TsResolution::NanoSecond => Self::Nanos,
        }
    }
}

impl From<Resolution> for TsResolution {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Micros => Self::MicroSecond,
            Resolution::Nanos => Self::NanoSecond,
        }
    }
}

/// A pcap trace.
#[derive(Debug)]
pub struct PcapTrace {
    data: Data,
    header: PcapHeader,
    link_type: LinkType,
}

#[derive(Debug)]
enum Data {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Data {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            Data::Mapped(mmap) => mmap,
            Data::Owned(bytes) => bytes,
        }
    }
}

impl PcapTrace {
    /// Memory-maps the trace at `path` and reads its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path.as_ref())?;
        // SAFETY: The mapping is read-only. Traces are not expected to be modified while they
        // are being processed.
        let mmap = unsafe { Mmap::map(&file) }?;
        let trace = Self::new(Data::Mapped(mmap))?;
        log::debug!(
            "opened {} ({} bytes, {:?})",
            path.as_ref().display(),
            trace.data.len(),
            trace.link_type
        );
        Ok(trace)
    }

    /// Reads a trace held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, Error> {
        Self::new(Data::Owned(bytes))
    }

    fn new(data: Data) -> Result<Self, Error> {
        let (_, parser) = parser(&data)?;
        let header = parser.header();
        let datalink = u32::from(header.datalink);
        let link_type =
            LinkType::from_u32(datalink).ok_or(Error::UnsupportedLinkType(datalink))?;
        Ok(Self {
            data,
            header,
            link_type,
        })
    }

    /// The link-layer header type of the capture.
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// The timestamp resolution of the capture.
    pub fn resolution(&self) -> Resolution {
        self.header.ts_resolution.into()
    }
}

fn parser(data: &[u8]) -> Result<(&[u8], PcapParser), Error> {
    PcapParser::new(data).map_err(|e| match e {
        PcapError::IncompleteBuffer => Error::TruncatedHeader(data.len()),
        e => Error::Pcap(e),
    })
}

impl PacketSource for PcapTrace {
    type Error = Error;
    type Packets<'a> = Packets<'a> where Self: 'a;

    fn packets(&self) -> Result<Self::Packets<'_>, Self::Error> {
        let (rest, parser) = parser(&self.data)?;
        Ok(Packets {
            parser,
            rest,
            link_type: self.link_type,
            index: 0,
            failed: false,
        })
    }
}

/// One pass over the packets of a [`PcapTrace`]. The pass ends after the first error.
pub struct Packets<'a> {
    parser: PcapParser,
    rest: &'a [u8],
    link_type: LinkType,
    index: usize,
    failed: bool,
}

impl<'a> Packets<'a> {
    fn next_packet(&mut self) -> Result<Packet, Error> {
        let index = self.index;
        let (rest, record) = self.parser.next_packet(self.rest).map_err(|e| match e {
            PcapError::IncompleteBuffer => Error::TruncatedRecord { index },
            source => Error::Record { index, source },
        })?;
        let timestamp = Nanosecs::new(record.timestamp.as_nanos() as u64);
        let pkt = decode(self.link_type, &record.data, record.orig_len, timestamp)
            .map_err(|source| Error::Decode { index, source })?;
        self.rest = rest;
        self.index += 1;
        Ok(pkt)
    }
}

impl<'a> Iterator for Packets<'a> {
    type Item = Result<Packet, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        let res = self.next_packet();
        self.failed = res.is_err();
        Some(res)
    }
}

impl<'a> fmt::Debug for Packets<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packets")
            .field("link_type", &self.link_type)
            .field("index", &self.index)
            .field("remaining", &self.rest.len())
            .finish()
    }
}

/// Errors reading or writing a pcap trace.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Malformed pcap data.
    #[error(transparent)]
    Pcap(#[from] PcapError),

    /// The file is shorter than a pcap header.
    #[error("file of {0} bytes is too short for a pcap header")]
    TruncatedHeader(usize),

    /// A link type other than Ethernet or raw IP.
    #[error("unsupported link type {0}")]
    UnsupportedLinkType(u32),

    /// The file ends inside a record.
    #[error("record {index} is truncated")]
    TruncatedRecord {
        /// Position of the record.
        index: usize,
    },

    /// A record header is invalid.
    #[error("invalid record {index}")]
    Record {
        /// Position of the record.
        index: usize,
        /// The parsing error.
        source: PcapError,
    },

    /// A record could not be decoded.
    #[error("failed to decode packet {index}")]
    Decode {
        /// Position of the record.
        index: usize,
        /// The decoding error.
        source: DecodeError,
    },
}
