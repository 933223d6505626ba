// title/wad.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Implements the structures and methods required for WAD parsing and building.

use std::fmt;
use thiserror::Error;
use tracing::{debug, trace};
use crate::title::cert::{CertificateChain, CertificateError};
use crate::title::content::{ContentError, ContentRegion};
use crate::title::cursor::{align_up, ByteReader, ByteWriter};
use crate::title::ticket::{Ticket, TicketError};
use crate::title::tmd::{TMDError, TMD};
use crate::title::ErrorClass;

const WAD_HEADER_SIZE: usize = 0x20;
const BOOT2_TITLE_ID: [u8; 8] = [0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01];

/// The sections of a WAD, in the order they're stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Section {
    Header,
    CertificateChain,
    Crl,
    Ticket,
    Tmd,
    Content,
    Meta,
    Done,
}

impl Section {
    /// Gets the section that follows this one.
    pub fn next(self) -> Section {
        match self {
            Section::Header => Section::CertificateChain,
            Section::CertificateChain => Section::Crl,
            Section::Crl => Section::Ticket,
            Section::Ticket => Section::Tmd,
            Section::Tmd => Section::Content,
            Section::Content => Section::Meta,
            Section::Meta | Section::Done => Section::Done,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Section::Header => write!(f, "header"),
            Section::CertificateChain => write!(f, "certificate chain"),
            Section::Crl => write!(f, "CRL"),
            Section::Ticket => write!(f, "Ticket"),
            Section::Tmd => write!(f, "TMD"),
            Section::Content => write!(f, "content"),
            Section::Meta => write!(f, "meta"),
            Section::Done => write!(f, "end of WAD"),
        }
    }
}

#[derive(Debug, Error)]
pub enum WADError {
    #[error("WAD {section} needs {needed} bytes but only {available} remain")]
    TruncatedPackage { section: Section, needed: usize, available: usize },
    #[error("WAD is invalid type `{0}`")]
    BadType(String),
    #[error("WAD header size must be 0x20 (was {0:#x})")]
    BadHeaderSize(u32),
    #[error("WAD {0} section was never provided")]
    MissingSection(Section),
    #[error("TMD lists {declared} contents but the content region holds {found}")]
    ContentCountMismatch { declared: usize, found: usize },
    #[error("WAD {0} section is too large to be stored")]
    SectionTooLarge(Section),
    #[error("certificate processing error")]
    Certificate(#[from] CertificateError),
    #[error("TMD processing error")]
    TMD(#[from] TMDError),
    #[error("Ticket processing error")]
    Ticket(#[from] TicketError),
    #[error("content processing error")]
    Content(#[from] ContentError),
    #[error("WAD data could not be written")]
    IO(#[from] std::io::Error),
}

impl WADError {
    pub fn class(&self) -> ErrorClass {
        match self {
            WADError::Certificate(e) => e.class(),
            WADError::TMD(e) => e.class(),
            WADError::Ticket(e) => e.class(),
            WADError::Content(e) => e.class(),
            _ => ErrorClass::MalformedInput,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WADType {
    Installable,
    ImportBoot,
}

impl WADType {
    fn magic(self) -> [u8; 2] {
        match self {
            WADType::Installable => *b"Is",
            WADType::ImportBoot => *b"ib",
        }
    }
}

/// A structure that represents the header of a WAD file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WADHeader {
    header_size: u32,
    wad_type: WADType,
    wad_version: u16,
    cert_chain_size: u32,
    crl_size: u32,
    ticket_size: u32,
    tmd_size: u32,
    content_size: u32,
    meta_size: u32,
    padding: [u8; 32],
}

impl WADHeader {
    fn from_bytes(data: &[u8]) -> Result<WADHeader, WADError> {
        if data.len() < WAD_HEADER_SIZE {
            return Err(WADError::TruncatedPackage { section: Section::Header, needed: WAD_HEADER_SIZE, available: data.len() });
        }
        let truncated = |_| WADError::TruncatedPackage { section: Section::Header, needed: WAD_HEADER_SIZE, available: data.len() };
        let mut buf = ByteReader::new(data);
        let header_size = buf.read_u32().map_err(truncated)?;
        if header_size as usize != WAD_HEADER_SIZE {
            return Err(WADError::BadHeaderSize(header_size));
        }
        let wad_type = match &buf.read_array::<2>().map_err(truncated)? {
            b"Is" => WADType::Installable,
            b"ib" => WADType::ImportBoot,
            other => return Err(WADError::BadType(String::from_utf8_lossy(other).into_owned())),
        };
        let wad_version = buf.read_u16().map_err(truncated)?;
        let cert_chain_size = buf.read_u32().map_err(truncated)?;
        let crl_size = buf.read_u32().map_err(truncated)?;
        let ticket_size = buf.read_u32().map_err(truncated)?;
        let tmd_size = buf.read_u32().map_err(truncated)?;
        let content_size = buf.read_u32().map_err(truncated)?;
        let meta_size = buf.read_u32().map_err(truncated)?;
        // The padding runs past the 0x20 bytes covered by the header size, so it may be cut short.
        let mut padding = [0u8; 32];
        let available = buf.remaining().min(32);
        padding[..available].copy_from_slice(&data[buf.position()..buf.position() + available]);
        Ok(WADHeader {
            header_size,
            wad_type,
            wad_version,
            cert_chain_size,
            crl_size,
            ticket_size,
            tmd_size,
            content_size,
            meta_size,
            padding,
        })
    }

    fn write(&self, buf: &mut ByteWriter) -> Result<(), std::io::Error> {
        buf.write_u32(self.header_size)?;
        buf.write_bytes(&self.wad_type.magic())?;
        buf.write_u16(self.wad_version)?;
        buf.write_u32(self.cert_chain_size)?;
        buf.write_u32(self.crl_size)?;
        buf.write_u32(self.ticket_size)?;
        buf.write_u32(self.tmd_size)?;
        buf.write_u32(self.content_size)?;
        buf.write_u32(self.meta_size)?;
        buf.write_bytes(&self.padding)
    }

    /// Gets the size of the header data.
    pub fn header_size(&self) -> u32 {
        self.header_size
    }

    /// Gets the type of WAD described by the header.
    pub fn wad_type(&self) -> WADType {
        self.wad_type
    }

    /// Gets the version of the WAD described by the header.
    pub fn wad_version(&self) -> u16 {
        self.wad_version
    }

    pub fn cert_chain_size(&self) -> u32 {
        self.cert_chain_size
    }

    pub fn crl_size(&self) -> u32 {
        self.crl_size
    }

    pub fn ticket_size(&self) -> u32 {
        self.ticket_size
    }

    pub fn tmd_size(&self) -> u32 {
        self.tmd_size
    }

    pub fn content_size(&self) -> u32 {
        self.content_size
    }

    pub fn meta_size(&self) -> u32 {
        self.meta_size
    }
}

/// A structure that represent the data contained in the body of a WAD file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WADBody {
    cert_chain: Vec<u8>,
    crl: Vec<u8>,
    ticket: Vec<u8>,
    tmd: Vec<u8>,
    content: Vec<u8>,
    meta: Vec<u8>,
}

// Walks the sections of a WAD in order. Every section starts on a 64 byte boundary.
struct SectionReader<'a> {
    reader: ByteReader<'a>,
    section: Section,
}

impl<'a> SectionReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        SectionReader { reader: ByteReader::at(data, WAD_HEADER_SIZE), section: Section::CertificateChain }
    }

    fn read_section(&mut self, size: usize) -> Result<Vec<u8>, WADError> {
        let section = self.section;
        self.section = section.next();
        // Empty sections take up no space, even past the end of an unpadded WAD.
        if size == 0 {
            return Ok(Vec::new());
        }
        self.reader.align(64);
        let available = self.reader.remaining();
        let data = self.reader.read_vec(size)
            .map_err(|_| WADError::TruncatedPackage { section, needed: size, available })?;
        trace!(%section, size, "read WAD section");
        Ok(data)
    }
}

/// A structure that represents an entire WAD file as a separate header and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WAD {
    header: WADHeader,
    body: WADBody,
}

impl WAD {
    /// Starts building a new WAD from its components.
    pub fn builder() -> WADBuilder {
        WADBuilder::default()
    }

    /// Creates a new WAD instance from the binary data of a WAD file.
    pub fn from_bytes(data: &[u8]) -> Result<WAD, WADError> {
        let header = WADHeader::from_bytes(data)?;
        let mut sections = SectionReader::new(data);
        let cert_chain = sections.read_section(header.cert_chain_size as usize)?;
        let crl = sections.read_section(header.crl_size as usize)?;
        let ticket = sections.read_section(header.ticket_size as usize)?;
        let tmd = sections.read_section(header.tmd_size as usize)?;
        // Round the content size to the nearest 16.
        let content = sections.read_section(align_up(header.content_size as usize, 16))?;
        let meta = sections.read_section(header.meta_size as usize)?;
        debug_assert_eq!(sections.section, Section::Done);
        debug!(wad_type = ?header.wad_type, content_size = header.content_size, "parsed WAD");
        Ok(WAD {
            header,
            body: WADBody { cert_chain, crl, ticket, tmd, content, meta },
        })
    }

    /// Creates a new WAD instance from instances of the components stored in a WAD file.
    pub fn from_parts(cert_chain: &CertificateChain, crl: &[u8], ticket: &Ticket, tmd: &TMD,
                      content: &ContentRegion, meta: &[u8]) -> Result<WAD, WADError> {
        WAD::builder()
            .cert_chain(cert_chain.clone())
            .crl(crl)
            .ticket(ticket.clone())
            .tmd(tmd.clone())
            .content(content.clone())
            .meta(meta)
            .finalize()
    }

    /// Dumps the data in a WAD instance back into binary data that can be written to a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WADError> {
        let mut buf = ByteWriter::new();
        self.header.write(&mut buf)?;
        // Pad up to nearest multiple of 64. This also needs to happen after each section of data.
        buf.align(64);
        for section in [&self.body.cert_chain, &self.body.crl, &self.body.ticket, &self.body.tmd,
                        &self.body.content, &self.body.meta] {
            buf.write_bytes(section)?;
            buf.align(64);
        }
        Ok(buf.into_inner())
    }

    pub fn header(&self) -> &WADHeader {
        &self.header
    }

    /// Gets the type of the WAD.
    pub fn wad_type(&self) -> WADType {
        self.header.wad_type
    }

    pub fn cert_chain(&self) -> &[u8] {
        &self.body.cert_chain
    }

    pub fn crl(&self) -> &[u8] {
        &self.body.crl
    }

    pub fn ticket(&self) -> &[u8] {
        &self.body.ticket
    }

    pub fn tmd(&self) -> &[u8] {
        &self.body.tmd
    }

    pub fn content(&self) -> &[u8] {
        &self.body.content
    }

    pub fn meta(&self) -> &[u8] {
        &self.body.meta
    }
}

/// Accumulates the sections of a new WAD. Nothing is checked until [`WADBuilder::finalize`].
#[derive(Debug, Clone, Default)]
pub struct WADBuilder {
    cert_chain: Option<CertificateChain>,
    crl: Vec<u8>,
    ticket: Option<Ticket>,
    tmd: Option<TMD>,
    content: Option<ContentRegion>,
    meta: Vec<u8>,
}

impl WADBuilder {
    pub fn cert_chain(mut self, cert_chain: CertificateChain) -> Self {
        self.cert_chain = Some(cert_chain);
        self
    }

    pub fn crl(mut self, crl: &[u8]) -> Self {
        self.crl = crl.to_vec();
        self
    }

    pub fn ticket(mut self, ticket: Ticket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn tmd(mut self, tmd: TMD) -> Self {
        self.tmd = Some(tmd);
        self
    }

    pub fn content(mut self, content: ContentRegion) -> Self {
        self.content = Some(content);
        self
    }

    pub fn meta(mut self, meta: &[u8]) -> Self {
        self.meta = meta.to_vec();
        self
    }

    /// Checks that every required section is present and consistent, then lays out the WAD. The
    /// Ticket and TMD are stored as they are, without being signed again.
    pub fn finalize(self) -> Result<WAD, WADError> {
        let cert_chain = self.cert_chain.ok_or(WADError::MissingSection(Section::CertificateChain))?;
        let ticket = self.ticket.ok_or(WADError::MissingSection(Section::Ticket))?;
        let tmd = self.tmd.ok_or(WADError::MissingSection(Section::Tmd))?;
        let content = self.content.ok_or(WADError::MissingSection(Section::Content))?;
        if tmd.content_records().len() != content.contents().len() {
            return Err(WADError::ContentCountMismatch { declared: tmd.content_records().len(), found: content.contents().len() });
        }
        // boot2 is the only title installed from an "ib" WAD.
        let wad_type = if tmd.title_id() == BOOT2_TITLE_ID { WADType::ImportBoot } else { WADType::Installable };
        let body = WADBody {
            cert_chain: cert_chain.to_bytes()?,
            crl: self.crl,
            ticket: ticket.to_bytes()?,
            tmd: tmd.to_bytes()?,
            content: content.to_bytes()?,
            meta: self.meta,
        };
        let size = |section: Section, data: &[u8]| u32::try_from(data.len()).map_err(|_| WADError::SectionTooLarge(section));
        let header = WADHeader {
            header_size: WAD_HEADER_SIZE as u32,
            wad_type,
            wad_version: 0, // This is always officially a zero.
            cert_chain_size: size(Section::CertificateChain, &body.cert_chain)?,
            crl_size: size(Section::Crl, &body.crl)?,
            ticket_size: size(Section::Ticket, &body.ticket)?,
            tmd_size: size(Section::Tmd, &body.tmd)?,
            content_size: size(Section::Content, &body.content)?,
            meta_size: size(Section::Meta, &body.meta)?,
            padding: [0; 32],
        };
        Ok(WAD { header, body })
    }
}
