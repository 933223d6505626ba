// title/tmd.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Implements the structures and methods required for TMD parsing, verification, and editing.

use std::fmt;
use rsa::RsaPrivateKey;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{debug, trace};
use crate::title::cert::{self, CertificateError, Signature, SignatureType, VerifiedChain};
use crate::title::cursor::{fixed_str, ByteReader, ByteWriter, CursorError};
use crate::title::ErrorClass;

/// Size of the TMD header following the signature block.
const TMD_HEADER_LEN: usize = 0xA4;
/// Size of a single content record.
const CONTENT_RECORD_LEN: usize = 36;

#[derive(Debug, Error)]
pub enum TMDError {
    #[error("TMD data must be at least {expected} bytes long (was {available})")]
    MalformedTMD { expected: usize, available: usize },
    #[error("TMD data is malformed")]
    Malformed(#[from] CursorError),
    #[error("TMD declares {declared} content records but only {found} are present")]
    TruncatedContentList { declared: u16, found: usize },
    #[error("TMD signature could not be processed")]
    Signature(#[from] CertificateError),
    #[error("TMD data contains content record with invalid type `{0}`")]
    InvalidContentType(u16),
    #[error("content with index {0} could not be found in the TMD")]
    ContentNotFound(u16),
    #[error("TMD can list at most 65535 contents (got {0})")]
    TooManyContents(usize),
    #[error("TMD data could not be fakesigned")]
    CannotFakesign,
    #[error("signature issuer string must not exceed 64 characters (was {0})")]
    IssuerTooLong(usize),
    #[error("invalid IOS Title ID, IOSes must have a Title ID beginning with 00000001 (type 'System')")]
    InvalidIOSTitleID,
    #[error("invalid IOS version `{0}`, IOS version must be in the range 3-255")]
    InvalidIOSVersion(u32),
    #[error("encountered unknown title type `{0}`")]
    InvalidTitleType(String),
    #[error("TMD data could not be written")]
    IO(#[from] std::io::Error),
}

impl TMDError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TMDError::Signature(e) => e.class(),
            _ => ErrorClass::MalformedInput,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum TitleType {
    System = 0x00000001,
    Game = 0x00010000,
    Channel = 0x00010001,
    SystemChannel = 0x00010002,
    GameChannel = 0x00010004,
    DLC = 0x00010005,
    HiddenChannel = 0x00010008,
}

impl TryFrom<u32> for TitleType {
    type Error = TMDError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x00000001 => Ok(TitleType::System),
            0x00010000 => Ok(TitleType::Game),
            0x00010001 => Ok(TitleType::Channel),
            0x00010002 => Ok(TitleType::SystemChannel),
            0x00010004 => Ok(TitleType::GameChannel),
            0x00010005 => Ok(TitleType::DLC),
            0x00010008 => Ok(TitleType::HiddenChannel),
            _ => Err(TMDError::InvalidTitleType(format!("{:08x}", value))),
        }
    }
}

impl fmt::Display for TitleType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TitleType::System => write!(f, "System"),
            TitleType::Game => write!(f, "Game"),
            TitleType::Channel => write!(f, "Channel"),
            TitleType::SystemChannel => write!(f, "SystemChannel"),
            TitleType::GameChannel => write!(f, "GameChannel"),
            TitleType::DLC => write!(f, "DLC"),
            TitleType::HiddenChannel => write!(f, "HiddenChannel"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum ContentType {
    Normal = 1,
    Development = 2,
    HashTree = 3,
    DLC = 0x4001,
    Shared = 0x8001,
}

impl TryFrom<u16> for ContentType {
    type Error = TMDError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ContentType::Normal),
            2 => Ok(ContentType::Development),
            3 => Ok(ContentType::HashTree),
            0x4001 => Ok(ContentType::DLC),
            0x8001 => Ok(ContentType::Shared),
            _ => Err(TMDError::InvalidContentType(value)),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContentType::Normal => write!(f, "Normal"),
            ContentType::Development => write!(f, "Development/Unknown"),
            ContentType::HashTree => write!(f, "Hash Tree"),
            ContentType::DLC => write!(f, "DLC"),
            ContentType::Shared => write!(f, "Shared"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AccessRight {
    AHB = 0,
    DVDVideo = 1,
}

/// A structure that represents the metadata of a content file in a digital Wii title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub content_id: u32,
    pub index: u16,
    pub content_type: ContentType,
    pub content_size: u64,
    pub content_hash: [u8; 20],
}

impl ContentRecord {
    fn read(buf: &mut ByteReader) -> Result<Self, TMDError> {
        let content_id = buf.read_u32()?;
        let index = buf.read_u16()?;
        let content_type = ContentType::try_from(buf.read_u16()?)?;
        let content_size = buf.read_u64()?;
        let content_hash = buf.read_array::<20>()?;
        Ok(ContentRecord { content_id, index, content_type, content_size, content_hash })
    }

    fn write(&self, buf: &mut ByteWriter) -> Result<(), std::io::Error> {
        buf.write_u32(self.content_id)?;
        buf.write_u16(self.index)?;
        buf.write_u16(self.content_type as u16)?;
        buf.write_u64(self.content_size)?;
        buf.write_bytes(&self.content_hash)
    }
}

/// A structure that represents a Wii TMD (Title Metadata) file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TMD {
    signature: Signature,
    signature_issuer: [u8; 64],
    tmd_version: u8,
    ca_crl_version: u8,
    signer_crl_version: u8,
    is_vwii: u8,
    ios_tid: [u8; 8],
    title_id: [u8; 8],
    title_type: [u8; 4],
    group_id: u16,
    padding2: [u8; 2],
    region: u16,
    ratings: [u8; 16],
    reserved1: [u8; 12],
    ipc_mask: [u8; 12],
    reserved2: [u8; 18],
    access_rights: u32,
    title_version: u16,
    boot_index: u16,
    minor_version: u16, // Normally unused, but useful when fakesigning.
    content_records: Vec<ContentRecord>,
}

impl TMD {
    /// Starts building a new, unsigned TMD for the specified Title ID.
    pub fn builder(title_id: [u8; 8]) -> TMDBuilder {
        TMDBuilder {
            signature_type: SignatureType::Rsa2048,
            issuer: "Root-CA00000001-CP00000004".to_owned(),
            is_vwii: false,
            ios_tid: [0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3A],
            title_id,
            title_type: [0x00, 0x00, 0x00, 0x01],
            group_id: 0,
            region: 3,
            access_rights: 0,
            title_version: 0,
            boot_index: 0,
            content_records: Vec::new(),
        }
    }

    /// Creates a new TMD instance from the binary data of a TMD file.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TMDError> {
        let mut buf = ByteReader::new(data);
        let signature = Signature::read(&mut buf)?;
        let header_end = signature.signature_type().block_len() + TMD_HEADER_LEN;
        if data.len() < header_end {
            return Err(TMDError::MalformedTMD { expected: header_end, available: data.len() });
        }
        let signature_issuer = buf.read_array::<64>()?;
        let tmd_version = buf.read_u8()?;
        let ca_crl_version = buf.read_u8()?;
        let signer_crl_version = buf.read_u8()?;
        let is_vwii = buf.read_u8()?;
        let ios_tid = buf.read_array::<8>()?;
        let title_id = buf.read_array::<8>()?;
        let title_type = buf.read_array::<4>()?;
        let group_id = buf.read_u16()?;
        let padding2 = buf.read_array::<2>()?;
        let region = buf.read_u16()?;
        let ratings = buf.read_array::<16>()?;
        let reserved1 = buf.read_array::<12>()?;
        let ipc_mask = buf.read_array::<12>()?;
        let reserved2 = buf.read_array::<18>()?;
        let access_rights = buf.read_u32()?;
        let title_version = buf.read_u16()?;
        let num_contents = buf.read_u16()?;
        let boot_index = buf.read_u16()?;
        let minor_version = buf.read_u16()?;
        // Every declared record must be present in full before any are parsed.
        let found = (data.len() - header_end) / CONTENT_RECORD_LEN;
        if found < num_contents as usize {
            return Err(TMDError::TruncatedContentList { declared: num_contents, found });
        }
        let mut content_records = Vec::with_capacity(num_contents as usize);
        for _ in 0..num_contents {
            content_records.push(ContentRecord::read(&mut buf)?);
        }
        let tmd = TMD {
            signature,
            signature_issuer,
            tmd_version,
            ca_crl_version,
            signer_crl_version,
            is_vwii,
            ios_tid,
            title_id,
            title_type,
            group_id,
            padding2,
            region,
            ratings,
            reserved1,
            ipc_mask,
            reserved2,
            access_rights,
            title_version,
            boot_index,
            minor_version,
            content_records,
        };
        trace!(title_id = %hex::encode(title_id), contents = num_contents, "parsed TMD");
        Ok(tmd)
    }

    /// Dumps the data in a TMD back into binary data that can be written to a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = ByteWriter::with_capacity(self.signature.signature_type().block_len() + TMD_HEADER_LEN
            + self.content_records.len() * CONTENT_RECORD_LEN);
        self.signature.write(&mut buf)?;
        self.write_body(&mut buf)?;
        Ok(buf.into_inner())
    }

    /// Gets the bytes covered by the TMD's signature, which includes every content record.
    pub fn signed_body(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = ByteWriter::with_capacity(TMD_HEADER_LEN + self.content_records.len() * CONTENT_RECORD_LEN);
        self.write_body(&mut buf)?;
        Ok(buf.into_inner())
    }

    fn write_body(&self, buf: &mut ByteWriter) -> Result<(), std::io::Error> {
        buf.write_bytes(&self.signature_issuer)?;
        buf.write_u8(self.tmd_version)?;
        buf.write_u8(self.ca_crl_version)?;
        buf.write_u8(self.signer_crl_version)?;
        buf.write_u8(self.is_vwii)?;
        buf.write_bytes(&self.ios_tid)?;
        buf.write_bytes(&self.title_id)?;
        buf.write_bytes(&self.title_type)?;
        buf.write_u16(self.group_id)?;
        buf.write_bytes(&self.padding2)?;
        buf.write_u16(self.region)?;
        buf.write_bytes(&self.ratings)?;
        buf.write_bytes(&self.reserved1)?;
        buf.write_bytes(&self.ipc_mask)?;
        buf.write_bytes(&self.reserved2)?;
        buf.write_u32(self.access_rights)?;
        buf.write_u16(self.title_version)?;
        buf.write_u16(self.content_records.len() as u16)?;
        buf.write_u16(self.boot_index)?;
        buf.write_u16(self.minor_version)?;
        for record in &self.content_records {
            record.write(buf)?;
        }
        Ok(())
    }

    /// Verifies the TMD's signature using the certificate in the chain named as its issuer.
    /// Returns false if the signature doesn't match or the issuer isn't in the chain.
    pub fn verify(&self, chain: &VerifiedChain) -> Result<bool, TMDError> {
        let result = chain.verify_signed(&self.signature_issuer(), &self.signed_body()?, &self.signature)?;
        debug!(issuer = %self.signature_issuer(), result, "verified TMD signature");
        Ok(result)
    }

    /// Finds the content record with the specified content index.
    pub fn find_content(&self, index: u16) -> Result<&ContentRecord, TMDError> {
        self.content_records.iter()
            .find(|record| record.index == index)
            .ok_or(TMDError::ContentNotFound(index))
    }

    /// Signs the TMD with the private key of its issuer, returning the signed copy.
    pub fn signed(self, key: &RsaPrivateKey) -> Result<Self, TMDError> {
        let signature = cert::sign_blob(&self.signed_body()?, self.signature.signature_type(), key)?;
        Ok(TMD { signature, ..self })
    }

    /// Gets whether a TMD is fakesigned using the strncmp (trucha) bug or not.
    pub fn is_fakesigned(&self) -> bool {
        // Can't be fakesigned without a null signature.
        if !self.signature.is_null() {
            return false;
        }
        // Test the hash of the TMD body to make sure it starts with 00.
        match self.signed_body() {
            Ok(body) => Sha1::digest(&body)[0] == 0,
            Err(_) => false,
        }
    }

    /// Fakesigns a TMD for use with the strncmp (trucha) bug, returning the fakesigned copy.
    pub fn fakesigned(self) -> Result<Self, TMDError> {
        let mut tmd = TMD { signature: Signature::empty(self.signature.signature_type()), ..self };
        let mut current_int: u16 = 0;
        loop {
            tmd.minor_version = current_int;
            if Sha1::digest(&tmd.signed_body()?)[0] == 0 {
                return Ok(tmd);
            }
            if current_int == u16::MAX {
                return Err(TMDError::CannotFakesign);
            }
            current_int += 1;
        }
    }

    /// Returns a copy of the TMD listing the provided content records instead.
    pub fn with_content_records(self, content_records: Vec<ContentRecord>) -> Result<Self, TMDError> {
        if content_records.len() > u16::MAX as usize {
            return Err(TMDError::TooManyContents(content_records.len()));
        }
        Ok(TMD { content_records, ..self })
    }

    /// Returns a copy of the TMD with a new Title ID.
    pub fn with_title_id(self, title_id: [u8; 8]) -> Self {
        TMD { title_id, ..self }
    }

    /// Returns a copy of the TMD with a new title version.
    pub fn with_title_version(self, title_version: u16) -> Self {
        TMD { title_version, ..self }
    }

    /// Returns a copy of the TMD describing a different type of title.
    pub fn with_title_type(self, title_type: TitleType) -> Self {
        TMD { title_type: (title_type as u32).to_be_bytes(), ..self }
    }

    /// Returns a copy of the TMD signed by a different certificate name. The signature itself is
    /// not updated.
    pub fn with_signature_issuer(self, signature_issuer: &str) -> Result<Self, TMDError> {
        Ok(TMD { signature_issuer: issuer_field(signature_issuer)?, ..self })
    }

    /// Returns a copy of the TMD requiring a different IOS. The Title ID must be in the valid range
    /// of IOS versions, from 0000000100000003 to 00000001000000FF.
    pub fn with_ios_tid(self, ios_tid: [u8; 8]) -> Result<Self, TMDError> {
        let ios_tid = validate_ios_tid(ios_tid)?;
        Ok(TMD { ios_tid, ..self })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Gets the name of the certificate used to sign a TMD as a string.
    pub fn signature_issuer(&self) -> String {
        fixed_str(&self.signature_issuer)
    }

    /// Gets the version of the TMD file.
    pub fn tmd_version(&self) -> u8 {
        self.tmd_version
    }

    /// Gets the version of CA CRL listed in the TMD.
    pub fn ca_crl_version(&self) -> u8 {
        self.ca_crl_version
    }

    /// Gets the version of the signer CRL listed in the TMD.
    pub fn signer_crl_version(&self) -> u8 {
        self.signer_crl_version
    }

    /// Gets whether a TMD describes a vWii title.
    pub fn is_vwii(&self) -> bool {
        self.is_vwii == 1
    }

    /// Gets the Title ID of the IOS required by a TMD.
    pub fn ios_tid(&self) -> [u8; 8] {
        self.ios_tid
    }

    pub fn title_id(&self) -> [u8; 8] {
        self.title_id
    }

    /// Gets the group ID listed in the TMD.
    pub fn group_id(&self) -> u16 {
        self.group_id
    }

    /// Gets the age ratings listed in the TMD.
    pub fn ratings(&self) -> [u8; 16] {
        self.ratings
    }

    pub fn ipc_mask(&self) -> [u8; 12] {
        self.ipc_mask
    }

    /// Gets the version of title listed in the TMD.
    pub fn title_version(&self) -> u16 {
        self.title_version
    }

    /// Gets the number of contents listed in the TMD.
    pub fn num_contents(&self) -> u16 {
        self.content_records.len() as u16
    }

    /// Gets the index of the title's boot content.
    pub fn boot_index(&self) -> u16 {
        self.boot_index
    }

    /// Gets the minor version listed in the TMD. This field is typically unused.
    pub fn minor_version(&self) -> u16 {
        self.minor_version
    }

    pub fn content_records(&self) -> &[ContentRecord] {
        &self.content_records
    }

    /// Gets the 3-letter code of the region a TMD was created for.
    pub fn region(&self) -> &str {
        match self.region {
            0 => "JPN",
            1 => "USA",
            2 => "EUR",
            3 => "None",
            4 => "KOR",
            _ => "Unknown",
        }
    }

    /// Gets the type of title described by a TMD, based on the upper half of its Title ID.
    pub fn title_type(&self) -> Result<TitleType, TMDError> {
        let mut tid_high = [0u8; 4];
        tid_high.copy_from_slice(&self.title_id[..4]);
        TitleType::try_from(u32::from_be_bytes(tid_high))
    }

    /// Gets whether a specified access right is enabled in a TMD.
    pub fn check_access_right(&self, right: AccessRight) -> bool {
        self.access_rights & (1 << right as u8) != 0
    }
}

fn issuer_field(signature_issuer: &str) -> Result<[u8; 64], TMDError> {
    if signature_issuer.len() > 64 {
        return Err(TMDError::IssuerTooLong(signature_issuer.len()));
    }
    let mut issuer = [0u8; 64];
    issuer[..signature_issuer.len()].copy_from_slice(signature_issuer.as_bytes());
    Ok(issuer)
}

fn validate_ios_tid(ios_tid: [u8; 8]) -> Result<[u8; 8], TMDError> {
    if ios_tid[..4] != [0x00, 0x00, 0x00, 0x01] {
        return Err(TMDError::InvalidIOSTitleID);
    }
    let ios_version = u32::from_be_bytes([ios_tid[4], ios_tid[5], ios_tid[6], ios_tid[7]]);
    if !(3..=255).contains(&ios_version) {
        return Err(TMDError::InvalidIOSVersion(ios_version));
    }
    Ok(ios_tid)
}

/// Accumulates the fields of a new TMD.
#[derive(Debug, Clone)]
pub struct TMDBuilder {
    signature_type: SignatureType,
    issuer: String,
    is_vwii: bool,
    ios_tid: [u8; 8],
    title_id: [u8; 8],
    title_type: [u8; 4],
    group_id: u16,
    region: u16,
    access_rights: u32,
    title_version: u16,
    boot_index: u16,
    content_records: Vec<ContentRecord>,
}

impl TMDBuilder {
    pub fn signature_type(mut self, signature_type: SignatureType) -> Self {
        self.signature_type = signature_type;
        self
    }

    pub fn issuer(mut self, issuer: &str) -> Self {
        self.issuer = issuer.to_owned();
        self
    }

    pub fn is_vwii(mut self, is_vwii: bool) -> Self {
        self.is_vwii = is_vwii;
        self
    }

    pub fn ios_tid(mut self, ios_tid: [u8; 8]) -> Self {
        self.ios_tid = ios_tid;
        self
    }

    pub fn title_type(mut self, title_type: TitleType) -> Self {
        self.title_type = (title_type as u32).to_be_bytes();
        self
    }

    pub fn group_id(mut self, group_id: u16) -> Self {
        self.group_id = group_id;
        self
    }

    /// Sets the region code (0 JPN, 1 USA, 2 EUR, 3 None, 4 KOR).
    pub fn region(mut self, region: u16) -> Self {
        self.region = region;
        self
    }

    pub fn access_right(mut self, right: AccessRight) -> Self {
        self.access_rights |= 1 << right as u8;
        self
    }

    pub fn title_version(mut self, title_version: u16) -> Self {
        self.title_version = title_version;
        self
    }

    pub fn boot_index(mut self, boot_index: u16) -> Self {
        self.boot_index = boot_index;
        self
    }

    pub fn content_record(mut self, record: ContentRecord) -> Self {
        self.content_records.push(record);
        self
    }

    /// Produces the unsigned TMD.
    pub fn build(self) -> Result<TMD, TMDError> {
        let signature_issuer = issuer_field(&self.issuer)?;
        let ios_tid = validate_ios_tid(self.ios_tid)?;
        if self.content_records.len() > u16::MAX as usize {
            return Err(TMDError::TooManyContents(self.content_records.len()));
        }
        Ok(TMD {
            signature: Signature::empty(self.signature_type),
            signature_issuer,
            tmd_version: 0,
            ca_crl_version: 0,
            signer_crl_version: 0,
            is_vwii: self.is_vwii as u8,
            ios_tid,
            title_id: self.title_id,
            title_type: self.title_type,
            group_id: self.group_id,
            padding2: [0; 2],
            region: self.region,
            ratings: [0; 16],
            reserved1: [0; 12],
            ipc_mask: [0; 12],
            reserved2: [0; 18],
            access_rights: self.access_rights,
            title_version: self.title_version,
            boot_index: self.boot_index,
            minor_version: 0,
            content_records: self.content_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::title::testutil;

    #[test]
    fn test_tmd_size() {
        let tmd = testutil::sample_tmd();
        assert_eq!(tmd.num_contents(), 3);
        assert_eq!(tmd.to_bytes().unwrap().len(), 0x1E4 + 3 * CONTENT_RECORD_LEN);
    }

    #[test]
    fn test_tmd_round_trip() {
        let tmd = testutil::sample_tmd();
        let bytes = tmd.to_bytes().unwrap();
        let parsed = TMD::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, tmd);
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
        assert_eq!(parsed.title_id(), testutil::TITLE_ID);
        assert_eq!(parsed.signature_issuer(), "Root-CA00000001-CP00000004");
        assert_eq!(parsed.content_records()[2].content_type, ContentType::Shared);
    }

    #[test]
    fn test_tmd_short_header() {
        let bytes = testutil::sample_tmd().to_bytes().unwrap();
        assert!(matches!(TMD::from_bytes(&bytes[..0x1E3]), Err(TMDError::MalformedTMD { expected: 0x1E4, available: 0x1E3 })));
    }

    #[test]
    fn test_truncated_content_list() {
        let tmd = testutil::sample_tmd();
        let mut bytes = tmd.to_bytes().unwrap();
        // Declare 5 contents while only 3 records follow the header.
        bytes[0x1DE..0x1E0].copy_from_slice(&5u16.to_be_bytes());
        assert!(matches!(TMD::from_bytes(&bytes), Err(TMDError::TruncatedContentList { declared: 5, found: 3 })));
        // A partial record doesn't count.
        let mut bytes = tmd.to_bytes().unwrap();
        bytes.truncate(0x1E4 + 2 * CONTENT_RECORD_LEN + 10);
        assert!(matches!(TMD::from_bytes(&bytes), Err(TMDError::TruncatedContentList { declared: 3, found: 2 })));
    }

    #[test]
    fn test_invalid_content_type() {
        let mut bytes = testutil::sample_tmd().to_bytes().unwrap();
        // Type field of the first record.
        bytes[0x1EA..0x1EC].copy_from_slice(&7u16.to_be_bytes());
        assert!(matches!(TMD::from_bytes(&bytes), Err(TMDError::InvalidContentType(7))));
    }

    #[test]
    fn test_find_content() {
        let tmd = testutil::sample_tmd();
        let record = tmd.find_content(1).unwrap();
        assert_eq!(record.content_id, 0x00000001);
        assert!(matches!(tmd.find_content(9), Err(TMDError::ContentNotFound(9))));
    }

    #[test]
    fn test_verify_tmd() {
        let chain = testutil::fixture().verified_chain();
        let tmd = testutil::sample_tmd();
        assert!(tmd.verify(&chain).unwrap());
        // Editing a content record invalidates the signature.
        let mut records = tmd.content_records().to_vec();
        records[1].content_size += 1;
        let edited = tmd.with_content_records(records).unwrap();
        assert!(!edited.verify(&chain).unwrap());
    }

    #[test]
    fn test_tampered_tmd_fails_verification() {
        let chain = testutil::fixture().verified_chain();
        let mut bytes = testutil::sample_tmd().to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;
        let tmd = TMD::from_bytes(&bytes).unwrap();
        assert!(!tmd.verify(&chain).unwrap());
    }

    #[test]
    fn test_fakesign_tmd() {
        let tmd = testutil::sample_tmd();
        assert!(!tmd.is_fakesigned());
        let fakesigned = tmd.fakesigned().unwrap();
        assert!(fakesigned.is_fakesigned());
        assert_eq!(Sha1::digest(fakesigned.signed_body().unwrap())[0], 0);
    }

    #[test]
    fn test_title_type() {
        let tmd = testutil::sample_tmd();
        assert_eq!(tmd.title_type().unwrap(), TitleType::Channel);
        let tmd = tmd.with_title_id([0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(tmd.title_type().unwrap(), TitleType::System);
        let tmd = tmd.with_title_id([0x00, 0x07, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02]);
        assert!(matches!(tmd.title_type(), Err(TMDError::InvalidTitleType(_))));
    }

    #[test]
    fn test_region_and_access_rights() {
        let tmd = TMD::builder(testutil::TITLE_ID)
            .region(1)
            .access_right(AccessRight::DVDVideo)
            .build().unwrap();
        assert_eq!(tmd.region(), "USA");
        assert!(tmd.check_access_right(AccessRight::DVDVideo));
        assert!(!tmd.check_access_right(AccessRight::AHB));
    }

    #[test]
    fn test_ios_tid_validation() {
        let tmd = testutil::sample_tmd();
        assert!(matches!(tmd.clone().with_ios_tid([0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3A]), Err(TMDError::InvalidIOSTitleID)));
        assert!(matches!(tmd.clone().with_ios_tid([0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0x00]), Err(TMDError::InvalidIOSVersion(256))));
        let tmd = tmd.with_ios_tid([0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x50]).unwrap();
        assert_eq!(tmd.ios_tid()[7], 0x50);
    }

    #[test]
    fn test_issuer_too_long() {
        let result = testutil::sample_tmd().with_signature_issuer(&"X".repeat(65));
        assert!(matches!(result, Err(TMDError::IssuerTooLong(65))));
    }
}
