// title/ticket.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Implements the structures and methods required for Ticket parsing, verification, and Title Key
// unwrapping.

use rsa::RsaPrivateKey;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{debug, trace};
use crate::title::cert::{self, CertificateError, Signature, SignatureType, VerifiedChain};
use crate::title::commonkeys::CommonKeys;
use crate::title::crypto;
use crate::title::cursor::{fixed_str, ByteReader, ByteWriter, CursorError};
use crate::title::ErrorClass;

/// Size of the Ticket data following the signature block.
const TICKET_BODY_LEN: usize = 0x164;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket data must be at least {expected} bytes long (was {available})")]
    MalformedTicket { expected: usize, available: usize },
    #[error("Ticket data is malformed")]
    Malformed(#[from] CursorError),
    #[error("Ticket signature could not be processed")]
    Signature(#[from] CertificateError),
    #[error("Ticket is version `{0}` but only v0 is supported")]
    UnsupportedVersion(u8),
    #[error("Ticket uses common key index {0}, but only indices 0-2 exist")]
    UnknownCommonKeyIndex(u8),
    #[error("Ticket data could not be fakesigned")]
    CannotFakesign,
    #[error("signature issuer string must not exceed 64 characters (was {0})")]
    IssuerTooLong(usize),
    #[error("Ticket data could not be written")]
    IO(#[from] std::io::Error),
}

impl TicketError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TicketError::Signature(e) => e.class(),
            _ => ErrorClass::MalformedInput,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TitleLimit {
    // The type of limit being applied (time, launch count, etc.)
    pub limit_type: u32,
    // The maximum value for that limit (seconds, max launches, etc.)
    pub limit_max: u32,
}

/// A structure that represents a Wii Ticket file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    signature: Signature,
    signature_issuer: [u8; 64],
    ecdh_data: [u8; 60],
    ticket_version: u8,
    reserved1: [u8; 2],
    title_key: [u8; 16],
    unknown1: [u8; 1],
    ticket_id: [u8; 8],
    console_id: [u8; 4],
    title_id: [u8; 8],
    unknown2: [u8; 2],
    title_version: u16,
    permitted_titles_mask: [u8; 4],
    permit_mask: [u8; 4],
    title_export_allowed: u8,
    common_key_index: u8,
    unknown3: [u8; 48],
    content_access_permission: [u8; 64],
    padding2: [u8; 2],
    title_limits: [TitleLimit; 8],
}

impl Ticket {
    /// Starts building a new, unsigned Ticket for the specified Title ID and decrypted Title Key.
    pub fn builder(title_id: [u8; 8], title_key: [u8; 16]) -> TicketBuilder {
        TicketBuilder {
            signature_type: SignatureType::Rsa2048,
            issuer: "Root-CA00000001-XS00000003".to_owned(),
            title_id,
            title_key,
            common_key_index: 0,
            ticket_id: [0; 8],
            console_id: [0; 4],
            title_version: 0,
            title_export_allowed: false,
            title_limits: [TitleLimit::default(); 8],
        }
    }

    /// Creates a new Ticket instance from the binary data of a Ticket file.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TicketError> {
        let mut buf = ByteReader::new(data);
        let signature = Signature::read(&mut buf)?;
        let expected = signature.signature_type().block_len() + TICKET_BODY_LEN;
        if data.len() < expected {
            return Err(TicketError::MalformedTicket { expected, available: data.len() });
        }
        let signature_issuer = buf.read_array::<64>()?;
        let ecdh_data = buf.read_array::<60>()?;
        let ticket_version = buf.read_u8()?;
        // v1 Tickets are NOT supported.
        if ticket_version != 0 {
            return Err(TicketError::UnsupportedVersion(ticket_version));
        }
        let reserved1 = buf.read_array::<2>()?;
        let title_key = buf.read_array::<16>()?;
        let unknown1 = buf.read_array::<1>()?;
        let ticket_id = buf.read_array::<8>()?;
        let console_id = buf.read_array::<4>()?;
        let title_id = buf.read_array::<8>()?;
        let unknown2 = buf.read_array::<2>()?;
        let title_version = buf.read_u16()?;
        let permitted_titles_mask = buf.read_array::<4>()?;
        let permit_mask = buf.read_array::<4>()?;
        let title_export_allowed = buf.read_u8()?;
        let common_key_index = buf.read_u8()?;
        let unknown3 = buf.read_array::<48>()?;
        let content_access_permission = buf.read_array::<64>()?;
        let padding2 = buf.read_array::<2>()?;
        // Build the array of title limits.
        let mut title_limits = [TitleLimit::default(); 8];
        for limit in title_limits.iter_mut() {
            limit.limit_type = buf.read_u32()?;
            limit.limit_max = buf.read_u32()?;
        }
        let ticket = Ticket {
            signature,
            signature_issuer,
            ecdh_data,
            ticket_version,
            reserved1,
            title_key,
            unknown1,
            ticket_id,
            console_id,
            title_id,
            unknown2,
            title_version,
            permitted_titles_mask,
            permit_mask,
            title_export_allowed,
            common_key_index,
            unknown3,
            content_access_permission,
            padding2,
            title_limits,
        };
        trace!(title_id = %hex::encode(title_id), issuer = %ticket.signature_issuer(), "parsed Ticket");
        Ok(ticket)
    }

    /// Dumps the data in a Ticket instance back into binary data that can be written to a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = ByteWriter::with_capacity(self.signature.signature_type().block_len() + TICKET_BODY_LEN);
        self.signature.write(&mut buf)?;
        self.write_body(&mut buf)?;
        Ok(buf.into_inner())
    }

    /// Gets the bytes covered by the Ticket's signature.
    pub fn signed_body(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = ByteWriter::with_capacity(TICKET_BODY_LEN);
        self.write_body(&mut buf)?;
        Ok(buf.into_inner())
    }

    fn write_body(&self, buf: &mut ByteWriter) -> Result<(), std::io::Error> {
        buf.write_bytes(&self.signature_issuer)?;
        buf.write_bytes(&self.ecdh_data)?;
        buf.write_u8(self.ticket_version)?;
        buf.write_bytes(&self.reserved1)?;
        buf.write_bytes(&self.title_key)?;
        buf.write_bytes(&self.unknown1)?;
        buf.write_bytes(&self.ticket_id)?;
        buf.write_bytes(&self.console_id)?;
        buf.write_bytes(&self.title_id)?;
        buf.write_bytes(&self.unknown2)?;
        buf.write_u16(self.title_version)?;
        buf.write_bytes(&self.permitted_titles_mask)?;
        buf.write_bytes(&self.permit_mask)?;
        buf.write_u8(self.title_export_allowed)?;
        buf.write_u8(self.common_key_index)?;
        buf.write_bytes(&self.unknown3)?;
        buf.write_bytes(&self.content_access_permission)?;
        buf.write_bytes(&self.padding2)?;
        // Iterate over title limits and write out their data.
        for limit in &self.title_limits {
            buf.write_u32(limit.limit_type)?;
            buf.write_u32(limit.limit_max)?;
        }
        Ok(())
    }

    /// Verifies the Ticket's signature using the certificate in the chain named as its issuer.
    /// Returns false if the signature doesn't match or the issuer isn't in the chain.
    pub fn verify(&self, chain: &VerifiedChain) -> Result<bool, TicketError> {
        let result = chain.verify_signed(&self.signature_issuer(), &self.signed_body()?, &self.signature)?;
        debug!(issuer = %self.signature_issuer(), result, "verified Ticket signature");
        Ok(result)
    }

    /// Decrypts the Title Key using the common key selected by the Ticket. The Title ID, padded
    /// with zeroes, is the IV.
    pub fn unwrap_title_key(&self, common_keys: &CommonKeys) -> Result<[u8; 16], TicketError> {
        let common_key = common_keys.get(self.common_key_index)
            .ok_or(TicketError::UnknownCommonKeyIndex(self.common_key_index))?;
        Ok(crypto::decrypt_title_key(self.title_key, common_key, self.title_id))
    }

    /// Signs the Ticket with the private key of its issuer, returning the signed copy.
    pub fn signed(self, key: &RsaPrivateKey) -> Result<Self, TicketError> {
        let signature = cert::sign_blob(&self.signed_body()?, self.signature.signature_type(), key)?;
        Ok(Ticket { signature, ..self })
    }

    /// Gets whether a Ticket is fakesigned using the strncmp (trucha) bug or not.
    pub fn is_fakesigned(&self) -> bool {
        // Can't be fakesigned without a null signature.
        if !self.signature.is_null() {
            return false;
        }
        // Test the hash of the Ticket body to make sure it starts with 00.
        match self.signed_body() {
            Ok(body) => Sha1::digest(&body)[0] == 0,
            Err(_) => false,
        }
    }

    /// Fakesigns a Ticket for use with the strncmp (trucha) bug, returning the fakesigned copy.
    pub fn fakesigned(self) -> Result<Self, TicketError> {
        let mut ticket = Ticket { signature: Signature::empty(self.signature.signature_type()), ..self };
        let mut current_int: u16 = 0;
        loop {
            ticket.unknown2 = current_int.to_be_bytes();
            if Sha1::digest(&ticket.signed_body()?)[0] == 0 {
                return Ok(ticket);
            }
            if current_int == u16::MAX {
                return Err(TicketError::CannotFakesign);
            }
            current_int += 1;
        }
    }

    /// Returns a copy of the Ticket with a new Title ID. The Title Key is re-encrypted, since the
    /// Title ID is used as the IV for decrypting it.
    pub fn with_title_id(self, title_id: [u8; 8], common_keys: &CommonKeys) -> Result<Self, TicketError> {
        let title_key_dec = self.unwrap_title_key(common_keys)?;
        let common_key = common_keys.get(self.common_key_index)
            .ok_or(TicketError::UnknownCommonKeyIndex(self.common_key_index))?;
        let title_key = crypto::encrypt_title_key(title_key_dec, common_key, title_id);
        Ok(Ticket { title_key, title_id, ..self })
    }

    /// Returns a copy of the Ticket with a new title version.
    pub fn with_title_version(self, title_version: u16) -> Self {
        Ticket { title_version, ..self }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Gets the name of the certificate used to sign a Ticket as a string.
    pub fn signature_issuer(&self) -> String {
        fixed_str(&self.signature_issuer)
    }

    /// Gets the ECDH data listed in the Ticket.
    pub fn ecdh_data(&self) -> [u8; 60] {
        self.ecdh_data
    }

    /// Gets the version of the Ticket file.
    pub fn ticket_version(&self) -> u8 {
        self.ticket_version
    }

    /// Gets the raw encrypted Title Key from the Ticket.
    pub fn title_key(&self) -> [u8; 16] {
        self.title_key
    }

    /// Gets the Ticket ID listed in the Ticket.
    pub fn ticket_id(&self) -> [u8; 8] {
        self.ticket_id
    }

    /// Gets the console ID listed in the Ticket.
    pub fn console_id(&self) -> [u8; 4] {
        self.console_id
    }

    pub fn title_id(&self) -> [u8; 8] {
        self.title_id
    }

    /// Gets the version of the title listed in the Ticket.
    pub fn title_version(&self) -> u16 {
        self.title_version
    }

    pub fn permitted_titles_mask(&self) -> [u8; 4] {
        self.permitted_titles_mask
    }

    pub fn permit_mask(&self) -> [u8; 4] {
        self.permit_mask
    }

    /// Gets whether title export is allowed by the Ticket.
    pub fn title_export_allowed(&self) -> bool {
        self.title_export_allowed == 1
    }

    /// Gets the index of the common key used by the Ticket.
    pub fn common_key_index(&self) -> u8 {
        self.common_key_index
    }

    /// Gets the content access permissions listed in the Ticket, one bit per content index.
    pub fn content_access_permission(&self) -> [u8; 64] {
        self.content_access_permission
    }

    /// Gets whether the Ticket permits access to the content with the specified index.
    pub fn content_access_allowed(&self, index: u16) -> bool {
        let byte = (index / 8) as usize;
        byte < 64 && self.content_access_permission[byte] & (0x80 >> (index % 8)) != 0
    }

    /// Gets the title usage limits listed in the Ticket.
    pub fn title_limits(&self) -> [TitleLimit; 8] {
        self.title_limits
    }

    /// Gets whether a Ticket was signed for development (true) or retail (false).
    pub fn is_dev(&self) -> bool {
        self.signature_issuer().starts_with("Root-CA00000002")
    }
}

/// Accumulates the fields of a new Ticket. Nothing is encrypted until [`TicketBuilder::build`].
#[derive(Debug, Clone)]
pub struct TicketBuilder {
    signature_type: SignatureType,
    issuer: String,
    title_id: [u8; 8],
    title_key: [u8; 16],
    common_key_index: u8,
    ticket_id: [u8; 8],
    console_id: [u8; 4],
    title_version: u16,
    title_export_allowed: bool,
    title_limits: [TitleLimit; 8],
}

impl TicketBuilder {
    pub fn signature_type(mut self, signature_type: SignatureType) -> Self {
        self.signature_type = signature_type;
        self
    }

    pub fn issuer(mut self, issuer: &str) -> Self {
        self.issuer = issuer.to_owned();
        self
    }

    pub fn common_key_index(mut self, index: u8) -> Self {
        self.common_key_index = index;
        self
    }

    pub fn ticket_id(mut self, ticket_id: [u8; 8]) -> Self {
        self.ticket_id = ticket_id;
        self
    }

    pub fn console_id(mut self, console_id: [u8; 4]) -> Self {
        self.console_id = console_id;
        self
    }

    pub fn title_version(mut self, title_version: u16) -> Self {
        self.title_version = title_version;
        self
    }

    pub fn title_export_allowed(mut self, allowed: bool) -> Self {
        self.title_export_allowed = allowed;
        self
    }

    pub fn title_limits(mut self, limits: [TitleLimit; 8]) -> Self {
        self.title_limits = limits;
        self
    }

    /// Wraps the Title Key with the selected common key and produces the unsigned Ticket.
    pub fn build(self, common_keys: &CommonKeys) -> Result<Ticket, TicketError> {
        if self.issuer.len() > 64 {
            return Err(TicketError::IssuerTooLong(self.issuer.len()));
        }
        let common_key = common_keys.get(self.common_key_index)
            .ok_or(TicketError::UnknownCommonKeyIndex(self.common_key_index))?;
        let mut signature_issuer = [0u8; 64];
        signature_issuer[..self.issuer.len()].copy_from_slice(self.issuer.as_bytes());
        Ok(Ticket {
            signature: Signature::empty(self.signature_type),
            signature_issuer,
            ecdh_data: [0; 60],
            ticket_version: 0,
            reserved1: [0; 2],
            title_key: crypto::encrypt_title_key(self.title_key, common_key, self.title_id),
            unknown1: [0; 1],
            ticket_id: self.ticket_id,
            console_id: self.console_id,
            title_id: self.title_id,
            unknown2: [0; 2],
            title_version: self.title_version,
            permitted_titles_mask: [0; 4],
            permit_mask: [0xFF; 4],
            title_export_allowed: self.title_export_allowed as u8,
            common_key_index: self.common_key_index,
            unknown3: [0; 48],
            content_access_permission: [0xFF; 64],
            padding2: [0; 2],
            title_limits: self.title_limits,
        })
    }
}
