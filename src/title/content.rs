// title/content.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Implements content parsing, verification, and editing.

use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{debug, trace};
use crate::title::crypto::{self, CryptoError};
use crate::title::cursor::{align_up, ByteWriter};
use crate::title::tmd::{ContentRecord, ContentType};
use crate::title::ErrorClass;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("requested position {index} is out of range (region holds {count} contents)")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("expected {required} contents based on content records but found {found}")]
    MissingContents { required: usize, found: usize },
    #[error("content {index} needs {needed} bytes of the content region but only {available} remain")]
    TruncatedContent { index: u16, needed: usize, available: usize },
    #[error("content with requested Content ID {0} could not be found")]
    CIDNotFound(u32),
    #[error("the specified index {0} already exists in the content records")]
    IndexAlreadyExists(u16),
    #[error("the specified Content ID {0} already exists in the content records")]
    CIDAlreadyExists(u32),
    #[error("content's hash did not match the expected value (was {hash}, expected {expected})")]
    BadHash { hash: String, expected: String },
    #[error("content could not be encrypted or decrypted")]
    Crypto(#[from] CryptoError),
    #[error("content data could not be written")]
    IO(#[from] std::io::Error),
}

impl ContentError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ContentError::BadHash { .. } => ErrorClass::CryptoMismatch,
            ContentError::Crypto(e) => e.class(),
            _ => ErrorClass::MalformedInput,
        }
    }
}

/// Checks decrypted content against its record. Only the first `content_size` bytes are hashed,
/// so trailing cipher padding is ignored; content shorter than the record fails.
pub fn verify_content(content: &[u8], record: &ContentRecord) -> bool {
    let size = record.content_size as usize;
    if content.len() < size {
        return false;
    }
    Sha1::digest(&content[..size])[..] == record.content_hash
}

// Pads decrypted content out to the cipher block size and encrypts it.
fn encrypt_padded(content: &[u8], title_key: [u8; 16], index: u16) -> Result<Vec<u8>, CryptoError> {
    let mut padded = content.to_vec();
    padded.resize(align_up(content.len(), 16), 0);
    crypto::encrypt_content(&padded, title_key, index)
}

/// A structure that represents the block of data containing the content of a digital Wii title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRegion {
    content_records: Vec<ContentRecord>,
    contents: Vec<Vec<u8>>,
}

impl ContentRegion {
    /// Creates a ContentRegion instance from the content area of a WAD and the ContentRecords from
    /// a TMD. Each content starts on a 64 byte boundary and occupies its size rounded up to 16.
    pub fn from_bytes(data: &[u8], content_records: Vec<ContentRecord>) -> Result<Self, ContentError> {
        let mut contents = Vec::with_capacity(content_records.len());
        let mut offset = 0usize;
        for record in &content_records {
            let available = data.len().saturating_sub(offset);
            if record.content_size > available as u64 {
                let needed = usize::try_from(record.content_size).unwrap_or(usize::MAX);
                return Err(ContentError::TruncatedContent { index: record.index, needed, available });
            }
            let size = align_up(record.content_size as usize, 16);
            let content = data.get(offset..offset + size)
                .ok_or(ContentError::TruncatedContent { index: record.index, needed: size, available })?;
            trace!(index = record.index, offset, size, "located content");
            contents.push(content.to_vec());
            offset = align_up(offset + size, 64);
        }
        Ok(ContentRegion { content_records, contents })
    }

    /// Creates a ContentRegion instance from a vector of encrypted contents and the ContentRecords
    /// from a TMD, in the same order.
    pub fn from_contents(contents: Vec<Vec<u8>>, content_records: Vec<ContentRecord>) -> Result<Self, ContentError> {
        if contents.len() != content_records.len() {
            return Err(ContentError::MissingContents { required: content_records.len(), found: contents.len() });
        }
        Ok(ContentRegion { content_records, contents })
    }

    /// Dumps the entire ContentRegion back into binary data that can be written to a file. Every
    /// content but the last is padded out to 64 bytes; the last one ends the region unpadded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = ByteWriter::with_capacity(self.content_region_size());
        for (i, content) in self.contents.iter().enumerate() {
            if i > 0 {
                buf.align(64);
            }
            buf.write_bytes(content)?;
        }
        Ok(buf.into_inner())
    }

    pub fn content_records(&self) -> &[ContentRecord] {
        &self.content_records
    }

    /// Gets the encrypted contents, in record order.
    pub fn contents(&self) -> &[Vec<u8>] {
        &self.contents
    }

    /// Gets the size of the ContentRegion once written out, which is the size a WAD header records.
    pub fn content_region_size(&self) -> usize {
        match self.contents.split_last() {
            Some((last, rest)) => rest.iter().map(|content| align_up(content.len(), 64)).sum::<usize>() + last.len(),
            None => 0,
        }
    }

    /// Gets the start offsets of the content in the ContentRegion.
    pub fn content_start_offsets(&self) -> Vec<usize> {
        self.contents.iter()
            .scan(0, |offset, content| {
                let start = *offset;
                *offset += align_up(content.len(), 64);
                Some(start)
            })
            .collect()
    }

    /// Gets the position of content in the region using its Content ID.
    pub fn get_index_from_cid(&self, cid: u32) -> Result<usize, ContentError> {
        self.content_records.iter()
            .position(|record| record.content_id == cid)
            .ok_or(ContentError::CIDNotFound(cid))
    }

    fn check_index(&self, index: usize) -> Result<(), ContentError> {
        if index >= self.contents.len() {
            return Err(ContentError::IndexOutOfRange { index, count: self.contents.len() });
        }
        Ok(())
    }

    /// Gets the encrypted content file from the ContentRegion at the specified position.
    pub fn get_enc_content_by_index(&self, index: usize) -> Result<&[u8], ContentError> {
        self.check_index(index)?;
        Ok(&self.contents[index])
    }

    /// Gets the decrypted content file from the ContentRegion at the specified position. The
    /// content is trimmed to the size in its record and must match the recorded hash.
    pub fn get_content_by_index(&self, index: usize, title_key: [u8; 16]) -> Result<Vec<u8>, ContentError> {
        self.check_index(index)?;
        let record = &self.content_records[index];
        let mut content_dec = crypto::decrypt_content(&self.contents[index], title_key, record.index)?;
        content_dec.truncate(record.content_size as usize);
        if !verify_content(&content_dec, record) {
            let hash = Sha1::digest(&content_dec);
            debug!(index = record.index, cid = record.content_id, "content hash mismatch");
            return Err(ContentError::BadHash { hash: hex::encode(hash), expected: hex::encode(record.content_hash) });
        }
        Ok(content_dec)
    }

    /// Gets the encrypted content file from the ContentRegion with the specified Content ID.
    pub fn get_enc_content_by_cid(&self, cid: u32) -> Result<&[u8], ContentError> {
        let index = self.get_index_from_cid(cid)?;
        self.get_enc_content_by_index(index)
    }

    /// Gets the decrypted content file from the ContentRegion with the specified Content ID.
    pub fn get_content_by_cid(&self, cid: u32, title_key: [u8; 16]) -> Result<Vec<u8>, ContentError> {
        let index = self.get_index_from_cid(cid)?;
        self.get_content_by_index(index, title_key)
    }

    /// Checks each content against its record, in record order.
    pub fn verify(&self, title_key: [u8; 16]) -> Vec<bool> {
        (0..self.contents.len())
            .map(|index| self.get_content_by_index(index, title_key).is_ok())
            .collect()
    }

    /// Returns a copy of the region with the content at the specified position replaced by
    /// encrypted content. The size and hash of the decrypted content are saved into its record,
    /// along with an optional new Content ID or content type.
    pub fn with_enc_content(mut self, content: &[u8], index: usize, content_size: u64, content_hash: [u8; 20],
                            cid: Option<u32>, content_type: Option<ContentType>) -> Result<Self, ContentError> {
        self.check_index(index)?;
        if let Some(cid) = cid {
            // Make sure that the new CID isn't already in use by another record.
            if self.content_records.iter().enumerate().any(|(i, record)| i != index && record.content_id == cid) {
                return Err(ContentError::CIDAlreadyExists(cid));
            }
            self.content_records[index].content_id = cid;
        }
        if let Some(content_type) = content_type {
            self.content_records[index].content_type = content_type;
        }
        self.content_records[index].content_size = content_size;
        self.content_records[index].content_hash = content_hash;
        self.contents[index] = content.to_vec();
        Ok(self)
    }

    /// Returns a copy of the region with the content at the specified position replaced by
    /// decrypted content, which is hashed and then encrypted with the Title Key.
    pub fn with_content(self, content: &[u8], index: usize, cid: Option<u32>, content_type: Option<ContentType>,
                        title_key: [u8; 16]) -> Result<Self, ContentError> {
        self.check_index(index)?;
        let content_hash: [u8; 20] = Sha1::digest(content).into();
        let content_enc = encrypt_padded(content, title_key, self.content_records[index].index)?;
        self.with_enc_content(&content_enc, index, content.len() as u64, content_hash, cid, content_type)
    }

    /// Returns a copy of the region with encrypted content appended to the end of the content list
    /// and content records.
    pub fn with_added_enc_content(mut self, content: &[u8], index: u16, cid: u32, content_type: ContentType,
                                  content_size: u64, content_hash: [u8; 20]) -> Result<Self, ContentError> {
        // Return an error if the specified index or CID already exist in the records.
        if self.content_records.iter().any(|record| record.index == index) {
            return Err(ContentError::IndexAlreadyExists(index));
        }
        if self.content_records.iter().any(|record| record.content_id == cid) {
            return Err(ContentError::CIDAlreadyExists(cid));
        }
        self.contents.push(content.to_vec());
        self.content_records.push(ContentRecord { content_id: cid, index, content_type, content_size, content_hash });
        Ok(self)
    }

    /// Returns a copy of the region with decrypted content appended. The content is assigned the
    /// index after the highest one currently recorded.
    pub fn with_added_content(self, content: &[u8], cid: u32, content_type: ContentType,
                              title_key: [u8; 16]) -> Result<Self, ContentError> {
        let new_index = self.content_records.iter()
            .map(|record| record.index)
            .max()
            .map_or(0, |index| index.wrapping_add(1));
        let content_hash: [u8; 20] = Sha1::digest(content).into();
        let content_enc = encrypt_padded(content, title_key, new_index)?;
        self.with_added_enc_content(&content_enc, new_index, cid, content_type, content.len() as u64, content_hash)
    }

    /// Returns a copy of the region without the content at the specified position. This may leave
    /// a gap in the recorded indices, which the Wii handles fine.
    pub fn without_content(mut self, index: usize) -> Result<Self, ContentError> {
        self.check_index(index)?;
        self.contents.remove(index);
        self.content_records.remove(index);
        Ok(self)
    }
}
