// title/mod.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Root for all title-related modules and implementation of the high-level Title object.

pub mod cert;
pub mod commonkeys;
pub mod config;
pub mod content;
pub mod crypto;
pub mod cursor;
pub mod ticket;
pub mod tmd;
pub mod wad;

#[cfg(test)]
mod testutil;

use thiserror::Error;
use tracing::debug;

/// The broad category an error falls into, shared by every error type in the crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// Truncated or ill-formed structural data.
    MalformedInput,
    /// A signature or hash that doesn't match.
    CryptoMismatch,
    /// A signature or key type that can't be checked.
    UnsupportedAlgorithm,
    /// Missing or invalid common keys or trusted roots.
    Configuration,
}

#[derive(Debug, Error)]
pub enum TitleError {
    #[error("TMD lists {declared} contents but the content region holds {found}")]
    ContentRecordsMismatch { declared: usize, found: usize },
    #[error("certificate processing error")]
    CertificateError(#[from] cert::CertificateError),
    #[error("certificate chain error")]
    Chain(#[from] cert::ChainError),
    #[error("configuration error")]
    Config(#[from] config::ConfigError),
    #[error("TMD processing error")]
    TMD(#[from] tmd::TMDError),
    #[error("Ticket processing error")]
    Ticket(#[from] ticket::TicketError),
    #[error("content processing error")]
    Content(#[from] content::ContentError),
    #[error("WAD processing error")]
    WAD(#[from] wad::WADError),
    #[error("Title data could not be written")]
    IO(#[from] std::io::Error),
}

impl TitleError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TitleError::ContentRecordsMismatch { .. } | TitleError::IO(_) => ErrorClass::MalformedInput,
            TitleError::CertificateError(e) => e.class(),
            TitleError::Chain(e) => e.class(),
            TitleError::Config(e) => e.class(),
            TitleError::TMD(e) => e.class(),
            TitleError::Ticket(e) => e.class(),
            TitleError::Content(e) => e.class(),
            TitleError::WAD(e) => e.class(),
        }
    }
}

/// The outcome of checking one signature against the verified chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    /// The signature doesn't match, its signer isn't in the chain, or the chain itself is broken.
    Invalid,
    /// The signer holds a key of a type whose signatures can't be checked.
    Unsupported(cert::KeyType),
}

impl SignatureCheck {
    pub fn is_valid(self) -> bool {
        self == SignatureCheck::Valid
    }
}

impl From<bool> for SignatureCheck {
    fn from(valid: bool) -> Self {
        if valid { SignatureCheck::Valid } else { SignatureCheck::Invalid }
    }
}

/// The result of checking every signature and hash in a Title. Failures are reported here rather
/// than as errors, so that untrusted titles can still be inspected.
#[derive(Debug)]
pub struct VerificationReport {
    /// Whether the certificate chain links back to a trusted root, and where it broke if not.
    pub chain: Result<(), cert::ChainError>,
    /// Whether the Ticket's signature matches. Always invalid when the chain is broken.
    pub ticket: SignatureCheck,
    /// Whether the TMD's signature matches. Always invalid when the chain is broken.
    pub tmd: SignatureCheck,
    /// Whether each content matches the hash in its record, in record order.
    pub contents: Vec<bool>,
}

impl VerificationReport {
    /// Gets whether every part of the Title was verified.
    pub fn is_trusted(&self) -> bool {
        self.chain.is_ok() && self.ticket.is_valid() && self.tmd.is_valid() && self.contents.iter().all(|&ok| ok)
    }
}

/// A structure that represents the components of a digital Wii title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    cert_chain: cert::CertificateChain,
    crl: Vec<u8>,
    ticket: ticket::Ticket,
    tmd: tmd::TMD,
    content: content::ContentRegion,
    meta: Vec<u8>,
}

impl Title {
    /// Creates a new Title instance from an existing WAD instance.
    pub fn from_wad(wad: &wad::WAD) -> Result<Title, TitleError> {
        let cert_chain = cert::CertificateChain::from_bytes(wad.cert_chain())?;
        let ticket = ticket::Ticket::from_bytes(wad.ticket())?;
        let tmd = tmd::TMD::from_bytes(wad.tmd())?;
        let content = content::ContentRegion::from_bytes(wad.content(), tmd.content_records().to_vec())?;
        Ok(Title {
            cert_chain,
            crl: wad.crl().to_vec(),
            ticket,
            tmd,
            content,
            meta: wad.meta().to_vec(),
        })
    }

    /// Creates a new Title instance from all of its individual components. The CRL and meta
    /// sections may be empty.
    pub fn from_parts(cert_chain: cert::CertificateChain, crl: &[u8], ticket: ticket::Ticket, tmd: tmd::TMD,
                      content: content::ContentRegion, meta: &[u8]) -> Result<Title, TitleError> {
        if tmd.content_records() != content.content_records() {
            return Err(TitleError::ContentRecordsMismatch {
                declared: tmd.content_records().len(),
                found: content.content_records().len(),
            });
        }
        Ok(Title {
            cert_chain,
            crl: crl.to_vec(),
            ticket,
            tmd,
            content,
            meta: meta.to_vec(),
        })
    }

    /// Creates a new Title instance from the binary data of a WAD file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Title, TitleError> {
        let wad = wad::WAD::from_bytes(bytes)?;
        Title::from_wad(&wad)
    }

    /// Converts a Title instance into a WAD, which can be used to export the Title back to a file.
    /// The Ticket and TMD are stored exactly as they are, so edits must be signed first.
    pub fn to_wad(&self) -> Result<wad::WAD, TitleError> {
        Ok(wad::WAD::from_parts(&self.cert_chain, &self.crl, &self.ticket, &self.tmd, &self.content, &self.meta)?)
    }

    /// Dumps the Title into the binary data of a WAD file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TitleError> {
        Ok(self.to_wad()?.to_bytes()?)
    }

    /// Verifies the certificate chain against the trusted roots, then the Ticket and TMD against
    /// the chain, then each content against its record. Signers with ECC keys are reported as
    /// unsupported rather than failing the whole check.
    pub fn verify(&self, config: &config::TitleConfig) -> Result<VerificationReport, TitleError> {
        let (chain, ticket, tmd) = match self.cert_chain.verify(config.trusted_roots()) {
            Ok(verified) => {
                let ticket = match self.ticket.verify(&verified) {
                    Ok(valid) => SignatureCheck::from(valid),
                    Err(ticket::TicketError::Signature(cert::CertificateError::UnsupportedKeyType(key_type))) => SignatureCheck::Unsupported(key_type),
                    Err(e) => return Err(e.into()),
                };
                let tmd = match self.tmd.verify(&verified) {
                    Ok(valid) => SignatureCheck::from(valid),
                    Err(tmd::TMDError::Signature(cert::CertificateError::UnsupportedKeyType(key_type))) => SignatureCheck::Unsupported(key_type),
                    Err(e) => return Err(e.into()),
                };
                (Ok(()), ticket, tmd)
            },
            Err(e) => (Err(e), SignatureCheck::Invalid, SignatureCheck::Invalid),
        };
        let contents = self.content.verify(self.title_key(config)?);
        let report = VerificationReport { chain, ticket, tmd, contents };
        debug!(trusted = report.is_trusted(), ticket = ?ticket, tmd = ?tmd, "verified Title");
        Ok(report)
    }

    /// Gets the decrypted Title Key, unwrapped with the configured common keys.
    pub fn title_key(&self, config: &config::TitleConfig) -> Result<[u8; 16], TitleError> {
        Ok(self.ticket.unwrap_title_key(config.common_keys())?)
    }

    /// Gets whether the TMD and Ticket of a Title are both fakesigned.
    pub fn is_fakesigned(&self) -> bool {
        self.tmd.is_fakesigned() && self.ticket.is_fakesigned()
    }

    /// Fakesigns the TMD and Ticket of a Title, returning the fakesigned copy.
    pub fn fakesigned(self) -> Result<Title, TitleError> {
        Ok(Title {
            tmd: self.tmd.fakesigned()?,
            ticket: self.ticket.fakesigned()?,
            ..self
        })
    }

    /// Signs the Ticket and TMD with the private keys of their issuers, returning the signed copy.
    pub fn signed(self, ticket_key: &rsa::RsaPrivateKey, tmd_key: &rsa::RsaPrivateKey) -> Result<Title, TitleError> {
        Ok(Title {
            ticket: self.ticket.signed(ticket_key)?,
            tmd: self.tmd.signed(tmd_key)?,
            ..self
        })
    }

    /// Gets the decrypted content file from the Title at the specified position.
    pub fn get_content_by_index(&self, index: usize, config: &config::TitleConfig) -> Result<Vec<u8>, TitleError> {
        Ok(self.content.get_content_by_index(index, self.title_key(config)?)?)
    }

    /// Gets the decrypted content file from the Title with the specified Content ID.
    pub fn get_content_by_cid(&self, cid: u32, config: &config::TitleConfig) -> Result<Vec<u8>, TitleError> {
        Ok(self.content.get_content_by_cid(cid, self.title_key(config)?)?)
    }

    // Keeps the TMD's records in step with the content region after an edit.
    fn with_region(self, content: content::ContentRegion) -> Result<Title, TitleError> {
        let tmd = self.tmd.with_content_records(content.content_records().to_vec())?;
        Ok(Title { tmd, content, ..self })
    }

    /// Returns a copy of the Title with the content at the specified position replaced by the
    /// provided decrypted content. Its size and hash are saved into the matching record, along
    /// with an optional new Content ID or content type.
    pub fn with_content(self, content: &[u8], index: usize, cid: Option<u32>, content_type: Option<tmd::ContentType>,
                        config: &config::TitleConfig) -> Result<Title, TitleError> {
        let title_key = self.title_key(config)?;
        let region = self.content.clone().with_content(content, index, cid, content_type, title_key)?;
        self.with_region(region)
    }

    /// Returns a copy of the Title with new decrypted content added to the end of the content list
    /// and content records.
    pub fn with_added_content(self, content: &[u8], cid: u32, content_type: tmd::ContentType,
                              config: &config::TitleConfig) -> Result<Title, TitleError> {
        let title_key = self.title_key(config)?;
        let region = self.content.clone().with_added_content(content, cid, content_type, title_key)?;
        self.with_region(region)
    }

    /// Returns a copy of the Title without the content at the specified position.
    pub fn without_content(self, index: usize) -> Result<Title, TitleError> {
        let region = self.content.clone().without_content(index)?;
        self.with_region(region)
    }

    /// Returns a copy of the Title with a new Title ID. This will re-encrypt the Title Key in the
    /// Ticket, since the Title ID is used as the IV for decrypting the Title Key.
    pub fn with_title_id(self, title_id: [u8; 8], config: &config::TitleConfig) -> Result<Title, TitleError> {
        Ok(Title {
            ticket: self.ticket.with_title_id(title_id, config.common_keys())?,
            tmd: self.tmd.with_title_id(title_id),
            ..self
        })
    }

    /// Returns a copy of the Title with a new title version in both the Ticket and TMD.
    pub fn with_title_version(self, version: u16) -> Title {
        Title {
            ticket: self.ticket.with_title_version(version),
            tmd: self.tmd.with_title_version(version),
            ..self
        }
    }

    pub fn with_cert_chain(self, cert_chain: cert::CertificateChain) -> Title {
        Title { cert_chain, ..self }
    }

    pub fn with_meta(self, meta: &[u8]) -> Title {
        Title { meta: meta.to_vec(), ..self }
    }

    /// Gets the installed size of the title, in bytes. Shared content is only counted when
    /// `absolute` is set, since it's normally already installed.
    pub fn title_size(&self, absolute: bool) -> Result<usize, TitleError> {
        // Get the TMD and Ticket size by dumping them and measuring their length for the most
        // accurate results.
        let mut title_size = self.tmd.to_bytes()?.len() + self.ticket.to_bytes()?.len();
        for record in self.tmd.content_records() {
            if absolute || record.content_type != tmd::ContentType::Shared {
                title_size += record.content_size as usize;
            }
        }
        Ok(title_size)
    }

    pub fn cert_chain(&self) -> &cert::CertificateChain {
        &self.cert_chain
    }

    pub fn crl(&self) -> &[u8] {
        &self.crl
    }

    pub fn ticket(&self) -> &ticket::Ticket {
        &self.ticket
    }

    pub fn tmd(&self) -> &tmd::TMD {
        &self.tmd
    }

    pub fn content(&self) -> &content::ContentRegion {
        &self.content
    }

    pub fn meta(&self) -> &[u8] {
        &self.meta
    }
}
