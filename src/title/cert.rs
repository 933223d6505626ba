// title/cert.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Implements the structures and methods required for validating the signatures of Wii titles.

use std::collections::HashSet;
use std::fmt;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{debug, trace, warn};
use crate::title::cursor::{align_up, fixed_str, ByteReader, ByteWriter, CursorError};
use crate::title::ErrorClass;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("unrecognized signature type `{tag:#010x}` at offset {offset:#x}")]
    UnknownSignatureType { offset: usize, tag: u32 },
    #[error("unrecognized public key type `{tag:#010x}` at offset {offset:#x}")]
    UnknownKeyType { offset: usize, tag: u32 },
    #[error("certificate data is malformed")]
    MalformedCertificate(#[from] CursorError),
    #[error("signatures made with `{0}` keys cannot be verified")]
    UnsupportedKeyType(KeyType),
    #[error("signature must be {expected} bytes long for its type (was {found})")]
    SignatureLength { expected: usize, found: usize },
    #[error("RSA keys must be 1024, 2048, or 4096 bits (was {0})")]
    UnsupportedKeySize(usize),
    #[error("name must not exceed 64 characters (was {0})")]
    NameTooLong(usize),
    #[error("public key is not usable: {0}")]
    InvalidPublicKey(String),
    #[error("signing failed")]
    SigningFailed(#[from] rsa::Error),
    #[error("certificate data could not be written")]
    IO(#[from] std::io::Error),
}

impl CertificateError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CertificateError::UnsupportedKeyType(_) | CertificateError::UnsupportedKeySize(_) => ErrorClass::UnsupportedAlgorithm,
            CertificateError::SigningFailed(_) => ErrorClass::CryptoMismatch,
            _ => ErrorClass::MalformedInput,
        }
    }
}

/// Errors raised while linking a certificate chain back to a trusted root.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("certificate `{certificate}` names issuer `{issuer}`, which is not part of the chain")]
    BrokenLink { certificate: String, issuer: String },
    #[error("certificate `{certificate}` is anchored to `{root}`, which is not a trusted root")]
    UntrustedRoot { certificate: String, root: String },
    #[error("signature on certificate `{certificate}` does not match the key of `{issuer}`")]
    SignatureMismatch { certificate: String, issuer: String },
    #[error("certificate `{certificate}` is signed by a `{key_type}` key, which cannot be verified")]
    UnsupportedKeyType { certificate: String, key_type: KeyType },
    #[error("certificate `{certificate}` could not be processed")]
    Certificate { certificate: String, #[source] source: CertificateError },
}

impl ChainError {
    /// Gets the full name of the certificate that broke the chain.
    pub fn certificate(&self) -> &str {
        match self {
            ChainError::BrokenLink { certificate, .. } |
            ChainError::UntrustedRoot { certificate, .. } |
            ChainError::SignatureMismatch { certificate, .. } |
            ChainError::UnsupportedKeyType { certificate, .. } |
            ChainError::Certificate { certificate, .. } => certificate,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ChainError::BrokenLink { .. } | ChainError::UntrustedRoot { .. } | ChainError::SignatureMismatch { .. } => ErrorClass::CryptoMismatch,
            ChainError::UnsupportedKeyType { .. } => ErrorClass::UnsupportedAlgorithm,
            ChainError::Certificate { source, .. } => source.class(),
        }
    }
}

/// The type of a signature, which also fixes the size of the signature block it sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureType {
    Rsa4096,
    Rsa2048,
    Ecc,
    Rsa1024,
}

impl SignatureType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0x00010000 => Some(SignatureType::Rsa4096),
            0x00010001 => Some(SignatureType::Rsa2048),
            0x00010002 => Some(SignatureType::Ecc),
            0x00010003 => Some(SignatureType::Rsa1024),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            SignatureType::Rsa4096 => 0x00010000,
            SignatureType::Rsa2048 => 0x00010001,
            SignatureType::Ecc => 0x00010002,
            SignatureType::Rsa1024 => 0x00010003,
        }
    }

    pub fn signature_len(self) -> usize {
        match self {
            SignatureType::Rsa4096 => 512,
            SignatureType::Rsa2048 => 256,
            SignatureType::Ecc => 60,
            SignatureType::Rsa1024 => 128,
        }
    }

    fn padding_len(self) -> usize {
        match self {
            SignatureType::Ecc => 64,
            _ => 60,
        }
    }

    /// Gets the size of the whole signature block: type tag, signature, and padding. Signed data
    /// always starts right after this block.
    pub fn block_len(self) -> usize {
        4 + self.signature_len() + self.padding_len()
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SignatureType::Rsa4096 => write!(f, "RSA-4096"),
            SignatureType::Rsa2048 => write!(f, "RSA-2048"),
            SignatureType::Ecc => write!(f, "ECC"),
            SignatureType::Rsa1024 => write!(f, "RSA-1024"),
        }
    }
}

/// The type of public key stored in a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Rsa4096,
    Rsa2048,
    Ecc,
    Rsa1024,
}

impl KeyType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0x00000000 => Some(KeyType::Rsa4096),
            0x00000001 => Some(KeyType::Rsa2048),
            0x00000002 => Some(KeyType::Ecc),
            0x00000003 => Some(KeyType::Rsa1024),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            KeyType::Rsa4096 => 0x00000000,
            KeyType::Rsa2048 => 0x00000001,
            KeyType::Ecc => 0x00000002,
            KeyType::Rsa1024 => 0x00000003,
        }
    }

    /// Gets the type of signature produced by a key of this type.
    pub fn signature_type(self) -> SignatureType {
        match self {
            KeyType::Rsa4096 => SignatureType::Rsa4096,
            KeyType::Rsa2048 => SignatureType::Rsa2048,
            KeyType::Ecc => SignatureType::Ecc,
            KeyType::Rsa1024 => SignatureType::Rsa1024,
        }
    }

    fn key_len(self) -> usize {
        match self {
            KeyType::Rsa4096 => 512,
            KeyType::Rsa2048 => 256,
            KeyType::Ecc => 60,
            KeyType::Rsa1024 => 128,
        }
    }

    // The modulus and exponent for RSA keys, or the point for ECC keys.
    fn material_len(self) -> usize {
        match self {
            KeyType::Ecc => self.key_len(),
            _ => self.key_len() + 4,
        }
    }

    // RSA keys are modulus + exponent + 52 bytes of padding, ECC keys are the point + 60 bytes.
    fn key_block_len(self) -> usize {
        match self {
            KeyType::Ecc => 120,
            _ => self.key_len() + 4 + 52,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.signature_type())
    }
}

/// A signature and its type, as found at the start of every signed structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    signature_type: SignatureType,
    data: Vec<u8>,
}

impl Signature {
    /// Creates a new Signature, checking that the data is the right length for its type.
    pub fn new(signature_type: SignatureType, data: Vec<u8>) -> Result<Self, CertificateError> {
        if data.len() != signature_type.signature_len() {
            return Err(CertificateError::SignatureLength { expected: signature_type.signature_len(), found: data.len() });
        }
        Ok(Signature { signature_type, data })
    }

    /// Creates a null (all zero) Signature of the specified type.
    pub fn empty(signature_type: SignatureType) -> Self {
        Signature { signature_type, data: vec![0; signature_type.signature_len()] }
    }

    /// Reads a full signature block and leaves the reader at the start of the signed data.
    pub fn read(reader: &mut ByteReader) -> Result<Self, CertificateError> {
        let offset = reader.position();
        let tag = reader.read_u32()?;
        let signature_type = SignatureType::from_tag(tag)
            .ok_or(CertificateError::UnknownSignatureType { offset, tag })?;
        let data = reader.read_vec(signature_type.signature_len())?;
        // Skip past padding at the end of the signature.
        reader.seek(offset + signature_type.block_len());
        Ok(Signature { signature_type, data })
    }

    /// Writes out a full signature block, including its zero padding.
    pub fn write(&self, writer: &mut ByteWriter) -> Result<(), std::io::Error> {
        writer.write_u32(self.signature_type.tag())?;
        writer.write_bytes(&self.data)?;
        writer.zero_fill(self.signature_type.padding_len());
        Ok(())
    }

    pub fn signature_type(&self) -> SignatureType {
        self.signature_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Gets whether every byte of the signature is zero.
    pub fn is_null(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }
}

/// The public key contained in a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa4096 { modulus: Vec<u8>, exponent: u32 },
    Rsa2048 { modulus: Vec<u8>, exponent: u32 },
    Rsa1024 { modulus: Vec<u8>, exponent: u32 },
    Ecc { point: Vec<u8> },
}

impl PublicKey {
    /// Converts an RSA public key into the form stored in certificates.
    pub fn from_rsa(key: &RsaPublicKey) -> Result<Self, CertificateError> {
        let size = key.size();
        let mut modulus = key.n().to_bytes_be();
        // Left-pad the modulus out to the full key size.
        if modulus.len() < size {
            let mut padded = vec![0u8; size - modulus.len()];
            padded.append(&mut modulus);
            modulus = padded;
        }
        let exponent_bytes = key.e().to_bytes_be();
        if exponent_bytes.len() > 4 {
            return Err(CertificateError::InvalidPublicKey("exponent does not fit in 32 bits".to_owned()));
        }
        let exponent = exponent_bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
        match size {
            512 => Ok(PublicKey::Rsa4096 { modulus, exponent }),
            256 => Ok(PublicKey::Rsa2048 { modulus, exponent }),
            128 => Ok(PublicKey::Rsa1024 { modulus, exponent }),
            _ => Err(CertificateError::UnsupportedKeySize(size * 8)),
        }
    }

    // Reads only the key material. The padding after it belongs to the certificate record.
    fn read(key_type: KeyType, reader: &mut ByteReader) -> Result<Self, CertificateError> {
        let modulus = reader.read_vec(key_type.key_len())?;
        Ok(match key_type {
            KeyType::Ecc => PublicKey::Ecc { point: modulus },
            KeyType::Rsa4096 => PublicKey::Rsa4096 { modulus, exponent: reader.read_u32()? },
            KeyType::Rsa2048 => PublicKey::Rsa2048 { modulus, exponent: reader.read_u32()? },
            KeyType::Rsa1024 => PublicKey::Rsa1024 { modulus, exponent: reader.read_u32()? },
        })
    }

    fn write(&self, writer: &mut ByteWriter) -> Result<(), std::io::Error> {
        match self {
            PublicKey::Ecc { point } => {
                writer.write_bytes(point)?;
            },
            PublicKey::Rsa4096 { modulus, exponent } |
            PublicKey::Rsa2048 { modulus, exponent } |
            PublicKey::Rsa1024 { modulus, exponent } => {
                writer.write_bytes(modulus)?;
                writer.write_u32(*exponent)?;
            },
        }
        Ok(())
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            PublicKey::Rsa4096 { .. } => KeyType::Rsa4096,
            PublicKey::Rsa2048 { .. } => KeyType::Rsa2048,
            PublicKey::Rsa1024 { .. } => KeyType::Rsa1024,
            PublicKey::Ecc { .. } => KeyType::Ecc,
        }
    }

    /// Gets the RSA key described by this public key, if it is one.
    pub fn to_rsa(&self) -> Result<RsaPublicKey, CertificateError> {
        match self {
            PublicKey::Ecc { .. } => Err(CertificateError::UnsupportedKeyType(KeyType::Ecc)),
            PublicKey::Rsa4096 { modulus, exponent } |
            PublicKey::Rsa2048 { modulus, exponent } |
            PublicKey::Rsa1024 { modulus, exponent } => {
                RsaPublicKey::new(BigUint::from_bytes_be(modulus), BigUint::from(*exponent))
                    .map_err(|e| CertificateError::InvalidPublicKey(e.to_string()))
            },
        }
    }
}

/// A structure that represents the components of a Wii signing certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    signature: Signature,
    issuer: [u8; 64],
    subject: [u8; 64],
    key_id: u32,
    public_key: PublicKey,
    // Everything after the key material up to the end of the record, kept as read. It is covered
    // by the signature.
    padding: Vec<u8>,
}

// Size of a whole certificate record, which is padded out to a multiple of 64.
fn record_len_for(signature_type: SignatureType, key_type: KeyType) -> usize {
    align_up(signature_type.block_len() + 0x88 + key_type.key_block_len(), 64)
}

// Number of bytes between the end of the key material and the end of the record.
fn padding_len_for(signature_type: SignatureType, key_type: KeyType) -> usize {
    record_len_for(signature_type, key_type) - signature_type.block_len() - 0x88 - key_type.material_len()
}

fn name_field(name: &str) -> Result<[u8; 64], CertificateError> {
    if name.len() > 64 {
        return Err(CertificateError::NameTooLong(name.len()));
    }
    let mut field = [0u8; 64];
    field[..name.len()].copy_from_slice(name.as_bytes());
    Ok(field)
}

/// Parses one certificate starting at the specified offset, returning it alongside the number of
/// bytes the record took up (including its alignment padding).
pub fn parse_certificate(data: &[u8], offset: usize) -> Result<(Certificate, usize), CertificateError> {
    let mut reader = ByteReader::at(data, offset);
    let signature = Signature::read(&mut reader)?;
    let issuer = reader.read_array::<64>()?;
    let key_offset = reader.position();
    let key_tag = reader.read_u32()?;
    let key_type = KeyType::from_tag(key_tag)
        .ok_or(CertificateError::UnknownKeyType { offset: key_offset, tag: key_tag })?;
    let subject = reader.read_array::<64>()?;
    let key_id = reader.read_u32()?;
    let public_key = PublicKey::read(key_type, &mut reader)?;
    let padding = reader.read_vec(padding_len_for(signature.signature_type(), key_type))?;
    let consumed = reader.position() - offset;
    let cert = Certificate { signature, issuer, subject, key_id, public_key, padding };
    trace!(offset, consumed, name = %cert.full_name(), "parsed certificate");
    Ok((cert, consumed))
}

impl Certificate {
    /// Creates a new, unsigned Certificate. Use [`Certificate::signed`] to sign it.
    pub fn new(issuer: &str, subject: &str, key_id: u32, public_key: PublicKey, signature_type: SignatureType) -> Result<Self, CertificateError> {
        let padding = vec![0; padding_len_for(signature_type, public_key.key_type())];
        Ok(Certificate {
            signature: Signature::empty(signature_type),
            issuer: name_field(issuer)?,
            subject: name_field(subject)?,
            key_id,
            public_key,
            padding,
        })
    }

    /// Creates a trust anchor from an RSA public key. Anchors have no issuer, so their full name is
    /// their subject name (normally "Root").
    pub fn trusted_root(name: &str, key: &RsaPublicKey) -> Result<Self, CertificateError> {
        let public_key = PublicKey::from_rsa(key)?;
        let signature_type = public_key.key_type().signature_type();
        Certificate::new("", name, 0, public_key, signature_type)
    }

    /// Creates a trust anchor from a PEM-encoded (SPKI) RSA public key.
    pub fn trusted_root_from_pem(name: &str, pem: &str) -> Result<Self, CertificateError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| CertificateError::InvalidPublicKey(e.to_string()))?;
        Certificate::trusted_root(name, &key)
    }

    /// Creates a new Certificate instance from the binary data of a certificate file.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CertificateError> {
        let (cert, _) = parse_certificate(data, 0)?;
        Ok(cert)
    }

    /// Dumps the data in a Certificate instance back into binary data that can be written to a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = ByteWriter::with_capacity(self.record_len());
        self.signature.write(&mut buf)?;
        self.write_body(&mut buf)?;
        Ok(buf.into_inner())
    }

    fn write_body(&self, buf: &mut ByteWriter) -> Result<(), std::io::Error> {
        buf.write_bytes(&self.issuer)?;
        buf.write_u32(self.public_key.key_type().tag())?;
        buf.write_bytes(&self.subject)?;
        buf.write_u32(self.key_id)?;
        self.public_key.write(buf)?;
        buf.write_bytes(&self.padding)
    }

    /// Gets the bytes covered by the certificate's signature, including the padding after the key.
    pub fn signed_body(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = ByteWriter::with_capacity(self.record_len() - self.signature.signature_type().block_len());
        self.write_body(&mut buf)?;
        Ok(buf.into_inner())
    }

    /// Gets the size of the certificate once written out.
    pub fn record_len(&self) -> usize {
        record_len_for(self.signature.signature_type(), self.public_key.key_type())
    }

    /// Signs the certificate with the private key of its issuer, returning the signed copy.
    pub fn signed(self, key: &RsaPrivateKey) -> Result<Self, CertificateError> {
        let signature = sign_blob(&self.signed_body()?, self.signature.signature_type(), key)?;
        Ok(Certificate { signature, ..self })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Gets the name of the certificate used to sign a certificate as a string.
    pub fn issuer(&self) -> String {
        fixed_str(&self.issuer)
    }

    /// Gets the name of the certificate itself as a string.
    pub fn subject(&self) -> String {
        fixed_str(&self.subject)
    }

    /// Gets the name other structures use to refer to this certificate as their issuer, such as
    /// "Root-CA00000001" for the CA certificate.
    pub fn full_name(&self) -> String {
        let issuer = self.issuer();
        if issuer.is_empty() {
            self.subject()
        } else {
            format!("{}-{}", issuer, self.subject())
        }
    }

    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    pub fn key_type(&self) -> KeyType {
        self.public_key.key_type()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

/// Computes the SHA-1 hash of a signed blob and checks it against an RSA signature using the key
/// of the issuing certificate. Any mismatch returns false. Issuers holding ECC keys return an
/// error, since those signatures cannot be checked.
pub fn verify_signature(signed_blob: &[u8], signature: &Signature, issuer: &Certificate) -> Result<bool, CertificateError> {
    let key_type = issuer.key_type();
    if key_type == KeyType::Ecc {
        return Err(CertificateError::UnsupportedKeyType(key_type));
    }
    if signature.signature_type() != key_type.signature_type() {
        debug!(signature = %signature.signature_type(), key = %key_type, "signature type does not match issuer key");
        return Ok(false);
    }
    let key = match issuer.public_key().to_rsa() {
        Ok(key) => key,
        Err(e) => {
            warn!(issuer = %issuer.full_name(), error = %e, "issuer carries an unusable public key");
            return Ok(false);
        }
    };
    let hash = Sha1::digest(signed_blob);
    match key.verify(Pkcs1v15Sign::new::<Sha1>(), &hash, signature.data()) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Signs a blob over its SHA-1 hash. The private key must match the size of the signature type.
pub fn sign_blob(signed_blob: &[u8], signature_type: SignatureType, key: &RsaPrivateKey) -> Result<Signature, CertificateError> {
    if signature_type == SignatureType::Ecc {
        return Err(CertificateError::UnsupportedKeyType(KeyType::Ecc));
    }
    if key.size() != signature_type.signature_len() {
        return Err(CertificateError::SignatureLength { expected: signature_type.signature_len(), found: key.size() });
    }
    let hash = Sha1::digest(signed_blob);
    let data = key.sign(Pkcs1v15Sign::new::<Sha1>(), &hash)?;
    Signature::new(signature_type, data)
}

/// A structure that represents an ordered Wii certificate chain, as stored in a WAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    certs: Vec<Certificate>,
}

impl CertificateChain {
    /// Creates a new CertificateChain instance from the binary data of an entire certificate chain.
    pub fn from_bytes(data: &[u8]) -> Result<CertificateChain, CertificateError> {
        let mut certs = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            // Trailing zero padding isn't another certificate.
            if data[offset..].iter().all(|&b| b == 0) {
                break;
            }
            let (cert, consumed) = parse_certificate(data, offset)?;
            certs.push(cert);
            offset += consumed;
        }
        debug!(count = certs.len(), "parsed certificate chain");
        Ok(CertificateChain { certs })
    }

    pub fn from_certs(certs: Vec<Certificate>) -> Self {
        CertificateChain { certs }
    }

    /// Dumps the entire CertificateChain back into binary data that can be written to a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = ByteWriter::new();
        for cert in &self.certs {
            buf.write_bytes(&cert.to_bytes()?)?;
        }
        Ok(buf.into_inner())
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certs
    }

    /// Finds a certificate by its full name.
    pub fn find(&self, full_name: &str) -> Option<&Certificate> {
        self.certs.iter().find(|cert| cert.full_name() == full_name)
    }

    fn find_by_subject_prefix(&self, prefix: &str) -> Option<&Certificate> {
        self.certs.iter().find(|cert| cert.subject().starts_with(prefix))
    }

    /// Gets the CA certificate, which signs the TMD and Ticket certificates.
    pub fn ca_cert(&self) -> Option<&Certificate> {
        self.find_by_subject_prefix("CA")
    }

    /// Gets the certificate used to sign TMDs.
    pub fn tmd_cert(&self) -> Option<&Certificate> {
        self.find_by_subject_prefix("CP")
    }

    /// Gets the certificate used to sign Tickets.
    pub fn ticket_cert(&self) -> Option<&Certificate> {
        self.find_by_subject_prefix("XS")
    }

    /// Verifies every certificate in the chain back to one of the trusted roots.
    pub fn verify(&self, trusted_roots: &[Certificate]) -> Result<VerifiedChain, ChainError> {
        build_chain(&self.certs, trusted_roots)
    }
}

/// A certificate chain whose every link has been checked back to a trusted root.
#[derive(Debug, Clone)]
pub struct VerifiedChain {
    certs: Vec<Certificate>,
    roots: Vec<Certificate>,
}

impl VerifiedChain {
    pub fn certificates(&self) -> &[Certificate] {
        &self.certs
    }

    /// Finds the certificate with the full name used as an issuer by a signed structure.
    pub fn signer(&self, issuer: &str) -> Option<&Certificate> {
        self.certs.iter()
            .chain(self.roots.iter())
            .find(|cert| cert.full_name() == issuer)
    }

    /// Verifies a signed blob using the certificate named as its issuer. A blob naming an issuer
    /// that isn't part of the chain fails verification.
    pub fn verify_signed(&self, issuer: &str, signed_blob: &[u8], signature: &Signature) -> Result<bool, CertificateError> {
        match self.signer(issuer) {
            Some(cert) => verify_signature(signed_blob, signature, cert),
            None => {
                debug!(issuer, "issuer is not part of the verified chain");
                Ok(false)
            }
        }
    }
}

/// Links every certificate to its issuer, checking each signature, until a trusted root is
/// reached. Trusted roots are matched by full name and never verified themselves.
pub fn build_chain(certificates: &[Certificate], trusted_roots: &[Certificate]) -> Result<VerifiedChain, ChainError> {
    let mut verified = HashSet::new();
    for cert in certificates {
        verify_link(cert, certificates, trusted_roots, &mut verified)?;
    }
    debug!(count = certificates.len(), "certificate chain verified");
    Ok(VerifiedChain { certs: certificates.to_vec(), roots: trusted_roots.to_vec() })
}

// A certificate's issuer is always strictly shorter than its own full name, so this recursion
// can't loop.
fn verify_link(cert: &Certificate, certificates: &[Certificate], trusted_roots: &[Certificate], verified: &mut HashSet<String>) -> Result<(), ChainError> {
    let name = cert.full_name();
    if verified.contains(&name) {
        return Ok(());
    }
    let issuer = cert.issuer();
    if issuer.is_empty() {
        // A root carried in the chain is only accepted if it is one of the trusted roots.
        if trusted_roots.iter().any(|root| root.full_name() == name && root.public_key() == cert.public_key()) {
            verified.insert(name);
            return Ok(());
        }
        return Err(ChainError::UntrustedRoot { certificate: name.clone(), root: name });
    }
    let signer = if let Some(root) = trusted_roots.iter().find(|root| root.full_name() == issuer) {
        root
    } else if let Some(parent) = certificates.iter().find(|parent| parent.full_name() == issuer) {
        verify_link(parent, certificates, trusted_roots, verified)?;
        parent
    } else if !issuer.contains('-') {
        return Err(ChainError::UntrustedRoot { certificate: name, root: issuer });
    } else {
        return Err(ChainError::BrokenLink { certificate: name, issuer });
    };
    let body = cert.signed_body()
        .map_err(|e| ChainError::Certificate { certificate: name.clone(), source: CertificateError::IO(e) })?;
    match verify_signature(&body, cert.signature(), signer) {
        Ok(true) => {
            trace!(certificate = %name, issuer = %issuer, "certificate link verified");
            verified.insert(name);
            Ok(())
        },
        Ok(false) => Err(ChainError::SignatureMismatch { certificate: name, issuer }),
        Err(CertificateError::UnsupportedKeyType(key_type)) => Err(ChainError::UnsupportedKeyType { certificate: name, key_type }),
        Err(source) => Err(ChainError::Certificate { certificate: name, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::title::testutil;

    #[test]
    fn test_certificate_sizes() {
        let fixture = testutil::fixture();
        // CA certificates are signed by the 4096-bit root but carry a 2048-bit key.
        assert_eq!(fixture.ca.record_len(), 0x400);
        assert_eq!(fixture.ca.to_bytes().unwrap().len(), 0x400);
        assert_eq!(fixture.xs.record_len(), 0x300);
        assert_eq!(fixture.xs.to_bytes().unwrap().len(), 0x300);
    }

    #[test]
    fn test_parse_certificate_round_trip() {
        let fixture = testutil::fixture();
        let bytes = fixture.xs.to_bytes().unwrap();
        let (cert, consumed) = parse_certificate(&bytes, 0).unwrap();
        assert_eq!(consumed, 0x300);
        assert_eq!(cert, fixture.xs);
        assert_eq!(cert.issuer(), "Root-CA00000001");
        assert_eq!(cert.subject(), "XS00000003");
        assert_eq!(cert.full_name(), "Root-CA00000001-XS00000003");
        assert_eq!(cert.key_type(), KeyType::Rsa2048);
    }

    #[test]
    fn test_parse_certificate_at_offset() {
        let fixture = testutil::fixture();
        let mut bytes = vec![0xFFu8; 0x40];
        bytes.extend(fixture.cp.to_bytes().unwrap());
        let (cert, consumed) = parse_certificate(&bytes, 0x40).unwrap();
        assert_eq!(consumed, 0x300);
        assert_eq!(cert.subject(), "CP00000004");
    }

    #[test]
    fn test_parse_ecc_certificate() {
        let cert = Certificate::new("Root-CA00000001-MS00000002", "NG01234567", 7,
                                    PublicKey::Ecc { point: vec![0x5A; 60] }, SignatureType::Ecc).unwrap();
        let bytes = cert.to_bytes().unwrap();
        assert_eq!(bytes.len(), 0x180);
        let (parsed, consumed) = parse_certificate(&bytes, 0).unwrap();
        assert_eq!(consumed, 0x180);
        assert_eq!(parsed, cert);
        assert_eq!(parsed.key_id(), 7);
    }

    #[test]
    fn test_parse_unknown_signature_type() {
        let mut bytes = testutil::fixture().xs.to_bytes().unwrap();
        bytes[..4].copy_from_slice(&0x00010009u32.to_be_bytes());
        assert!(matches!(parse_certificate(&bytes, 0), Err(CertificateError::UnknownSignatureType { offset: 0, tag: 0x00010009 })));
    }

    #[test]
    fn test_parse_unknown_key_type() {
        let mut bytes = testutil::fixture().xs.to_bytes().unwrap();
        bytes[0x180..0x184].copy_from_slice(&7u32.to_be_bytes());
        assert!(matches!(parse_certificate(&bytes, 0), Err(CertificateError::UnknownKeyType { offset: 0x180, tag: 7 })));
    }

    #[test]
    fn test_parse_truncated_certificate() {
        let bytes = testutil::fixture().xs.to_bytes().unwrap();
        let result = parse_certificate(&bytes[..0x2F0], 0);
        assert!(matches!(result, Err(CertificateError::MalformedCertificate(CursorError::OutOfBounds { .. }))));
        assert!(matches!(parse_certificate(&bytes[..2], 0), Err(CertificateError::MalformedCertificate(_))));
    }

    #[test]
    fn test_chain_round_trip() {
        let chain = testutil::fixture().chain();
        let bytes = chain.to_bytes().unwrap();
        assert_eq!(bytes.len(), 0x400 + 0x300 + 0x300);
        let parsed = CertificateChain::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, chain);
        assert_eq!(parsed.ca_cert().unwrap().subject(), "CA00000001");
        assert_eq!(parsed.tmd_cert().unwrap().subject(), "CP00000004");
        assert_eq!(parsed.ticket_cert().unwrap().subject(), "XS00000003");
    }

    #[test]
    fn test_build_chain() {
        let fixture = testutil::fixture();
        let chain = build_chain(&[fixture.ca.clone(), fixture.xs.clone()], &[fixture.root.clone()]).unwrap();
        assert_eq!(chain.certificates().len(), 2);
        assert!(chain.signer("Root-CA00000001-XS00000003").is_some());
        assert!(chain.signer("Root").is_some());
        assert!(chain.signer("Root-CA00000001-CP00000004").is_none());
    }

    #[test]
    fn test_build_chain_order_independent() {
        let fixture = testutil::fixture();
        let certs = [fixture.cp.clone(), fixture.xs.clone(), fixture.ca.clone()];
        assert!(build_chain(&certs, &[fixture.root.clone()]).is_ok());
    }

    #[test]
    fn test_build_chain_broken_link() {
        let fixture = testutil::fixture();
        let result = build_chain(&[fixture.xs.clone()], &[fixture.root.clone()]);
        match result {
            Err(ChainError::BrokenLink { certificate, issuer }) => {
                assert_eq!(certificate, "Root-CA00000001-XS00000003");
                assert_eq!(issuer, "Root-CA00000001");
            },
            other => panic!("expected broken link, got {:?}", other),
        }
    }

    #[test]
    fn test_build_chain_untrusted_root() {
        let fixture = testutil::fixture();
        let result = build_chain(&[fixture.ca.clone(), fixture.xs.clone()], &[]);
        assert!(matches!(result, Err(ChainError::UntrustedRoot { ref root, .. }) if root == "Root"));
        // A root anchor that isn't trusted doesn't become trusted by being in the chain.
        let result = build_chain(&[fixture.root.clone(), fixture.ca.clone()], &[]);
        assert!(matches!(result, Err(ChainError::UntrustedRoot { .. })));
    }

    #[test]
    fn test_build_chain_wrong_root_key() {
        let fixture = testutil::fixture();
        // A root with the right name but a different key can't verify the CA certificate.
        let impostor = Certificate::trusted_root("Root", &fixture.cp_key.to_public_key()).unwrap();
        let result = build_chain(&[fixture.ca.clone()], &[impostor]);
        assert!(matches!(result, Err(ChainError::SignatureMismatch { ref certificate, .. }) if certificate == "Root-CA00000001"));
    }

    #[test]
    fn test_tampered_certificate_breaks_chain() {
        let fixture = testutil::fixture();
        let mut bytes = fixture.ca.to_bytes().unwrap();
        // Flip a bit in the CA's public key.
        bytes[0x300] ^= 0x01;
        let tampered_ca = Certificate::from_bytes(&bytes).unwrap();
        let result = build_chain(&[tampered_ca, fixture.xs.clone()], &[fixture.root.clone()]);
        let err = result.unwrap_err();
        assert!(matches!(err, ChainError::SignatureMismatch { .. }));
        assert_eq!(err.certificate(), "Root-CA00000001");
    }

    #[test]
    fn test_tampered_padding_breaks_chain() {
        let fixture = testutil::fixture();
        let mut bytes = fixture.xs.to_bytes().unwrap();
        // The last byte of the record is alignment padding after the key block.
        bytes[0x2FF] ^= 0x01;
        let tampered_xs = Certificate::from_bytes(&bytes).unwrap();
        // Padding is kept as read, so the record still writes back out unchanged.
        assert_eq!(tampered_xs.to_bytes().unwrap(), bytes);
        assert_ne!(tampered_xs, fixture.xs);
        let result = build_chain(&[fixture.ca.clone(), tampered_xs], &[fixture.root.clone()]);
        assert!(matches!(result, Err(ChainError::SignatureMismatch { ref certificate, .. }) if certificate == "Root-CA00000001-XS00000003"));
    }

    #[test]
    fn test_tampered_key_block_padding_breaks_chain() {
        let fixture = testutil::fixture();
        let mut bytes = fixture.cp.to_bytes().unwrap();
        // Inside the 52 bytes following the exponent, which ends at 0x2CC.
        bytes[0x2D0] ^= 0x80;
        let tampered_cp = Certificate::from_bytes(&bytes).unwrap();
        let result = build_chain(&[fixture.ca.clone(), tampered_cp], &[fixture.root.clone()]);
        assert!(matches!(result, Err(ChainError::SignatureMismatch { .. })));
    }

    #[test]
    fn test_rsa1024_key_certificate() {
        let fixture = testutil::fixture();
        let ms = Certificate::new("Root-CA00000001", "MS00000005", 5, PublicKey::from_rsa(&fixture.ms_key.to_public_key()).unwrap(), SignatureType::Rsa2048)
            .unwrap()
            .signed(&fixture.ca_key)
            .unwrap();
        assert_eq!(ms.key_type(), KeyType::Rsa1024);
        let bytes = ms.to_bytes().unwrap();
        assert_eq!(bytes.len(), 0x280);
        assert_eq!(&bytes[0x180..0x184], &3u32.to_be_bytes());
        let (parsed, consumed) = parse_certificate(&bytes, 0).unwrap();
        assert_eq!(consumed, 0x280);
        assert_eq!(parsed, ms);
        assert!(matches!(parsed.public_key(), PublicKey::Rsa1024 { modulus, exponent: 65537 } if modulus.len() == 128));
        assert!(build_chain(&[fixture.ca.clone(), parsed], &[fixture.root.clone()]).is_ok());
    }

    #[test]
    fn test_rsa1024_signed_certificate() {
        let fixture = testutil::fixture();
        let ms = Certificate::new("Root-CA00000001", "MS00000005", 5, PublicKey::from_rsa(&fixture.ms_key.to_public_key()).unwrap(), SignatureType::Rsa2048)
            .unwrap()
            .signed(&fixture.ca_key)
            .unwrap();
        // A leaf signed by the 1024-bit key carries a 0x00010003 signature block of 0xC0 bytes.
        let leaf = Certificate::new("Root-CA00000001-MS00000005", "NG00000006", 6, PublicKey::from_rsa(&fixture.xs_key.to_public_key()).unwrap(), SignatureType::Rsa1024)
            .unwrap()
            .signed(&fixture.ms_key)
            .unwrap();
        assert_eq!(SignatureType::Rsa1024.block_len(), 0xC0);
        let bytes = leaf.to_bytes().unwrap();
        assert_eq!(&bytes[..4], &0x00010003u32.to_be_bytes());
        assert_eq!(bytes.len(), 0x280);
        let (parsed, consumed) = parse_certificate(&bytes, 0).unwrap();
        assert_eq!(consumed, 0x280);
        assert_eq!(parsed.signature().signature_type(), SignatureType::Rsa1024);
        assert_eq!(parsed.signature().data().len(), 128);
        assert!(build_chain(&[fixture.ca.clone(), ms.clone(), parsed.clone()], &[fixture.root.clone()]).is_ok());
        // Signed blobs work the same way.
        let signature = sign_blob(b"data", SignatureType::Rsa1024, &fixture.ms_key).unwrap();
        assert!(verify_signature(b"data", &signature, &ms).unwrap());
        assert!(!verify_signature(b"dat4", &signature, &ms).unwrap());
        // Without the MS certificate the leaf has nothing to link to.
        assert!(matches!(build_chain(&[fixture.ca.clone(), parsed], &[fixture.root.clone()]), Err(ChainError::BrokenLink { .. })));
    }

    #[test]
    fn test_rsa4096_key_certificate() {
        let fixture = testutil::fixture();
        let ca = Certificate::new("Root", "CA00000002", 2, PublicKey::from_rsa(&fixture.root_key.to_public_key()).unwrap(), SignatureType::Rsa4096)
            .unwrap()
            .signed(&fixture.root_key)
            .unwrap();
        let bytes = ca.to_bytes().unwrap();
        assert_eq!(bytes.len(), 0x500);
        assert_eq!(&bytes[0x280..0x284], &0u32.to_be_bytes());
        let (parsed, consumed) = parse_certificate(&bytes, 0).unwrap();
        assert_eq!(consumed, 0x500);
        assert_eq!(parsed.key_type(), KeyType::Rsa4096);
        assert!(matches!(parsed.public_key(), PublicKey::Rsa4096 { modulus, .. } if modulus.len() == 512));
        assert!(build_chain(std::slice::from_ref(&parsed), &[fixture.root.clone()]).is_ok());
        let signature = sign_blob(b"data", SignatureType::Rsa4096, &fixture.root_key).unwrap();
        assert!(verify_signature(b"data", &signature, &parsed).unwrap());
    }

    #[test]
    fn test_ecc_signature_block_size() {
        let fixture = testutil::fixture();
        let cert = Certificate::new("Root-CA00000001-MS00000002", "NG00000007", 7,
                                    PublicKey::from_rsa(&fixture.xs_key.to_public_key()).unwrap(), SignatureType::Ecc).unwrap();
        assert_eq!(SignatureType::Ecc.block_len(), 0x80);
        let mut bytes = cert.to_bytes().unwrap();
        assert_eq!(bytes.len(), 0x240);
        assert_eq!(&bytes[..4], &0x00010002u32.to_be_bytes());
        // The key type follows the 0x80 byte signature block and the issuer name.
        assert_eq!(&bytes[0xC0..0xC4], &1u32.to_be_bytes());
        // Parsing from the middle of a larger buffer consumes only this record.
        bytes.extend(fixture.xs.to_bytes().unwrap());
        let (parsed, consumed) = parse_certificate(&bytes, 0).unwrap();
        assert_eq!(consumed, 0x240);
        assert_eq!(parsed, cert);
        let (next, _) = parse_certificate(&bytes, consumed).unwrap();
        assert_eq!(next, fixture.xs);
    }

    #[test]
    fn test_verify_signature() {
        let fixture = testutil::fixture();
        let blob = b"signed data";
        let signature = sign_blob(blob, SignatureType::Rsa2048, &fixture.xs_key).unwrap();
        assert!(verify_signature(blob, &signature, &fixture.xs).unwrap());
        assert!(!verify_signature(b"signed dat4", &signature, &fixture.xs).unwrap());
        // Wrong issuer key.
        assert!(!verify_signature(blob, &signature, &fixture.cp).unwrap());
        // Signature type not matching the issuer's key type.
        assert!(!verify_signature(blob, &Signature::empty(SignatureType::Rsa4096), &fixture.xs).unwrap());
        // Repeated checks give the same answer.
        assert_eq!(verify_signature(blob, &signature, &fixture.xs).unwrap(), verify_signature(blob, &signature, &fixture.xs).unwrap());
    }

    #[test]
    fn test_verify_signature_ecc_issuer() {
        let issuer = Certificate::new("Root-CA00000001", "MS00000002", 0,
                                      PublicKey::Ecc { point: vec![0; 60] }, SignatureType::Rsa2048).unwrap();
        let result = verify_signature(b"data", &Signature::empty(SignatureType::Ecc), &issuer);
        assert!(matches!(result, Err(CertificateError::UnsupportedKeyType(KeyType::Ecc))));
    }

    #[test]
    fn test_sign_blob_wrong_key_size() {
        let fixture = testutil::fixture();
        let result = sign_blob(b"data", SignatureType::Rsa4096, &fixture.xs_key);
        assert!(matches!(result, Err(CertificateError::SignatureLength { expected: 512, found: 256 })));
    }

    #[test]
    fn test_trusted_root_from_pem() {
        let root = Certificate::trusted_root_from_pem("Root", include_str!("testdata/root-pub.pem")).unwrap();
        assert_eq!(root, testutil::fixture().root);
        assert_eq!(root.full_name(), "Root");
        assert!(Certificate::trusted_root_from_pem("Root", "not a key").is_err());
    }

    #[test]
    fn test_name_too_long() {
        let name = "X".repeat(65);
        let result = Certificate::new(&name, "CA00000001", 0, PublicKey::Ecc { point: vec![0; 60] }, SignatureType::Ecc);
        assert!(matches!(result, Err(CertificateError::NameTooLong(65))));
    }
}
