// title/testutil.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Shared fixtures for the title tests: a small signed certificate chain and a title built on it.

use std::sync::OnceLock;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use sha1::{Digest, Sha1};
use crate::title::cert::{Certificate, CertificateChain, PublicKey, SignatureType, VerifiedChain};
use crate::title::commonkeys::CommonKeys;
use crate::title::config::TitleConfig;
use crate::title::content::ContentRegion;
use crate::title::crypto;
use crate::title::ticket::Ticket;
use crate::title::tmd::{ContentRecord, ContentType, TMD};
use crate::title::Title;

pub const TITLE_ID: [u8; 8] = [0x00, 0x01, 0x00, 0x01, 0x57, 0x4b, 0x49, 0x54];
pub const TITLE_KEY: [u8; 16] = [0x3c, 0x91, 0x0e, 0x5a, 0x77, 0x12, 0xd4, 0x08, 0xb6, 0x2f, 0x49, 0xe1, 0x60, 0x9d, 0xa3, 0x1b];

pub struct Fixture {
    pub root_key: RsaPrivateKey,
    pub ca_key: RsaPrivateKey,
    pub xs_key: RsaPrivateKey,
    pub cp_key: RsaPrivateKey,
    /// A 1024-bit key, for the smallest RSA certificate type.
    pub ms_key: RsaPrivateKey,
    pub root: Certificate,
    pub ca: Certificate,
    pub xs: Certificate,
    pub cp: Certificate,
}

impl Fixture {
    fn load() -> Self {
        let root_key = RsaPrivateKey::from_pkcs8_pem(include_str!("testdata/root.pem")).unwrap();
        let ca_key = RsaPrivateKey::from_pkcs8_pem(include_str!("testdata/ca.pem")).unwrap();
        let xs_key = RsaPrivateKey::from_pkcs8_pem(include_str!("testdata/xs.pem")).unwrap();
        let cp_key = RsaPrivateKey::from_pkcs8_pem(include_str!("testdata/cp.pem")).unwrap();
        let ms_key = RsaPrivateKey::from_pkcs8_pem(include_str!("testdata/ms.pem")).unwrap();
        let root = Certificate::trusted_root("Root", &root_key.to_public_key()).unwrap();
        let ca = Certificate::new("Root", "CA00000001", 1, PublicKey::from_rsa(&ca_key.to_public_key()).unwrap(), SignatureType::Rsa4096)
            .unwrap()
            .signed(&root_key)
            .unwrap();
        let xs = Certificate::new("Root-CA00000001", "XS00000003", 3, PublicKey::from_rsa(&xs_key.to_public_key()).unwrap(), SignatureType::Rsa2048)
            .unwrap()
            .signed(&ca_key)
            .unwrap();
        let cp = Certificate::new("Root-CA00000001", "CP00000004", 4, PublicKey::from_rsa(&cp_key.to_public_key()).unwrap(), SignatureType::Rsa2048)
            .unwrap()
            .signed(&ca_key)
            .unwrap();
        Fixture { root_key, ca_key, xs_key, cp_key, ms_key, root, ca, xs, cp }
    }

    /// The chain as stored in a WAD: CA, then CP, then XS.
    pub fn chain(&self) -> CertificateChain {
        CertificateChain::from_certs(vec![self.ca.clone(), self.cp.clone(), self.xs.clone()])
    }

    pub fn verified_chain(&self) -> VerifiedChain {
        self.chain().verify(std::slice::from_ref(&self.root)).unwrap()
    }

    pub fn config(&self) -> TitleConfig {
        TitleConfig::new(CommonKeys::retail(), vec![self.root.clone()]).unwrap()
    }
}

pub fn fixture() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(Fixture::load)
}

/// Decrypted contents: two normal contents and one shared one, none of them block aligned.
pub fn sample_contents() -> Vec<Vec<u8>> {
    vec![
        (0..100u8).collect(),
        b"WADKIT".iter().copied().cycle().take(0x203).collect(),
        b"shared content blob for the test set!".to_vec(),
    ]
}

pub fn sample_records() -> Vec<ContentRecord> {
    let types = [ContentType::Normal, ContentType::Normal, ContentType::Shared];
    sample_contents().iter().zip(types).enumerate()
        .map(|(i, (content, content_type))| ContentRecord {
            content_id: i as u32,
            index: i as u16,
            content_type,
            content_size: content.len() as u64,
            content_hash: Sha1::digest(content).into(),
        })
        .collect()
}

pub fn sample_region() -> ContentRegion {
    let records = sample_records();
    let contents = sample_contents().into_iter().zip(&records)
        .map(|(mut content, record)| {
            content.resize((content.len() + 15) & !15, 0);
            crypto::encrypt_content(&content, TITLE_KEY, record.index).unwrap()
        })
        .collect();
    ContentRegion::from_contents(contents, records).unwrap()
}

/// A Ticket signed by the XS certificate.
pub fn sample_ticket(common_key_index: u8) -> Ticket {
    Ticket::builder(TITLE_ID, TITLE_KEY)
        .common_key_index(common_key_index)
        .title_version(2)
        .build(&CommonKeys::retail())
        .unwrap()
        .signed(&fixture().xs_key)
        .unwrap()
}

/// A TMD listing the sample contents, signed by the CP certificate.
pub fn sample_tmd() -> TMD {
    sample_records().into_iter()
        .fold(TMD::builder(TITLE_ID).title_version(2).region(2), |builder, record| builder.content_record(record))
        .build()
        .unwrap()
        .signed(&fixture().cp_key)
        .unwrap()
}

pub fn sample_title() -> Title {
    Title::from_parts(fixture().chain(), &[], sample_ticket(0), sample_tmd(), sample_region(), &[]).unwrap()
}
