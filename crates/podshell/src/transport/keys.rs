//! Private key loading.
//!
//! Keys are classified by their PEM block label before anything is decoded,
//! so an unsupported key type is reported as such instead of as a generic
//! parse failure.
//!
//! Traditional PEM blocks (`RSA`, `EC` and `DSA PRIVATE KEY`) may carry an
//! RFC 1421 encryption envelope. The envelope is opened here and the
//! plaintext DER is decoded by label; OpenSSH and PKCS#8 blocks are handed
//! to `russh::keys` as they are.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use russh::keys::PrivateKey;
use russh::keys::ssh_encoding::{Decode, Encode};
use russh::keys::ssh_key::Mpint;
use russh::keys::ssh_key::private::{DsaKeypair, KeypairData};

use crate::error::AuthError;

/// PEM header line prefix.
const BEGIN: &str = "-----BEGIN ";

/// PEM boundary line suffix.
const DASHES: &str = "-----";

/// RFC 1421 `Proc-Type` value marking an encrypted key.
const PROC_TYPE_ENCRYPTED: &str = "4,ENCRYPTED";

/// Bytes of the IV used as the key-derivation salt.
const SALT_LEN: usize = 8;

/// The PEM block labels this loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PemLabel {
    /// `RSA PRIVATE KEY` (PKCS#1).
    Rsa,
    /// `EC PRIVATE KEY` (SEC1).
    Ec,
    /// `DSA PRIVATE KEY`.
    Dsa,
    /// `PRIVATE KEY` (PKCS#8).
    Pkcs8,
    /// `ENCRYPTED PRIVATE KEY` (PKCS#8).
    EncryptedPkcs8,
    /// `OPENSSH PRIVATE KEY`.
    OpenSsh,
}

impl PemLabel {
    /// The label text between the dashes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rsa => "RSA PRIVATE KEY",
            Self::Ec => "EC PRIVATE KEY",
            Self::Dsa => "DSA PRIVATE KEY",
            Self::Pkcs8 => "PRIVATE KEY",
            Self::EncryptedPkcs8 => "ENCRYPTED PRIVATE KEY",
            Self::OpenSsh => "OPENSSH PRIVATE KEY",
        }
    }

    /// Whether the block is a traditional format that may carry an RFC 1421
    /// envelope.
    #[must_use]
    pub const fn is_traditional(self) -> bool {
        matches!(self, Self::Rsa | Self::Ec | Self::Dsa)
    }

    fn from_label(label: &str) -> Option<Self> {
        [
            Self::Rsa,
            Self::Ec,
            Self::Dsa,
            Self::Pkcs8,
            Self::EncryptedPkcs8,
            Self::OpenSsh,
        ]
        .into_iter()
        .find(|known| known.as_str() == label)
    }
}

/// What the PEM envelope says about a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PemInfo {
    /// The block label.
    pub label: PemLabel,
    /// Whether the envelope marks the key as encrypted.
    ///
    /// Always false for OpenSSH keys, which record encryption inside the
    /// base64 body.
    pub encrypted: bool,
}

/// A PEM block split into envelope headers and body.
#[derive(Debug)]
struct PemBlock {
    info: PemInfo,
    dek_info: Option<String>,
    body: String,
}

/// Find the first PEM block in `text` and classify it.
pub fn classify(path: &Path, text: &str) -> Result<PemInfo, AuthError> {
    parse_block(path, text).map(|block| block.info)
}

fn parse_block(path: &Path, text: &str) -> Result<PemBlock, AuthError> {
    let format_error = || AuthError::KeyFormat {
        path: path.to_path_buf(),
    };

    let mut lines = text.lines().map(str::trim);
    let label = lines
        .by_ref()
        .find_map(|line| line.strip_prefix(BEGIN)?.strip_suffix(DASHES))
        .ok_or_else(format_error)?;

    let end = format!("-----END {label}-----");
    let mut proc_type_encrypted = false;
    let mut dek_info = None;
    let mut body = String::new();
    let mut terminated = false;
    for line in lines {
        if line == end {
            terminated = true;
            break;
        }
        match line.split_once(':') {
            Some(("Proc-Type", value)) => proc_type_encrypted = value.trim() == PROC_TYPE_ENCRYPTED,
            Some(("DEK-Info", value)) => dek_info = Some(value.trim().to_string()),
            Some(_) => {}
            None => body.push_str(line),
        }
    }
    if !terminated {
        return Err(format_error());
    }

    let label = PemLabel::from_label(label).ok_or_else(|| AuthError::UnsupportedKeyType {
        path: path.to_path_buf(),
        label: label.to_string(),
    })?;

    Ok(PemBlock {
        info: PemInfo {
            label,
            encrypted: proc_type_encrypted || label == PemLabel::EncryptedPkcs8,
        },
        dek_info,
        body,
    })
}

/// Read and decode a private key file.
pub async fn load_private_key(path: &Path, passphrase: Option<&str>) -> Result<PrivateKey, AuthError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| AuthError::KeyRead {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|_| AuthError::KeyFormat {
        path: path.to_path_buf(),
    })?;
    decode_private_key(path, &text, passphrase)
}

/// Decode a PEM private key, decrypting it with `passphrase` when needed.
///
/// `path` is only used in error messages. An empty passphrase counts as none.
pub fn decode_private_key(
    path: &Path,
    text: &str,
    passphrase: Option<&str>,
) -> Result<PrivateKey, AuthError> {
    let block = parse_block(path, text)?;
    let passphrase = passphrase.filter(|p| !p.is_empty());

    tracing::debug!(
        path = %path.display(),
        label = block.info.label.as_str(),
        encrypted = block.info.encrypted,
        "Decoding private key"
    );

    if block.info.label.is_traditional() {
        decode_traditional(path, &block, passphrase)
    } else {
        decode_container(path, text, block.info, passphrase)
    }
}

/// OpenSSH and PKCS#8 blocks carry their own encryption metadata.
fn decode_container(
    path: &Path,
    text: &str,
    info: PemInfo,
    passphrase: Option<&str>,
) -> Result<PrivateKey, AuthError> {
    let mut encrypted = info.encrypted;
    if info.label == PemLabel::OpenSsh {
        match russh::keys::decode_secret_key(text, None) {
            Ok(key) => {
                if passphrase.is_some() {
                    tracing::debug!(path = %path.display(), "Key is not encrypted, ignoring passphrase");
                }
                return Ok(key);
            }
            Err(russh::keys::Error::KeyIsEncrypted) => encrypted = true,
            Err(e) => return Err(AuthError::key_parse(path, e.to_string())),
        }
    }

    if encrypted && passphrase.is_none() {
        return Err(AuthError::key_decrypt(
            path,
            "key is encrypted and no passphrase was given",
        ));
    }

    russh::keys::decode_secret_key(text, passphrase).map_err(|e| {
        if encrypted {
            AuthError::key_decrypt(path, e.to_string())
        } else {
            AuthError::key_parse(path, e.to_string())
        }
    })
}

fn decode_traditional(
    path: &Path,
    block: &PemBlock,
    passphrase: Option<&str>,
) -> Result<PrivateKey, AuthError> {
    let der = BASE64
        .decode(block.body.as_bytes())
        .map_err(|e| AuthError::key_parse(path, format!("invalid base64 body: {e}")))?;

    if !block.info.encrypted {
        if passphrase.is_some() {
            tracing::debug!(path = %path.display(), "Key is not encrypted, ignoring passphrase");
        }
        return decode_der(block.info.label, &der).map_err(|reason| AuthError::key_parse(path, reason));
    }

    let Some(passphrase) = passphrase else {
        return Err(AuthError::key_decrypt(
            path,
            "key is encrypted and no passphrase was given",
        ));
    };
    let dek_info = block
        .dek_info
        .as_deref()
        .ok_or_else(|| AuthError::key_decrypt(path, "encrypted key has no DEK-Info header"))?;
    let (cipher, iv) = parse_dek_info(dek_info).map_err(|reason| AuthError::key_decrypt(path, reason))?;

    let plain = cipher
        .decrypt(passphrase.as_bytes(), &iv, der)
        .map_err(|reason| AuthError::key_decrypt(path, reason))?;
    // A wrong passphrase occasionally yields valid padding; the DER then fails.
    decode_der(block.info.label, &plain)
        .map_err(|reason| AuthError::key_decrypt(path, format!("wrong passphrase or corrupt key: {reason}")))
}

// ============================================================================
// RFC 1421 envelope
// ============================================================================

/// Ciphers accepted in a `DEK-Info` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemCipher {
    /// `DES-EDE3-CBC`, the OpenSSL default for `-des3`.
    DesEde3Cbc,
    /// `AES-128-CBC`.
    Aes128Cbc,
    /// `AES-192-CBC`.
    Aes192Cbc,
    /// `AES-256-CBC`.
    Aes256Cbc,
}

impl PemCipher {
    /// Look up a cipher by its `DEK-Info` name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DES-EDE3-CBC" => Some(Self::DesEde3Cbc),
            "AES-128-CBC" => Some(Self::Aes128Cbc),
            "AES-192-CBC" => Some(Self::Aes192Cbc),
            "AES-256-CBC" => Some(Self::Aes256Cbc),
            _ => None,
        }
    }

    /// Key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::DesEde3Cbc | Self::Aes192Cbc => 24,
            Self::Aes256Cbc => 32,
        }
    }

    /// IV length in bytes, one cipher block.
    #[must_use]
    pub const fn iv_len(self) -> usize {
        match self {
            Self::DesEde3Cbc => 8,
            Self::Aes128Cbc | Self::Aes192Cbc | Self::Aes256Cbc => 16,
        }
    }

    /// Derive the key from `passphrase`, decrypt `data` and strip the padding.
    pub fn decrypt(self, passphrase: &[u8], iv: &[u8], mut data: Vec<u8>) -> Result<Vec<u8>, String> {
        use cbc::cipher::block_padding::Pkcs7;
        use cbc::cipher::{BlockDecryptMut, KeyIvInit};

        let salt = iv
            .get(..SALT_LEN)
            .ok_or_else(|| format!("IV is {} bytes, expected {}", iv.len(), self.iv_len()))?;
        let key = derive_key(passphrase, salt, self.key_len());
        let bad_key = |e: cbc::cipher::InvalidLength| format!("cipher setup failed: {e}");
        let unpadded = match self {
            Self::DesEde3Cbc => cbc::Decryptor::<des::TdesEde3>::new_from_slices(&key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<Pkcs7>(&mut data)
                .map(<[u8]>::len),
            Self::Aes128Cbc => cbc::Decryptor::<aes::Aes128>::new_from_slices(&key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<Pkcs7>(&mut data)
                .map(<[u8]>::len),
            Self::Aes192Cbc => cbc::Decryptor::<aes::Aes192>::new_from_slices(&key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<Pkcs7>(&mut data)
                .map(<[u8]>::len),
            Self::Aes256Cbc => cbc::Decryptor::<aes::Aes256>::new_from_slices(&key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<Pkcs7>(&mut data)
                .map(<[u8]>::len),
        };
        let len = unpadded.map_err(|_| "wrong passphrase".to_string())?;
        data.truncate(len);
        Ok(data)
    }
}

/// Split `<cipher>,<hex iv>`.
fn parse_dek_info(value: &str) -> Result<(PemCipher, Vec<u8>), String> {
    let (name, iv_hex) = value
        .split_once(',')
        .ok_or_else(|| format!("malformed DEK-Info header {value:?}"))?;
    let cipher = PemCipher::from_name(name.trim())
        .ok_or_else(|| format!("unsupported PEM cipher {}", name.trim()))?;
    let iv = hex::decode(iv_hex.trim()).map_err(|e| format!("invalid DEK-Info IV: {e}"))?;
    if iv.len() != cipher.iv_len() {
        return Err(format!(
            "DEK-Info IV is {} bytes, {} needs {}",
            iv.len(),
            name.trim(),
            cipher.iv_len()
        ));
    }
    Ok((cipher, iv))
}

/// OpenSSL's `EVP_BytesToKey` with MD5 and a single round.
fn derive_key(passphrase: &[u8], salt: &[u8], len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(len + 16);
    let mut previous: Option<[u8; 16]> = None;
    while key.len() < len {
        let mut context = md5::Context::new();
        if let Some(previous) = previous {
            context.consume(previous);
        }
        context.consume(passphrase);
        context.consume(salt);
        let digest = context.compute().0;
        key.extend_from_slice(&digest);
        previous = Some(digest);
    }
    key.truncate(len);
    key
}

// ============================================================================
// DER bodies
// ============================================================================

fn decode_der(label: PemLabel, der: &[u8]) -> Result<PrivateKey, String> {
    match label {
        PemLabel::Dsa => dsa_from_der(der),
        _ => russh::keys::decode_secret_key(&armor(label, der), None).map_err(|e| e.to_string()),
    }
}

/// Wrap DER in an unencrypted PEM block.
fn armor(label: PemLabel, der: &[u8]) -> String {
    let label = label.as_str();
    format!(
        "{BEGIN}{label}{DASHES}\n{}\n-----END {label}{DASHES}\n",
        BASE64.encode(der)
    )
}

/// Decode OpenSSL's `DSAPrivateKey ::= SEQUENCE { version, p, q, g, y, x }`.
fn dsa_from_der(der: &[u8]) -> Result<PrivateKey, String> {
    use der::asn1::UintRef;
    use der::{Reader, SliceReader};

    let mut reader = SliceReader::new(der).map_err(|e| e.to_string())?;
    let fields = reader
        .sequence(|seq| {
            let version: u8 = seq.decode()?;
            let mut next = || seq.decode::<UintRef<'_>>().map(|n| n.as_bytes().to_vec());
            Ok((version, [next()?, next()?, next()?, next()?, next()?]))
        })
        .map_err(|e| format!("malformed DSA key: {e}"))?;
    reader.finish(()).map_err(|e| format!("malformed DSA key: {e}"))?;

    let (version, fields) = fields;
    if version != 0 {
        return Err(format!("unsupported DSA key version {version}"));
    }

    let mut wire = Vec::new();
    for field in &fields {
        Mpint::from_positive_bytes(field)
            .map_err(|e| e.to_string())?
            .encode(&mut wire)
            .map_err(|e| e.to_string())?;
    }
    let keypair = DsaKeypair::decode(&mut wire.as_slice()).map_err(|e| e.to_string())?;
    PrivateKey::new(KeypairData::Dsa(keypair), "").map_err(|e| e.to_string())
}
