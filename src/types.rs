use std::fmt;

use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

// ============================================================================
// Record Content Types
// ============================================================================

/// Record content type (RFC 8446 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// ChangeCipherSpec, only seen for middlebox compatibility.
    ChangeCipherSpec,
    /// Alert.
    Alert,
    /// Handshake.
    Handshake,
    /// Application data, also the outer type of every protected record.
    ApplicationData,
    /// Unknown or unsupported content type.
    Unknown(u8),
}

impl ContentType {
    /// Convert a wire format u8 value to a `ContentType`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    /// Convert this `ContentType` to its wire format u8 value.
    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }
}

// ============================================================================
// Handshake Message Types
// ============================================================================

/// Handshake message type (RFC 8446 Section 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeType {
    ClientHello,
    ServerHello,
    NewSessionTicket,
    EndOfEarlyData,
    EncryptedExtensions,
    Certificate,
    CertificateRequest,
    CertificateVerify,
    Finished,
    KeyUpdate,
    /// Synthetic type used when a HelloRetryRequest rewrites the transcript.
    MessageHash,
    Unknown(u8),
}

impl HandshakeType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            4 => HandshakeType::NewSessionTicket,
            5 => HandshakeType::EndOfEarlyData,
            8 => HandshakeType::EncryptedExtensions,
            11 => HandshakeType::Certificate,
            13 => HandshakeType::CertificateRequest,
            15 => HandshakeType::CertificateVerify,
            20 => HandshakeType::Finished,
            24 => HandshakeType::KeyUpdate,
            254 => HandshakeType::MessageHash,
            _ => HandshakeType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            HandshakeType::ClientHello => 1,
            HandshakeType::ServerHello => 2,
            HandshakeType::NewSessionTicket => 4,
            HandshakeType::EndOfEarlyData => 5,
            HandshakeType::EncryptedExtensions => 8,
            HandshakeType::Certificate => 11,
            HandshakeType::CertificateRequest => 13,
            HandshakeType::CertificateVerify => 15,
            HandshakeType::Finished => 20,
            HandshakeType::KeyUpdate => 24,
            HandshakeType::MessageHash => 254,
            HandshakeType::Unknown(value) => *value,
        }
    }
}

// ============================================================================
// Protocol Version
// ============================================================================

/// Protocol version as carried in legacy_version and supported_versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[allow(non_camel_case_types)]
pub enum ProtocolVersion {
    TLS1_2,
    TLS1_3,
    Unknown(u16),
}

impl ProtocolVersion {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0303 => ProtocolVersion::TLS1_2,
            0x0304 => ProtocolVersion::TLS1_3,
            _ => ProtocolVersion::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::TLS1_2 => 0x0303,
            ProtocolVersion::TLS1_3 => 0x0304,
            ProtocolVersion::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, value) = be_u16(input)?;
        Ok((input, ProtocolVersion::from_u16(value)))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.as_u16())
    }
}

// ============================================================================
// Named Groups
// ============================================================================

/// Key exchange groups (RFC 8446 Section 4.2.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedGroup {
    /// secp256r1 / P-256.
    Secp256r1,
    /// secp384r1 / P-384.
    Secp384r1,
    /// secp521r1 / P-521 (recognized, not implemented by the default provider).
    Secp521r1,
    /// X25519.
    X25519,
    /// X448 (recognized, not implemented by the default provider).
    X448,
    /// Unknown or unsupported group.
    Unknown(u16),
}

impl NamedGroup {
    /// Convert a wire format u16 value to a `NamedGroup`.
    pub fn from_u16(value: u16) -> Self {
        match value {
            23 => NamedGroup::Secp256r1,
            24 => NamedGroup::Secp384r1,
            25 => NamedGroup::Secp521r1,
            29 => NamedGroup::X25519,
            30 => NamedGroup::X448,
            _ => NamedGroup::Unknown(value),
        }
    }

    /// Convert this `NamedGroup` to its wire format u16 value.
    pub fn as_u16(&self) -> u16 {
        match self {
            NamedGroup::Secp256r1 => 23,
            NamedGroup::Secp384r1 => 24,
            NamedGroup::Secp521r1 => 25,
            NamedGroup::X25519 => 29,
            NamedGroup::X448 => 30,
            NamedGroup::Unknown(value) => *value,
        }
    }

    /// Parse a `NamedGroup` from wire format.
    pub fn parse(input: &[u8]) -> IResult<&[u8], NamedGroup> {
        let (input, value) = be_u16(input)?;
        Ok((input, NamedGroup::from_u16(value)))
    }

    /// Length of the encoded public key share for this group.
    pub fn public_key_len(&self) -> Option<usize> {
        match self {
            NamedGroup::Secp256r1 => Some(65),
            NamedGroup::Secp384r1 => Some(97),
            NamedGroup::Secp521r1 => Some(133),
            NamedGroup::X25519 => Some(32),
            NamedGroup::X448 => Some(56),
            NamedGroup::Unknown(_) => None,
        }
    }
}

// ============================================================================
// Hash Algorithms
// ============================================================================

/// Hash algorithms usable by TLS 1.3 cipher suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum HashAlgorithm {
    SHA256,
    SHA384,
}

impl HashAlgorithm {
    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::SHA256 => 32,
            HashAlgorithm::SHA384 => 48,
        }
    }

    /// All hash algorithms a TLS 1.3 transcript may end up using.
    pub const fn all() -> &'static [HashAlgorithm; 2] {
        &[HashAlgorithm::SHA256, HashAlgorithm::SHA384]
    }
}

// ============================================================================
// Cipher Suites
// ============================================================================

/// TLS 1.3 cipher suites (RFC 8446 Appendix B.4).
///
/// A TLS 1.3 suite only names the AEAD and the hash; key exchange is
/// negotiated separately through key_share and pre_shared_key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum CipherSuite {
    /// TLS_AES_128_GCM_SHA256.
    AES_128_GCM_SHA256,
    /// TLS_AES_256_GCM_SHA384.
    AES_256_GCM_SHA384,
    /// TLS_CHACHA20_POLY1305_SHA256.
    CHACHA20_POLY1305_SHA256,
    /// TLS_AES_128_CCM_SHA256.
    AES_128_CCM_SHA256,
    /// TLS_AES_128_CCM_8_SHA256.
    AES_128_CCM_8_SHA256,
    /// Unknown or unsupported cipher suite.
    Unknown(u16),
}

impl CipherSuite {
    /// Convert a wire format u16 value to a `CipherSuite`.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x1301 => CipherSuite::AES_128_GCM_SHA256,
            0x1302 => CipherSuite::AES_256_GCM_SHA384,
            0x1303 => CipherSuite::CHACHA20_POLY1305_SHA256,
            0x1304 => CipherSuite::AES_128_CCM_SHA256,
            0x1305 => CipherSuite::AES_128_CCM_8_SHA256,
            _ => CipherSuite::Unknown(value),
        }
    }

    /// Convert this `CipherSuite` to its wire format u16 value.
    pub fn as_u16(&self) -> u16 {
        match self {
            CipherSuite::AES_128_GCM_SHA256 => 0x1301,
            CipherSuite::AES_256_GCM_SHA384 => 0x1302,
            CipherSuite::CHACHA20_POLY1305_SHA256 => 0x1303,
            CipherSuite::AES_128_CCM_SHA256 => 0x1304,
            CipherSuite::AES_128_CCM_8_SHA256 => 0x1305,
            CipherSuite::Unknown(value) => *value,
        }
    }

    /// Parse a `CipherSuite` from wire format.
    pub fn parse(input: &[u8]) -> IResult<&[u8], CipherSuite> {
        let (input, value) = be_u16(input)?;
        Ok((input, CipherSuite::from_u16(value)))
    }

    /// Returns the hash algorithm used by this cipher suite.
    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        match self {
            CipherSuite::AES_128_GCM_SHA256
            | CipherSuite::CHACHA20_POLY1305_SHA256
            | CipherSuite::AES_128_CCM_SHA256
            | CipherSuite::AES_128_CCM_8_SHA256 => Some(HashAlgorithm::SHA256),
            CipherSuite::AES_256_GCM_SHA384 => Some(HashAlgorithm::SHA384),
            CipherSuite::Unknown(_) => None,
        }
    }
}

// ============================================================================
// Signature Schemes
// ============================================================================

/// Signature schemes (RFC 8446 Section 4.2.3).
///
/// Only advertised for interoperability. No certificate is ever verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    EcdsaSecp256r1Sha256,
}

impl SignatureScheme {
    pub fn as_u16(&self) -> u16 {
        match self {
            SignatureScheme::EcdsaSecp256r1Sha256 => 0x0403,
        }
    }
}

// ============================================================================
// PSK key exchange modes
// ============================================================================

/// psk_key_exchange_modes values (RFC 8446 Section 4.2.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PskKeyExchangeMode {
    /// PSK-only key establishment.
    PskKe,
    /// PSK with (EC)DHE key establishment.
    PskDheKe,
    Unknown(u8),
}

impl PskKeyExchangeMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => PskKeyExchangeMode::PskKe,
            1 => PskKeyExchangeMode::PskDheKe,
            _ => PskKeyExchangeMode::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            PskKeyExchangeMode::PskKe => 0,
            PskKeyExchangeMode::PskDheKe => 1,
            PskKeyExchangeMode::Unknown(value) => *value,
        }
    }
}

// ============================================================================
// Alerts
// ============================================================================

/// Alert level (RFC 8446 Section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Fatal,
    Unknown(u8),
}

impl AlertLevel {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => AlertLevel::Warning,
            2 => AlertLevel::Fatal,
            _ => AlertLevel::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            AlertLevel::Warning => 1,
            AlertLevel::Fatal => 2,
            AlertLevel::Unknown(value) => *value,
        }
    }
}

/// Alert description (RFC 8446 Section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDescription {
    CloseNotify,
    UnexpectedMessage,
    BadRecordMac,
    RecordOverflow,
    HandshakeFailure,
    IllegalParameter,
    DecodeError,
    DecryptError,
    ProtocolVersion,
    InternalError,
    UserCanceled,
    MissingExtension,
    UnsupportedExtension,
    UnknownPskIdentity,
    Unknown(u8),
}

impl AlertDescription {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => AlertDescription::CloseNotify,
            10 => AlertDescription::UnexpectedMessage,
            20 => AlertDescription::BadRecordMac,
            22 => AlertDescription::RecordOverflow,
            40 => AlertDescription::HandshakeFailure,
            47 => AlertDescription::IllegalParameter,
            50 => AlertDescription::DecodeError,
            51 => AlertDescription::DecryptError,
            70 => AlertDescription::ProtocolVersion,
            80 => AlertDescription::InternalError,
            90 => AlertDescription::UserCanceled,
            109 => AlertDescription::MissingExtension,
            110 => AlertDescription::UnsupportedExtension,
            115 => AlertDescription::UnknownPskIdentity,
            _ => AlertDescription::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            AlertDescription::CloseNotify => 0,
            AlertDescription::UnexpectedMessage => 10,
            AlertDescription::BadRecordMac => 20,
            AlertDescription::RecordOverflow => 22,
            AlertDescription::HandshakeFailure => 40,
            AlertDescription::IllegalParameter => 47,
            AlertDescription::DecodeError => 50,
            AlertDescription::DecryptError => 51,
            AlertDescription::ProtocolVersion => 70,
            AlertDescription::InternalError => 80,
            AlertDescription::UserCanceled => 90,
            AlertDescription::MissingExtension => 109,
            AlertDescription::UnsupportedExtension => 110,
            AlertDescription::UnknownPskIdentity => 115,
            AlertDescription::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], AlertDescription> {
        let (input, value) = be_u8(input)?;
        Ok((input, AlertDescription::from_u8(value)))
    }
}

impl fmt::Display for AlertDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertDescription::CloseNotify => "close_notify",
            AlertDescription::UnexpectedMessage => "unexpected_message",
            AlertDescription::BadRecordMac => "bad_record_mac",
            AlertDescription::RecordOverflow => "record_overflow",
            AlertDescription::HandshakeFailure => "handshake_failure",
            AlertDescription::IllegalParameter => "illegal_parameter",
            AlertDescription::DecodeError => "decode_error",
            AlertDescription::DecryptError => "decrypt_error",
            AlertDescription::ProtocolVersion => "protocol_version",
            AlertDescription::InternalError => "internal_error",
            AlertDescription::UserCanceled => "user_canceled",
            AlertDescription::MissingExtension => "missing_extension",
            AlertDescription::UnsupportedExtension => "unsupported_extension",
            AlertDescription::UnknownPskIdentity => "unknown_psk_identity",
            AlertDescription::Unknown(value) => return write!(f, "alert({})", value),
        };
        f.write_str(name)
    }
}
