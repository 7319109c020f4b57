//! Key exchange group implementations using RustCrypto.

use p256::{ecdh::EphemeralSecret as P256EphemeralSecret, PublicKey as P256PublicKey};
use p384::{ecdh::EphemeralSecret as P384EphemeralSecret, PublicKey as P384PublicKey};
use rand_core::OsRng;
use x25519_dalek::{EphemeralSecret as X25519EphemeralSecret, PublicKey as X25519PublicKey};

use crate::buffer::Buf;
use crate::crypto::provider::{ActiveKeyExchange, SupportedKxGroup};
use crate::types::NamedGroup;

/// Ephemeral key exchange implementation.
enum EphemeralKeyExchange {
    X25519 {
        secret: X25519EphemeralSecret,
        public_key: Buf,
    },
    P256 {
        secret: P256EphemeralSecret,
        public_key: Buf,
    },
    P384 {
        secret: P384EphemeralSecret,
        public_key: Buf,
    },
}

impl std::fmt::Debug for EphemeralKeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyExchange")
            .field("group", &self.group())
            .field("public_key_len", &self.pub_key().len())
            .finish_non_exhaustive()
    }
}

impl EphemeralKeyExchange {
    fn new(group: NamedGroup, mut buf: Buf) -> Result<Self, String> {
        buf.clear();
        match group {
            NamedGroup::X25519 => {
                let secret = X25519EphemeralSecret::random_from_rng(OsRng);
                buf.extend_from_slice(X25519PublicKey::from(&secret).as_bytes());
                Ok(EphemeralKeyExchange::X25519 {
                    secret,
                    public_key: buf,
                })
            }
            NamedGroup::Secp256r1 => {
                let secret = P256EphemeralSecret::random(&mut OsRng);
                buf.extend_from_slice(&P256PublicKey::from(&secret).to_sec1_bytes());
                Ok(EphemeralKeyExchange::P256 {
                    secret,
                    public_key: buf,
                })
            }
            NamedGroup::Secp384r1 => {
                let secret = P384EphemeralSecret::random(&mut OsRng);
                buf.extend_from_slice(&P384PublicKey::from(&secret).to_sec1_bytes());
                Ok(EphemeralKeyExchange::P384 {
                    secret,
                    public_key: buf,
                })
            }
            _ => Err(format!("Unsupported group: {:?}", group)),
        }
    }
}

impl ActiveKeyExchange for EphemeralKeyExchange {
    fn pub_key(&self) -> &[u8] {
        match self {
            EphemeralKeyExchange::X25519 { public_key, .. } => public_key,
            EphemeralKeyExchange::P256 { public_key, .. } => public_key,
            EphemeralKeyExchange::P384 { public_key, .. } => public_key,
        }
    }

    fn complete(self: Box<Self>, peer_pub: &[u8], out: &mut Buf) -> Result<(), String> {
        out.clear();
        match *self {
            EphemeralKeyExchange::X25519 { secret, .. } => {
                let peer: [u8; 32] = peer_pub
                    .try_into()
                    .map_err(|_| "Invalid X25519 public key length".to_string())?;
                let shared = secret.diffie_hellman(&X25519PublicKey::from(peer));
                if !shared.was_contributory() {
                    return Err("X25519 shared secret is all zeros".to_string());
                }
                out.extend_from_slice(shared.as_bytes());
            }
            EphemeralKeyExchange::P256 { secret, .. } => {
                let peer = P256PublicKey::from_sec1_bytes(peer_pub)
                    .map_err(|_| "Invalid P-256 public key".to_string())?;
                let shared = secret.diffie_hellman(&peer);
                out.extend_from_slice(shared.raw_secret_bytes().as_slice());
            }
            EphemeralKeyExchange::P384 { secret, .. } => {
                let peer = P384PublicKey::from_sec1_bytes(peer_pub)
                    .map_err(|_| "Invalid P-384 public key".to_string())?;
                let shared = secret.diffie_hellman(&peer);
                out.extend_from_slice(shared.raw_secret_bytes().as_slice());
            }
        }
        Ok(())
    }

    fn group(&self) -> NamedGroup {
        match self {
            EphemeralKeyExchange::X25519 { .. } => NamedGroup::X25519,
            EphemeralKeyExchange::P256 { .. } => NamedGroup::Secp256r1,
            EphemeralKeyExchange::P384 { .. } => NamedGroup::Secp384r1,
        }
    }
}

/// X25519 key exchange group.
#[derive(Debug)]
struct X25519;

impl SupportedKxGroup for X25519 {
    fn name(&self) -> NamedGroup {
        NamedGroup::X25519
    }

    fn start_exchange(&self, buf: Buf) -> Result<Box<dyn ActiveKeyExchange>, String> {
        Ok(Box::new(EphemeralKeyExchange::new(NamedGroup::X25519, buf)?))
    }
}

/// P-256 (secp256r1) key exchange group.
#[derive(Debug)]
struct P256;

impl SupportedKxGroup for P256 {
    fn name(&self) -> NamedGroup {
        NamedGroup::Secp256r1
    }

    fn start_exchange(&self, buf: Buf) -> Result<Box<dyn ActiveKeyExchange>, String> {
        Ok(Box::new(EphemeralKeyExchange::new(NamedGroup::Secp256r1, buf)?))
    }
}

/// P-384 (secp384r1) key exchange group.
#[derive(Debug)]
struct P384;

impl SupportedKxGroup for P384 {
    fn name(&self) -> NamedGroup {
        NamedGroup::Secp384r1
    }

    fn start_exchange(&self, buf: Buf) -> Result<Box<dyn ActiveKeyExchange>, String> {
        Ok(Box::new(EphemeralKeyExchange::new(NamedGroup::Secp384r1, buf)?))
    }
}

static KX_GROUP_X25519: X25519 = X25519;
static KX_GROUP_P256: P256 = P256;
static KX_GROUP_P384: P384 = P384;

/// All supported key exchange groups, in preference order.
pub(super) static ALL_KX_GROUPS: &[&dyn SupportedKxGroup] =
    &[&KX_GROUP_X25519, &KX_GROUP_P256, &KX_GROUP_P384];
