//! Running transcript hash over handshake messages.
//!
//! Until ServerHello names the cipher suite the hash is unknown, so one
//! context per candidate algorithm runs in parallel. [`Transcript::select`]
//! keeps the negotiated one.

use arrayvec::ArrayVec;

use crate::buffer::Buf;
use crate::crypto::{HashContext, HashProvider};
use crate::types::{HandshakeType, HashAlgorithm};
use crate::Error;

pub(crate) struct Transcript {
    contexts: ArrayVec<Box<dyn HashContext>, 2>,
}

impl Transcript {
    pub fn new(hash_provider: &dyn HashProvider) -> Self {
        let mut contexts = ArrayVec::new();
        for hash in HashAlgorithm::all() {
            contexts.push(hash_provider.create_hash(*hash));
        }
        Transcript { contexts }
    }

    pub fn update(&mut self, message: &[u8]) {
        for ctx in &mut self.contexts {
            ctx.update(message);
        }
    }

    fn context(&self, hash: HashAlgorithm) -> Result<&dyn HashContext, Error> {
        self.contexts
            .iter()
            .find(|c| c.algorithm() == hash)
            .map(|c| c.as_ref())
            .ok_or_else(|| Error::Internal(format!("no {:?} transcript", hash)))
    }

    /// Hash of every message so far, leaving the running state untouched.
    pub fn snapshot(&self, hash: HashAlgorithm) -> Result<Buf, Error> {
        let mut out = Buf::new();
        self.context(hash)?.clone_and_finalize(&mut out);
        Ok(out)
    }

    /// Independent copy of the running state, for hashing a partial message.
    pub fn fork(&self, hash: HashAlgorithm) -> Result<Box<dyn HashContext>, Error> {
        Ok(self.context(hash)?.fork())
    }

    /// Drop every context except `hash`.
    pub fn select(&mut self, hash: HashAlgorithm) -> Result<(), Error> {
        self.context(hash)?;
        self.contexts.retain(|c| c.algorithm() == hash);
        Ok(())
    }

    #[cfg(test)]
    pub fn selected(&self) -> Option<HashAlgorithm> {
        match self.contexts.as_slice() {
            [only] => Some(only.algorithm()),
            _ => None,
        }
    }

    /// Replace ClientHello1 by its synthetic message_hash (RFC 8446 Section 4.4.1).
    ///
    /// ```text
    /// Transcript-Hash(ClientHello1, HelloRetryRequest, ... Mn) =
    ///     Hash(message_hash ||        /* Handshake type */
    ///          00 00 Hash.length  ||  /* Handshake message length (bytes) */
    ///          Hash(ClientHello1) ||  /* Hash of ClientHello1 */
    ///          HelloRetryRequest  || ... || Mn)
    /// ```
    ///
    /// Only ClientHello1 may have been fed so far. The transcript is left
    /// selected to `hash`.
    pub fn restart_with_message_hash(
        &mut self,
        hash_provider: &dyn HashProvider,
        hash: HashAlgorithm,
    ) -> Result<(), Error> {
        let ch1_hash = self.snapshot(hash)?;

        let mut ctx = hash_provider.create_hash(hash);
        ctx.update(&[HandshakeType::MessageHash.as_u8(), 0, 0, ch1_hash.len() as u8]);
        ctx.update(&ch1_hash);

        self.contexts.clear();
        self.contexts.push(ctx);
        Ok(())
    }
}
