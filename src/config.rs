use std::time::Duration;

use crate::crypto::CryptoProvider;
use crate::record::MAX_PLAINTEXT_LEN;
use crate::Error;

#[cfg(feature = "rust-crypto")]
use crate::crypto::rust_crypto;

/// Smallest fragment length we agree to cut records to.
const MIN_FRAGMENT_LEN: usize = 64;

/// TLS client configuration
///
/// Immutable once built. Share between connections as `Arc<Config>`.
#[derive(Debug, Clone)]
pub struct Config {
    socket_timeout: Duration,
    max_fragment_length: usize,
    server_name: Option<String>,
    crypto_provider: CryptoProvider,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            socket_timeout: Duration::from_secs(60),
            max_fragment_length: MAX_PLAINTEXT_LEN,
            server_name: None,
            crypto_provider: None,
        }
    }

    /// Timeout for each individual read or write on the transport.
    #[inline(always)]
    pub fn socket_timeout(&self) -> Duration {
        self.socket_timeout
    }

    /// Largest plaintext fragment put in one outgoing record.
    #[inline(always)]
    pub fn max_fragment_length(&self) -> usize {
        self.max_fragment_length
    }

    /// Host name sent in the server_name extension.
    #[inline(always)]
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Cryptographic provider.
    ///
    /// Provides all cryptographic operations (ciphers, key exchange, hashing, etc.).
    #[inline(always)]
    pub fn crypto_provider(&self) -> &CryptoProvider {
        &self.crypto_provider
    }
}

/// Builder for TLS client configuration.
pub struct ConfigBuilder {
    socket_timeout: Duration,
    max_fragment_length: usize,
    server_name: Option<String>,
    crypto_provider: Option<CryptoProvider>,
}

impl ConfigBuilder {
    /// Set the timeout for each transport read and write.
    ///
    /// A connection can override it with
    /// [`Connection::set_socket_timeout`](crate::Connection::set_socket_timeout).
    /// Defaults to 60 seconds.
    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Set the largest plaintext fragment per outgoing record.
    ///
    /// Must be between 64 and 16384. Defaults to 16384.
    pub fn max_fragment_length(mut self, len: usize) -> Self {
        self.max_fragment_length = len;
        self
    }

    /// Set the host name for the server_name extension.
    ///
    /// Defaults to none, meaning the extension is not sent.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Set a custom crypto provider.
    ///
    /// If not set, the installed default is used, falling back to the
    /// RustCrypto provider when the `rust-crypto` feature is enabled.
    pub fn with_crypto_provider(mut self, provider: CryptoProvider) -> Self {
        self.crypto_provider = Some(provider);
        self
    }

    /// Build the configuration.
    ///
    /// The crypto provider is selected in the following priority order:
    /// 1. Explicit provider set via `with_crypto_provider()`
    /// 2. Default provider installed via `CryptoProvider::install_default()`
    /// 3. RustCrypto provider (if `rust-crypto` feature is enabled)
    ///
    /// Returns `Error::Config` if no provider is available or the settings
    /// are out of range.
    pub fn build(self) -> Result<Config, Error> {
        let crypto_provider = self
            .crypto_provider
            .or_else(|| CryptoProvider::get_default().cloned())
            .or_else(|| {
                #[cfg(feature = "rust-crypto")]
                {
                    Some(rust_crypto::default_provider())
                }
                #[cfg(not(feature = "rust-crypto"))]
                {
                    None
                }
            })
            .ok_or_else(|| {
                Error::Config(
                    "no crypto provider: set one explicitly, install a default \
                     or enable the 'rust-crypto' feature"
                        .into(),
                )
            })?;

        crypto_provider.validate()?;

        if !(MIN_FRAGMENT_LEN..=MAX_PLAINTEXT_LEN).contains(&self.max_fragment_length) {
            return Err(Error::Config(format!(
                "max_fragment_length {} outside {}..={}",
                self.max_fragment_length, MIN_FRAGMENT_LEN, MAX_PLAINTEXT_LEN
            )));
        }

        if let Some(name) = &self.server_name {
            if name.is_empty() || name.len() > u16::MAX as usize - 5 {
                return Err(Error::Config("server_name length".into()));
            }
        }

        Ok(Config {
            socket_timeout: self.socket_timeout,
            max_fragment_length: self.max_fragment_length,
            server_name: self.server_name,
            crypto_provider,
        })
    }
}
