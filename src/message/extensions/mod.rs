//! Bodies of the extensions a PSK-only TLS 1.3 client speaks.

pub mod cookie;
pub mod early_data;
pub mod key_share;
pub mod pre_shared_key;
pub mod psk_key_exchange_modes;
pub mod server_name;
pub mod signature_algorithms;
pub mod supported_groups;
pub mod supported_versions;
