#![cfg(feature = "rust-crypto")]

mod common;
mod data;
mod resumption;
