#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Wire types for the x402 payment protocol.
//!
//! This crate holds the types that cross a process boundary somewhere in
//! x402paygate: the CAIP-2 [`chain::ChainId`], the V2 protocol messages in
//! [`proto`], the known stablecoin deployments in [`network`], and a small
//! helper ([`util::Base64Bytes`]) used to encode and decode them.

pub mod chain;
pub mod network;
pub mod proto;
pub mod util;
