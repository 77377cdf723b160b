#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Facilitator client and payment-requirement construction for x402paygate.
//!
//! This crate holds everything that touches a remote x402 facilitator: the
//! HTTP client ([`client::FacilitatorClient`]), converting a USD price into
//! an atomic stablecoin requirement ([`requirement`]), parsing a payer's
//! signed authorization out of the inbound request headers ([`header`]),
//! and recovering a payer address when the facilitator doesn't supply one
//! ([`payer`]).
//!
//! ## Example
//!
//! ```rust
//! use x402paygate_facilitator::client::FacilitatorClient;
//!
//! let facilitator = FacilitatorClient::try_from("https://x402.org/facilitator").unwrap();
//! ```

pub mod client;
pub mod header;
pub mod payer;
pub mod requirement;

pub use client::{FacilitatorClient, FacilitatorClientError};
