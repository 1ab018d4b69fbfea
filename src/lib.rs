//! An authenticated index over a RingCT-style UTXO set, backed by a
//! three-level indexed Merkle forest (outputs within a transaction,
//! transactions within a block, blocks within the chain).
//!
//! The core algorithm lives in [`hash`], [`imt`] and [`proof`]; [`forest`]
//! composes three levels of [`imt::IndexedMerkleTree`] into the queryable
//! structure a client actually talks to. Everything else ([`config`],
//! [`telemetry`], [`store`], [`api`]) is the service shell around it.

pub mod api;
pub mod config;
pub mod error;
pub mod forest;
pub mod hash;
pub mod imt;
pub mod proof;
pub mod store;
pub mod telemetry;
