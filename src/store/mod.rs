//! Customer Record Store Module
//!
//! This module owns the `customers` table: schema reset, chunked transactional
//! inserts and first-name lookups. SQL text and row mapping live here and
//! nowhere else.

mod database;
mod row;

pub use database::RecordStore;
pub use row::decode_customer;
