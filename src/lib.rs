//! Library Payments - payment processing core for the library service.
//!
//! Creates gateway invoices for member charges, keeps the local payment
//! record in step with the gateway through callbacks and status checks,
//! and expires payments that were never completed.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
