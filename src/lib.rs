//! Netvend - multi-tenant captive-portal voucher vending backend
//!
//! This library provides the core of the voucher sales flow: voucher
//! inventory with atomic claims, payment verification against hosted
//! gateways (Paystack, Flutterwave), and the claim coordinator that walks
//! a purchase from payment redirect to a dispensed voucher code.

pub mod claim;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod payments;
pub mod rate_limit;
pub mod util;
