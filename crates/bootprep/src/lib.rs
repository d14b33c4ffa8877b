//! bootprep library - resolves a BOOT value into a single bootable disk image
//!
//! The pipeline lives in [`resolve::Pipeline`]; the other modules are its
//! stages and are usable on their own.

pub mod alias;
pub mod classify;
pub mod config;
pub mod convert;
pub mod download;
pub mod errors;
pub mod extract;
pub mod kind;
pub mod output;
pub mod resolve;
pub mod retry;
pub mod utils;

#[cfg(test)]
mod testutil;
