//! File format decoders for assets stored inside P4K archives

pub mod cryxml;
