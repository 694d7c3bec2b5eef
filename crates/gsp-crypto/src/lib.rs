#![forbid(unsafe_code)]

pub mod hash;
pub mod cipher;
pub mod pairing;
pub mod random;

pub mod cert;
pub mod signing;
pub mod utils;

#[cfg(test)]
mod proptests;
