pub mod aes;
pub mod digest;
pub mod kdf;
pub mod padding;

pub use self::digest::SignatureAlgorithm;
