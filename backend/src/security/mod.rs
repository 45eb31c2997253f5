//! At-rest credential encryption (§3, §4.2).

pub mod credential;

pub use credential::CredentialCipher;
