use std::{fmt, io, path::PathBuf};

use openssl::error::ErrorStack;

#[derive(Debug)]
pub enum CryptoError {
    OpenSslError(ErrorStack),
    DerError(der::Error),
    IoError(PathBuf, io::Error),
    EmptyChain(PathBuf),
    NoSignerCertificate,
    KeyMismatch,
    UnsupportedKey(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CryptoError::OpenSslError(e) => write!(f, "OpenSsl Error: {}", e),
            CryptoError::DerError(e) => write!(f, "Could not encode or decode DER: {}", e),
            CryptoError::IoError(path, e) => {
                write!(f, "Cannot read '{}': {}", path.to_string_lossy(), e)
            }
            CryptoError::EmptyChain(path) => {
                write!(f, "No certificates found in '{}'", path.to_string_lossy())
            }
            CryptoError::NoSignerCertificate => write!(f, "Signing chain is empty"),
            CryptoError::KeyMismatch => {
                write!(f, "Signing key does not match the first certificate of the chain")
            }
            CryptoError::UnsupportedKey(kind) => write!(f, "Unsupported key type: {}", kind),
        }
    }
}

impl std::error::Error for CryptoError {}

impl From<ErrorStack> for CryptoError {
    fn from(e: ErrorStack) -> Self {
        CryptoError::OpenSslError(e)
    }
}

impl From<der::Error> for CryptoError {
    fn from(e: der::Error) -> Self {
        CryptoError::DerError(e)
    }
}
