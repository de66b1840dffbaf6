//! Diffie-Hellman parameter parsing.
//!
//! Parses the PKCS#3 `DHParameter` structure found in `dhparam.pem` files:
//!
//! ```text
//! DHParameter ::= SEQUENCE {
//!     prime              INTEGER,
//!     base               INTEGER,
//!     privateValueLength INTEGER OPTIONAL }
//! ```
//!
//! PEM framing is handled by `x509_parser::pem`, the DER structure by the
//! `der_parser` it re-exports.

use thiserror::Error;
use x509_parser::der_parser::ber::BerObjectContent;
use x509_parser::der_parser::der::parse_der_sequence;
use x509_parser::error::PEMError;
use x509_parser::pem::Pem;

use super::builtin::{RFC5114_MODP_1024_G, RFC5114_MODP_1024_P};

const PEM_LABEL: &str = "DH PARAMETERS";

#[derive(Debug, Error)]
pub enum DhError {
    #[error("no DH PARAMETERS section found")]
    MissingSection,

    #[error("invalid PEM block: {0}")]
    Pem(#[from] PEMError),

    #[error("malformed DHParameter structure: {0}")]
    Der(String),

    #[error("unusable DH group: {0}")]
    Invalid(&'static str),

    #[error("invalid hex constant: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// A finite-field DH group: big-endian prime and generator without sign padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParams {
    prime: Vec<u8>,
    generator: Vec<u8>,
}

impl DhParams {
    /// Parse the first `DH PARAMETERS` block in `pem`; other blocks are skipped.
    pub fn from_pem(pem: &str) -> Result<Self, DhError> {
        for block in Pem::iter_from_buffer(pem.as_bytes()) {
            let block = block?;
            if block.label == PEM_LABEL {
                return Self::from_der(&block.contents);
            }
        }
        Err(DhError::MissingSection)
    }

    pub fn from_der(der: &[u8]) -> Result<Self, DhError> {
        let (_, sequence) = parse_der_sequence(der).map_err(|e| DhError::Der(e.to_string()))?;
        let fields = sequence
            .as_sequence()
            .map_err(|e| DhError::Der(e.to_string()))?;
        let [prime, generator, ..] = fields.as_slice() else {
            return Err(DhError::Der("expected prime and base".into()));
        };

        let params = Self {
            prime: magnitude(&prime.content)?,
            generator: magnitude(&generator.content)?,
        };
        if params.prime_bits() < 512 {
            return Err(DhError::Invalid("prime shorter than 512 bits"));
        }
        if params.generator.iter().all(|&b| b == 0) || params.generator == [1] {
            return Err(DhError::Invalid("degenerate generator"));
        }
        Ok(params)
    }

    /// The compiled-in fallback group.
    pub fn rfc5114_modp_1024() -> Result<Self, DhError> {
        Ok(Self {
            prime: hex::decode(RFC5114_MODP_1024_P)?,
            generator: hex::decode(RFC5114_MODP_1024_G)?,
        })
    }

    pub fn prime(&self) -> &[u8] {
        &self.prime
    }

    pub fn generator(&self) -> &[u8] {
        &self.generator
    }

    pub fn prime_bits(&self) -> usize {
        match self.prime.first() {
            Some(&top) => self.prime.len() * 8 - top.leading_zeros() as usize,
            None => 0,
        }
    }
}

/// Big-endian magnitude of a non-negative DER INTEGER.
fn magnitude(content: &BerObjectContent<'_>) -> Result<Vec<u8>, DhError> {
    let BerObjectContent::Integer(bytes) = content else {
        return Err(DhError::Der("expected INTEGER".into()));
    };
    match bytes.first() {
        None => Err(DhError::Der("empty INTEGER".into())),
        Some(&top) if top & 0x80 != 0 => Err(DhError::Invalid("negative integer")),
        Some(_) => {
            let skip = bytes
                .iter()
                .take_while(|&&b| b == 0)
                .count()
                .min(bytes.len() - 1);
            Ok(bytes[skip..].to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `openssl genpkey -genparam -algorithm DH -pkeyopt dh_rfc5114:1`
    const RFC5114_PEM: &str = "-----BEGIN DH PARAMETERS-----
MIIBCAKBgQCxC4+WoIDgHd6S3l6uXVTsUsmfvPsGo8aaap3KUtI7YWBz4oZ1oj0Y
mDjvHi7mUsAT7LSuqQYRIySXXDzUm4O/rMvdfZDEvXCYSI6cIZpzck7/1vrlZEc4
+qMaT/VbzMChUa9fDci0vUW/N982XBpl5oz9p21NpwjfH7K8LkpDcQKBgQCk0cvV
w/00EmdlpELvuZkF+BBN0lisUH/WQGz/FCZtMSZv6h5cQVZLd35pD1UE8hMWAhe0
sBuIal6RVH+eJ0n01/vX07mpLuGQnQ0iY/gKdqaiTAh6CR9THb8KAWm2oorWYqTR
jnOvoy13nVkY0IvIhY9Nzvl8KiSFXm7rIrOy5Q==
-----END DH PARAMETERS-----
";

    #[test]
    fn test_pem_matches_builtin_group() {
        let parsed = DhParams::from_pem(RFC5114_PEM).unwrap();
        let builtin = DhParams::rfc5114_modp_1024().unwrap();
        assert_eq!(parsed, builtin);
        assert_eq!(parsed.prime_bits(), 1024);
        assert_eq!(parsed.prime()[0], 0xB1);
    }

    #[test]
    fn test_rejects_missing_section() {
        assert!(matches!(
            DhParams::from_pem("-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----"),
            Err(DhError::MissingSection)
        ));
    }

    #[test]
    fn test_rejects_truncated_der() {
        // SEQUENCE claiming 0x20 bytes with only two present.
        assert!(DhParams::from_der(&[0x30, 0x20, 0x02, 0x01]).is_err());
    }

    #[test]
    fn test_rejects_small_prime() {
        let der = [0x30, 0x06, 0x02, 0x01, 0x17, 0x02, 0x01, 0x05];
        assert!(matches!(DhParams::from_der(&der), Err(DhError::Invalid(_))));
    }

    #[test]
    fn test_skips_unrelated_blocks() {
        let bundle = format!("-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----\n{RFC5114_PEM}");
        assert_eq!(DhParams::from_pem(&bundle).unwrap().prime_bits(), 1024);
    }

    #[test]
    fn test_rejects_non_integer_fields() {
        // SEQUENCE { OCTET STRING, INTEGER }
        let der = [0x30, 0x06, 0x04, 0x01, 0x17, 0x02, 0x01, 0x05];
        assert!(matches!(DhParams::from_der(&der), Err(DhError::Der(_))));
    }

    #[test]
    fn test_rejects_broken_base64() {
        let pem = "-----BEGIN DH PARAMETERS-----\n!!!!\n-----END DH PARAMETERS-----\n";
        assert!(matches!(DhParams::from_pem(pem), Err(DhError::Pem(_))));
    }
}
