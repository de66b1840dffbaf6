//! Compiled-in fallback credentials.
//!
//! The test certificate and key exist so a freshly installed server can
//! start (loudly) before an operator provisions real material. They are
//! gated behind the `builtin-test-certs` feature; without it there is no
//! certificate fallback and a missing certificate is fatal.

/// RFC 5114 section 2.1, 1024-bit MODP group with 160-bit prime order subgroup.
pub const RFC5114_MODP_1024_P: &str = "B10B8F96A080E01DDE92DE5EAE5D54EC52C99FBCFB06A3C6\
9A6A9DCA52D23B616073E28675A23D189838EF1E2EE652C013ECB4AEA906112324975C3CD49B83BF\
ACCBDD7D90C4BD7098488E9C219A73724EFFD6FAE5644738FAA31A4FF55BCCC0A151AF5F0DC8B4BD\
45BF37DF365C1A65E68CFDA76D4DA708DF1FB2BC2E4A4371";

/// Generator for [`RFC5114_MODP_1024_P`].
pub const RFC5114_MODP_1024_G: &str = "A4D1CBD5C3FD34126765A442EFB99905F8104DD258AC507F\
D6406CFF14266D31266FEA1E5C41564B777E690F5504F213160217B4B01B886A5E91547F9E2749F4\
D7FBD7D3B9A92EE1909D0D2263F80A76A6A24C087A091F531DBF0A0169B6A28AD662A4D18E73AFA3\
2D779D5918D08BC8858F4DCEF97C2A24855E6EEB22B3B2E5";

#[cfg(feature = "builtin-test-certs")]
const TEST_SERVER_CERT: &str = include_str!("../../certs/test_server.pem");

#[cfg(feature = "builtin-test-certs")]
const TEST_SERVER_KEY: &str = include_str!("../../certs/test_server.key");

/// Compiled-in material the credential store may substitute for operator files.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fallback {
    certificate: Option<&'static str>,
    private_key: Option<&'static str>,
}

impl Fallback {
    /// Whatever this build carries.
    #[cfg(feature = "builtin-test-certs")]
    pub fn builtin() -> Self {
        Self {
            certificate: Some(TEST_SERVER_CERT),
            private_key: Some(TEST_SERVER_KEY),
        }
    }

    /// Whatever this build carries.
    #[cfg(not(feature = "builtin-test-certs"))]
    pub fn builtin() -> Self {
        Self::none()
    }

    /// No fallback: operator files must be usable.
    pub fn none() -> Self {
        Self {
            certificate: None,
            private_key: None,
        }
    }

    pub fn certificate_pem(&self) -> Option<&'static str> {
        self.certificate
    }

    pub fn private_key_pem(&self) -> Option<&'static str> {
        self.private_key
    }

    pub fn is_empty(&self) -> bool {
        self.certificate.is_none() && self.private_key.is_none()
    }
}
