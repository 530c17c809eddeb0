use anyhow::Result;

/// Symmetric cipher protecting SSO Frame bodies.
///
/// The network's cipher is supplied by the embedding application together
/// with the keys the login handshake produced.
pub trait Cipher: Send + Sync + 'static {
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Vec<u8>;

    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>>;
}

/// Identity cipher, for loopback peers and diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCipher;

impl Cipher for PlainCipher {
    fn encrypt(&self, plaintext: &[u8], _key: &[u8]) -> Vec<u8> {
        plaintext.to_vec()
    }

    fn decrypt(&self, ciphertext: &[u8], _key: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}
