use argon2::{self, Config as ArgonConfig};
use rand::Rng;

pub fn hash(password: &str) -> Result<String, argon2::Error> {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let config = ArgonConfig::default();
    argon2::hash_encoded(password.as_bytes(), &salt, &config)
}

/// False for a wrong password and for a stored hash that can't be parsed.
pub fn verify(encoded: &str, password: &str) -> bool {
    argon2::verify_encoded(encoded, password.as_bytes()).unwrap_or(false)
}
