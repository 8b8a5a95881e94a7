use bcrypt::BcryptError;

/// Hash a password with bcrypt at the given work factor.
pub fn hash_password(password: &str, cost: u32) -> Result<String, BcryptError> {
    bcrypt::hash(password, cost)
}

/// Verify a password against a stored bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, BcryptError> {
    bcrypt::verify(password, hash)
}
