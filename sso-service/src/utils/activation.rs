use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

/// Length of generated activation tokens.
pub const ACTIVATION_TOKEN_LEN: usize = 27;

/// Opaque, URL-safe token correlating a future activation to an account.
///
/// 27 alphanumeric characters carry about 160 bits of entropy.
pub fn generate_activation_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(ACTIVATION_TOKEN_LEN)
        .map(char::from)
        .collect()
}
