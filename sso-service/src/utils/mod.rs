pub mod activation;
pub mod password;
pub mod validation;

pub use activation::{generate_activation_token, ACTIVATION_TOKEN_LEN};
pub use password::{Argon2Hasher, CredentialHasher, Password, PasswordHashString};
pub use validation::{describe_validation_errors, JsonBody};
