// Request authentication for private exchange endpoints
pub mod nonce;
pub mod signer;

pub use nonce::{Nonce, NonceGenerator};
pub use signer::{Credentials, RequestSigner, SignedRequest};
