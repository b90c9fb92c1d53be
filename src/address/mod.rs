//! Handler addressing: endpoint allocation and socket identities.

mod identity;
mod registry;

pub use identity::generate_identity;
pub use registry::{AddressRegistry, HandlerAddress};
