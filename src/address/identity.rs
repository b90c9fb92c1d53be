//! Handler identity generation.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::Result;

/// Generate a random v4 UUID string (`xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx`).
///
/// Used as the publish socket identity, so it must not collide across
/// processes; the bytes come straight from the OS randomness source and a
/// failure there is returned rather than papered over.
pub fn generate_identity() -> Result<String> {
    let mut bytes = [0u8; 16];
    OsRng.try_fill_bytes(&mut bytes)?;

    let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
    Ok(uuid.hyphenated().to_string())
}
