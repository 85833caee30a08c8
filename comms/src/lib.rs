mod deserialize;
pub mod signal;
mod serialize;

pub use deserialize::Deserialize;
pub use serialize::Serialize;
pub use signal::{Signal, SignalKind};

/// Encodes `msg` into a freshly allocated buffer.
///
/// # Arguments
/// * `msg` - A serializable object.
///
/// # Returns
/// The full encoded message, zero copy tail included.
pub fn to_bytes<'a, T: Serialize<'a>>(msg: &'a T) -> Vec<u8> {
    let mut buf = Vec::new();

    if let Some(tail) = msg.serialize(&mut buf) {
        buf.extend_from_slice(tail);
    }

    buf
}
