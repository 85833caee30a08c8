/// Writes the fixed part of a message into `buf`.
///
/// Implementors may return a borrowed tail that the caller appends
/// after `buf` without copying it first.
pub trait Serialize<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
