/*
 *  Note that there's no unify error type across serde impls,
 *  the codec logs the underlying error and returns a unit error,
 *  the engine maps it to RpcError::Encode / RpcError::Decode.
 */

use serde::{Deserialize, Serialize};

/// The codec is immutable, if need changing (like setting up cipher), should have inner
/// mutablilty
pub trait Codec: Default + Send + Sync + Sized + 'static {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, ()>;

    /// serialize the value into the tail of buf, and return the size written
    fn encode_into<T: Serialize + ?Sized>(&self, value: &T, buf: &mut Vec<u8>) -> Result<usize, ()>;

    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, ()>;
}

/// MessagePack through rmp-serde, sequences and tuples are encoded as arrays.
#[derive(Default, Clone, Copy, Debug)]
pub struct MsgpCodec;

impl Codec for MsgpCodec {
    #[inline]
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, ()> {
        let mut buf = Vec::new();
        self.encode_into(value, &mut buf)?;
        Ok(buf)
    }

    fn encode_into<T: Serialize + ?Sized>(
        &self, value: &T, buf: &mut Vec<u8>,
    ) -> Result<usize, ()> {
        let start = buf.len();
        match rmp_serde::encode::write(buf, value) {
            Ok(_) => Ok(buf.len() - start),
            Err(e) => {
                warn!("msgpack encode error: {}", e);
                Err(())
            }
        }
    }

    #[inline]
    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, ()> {
        match rmp_serde::decode::from_slice::<T>(buf) {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!("msgpack decode error: {}", e);
                Err(())
            }
        }
    }
}
