use bytes::{Buf, BufMut};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("decode: {0}")]
    Decode(String),
    #[error("encode: {0}")]
    Encode(String),
}

pub trait Encoder: Sized {
    fn encode<B>(&self, buf: &mut B) -> Result<(), Error>
    where
        B: BufMut;
}

pub trait Decoder: Sized {
    fn decode<B>(buf: &mut B) -> Result<Self, Error>
    where
        B: Buf;
}

macro_rules! impl_codec {
    ($($ty:ty, $put:ident, $get:ident);+ $(;)?) => {
        $(
            impl Encoder for $ty {
                fn encode<B>(&self, buf: &mut B) -> Result<(), Error>
                where
                    B: BufMut,
                {
                    buf.$put(*self);
                    Ok(())
                }
            }

            impl Decoder for $ty {
                fn decode<B>(buf: &mut B) -> Result<Self, Error>
                where
                    B: Buf,
                {
                    Ok(buf.$get())
                }
            }
        )+
    };
}

impl_codec! {
    u8, put_u8, get_u8;
    u16, put_u16, get_u16;
    u32, put_u32, get_u32;
    u64, put_u64, get_u64;
    i8, put_i8, get_i8;
    i16, put_i16, get_i16;
    i32, put_i32, get_i32;
    i64, put_i64, get_i64;
}

impl Encoder for usize {
    fn encode<B>(&self, buf: &mut B) -> Result<(), Error>
    where
        B: BufMut,
    {
        buf.put_u64(*self as u64);
        Ok(())
    }
}

impl Decoder for usize {
    fn decode<B>(buf: &mut B) -> Result<Self, Error>
    where
        B: Buf,
    {
        Ok(buf.get_u64() as usize)
    }
}

impl Encoder for String {
    fn encode<B>(&self, buf: &mut B) -> Result<(), Error>
    where
        B: BufMut,
    {
        buf.put_u32(self.len() as u32);
        buf.put_slice(self.as_bytes());
        Ok(())
    }
}

impl Decoder for String {
    fn decode<B>(buf: &mut B) -> Result<Self, Error>
    where
        B: Buf,
    {
        let len = buf.get_u32() as usize;
        let mut bytes = vec![0; len];
        buf.copy_to_slice(&mut bytes);
        String::from_utf8(bytes).map_err(|err| Error::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives() -> Result<(), Error> {
        let mut buffer = [0u8; 64];
        42u32.encode(&mut buffer.as_mut())?;
        assert_eq!(u32::decode(&mut buffer.as_ref())?, 42);
        usize::MAX.encode(&mut buffer.as_mut())?;
        assert_eq!(usize::decode(&mut buffer.as_ref())?, usize::MAX);
        (-7i64).encode(&mut buffer.as_mut())?;
        assert_eq!(i64::decode(&mut buffer.as_ref())?, -7);
        Ok(())
    }

    #[test]
    fn strings() -> Result<(), Error> {
        let mut buffer = [0u8; 64];
        let name = "primary_index".to_string();
        name.encode(&mut buffer.as_mut())?;
        assert_eq!(String::decode(&mut buffer.as_ref())?, name);
        Ok(())
    }
}
