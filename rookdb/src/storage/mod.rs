use crate::codec::{Decoder, Encoder};
use crate::{buffer, codec};
use bytes::{Buf, BufMut};
use std::sync::atomic::AtomicUsize;
use thiserror::Error;

pub mod disk;
pub mod index;
pub mod page;

pub const PAGE_SIZE: usize = 4096;
pub type PageId = usize;
pub type AtomicPageId = AtomicUsize;

/// Reserved page storing the `(index_name, root_page_id)` records.
pub const HEADER_PAGE_ID: PageId = 0;
pub const NULL_PAGE: PageId = PageId::MAX;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_num: u32,
}

impl Encoder for RecordId {
    fn encode<B>(&self, buf: &mut B) -> Result<(), codec::Error>
    where
        B: BufMut,
    {
        buf.put_u64(self.page_id as u64);
        buf.put_u32(self.slot_num);
        Ok(())
    }
}

impl Decoder for RecordId {
    fn decode<B>(buf: &mut B) -> Result<Self, codec::Error>
    where
        B: Buf,
    {
        Ok(RecordId {
            page_id: buf.get_u64() as PageId,
            slot_num: buf.get_u32(),
        })
    }
}

pub type StorageResult<T> = Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("buffer error: {0}")]
    Buffer(#[from] buffer::Error),
    #[error("codec error: {0}")]
    Codec(#[from] codec::Error),
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),
}
