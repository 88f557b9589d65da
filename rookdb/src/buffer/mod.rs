use crate::codec;
use thiserror::Error;

pub mod buffer_pool_manager;
pub mod lru_k_replacer;

pub type FrameId = usize;

#[derive(Error, Debug)]
pub enum Error {
    #[error("codec error: {0}")]
    Codec(#[from] codec::Error),
    #[error("buffer insufficient")]
    BufferInsufficient,
    #[error("frame {0} is not evictable")]
    UnEvictableFrame(FrameId),
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),
}
