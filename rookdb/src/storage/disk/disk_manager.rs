use crate::storage::{PageId, PAGE_SIZE};
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

pub struct DiskManager {
    db_file: Mutex<tokio::fs::File>,
}

impl DiskManager {
    pub async fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let db_file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .await?;
        Ok(DiskManager {
            db_file: Mutex::new(db_file),
        })
    }

    pub async fn write_page(&self, page_id: PageId, page_data: &[u8]) -> std::io::Result<()> {
        let offset = PAGE_SIZE as u64 * page_id as u64;
        let mut file = self.db_file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(page_data).await?;
        file.flush().await?;
        Ok(())
    }

    /// Reads past the end of file yield a zeroed page, so pages that were
    /// allocated but never flushed decode as empty.
    pub async fn read_page(&self, page_id: PageId, page_data: &mut [u8]) -> std::io::Result<()> {
        let offset = PAGE_SIZE as u64 * page_id as u64;
        let mut file = self.db_file.lock().await;
        if offset >= file.metadata().await?.len() {
            page_data.fill(0);
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset)).await?;
        file.read_exact(page_data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read() -> std::io::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let disk_manager = DiskManager::new(file.path()).await?;
        let data = [7u8; PAGE_SIZE];
        disk_manager.write_page(3, &data).await?;

        let mut buffer = [0u8; PAGE_SIZE];
        disk_manager.read_page(3, &mut buffer).await?;
        assert_eq!(buffer, data);

        // never written, but within the file would be past the end
        buffer.fill(1);
        disk_manager.read_page(100, &mut buffer).await?;
        assert_eq!(buffer, [0u8; PAGE_SIZE]);
        Ok(())
    }
}
