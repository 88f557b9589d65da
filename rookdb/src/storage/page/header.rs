use crate::codec::{Decoder, Encoder, Error};
use crate::storage::PageId;
use bytes::{Buf, BufMut};

/// Image of the reserved header page: one `(index_name, root_page_id)`
/// record per index sharing the buffer pool. A zeroed page decodes as an
/// empty record set, so a fresh database file needs no bootstrap step.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HeaderPage {
    records: Vec<(String, PageId)>,
}

impl HeaderPage {
    pub fn search_record(&self, name: &str) -> Option<PageId> {
        self.records
            .iter()
            .find(|(record, _)| record == name)
            .map(|(_, root)| *root)
    }

    /// Returns false when a record with this name already exists.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> bool {
        if self.search_record(name).is_some() {
            return false;
        }
        self.records.push((name.to_string(), root));
        true
    }

    /// Returns false when no record with this name exists.
    pub fn update_record(&mut self, name: &str, root: PageId) -> bool {
        match self.records.iter_mut().find(|(record, _)| record == name) {
            Some(record) => {
                record.1 = root;
                true
            }
            None => false,
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl Encoder for HeaderPage {
    fn encode<B>(&self, buf: &mut B) -> Result<(), Error>
    where
        B: BufMut,
    {
        buf.put_u32(self.records.len() as u32);
        for (name, root) in self.records.iter() {
            name.encode(buf)?;
            buf.put_u64(*root as u64);
        }
        Ok(())
    }
}

impl Decoder for HeaderPage {
    fn decode<B>(buf: &mut B) -> Result<Self, Error>
    where
        B: Buf,
    {
        let len = buf.get_u32() as usize;
        let mut records = Vec::with_capacity(len);
        for _ in 0..len {
            let name = String::decode(buf)?;
            let root = buf.get_u64() as PageId;
            records.push((name, root));
        }
        Ok(Self { records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NULL_PAGE, PAGE_SIZE};

    #[test]
    fn records() {
        let mut header = HeaderPage::default();
        assert!(header.insert_record("orders", 3));
        assert!(!header.insert_record("orders", 4));
        assert_eq!(header.search_record("orders"), Some(3));
        assert!(header.update_record("orders", 9));
        assert_eq!(header.search_record("orders"), Some(9));
        assert!(!header.update_record("customers", 1));
        assert_eq!(header.search_record("customers"), None);
        assert_eq!(header.record_count(), 1);
    }

    #[test]
    fn codec() -> Result<(), Error> {
        let mut header = HeaderPage::default();
        header.insert_record("orders", 3);
        header.insert_record("customers", NULL_PAGE);
        let mut buffer = [0u8; PAGE_SIZE];
        header.encode(&mut buffer.as_mut())?;
        let decoded = HeaderPage::decode(&mut buffer.as_ref())?;
        assert_eq!(decoded, header);
        Ok(())
    }

    #[test]
    fn zeroed_page_is_empty() -> Result<(), Error> {
        let buffer = [0u8; PAGE_SIZE];
        let decoded = HeaderPage::decode(&mut buffer.as_ref())?;
        assert_eq!(decoded.record_count(), 0);
        Ok(())
    }
}
