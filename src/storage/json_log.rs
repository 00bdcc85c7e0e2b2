use super::rotating::RecordFormat;
use crate::error::{ActionCamError, CamResult};
use serde::Serialize;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::marker::PhantomData;

const EMPTY_ARRAY: &[u8] = b"[\n]\n";
const CLOSING: &[u8] = b"\n]\n";

/// One JSON array per file, valid after every append.
///
/// Each append rewinds over the closing bracket, writes the element and
/// closes the array again.
pub struct JsonArrayLog<R> {
    file: File,
    records: usize,
    _record: PhantomData<fn(&R)>,
}

impl<R> JsonArrayLog<R> {
    pub fn records(&self) -> usize {
        self.records
    }
}

impl<R: Serialize> RecordFormat for JsonArrayLog<R> {
    type Record = R;

    fn start(mut file: File, existing_len: u64) -> CamResult<Self> {
        // Earlier content cannot be resumed safely as an array; start over
        if existing_len > 0 {
            file.set_len(0)?;
        }
        file.seek(SeekFrom::Start(0))?;
        file.write_all(EMPTY_ARRAY)?;
        file.flush()?;
        Ok(Self {
            file,
            records: 0,
            _record: PhantomData,
        })
    }

    fn append(&mut self, record: &R) -> CamResult<()> {
        let element = serde_json::to_string_pretty(record)
            .map_err(|e| ActionCamError::Storage(format!("json: {}", e)))?;

        let mut chunk = Vec::with_capacity(element.len() + 8);
        if self.records == 0 {
            self.file.seek(SeekFrom::End(-2))?;
        } else {
            self.file.seek(SeekFrom::End(-(CLOSING.len() as i64)))?;
            chunk.extend_from_slice(b",\n");
        }
        chunk.extend_from_slice(element.as_bytes());
        chunk.extend_from_slice(CLOSING);

        self.file.write_all(&chunk)?;
        self.file.flush()?;
        self.records += 1;
        Ok(())
    }
}
