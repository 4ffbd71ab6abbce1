//! Filesystem collaborator (spec §6): `fopen/fread/fwrite/fseek/ftell/fclose`
//! with seek origins `{begin, end, current}`, wrapping `std::fs::File` the
//! way the teacher runtime's `file.rs` wraps its own file handles.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub enum SeekOrigin {
    Begin,
    End,
    Current,
}

pub struct FileHandle {
    file: File,
}

impl FileHandle {
    pub fn open_read(path: &Path) -> Result<Self, String> {
        File::open(path).map(|file| FileHandle { file }).map_err(|e| e.to_string())
    }

    pub fn open_write(path: &Path, append: bool) -> Result<Self, String> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map(|file| FileHandle { file })
            .map_err(|e| e.to_string())
    }

    pub fn read_to_end(&mut self) -> Result<Vec<u8>, String> {
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf).map_err(|e| e.to_string())?;
        Ok(buf)
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), String> {
        self.file.write_all(bytes).map_err(|e| e.to_string())
    }

    pub fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64, String> {
        let from = match origin {
            SeekOrigin::Begin => SeekFrom::Start(offset as u64),
            SeekOrigin::End => SeekFrom::End(offset),
            SeekOrigin::Current => SeekFrom::Current(offset),
        };
        self.file.seek(from).map_err(|e| e.to_string())
    }

    pub fn tell(&mut self) -> Result<u64, String> {
        self.seek(SeekOrigin::Current, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        FileHandle::open_write(&path, false).unwrap().write_all(b"hello").unwrap();
        let bytes = FileHandle::open_read(&path).unwrap().read_to_end().unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn seek_and_tell_report_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        FileHandle::open_write(&path, false).unwrap().write_all(b"0123456789").unwrap();
        let mut f = FileHandle::open_read(&path).unwrap();
        f.seek(SeekOrigin::Begin, 4).unwrap();
        assert_eq!(f.tell().unwrap(), 4);
    }
}
