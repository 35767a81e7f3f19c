// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::error::{Result, StoreError};
use memmap2::{Mmap, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

// One column's append-only backing file. Fixed-width columns get O(1)
// random access (offset = index * width); variable-width columns hold
// newline-terminated lines and only read forward. That asymmetry decides
// which scan strategy a column type uses.
#[derive(Debug, Clone)]
pub struct ColumnFile {
    path: PathBuf,
}

impl ColumnFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appender(&self) -> Result<ColumnAppender> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(ColumnAppender {
            writer: BufWriter::new(file),
        })
    }

    pub fn fixed_reader(&self, width: usize) -> Result<FixedReader> {
        Ok(FixedReader {
            file: File::open(&self.path)?,
            width,
        })
    }

    pub fn line_cursor(&self) -> Result<LineCursor> {
        Ok(LineCursor {
            reader: BufReader::new(File::open(&self.path)?),
            next_index: 0,
        })
    }

    pub fn mmap(&self) -> Result<Mmap> {
        let file = File::open(&self.path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(mmap)
    }
}

#[derive(Debug)]
pub struct ColumnAppender {
    writer: BufWriter<File>,
}

impl ColumnAppender {
    pub fn append_bytes(&mut self, record: &[u8]) -> Result<()> {
        self.writer.write_all(record)?;
        Ok(())
    }

    pub fn append_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct FixedReader {
    file: File,
    width: usize,
}

impl FixedReader {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn record_count(&self) -> Result<usize> {
        let len = self.file.metadata()?.len();
        Ok((len / self.width as u64) as usize)
    }

    pub fn read_at(&mut self, index: usize, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.width);
        self.file
            .seek(SeekFrom::Start((index * self.width) as u64))?;
        let got = read_full(&mut self.file, buf)?;
        if got < self.width {
            return Err(StoreError::ShortRead {
                index,
                want: self.width,
                got,
            });
        }
        Ok(())
    }

    pub fn for_each_record<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(usize, &[u8]) -> Result<()>,
    {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut buf = vec![0u8; self.width];
        let mut index = 0usize;
        loop {
            let got = read_full(&mut reader, &mut buf)?;
            if got < self.width {
                // A trailing partial record ends the scan.
                return Ok(());
            }
            f(index, &buf)?;
            index += 1;
        }
    }
}

// Forward-only cursor over a newline-delimited column file. It cannot
// rewind, which is why restricted scans over variable-width columns
// require ascending candidate indexes.
#[derive(Debug)]
pub struct LineCursor {
    reader: BufReader<File>,
    next_index: usize,
}

impl LineCursor {
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    // Exhausting the file before reaching `index` is an OutOfBounds
    // condition.
    pub fn advance_to(&mut self, index: usize) -> Result<String> {
        debug_assert!(index >= self.next_index);
        while self.next_index < index {
            if !self.skip_line()? {
                return Err(StoreError::OutOfBounds(index));
            }
            self.next_index += 1;
        }
        match self.read_line()? {
            Some(line) => {
                self.next_index += 1;
                Ok(line)
            }
            None => Err(StoreError::OutOfBounds(index)),
        }
    }

    pub fn for_each_line<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(usize, &str) -> Result<()>,
    {
        while let Some(line) = self.read_line()? {
            f(self.next_index, &line)?;
            self.next_index += 1;
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn skip_line(&mut self) -> Result<bool> {
        // Discard bytes up to and including the next newline without
        // building a String for the skipped record.
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(false);
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.reader.consume(pos + 1);
                    return Ok(true);
                }
                None => {
                    let len = buf.len();
                    self.reader.consume(len);
                }
            }
        }
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        let n = reader.read(&mut buf[got..])?;
        if n == 0 {
            break;
        }
        got += n;
    }
    Ok(got)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fixed_read_at() {
        let dir = tempdir().unwrap();
        let col = ColumnFile::new(dir.path().join("n.store"));
        let mut w = col.appender().unwrap();
        for v in [1i32, 2, 3] {
            w.append_bytes(&v.to_le_bytes()).unwrap();
        }
        w.flush().unwrap();

        let mut r = col.fixed_reader(4).unwrap();
        assert_eq!(r.record_count().unwrap(), 3);
        let mut buf = [0u8; 4];
        r.read_at(2, &mut buf).unwrap();
        assert_eq!(i32::from_le_bytes(buf), 3);
        r.read_at(0, &mut buf).unwrap();
        assert_eq!(i32::from_le_bytes(buf), 1);
    }

    #[test]
    fn test_fixed_short_read() {
        let dir = tempdir().unwrap();
        let col = ColumnFile::new(dir.path().join("n.store"));
        let mut w = col.appender().unwrap();
        w.append_bytes(&7i32.to_le_bytes()).unwrap();
        w.flush().unwrap();

        let mut r = col.fixed_reader(4).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            r.read_at(1, &mut buf),
            Err(StoreError::ShortRead { index: 1, want: 4, got: 0 })
        ));
    }

    #[test]
    fn test_line_cursor_skip_forward() {
        let dir = tempdir().unwrap();
        let col = ColumnFile::new(dir.path().join("s.store"));
        let mut w = col.appender().unwrap();
        for line in ["a", "b", "c", "d"] {
            w.append_line(line).unwrap();
        }
        w.flush().unwrap();

        let mut cur = col.line_cursor().unwrap();
        assert_eq!(cur.advance_to(1).unwrap(), "b");
        assert_eq!(cur.advance_to(3).unwrap(), "d");
        assert!(matches!(cur.advance_to(4), Err(StoreError::OutOfBounds(4))));
    }

    #[test]
    fn test_for_each_record_ignores_trailing_partial() {
        let dir = tempdir().unwrap();
        let col = ColumnFile::new(dir.path().join("n.store"));
        let mut w = col.appender().unwrap();
        w.append_bytes(&1i32.to_le_bytes()).unwrap();
        w.append_bytes(&[0xffu8; 2]).unwrap();
        w.flush().unwrap();

        let mut r = col.fixed_reader(4).unwrap();
        let mut seen = Vec::new();
        r.for_each_record(|i, rec| {
            seen.push((i, i32::from_le_bytes(rec.try_into().unwrap())));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(0, 1)]);
    }
}
