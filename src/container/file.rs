//! Container file: header, extents and the committed tree

use super::tree::{Extent, Group};
use crate::error::{Error, Result};
use crate::parser::ByteCursor;
use crate::types::{HEADER_SIZE, MAGIC};
use crate::writer::ByteWriter;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const TREE_ALIGN: u64 = 8;

/// Open container
///
/// Extents are only ever appended or overwritten in place. The tree is held
/// in memory and reaches the file on [`ContainerFile::commit`].
pub(crate) struct ContainerFile {
    file: File,
    path: PathBuf,
    root: Group,
    writable: bool,
}

impl ContainerFile {
    /// Start a new, empty container, replacing any existing file
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(MAGIC)?;
        file.write_all(&0u64.to_le_bytes())?;
        log::debug!("{}: created container", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            root: Group::default(),
            writable: true,
        })
    }

    pub fn open(path: &Path, writable: bool) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(writable).open(path)?;
        let file_len = file.metadata()?.len();

        let mut head = [0u8; HEADER_SIZE];
        file.read_exact(&mut head).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::corrupt("file is shorter than the header", 0),
            _ => e.into(),
        })?;
        if &head[..MAGIC.len()] != MAGIC {
            return Err(Error::corrupt("bad magic", 0));
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&head[MAGIC.len()..]);
        let tree_at = u64::from_le_bytes(word);
        if tree_at == 0 {
            return Err(Error::corrupt("no committed tree", MAGIC.len() as u64));
        }
        if tree_at.saturating_add(8) > file_len {
            return Err(Error::corrupt(
                format!("tree offset points past end of file ({file_len} bytes)"),
                MAGIC.len() as u64,
            ));
        }

        file.seek(SeekFrom::Start(tree_at))?;
        file.read_exact(&mut word)?;
        let tree_len = u64::from_le_bytes(word);
        if tree_at + 8 + tree_len > file_len {
            return Err(Error::corrupt("tree block extends past end of file", tree_at));
        }
        let mut bytes = vec![0u8; tree_len as usize];
        file.read_exact(&mut bytes)?;
        let mut cursor = ByteCursor::new(&bytes, tree_at + 8);
        let root = Group::decode(&mut cursor)?;
        if !cursor.eos() {
            return Err(Error::corrupt("trailing bytes after tree", cursor.offset()));
        }
        log::debug!(
            "{}: opened container, tree of {tree_len} bytes at {tree_at}",
            path.display()
        );
        Ok(Self {
            file,
            path: path.to_path_buf(),
            root,
            writable,
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Group {
        &mut self.root
    }

    /// Read `len` bytes at `offset`
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::corrupt(format!("extent of {len} bytes is truncated"), offset),
            _ => e.into(),
        })?;
        Ok(buf)
    }

    pub fn read_extent(&self, extent: Extent) -> Result<Vec<u8>> {
        self.read_at(extent.offset, extent.len as usize)
    }

    /// Write `bytes` at the end of the file, starting on an `align` boundary
    pub fn append(&mut self, bytes: &[u8], align: u64) -> Result<Extent> {
        self.check_writable()?;
        let end = self.file.seek(SeekFrom::End(0))?;
        let offset = end.next_multiple_of(align.max(1));
        if offset > end {
            self.file.write_all(&vec![0u8; (offset - end) as usize])?;
        }
        self.file.write_all(bytes)?;
        Ok(Extent {
            offset,
            len: bytes.len() as u64,
        })
    }

    /// Replace bytes at `offset`
    pub fn overwrite(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Write the tree at the end of the file, then point the header at it
    pub fn commit(&mut self) -> Result<()> {
        self.check_writable()?;
        let mut w = ByteWriter::new();
        self.root.encode(&mut w)?;
        let tree = w.into_bytes();

        let mut block = Vec::with_capacity(tree.len() + 8);
        block.extend_from_slice(&(tree.len() as u64).to_le_bytes());
        block.extend_from_slice(&tree);
        let extent = self.append(&block, TREE_ALIGN)?;
        self.file.sync_data()?;

        self.file.seek(SeekFrom::Start(MAGIC.len() as u64))?;
        self.file.write_all(&extent.offset.to_le_bytes())?;
        self.file.sync_data()?;
        log::debug!(
            "{}: committed tree of {} bytes at {}",
            self.path.display(),
            tree.len(),
            extent.offset
        );
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }
}
