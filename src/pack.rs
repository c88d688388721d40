use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::VfsError;
use crate::path::VirtualPath;
use crate::provider::{
    EnumerateResult, PhysicalEntryInfo, Provider, ProviderExtension, ProviderStream,
};
use crate::stream::FileRegionStream;
use crate::zip::read_magic;

/// Container signature, 8 bytes at the start of the file.
const MAGIC: &[u8; 8] = b"EMPK0100";

/// Record tags following the signature.
const TAG_ENTRY: u8 = b'E';
const TAG_END: u8 = b'X';

/// Entry flags.
const FLAG_COMPRESSED: u8 = 1 << 0;
const FLAG_ENCRYPTED: u8 = 1 << 1;
const FLAG_DIRECTORY: u8 = 1 << 2;

/// Fixed portion of an entry record after the tag byte: path length,
/// flags, two timestamps and two sizes.
const ENTRY_HEADER_LEN: usize = 2 + 1 + 8 + 8 + 8 + 8;

/// Provider for Ember packed containers (`.empak`).
///
/// The format is a flat forward sequence: an 8-byte signature, then entry
/// records (tagged `E`) each carrying its path, flags, timestamps, sizes
/// and content, closed by an `X` end marker. There is no index — the
/// container is scanned sequentially, and a missing end marker means the
/// entry table is truncated. Compressed entries hold one zstd frame;
/// encrypted entries are enumerated but refuse to open.
pub struct PackProvider {
    extensions: [ProviderExtension; 1],
}

impl PackProvider {
    pub fn new() -> Self {
        Self {
            extensions: [ProviderExtension::new("empak", "Ember packed file system")],
        }
    }
}

impl Default for PackProvider {
    fn default() -> Self {
        Self::new()
    }
}

struct PackEntry {
    path: String,
    flags: u8,
    created: Option<SystemTime>,
    modified: Option<SystemTime>,
    length: u64,
    stored_length: u64,
    data_offset: u64,
}

struct PackScanner<'a> {
    reader: BufReader<File>,
    physical: &'a Path,
}

impl<'a> PackScanner<'a> {
    fn open(physical: &'a Path) -> Result<Self, VfsError> {
        let file = File::open(physical)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; MAGIC.len()];
        reader
            .read_exact(&mut magic)
            .map_err(|_| corrupt(physical, "container is shorter than its signature"))?;
        if &magic != MAGIC {
            return Err(corrupt(physical, "signature mismatch"));
        }

        Ok(Self { reader, physical })
    }

    /// Parse the next entry record; `None` after the end marker.
    ///
    /// Plain end-of-file without the marker is a truncated entry table.
    fn next(&mut self) -> Result<Option<PackEntry>, VfsError> {
        let mut tag = [0u8; 1];
        self.reader
            .read_exact(&mut tag)
            .map_err(|_| corrupt(self.physical, "entry table ends without an end marker"))?;

        match tag[0] {
            TAG_END => return Ok(None),
            TAG_ENTRY => {}
            other => {
                return Err(corrupt(
                    self.physical,
                    format!("unknown record tag 0x{other:02x}"),
                ))
            }
        }

        let mut header = [0u8; ENTRY_HEADER_LEN];
        self.reader
            .read_exact(&mut header)
            .map_err(|_| corrupt(self.physical, "truncated entry record"))?;

        let path_len = u16::from_le_bytes([header[0], header[1]]) as usize;
        let flags = header[2];
        let created = unix_seconds(u64_at(&header, 3));
        let modified = unix_seconds(u64_at(&header, 11));
        let length = u64_at(&header, 19);
        let stored_length = u64_at(&header, 27);

        let mut path_bytes = vec![0u8; path_len];
        self.reader
            .read_exact(&mut path_bytes)
            .map_err(|_| corrupt(self.physical, "truncated entry path"))?;
        let path = String::from_utf8(path_bytes)
            .map_err(|_| corrupt(self.physical, "entry path is not valid UTF-8"))?;

        let data_offset = self.reader.stream_position()?;

        self.reader
            .seek(SeekFrom::Start(data_offset + stored_length))
            .map_err(|_| corrupt(self.physical, "truncated entry content"))?;

        Ok(Some(PackEntry {
            path,
            flags,
            created,
            modified,
            length,
            stored_length,
            data_offset,
        }))
    }
}

impl Provider for PackProvider {
    fn description(&self) -> &str {
        "Ember packed file system"
    }

    fn preferred_extensions(&self) -> &[ProviderExtension] {
        &self.extensions
    }

    fn can_read(&self, physical: &Path) -> bool {
        read_magic::<8>(physical)
            .map(|magic| &magic == MAGIC)
            .unwrap_or(false)
    }

    fn enumerate(
        &self,
        physical: &Path,
        prefix: &VirtualPath,
    ) -> Result<EnumerateResult, VfsError> {
        let mut scanner = PackScanner::open(physical)?;
        let mut directories = BTreeSet::new();
        let mut files = Vec::new();

        while let Some(entry) = scanner.next()? {
            let mut virtual_path = prefix.clone();
            for segment in entry.path.split(['/', '\\']).filter(|s| !s.is_empty()) {
                directories.insert(virtual_path.clone());
                virtual_path = virtual_path.join(segment)?;
            }

            if entry.flags & FLAG_DIRECTORY != 0 {
                directories.insert(virtual_path);
                continue;
            }

            let compressed = entry.flags & FLAG_COMPRESSED != 0;
            if !compressed && entry.stored_length != entry.length {
                return Err(corrupt(
                    physical,
                    format!(
                        "stored entry \"{}\" declares mismatched sizes",
                        entry.path
                    ),
                ));
            }

            let name = virtual_path
                .file_name()
                .ok_or_else(|| corrupt(physical, "entry with an empty path"))?
                .to_owned();

            files.push(PhysicalEntryInfo {
                name,
                virtual_path,
                physical_path: physical.to_path_buf(),
                offset: entry.data_offset,
                length: entry.length,
                compressed_length: compressed.then_some(entry.stored_length),
                created: entry.created,
                modified: entry.modified,
                is_encrypted: entry.flags & FLAG_ENCRYPTED != 0,
            });
        }

        directories.remove(prefix);

        Ok(EnumerateResult {
            directories: directories.into_iter().collect(),
            files,
        })
    }

    fn open_stream(&self, entry: &PhysicalEntryInfo) -> Result<Box<dyn ProviderStream>, VfsError> {
        if entry.is_encrypted {
            return Err(VfsError::NotSupported("encrypted archive entries"));
        }
        match entry.compressed_length {
            None => {
                let stream =
                    FileRegionStream::open(&entry.physical_path, entry.offset, entry.length)?;
                Ok(Box::new(stream))
            }
            Some(stored_length) => Ok(Box::new(ZstdEntryStream::open(
                entry.physical_path.clone(),
                entry.offset,
                stored_length,
                entry.length,
            )?)),
        }
    }
}

/// Forward-only reader over one zstd-compressed entry.
///
/// Zstd frames decompress front to back; `restart` re-opens the frame at
/// the entry's start rather than trusting the decoder to rewind.
struct ZstdEntryStream {
    physical: PathBuf,
    base: u64,
    stored_length: u64,
    length: u64,
    decoder: zstd::stream::read::Decoder<'static, BufReader<io::Take<File>>>,
}

impl ZstdEntryStream {
    fn open(
        physical: PathBuf,
        base: u64,
        stored_length: u64,
        length: u64,
    ) -> Result<Self, VfsError> {
        let decoder = Self::new_decoder(&physical, base, stored_length)?;
        Ok(Self {
            physical,
            base,
            stored_length,
            length,
            decoder,
        })
    }

    fn new_decoder(
        physical: &Path,
        base: u64,
        stored_length: u64,
    ) -> Result<zstd::stream::read::Decoder<'static, BufReader<io::Take<File>>>, VfsError> {
        let mut file = File::open(physical)?;
        file.seek(SeekFrom::Start(base))?;
        Ok(zstd::stream::read::Decoder::new(file.take(stored_length))?)
    }
}

impl Read for ZstdEntryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf)
    }
}

impl ProviderStream for ZstdEntryStream {
    fn len(&self) -> u64 {
        self.length
    }

    fn is_random_access(&self) -> bool {
        false
    }

    fn seek_to(&mut self, _offset: u64) -> Result<(), VfsError> {
        Err(VfsError::NotSupported("seeking a compressed entry"))
    }

    fn restart(&mut self) -> Result<(), VfsError> {
        self.decoder = Self::new_decoder(&self.physical, self.base, self.stored_length)?;
        Ok(())
    }
}

fn corrupt(physical: &Path, reason: impl Into<String>) -> VfsError {
    VfsError::CorruptArchive {
        path: physical.display().to_string(),
        reason: reason.into(),
    }
}

fn u64_at(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Zero means "not recorded".
fn unix_seconds(seconds: u64) -> Option<SystemTime> {
    (seconds != 0).then(|| UNIX_EPOCH + Duration::from_secs(seconds))
}
