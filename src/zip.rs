use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use flate2::read::DeflateDecoder;

use crate::error::VfsError;
use crate::path::VirtualPath;
use crate::provider::{
    EnumerateResult, PhysicalEntryInfo, Provider, ProviderExtension, ProviderStream,
};
use crate::stream::FileRegionStream;

/// Magic signature of a local entry record, `PK\x03\x04`.
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
/// Fixed portion of a local entry record, signature included.
const LOCAL_HEADER_LEN: usize = 30;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

/// General-purpose flag: the entry content is encrypted.
const FLAG_ENCRYPTED: u16 = 1 << 0;
/// General-purpose flag: sizes live in a trailing data descriptor.
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Provider for zip containers.
///
/// Enumeration is a sequential scan over local entry records from the
/// start of the container — no central directory index is assumed, so
/// archives produced by streaming writers (whose entries defer their sizes
/// to data descriptors) are rejected. Stored entries stream directly from
/// the container; deflated entries decompress forward-only, with backward
/// seeks serviced by the stream adapter re-opening the entry.
pub struct ZipProvider {
    extensions: [ProviderExtension; 1],
}

impl ZipProvider {
    pub fn new() -> Self {
        Self {
            extensions: [ProviderExtension::new("zip", "Zip archive")],
        }
    }
}

impl Default for ZipProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// One parsed local entry record.
struct LocalEntry {
    name: String,
    flags: u16,
    method: u16,
    modified: Option<SystemTime>,
    compressed_size: u64,
    uncompressed_size: u64,
    /// Offset of the entry content within the container.
    data_offset: u64,
}

/// Sequential scanner over a container's local entry records.
///
/// Lazily yields one record per `next()` call and skips over entry
/// content; parsing is decoupled from any tree mutation so a failure
/// partway leaves nothing to roll back.
struct EntryScanner<'a> {
    reader: io::BufReader<File>,
    physical: &'a Path,
}

impl<'a> EntryScanner<'a> {
    fn open(physical: &'a Path) -> Result<Self, VfsError> {
        let file = File::open(physical)?;
        Ok(Self {
            reader: io::BufReader::new(file),
            physical,
        })
    }

    fn corrupt(&self, reason: impl Into<String>) -> VfsError {
        VfsError::CorruptArchive {
            path: self.physical.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Parse the next local entry record, or `None` once the entry table
    /// ends (central directory or end-of-archive marker).
    fn next(&mut self) -> Result<Option<LocalEntry>, VfsError> {
        let mut header = [0u8; LOCAL_HEADER_LEN];
        match self.reader.read_exact(&mut header[..4]) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        }

        if u32_at(&header, 0) != LOCAL_HEADER_SIGNATURE {
            // First record past the entries: the central directory.
            return Ok(None);
        }

        self.reader
            .read_exact(&mut header[4..])
            .map_err(|_| self.corrupt("truncated local entry header"))?;

        let flags = u16_at(&header, 6);
        let method = u16_at(&header, 8);
        let dos_time = u16_at(&header, 10);
        let dos_date = u16_at(&header, 12);
        let compressed_size = u32_at(&header, 18) as u64;
        let uncompressed_size = u32_at(&header, 22) as u64;
        let name_len = u16_at(&header, 26) as usize;
        let extra_len = u16_at(&header, 28) as usize;

        if flags & FLAG_DATA_DESCRIPTOR != 0 {
            return Err(self.corrupt(
                "entry defers its sizes to a data descriptor; \
                 a sequential scan cannot skip its content",
            ));
        }

        let mut name_bytes = vec![0u8; name_len];
        self.reader
            .read_exact(&mut name_bytes)
            .map_err(|_| self.corrupt("truncated entry name"))?;
        let name = String::from_utf8(name_bytes)
            .map_err(|_| self.corrupt("entry name is not valid UTF-8"))?;

        self.reader
            .seek_relative(extra_len as i64)
            .map_err(|_| self.corrupt("truncated extra field"))?;

        let data_offset = self.reader.stream_position()?;

        // Skip the content; the next record starts right after it.
        self.reader
            .seek(SeekFrom::Start(data_offset + compressed_size))
            .map_err(|_| self.corrupt("truncated entry content"))?;

        Ok(Some(LocalEntry {
            name,
            flags,
            method,
            modified: dos_date_time(dos_date, dos_time),
            compressed_size,
            uncompressed_size,
            data_offset,
        }))
    }
}

impl Provider for ZipProvider {
    fn description(&self) -> &str {
        "Zip archive file system"
    }

    fn preferred_extensions(&self) -> &[ProviderExtension] {
        &self.extensions
    }

    fn can_read(&self, physical: &Path) -> bool {
        read_magic::<4>(physical)
            .map(|magic| u32_at(&magic, 0) == LOCAL_HEADER_SIGNATURE)
            .unwrap_or(false)
    }

    fn enumerate(
        &self,
        physical: &Path,
        prefix: &VirtualPath,
    ) -> Result<EnumerateResult, VfsError> {
        let mut scanner = EntryScanner::open(physical)?;
        let mut directories = BTreeSet::new();
        let mut files = Vec::new();

        while let Some(entry) = scanner.next()? {
            let is_directory = entry.name.ends_with('/');

            if !is_directory
                && entry.method != METHOD_STORED
                && entry.method != METHOD_DEFLATED
            {
                return Err(VfsError::CorruptArchive {
                    path: physical.display().to_string(),
                    reason: format!(
                        "entry \"{}\" uses unsupported compression method {}",
                        entry.name, entry.method
                    ),
                });
            }

            // Build the virtual path segment by segment; this also rejects
            // containers whose embedded paths attempt traversal.
            let mut virtual_path = prefix.clone();
            for segment in entry.name.split(['/', '\\']).filter(|s| !s.is_empty()) {
                directories.insert(virtual_path.clone());
                virtual_path = virtual_path.join(segment)?;
            }

            if is_directory {
                directories.insert(virtual_path);
                continue;
            }

            let name = virtual_path
                .file_name()
                .ok_or_else(|| VfsError::CorruptArchive {
                    path: physical.display().to_string(),
                    reason: "entry with an empty path".into(),
                })?
                .to_owned();

            files.push(PhysicalEntryInfo {
                name,
                virtual_path,
                physical_path: physical.to_path_buf(),
                offset: entry.data_offset,
                length: entry.uncompressed_size,
                compressed_length: (entry.method == METHOD_DEFLATED)
                    .then_some(entry.compressed_size),
                created: None,
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
            Some(compressed_length) => Ok(Box::new(DeflateEntryStream::open(
                entry.physical_path.clone(),
                entry.offset,
                compressed_length,
                entry.length,
            )?)),
        }
    }
}

/// Forward-only reader over one deflated entry.
///
/// `restart` re-opens the compressed region from the entry's start and
/// discards the old decoder; there is no way to reuse a deflate decoder's
/// position for an arbitrary seek.
struct DeflateEntryStream {
    physical: PathBuf,
    base: u64,
    compressed_length: u64,
    length: u64,
    decoder: DeflateDecoder<io::Take<File>>,
}

impl DeflateEntryStream {
    fn open(
        physical: PathBuf,
        base: u64,
        compressed_length: u64,
        length: u64,
    ) -> Result<Self, VfsError> {
        let decoder = Self::new_decoder(&physical, base, compressed_length)?;
        Ok(Self {
            physical,
            base,
            compressed_length,
            length,
            decoder,
        })
    }

    fn new_decoder(
        physical: &Path,
        base: u64,
        compressed_length: u64,
    ) -> Result<DeflateDecoder<io::Take<File>>, VfsError> {
        let mut file = File::open(physical)?;
        file.seek(SeekFrom::Start(base))?;
        Ok(DeflateDecoder::new(file.take(compressed_length)))
    }
}

impl Read for DeflateEntryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf)
    }
}

impl ProviderStream for DeflateEntryStream {
    fn len(&self) -> u64 {
        self.length
    }

    fn is_random_access(&self) -> bool {
        false
    }

    fn seek_to(&mut self, _offset: u64) -> Result<(), VfsError> {
        Err(VfsError::NotSupported("seeking a deflated entry"))
    }

    fn restart(&mut self) -> Result<(), VfsError> {
        self.decoder = Self::new_decoder(&self.physical, self.base, self.compressed_length)?;
        Ok(())
    }
}

/// Read the first `N` bytes of a file.
pub(crate) fn read_magic<const N: usize>(physical: &Path) -> io::Result<[u8; N]> {
    let mut magic = [0u8; N];
    File::open(physical)?.read_exact(&mut magic)?;
    Ok(magic)
}

fn u16_at(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Convert an MS-DOS date/time pair to a `SystemTime`.
///
/// Returns `None` for out-of-range fields (some writers emit zeroed
/// timestamps).
fn dos_date_time(date: u16, time: u16) -> Option<SystemTime> {
    let year = 1980 + i64::from(date >> 9);
    let month = u32::from((date >> 5) & 0x0f);
    let day = u32::from(date & 0x1f);
    let hour = u64::from(time >> 11);
    let minute = u64::from((time >> 5) & 0x3f);
    let second = u64::from((time & 0x1f) * 2);

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || minute > 59 {
        return None;
    }

    let days = days_from_civil(year, month, day);
    let seconds = days as u64 * 86_400 + hour * 3_600 + minute * 60 + second;
    Some(UNIX_EPOCH + Duration::from_secs(seconds))
}

/// Days since 1970-01-01 for a proleptic Gregorian date (year ≥ 1980 here,
/// so the result is always non-negative).
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let month = i64::from(month);
    let day_of_year = (153 * ((month + 9) % 12) + 2) / 5 + i64::from(day) - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}
