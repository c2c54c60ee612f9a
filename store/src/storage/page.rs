//! Fixed-size pages, the unit of I/O for index and metaroot files.

/// Page size in bytes (8KB).
pub const PAGE_SIZE: usize = 8192;

/// Page size as u64 for offset calculations.
pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// A page number within one file, starting at 0.
pub type PageId = u64;

/// Page types stored in the header of index file pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    /// Index file header (page 0 only)
    IndexHeader = 0x01,
    /// B-tree internal node
    BTreeInternal = 0x03,
    /// B-tree leaf node
    BTreeLeaf = 0x04,
}

impl TryFrom<u8> for PageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::IndexHeader),
            0x03 => Ok(Self::BTreeInternal),
            0x04 => Ok(Self::BTreeLeaf),
            _ => Err(value),
        }
    }
}

/// Header at the start of every index file page.
///
/// Layout:
/// - `page_type`: 1 byte
/// - `flags`: 1 byte
/// - `checksum`: 4 bytes (CRC32 of the page with this field zeroed)
/// - `reserved`: 2 bytes
///
/// Metaroot slots are raw pages and carry no header.
#[derive(Debug, Copy, Clone)]
pub struct PageHeader {
    pub page_type: PageType,
    pub flags: u8,
    pub checksum: u32,
}

impl PageHeader {
    /// Size of the page header in bytes.
    pub const SIZE: usize = 8;

    /// Usable space in a page after the header.
    pub const USABLE_SPACE: usize = PAGE_SIZE - Self::SIZE;

    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.page_type as u8;
        buf[1] = self.flags;
        buf[2..6].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Result<Self, PageError> {
        let page_type = PageType::try_from(bytes[0]).map_err(PageError::InvalidPageType)?;
        let checksum = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);

        Ok(Self {
            page_type,
            flags: bytes[1],
            checksum,
        })
    }
}

/// A raw page buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Create a new zeroed page.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_SIZE]),
        }
    }

    /// Create a page with a header of the given type and an empty body.
    #[must_use]
    pub fn with_type(page_type: PageType) -> Self {
        let mut page = Self::new();
        let header = PageHeader {
            page_type,
            flags: 0,
            checksum: 0,
        };
        page.write_bytes(0, &header.to_bytes());
        page
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Read a little-endian u16.
    #[must_use]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a little-endian u32.
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(buf)
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a little-endian u64.
    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[offset..offset + 8]);
        u64::from_le_bytes(buf)
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a little-endian i64.
    #[must_use]
    pub fn read_i64(&self, offset: usize) -> i64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[offset..offset + 8]);
        i64::from_le_bytes(buf)
    }

    pub fn write_i64(&mut self, offset: usize, value: i64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// CRC32 of the page with the checksum field (bytes 2-5) zeroed.
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[0..2]);
        hasher.update(&[0u8; 4]);
        hasher.update(&self.data[6..]);
        hasher.finalize()
    }

    /// Store the current checksum in the header.
    pub fn seal(&mut self) {
        let checksum = self.compute_checksum();
        self.write_u32(2, checksum);
    }

    /// Parse the header and check the stored checksum against the contents.
    pub fn verify(&self) -> Result<PageHeader, PageError> {
        let mut bytes = [0u8; PageHeader::SIZE];
        bytes.copy_from_slice(&self.data[..PageHeader::SIZE]);
        let header = PageHeader::from_bytes(bytes)?;
        let actual = self.compute_checksum();
        if header.checksum != actual {
            return Err(PageError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }
        Ok(header)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("first_16_bytes", &&self.data[..16])
            .finish_non_exhaustive()
    }
}

/// Errors related to page operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// Invalid page type byte.
    InvalidPageType(u8),
    /// Checksum mismatch.
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPageType(v) => write!(f, "invalid page type: 0x{v:02x}"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, got {actual}")
            }
        }
    }
}

impl std::error::Error for PageError {}
