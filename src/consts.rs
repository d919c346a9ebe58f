//! Общие константы формата файла (meta, pages, elements, free-list).

/// Page id type used across the crate.
pub type Pgid = u64;

// -------- Meta --------
pub const META_MAGIC: u32 = 0xED0C_DAED;
pub const META_VERSION: u32 = 2;

/// Meta pages always live at ids 0 and 1.
pub const META_PAGE_0: Pgid = 0;
pub const META_PAGE_1: Pgid = 1;

/// First page id a page-scoped check may start from.
pub const MIN_USER_PGID: Pgid = 2;

/// Sentinel in meta.freelist: "no free-list page".
pub const PGID_NO_FREELIST: Pgid = u64::MAX;

// -------- Page size --------
pub const MIN_PAGE_SIZE: u32 = 1024;
pub const MAX_PAGE_SIZE: u32 = 64 * 1024;
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

// -------- Page header --------
// [id u64][flags u16][count u16][overflow u32]
pub const PAGE_HEADER_SIZE: usize = 16;
pub const OFF_PAGE_ID: usize = 0;
pub const OFF_PAGE_FLAGS: usize = 8;
pub const OFF_PAGE_COUNT: usize = 10;
pub const OFF_PAGE_OVERFLOW: usize = 12;

pub const PAGE_FLAG_BRANCH: u16 = 0x01;
pub const PAGE_FLAG_LEAF: u16 = 0x02;
pub const PAGE_FLAG_META: u16 = 0x04;
pub const PAGE_FLAG_FREELIST: u16 = 0x10;

// -------- Meta body (starts right after the page header) --------
// [magic u32][version u32][page_size u32][flags u32]
// [root u64][freelist u64][pgid u64][txid u64][checksum u32]
pub const META_OFF_MAGIC: usize = PAGE_HEADER_SIZE;
pub const META_OFF_VERSION: usize = PAGE_HEADER_SIZE + 4;
pub const META_OFF_PAGE_SIZE: usize = PAGE_HEADER_SIZE + 8;
pub const META_OFF_FLAGS: usize = PAGE_HEADER_SIZE + 12;
pub const META_OFF_ROOT: usize = PAGE_HEADER_SIZE + 16;
pub const META_OFF_FREELIST: usize = PAGE_HEADER_SIZE + 24;
pub const META_OFF_PGID: usize = PAGE_HEADER_SIZE + 32;
pub const META_OFF_TXID: usize = PAGE_HEADER_SIZE + 40;
pub const META_OFF_CHECKSUM: usize = PAGE_HEADER_SIZE + 48;
/// Bytes covered by the meta checksum.
pub const META_CHECKSUM_SPAN: usize = 48;
pub const META_END: usize = META_OFF_CHECKSUM + 4;

// -------- Elements --------
// branch: [pos u32][ksize u32][pgid u64]
// leaf:   [flags u32][pos u32][ksize u32][vsize u32]
pub const BRANCH_ELEM_SIZE: usize = 16;
pub const LEAF_ELEM_SIZE: usize = 16;

/// Leaf element flag: value is a nested bucket header.
pub const LEAF_FLAG_BUCKET: u32 = 0x01;
/// Nested bucket header: [root u64][sequence u64].
pub const BUCKET_HEADER_SIZE: usize = 16;

// -------- Free-list --------
/// count == 0xFFFF: the real count is stored in the first u64 after the header.
pub const FREELIST_COUNT_OVERFLOW: u16 = 0xFFFF;
