//! InnoDB on-disk format engine.
//!
//! Leaf-first: [`charset`] and [`schema`] describe the table, [`page`],
//! [`page_types`], [`checksum`] and [`index`] parse raw pages,
//! [`tablespace`] supplies verified pages, [`record`], [`field_decode`] and
//! [`row`] decode records, [`lob`] reassembles off-page values and
//! [`cursor`] walks the clustered index.
//!
//! Start with [`tablespace::Tablespace`] and [`tablespace::PageReader`],
//! then open a scan with [`cursor::open_scan`].

pub mod cache;
pub mod charset;
pub mod checksum;
pub mod constants;
pub mod cursor;
pub mod field_decode;
pub mod index;
pub mod lob;
pub mod page;
pub mod page_types;
pub mod record;
pub mod row;
pub mod schema;
pub mod tablespace;
