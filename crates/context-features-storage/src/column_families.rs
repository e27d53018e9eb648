//! RocksDB column family definitions.
//!
//! | Name | Purpose | Key Format |
//! |------|---------|------------|
//! | context_log | Full context records (JSON) | context_id |
//! | context_meta | List projections (JSON) | context_id |
//! | context_by_time | Time index, empty values | millis (8B BE) + context_id |
//! | retriever_snapshots | Retriever snapshots (JSON) | snapshot_id |

use rocksdb::{BlockBasedOptions, Cache, ColumnFamilyDescriptor, Options};

pub mod cf_names {
    pub const CONTEXT_LOG: &str = "context_log";
    pub const CONTEXT_META: &str = "context_meta";
    pub const CONTEXT_BY_TIME: &str = "context_by_time";
    pub const RETRIEVER_SNAPSHOTS: &str = "retriever_snapshots";

    pub const ALL: &[&str] = &[CONTEXT_LOG, CONTEXT_META, CONTEXT_BY_TIME, RETRIEVER_SNAPSHOTS];
}

/// Options for point-lookup column families: bloom filter plus shared cache.
fn point_lookup_options(cache: &Cache) -> Options {
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_block_cache(cache);
    block_opts.set_bloom_filter(10.0, false);
    block_opts.set_cache_index_and_filter_blocks(true);

    let mut opts = Options::default();
    opts.set_block_based_table_factory(&block_opts);
    opts
}

/// Options for the time index. Scanned in ranges only, so no bloom filter.
fn range_scan_options(cache: &Cache) -> Options {
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_block_cache(cache);

    let mut opts = Options::default();
    opts.set_block_based_table_factory(&block_opts);
    opts
}

pub fn get_column_family_descriptors(cache: &Cache) -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(cf_names::CONTEXT_LOG, point_lookup_options(cache)),
        ColumnFamilyDescriptor::new(cf_names::CONTEXT_META, point_lookup_options(cache)),
        ColumnFamilyDescriptor::new(cf_names::CONTEXT_BY_TIME, range_scan_options(cache)),
        ColumnFamilyDescriptor::new(cf_names::RETRIEVER_SNAPSHOTS, point_lookup_options(cache)),
    ]
}

