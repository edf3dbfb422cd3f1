pub mod ledger;
pub mod records;
pub mod writer;

pub use ledger::{Ledger, SqliteLedger};
pub use records::{encode_record, record_batch, record_key, record_schema, RECORD_EXTENSION};
pub use writer::{LocalParquetWriter, RecordWriter};
