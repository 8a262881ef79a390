//! Chain data layer: canonical index, genesis bootstrap, and the
//! import/export and census pipelines.

pub mod census;
pub mod genesis;
pub mod index;
pub mod preimages;
pub mod segments;

pub use census::{census, census_with_options, CensusAccumulator, CensusError, CensusOptions, CensusReport, NODE_DUMP_FILE_NAME};
pub use genesis::{setup_genesis, GenesisError, GenesisSpec};
pub use index::ChainIndex;
pub use preimages::{export_preimages, import_preimages, PreimageError};
pub use segments::{export_segments, import_segments, parse_export_range, ImportSummary, SegmentError};
