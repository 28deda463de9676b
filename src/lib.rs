pub mod error;
pub mod header;
pub mod index;
pub mod codec;
pub mod block;
pub mod io_stream;
pub mod perf;
pub mod policy;
pub mod convert;
pub mod batch;

pub use error::{Error, Result};
pub use header::{ContainerKind, Header};
pub use codec::{get_codec, BlockCodec};
pub use io_stream::{ContainerReader, ContainerWriter};
pub use convert::{decode, encode, inspect, EncodeOptions, Stats};
pub use policy::SectorTable;
