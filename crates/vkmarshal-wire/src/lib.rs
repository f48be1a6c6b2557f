//! Reference runtime for the generated marshaling layer.
//!
//! The guest [`Encoder`] and the host [`Decoder`] walk the same type model
//! the C++ generator emits code from, so their packets match the generated
//! `marshal_*`/`unmarshal_*` functions byte for byte. [`Loopback`] joins the
//! two in-process for tests and tooling.

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod handles;
pub mod loopback;
pub mod overrides;
pub mod packet;
pub mod stream;
pub mod value;

pub use codec::{Codec, Frame};
pub use decoder::{Decoder, DecoderState, HostDriver, SnapshotHook};
pub use encoder::{CallResult, Encoder, Transport};
pub use error::WireError;
pub use handles::{HandleMapping, HandleTable, MappingMode};
pub use loopback::Loopback;
pub use overrides::{CommandOverride, MappedRegions, OverrideContext, OverrideTable, WHOLE_SIZE};
pub use packet::{frame, split_packets, PacketHeader, HEADER_SIZE};
pub use stream::{CountingStream, WireReader, WireSink, WireWriter};
pub use value::{Fields, StructValue, Value};
