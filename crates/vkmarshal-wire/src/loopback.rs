//! Encoder and decoder joined in-process. Each call holds the encoder lock
//! for its whole round trip so responses pair with their packets.

use parking_lot::{Mutex, MutexGuard};

use crate::decoder::{Decoder, HostDriver};
use crate::encoder::{CallResult, Encoder, Transport};
use crate::error::WireError;
use crate::packet::PacketHeader;
use crate::value::Fields;

pub struct Loopback<'r, D> {
    encoder: Mutex<Encoder<'r>>,
    decoder: Mutex<Decoder<'r, D>>,
}

impl<'r, D: HostDriver> Loopback<'r, D> {
    pub fn new(encoder: Encoder<'r>, decoder: Decoder<'r, D>) -> Self {
        Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
        }
    }

    pub fn call(&self, name: &str, params: Fields) -> Result<CallResult, WireError> {
        let encoder = self.encoder.lock();
        encoder.call(self, name, params)
    }

    pub fn encoder(&self) -> MutexGuard<'_, Encoder<'r>> {
        self.encoder.lock()
    }

    pub fn decoder(&self) -> MutexGuard<'_, Decoder<'r, D>> {
        self.decoder.lock()
    }
}

impl<D: HostDriver> Transport for Loopback<'_, D> {
    fn round_trip(&self, packet: &[u8]) -> Result<Vec<u8>, WireError> {
        let mut response = Vec::new();
        let consumed = self.decoder.lock().decode(packet, &mut response)?;
        if consumed < packet.len() {
            let header = PacketHeader::parse(packet)?;
            return Err(WireError::UnknownOpcode(header.opcode));
        }
        Ok(response)
    }
}
