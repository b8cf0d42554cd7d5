//! Length-prefixed message framing (§4.4). Purely synchronous: every send
//! and receive blocks, there is no multiplexing, and ordering on a
//! connection is strictly FIFO.

use std::io::{Read, Write};

use crate::error::ProtocolError;
use crate::message::Message;

/// Maximum accepted frame length, guarding against a corrupt or hostile
/// length prefix causing an unbounded allocation.
const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

pub struct Messenger<S> {
    socket: S,
}

impl<S> Messenger<S>
where
    S: Read + Write,
{
    pub fn new(socket: S) -> Self {
        Messenger { socket }
    }

    pub fn into_inner(self) -> S {
        self.socket
    }

    /// Send one tagged message, length-prefixed.
    pub fn send_message(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let payload = serde_json::to_vec(msg)
            .map_err(|err| ProtocolError::FrameMalformed(err.to_string()))?;
        let len = payload.len() as u32;
        self.socket.write_all(&len.to_be_bytes())?;
        self.socket.write_all(&payload)?;
        Ok(())
    }

    /// Send a raw trailing byte blob, as required immediately after a
    /// message whose `trailing_payload_len` is `Some`.
    pub fn send_bytes(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.socket.write_all(data)?;
        Ok(())
    }

    /// Receive one tagged message.
    pub fn receive_message(&mut self) -> Result<Message, ProtocolError> {
        let mut len_buf = [0u8; 4];
        self.read_exact_fatal(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameMalformed(format!(
                "frame length {} exceeds maximum {}",
                len, MAX_FRAME_LEN
            )));
        }

        let mut payload = vec![0u8; len as usize];
        self.read_exact_fatal(&mut payload)?;

        serde_json::from_slice(&payload)
            .map_err(|err| ProtocolError::FrameMalformed(err.to_string()))
    }

    /// Receive exactly `n` raw bytes, as required for any trailing payload.
    pub fn receive_bytes(&mut self, n: u64) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![0u8; n as usize];
        self.read_exact_fatal(&mut buf)?;
        Ok(buf)
    }

    fn read_exact_fatal(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        match self.socket.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ProtocolError::TransportBroken)
            }
            Err(err) => Err(err.into()),
        }
    }
}
