//! Response-audio playback so spoken answers come out of the default device.

use std::io::Cursor;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use crate::error::{ClientError, ClientResult};

/// Output-device handle. Construction fails on machines without an output
/// device; callers treat playback as an optional affordance.
pub struct Player {
    // Held alive for the duration of the program; dropping it kills the sink.
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl Player {
    pub fn new() -> ClientResult<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|err| ClientError::Playback(err.to_string()))?;
        Ok(Self {
            _stream: stream,
            handle,
        })
    }

    /// Decode and play a fetched audio body, returning as soon as playback is
    /// queued. Playback continues in the background until the clip ends.
    pub fn play(&self, bytes: Vec<u8>) -> ClientResult<()> {
        let sink = Sink::try_new(&self.handle)
            .map_err(|err| ClientError::Playback(err.to_string()))?;
        let source = Decoder::new(Cursor::new(bytes))
            .map_err(|err| ClientError::Playback(err.to_string()))?;
        sink.append(source);
        sink.detach();
        Ok(())
    }
}
