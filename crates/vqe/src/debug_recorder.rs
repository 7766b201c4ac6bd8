//! Binary trace of everything the engine is fed.
//!
//! A trace starts with the magic line `#!vqetrace1.2\n` followed by records.
//! All integers are little-endian:
//!
//! ```text
//! Initialize: u8 0 | i32 sample_rate_hz
//! Render:     u8 1 | u32 sample_rate_hz | u8 channels | u16 samples_per_channel | i16 × channels × samples
//! Capture:    u8 2 | same layout as Render
//! ```
//!
//! [`TraceReader`] parses a trace back into [`TraceEvent`]s.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use tracing::{debug, error};

use crate::audio_frame::AudioFrame;
use crate::Error;

/// First bytes of every trace.
pub const TRACE_MAGIC: &[u8] = b"#!vqetrace1.2\n";

const INITIALIZE_TAG: u8 = 0;
const RENDER_TAG: u8 = 1;
const CAPTURE_TAG: u8 = 2;

/// Which stream a frame record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamDirection {
    Render,
    Capture,
}

impl StreamDirection {
    fn tag(self) -> u8 {
        match self {
            Self::Render => RENDER_TAG,
            Self::Capture => CAPTURE_TAG,
        }
    }
}

/// Writes trace records to an optional sink.
#[derive(derive_more::Debug, Default)]
pub(crate) struct DebugRecorder {
    #[debug(skip)]
    sink: Option<Box<dyn Write + Send>>,
    #[debug(skip)]
    scratch: Vec<u8>,
}

impl DebugRecorder {
    pub(crate) fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Opens `path` for writing, replacing any open trace.
    pub(crate) fn start_file(&mut self, path: &Path, sample_rate_hz: u32) -> Result<(), Error> {
        self.stop()?;
        let file = File::create(path).map_err(|err| {
            error!(path = %path.display(), %err, "failed to open debug trace");
            Error::File
        })?;
        debug!(path = %path.display(), "debug recording started");
        self.start(Box::new(file), sample_rate_hz)
    }

    /// Starts tracing into `sink`, replacing any open trace.
    ///
    /// Writes the magic line and one Initialize record. On failure the sink
    /// is dropped and [`Error::File`] returned.
    pub(crate) fn start(
        &mut self,
        mut sink: Box<dyn Write + Send>,
        sample_rate_hz: u32,
    ) -> Result<(), Error> {
        self.stop()?;
        if let Err(err) = sink.write_all(TRACE_MAGIC) {
            error!(%err, "failed to write debug trace header");
            return Err(Error::File);
        }
        self.sink = Some(sink);
        self.record_initialize(sample_rate_hz)
    }

    /// Flushes and closes the trace. No-op when none is open.
    pub(crate) fn stop(&mut self) -> Result<(), Error> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        sink.flush().map_err(|err| {
            error!(%err, "failed to flush debug trace");
            Error::File
        })?;
        debug!("debug recording stopped");
        Ok(())
    }

    fn record_initialize(&mut self, sample_rate_hz: u32) -> Result<(), Error> {
        if self.sink.is_none() {
            return Ok(());
        }
        self.scratch.clear();
        self.scratch.push(INITIALIZE_TAG);
        self.scratch
            .extend_from_slice(&(sample_rate_hz as i32).to_le_bytes());
        self.flush_record()
    }

    /// Appends one frame record.
    pub(crate) fn record_frame(
        &mut self,
        direction: StreamDirection,
        frame: &AudioFrame,
    ) -> Result<(), Error> {
        if self.sink.is_none() {
            return Ok(());
        }
        let channels = u8::try_from(frame.num_channels()).map_err(|_| Error::BadNumberChannels)?;
        let samples =
            u16::try_from(frame.samples_per_channel()).map_err(|_| Error::BadDataLength)?;

        self.scratch.clear();
        self.scratch.reserve(8 + 2 * frame.data().len());
        self.scratch.push(direction.tag());
        self.scratch
            .extend_from_slice(&frame.sample_rate_hz().to_le_bytes());
        self.scratch.push(channels);
        self.scratch.extend_from_slice(&samples.to_le_bytes());
        for sample in frame.data() {
            self.scratch.extend_from_slice(&sample.to_le_bytes());
        }
        self.flush_record()
    }

    fn flush_record(&mut self) -> Result<(), Error> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        sink.write_all(&self.scratch).map_err(|err| {
            error!(%err, "failed to write debug trace record");
            Error::File
        })
    }
}

/// Error produced while reading a trace.
#[derive(Debug)]
pub enum TraceError {
    /// The underlying reader failed.
    Io(io::Error),
    /// The stream does not start with [`TRACE_MAGIC`].
    BadMagic,
    /// A record starts with an unknown event tag.
    UnknownEvent(u8),
    /// The stream ended in the middle of a record.
    Truncated,
    /// A frame record describes an impossible layout.
    InvalidFrame,
}

impl std::fmt::Display for TraceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "trace read failed: {err}"),
            Self::BadMagic => f.write_str("not a vqe trace"),
            Self::UnknownEvent(tag) => write!(f, "unknown trace event {tag}"),
            Self::Truncated => f.write_str("trace ends mid-record"),
            Self::InvalidFrame => f.write_str("trace frame has zero channels"),
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TraceError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(err)
        }
    }
}

/// One decoded trace record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// The engine was (re)initialized at this rate.
    Initialize { sample_rate_hz: i32 },
    /// A far-end frame as passed to `analyze_reverse_stream`.
    Render(AudioFrame),
    /// A near-end frame as passed to `process_stream`, before processing.
    Capture(AudioFrame),
}

/// Streaming trace parser.
///
/// ```
/// use vqe::debug_recorder::{TraceEvent, TraceReader};
///
/// let bytes = b"#!vqetrace1.2\n\x00\x80\x3e\x00\x00";
/// let mut reader = TraceReader::new(&bytes[..])?;
/// assert_eq!(
///     reader.next().transpose()?,
///     Some(TraceEvent::Initialize { sample_rate_hz: 16_000 })
/// );
/// assert!(reader.next().is_none());
/// # Ok::<(), vqe::debug_recorder::TraceError>(())
/// ```
#[derive(Debug)]
pub struct TraceReader<R> {
    reader: R,
    failed: bool,
}

impl<R: Read> TraceReader<R> {
    /// Checks the magic line and positions the reader on the first record.
    pub fn new(mut reader: R) -> Result<Self, TraceError> {
        let mut magic = [0u8; TRACE_MAGIC.len()];
        match reader.read_exact(&mut magic) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(TraceError::BadMagic);
            }
            Err(err) => return Err(TraceError::Io(err)),
        }
        if magic != TRACE_MAGIC {
            return Err(TraceError::BadMagic);
        }
        Ok(Self {
            reader,
            failed: false,
        })
    }

    /// Reads the next record; `Ok(None)` at a clean end of stream.
    pub fn read_event(&mut self) -> Result<Option<TraceEvent>, TraceError> {
        let mut tag = [0u8; 1];
        loop {
            match self.reader.read(&mut tag) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(TraceError::Io(err)),
            }
        }

        match tag[0] {
            INITIALIZE_TAG => {
                let mut rate = [0u8; 4];
                self.reader.read_exact(&mut rate)?;
                Ok(Some(TraceEvent::Initialize {
                    sample_rate_hz: i32::from_le_bytes(rate),
                }))
            }
            RENDER_TAG => Ok(Some(TraceEvent::Render(self.read_frame()?))),
            CAPTURE_TAG => Ok(Some(TraceEvent::Capture(self.read_frame()?))),
            other => Err(TraceError::UnknownEvent(other)),
        }
    }

    fn read_frame(&mut self) -> Result<AudioFrame, TraceError> {
        let mut header = [0u8; 7];
        self.reader.read_exact(&mut header)?;
        let sample_rate_hz = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let num_channels = usize::from(header[4]);
        let samples_per_channel = usize::from(u16::from_le_bytes([header[5], header[6]]));
        if num_channels == 0 {
            return Err(TraceError::InvalidFrame);
        }

        let mut payload = vec![0u8; 2 * num_channels * samples_per_channel];
        self.reader.read_exact(&mut payload)?;
        let data = payload
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        AudioFrame::from_interleaved(sample_rate_hz, num_channels, data)
            .map_err(|_| TraceError::InvalidFrame)
    }
}

impl<R: Read> Iterator for TraceReader<R> {
    type Item = Result<TraceEvent, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let event = self.read_event().transpose();
        if matches!(event, Some(Err(_))) {
            self.failed = true;
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// In-memory sink whose contents stay reachable after the recorder
    /// takes ownership.
    #[derive(Debug, Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn start_writes_magic_and_initialize() {
        let sink = SharedSink::default();
        let mut recorder = DebugRecorder::default();
        recorder.start(Box::new(sink.clone()), 32_000).unwrap();

        let bytes = sink.0.lock().clone();
        assert_eq!(&bytes[..TRACE_MAGIC.len()], TRACE_MAGIC);
        assert_eq!(bytes[TRACE_MAGIC.len()], INITIALIZE_TAG);
        assert_eq!(&bytes[TRACE_MAGIC.len() + 1..], &32_000i32.to_le_bytes());
    }

    #[test]
    fn frame_record_layout() {
        let sink = SharedSink::default();
        let mut recorder = DebugRecorder::default();
        recorder.start(Box::new(sink.clone()), 8_000).unwrap();
        sink.0.lock().clear();

        let frame = AudioFrame::from_interleaved(8_000, 2, vec![1, -2, 3, -4]).unwrap();
        recorder
            .record_frame(StreamDirection::Capture, &frame)
            .unwrap();

        let bytes = sink.0.lock().clone();
        let mut expected = vec![CAPTURE_TAG];
        expected.extend_from_slice(&8_000u32.to_le_bytes());
        expected.push(2);
        expected.extend_from_slice(&2u16.to_le_bytes());
        for s in [1i16, -2, 3, -4] {
            expected.extend_from_slice(&s.to_le_bytes());
        }
        assert_eq!(bytes, expected);
    }

    #[test]
    fn closed_recorder_writes_nothing() {
        let mut recorder = DebugRecorder::default();
        let frame = AudioFrame::new(16_000, 1, 160);
        assert_eq!(recorder.record_frame(StreamDirection::Render, &frame), Ok(()));
        assert_eq!(recorder.stop(), Ok(()));
        assert!(!recorder.is_open());
    }

    #[test]
    fn failing_sink_reports_file_error() {
        let mut recorder = DebugRecorder::default();
        assert_eq!(recorder.start(Box::new(FailingSink), 16_000), Err(Error::File));
        assert!(!recorder.is_open());
    }

    #[test]
    fn reader_roundtrips_recorded_events() {
        let sink = SharedSink::default();
        let mut recorder = DebugRecorder::default();
        recorder.start(Box::new(sink.clone()), 16_000).unwrap();
        let render = AudioFrame::from_interleaved(16_000, 1, (0..160).collect()).unwrap();
        let capture = AudioFrame::from_interleaved(16_000, 2, (0..320).map(|i| -i).collect()).unwrap();
        recorder.record_frame(StreamDirection::Render, &render).unwrap();
        recorder.record_frame(StreamDirection::Capture, &capture).unwrap();
        recorder.stop().unwrap();

        let bytes = sink.0.lock().clone();
        let events: Vec<_> = TraceReader::new(bytes.as_slice())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            events,
            vec![
                TraceEvent::Initialize {
                    sample_rate_hz: 16_000
                },
                TraceEvent::Render(render),
                TraceEvent::Capture(capture),
            ]
        );
    }

    #[test]
    fn reader_rejects_bad_magic() {
        assert!(matches!(
            TraceReader::new(&b"#!vqetrace1.1\n"[..]),
            Err(TraceError::BadMagic)
        ));
        assert!(matches!(TraceReader::new(&b"#!"[..]), Err(TraceError::BadMagic)));
    }

    #[test]
    fn reader_reports_truncation_and_unknown_tags() {
        let mut bytes = TRACE_MAGIC.to_vec();
        bytes.extend_from_slice(&[CAPTURE_TAG, 0x80, 0x3e]);
        let mut reader = TraceReader::new(bytes.as_slice()).unwrap();
        assert!(matches!(reader.next(), Some(Err(TraceError::Truncated))));
        assert!(reader.next().is_none());

        let mut bytes = TRACE_MAGIC.to_vec();
        bytes.push(7);
        let mut reader = TraceReader::new(bytes.as_slice()).unwrap();
        assert!(matches!(reader.next(), Some(Err(TraceError::UnknownEvent(7)))));
    }
}
