//! Debug trace files written by the engine and read back with `TraceReader`.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use vqe::debug_recorder::{TRACE_MAGIC, TraceEvent, TraceReader};
use vqe::{AudioFrame, AudioProcessing, Error};

fn trace_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("vqe-{}-{name}.trace", std::process::id()))
}

fn read_events(path: &PathBuf) -> Vec<TraceEvent> {
    let reader = TraceReader::new(BufReader::new(File::open(path).unwrap())).unwrap();
    reader.collect::<Result<_, _>>().unwrap()
}

#[test]
fn records_inputs_in_call_order() {
    let path = trace_path("session");
    let apm = AudioProcessing::create(0).unwrap();
    apm.noise_suppression().enable(true).unwrap();
    apm.start_debug_recording(&path).unwrap();
    assert!(apm.is_debug_recording());

    let render = AudioFrame::from_interleaved(16_000, 1, vec![7; 160]).unwrap();
    apm.analyze_reverse_stream(&render).unwrap();
    let capture_in = AudioFrame::from_interleaved(16_000, 1, (0..160).collect()).unwrap();
    let mut capture = capture_in.clone();
    apm.process_stream(&mut capture).unwrap();

    // Rejected frames are not recorded.
    let mut wrong = AudioFrame::new(8_000, 1, 80);
    assert_eq!(apm.process_stream(&mut wrong), Err(Error::BadSampleRate));

    apm.set_sample_rate_hz(8_000).unwrap();
    apm.stop_debug_recording().unwrap();
    assert!(!apm.is_debug_recording());

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(TRACE_MAGIC));

    let events = read_events(&path);
    assert_eq!(
        events,
        vec![
            TraceEvent::Initialize { sample_rate_hz: 16_000 },
            TraceEvent::Render(render),
            TraceEvent::Capture(capture_in),
        ]
    );
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn restarting_replaces_the_open_trace() {
    let first = trace_path("first");
    let second = trace_path("second");
    let apm = AudioProcessing::create(0).unwrap();

    apm.start_debug_recording(&first).unwrap();
    apm.process_stream(&mut AudioFrame::new(16_000, 1, 160)).unwrap();
    apm.start_debug_recording(&second).unwrap();
    apm.process_stream(&mut AudioFrame::new(16_000, 1, 160)).unwrap();
    drop(apm);

    assert_eq!(read_events(&first).len(), 2);
    let events = read_events(&second);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], TraceEvent::Capture(_)));

    std::fs::remove_file(&first).unwrap();
    std::fs::remove_file(&second).unwrap();
}

#[test]
fn unopenable_path_is_a_file_error() {
    let apm = AudioProcessing::create(0).unwrap();
    let path = std::env::temp_dir().join("vqe-missing-dir").join("nested").join("x.trace");
    assert_eq!(apm.start_debug_recording(&path), Err(Error::File));
    assert!(!apm.is_debug_recording());
    assert_eq!(apm.stop_debug_recording(), Ok(()));
}

#[test]
fn stereo_frames_keep_their_layout() {
    let apm = AudioProcessing::builder()
        .sample_rate_hz(8_000)
        .num_channels(2, 1)
        .num_reverse_channels(2)
        .build()
        .unwrap();
    let path = trace_path("stereo");
    apm.start_debug_recording(&path).unwrap();

    let data: Vec<i16> = (0..160).map(|i| i as i16 - 80).collect();
    let input = AudioFrame::from_interleaved(8_000, 2, data).unwrap();
    let mut frame = input.clone();
    apm.process_stream(&mut frame).unwrap();
    assert_eq!(frame.num_channels(), 1);
    apm.stop_debug_recording().unwrap();

    let events = read_events(&path);
    let TraceEvent::Capture(recorded) = &events[1] else {
        panic!("expected a capture record, got {:?}", events[1]);
    };
    assert_eq!(recorded, &input);
    std::fs::remove_file(&path).unwrap();
}

#[derive(Clone, Default)]
struct SharedSink(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn records_into_any_writer() {
    let sink = SharedSink::default();
    let apm = AudioProcessing::builder().sample_rate_hz(32_000).build().unwrap();
    apm.start_debug_recording_to(sink.clone()).unwrap();

    let frame = AudioFrame::from_interleaved(32_000, 1, vec![-3; 320]).unwrap();
    apm.analyze_reverse_stream(&frame).unwrap();
    apm.stop_debug_recording().unwrap();

    let bytes = sink.0.lock().clone();
    let events: Vec<_> = TraceReader::new(bytes.as_slice())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        events,
        vec![
            TraceEvent::Initialize { sample_rate_hz: 32_000 },
            TraceEvent::Render(frame),
        ]
    );
}

/// Accepts the header and initial record, then fails every later write.
#[derive(Clone, Default)]
struct BreakingSink(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl BreakingSink {
    fn break_now(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

impl std::io::Write for BreakingSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.0.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(std::io::Error::other("sink gone"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn reconfiguring_while_recording_ignores_the_sink() {
    let sink = BreakingSink::default();
    let apm = AudioProcessing::create(0).unwrap();
    apm.start_debug_recording_to(sink.clone()).unwrap();
    sink.break_now();

    assert_eq!(apm.set_sample_rate_hz(8_000), Ok(()));
    assert_eq!(apm.sample_rate_hz(), 8_000);
    assert_eq!(apm.set_num_channels(2, 1), Ok(()));
    assert_eq!(apm.set_num_reverse_channels(2), Ok(()));
    assert_eq!(apm.initialize(), Ok(()));
    assert!(apm.is_debug_recording());
}

#[test]
fn failed_trace_write_leaves_frames_untouched() {
    let sink = BreakingSink::default();
    let apm = AudioProcessing::create(0).unwrap();
    apm.noise_suppression().enable(true).unwrap();
    apm.high_pass_filter().enable(true).unwrap();
    apm.start_debug_recording_to(sink.clone()).unwrap();
    sink.break_now();

    let data: Vec<i16> = (0..160).map(|i| (i * 97 % 2000) as i16 - 1000).collect();
    let input = AudioFrame::from_interleaved(16_000, 1, data).unwrap();
    let mut capture = input.clone();
    assert_eq!(apm.process_stream(&mut capture), Err(Error::File));
    assert_eq!(capture, input);

    apm.set_stream_delay_ms(10).unwrap();
    assert_eq!(apm.analyze_reverse_stream(&input), Err(Error::File));
    assert!(apm.was_stream_delay_set());
}
