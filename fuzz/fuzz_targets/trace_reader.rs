#![no_main]

use libfuzzer_sys::fuzz_target;
use vqe::debug_recorder::{TRACE_MAGIC, TraceReader};

fuzz_target!(|data: &[u8]| {
    let mut trace = TRACE_MAGIC.to_vec();
    trace.extend_from_slice(data);
    let Ok(reader) = TraceReader::new(trace.as_slice()) else {
        return;
    };
    for event in reader {
        if event.is_err() {
            break;
        }
    }
});
