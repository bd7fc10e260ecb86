//! Lazy decoding of test2json output.

use std::io::{BufReader, Read};

use crate::error::CorrelateError;
use crate::event::TestEvent;

/// Decodes a stream of whitespace-separated JSON test events.
///
/// Events are produced lazily. A malformed record yields an error; callers
/// are expected to stop at the first one.
pub fn decode_events<R: Read>(
    reader: R,
) -> impl Iterator<Item = Result<TestEvent, CorrelateError>> {
    serde_json::Deserializer::from_reader(BufReader::new(reader))
        .into_iter::<TestEvent>()
        .map(|event| event.map_err(CorrelateError::Decode))
}
