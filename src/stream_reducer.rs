//! Pumping newline-delimited byte keys from a stream into a sketch driver.
//!
//! Keys are opaque byte strings, one per line; \r\n and \n terminators are
//! stripped, so DOS and UNIX inputs produce the same key sequence.

use std::io::{BufRead, Error};

use bstr::io::BufReadExt;

/// Anything that consumes a stream of opaque byte keys.
pub trait KeySink {
    fn observe_key(&mut self, key: &[u8]);
}

/// Feed every line of `stream` to `sink` as a key and hand the sink back.
pub fn drain_keys<R: BufRead, S: KeySink>(stream: R, mut sink: S) -> Result<S, Error> {
    stream.for_byte_line(|line| {
        sink.observe_key(line);
        Ok(true)
    })?;
    Ok(sink)
}
