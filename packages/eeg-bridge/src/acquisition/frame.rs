// Line-oriented sample frames
//
// Boards and bridges write one JSON document per line. Accepted shapes:
//   [1.0, 2.0, ...]
//   {"channels": [1.0, 2.0, ...], ...}
//   {"channels_data": [1.0, 2.0, ...], ...}

use crate::error::{BridgeError, BridgeResult};
use serde::Deserialize;
use std::io::{BufRead, ErrorKind};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Deserialize)]
#[serde(untagged)]
enum Frame {
    Values(Vec<f64>),
    Object {
        #[serde(alias = "channels_data")]
        channels: Vec<f64>,
    },
}

/// Parse one frame into per-channel readings
pub fn parse_frame(line: &str) -> Result<Vec<f64>, serde_json::Error> {
    let frame: Frame = serde_json::from_str(line)?;
    Ok(match frame {
        Frame::Values(values) => values,
        Frame::Object { channels } => channels,
    })
}

/// Pump newline-delimited frames from `reader` into `on_sample`
///
/// Read timeouts are treated as idle ticks used to check `cancel`; partial
/// lines survive them. Lines that are not UTF-8 or not a frame are skipped.
/// Returns `Ok(true)` on cancellation and `Ok(false)` at end of stream.
pub fn read_frames<R: BufRead>(
    reader: &mut R,
    on_sample: &mut dyn FnMut(&[f64]),
    cancel: &CancellationToken,
) -> BridgeResult<bool> {
    let mut line = Vec::new();
    let mut skipped: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Ok(true);
        }

        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return Ok(false),
            Ok(_) if line.last() != Some(&b'\n') => continue,
            Ok(_) => {
                match std::str::from_utf8(&line) {
                    Ok(text) => {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            match parse_frame(trimmed) {
                                Ok(sample) => on_sample(&sample),
                                Err(e) => {
                                    // Boards print banners and debug text on the same line
                                    skipped += 1;
                                    debug!(
                                        "Skipping unparseable frame #{}: {} ({})",
                                        skipped, e, trimmed
                                    );
                                }
                            }
                        }
                    }
                    Err(e) => {
                        // Line noise at connect or a wrong baud rate
                        skipped += 1;
                        debug!("Skipping non-UTF-8 frame #{}: {}", skipped, e);
                    }
                }
                line.clear();
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => continue,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(BridgeError::Acquisition(format!("Read failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parses_supported_shapes() {
        assert_eq!(parse_frame("[1.5, -2, 3e1]").unwrap(), vec![1.5, -2.0, 30.0]);
        assert_eq!(parse_frame(r#"{"channels": [1, 2]}"#).unwrap(), vec![1.0, 2.0]);
        assert_eq!(
            parse_frame(r#"{"channels_data": [4, 5], "id": 12}"#).unwrap(),
            vec![4.0, 5.0]
        );
        assert!(parse_frame(r#"{"values": [1]}"#).is_err());
        assert!(parse_frame("hello").is_err());
    }

    #[test]
    fn test_reads_frames_and_skips_noise() {
        let input = "[1, 2]\n\nBoard ready\n{\"channels\": [3, 4]}\n[5, 6]";
        let mut reader = Cursor::new(input.as_bytes());
        let mut samples = Vec::new();

        let cancelled = read_frames(
            &mut reader,
            &mut |s: &[f64]| samples.push(s.to_vec()),
            &CancellationToken::new(),
        )
        .unwrap();

        assert!(!cancelled);
        // Trailing frame without a newline is incomplete and dropped at EOF
        assert_eq!(samples, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_skips_invalid_utf8_lines() {
        let mut reader = Cursor::new(&b"\xff\xfe garbage\n[1, 2]\n\x80[9]\n[3, 4]\n"[..]);
        let mut samples = Vec::new();

        let cancelled = read_frames(
            &mut reader,
            &mut |s: &[f64]| samples.push(s.to_vec()),
            &CancellationToken::new(),
        )
        .unwrap();

        assert!(!cancelled);
        assert_eq!(samples, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    /// Yields its chunks one read at a time, timing out in between
    struct Choppy {
        chunks: Vec<&'static [u8]>,
        pos: usize,
        timed_out: bool,
    }

    impl std::io::Read for Choppy {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.timed_out {
                self.timed_out = true;
                return Err(std::io::Error::from(ErrorKind::TimedOut));
            }
            self.timed_out = false;
            let Some(chunk) = self.chunks.get(self.pos) else {
                return Ok(0);
            };
            self.pos += 1;
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_partial_line_survives_timeouts() {
        let choppy = Choppy {
            chunks: vec![b"[1, ", b"2]\n[3", b", 4]\n"],
            pos: 0,
            timed_out: false,
        };
        let mut reader = std::io::BufReader::new(choppy);
        let mut samples = Vec::new();

        read_frames(
            &mut reader,
            &mut |s: &[f64]| samples.push(s.to_vec()),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(samples, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_stops_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut reader = Cursor::new("[1]\n".as_bytes());
        let mut count = 0;

        assert!(read_frames(&mut reader, &mut |_: &[f64]| count += 1, &cancel).unwrap());
        assert_eq!(count, 0);
    }
}
