//! Timeout-aware receive and send loops.
//!
//! Both loops are written against [`Transport`] rather than a raw
//! descriptor so that the framing rules can be exercised without a
//! network. A connection drives them through [`RawStream`].

use super::buffer::{ReceiveBuffer, append, find};
use crate::sys::platform::{sys_recv, sys_send};
use crate::sys::{RawFd, Wait};
use crate::time::{Deadline, Timeout};

use std::io;
use std::time::Duration;

use tracing::trace;

/// One direction-agnostic byte pipe.
pub(crate) trait Transport {
    /// Receives into `buffer`. `Ok(0)` means the peer closed the stream.
    fn receive(&mut self, buffer: &mut [u8], wait: Wait) -> io::Result<usize>;

    /// Sends a prefix of `bytes`, returning how much was accepted.
    fn send(&mut self, bytes: &[u8], wait: Wait) -> io::Result<usize>;
}

/// A borrowed socket descriptor.
pub(crate) struct RawStream(pub(crate) RawFd);

impl Transport for RawStream {
    fn receive(&mut self, buffer: &mut [u8], wait: Wait) -> io::Result<usize> {
        sys_recv(self.0, buffer, wait)
    }

    fn send(&mut self, bytes: &[u8], wait: Wait) -> io::Result<usize> {
        sys_send(self.0, bytes, wait)
    }
}

/// Outcome of one [`receive`] call.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Received {
    /// The delimiter was found; the message ends with it.
    Matched(Vec<u8>),

    /// Bytes from an undelimited read.
    Data(Vec<u8>),

    /// Nothing to hand back yet. Partial delimited input stays pending.
    Nothing,

    /// The peer closed the stream. An undelimited read hands back what it
    /// gathered; a delimited one leaves its partial input pending.
    Closed(Vec<u8>),
}

/// Outcome of one [`transmit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Sent {
    pub(crate) written: usize,
    pub(crate) peer_closed: bool,
}

/// Reads from `transport`, optionally until `delimiter`.
///
/// Bytes carried over in `buffer` always come first. A delimiter already
/// sitting in the carried-over bytes is returned without touching the
/// transport. Each receive only searches the newly appended bytes plus
/// the `delimiter.len() - 1` bytes before them.
///
/// An empty delimiter reads like no delimiter at all.
pub(crate) fn receive<T: Transport>(
    transport: &mut T,
    buffer: &mut ReceiveBuffer,
    delimiter: Option<&[u8]>,
    timeout: Timeout,
    retry: Duration,
) -> io::Result<Received> {
    let delimiter = delimiter.filter(|d| !d.is_empty());

    if let Some(delim) = delimiter {
        if let Some(message) = buffer.split_pending(delim) {
            return Ok(Received::Matched(message));
        }
    }

    let mut out = buffer.take_pending();
    let deadline = Deadline::start(timeout);

    loop {
        let wait = match timeout {
            Timeout::Infinite if out.is_empty() || delimiter.is_some() => Wait::Block,
            _ => Wait::DontWait,
        };

        let capacity = buffer.capacity();
        let n = match transport.receive(buffer.scratch(), wait) {
            Ok(0) => {
                trace!(gathered = out.len(), "receive hit end of stream");
                return Ok(match delimiter {
                    Some(_) => {
                        buffer.stash(&out);
                        Received::Closed(Vec::new())
                    }
                    None => Received::Closed(out),
                });
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if delimiter.is_none() && !out.is_empty() {
                    return Ok(Received::Data(out));
                }

                match timeout {
                    Timeout::Immediate => return Ok(idle(buffer, out, delimiter)),
                    Timeout::After(_) if deadline.expired() => {
                        return Ok(idle(buffer, out, delimiter));
                    }
                    _ => deadline.pause(retry),
                }
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                buffer.stash(&out);
                return Err(e);
            }
        };

        let searched = out.len();
        append(&mut out, &buffer.scratch()[..n]);
        trace!(received = n, gathered = out.len(), "receive");

        match delimiter {
            Some(delim) => {
                let from = searched.saturating_sub(delim.len() - 1);
                if let Some(at) = find(&out[from..], delim) {
                    let end = from + at + delim.len();
                    buffer.stash(&out[end..]);
                    out.truncate(end);
                    return Ok(Received::Matched(out));
                }
            }
            // A short receive ends the burst.
            None if n < capacity => return Ok(Received::Data(out)),
            None => {}
        }

        match timeout {
            Timeout::Immediate if n < capacity => return Ok(idle(buffer, out, delimiter)),
            Timeout::After(_) if deadline.expired() => return Ok(idle(buffer, out, delimiter)),
            _ => {}
        }
    }
}

/// Result of a read that ran out of time or data.
fn idle(buffer: &mut ReceiveBuffer, out: Vec<u8>, delimiter: Option<&[u8]>) -> Received {
    if delimiter.is_some() {
        buffer.stash(&out);
        Received::Nothing
    } else if out.is_empty() {
        Received::Nothing
    } else {
        Received::Data(out)
    }
}

/// Writes `bytes` to `transport`, retrying partial sends.
///
/// A reset or broken pipe stops the loop and is reported through
/// [`Sent::peer_closed`] together with the bytes that made it out.
pub(crate) fn transmit<T: Transport>(
    transport: &mut T,
    bytes: &[u8],
    timeout: Timeout,
    retry: Duration,
) -> io::Result<Sent> {
    let deadline = Deadline::start(timeout);
    let wait = if timeout.is_infinite() {
        Wait::Block
    } else {
        Wait::DontWait
    };

    let mut written = 0;
    while written < bytes.len() {
        let stalled = match transport.send(&bytes[written..], wait) {
            Ok(0) => true,
            Ok(n) => {
                written += n;
                trace!(sent = n, written, total = bytes.len(), "send");
                false
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => false,
            Err(e) if peer_gone(&e) => {
                trace!(written, error = %e, "peer went away during send");
                return Ok(Sent {
                    written,
                    peer_closed: true,
                });
            }
            Err(e) => return Err(e),
        };

        if stalled {
            match timeout {
                Timeout::Immediate => break,
                Timeout::After(_) if deadline.expired() => break,
                _ => deadline.pause(retry),
            }
        }
    }

    Ok(Sent {
        written,
        peer_closed: false,
    })
}

fn peer_gone(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use std::collections::VecDeque;

    const RETRY: Duration = Duration::from_millis(1);

    const LINE: Option<&[u8]> = Some(b"\n".as_slice());

    #[derive(Debug, Clone)]
    enum Step {
        Data(Vec<u8>),
        Take(usize),
        WouldBlock,
        Eof,
        Fail(io::ErrorKind),
    }

    /// In-memory transport that replays a script.
    ///
    /// An exhausted receive script would block; an exhausted send script
    /// accepts everything.
    #[derive(Default)]
    struct ScriptedTransport {
        incoming: VecDeque<Step>,
        outgoing: VecDeque<Step>,
        sent: Vec<u8>,
        receives: usize,
    }

    impl ScriptedTransport {
        fn incoming(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                incoming: steps.into_iter().collect(),
                ..Self::default()
            }
        }

        fn outgoing(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                outgoing: steps.into_iter().collect(),
                ..Self::default()
            }
        }

        fn exhausted(&self) -> bool {
            self.incoming.is_empty()
        }
    }

    impl Transport for ScriptedTransport {
        fn receive(&mut self, buffer: &mut [u8], _wait: Wait) -> io::Result<usize> {
            self.receives += 1;

            match self.incoming.pop_front() {
                Some(Step::Data(mut bytes)) => {
                    let n = bytes.len().min(buffer.len());
                    buffer[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.incoming.push_front(Step::Data(bytes.split_off(n)));
                    }
                    Ok(n)
                }
                Some(Step::Eof) => Ok(0),
                Some(Step::Fail(kind)) => Err(io::Error::from(kind)),
                Some(Step::WouldBlock) | Some(Step::Take(_)) | None => {
                    Err(io::ErrorKind::WouldBlock.into())
                }
            }
        }

        fn send(&mut self, bytes: &[u8], _wait: Wait) -> io::Result<usize> {
            let n = match self.outgoing.pop_front() {
                Some(Step::Take(n)) => n.min(bytes.len()),
                Some(Step::WouldBlock) => return Err(io::ErrorKind::WouldBlock.into()),
                Some(Step::Fail(kind)) => return Err(io::Error::from(kind)),
                Some(_) | None => bytes.len(),
            };

            self.sent.extend_from_slice(&bytes[..n]);
            Ok(n)
        }
    }

    fn data(bytes: &[u8]) -> Step {
        Step::Data(bytes.to_vec())
    }

    fn receive_line(transport: &mut ScriptedTransport, buffer: &mut ReceiveBuffer) -> Received {
        receive(transport, buffer, LINE, Timeout::Immediate, RETRY).unwrap()
    }

    #[test]
    fn delimiter_split_across_receives_is_found() {
        let mut transport =
            ScriptedTransport::incoming([data(b"hello\nwor"), Step::WouldBlock, data(b"ld\n")]);
        let mut buffer = ReceiveBuffer::new(64);

        let first = receive_line(&mut transport, &mut buffer);
        assert_eq!(first, Received::Matched(b"hello\n".to_vec()));
        assert_eq!(buffer.pending_len(), 3);

        let second = receive_line(&mut transport, &mut buffer);
        assert_eq!(second, Received::Nothing);
        assert_eq!(buffer.pending_len(), 3);

        let third = receive_line(&mut transport, &mut buffer);
        assert_eq!(third, Received::Matched(b"world\n".to_vec()));
        assert!(!buffer.has_pending());
    }

    #[test]
    fn pending_match_does_not_touch_the_transport() {
        let mut transport = ScriptedTransport::incoming([data(b"a\nb\n")]);
        let mut buffer = ReceiveBuffer::new(64);

        receive_line(&mut transport, &mut buffer);
        assert_eq!(transport.receives, 1);

        let next = receive_line(&mut transport, &mut buffer);
        assert_eq!(next, Received::Matched(b"b\n".to_vec()));
        assert_eq!(transport.receives, 1);
    }

    #[test]
    fn multi_byte_delimiter_spanning_receives() {
        let mut transport =
            ScriptedTransport::incoming([data(b"GET /\r"), data(b"\n\r"), data(b"\nrest")]);
        let mut buffer = ReceiveBuffer::new(6);

        let blank_line = Some(b"\r\n\r\n".as_slice());
        let got = receive(&mut transport, &mut buffer, blank_line, Timeout::Infinite, RETRY);
        assert_eq!(got.unwrap(), Received::Matched(b"GET /\r\n\r\n".to_vec()));
        assert_eq!(buffer.take_pending(), b"rest");
    }

    #[test]
    fn plain_read_gathers_a_full_burst() {
        let mut transport = ScriptedTransport::incoming([data(b"0123456789")]);
        let mut buffer = ReceiveBuffer::new(4);

        let got = receive(&mut transport, &mut buffer, None, Timeout::Immediate, RETRY);
        assert_eq!(got.unwrap(), Received::Data(b"0123456789".to_vec()));
    }

    #[test]
    fn immediate_read_with_nothing_available() {
        let mut transport = ScriptedTransport::default();
        let mut buffer = ReceiveBuffer::new(16);

        let got = receive(&mut transport, &mut buffer, None, Timeout::Immediate, RETRY);
        assert_eq!(got.unwrap(), Received::Nothing);
        assert_eq!(transport.receives, 1);
    }

    #[test]
    fn infinite_read_retries_through_would_block() {
        let mut transport = ScriptedTransport::incoming([
            Step::WouldBlock,
            Step::WouldBlock,
            Step::Fail(io::ErrorKind::Interrupted),
            data(b"late"),
        ]);
        let mut buffer = ReceiveBuffer::new(16);

        let got = receive(&mut transport, &mut buffer, None, Timeout::Infinite, RETRY);
        assert_eq!(got.unwrap(), Received::Data(b"late".to_vec()));
    }

    #[test]
    fn timed_read_gives_up_and_keeps_partial_input() {
        let mut transport = ScriptedTransport::incoming([data(b"partial")]);
        let mut buffer = ReceiveBuffer::new(16);

        let got = receive(
            &mut transport,
            &mut buffer,
            LINE,
            Timeout::After(Duration::from_millis(20)),
            RETRY,
        );
        assert_eq!(got.unwrap(), Received::Nothing);
        assert_eq!(buffer.take_pending(), b"partial");
    }

    #[test]
    fn end_of_stream_hands_back_plain_data() {
        let mut transport = ScriptedTransport::incoming([data(b"bye"), Step::Eof]);
        let mut buffer = ReceiveBuffer::new(3);

        let got = receive(&mut transport, &mut buffer, None, Timeout::Infinite, RETRY);
        assert_eq!(got.unwrap(), Received::Closed(b"bye".to_vec()));
    }

    #[test]
    fn end_of_stream_keeps_unmatched_input_pending() {
        let mut transport = ScriptedTransport::incoming([data(b"no newline"), Step::Eof]);
        let mut buffer = ReceiveBuffer::new(64);

        let got = receive(&mut transport, &mut buffer, LINE, Timeout::Infinite, RETRY);
        assert_eq!(got.unwrap(), Received::Closed(Vec::new()));
        assert_eq!(buffer.take_pending(), b"no newline");
    }

    #[test]
    fn hard_error_keeps_received_bytes() {
        let mut transport = ScriptedTransport::incoming([
            data(b"abc"),
            Step::Fail(io::ErrorKind::ConnectionReset),
        ]);
        let mut buffer = ReceiveBuffer::new(3);

        let err = receive(&mut transport, &mut buffer, LINE, Timeout::Infinite, RETRY).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(buffer.take_pending(), b"abc");
    }

    #[test]
    fn empty_delimiter_reads_plainly() {
        let mut transport = ScriptedTransport::incoming([data(b"raw")]);
        let mut buffer = ReceiveBuffer::new(16);

        let empty = Some(b"".as_slice());
        let got = receive(&mut transport, &mut buffer, empty, Timeout::Immediate, RETRY);
        assert_eq!(got.unwrap(), Received::Data(b"raw".to_vec()));
    }

    #[test]
    fn transmit_retries_partial_sends() {
        let mut transport =
            ScriptedTransport::outgoing([Step::Take(2), Step::WouldBlock, Step::Take(1)]);

        let sent = transmit(&mut transport, b"hello", Timeout::Infinite, RETRY).unwrap();
        assert_eq!(
            sent,
            Sent {
                written: 5,
                peer_closed: false
            }
        );
        assert_eq!(transport.sent, b"hello");
    }

    #[test]
    fn immediate_transmit_stops_at_would_block() {
        let mut transport = ScriptedTransport::outgoing([Step::Take(3), Step::WouldBlock]);

        let sent = transmit(&mut transport, b"hello", Timeout::Immediate, RETRY).unwrap();
        assert_eq!(sent.written, 3);
        assert!(!sent.peer_closed);
    }

    #[test]
    fn broken_pipe_reports_peer_close() {
        let mut transport =
            ScriptedTransport::outgoing([Step::Take(1), Step::Fail(io::ErrorKind::BrokenPipe)]);

        let sent = transmit(&mut transport, b"hello", Timeout::Infinite, RETRY).unwrap();
        assert_eq!(
            sent,
            Sent {
                written: 1,
                peer_closed: true
            }
        );
    }

    #[test]
    fn other_send_errors_are_hard_failures() {
        let mut transport =
            ScriptedTransport::outgoing([Step::Fail(io::ErrorKind::PermissionDenied)]);

        let err = transmit(&mut transport, b"x", Timeout::Infinite, RETRY).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    /// Splits `input` after every delimiter, leftmost first.
    fn split_reference(input: &[u8], delimiter: &[u8]) -> (Vec<Vec<u8>>, Vec<u8>) {
        let mut messages = Vec::new();
        let mut rest = input;

        while let Some(at) = find(rest, delimiter) {
            let end = at + delimiter.len();
            messages.push(rest[..end].to_vec());
            rest = &rest[end..];
        }

        (messages, rest.to_vec())
    }

    /// Drains `chunks` through repeated immediate delimited reads.
    fn drain(chunks: Vec<Vec<u8>>, delimiter: &[u8], capacity: usize) -> (Vec<Vec<u8>>, Vec<u8>) {
        // An empty receive would read as end of stream.
        let steps = chunks
            .into_iter()
            .filter(|chunk| !chunk.is_empty())
            .flat_map(|chunk| [Step::Data(chunk), Step::WouldBlock]);
        let mut transport = ScriptedTransport::incoming(steps);
        let mut buffer = ReceiveBuffer::new(capacity);
        let mut messages = Vec::new();

        loop {
            let outcome = receive(
                &mut transport,
                &mut buffer,
                Some(delimiter),
                Timeout::Immediate,
                RETRY,
            );

            match outcome {
                Ok(Received::Matched(message)) => messages.push(message),
                Ok(Received::Nothing) if transport.exhausted() => break,
                Ok(Received::Nothing) => {}
                other => panic!("unexpected receive outcome: {other:?}"),
            }
        }

        // Flush matches still sitting in the carried-over bytes.
        while let Some(message) = buffer.split_pending(delimiter) {
            messages.push(message);
        }

        (messages, buffer.take_pending())
    }

    fn chunked(input: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
        let mut points: Vec<usize> = cuts.iter().map(|c| c % (input.len() + 1)).collect();
        points.sort_unstable();
        points.dedup();

        let mut chunks = Vec::new();
        let mut start = 0;
        for point in points.into_iter().chain([input.len()]) {
            if point > start {
                chunks.push(input[start..point].to_vec());
                start = point;
            }
        }
        chunks
    }

    proptest! {
        #[test]
        fn read_boundaries_do_not_change_framing(
            input in prop::collection::vec(
                prop::sample::select(vec![b'a', b'b', b'\n']),
                0..96,
            ),
            cuts in prop::collection::vec(any::<usize>(), 0..12),
            delimiter in prop::sample::select(vec![
                b"\n".to_vec(),
                b"ab".to_vec(),
                b"aba".to_vec(),
            ]),
            capacity in 1usize..12,
        ) {
            let whole = drain(vec![input.clone()], &delimiter, capacity);
            let split = drain(chunked(&input, &cuts), &delimiter, capacity);

            prop_assert_eq!(&split, &whole);
            prop_assert_eq!(whole, split_reference(&input, &delimiter));
        }
    }
}
