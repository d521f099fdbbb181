use std::io::{self, Read, Write};
use std::time::Duration;

use crate::Cmd;

/// What the bot says when it has finished starting up.
pub const READY_TOKEN: &str = "RDY";

/// Waits for the bot to say that it's ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handshake {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for Handshake {
    fn default() -> Self {
        Handshake {
            poll_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Handshake {
    fn attempts(&self) -> u32 {
        if self.poll_interval.is_zero() {
            return 1;
        }
        let n = self.timeout.as_nanos().div_ceil(self.poll_interval.as_nanos());
        u32::try_from(n).unwrap_or(u32::MAX).max(1)
    }

    /// Sends [`Cmd::Init`] once per poll interval until the answer contains
    /// [`READY_TOKEN`].
    ///
    /// Returns `Ok(false)` if the bot didn't answer in time. That's only
    /// advisory: the caller is free to carry on anyway.
    pub fn run<P: Read + Write>(
        &self,
        port: &mut P,
        mut sleep: impl FnMut(Duration),
    ) -> io::Result<bool> {
        let init = Cmd::Init.to_bytes();
        let mut received = String::new();
        for _ in 0..self.attempts() {
            port.write_all(&init)?;
            port.flush()?;
            sleep(self.poll_interval);

            read_available(port, &mut received)?;
            if !received.is_empty() {
                log::debug!("received from bot: {}", received.trim());
            }
            if received.contains(READY_TOKEN) {
                return Ok(true);
            }
        }
        log::warn!("timed out waiting for '{READY_TOKEN}', continuing anyway");
        Ok(false)
    }
}

fn read_available(port: &mut impl Read, into: &mut String) -> io::Result<()> {
    let mut buf = [0u8; 256];
    // Bounded, in case the other end never stops talking.
    for _ in 0..16 {
        match port.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => into.push_str(&String::from_utf8_lossy(&buf[..n])),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                break
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    // Answers each `I` with the next scripted reply.
    #[derive(Default)]
    struct FakeBot {
        written: Vec<u8>,
        replies: VecDeque<&'static str>,
        pending: Vec<u8>,
    }

    impl Write for FakeBot {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            if buf == b"I\n" {
                if let Some(reply) = self.replies.pop_front() {
                    self.pending.extend_from_slice(reply.as_bytes());
                }
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Read for FakeBot {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                return Err(io::ErrorKind::TimedOut.into());
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    #[test]
    fn ready_after_a_few_tries() {
        let mut bot = FakeBot {
            replies: ["", "booting\n", "RDY\n"].into_iter().collect(),
            ..FakeBot::default()
        };
        let mut slept = Duration::ZERO;
        let ready = Handshake::default()
            .run(&mut bot, |d| slept += d)
            .unwrap();
        assert!(ready);
        assert_eq!(bot.written, b"I\nI\nI\n");
        assert_eq!(slept, Duration::from_millis(600));
    }

    #[test]
    fn token_split_across_replies() {
        let mut bot = FakeBot {
            replies: ["R", "DY\n"].into_iter().collect(),
            ..FakeBot::default()
        };
        assert!(Handshake::default().run(&mut bot, |_| {}).unwrap());
    }

    #[test]
    fn gives_up_after_timeout() {
        let mut bot = FakeBot::default();
        let handshake = Handshake {
            poll_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(1),
        };
        assert!(!handshake.run(&mut bot, |_| {}).unwrap());
        assert_eq!(bot.written.len(), 5 * 2);
    }
}
