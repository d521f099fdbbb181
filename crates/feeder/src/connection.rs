use std::{
    io::{self, Write as _},
    net::{SocketAddr, TcpStream},
    time::Duration,
};

use deltabot_protocol::Handshake;

/// Somewhere to send encoded commands.
///
/// Real runs talk to the bridge over TCP; tests use in-memory channels.
pub trait Channel {
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Tries to recover after a failed send.
    fn reconnect(&mut self) -> io::Result<()>;
}

#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub addr: SocketAddr,
    pub retry_interval: Duration,
    /// How many times [`Channel::reconnect`] tries before giving up. (The
    /// initial connection keeps trying forever.)
    pub reconnect_attempts: u32,
    pub handshake: Handshake,
}

/// A TCP connection to the serial bridge.
pub struct TcpChannel {
    opts: ConnectOptions,
    stream: TcpStream,
}

// Short, because the handshake polls for replies.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

fn open(addr: SocketAddr) -> io::Result<TcpStream> {
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    Ok(stream)
}

fn open_with_retry(opts: &ConnectOptions, max_attempts: Option<u32>) -> io::Result<TcpStream> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match open(opts.addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                if max_attempts.is_some_and(|max| attempt >= max) {
                    return Err(e);
                }
                log::debug!("bridge at {} not available ({e}), retrying", opts.addr);
                std::thread::sleep(opts.retry_interval);
            }
        }
    }
}

impl TcpChannel {
    /// Blocks until the bridge accepts our connection, and then waits for the
    /// bot to report that it's ready.
    pub fn connect(opts: ConnectOptions) -> io::Result<TcpChannel> {
        let stream = open_with_retry(&opts, None)?;
        log::debug!("connected to bridge at {}", opts.addr);
        let mut ret = TcpChannel { opts, stream };
        ret.handshake()?;
        Ok(ret)
    }

    fn handshake(&mut self) -> io::Result<()> {
        if self.opts.handshake.run(&mut self.stream, std::thread::sleep)? {
            log::info!("drawing bot is ready");
        }
        Ok(())
    }
}

impl Channel for TcpChannel {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    fn reconnect(&mut self) -> io::Result<()> {
        log::warn!("reconnecting to bridge at {}", self.opts.addr);
        self.stream = open_with_retry(&self.opts, Some(self.opts.reconnect_attempts.max(1)))?;
        self.handshake()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead as _, BufReader},
        net::TcpListener,
        thread,
    };

    use super::*;

    // A bridge stand-in that answers the handshake and records every other line.
    fn fake_bridge(listener: TcpListener) -> thread::JoinHandle<Vec<String>> {
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut lines = Vec::new();
            for line in BufReader::new(stream).lines() {
                let line = line.unwrap();
                if line == "I" {
                    writer.write_all(b"RDY\n").unwrap();
                } else {
                    lines.push(line);
                }
            }
            lines
        })
    }

    fn opts(addr: SocketAddr) -> ConnectOptions {
        ConnectOptions {
            addr,
            retry_interval: Duration::from_millis(10),
            reconnect_attempts: 2,
            handshake: Handshake {
                poll_interval: Duration::from_millis(20),
                timeout: Duration::from_secs(2),
            },
        }
    }

    #[test]
    fn send_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let bridge = fake_bridge(listener);

        let mut channel = TcpChannel::connect(opts(addr)).unwrap();
        channel.send(b"W10.00\n").unwrap();
        channel.send(b"E20.00\n").unwrap();
        drop(channel);

        assert_eq!(bridge.join().unwrap(), ["W10.00", "E20.00"]);
    }

    #[test]
    fn reconnect_gives_up() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        let mut channel = TcpChannel {
            opts: opts(addr),
            stream,
        };
        drop(listener);
        assert!(channel.reconnect().is_err());
    }
}
