use std::{
    io::{self, Read, Write},
    net::{TcpListener, TcpStream},
    time::{Duration, Instant},
};

use deltabot_protocol::Cmd;

use crate::link::{is_timeout, Link, Opener};

// How long to wait on a quiet client before checking for replies from the bot.
const CLIENT_POLL: Duration = Duration::from_millis(20);
// How long a reply may take to go out before we decide the client isn't reading.
const REPLY_TIMEOUT: Duration = Duration::from_millis(20);
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Forwards bytes between TCP clients and the serial link, one client at a time.
pub struct Relay<O: Opener> {
    link: Link<O>,
    // Partial line left over from the last read, for logging.
    partial: String,
}

impl<O: Opener> Relay<O> {
    pub fn new(link: Link<O>) -> Self {
        Relay {
            link,
            partial: String::new(),
        }
    }

    pub fn link(&mut self) -> &mut Link<O> {
        &mut self.link
    }

    /// Serves clients until none has shown up for `idle_limit`.
    pub fn run(&mut self, listener: &TcpListener, idle_limit: Duration) -> io::Result<()> {
        listener.set_nonblocking(true)?;
        let mut last_seen = Instant::now();
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    log::info!("client connected from {addr}");
                    if let Err(e) = self.serve(stream) {
                        log::warn!("client {addr}: {e}");
                    }
                    log::info!("client {addr} disconnected");
                    last_seen = Instant::now();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if last_seen.elapsed() >= idle_limit {
                        log::info!("no clients for {idle_limit:?}, shutting down");
                        return Ok(());
                    }
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Relays one client until it hangs up. Bytes from the client go to the bot
    /// unchanged; anything the bot says goes back to the client, unless the
    /// client stops reading it, in which case the rest is dropped.
    pub fn serve(&mut self, mut client: TcpStream) -> io::Result<()> {
        client.set_nonblocking(false)?;
        client.set_nodelay(true)?;
        client.set_read_timeout(Some(CLIENT_POLL))?;
        client.set_write_timeout(Some(REPLY_TIMEOUT))?;
        self.link.ensure_alive();
        self.partial.clear();
        let mut forward_replies = true;

        let mut buf = [0u8; 1024];
        loop {
            match client.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    self.link.write(&buf[..n])?;
                    self.log_commands(&buf[..n]);
                }
                Err(e) if is_timeout(&e) => {}
                Err(e) => return Err(e),
            }

            let n = self.link.read_available(&mut buf)?;
            if n > 0 && forward_replies {
                match client.write_all(&buf[..n]) {
                    Ok(()) => {}
                    Err(e) if is_timeout(&e) => {
                        log::warn!("client isn't reading replies, dropping them from now on");
                        forward_replies = false;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    fn log_commands(&mut self, data: &[u8]) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        self.partial.push_str(&String::from_utf8_lossy(data));
        while let Some(end) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=end).collect();
            match Cmd::parse(&line) {
                Ok(cmd) => log::debug!("relayed {cmd:?}"),
                Err(e) => log::debug!("relayed {:?} ({e})", line.trim_end()),
            }
        }
    }
}
