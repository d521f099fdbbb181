//! The serial link to the bot's microcontroller.

use std::{
    io::{self, Read, Write},
    time::Duration,
};

use deltabot_protocol::{Cmd, Handshake};

/// Opens the physical port. The link calls this again whenever the port breaks.
pub trait Opener {
    type Port: Read + Write;

    fn open(&mut self) -> io::Result<Self::Port>;
}

// Reads give up almost immediately, so that the relay can poll the port
// between client reads.
const SERIAL_TIMEOUT: Duration = Duration::from_millis(1);

pub struct SerialOpener {
    pub path: String,
    pub baud: u32,
}

impl Opener for SerialOpener {
    type Port = Box<dyn serialport::SerialPort>;

    fn open(&mut self) -> io::Result<Self::Port> {
        let port = serialport::new(&self.path, self.baud)
            .timeout(SERIAL_TIMEOUT)
            .open()?;
        log::info!("opened serial port {} at {} baud", self.path, self.baud);
        Ok(port)
    }
}

pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// An open port, plus what it takes to reopen it.
pub struct Link<O: Opener> {
    opener: O,
    // Only empty while reconnecting: serial ports are opened exclusively, so
    // the old handle has to be closed before the device can be opened again.
    port: Option<O::Port>,
    handshake: Handshake,
    retry_interval: Duration,
}

impl<O: Opener> Link<O> {
    /// Opens the port (retrying until it works) and waits for the bot.
    pub fn connect(mut opener: O, handshake: Handshake, retry_interval: Duration) -> Self {
        let port = open_with_retry(&mut opener, retry_interval);
        let mut ret = Link {
            opener,
            port: Some(port),
            handshake,
            retry_interval,
        };
        ret.wait_until_ready();
        ret
    }

    fn wait_until_ready(&mut self) {
        log::info!("waiting until the drawing bot is ready...");
        let Some(port) = self.port.as_mut() else {
            return;
        };
        match self.handshake.run(port, std::thread::sleep) {
            Ok(true) => log::info!("drawing bot is ready"),
            Ok(false) => {}
            Err(e) => log::warn!("handshake failed: {e}"),
        }
    }

    /// Closes the port and opens it again.
    pub fn reconnect(&mut self) {
        log::warn!("reconnecting serial port");
        drop(self.port.take());
        self.port = Some(open_with_retry(&mut self.opener, self.retry_interval));
        self.wait_until_ready();
    }

    fn port(&mut self) -> io::Result<&mut O::Port> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is closed"))
    }

    fn write_to_port(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()
    }

    /// Checks that the port still takes writes.
    pub fn is_alive(&mut self) -> bool {
        let ok = self.write_to_port(&Cmd::Probe.to_bytes()).is_ok();
        if !ok {
            log::warn!("serial connection lost");
        }
        ok
    }

    pub fn ensure_alive(&mut self) {
        if !self.is_alive() {
            self.reconnect();
        }
    }

    /// Restarts the microcontroller, and then waits for it to come back.
    pub fn reset(&mut self) {
        log::info!("resetting the drawing bot");
        if let Err(e) = self.write_to_port(&Cmd::Reset.to_bytes()) {
            log::warn!("couldn't send the reset: {e}");
        }
        self.reconnect();
    }

    /// Writes to the port. If that fails, the port is reopened and the write
    /// is tried once more.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if let Err(e) = self.write_to_port(data) {
            log::warn!("serial write failed: {e}");
            self.reconnect();
            self.write_to_port(data)?;
        }
        Ok(())
    }

    /// Whatever the bot has said since we last asked.
    pub fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port()?.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

fn open_with_retry<O: Opener>(opener: &mut O, retry_interval: Duration) -> O::Port {
    loop {
        log::debug!("connecting to serial port...");
        match opener.open() {
            Ok(port) => return port,
            Err(e) => {
                log::warn!("cannot connect to serial port: {e}");
                std::thread::sleep(retry_interval);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;

    fn quick() -> Handshake {
        Handshake {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
        }
    }

    #[test]
    fn connect_waits_for_ready() {
        let opener = MockOpener {
            failures_left: 2,
            ..MockOpener::default()
        };
        let _link = Link::connect(opener.clone(), quick(), Duration::ZERO);
        let ports = opener.ports();
        assert_eq!(ports.len(), 1);
        // Ready on the first try.
        assert_eq!(ports[0].written(), b"I\n");
    }

    #[test]
    fn probe_reconnects_a_dead_port() {
        let opener = MockOpener::default();
        let mut link = Link::connect(opener.clone(), quick(), Duration::ZERO);

        link.ensure_alive();
        assert_eq!(opener.ports().len(), 1);
        assert_eq!(opener.ports()[0].written(), b"I\n_\n");

        opener.ports()[0].break_it();
        link.ensure_alive();
        let ports = opener.ports();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[1].written(), b"I\n");
    }

    #[test]
    fn reset_then_reopen() {
        let opener = MockOpener::default();
        let mut link = Link::connect(opener.clone(), quick(), Duration::ZERO);
        link.reset();

        let ports = opener.ports();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].written(), b"I\nR");
        assert_eq!(ports[1].written(), b"I\n");
    }

    #[test]
    fn old_port_is_closed_before_reopening() {
        let opener = MockOpener::default();
        let mut link = Link::connect(opener.clone(), quick(), Duration::ZERO);
        // The opener refuses to open the device while a port is still held,
        // so each of these would get stuck if the old port were kept open.
        link.reconnect();
        link.reset();
        opener.ports()[2].break_it();
        link.ensure_alive();
        assert_eq!(opener.ports().len(), 4);
    }

    #[test]
    fn write_retries_on_a_fresh_port() {
        let opener = MockOpener::default();
        let mut link = Link::connect(opener.clone(), quick(), Duration::ZERO);
        opener.ports()[0].break_it();

        link.write(b"W1.00\n").unwrap();
        let ports = opener.ports();
        assert_eq!(ports[1].written(), b"I\nW1.00\n");
    }

    #[test]
    fn reads_replies() {
        let opener = MockOpener::default();
        let mut link = Link::connect(opener.clone(), quick(), Duration::ZERO);
        let mut buf = [0; 16];
        assert_eq!(link.read_available(&mut buf).unwrap(), 0);

        opener.ports()[0].inject(b"hello");
        assert_eq!(link.read_available(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
    }
}
