use std::{
    ffi::OsString,
    io,
    path::PathBuf,
    process::{Child, Command, Stdio},
};

/// Owns the background bridge process, if we started one.
///
/// The bridge isn't stopped when this is dropped: it outlives us, and shuts
/// itself down once nobody has talked to it for a while.
pub struct BridgeSupervisor {
    program: PathBuf,
    args: Vec<OsString>,
    child: Option<Child>,
}

impl BridgeSupervisor {
    pub fn new(
        program: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        BridgeSupervisor {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            child: None,
        }
    }

    /// The bridge executable that was installed alongside this one.
    pub fn locate() -> io::Result<PathBuf> {
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no executable directory"))?;
        Ok(dir.join(format!("deltabot-bridge{}", std::env::consts::EXE_SUFFIX)))
    }

    pub fn is_running(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Starts the bridge, unless the one we started before is still running.
    pub fn ensure_started(&mut self) -> io::Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.spawn(&[])
    }

    /// Restarts the bridge, asking it to reset the bot first.
    pub fn hard_reset(&mut self) -> io::Result<()> {
        self.stop()?;
        self.spawn(&["--reset"])
    }

    pub fn stop(&mut self) -> io::Result<()> {
        if let Some(mut child) = self.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                child.kill()?;
            }
            child.wait()?;
        }
        Ok(())
    }

    fn spawn(&mut self, extra: &[&str]) -> io::Result<()> {
        if !self.program.exists() {
            log::warn!("bridge not found at {}", self.program.display());
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} doesn't exist", self.program.display()),
            ));
        }
        let child = Command::new(&self.program)
            .args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        log::info!("bridge started in background (pid {})", child.id());
        self.child = Some(child);
        Ok(())
    }
}
