//! Device bridge
//!
//! The session needs a handful of operations from the debugging bridge:
//! list devices, push the server, manage the reverse forward and start the
//! server. [`DeviceBridge`] is that seam; [`AdbBridge`] implements it by
//! driving the `adb` executable.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// An attached device as reported by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub serial: String,

    /// Bridge connection state ("device", "unauthorized", "offline", ...)
    pub state: String,

    pub model: Option<String>,

    /// Display name assigned from the device-name mapping file
    pub name: Option<String>,
}

impl DeviceHandle {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            state: "device".to_string(),
            model: None,
            name: None,
        }
    }

    /// Mapped name, else model, else serial
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.model.as_deref())
            .unwrap_or(&self.serial)
    }

    /// Whether the device is ready for commands
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

/// Operations the session needs from the device bridge
pub trait DeviceBridge: Send + Sync {
    /// Devices currently attached
    fn list_devices(&self) -> Result<Vec<DeviceHandle>>;

    /// Copy a local file to the device and set its mode
    fn push_file(&self, device: &DeviceHandle, local: &Path, remote: &str, mode: u32)
        -> Result<()>;

    /// Let the device dial `remote_socket` to reach `127.0.0.1:local_port`
    fn create_reverse_forward(
        &self,
        device: &DeviceHandle,
        remote_socket: &str,
        local_port: u16,
    ) -> Result<()>;

    /// Remove every forward and reverse forward for the device
    fn remove_all_forwards(&self, device: &DeviceHandle) -> Result<()>;

    /// Start a shell command on the device without waiting for it
    fn run_remote_command(&self, device: &DeviceHandle, command: &str) -> Result<()>;
}

/// Parse the output of `adb devices -l`
pub fn parse_devices(output: &str) -> Vec<DeviceHandle> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?;
            let state = tokens.next()?;
            let model = tokens
                .find_map(|t| t.strip_prefix("model:"))
                .map(str::to_string);

            Some(DeviceHandle {
                serial: serial.to_string(),
                state: state.to_string(),
                model,
                name: None,
            })
        })
        .collect()
}

/// [`DeviceBridge`] backed by the `adb` executable
#[derive(Debug, Clone)]
pub struct AdbBridge {
    adb: PathBuf,
}

impl AdbBridge {
    pub fn new(adb: impl Into<PathBuf>) -> Self {
        Self { adb: adb.into() }
    }

    /// Start the adb server if it is not running yet
    pub fn start_server(&self) -> Result<()> {
        let mut cmd = self.command(None);
        cmd.arg("start-server");
        self.run(cmd).map(|_| ())
    }

    fn command(&self, device: Option<&DeviceHandle>) -> Command {
        let mut cmd = Command::new(&self.adb);
        if let Some(device) = device {
            cmd.arg("-s").arg(&device.serial);
        }
        cmd
    }

    /// Run to completion; non-zero exit is a bootstrap error
    fn run(&self, mut cmd: Command) -> Result<String> {
        debug!("Running {:?}", cmd);
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::bootstrap(format!("failed to run {}: {}", self.adb.display(), e)))?;

        if !output.status.success() {
            return Err(Error::bootstrap(format!(
                "{:?} exited with {}: {}",
                cmd,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DeviceBridge for AdbBridge {
    fn list_devices(&self) -> Result<Vec<DeviceHandle>> {
        let mut cmd = self.command(None);
        cmd.args(["devices", "-l"]);
        Ok(parse_devices(&self.run(cmd)?))
    }

    fn push_file(
        &self,
        device: &DeviceHandle,
        local: &Path,
        remote: &str,
        mode: u32,
    ) -> Result<()> {
        if !local.is_file() {
            return Err(Error::bootstrap(format!(
                "server file not found: {}",
                local.display()
            )));
        }

        let mut push = self.command(Some(device));
        push.arg("push").arg(local).arg(remote);
        self.run(push)?;

        let mut chmod = self.command(Some(device));
        chmod
            .arg("shell")
            .arg("chmod")
            .arg(format!("{:o}", mode))
            .arg(remote);
        self.run(chmod)?;

        info!("Pushed {} to {}:{}", local.display(), device.serial, remote);
        Ok(())
    }

    fn create_reverse_forward(
        &self,
        device: &DeviceHandle,
        remote_socket: &str,
        local_port: u16,
    ) -> Result<()> {
        let mut cmd = self.command(Some(device));
        cmd.arg("reverse")
            .arg(remote_socket)
            .arg(format!("tcp:{}", local_port));
        self.run(cmd).map(|_| ())
    }

    fn remove_all_forwards(&self, device: &DeviceHandle) -> Result<()> {
        let mut forward = self.command(Some(device));
        forward.args(["forward", "--remove-all"]);
        self.run(forward)?;

        let mut reverse = self.command(Some(device));
        reverse.args(["reverse", "--remove-all"]);
        self.run(reverse).map(|_| ())
    }

    fn run_remote_command(&self, device: &DeviceHandle, command: &str) -> Result<()> {
        let mut cmd = self.command(Some(device));
        cmd.arg("shell")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::bootstrap(format!("failed to start remote command: {}", e)))?;
        info!("Started remote command on {}: {}", device.serial, command);

        let serial = device.serial.clone();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        thread::Builder::new()
            .name(format!("adb-shell-{}", serial))
            .spawn(move || {
                let err_serial = serial.clone();
                let err_reader = stderr.map(|stderr| {
                    thread::spawn(move || forward_output(stderr, &err_serial, "stderr"))
                });
                if let Some(stdout) = stdout {
                    forward_output(stdout, &serial, "stdout");
                }
                if let Some(handle) = err_reader {
                    let _ = handle.join();
                }

                match child.wait() {
                    Ok(status) => info!("Remote command on {} exited: {}", serial, status),
                    Err(e) => warn!("Failed to wait for remote command on {}: {}", serial, e),
                }
            })
            .map_err(|e| Error::bootstrap(format!("failed to spawn output reader: {}", e)))?;

        Ok(())
    }
}

fn forward_output(stream: impl Read, serial: &str, name: &str) {
    for line in BufReader::new(stream).lines() {
        match line {
            Ok(line) => debug!("[{} {}] {}", serial, name, line),
            Err(_) => break,
        }
    }
}
