//! Running host tools, locally or on a remote host over ssh.

use crate::settings::DriverSettings;
use labvm_core::{DriverKind, ExecResult, Result, VmConfig, VmError};
use std::sync::Arc;
use tokio::process::Command;

/// Where a driver's host tool runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// On this machine, without a shell
    Local,
    /// On another machine through `ssh`; the command line is quoted for a
    /// POSIX shell on the far side
    Ssh {
        /// `user@host` or `host`
        destination: String,
        /// ssh port, if not the default
        port: Option<String>,
    },
}

impl Transport {
    /// Build the ssh transport for a VM's remote connection settings.
    ///
    /// # Errors
    /// Returns [`VmError::Config`] if the configuration names no host, or
    /// if the remote user or host starts with `-` (ssh would read it as an
    /// option).
    pub fn remote(config: &VmConfig) -> Result<Self> {
        let remote = config.remote.as_ref();
        let destination = remote.and_then(|r| r.destination()).ok_or_else(|| {
            VmError::Config(format!("{} requires a remote host", config.driver))
        })?;
        let leading_dash = remote
            .into_iter()
            .flat_map(|r| [r.user.as_deref(), r.host.as_deref()])
            .flatten()
            .any(|part| part.trim_start().starts_with('-'));
        if leading_dash {
            return Err(VmError::Config(format!(
                "remote user and host for {} must not start with '-'",
                config.id
            )));
        }
        if remote.and_then(|r| r.pass.as_ref()).is_some() {
            tracing::warn!(vm_id = %config.id, "Remote password ignored; ssh uses key authentication");
        }
        Ok(Transport::Ssh {
            destination,
            port: remote.and_then(|r| r.port.clone()),
        })
    }
}

/// Runs host tools on behalf of one driver.
#[derive(Debug, Clone)]
pub struct Runner {
    kind: DriverKind,
    transport: Transport,
    settings: Arc<DriverSettings>,
}

impl Runner {
    /// Create a runner for one driver family.
    pub fn new(kind: DriverKind, transport: Transport, settings: Arc<DriverSettings>) -> Self {
        Self {
            kind,
            transport,
            settings,
        }
    }

    /// Where commands run.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Host tool paths.
    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// The program and arguments actually spawned for `program args...`.
    pub fn command_line(&self, program: &str, args: &[String]) -> (String, Vec<String>) {
        match &self.transport {
            Transport::Local => (program.to_string(), args.to_vec()),
            Transport::Ssh { destination, port } => {
                let mut ssh_args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
                if let Some(port) = port {
                    ssh_args.push("-p".into());
                    ssh_args.push(port.clone());
                }
                ssh_args.push("--".into());
                ssh_args.push(destination.clone());
                ssh_args.push(remote_line(program, args));
                (self.settings.ssh.clone(), ssh_args)
            }
        }
    }

    /// Run a tool and capture its output, whatever the exit status.
    pub async fn exec(&self, program: &str, args: &[String]) -> Result<ExecResult> {
        let (program, args) = self.command_line(program, args);
        spawn(&program, &args).await
    }

    /// Run a tool and return its stdout, failing on a non-zero exit.
    ///
    /// # Errors
    /// Returns [`VmError::Backend`] carrying the tool's stderr (or stdout if
    /// stderr is empty) when it exits unsuccessfully.
    pub async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        let output = self.exec(program, args).await?;
        self.check(output).map(|out| out.stdout)
    }

    /// Turn an unsuccessful result into a backend error.
    pub fn check(&self, output: ExecResult) -> Result<ExecResult> {
        if output.success() {
            return Ok(output);
        }
        let message = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        Err(VmError::Backend {
            driver: self.kind,
            message: format!("exit code {}: {}", output.exit_code, message),
        })
    }

    /// Copy a local file to the remote host (no-op locally).
    pub async fn upload(&self, local: &str, remote: &str) -> Result<()> {
        if let Some(args) = self.scp_args(local, remote, true) {
            let output = spawn(&self.settings.scp, &args).await?;
            self.check(output)?;
        }
        Ok(())
    }

    /// Copy a file from the remote host to this machine (no-op locally).
    pub async fn download(&self, remote: &str, local: &str) -> Result<()> {
        if let Some(args) = self.scp_args(remote, local, false) {
            let output = spawn(&self.settings.scp, &args).await?;
            self.check(output)?;
        }
        Ok(())
    }

    /// Delete a file on the remote host (no-op locally).
    pub async fn remove_remote(&self, path: &str) -> Result<()> {
        if let Transport::Ssh { .. } = self.transport {
            self.run("rm", &remove_args(path)).await?;
        }
        Ok(())
    }

    fn scp_args(&self, from: &str, to: &str, upload: bool) -> Option<Vec<String>> {
        let Transport::Ssh { destination, port } = &self.transport else {
            return None;
        };
        let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        if let Some(port) = port {
            args.push("-P".into());
            args.push(port.clone());
        }
        args.push("--".into());
        if upload {
            args.push(from.to_string());
            args.push(format!("{destination}:{to}"));
        } else {
            args.push(format!("{destination}:{from}"));
            args.push(to.to_string());
        }
        Some(args)
    }

    /// The error for an operation this backend cannot perform.
    pub fn unsupported(&self, operation: &'static str) -> VmError {
        VmError::Unsupported {
            driver: self.kind,
            operation,
        }
    }
}

async fn spawn(program: &str, args: &[String]) -> Result<ExecResult> {
    tracing::debug!(program, ?args, "Spawning host command");
    let output = Command::new(program).args(args).output().await?;
    let result = ExecResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    tracing::trace!(program, exit_code = result.exit_code, "Host command finished");
    Ok(result)
}

fn remove_args(path: &str) -> Vec<String> {
    vec!["-f".to_string(), "--".to_string(), path.to_string()]
}

/// Quote a word for a POSIX shell.
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// A command line for a remote POSIX shell, every word quoted.
pub fn remote_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}
