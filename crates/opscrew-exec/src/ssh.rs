//! Remote-shell strategy over ssh2.
//!
//! libssh2 is blocking, so each command runs on the blocking pool with
//! socket-level timeouts, and the async side wraps the join in its own
//! timeout. Authentication failure, connection failure, command failure,
//! and timeout all fold into failed `CommandResult`s — nothing here
//! raises past the strategy boundary.

use crate::executor::Executor;
use async_trait::async_trait;
use opscrew_core::types::{CommandResult, Credential, ServerDescriptor};
use ssh2::Session;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};

const SSH_PORT: u16 = 22;

#[derive(Default)]
pub struct SshExecutor;

impl SshExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for SshExecutor {
    fn name(&self) -> &str {
        "ssh"
    }

    async fn execute(
        &self,
        command: &str,
        server: Option<&ServerDescriptor>,
        timeout: Duration,
    ) -> CommandResult {
        let Some(server) = server else {
            return CommandResult::failure("no server specified for remote execution", -1);
        };
        let server = server.clone();
        let command = command.to_string();

        let join = tokio::task::spawn_blocking(move || exec_blocking(&server, &command, timeout));

        // The blocking call honors socket timeouts itself; the outer
        // bound covers resolution stalls and scheduler delay.
        match tokio::time::timeout(timeout + Duration::from_secs(2), join).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => CommandResult::failure(format!("ssh task failed: {e}"), -1),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "remote command timed out");
                CommandResult::failure(format!("timed out after {}s", timeout.as_secs()), -1)
            }
        }
    }
}

fn exec_blocking(server: &ServerDescriptor, command: &str, timeout: Duration) -> CommandResult {
    let session = match open_session(server, timeout) {
        Ok(session) => session,
        Err(result) => return result,
    };

    let mut channel = match session.channel_session() {
        Ok(channel) => channel,
        Err(e) => return CommandResult::failure(format!("connection error: {e}"), -1),
    };
    if let Err(e) = channel.exec(command) {
        return CommandResult::failure(format!("execution failure: {e}"), -1);
    }

    let mut stdout = String::new();
    let _ = channel.read_to_string(&mut stdout);
    let mut stderr = String::new();
    let _ = channel.stderr().read_to_string(&mut stderr);
    let _ = channel.wait_close();
    let exit_code = channel.exit_status().unwrap_or(-1);

    debug!(server = %server.id, exit_code, "remote command finished");
    if exit_code == 0 {
        CommandResult::ok(stdout.trim())
    } else {
        let merged = format!("{}\n{}", stdout.trim(), stderr.trim());
        CommandResult::failure(merged.trim(), exit_code)
    }
}

/// Connect, handshake, authenticate. Failures come back as the final
/// `CommandResult` so the caller just forwards them.
fn open_session(
    server: &ServerDescriptor,
    timeout: Duration,
) -> Result<Session, CommandResult> {
    let fail = |msg: String| Err(CommandResult::failure(msg, -1));

    let mut addrs = match (server.address.as_str(), SSH_PORT).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => return fail(format!("connection error: cannot resolve {}: {e}", server.address)),
    };
    let Some(addr) = addrs.next() else {
        return fail(format!("connection error: no address for {}", server.address));
    };

    let tcp = match TcpStream::connect_timeout(&addr, timeout) {
        Ok(tcp) => tcp,
        Err(e) => return fail(format!("connection error: {e}")),
    };
    let _ = tcp.set_read_timeout(Some(timeout));
    let _ = tcp.set_write_timeout(Some(timeout));

    let mut session = match Session::new() {
        Ok(session) => session,
        Err(e) => return fail(format!("connection error: {e}")),
    };
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
    if let Err(e) = session.handshake() {
        return fail(format!("connection error: {e}"));
    }

    let auth = match &server.credential {
        Credential::KeyFile(path) => {
            session.userauth_pubkey_file(&server.user, None, path, None)
        }
        Credential::Password(password) => session.userauth_password(&server.user, password),
    };
    if let Err(e) = auth {
        return fail(format!("authentication failed: {e}"));
    }
    if !session.authenticated() {
        return fail("authentication failed".to_string());
    }

    Ok(session)
}
