use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use native_tls::{HandshakeError, TlsConnector, TlsStream};

use super::types::{SmtpEvent, SmtpReply, Stage};

#[derive(Debug)]
enum StreamState {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Invalid,
}

impl StreamState {
    fn tcp(&self) -> Option<&TcpStream> {
        match self {
            Self::Plain(stream) => Some(stream),
            Self::Tls(stream) => Some(stream.get_ref()),
            Self::Invalid => None,
        }
    }
}

/// Line-oriented SMTP stream that can be upgraded to TLS in place.
#[derive(Debug)]
struct SmtpStream {
    state: StreamState,
    buffer: Vec<u8>,
}

impl SmtpStream {
    fn connect(addr: &SocketAddr, connect_timeout: Duration) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(addr, connect_timeout)?;
        Ok(Self {
            state: StreamState::Plain(stream),
            buffer: Vec::new(),
        })
    }

    fn set_timeout(&self, timeout: Duration) -> io::Result<()> {
        let tcp = self.state.tcp().ok_or_else(invalid_state)?;
        tcp.set_read_timeout(Some(timeout))?;
        tcp.set_write_timeout(Some(timeout))
    }

    fn upgrade_tls(&mut self, domain: &str, connector: &TlsConnector) -> Result<(), String> {
        let state = std::mem::replace(&mut self.state, StreamState::Invalid);
        let plain = match state {
            StreamState::Plain(stream) => stream,
            other => {
                self.state = other;
                return Ok(());
            }
        };
        self.buffer.clear();
        let tls = complete_handshake(connector, domain, plain)?;
        self.state = StreamState::Tls(Box::new(tls));
        Ok(())
    }

    fn write_line(&mut self, command: &str) -> io::Result<()> {
        let mut data = command.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        match &mut self.state {
            StreamState::Plain(stream) => {
                stream.write_all(&data)?;
                stream.flush()
            }
            StreamState::Tls(stream) => {
                stream.write_all(&data)?;
                stream.flush()
            }
            StreamState::Invalid => Err(invalid_state()),
        }
    }

    fn read_reply(&mut self) -> io::Result<SmtpReply> {
        let mut lines = Vec::new();
        let mut code: Option<u16> = None;
        loop {
            let line = self.read_line()?;
            if line.len() < 3 || !line.is_char_boundary(3) {
                return Err(protocol(format!("invalid reply: '{line}'")));
            }
            let parsed = line[..3]
                .parse::<u16>()
                .map_err(|_| protocol(format!("invalid code in line: '{line}'")))?;
            match code {
                Some(existing) if existing != parsed => {
                    return Err(protocol(format!(
                        "inconsistent reply codes: {existing} vs {parsed}"
                    )));
                }
                Some(_) => {}
                None => code = Some(parsed),
            }
            let continuation = line.as_bytes().get(3) == Some(&b'-');
            lines.push(line.get(4..).unwrap_or_default().to_string());
            if !continuation {
                break;
            }
        }
        Ok(SmtpReply {
            code: code.ok_or_else(|| protocol("reply missing status code"))?,
            message: lines.join("\n"),
        })
    }

    fn read_line(&mut self) -> io::Result<String> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }

            let mut buf = [0u8; 512];
            let read = match &mut self.state {
                StreamState::Plain(stream) => stream.read(&mut buf)?,
                StreamState::Tls(stream) => stream.read(&mut buf)?,
                StreamState::Invalid => return Err(invalid_state()),
            };
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed while reading reply",
                ));
            }
            self.buffer.extend_from_slice(&buf[..read]);
        }
    }
}

fn complete_handshake(
    connector: &TlsConnector,
    domain: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, String> {
    match connector.connect(domain, stream) {
        Ok(tls) => Ok(tls),
        Err(HandshakeError::Failure(err)) => Err(err.to_string()),
        // The socket is blocking, so WouldBlock means the read timeout expired.
        Err(HandshakeError::WouldBlock(_)) => Err("timeout: TLS handshake".to_string()),
    }
}

fn protocol(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn invalid_state() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "invalid stream state")
}

pub(crate) enum TlsUpgrade {
    Upgraded,
    /// Server answered STARTTLS with a non-2xx reply; the plaintext session
    /// is still usable.
    Refused(SmtpReply),
    /// The session is unusable and must be reopened.
    Failed(String),
}

/// One SMTP conversation with a recorded transcript.
pub(crate) struct SmtpSession {
    host: String,
    peer: SocketAddr,
    stream: SmtpStream,
    extensions: Vec<String>,
    tls: bool,
    pub(crate) events: Vec<SmtpEvent>,
}

impl SmtpSession {
    /// Connects to the first reachable address, then applies `command_timeout`
    /// to every subsequent read and write.
    pub(crate) fn connect(
        host: &str,
        addrs: &[SocketAddr],
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> io::Result<Self> {
        let mut last_err = None;
        for addr in addrs {
            match SmtpStream::connect(addr, connect_timeout) {
                Ok(stream) => {
                    stream.set_timeout(command_timeout)?;
                    return Ok(Self {
                        host: host.to_string(),
                        peer: *addr,
                        stream,
                        extensions: Vec::new(),
                        tls: false,
                        events: Vec::new(),
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no socket address available",
            )
        }))
    }

    /// Opens a fresh plaintext connection to the same peer, keeping the
    /// transcript.
    pub(crate) fn reopen(
        &mut self,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> io::Result<()> {
        let stream = SmtpStream::connect(&self.peer, connect_timeout)?;
        stream.set_timeout(command_timeout)?;
        self.stream = stream;
        self.extensions.clear();
        self.tls = false;
        Ok(())
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn is_tls(&self) -> bool {
        self.tls
    }

    pub(crate) fn read_greeting(&mut self) -> io::Result<SmtpReply> {
        self.receive(Stage::Greeting)
    }

    pub(crate) fn command(&mut self, stage: Stage, command: &str) -> io::Result<SmtpReply> {
        self.events.push(SmtpEvent::Sent {
            stage,
            command: command.to_string(),
        });
        if let Err(err) = self.stream.write_line(command) {
            self.record_error(stage, &err);
            return Err(err);
        }
        self.receive(stage)
    }

    /// EHLO, falling back to HELO when EHLO is answered with an error reply.
    pub(crate) fn hello(&mut self, helo: &str) -> io::Result<SmtpReply> {
        let reply = self.command(Stage::Ehlo, &format!("EHLO {helo}"))?;
        if reply.is_positive_completion() {
            self.extensions = reply
                .message
                .lines()
                .skip(1)
                .filter_map(|line| line.split_whitespace().next())
                .map(str::to_ascii_uppercase)
                .collect();
            return Ok(reply);
        }
        self.extensions.clear();
        self.command(Stage::Helo, &format!("HELO {helo}"))
    }

    pub(crate) fn supports(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    pub(crate) fn starttls(&mut self, connector: &TlsConnector) -> TlsUpgrade {
        let reply = match self.command(Stage::StartTls, "STARTTLS") {
            Ok(reply) => reply,
            Err(err) => return TlsUpgrade::Failed(err.to_string()),
        };
        if !reply.is_positive_completion() {
            return TlsUpgrade::Refused(reply);
        }
        let host = self.host.clone();
        match self.stream.upgrade_tls(&host, connector) {
            Ok(()) => {
                self.tls = true;
                self.extensions.clear();
                TlsUpgrade::Upgraded
            }
            Err(message) => {
                self.events.push(SmtpEvent::Error {
                    stage: Stage::StartTls,
                    message: message.clone(),
                });
                TlsUpgrade::Failed(message)
            }
        }
    }

    /// Best-effort QUIT bounded by `timeout`; errors are only logged in the
    /// transcript.
    pub(crate) fn quit(&mut self, timeout: Duration) {
        if let Err(err) = self.stream.set_timeout(timeout) {
            self.record_error(Stage::Quit, &err);
            return;
        }
        let _ = self.command(Stage::Quit, "QUIT");
    }

    fn receive(&mut self, stage: Stage) -> io::Result<SmtpReply> {
        match self.stream.read_reply() {
            Ok(reply) => {
                self.events.push(SmtpEvent::Received {
                    stage,
                    reply: reply.clone(),
                });
                Ok(reply)
            }
            Err(err) => {
                self.record_error(stage, &err);
                Err(err)
            }
        }
    }

    fn record_error(&mut self, stage: Stage, err: &io::Error) {
        self.events.push(SmtpEvent::Error {
            stage,
            message: err.to_string(),
        });
    }
}
