//! Line-oriented control protocol spoken between peers and the indexing server.
//!
//! Every request is a single line of space-delimited tokens. Every response is
//! a single line, except `SEARCH_RESULTS <n>` which is followed by exactly `n`
//! peer lines.

use std::fmt;

use crate::core::PeerRecord;
use crate::utils::{IndexError, Result};

pub const REGISTER: &str = "REGISTER";
pub const SEARCH: &str = "SEARCH";
pub const DEREGISTER: &str = "DEREGISTER";

pub const REGISTER_SUCCESS: &str = "REGISTER_SUCCESS";
pub const REGISTER_FAILURE: &str = "REGISTER_FAILURE";
pub const SEARCH_RESULTS: &str = "SEARCH_RESULTS";
pub const SEARCH_FAILURE: &str = "SEARCH_FAILURE";
pub const DEREGISTER_SUCCESS: &str = "DEREGISTER_SUCCESS";
pub const DEREGISTER_FAILURE: &str = "DEREGISTER_FAILURE";
pub const INVALID_COMMAND: &str = "INVALID_COMMAND";

pub const REASON_BAD_ARGUMENTS: &str = "Invalid number of arguments.";
pub const REASON_PEER_NOT_FOUND: &str = "Peer not found.";
pub const REASON_REQUEST_TOO_LONG: &str = "Request too long.";

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Register {
        record: PeerRecord,
        files: Vec<String>,
    },
    Search {
        filename: String,
    },
    /// Trailing filenames are carried on the wire but removal is peer-wide.
    Deregister {
        peer_id: String,
        files: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Register,
    Search,
    Deregister,
}

/// Why a request line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A known command with bad arguments.
    Malformed { command: Command, reason: String },
    UnknownCommand(String),
}

impl DecodeError {
    fn malformed(command: Command, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            command,
            reason: reason.into(),
        }
    }

    /// A request line cut off at the length limit; only its start is known.
    pub fn oversized(prefix: &str) -> Self {
        let command = prefix.split_whitespace().next().unwrap_or_default();
        match command.to_ascii_uppercase().as_str() {
            REGISTER => Self::malformed(Command::Register, REASON_REQUEST_TOO_LONG),
            SEARCH => Self::malformed(Command::Search, REASON_REQUEST_TOO_LONG),
            DEREGISTER => Self::malformed(Command::Deregister, REASON_REQUEST_TOO_LONG),
            _ => DecodeError::UnknownCommand(command.to_string()),
        }
    }

    /// The response the server sends back for this error.
    pub fn into_response(self) -> Response {
        match self {
            DecodeError::Malformed { command, reason } => match command {
                Command::Register => Response::RegisterFailure(reason),
                Command::Search => Response::SearchFailure(reason),
                Command::Deregister => Response::DeregisterFailure(reason),
            },
            DecodeError::UnknownCommand(_) => Response::InvalidCommand,
        }
    }
}

impl Request {
    pub fn register(record: PeerRecord, files: Vec<String>) -> Self {
        Request::Register { record, files }
    }

    pub fn search(filename: impl Into<String>) -> Self {
        Request::Search {
            filename: filename.into(),
        }
    }

    pub fn deregister(peer_id: impl Into<String>, files: Vec<String>) -> Self {
        Request::Deregister {
            peer_id: peer_id.into(),
            files,
        }
    }

    pub fn command(&self) -> Command {
        match self {
            Request::Register { .. } => Command::Register,
            Request::Search { .. } => Command::Search,
            Request::Deregister { .. } => Command::Deregister,
        }
    }

    /// Parse one request line (without its newline).
    pub fn decode(line: &str) -> std::result::Result<Self, DecodeError> {
        let mut tokens = line.split_whitespace();
        let Some(command) = tokens.next() else {
            return Err(DecodeError::UnknownCommand(String::new()));
        };
        let args: Vec<&str> = tokens.collect();

        match command.to_ascii_uppercase().as_str() {
            REGISTER => Self::decode_register(&args),
            SEARCH => {
                if args.len() != 1 {
                    return Err(DecodeError::malformed(
                        Command::Search,
                        REASON_BAD_ARGUMENTS,
                    ));
                }
                Ok(Request::search(args[0]))
            }
            DEREGISTER => {
                let Some((peer_id, files)) = args.split_first() else {
                    return Err(DecodeError::malformed(
                        Command::Deregister,
                        REASON_BAD_ARGUMENTS,
                    ));
                };
                Ok(Request::deregister(
                    *peer_id,
                    files.iter().map(|f| f.to_string()).collect(),
                ))
            }
            _ => Err(DecodeError::UnknownCommand(command.to_string())),
        }
    }

    fn decode_register(args: &[&str]) -> std::result::Result<Self, DecodeError> {
        if args.len() < 4 {
            return Err(DecodeError::malformed(
                Command::Register,
                REASON_BAD_ARGUMENTS,
            ));
        }

        let port = parse_port(args[2]).ok_or_else(|| {
            DecodeError::malformed(Command::Register, format!("Invalid port: {}", args[2]))
        })?;
        let bandwidth = parse_bandwidth(args[3]).ok_or_else(|| {
            DecodeError::malformed(Command::Register, format!("Invalid bandwidth: {}", args[3]))
        })?;

        let record = PeerRecord::new(args[0], args[1], port, bandwidth);
        let files = args[4..].iter().map(|f| f.to_string()).collect();
        Ok(Request::register(record, files))
    }

    /// Encode as a newline-terminated request line.
    pub fn encode(&self) -> String {
        let mut line = match self {
            Request::Register { record, files } => {
                let mut line = format!("{} {}", REGISTER, record);
                push_tokens(&mut line, files);
                line
            }
            Request::Search { filename } => format!("{} {}", SEARCH, filename),
            Request::Deregister { peer_id, files } => {
                let mut line = format!("{} {}", DEREGISTER, peer_id);
                push_tokens(&mut line, files);
                line
            }
        };
        line.push('\n');
        line
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    RegisterSuccess,
    RegisterFailure(String),
    SearchResults(Vec<PeerRecord>),
    SearchFailure(String),
    DeregisterSuccess,
    DeregisterFailure(String),
    InvalidCommand,
}

/// First line of a response as seen by a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseHead {
    Complete(Response),
    /// `SEARCH_RESULTS <n>`: `n` peer lines follow.
    SearchResults(usize),
}

impl Response {
    /// Encode the full response, one `\n` after every line.
    pub fn encode(&self) -> String {
        match self {
            Response::RegisterSuccess => format!("{}\n", REGISTER_SUCCESS),
            Response::RegisterFailure(reason) => format!("{} {}\n", REGISTER_FAILURE, reason),
            Response::SearchResults(peers) => {
                let mut out = format!("{} {}\n", SEARCH_RESULTS, peers.len());
                for peer in peers {
                    out.push_str(&peer.to_string());
                    out.push('\n');
                }
                out
            }
            Response::SearchFailure(reason) => format!("{} {}\n", SEARCH_FAILURE, reason),
            Response::DeregisterSuccess => format!("{}\n", DEREGISTER_SUCCESS),
            Response::DeregisterFailure(reason) => format!("{} {}\n", DEREGISTER_FAILURE, reason),
            Response::InvalidCommand => format!("{}\n", INVALID_COMMAND),
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            Response::RegisterSuccess | Response::SearchResults(_) | Response::DeregisterSuccess
        )
    }

    /// Parse the first line of a response.
    pub fn decode_head(line: &str) -> Result<ResponseHead> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (status, rest) = match line.split_once(' ') {
            Some((status, rest)) => (status, rest.trim()),
            None => (line, ""),
        };

        let head = match status {
            REGISTER_SUCCESS => ResponseHead::Complete(Response::RegisterSuccess),
            REGISTER_FAILURE => ResponseHead::Complete(Response::RegisterFailure(rest.to_string())),
            SEARCH_FAILURE => ResponseHead::Complete(Response::SearchFailure(rest.to_string())),
            DEREGISTER_SUCCESS => ResponseHead::Complete(Response::DeregisterSuccess),
            DEREGISTER_FAILURE => {
                ResponseHead::Complete(Response::DeregisterFailure(rest.to_string()))
            }
            INVALID_COMMAND => ResponseHead::Complete(Response::InvalidCommand),
            SEARCH_RESULTS => {
                let count = rest.parse::<usize>().map_err(|_| {
                    IndexError::ProtocolViolation(format!("Bad result count: {:?}", line))
                })?;
                ResponseHead::SearchResults(count)
            }
            _ => {
                return Err(IndexError::ProtocolViolation(format!(
                    "Unexpected response: {:?}",
                    line
                )));
            }
        };
        Ok(head)
    }

    /// Parse one `<peerId> <address> <port> <bandwidth>` result line.
    pub fn decode_peer_line(line: &str) -> Result<PeerRecord> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 4 {
            return Err(IndexError::ProtocolViolation(format!(
                "Bad peer line: {:?}",
                line
            )));
        }

        let port = parse_port(tokens[2])
            .ok_or_else(|| IndexError::ProtocolViolation(format!("Bad peer port: {}", tokens[2])))?;
        let bandwidth = parse_bandwidth(tokens[3]).ok_or_else(|| {
            IndexError::ProtocolViolation(format!("Bad peer bandwidth: {}", tokens[3]))
        })?;

        Ok(PeerRecord::new(tokens[0], tokens[1], port, bandwidth))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode().trim_end())
    }
}

/// True if `token` can travel as a single protocol token.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && !token.chars().any(char::is_whitespace)
}

fn push_tokens(line: &mut String, tokens: &[String]) {
    for token in tokens {
        line.push(' ');
        line.push_str(token);
    }
}

fn parse_port(token: &str) -> Option<u16> {
    token.parse::<u16>().ok().filter(|port| *port > 0)
}

fn parse_bandwidth(token: &str) -> Option<f64> {
    token
        .parse::<f64>()
        .ok()
        .filter(|bw| bw.is_finite() && *bw >= 0.0)
}
