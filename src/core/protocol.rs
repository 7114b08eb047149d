//! Line-oriented wire protocol.
//!
//! Every connection carries exactly one exchange: a command line from the
//! client, one or more reply lines from the server, and for transfers a raw
//! byte payload terminated by the sender shutting down its write side.

use std::fmt;

/// Terminates a file listing. Sent even when the directory is empty.
pub const END_SENTINEL: &str = "END";

/// Size of the raw payload chunks written to the socket.
pub const CHUNK_SIZE: usize = 4096;

/// Longest command or reply line accepted, terminator included.
pub const MAX_LINE_LEN: u64 = 4096;

const LIST_FILES: &str = "LIST_FILES";
const REQUEST_FILE: &str = "REQUEST_FILE ";
const OFFER_FILE: &str = "OFFER_FILE ";
const APPROVE: &str = "APPROVE ";
const ACCEPT: &str = "ACCEPT ";
const DENY: &str = "DENY ";

/// Client -> server command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListFiles,
    /// Pull: the client wants the named file.
    RequestFile(String),
    /// Push: the client wants to send the named file.
    OfferFile(String),
}

impl Command {
    /// Parse a received command line. Returns `None` for anything unrecognised.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line == LIST_FILES {
            return Some(Command::ListFiles);
        }
        if let Some(name) = line.strip_prefix(REQUEST_FILE) {
            return Some(Command::RequestFile(name.trim().to_string()));
        }
        if let Some(name) = line.strip_prefix(OFFER_FILE) {
            return Some(Command::OfferFile(name.trim().to_string()));
        }
        None
    }

    /// Encoded form including the line terminator.
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ListFiles => f.write_str(LIST_FILES),
            Command::RequestFile(name) => write!(f, "{}{}", REQUEST_FILE, name),
            Command::OfferFile(name) => write!(f, "{}{}", OFFER_FILE, name),
        }
    }
}

/// Server -> client verdict on a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Pull approved; the file bytes follow the line.
    Approve(String),
    /// Push accepted; the server now reads the file bytes.
    Accept(String),
    Deny(String),
}

impl Reply {
    /// Parse a reply line. Unknown lines yield `None` and callers treat them as a denial.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(name) = line.strip_prefix(APPROVE) {
            return Some(Reply::Approve(name.to_string()));
        }
        if let Some(name) = line.strip_prefix(ACCEPT) {
            return Some(Reply::Accept(name.to_string()));
        }
        if let Some(name) = line.strip_prefix(DENY) {
            return Some(Reply::Deny(name.to_string()));
        }
        None
    }

    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Approve(name) => write!(f, "{}{}", APPROVE, name),
            Reply::Accept(name) => write!(f, "{}{}", ACCEPT, name),
            Reply::Deny(name) => write!(f, "{}{}", DENY, name),
        }
    }
}

/// Whether a listing line is the terminating sentinel.
pub fn is_end_of_listing(line: &str) -> bool {
    line.trim() == END_SENTINEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("LIST_FILES"), Some(Command::ListFiles));
        assert_eq!(Command::parse("LIST_FILES\r\n"), Some(Command::ListFiles));
        assert_eq!(
            Command::parse("REQUEST_FILE notes.txt\n"),
            Some(Command::RequestFile("notes.txt".to_string()))
        );
        assert_eq!(
            Command::parse("OFFER_FILE my report.pdf"),
            Some(Command::OfferFile("my report.pdf".to_string()))
        );
    }

    #[test]
    fn test_command_parse_rejects_unknown() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("list_files"), None);
        assert_eq!(Command::parse("REQUEST_FILE"), None);
        assert_eq!(Command::parse("DELETE_FILE a.txt"), None);
    }

    #[test]
    fn test_command_wire_format() {
        assert_eq!(Command::ListFiles.to_line(), "LIST_FILES\n");
        assert_eq!(
            Command::RequestFile("a.txt".to_string()).to_line(),
            "REQUEST_FILE a.txt\n"
        );
        assert_eq!(
            Command::OfferFile("b.bin".to_string()).to_line(),
            "OFFER_FILE b.bin\n"
        );
    }

    #[test]
    fn test_reply_parse() {
        assert_eq!(
            Reply::parse("APPROVE notes.txt\n"),
            Some(Reply::Approve("notes.txt".to_string()))
        );
        assert_eq!(
            Reply::parse("ACCEPT notes.txt\r\n"),
            Some(Reply::Accept("notes.txt".to_string()))
        );
        assert_eq!(
            Reply::parse("DENY notes.txt"),
            Some(Reply::Deny("notes.txt".to_string()))
        );
        assert_eq!(Reply::parse("APPROVED notes.txt"), None);
        assert_eq!(Reply::parse(""), None);
    }

    #[test]
    fn test_end_sentinel() {
        assert!(is_end_of_listing("END"));
        assert!(is_end_of_listing("END\r\n"));
        assert!(!is_end_of_listing("END.txt"));
        assert_eq!(Reply::Deny("x".to_string()).to_line(), "DENY x\n");
    }
}
