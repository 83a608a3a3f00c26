//! Peer address loading.
//!
//! Peers are the other scanner devices on the local network. They can be
//! listed in a file (one per line) or passed as a comma-separated list.
//! An entry is either `host:port` or a bare `host`, in which case the usual
//! service ports are tried.

use std::fmt;
use std::fs;
use std::net::Ipv6Addr;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info, warn};

use scanhub_shared::constants::PEER_PROBE_PORTS;

use crate::error::ProbeError;

/// A configured peer device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    pub host: String,
    pub port: Option<u16>,
}

impl PeerAddr {
    /// Every `host:port` the peer probe should try, in order.
    pub fn candidates(&self) -> Vec<String> {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(port) => vec![format!("{host}:{port}")],
            None => PEER_PROBE_PORTS
                .iter()
                .map(|port| format!("{host}:{port}"))
                .collect(),
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) if self.host.contains(':') => write!(f, "[{}]:{port}", self.host),
            Some(port) => write!(f, "{}:{port}", self.host),
            None => f.write_str(&self.host),
        }
    }
}

impl FromStr for PeerAddr {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ProbeError::InvalidAddress(s.to_string());
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        // [v6]:port or [v6]
        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match tail {
                "" => None,
                _ => Some(parse_port(tail.strip_prefix(':').ok_or_else(invalid)?).ok_or_else(invalid)?),
            };
            if host.is_empty() {
                return Err(invalid());
            }
            return Ok(Self {
                host: host.to_string(),
                port,
            });
        }

        match s.split_once(':') {
            // More than one colon: only valid as a bare IPv6 address.
            Some((_, rest)) if rest.contains(':') => {
                s.parse::<Ipv6Addr>().map_err(|_| invalid())?;
                Ok(Self {
                    host: s.to_string(),
                    port: None,
                })
            }
            Some((host, port)) if !host.is_empty() => Ok(Self {
                host: host.to_string(),
                port: Some(parse_port(port).ok_or_else(invalid)?),
            }),
            Some(_) => Err(invalid()),
            None => Ok(Self {
                host: s.to_string(),
                port: None,
            }),
        }
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.parse::<u16>().ok().filter(|p| *p != 0)
}

/// Load peer addresses from a file.
///
/// Empty lines and lines starting with `#` are ignored. Malformed lines
/// are logged and skipped; an unreadable file yields an empty list.
pub fn load_peer_addrs(path: &Path) -> Vec<PeerAddr> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read peers file");
            return Vec::new();
        }
    };

    let peers: Vec<PeerAddr> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match line.parse::<PeerAddr>() {
            Ok(addr) => {
                debug!(addr = %addr, "Loaded peer");
                Some(addr)
            }
            Err(e) => {
                warn!(line = %line, error = %e, "Skipping invalid peer address");
                None
            }
        })
        .collect();

    info!(count = peers.len(), path = %path.display(), "Loaded peers");
    peers
}

/// Parse a comma-separated peer list, as given on the command line or in
/// the environment.
pub fn parse_peer_addrs(raw: &str) -> Vec<PeerAddr> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse::<PeerAddr>().ok().or_else(|| {
                warn!(addr = %s, "Could not parse peer address");
                None
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_forms() {
        let a: PeerAddr = "192.168.1.20:5000".parse().unwrap();
        assert_eq!(a.host, "192.168.1.20");
        assert_eq!(a.port, Some(5000));
        assert_eq!(a.candidates(), vec!["192.168.1.20:5000"]);

        let b: PeerAddr = "scanner-2.local".parse().unwrap();
        assert_eq!(b.port, None);
        assert_eq!(
            b.candidates(),
            vec![
                "scanner-2.local:22",
                "scanner-2.local:80",
                "scanner-2.local:5000",
                "scanner-2.local:8080"
            ]
        );

        let c: PeerAddr = "[fe80::1]:8080".parse().unwrap();
        assert_eq!(c.host, "fe80::1");
        assert_eq!(c.candidates(), vec!["[fe80::1]:8080"]);
        assert_eq!(c.to_string(), "[fe80::1]:8080");

        let d: PeerAddr = "fe80::2".parse().unwrap();
        assert_eq!(d.port, None);
        assert_eq!(d.candidates()[0], "[fe80::2]:22");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<PeerAddr>().is_err());
        assert!("host:0".parse::<PeerAddr>().is_err());
        assert!("host:http".parse::<PeerAddr>().is_err());
        assert!(":80".parse::<PeerAddr>().is_err());
        assert!("two words".parse::<PeerAddr>().is_err());
        assert!("[fe80::1".parse::<PeerAddr>().is_err());
        assert!("a:b:c".parse::<PeerAddr>().is_err());
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        assert!(load_peer_addrs(Path::new("/nonexistent/peers.txt")).is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("peers.txt");

        let mut f = fs::File::create(&file_path).unwrap();
        writeln!(f, "# shop floor scanners").unwrap();
        writeln!(f, "192.168.1.20:5000").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "bad:address:port:").unwrap();
        writeln!(f, "not a host").unwrap();
        writeln!(f, "scanner-3.local").unwrap();
        drop(f);

        let peers = load_peer_addrs(&file_path);
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].port, Some(5000));
        assert_eq!(peers[1].host, "scanner-3.local");
    }

    #[test]
    fn test_parse_peer_list() {
        let peers = parse_peer_addrs("10.0.0.5:22, ,bogus:port,10.0.0.6");
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[1].host, "10.0.0.6");
    }
}
