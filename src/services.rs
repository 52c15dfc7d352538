//! Port classification: service names, risky ports, IANA categories and
//! banner-based identification. Everything here is a pure lookup.

use serde::{Deserialize, Serialize};

/// Ports whose services are legacy, cleartext or frequently exposed by mistake.
const RISKY_PORTS: [u16; 21] = [
    21, 23, 69, 111, 135, 137, 138, 139, 445, 512, 513, 514, 1433, 1900, 2049, 3389, 5900, 6379,
    9200, 11211, 27017,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortCategory {
    WellKnown,
    Registered,
    Dynamic,
}

impl PortCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortCategory::WellKnown => "well-known",
            PortCategory::Registered => "registered",
            PortCategory::Dynamic => "dynamic",
        }
    }
}

/// Service identified from a banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGuess {
    pub name: String,
    pub version: Option<String>,
}

pub fn lookup(port: u16) -> Option<&'static str> {
    let name = match port {
        7 => "echo",
        20 => "ftp-data",
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "dns",
        69 => "tftp",
        79 => "finger",
        80 => "http",
        88 => "kerberos",
        110 => "pop3",
        111 => "rpcbind",
        119 => "nntp",
        123 => "ntp",
        135 => "msrpc",
        137 => "netbios-ns",
        138 => "netbios-dgm",
        139 => "netbios-ssn",
        143 => "imap",
        161 => "snmp",
        179 => "bgp",
        389 => "ldap",
        443 => "https",
        445 => "microsoft-ds",
        465 => "smtps",
        512 => "rexec",
        513 => "rlogin",
        514 => "rsh",
        554 => "rtsp",
        587 => "submission",
        631 => "ipp",
        636 => "ldaps",
        873 => "rsync",
        993 => "imaps",
        995 => "pop3s",
        1080 => "socks",
        1194 => "openvpn",
        1433 => "mssql",
        1521 => "oracle",
        1723 => "pptp",
        1883 => "mqtt",
        1900 => "upnp",
        2049 => "nfs",
        2375 => "docker",
        3000 => "http-alt",
        3306 => "mysql",
        3389 => "rdp",
        5060 => "sip",
        5432 => "postgresql",
        5672 => "amqp",
        5900 => "vnc",
        6379 => "redis",
        6443 => "kubernetes",
        8000 => "http-alt",
        8008 => "http-alt",
        8080 => "http-proxy",
        8443 => "https-alt",
        8888 => "http-alt",
        9000 => "http-alt",
        9092 => "kafka",
        9200 => "elasticsearch",
        11211 => "memcached",
        27017 => "mongodb",
        _ => return None,
    };
    Some(name)
}

pub fn is_risky_port(port: u16) -> bool {
    RISKY_PORTS.contains(&port)
}

pub fn category(port: u16) -> PortCategory {
    match port {
        0..=1023 => PortCategory::WellKnown,
        1024..=49151 => PortCategory::Registered,
        _ => PortCategory::Dynamic,
    }
}

/// Recognises common services from the first bytes they send.
pub fn identify_banner(banner: &str, port: u16) -> Option<ServiceGuess> {
    let lower = banner.to_lowercase();

    if banner.starts_with("SSH-") {
        // SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.5
        let software = banner.splitn(3, '-').nth(2).and_then(|s| s.split_whitespace().next());
        return Some(ServiceGuess {
            name: "ssh".to_string(),
            version: software.map(str::to_string),
        });
    }

    if lower.starts_with("http/") {
        let server = banner
            .lines()
            .find(|line| line.to_lowercase().starts_with("server:"))
            .map(|line| line["server:".len()..].trim());

        return Some(match server.and_then(|s| s.split_once('/')) {
            Some((name, version)) => ServiceGuess {
                name: name.trim().to_lowercase(),
                version: version.split_whitespace().next().map(str::to_string),
            },
            None => ServiceGuess {
                name: if port == 443 || port == 8443 { "https" } else { "http" }.to_string(),
                version: server.filter(|s| !s.is_empty()).map(str::to_string),
            },
        });
    }

    if banner.starts_with("220") {
        let name = if lower.contains("smtp") || lower.contains("esmtp") || lower.contains("postfix") {
            "smtp"
        } else if lower.contains("ftp") || port == 21 {
            "ftp"
        } else {
            lookup(port).unwrap_or("smtp")
        };
        return Some(ServiceGuess {
            name: name.to_string(),
            version: None,
        });
    }

    if banner.starts_with("+OK") {
        return Some(ServiceGuess {
            name: "pop3".to_string(),
            version: None,
        });
    }

    if banner.starts_with("* OK") {
        return Some(ServiceGuess {
            name: "imap".to_string(),
            version: None,
        });
    }

    if banner.starts_with("RFB ") {
        return Some(ServiceGuess {
            name: "vnc".to_string(),
            version: banner.get(4..).map(|v| v.trim().to_string()),
        });
    }

    if banner.starts_with("-ERR") || banner.starts_with("-NOAUTH") {
        return Some(ServiceGuess {
            name: "redis".to_string(),
            version: None,
        });
    }

    if lower.contains("mysql") || lower.contains("mariadb") {
        return Some(ServiceGuess {
            name: "mysql".to_string(),
            version: None,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup(22), Some("ssh"));
        assert_eq!(lookup(80), Some("http"));
        assert_eq!(lookup(443), Some("https"));
        assert_eq!(lookup(3389), Some("rdp"));
        assert_eq!(lookup(12345), None);
    }

    #[test]
    fn test_common_ports_have_names() {
        for port in crate::ports::COMMON_PORTS {
            assert!(lookup(port).is_some(), "port {port} has no name");
        }
    }

    #[test]
    fn test_risky_ports() {
        assert!(is_risky_port(23));
        assert!(is_risky_port(445));
        assert!(!is_risky_port(22));
        assert!(!is_risky_port(443));
    }

    #[test]
    fn test_category_boundaries() {
        assert_eq!(category(0), PortCategory::WellKnown);
        assert_eq!(category(1023), PortCategory::WellKnown);
        assert_eq!(category(1024), PortCategory::Registered);
        assert_eq!(category(49151), PortCategory::Registered);
        assert_eq!(category(49152), PortCategory::Dynamic);
        assert_eq!(category(65535), PortCategory::Dynamic);
    }

    #[test]
    fn test_identify_ssh() {
        let guess = identify_banner("SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.5", 22).unwrap();
        assert_eq!(guess.name, "ssh");
        assert_eq!(guess.version.as_deref(), Some("OpenSSH_8.2p1"));
    }

    #[test]
    fn test_identify_http_server_header() {
        let guess = identify_banner("HTTP/1.1 200 OK\r\nServer: nginx/1.18.0 (Ubuntu)\r\n", 80).unwrap();
        assert_eq!(guess.name, "nginx");
        assert_eq!(guess.version.as_deref(), Some("1.18.0"));

        let bare = identify_banner("HTTP/1.0 404 Not Found\r\n", 8080).unwrap();
        assert_eq!(bare.name, "http");
        assert_eq!(bare.version, None);
    }

    #[test]
    fn test_identify_greetings() {
        assert_eq!(identify_banner("220 mail.example.com ESMTP Postfix", 25).unwrap().name, "smtp");
        assert_eq!(identify_banner("220 (vsFTPd 3.0.3)", 21).unwrap().name, "ftp");
        assert_eq!(identify_banner("+OK Dovecot ready.", 110).unwrap().name, "pop3");
        assert_eq!(identify_banner("RFB 003.008", 5900).unwrap().version.as_deref(), Some("003.008"));
        assert_eq!(identify_banner("-NOAUTH Authentication required.", 6379).unwrap().name, "redis");
        assert!(identify_banner("hello there", 4000).is_none());
    }
}
